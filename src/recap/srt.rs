//! SubRip (SRT) reading and writing.
//!
//! Parsing is lenient: a block that cannot be understood is dropped and
//! counted in [`ParsedSrt::skipped`] instead of failing the whole file.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref TIMESTAMP_RE: Regex =
        Regex::new(r"^(\d{2,}):(\d{2}):(\d{2})[,.](\d{3})$").expect("valid timestamp regex");
    static ref TIMING_LINE_RE: Regex =
        Regex::new(r"^\s*(\S+)\s*-->\s*(\S+)").expect("valid timing regex");
    static ref BLOCK_SEPARATOR_RE: Regex =
        Regex::new(r"\n(?:[ \t]*\n)+").expect("valid separator regex");
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimestampError {
    #[error("invalid SRT timestamp '{0}' (expected HH:MM:SS,mmm)")]
    Format(String),
}

/// Anything that can be written as an SRT cue.
pub trait Cue {
    fn start(&self) -> f64;
    fn end(&self) -> f64;
    fn text(&self) -> &str;
}

/// A cue as read from a file, before it is tied to an episode.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntry {
    pub index: u32,
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleEntry {
    pub episode_id: String,
    pub index: u32,
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedSrt {
    pub entries: Vec<RawEntry>,
    /// Blocks that were dropped because they were malformed
    pub skipped: usize,
}

impl Cue for RawEntry {
    fn start(&self) -> f64 {
        self.start_time
    }
    fn end(&self) -> f64 {
        self.end_time
    }
    fn text(&self) -> &str {
        &self.text
    }
}

impl Cue for SubtitleEntry {
    fn start(&self) -> f64 {
        self.start_time
    }
    fn end(&self) -> f64 {
        self.end_time
    }
    fn text(&self) -> &str {
        &self.text
    }
}

pub fn parse_timestamp(value: &str) -> Result<f64, TimestampError> {
    let trimmed = value.trim();
    let caps = TIMESTAMP_RE
        .captures(trimmed)
        .ok_or_else(|| TimestampError::Format(trimmed.to_string()))?;

    let field = |i: usize| -> Result<u64, TimestampError> {
        caps[i]
            .parse::<u64>()
            .map_err(|_| TimestampError::Format(trimmed.to_string()))
    };

    let hours = field(1)?;
    let minutes = field(2)?;
    let seconds = field(3)?;
    let millis = field(4)?;
    if minutes >= 60 || seconds >= 60 {
        return Err(TimestampError::Format(trimmed.to_string()));
    }

    let whole = hours
        .checked_mul(3600)
        .and_then(|h| h.checked_add(minutes * 60 + seconds))
        .ok_or_else(|| TimestampError::Format(trimmed.to_string()))?;
    Ok(whole as f64 + millis as f64 / 1000.0)
}

/// Format seconds as `HH:MM:SS,mmm`. Milliseconds are rounded, negatives clamp to zero.
pub fn format_timestamp(seconds: f64) -> String {
    let total_ms = if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1000.0).round() as u64
    } else {
        0
    };
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

pub fn parse_srt(content: &str) -> ParsedSrt {
    let normalized = content
        .trim_start_matches('\u{feff}')
        .replace("\r\n", "\n")
        .replace('\r', "\n");

    let mut parsed = ParsedSrt::default();

    for block in BLOCK_SEPARATOR_RE.split(normalized.trim()) {
        let lines: Vec<&str> = block.lines().filter(|l| !l.trim().is_empty()).collect();
        if lines.is_empty() {
            continue;
        }
        match parse_block(&lines) {
            Some(entry) => parsed.entries.push(entry),
            None => parsed.skipped += 1,
        }
    }

    parsed
}

fn parse_block(lines: &[&str]) -> Option<RawEntry> {
    if lines.len() < 3 {
        return None;
    }

    let index = lines[0].trim().parse::<u32>().ok()?;

    let caps = TIMING_LINE_RE.captures(lines[1])?;
    let start_time = parse_timestamp(&caps[1]).ok()?;
    let end_time = parse_timestamp(&caps[2]).ok()?;
    if end_time < start_time {
        return None;
    }

    let text = lines[2..]
        .iter()
        .map(|l| l.trim_end())
        .collect::<Vec<_>>()
        .join("\n");

    Some(RawEntry {
        index,
        start_time,
        end_time,
        text,
    })
}

/// Render cues in the given order, numbering them from 1.
pub fn generate_srt<C: Cue>(entries: &[C]) -> String {
    let mut out = String::new();
    for (i, entry) in entries.iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_timestamp(entry.start()),
            format_timestamp(entry.end()),
            entry.text()
        ));
    }
    out
}

pub fn attach_episode(entries: Vec<RawEntry>, episode_id: &str) -> Vec<SubtitleEntry> {
    entries
        .into_iter()
        .map(|e| SubtitleEntry {
            episode_id: episode_id.to_string(),
            index: e.index,
            start_time: e.start_time,
            end_time: e.end_time,
            text: e.text,
        })
        .collect()
}
