//! Subtitle timing remapper.
//!
//! Moves subtitle cues from each source episode's clock onto the clock of the
//! concatenated recap. Clips are laid end to end in `order`, so a clip's
//! output start is the summed duration of every clip before it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::clips::ClipSpec;
use super::srt::{Cue, SubtitleEntry};

/// How cues crossing a clip boundary are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryPolicy {
    /// Keep only cues lying entirely inside the clip
    #[default]
    Contain,
    /// Keep cues overlapping the clip by at least the configured ratio, clamped to the clip
    Clamp,
}

/// A subtitle with timing remapped to the recap timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemappedSubtitle {
    /// 1-based, sequential across the whole recap
    pub index: u32,
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
    pub original_episode_id: String,
    pub original_start_time: f64,
}

impl Cue for RemappedSubtitle {
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

#[derive(Debug, Clone, Default)]
pub struct RemapResult {
    pub subtitles: Vec<RemappedSubtitle>,
    /// Length of the concatenated output in seconds
    pub total_duration: f64,
}

/// Cues overlapping `[start, end]` by at least `min_ratio` of their own length.
/// A zero-length cue counts as fully overlapping when it lies inside the range.
pub fn select_by_overlap(
    entries: &[SubtitleEntry],
    start: f64,
    end: f64,
    min_ratio: f64,
) -> Vec<&SubtitleEntry> {
    entries
        .iter()
        .filter(|entry| {
            let length = entry.end_time - entry.start_time;
            if length <= 0.0 {
                return entry.start_time >= start && entry.start_time <= end;
            }
            let overlap = entry.end_time.min(end) - entry.start_time.max(start);
            overlap > 0.0 && overlap / length >= min_ratio
        })
        .collect()
}

fn select_contained(entries: &[SubtitleEntry], start: f64, end: f64) -> Vec<&SubtitleEntry> {
    entries
        .iter()
        .filter(|entry| entry.start_time >= start && entry.end_time <= end)
        .collect()
}

/// Remap every episode's cues onto the recap timeline.
///
/// `clips` may arrive in any order; they are processed by ascending `order`.
/// `min_overlap_ratio` only applies to [`BoundaryPolicy::Clamp`].
pub fn remap_subtitles(
    clips: &[ClipSpec],
    subtitles: &HashMap<String, Vec<SubtitleEntry>>,
    policy: BoundaryPolicy,
    min_overlap_ratio: f64,
) -> RemapResult {
    let mut ordered: Vec<&ClipSpec> = clips.iter().collect();
    ordered.sort_by_key(|clip| clip.order);

    let mut result = RemapResult::default();
    let mut output_offset = 0.0;

    for clip in ordered {
        let clip_length = clip.end_time - clip.start_time;

        if let Some(entries) = subtitles.get(&clip.episode_id) {
            let selected = match policy {
                BoundaryPolicy::Contain => {
                    select_contained(entries, clip.start_time, clip.end_time)
                }
                BoundaryPolicy::Clamp => {
                    select_by_overlap(entries, clip.start_time, clip.end_time, min_overlap_ratio)
                }
            };

            let mut local: Vec<(f64, f64, &SubtitleEntry)> = selected
                .into_iter()
                .map(|entry| {
                    let start = entry.start_time.max(clip.start_time) - clip.start_time;
                    let end = entry.end_time.min(clip.end_time) - clip.start_time;
                    (start, end, entry)
                })
                .collect();
            // Source files are not guaranteed to be sorted
            local.sort_by(|a, b| a.0.total_cmp(&b.0));

            for (start, end, entry) in local {
                result.subtitles.push(RemappedSubtitle {
                    index: result.subtitles.len() as u32 + 1,
                    start_time: output_offset + start,
                    end_time: output_offset + end,
                    text: entry.text.clone(),
                    original_episode_id: entry.episode_id.clone(),
                    original_start_time: entry.start_time,
                });
            }
        }

        output_offset += clip_length;
    }

    result.total_duration = output_offset;
    result
}
