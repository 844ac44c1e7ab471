//! Prompt text and reply parsing shared by every provider.

use anyhow::{Context, Result};
use serde::Deserialize;

use super::types::{
    MomentRequest, MomentSelection, NarrationRequest, NarrationScript, NarrativeOutline,
};
use crate::recap::clips::{KeyMoment, NarrativeRole};
use crate::recap::jobs::Mode;
use crate::recap::narration::NarrationBlock;
use crate::recap::srt::format_timestamp;

pub const MOMENT_SYSTEM_PROMPT: &str = "You are a film editor building a season recap from subtitle transcripts. \
Pick the scenes that tell the season's story. Reply with a single JSON object and nothing else.";

pub const NARRATION_SYSTEM_PROMPT: &str = "You are a narrator writing a voice-over for a season recap. \
Write in the requested language. Reply with a single JSON object and nothing else.";

pub fn moment_prompt(request: &MomentRequest) -> String {
    let mode_hint = match request.mode {
        Mode::A => "The recap keeps the original dialogue, so pick scenes whose dialogue is self-explanatory.",
        Mode::B => "The recap is muted and narrated, so prefer visually strong scenes.",
    };
    format!(
        "Series: {series}\nSeason: {season}\nLanguage: {language}\n\
Target recap length: {target} seconds in total.\n{mode_hint}\n\n\
Return JSON shaped as:\n\
{{\"moments\": [{{\"episodeId\": \"S01E01\", \"startTime\": 0.0, \"endTime\": 0.0, \"justification\": \"\", \
\"narrativeRole\": \"intro|development|climax|resolution|key_scene\", \"description\": \"\", \"importance\": 1}}], \
\"narrativeOutline\": {{\"intro\": \"\", \"development\": \"\", \"climax\": \"\", \"resolution\": \"\"}}, \"notes\": \"\"}}\n\
Times are seconds from the start of the episode. List moments in the order they should play. \
Importance runs from 1 to 10.\n\n{text}",
        series = request.series_name,
        season = request.season,
        language = request.language,
        target = request.target_length_secs,
        text = request.season_text,
    )
}

pub fn narration_prompt(request: &NarrationRequest) -> String {
    let mut scenes = String::new();
    for (i, moment) in request.moments.iter().enumerate() {
        scenes.push_str(&format!(
            "{}. {} {} --> {} ({:.0}s): {}\n",
            i + 1,
            moment.episode_id,
            format_timestamp(moment.start_time),
            format_timestamp(moment.end_time),
            moment.duration(),
            if moment.description.is_empty() {
                &moment.justification
            } else {
                &moment.description
            }
        ));
    }
    let outline = &request.outline;
    format!(
        "Series: {}\nSeason: {}\nLanguage: {}\n\nStory arc:\n- Intro: {}\n- Development: {}\n- Climax: {}\n- Resolution: {}\n\n\
Scenes in playback order:\n{}\n\
Write one narration block per scene, sized to be spoken within that scene's duration. \
Return JSON shaped as {{\"narrative\": \"full text\", \"blocks\": [{{\"text\": \"\", \"durationSeconds\": 0.0}}]}}.",
        request.series_name,
        request.season,
        request.language,
        outline.intro,
        outline.development,
        outline.climax,
        outline.resolution,
        scenes
    )
}

/// The first balanced `{...}` object in `text`. Code fences and chatter around
/// the object are ignored.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Deserialize)]
struct RawSelection {
    #[serde(default)]
    moments: Vec<RawMoment>,
    #[serde(default, alias = "narrative_outline", rename = "narrativeOutline")]
    outline: NarrativeOutline,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Deserialize)]
struct RawMoment {
    #[serde(alias = "episode_id", rename = "episodeId")]
    episode_id: String,
    #[serde(alias = "start_time", rename = "startTime")]
    start_time: f64,
    #[serde(alias = "end_time", rename = "endTime")]
    end_time: f64,
    #[serde(default)]
    justification: String,
    #[serde(default, alias = "narrative_role", rename = "narrativeRole")]
    narrative_role: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_importance")]
    importance: f64,
}

fn default_importance() -> f64 {
    5.0
}

fn parse_role(role: &str) -> NarrativeRole {
    match role.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
        "intro" => NarrativeRole::Intro,
        "development" => NarrativeRole::Development,
        "climax" => NarrativeRole::Climax,
        "resolution" => NarrativeRole::Resolution,
        _ => NarrativeRole::KeyScene,
    }
}

/// Parse a moment-selection reply. Moments with a bad range are dropped and
/// importance is clamped to 1..=10.
pub fn parse_moment_selection(reply: &str) -> Result<MomentSelection> {
    let json = extract_json(reply).context("reply contains no JSON object")?;
    let raw: RawSelection =
        serde_json::from_str(json).context("reply is not a valid moment selection")?;

    let moments = raw
        .moments
        .into_iter()
        .filter(|m| {
            m.start_time.is_finite()
                && m.end_time.is_finite()
                && m.start_time >= 0.0
                && m.end_time > m.start_time
        })
        .map(|m| KeyMoment {
            episode_id: m.episode_id.trim().to_uppercase(),
            start_time: m.start_time,
            end_time: m.end_time,
            justification: m.justification,
            narrative_role: parse_role(&m.narrative_role),
            description: m.description,
            importance: m.importance.round().clamp(1.0, 10.0) as u8,
        })
        .collect();

    Ok(MomentSelection {
        moments,
        outline: raw.outline,
        notes: raw.notes.filter(|n| !n.trim().is_empty()),
    })
}

#[derive(Deserialize)]
struct RawNarration {
    #[serde(default)]
    narrative: String,
    #[serde(default)]
    blocks: Vec<RawBlock>,
}

#[derive(Deserialize)]
struct RawBlock {
    #[serde(default)]
    text: String,
    #[serde(default, alias = "duration_seconds", alias = "duration", rename = "durationSeconds")]
    duration_seconds: f64,
}

pub fn parse_narration(reply: &str) -> Result<NarrationScript> {
    let json = extract_json(reply).context("reply contains no JSON object")?;
    let raw: RawNarration =
        serde_json::from_str(json).context("reply is not a valid narration script")?;

    let blocks: Vec<NarrationBlock> = raw
        .blocks
        .into_iter()
        .filter(|b| !b.text.trim().is_empty())
        .map(|b| NarrationBlock {
            text: b.text.trim().to_string(),
            duration_seconds: if b.duration_seconds.is_finite() {
                b.duration_seconds.max(0.0)
            } else {
                0.0
            },
        })
        .collect();

    let narrative = if raw.narrative.trim().is_empty() {
        blocks
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        raw.narrative.trim().to_string()
    };

    Ok(NarrationScript { narrative, blocks })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_object_inside_fence() {
        let reply = "Sure!\n```json\n{\"a\": {\"b\": \"}\"}}\n```\nthanks";
        assert_eq!(extract_json(reply), Some("{\"a\": {\"b\": \"}\"}}"));
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("{\"open\": 1"), None);
    }

    #[test]
    fn moments_are_sanitized() {
        let reply = r#"{
            "moments": [
                {"episodeId": "s01e01", "startTime": 10, "endTime": 20, "narrativeRole": "intro", "importance": 14},
                {"episodeId": "S01E02", "startTime": 30, "endTime": 25, "narrativeRole": "climax"},
                {"episode_id": "S01E03", "start_time": 5, "end_time": 9, "narrative_role": "plot twist", "importance": 0}
            ],
            "narrativeOutline": {"intro": "It begins"},
            "notes": "  "
        }"#;
        let selection = parse_moment_selection(reply).unwrap();
        assert_eq!(selection.moments.len(), 2);
        assert_eq!(selection.moments[0].episode_id, "S01E01");
        assert_eq!(selection.moments[0].importance, 10);
        assert_eq!(selection.moments[0].narrative_role, NarrativeRole::Intro);
        assert_eq!(selection.moments[1].narrative_role, NarrativeRole::KeyScene);
        assert_eq!(selection.moments[1].importance, 1);
        assert_eq!(selection.outline.intro, "It begins");
        assert_eq!(selection.notes, None);
    }

    #[test]
    fn malformed_reply_is_an_error() {
        assert!(parse_moment_selection("I could not decide").is_err());
        assert!(parse_moment_selection("{\"moments\": 3}").is_err());
    }

    #[test]
    fn narration_falls_back_to_joined_blocks() {
        let reply = r#"{"blocks": [{"text": "First.", "durationSeconds": 4}, {"text": " ", "durationSeconds": 2}, {"text": "Second.", "duration": -1}]}"#;
        let script = parse_narration(reply).unwrap();
        assert_eq!(script.blocks.len(), 2);
        assert_eq!(script.blocks[1].duration_seconds, 0.0);
        assert_eq!(script.narrative, "First. Second.");
    }

    #[test]
    fn prompt_mentions_target_and_text() {
        let request = MomentRequest {
            series_name: "Show".into(),
            season: 2,
            language: "en".into(),
            mode: Mode::B,
            target_length_secs: 300,
            season_text: "--- S02E01 ---\n[00:01] Hi".into(),
        };
        let prompt = moment_prompt(&request);
        assert!(prompt.contains("300 seconds"));
        assert!(prompt.contains("[00:01] Hi"));
        assert!(prompt.contains("narrated"));
    }
}
