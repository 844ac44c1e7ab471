//! Episode identity inference from file names.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Order matters: the first pattern that matches wins.
    static ref SEASON_EPISODE_RE: Regex =
        Regex::new(r"(?i)s(\d{1,2})[ ._-]?e(\d{1,2})").expect("valid SxxEyy regex");
    static ref CROSS_RE: Regex =
        Regex::new(r"(?i)(?:^|[^0-9])(\d{1,2})x(\d{1,2})(?:[^0-9]|$)").expect("valid NxM regex");
    static ref EPISODE_ONLY_RE: Regex =
        Regex::new(r"(?i)(?:^|[^a-z])(?:episode|ep|e)[ ._-]?(\d{1,2})(?:[^0-9]|$)")
            .expect("valid episode regex");
    static ref CANONICAL_RE: Regex =
        Regex::new(r"^S(\d{2,})E(\d{2,})$").expect("valid canonical id regex");
}

pub fn format_episode_id(season: u32, episode: u32) -> String {
    format!("S{:02}E{:02}", season, episode)
}

/// Infer `SxxEyy` from a file name, or `None` when nothing recognisable is present.
pub fn resolve_episode_id(file_name: &str) -> Option<String> {
    let pair = |caps: regex::Captures<'_>| -> Option<String> {
        let season = caps[1].parse::<u32>().ok()?;
        let episode = caps[2].parse::<u32>().ok()?;
        Some(format_episode_id(season, episode))
    };

    if let Some(caps) = SEASON_EPISODE_RE.captures(file_name) {
        return pair(caps);
    }
    if let Some(caps) = CROSS_RE.captures(file_name) {
        return pair(caps);
    }
    if let Some(caps) = EPISODE_ONLY_RE.captures(file_name) {
        let episode = caps[1].parse::<u32>().ok()?;
        return Some(format_episode_id(1, episode));
    }
    None
}

/// Split a canonical id back into (season, episode).
pub fn split_episode_id(id: &str) -> Option<(u32, u32)> {
    let caps = CANONICAL_RE.captures(id)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

/// Resolve ids for a batch of file names, falling back to positional numbering
/// within `season` for names that carry no recognisable marker. Returns ids in
/// input order.
pub fn resolve_with_fallback(file_names: &[String], season: u32) -> Vec<String> {
    file_names
        .iter()
        .enumerate()
        .map(|(pos, name)| {
            resolve_episode_id(name)
                .unwrap_or_else(|| format_episode_id(season, (pos + 1) as u32))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_marker() {
        assert_eq!(
            resolve_episode_id("Show.S01E02.720p.mkv").as_deref(),
            Some("S01E02")
        );
        assert_eq!(resolve_episode_id("show s2e5.srt").as_deref(), Some("S02E05"));
        assert_eq!(
            resolve_episode_id("Show - S03 E11 - Title.mkv").as_deref(),
            Some("S03E11")
        );
    }

    #[test]
    fn cross_marker() {
        assert_eq!(resolve_episode_id("Show.1x02.mkv").as_deref(), Some("S01E02"));
        assert_eq!(resolve_episode_id("show_10X7.srt").as_deref(), Some("S10E07"));
    }

    #[test]
    fn cross_marker_ignores_resolutions() {
        assert_eq!(resolve_episode_id("clip_1920x1080.mp4"), None);
    }

    #[test]
    fn episode_only_defaults_to_season_one() {
        assert_eq!(resolve_episode_id("E02.srt").as_deref(), Some("S01E02"));
        assert_eq!(
            resolve_episode_id("Show Episode 7.srt").as_deref(),
            Some("S01E07")
        );
        assert_eq!(resolve_episode_id("show.ep3.mkv").as_deref(), Some("S01E03"));
    }

    #[test]
    fn season_marker_wins_over_other_patterns() {
        assert_eq!(
            resolve_episode_id("Show.S02E03.1x09.mkv").as_deref(),
            Some("S02E03")
        );
    }

    #[test]
    fn unrecognised_names() {
        assert_eq!(resolve_episode_id("randomfile.mp4"), None);
        assert_eq!(resolve_episode_id("trailer.mkv"), None);
    }

    #[test]
    fn positional_fallback() {
        let names = vec![
            "intro.srt".to_string(),
            "Show.S01E05.srt".to_string(),
            "misc.srt".to_string(),
        ];
        assert_eq!(
            resolve_with_fallback(&names, 2),
            vec!["S02E01", "S01E05", "S02E03"]
        );
    }

    #[test]
    fn split_round_trips() {
        assert_eq!(split_episode_id("S01E12"), Some((1, 12)));
        assert_eq!(split_episode_id("E12"), None);
    }
}
