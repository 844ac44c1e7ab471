//! Season-wide dialogue text handed to the moment-selection model.

use super::srt::SubtitleEntry;

const TRUNCATION_MARKER: &str = "[...truncated...]";

#[derive(Debug, Clone)]
pub struct EpisodeSubtitles {
    pub episode_id: String,
    /// 1-based ordering key
    pub episode_number: u32,
    pub video_file_name: Option<String>,
    pub entries: Vec<SubtitleEntry>,
}

#[derive(Debug, Clone)]
pub struct SeasonSubtitles {
    pub series_name: String,
    pub season: u32,
    pub language: String,
    pub episodes: Vec<EpisodeSubtitles>,
    pub total_entries: usize,
}

pub fn build_season(
    mut episodes: Vec<EpisodeSubtitles>,
    series_name: &str,
    season: u32,
    language: &str,
) -> SeasonSubtitles {
    // sort_by_key is stable, so equal episode numbers keep their input order
    episodes.sort_by_key(|e| e.episode_number);
    let total_entries = episodes.iter().map(|e| e.entries.len()).sum();

    SeasonSubtitles {
        series_name: series_name.to_string(),
        season,
        language: language.to_string(),
        episodes,
        total_entries,
    }
}

/// `MM:SS` where minutes keep counting past 59.
fn compact_time(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// Render the season as plain text. With a per-episode character budget, each
/// episode keeps its earliest entries and drops the tail once the budget
/// would be exceeded.
pub fn render_for_analysis(
    season: &SeasonSubtitles,
    max_chars_per_episode: Option<usize>,
) -> String {
    let mut out = String::new();
    out.push_str(&format!("Series: {}\n", season.series_name));
    out.push_str(&format!("Season: {}\n", season.season));
    out.push_str(&format!("Language: {}\n", season.language));
    out.push_str(&format!("Episodes: {}\n", season.episodes.len()));
    out.push_str(&format!("Subtitle entries: {}\n", season.total_entries));

    for episode in &season.episodes {
        out.push_str(&format!("\n--- {} ---\n", episode.episode_id));

        let mut used = 0usize;
        for entry in &episode.entries {
            let line = format!(
                "[{}] {}\n",
                compact_time(entry.start_time),
                entry.text.replace('\n', " ")
            );
            let len = line.chars().count();
            if let Some(budget) = max_chars_per_episode {
                if used + len > budget {
                    out.push_str(TRUNCATION_MARKER);
                    out.push('\n');
                    break;
                }
            }
            used += len;
            out.push_str(&line);
        }
    }

    out
}
