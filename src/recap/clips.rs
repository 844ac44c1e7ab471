use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeRole {
    Intro,
    Development,
    Climax,
    Resolution,
    KeyScene,
}

/// A narratively significant range chosen by the analysis model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMoment {
    pub episode_id: String,
    pub start_time: f64,
    pub end_time: f64,
    #[serde(default)]
    pub justification: String,
    pub narrative_role: NarrativeRole,
    #[serde(default)]
    pub description: String,
    pub importance: u8,
}

impl KeyMoment {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// One extraction instruction against a source video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipSpec {
    pub episode_id: String,
    pub video_path: PathBuf,
    pub start_time: f64,
    pub end_time: f64,
    /// 1-based position in the final concatenation
    pub order: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moment: Option<KeyMoment>,
}

impl ClipSpec {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

#[derive(Debug, Default)]
pub struct ClipPlan {
    pub clips: Vec<ClipSpec>,
    /// Moments that could not become clips, with the reason
    pub rejected: Vec<(KeyMoment, String)>,
}

/// Turn moments into ordered clips. Moments keep their given order; those
/// with no matching video or an empty range are rejected, and the surviving
/// clips are numbered contiguously from 1.
pub fn plan_clips(moments: &[KeyMoment], videos: &HashMap<String, PathBuf>) -> ClipPlan {
    let mut plan = ClipPlan::default();

    for moment in moments {
        let Some(video_path) = videos.get(&moment.episode_id) else {
            plan.rejected.push((
                moment.clone(),
                format!("no video file for episode {}", moment.episode_id),
            ));
            continue;
        };

        if !(moment.start_time >= 0.0 && moment.end_time > moment.start_time) {
            plan.rejected.push((
                moment.clone(),
                format!(
                    "invalid range {:.3}-{:.3}",
                    moment.start_time, moment.end_time
                ),
            ));
            continue;
        }

        plan.clips.push(ClipSpec {
            episode_id: moment.episode_id.clone(),
            video_path: video_path.clone(),
            start_time: moment.start_time,
            end_time: moment.end_time,
            order: plan.clips.len() as u32 + 1,
            moment: Some(moment.clone()),
        });
    }

    plan
}

pub fn total_duration(clips: &[ClipSpec]) -> f64 {
    clips.iter().map(ClipSpec::duration).sum()
}

pub async fn write_manifest(path: &Path, clips: &[ClipSpec]) -> Result<()> {
    let json = serde_json::to_string_pretty(clips).context("serializing clip manifest")?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("writing clip manifest to {}", path.display()))
}

pub async fn read_manifest(path: &Path) -> Result<Vec<ClipSpec>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading clip manifest {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("parsing clip manifest {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moment(ep: &str, start: f64, end: f64) -> KeyMoment {
        KeyMoment {
            episode_id: ep.to_string(),
            start_time: start,
            end_time: end,
            justification: String::new(),
            narrative_role: NarrativeRole::KeyScene,
            description: String::new(),
            importance: 5,
        }
    }

    #[test]
    fn orders_are_contiguous_after_rejections() {
        let videos = HashMap::from([
            ("S01E01".to_string(), PathBuf::from("/v/e1.mkv")),
            ("S01E02".to_string(), PathBuf::from("/v/e2.mkv")),
        ]);
        let plan = plan_clips(
            &[
                moment("S01E02", 30.0, 40.0),
                moment("S01E09", 1.0, 2.0),
                moment("S01E01", 5.0, 5.0),
                moment("S01E01", 10.0, 20.0),
            ],
            &videos,
        );
        assert_eq!(plan.clips.len(), 2);
        assert_eq!(plan.rejected.len(), 2);
        assert_eq!(plan.clips[0].order, 1);
        assert_eq!(plan.clips[0].episode_id, "S01E02");
        assert_eq!(plan.clips[1].order, 2);
        assert_eq!(plan.clips[1].video_path, PathBuf::from("/v/e1.mkv"));
        assert_eq!(total_duration(&plan.clips), 20.0);
    }

    #[test]
    fn moment_json_uses_camel_case_and_snake_roles() {
        let json = r#"{"episodeId":"S01E01","startTime":1.5,"endTime":9,"narrativeRole":"key_scene","importance":7}"#;
        let m: KeyMoment = serde_json::from_str(json).unwrap();
        assert_eq!(m.narrative_role, NarrativeRole::KeyScene);
        assert_eq!(m.duration(), 7.5);
        assert!(m.justification.is_empty());
    }

    #[tokio::test]
    async fn manifest_survives_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clips.json");
        let videos = HashMap::from([("S01E01".to_string(), PathBuf::from("e1.mkv"))]);
        let plan = plan_clips(&[moment("S01E01", 1.0, 4.0)], &videos);
        write_manifest(&path, &plan.clips).await.unwrap();
        let back = read_manifest(&path).await.unwrap();
        assert_eq!(back, plan.clips);
    }
}
