use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::recap::clips::KeyMoment;
use crate::recap::llm::{LlmProvider, NarrativeOutline};

/// Output variant of a recap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum Mode {
    /// Original audio with remapped subtitles
    #[default]
    #[value(name = "a")]
    A,
    /// Muted video with synthesized narration
    #[value(name = "b")]
    B,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::A => write!(f, "A"),
            Mode::B => write!(f, "B"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfig {
    pub series_name: String,
    pub season: u32,
    pub language: String,
    pub mode: Mode,
    /// Desired recap length in seconds
    pub target_length: u32,
    pub llm_provider: LlmProvider,
}

/// Pipeline stages in execution order, plus the two terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Validating,
    Parsing,
    Analyzing,
    GeneratingClips,
    ProcessingVideo,
    GeneratingSrt,
    GeneratingTts,
    MixingAudio,
    Completed,
    Failed,
}

const MODE_A_STAGES: &[JobStatus] = &[
    JobStatus::Validating,
    JobStatus::Parsing,
    JobStatus::Analyzing,
    JobStatus::GeneratingClips,
    JobStatus::ProcessingVideo,
    JobStatus::GeneratingSrt,
    JobStatus::Completed,
];

const MODE_B_STAGES: &[JobStatus] = &[
    JobStatus::Validating,
    JobStatus::Parsing,
    JobStatus::Analyzing,
    JobStatus::GeneratingClips,
    JobStatus::ProcessingVideo,
    JobStatus::GeneratingSrt,
    JobStatus::GeneratingTts,
    JobStatus::MixingAudio,
    JobStatus::Completed,
];

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Validating => "validating",
            JobStatus::Parsing => "parsing",
            JobStatus::Analyzing => "analyzing",
            JobStatus::GeneratingClips => "generating_clips",
            JobStatus::ProcessingVideo => "processing_video",
            JobStatus::GeneratingSrt => "generating_srt",
            JobStatus::GeneratingTts => "generating_tts",
            JobStatus::MixingAudio => "mixing_audio",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Progress segments for a mode, ending with `Completed`.
    pub fn stages(mode: Mode) -> &'static [JobStatus] {
        match mode {
            Mode::A => MODE_A_STAGES,
            Mode::B => MODE_B_STAGES,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Success,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub stage: JobStatus,
    /// 0-100 within `stage`
    pub stage_progress: f64,
    pub current_step: String,
    pub completed_stages: Vec<JobStatus>,
    pub errors: Vec<String>,
    pub logs: Vec<LogEntry>,
}

impl Default for JobProgress {
    fn default() -> Self {
        Self {
            stage: JobStatus::Pending,
            stage_progress: 0.0,
            current_step: String::new(),
            completed_stages: Vec::new(),
            errors: Vec::new(),
            logs: Vec::new(),
        }
    }
}

/// An uploaded input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFile {
    /// Name as uploaded, used for episode matching
    pub original_name: String,
    pub path: PathBuf,
}

/// Artifacts of a finished run, relative to the data directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutputs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub srt_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative_srt_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clips_json_path: Option<PathBuf>,
}

impl JobOutputs {
    /// Present artifacts as `(label, relative path)`.
    pub fn entries(&self) -> Vec<(&'static str, &PathBuf)> {
        [
            ("video", &self.video_path),
            ("subtitles", &self.srt_path),
            ("narration_subtitles", &self.narrative_srt_path),
            ("narration_audio", &self.audio_path),
            ("clips", &self.clips_json_path),
        ]
        .into_iter()
        .filter_map(|(label, path)| path.as_ref().map(|p| (label, p)))
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub config: JobConfig,
    pub status: JobStatus,
    pub progress: JobProgress,
    pub srt_files: Vec<JobFile>,
    pub video_files: Vec<JobFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_moments: Option<Vec<KeyMoment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative_outline: Option<NarrativeOutline>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,
    #[serde(default)]
    pub outputs: JobOutputs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

pub fn generate_job_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("job_{}_{}", Utc::now().timestamp_millis(), suffix)
}

impl Job {
    pub fn new(config: JobConfig, srt_files: Vec<JobFile>, video_files: Vec<JobFile>) -> Self {
        Self::with_id(generate_job_id(), config, srt_files, video_files)
    }

    pub fn with_id(
        id: String,
        config: JobConfig,
        srt_files: Vec<JobFile>,
        video_files: Vec<JobFile>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            config,
            status: JobStatus::Pending,
            progress: JobProgress::default(),
            srt_files,
            video_files,
            key_moments: None,
            narrative_outline: None,
            narrative: None,
            outputs: JobOutputs::default(),
            error: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Move to `stage`. The stage being left counts as completed unless it was
    /// `pending` or `failed`.
    pub fn enter_stage(&mut self, stage: JobStatus) {
        let previous = self.status;
        if !matches!(previous, JobStatus::Pending | JobStatus::Failed)
            && previous != stage
            && !self.progress.completed_stages.contains(&previous)
        {
            self.progress.completed_stages.push(previous);
        }
        if previous == JobStatus::Pending && self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        self.status = stage;
        self.progress.stage = stage;
        self.progress.stage_progress = 0.0;
        self.progress.current_step.clear();
        self.touch();
    }

    pub fn set_stage_progress(&mut self, percent: f64, step: impl Into<String>) {
        self.progress.stage_progress = percent.clamp(0.0, 100.0);
        self.progress.current_step = step.into();
        self.touch();
    }

    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.progress.logs.push(LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        });
        self.touch();
    }

    pub fn complete(&mut self) {
        self.enter_stage(JobStatus::Completed);
        self.progress.stage_progress = 100.0;
        self.completed_at = Some(Utc::now());
    }

    /// Record a terminal failure. `progress.stage` keeps the stage that failed.
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.status = JobStatus::Failed;
        self.progress.errors.push(message.clone());
        self.log(LogLevel::Error, message.clone());
        self.error = Some(message);
        self.completed_at = Some(Utc::now());
    }

    /// Forget everything a previous run produced, back to `pending`.
    pub fn reset(&mut self) {
        self.status = JobStatus::Pending;
        self.progress = JobProgress::default();
        self.key_moments = None;
        self.narrative_outline = None;
        self.narrative = None;
        self.outputs = JobOutputs::default();
        self.error = None;
        self.started_at = None;
        self.completed_at = None;
        self.touch();
    }

    /// Overall completion in percent. Stages of the job's mode are equal-width
    /// segments; anything short of `completed` is capped at 99.
    pub fn overall_progress(&self) -> f64 {
        match self.status {
            JobStatus::Completed => return 100.0,
            JobStatus::Pending => return 0.0,
            _ => {}
        }

        let stages = JobStatus::stages(self.config.mode);
        let Some(position) = stages.iter().position(|s| *s == self.progress.stage) else {
            return 0.0;
        };
        let within = self.progress.stage_progress.clamp(0.0, 100.0) / 100.0;
        let overall = (position as f64 + within) / stages.len() as f64 * 100.0;
        overall.min(99.0)
    }
}
