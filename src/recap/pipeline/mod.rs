//! Job pipeline.
//!
//! A run is one sequential chain of stages:
//! `validating → parsing → analyzing → generating_clips → processing_video →
//! generating_srt`, followed in mode B by `generating_tts → mixing_audio`.
//! The record is persisted after every transition. Any stage error fails the
//! whole job: the error chain is stored on the record and returned to the
//! caller. There is no resume; a failed job is reset and run again.

mod logging;
mod stages;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;

use self::logging::job_log;
use super::config::{JobDirectories, LlmSettings, RecapConfig, TtsSettings};
use super::jobs::{Job, JobStatus, JobStore, LogLevel, Mode};
use super::llm::{LlmProvider, StoryAnalyzer, create_analyzer};
use super::narration::TimingAllocation;
use super::remap::BoundaryPolicy;
use super::support::ffmpeg::MediaTool;
use super::tts::{SpeechSynthesizer, create_synthesizer};
use crate::ui::prelude::{Level, emit};

pub const RECAP_VIDEO: &str = "recap.mp4";
pub const RECAP_SRT: &str = "recap.srt";
pub const NARRATION_SRT: &str = "narration.srt";
pub const NARRATION_AUDIO: &str = "narration.mp3";
pub const CLIPS_MANIFEST: &str = "clips.json";

/// Tunables the stages read from the config file.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_chars_per_episode: usize,
    pub boundary: BoundaryPolicy,
    pub min_overlap_ratio: f64,
    pub narration_timing: TimingAllocation,
    pub duration_tolerance_secs: f64,
}

impl PipelineSettings {
    pub fn from_config(config: &RecapConfig) -> Self {
        Self {
            max_chars_per_episode: config.max_chars_per_episode,
            boundary: config.subtitle_boundary,
            min_overlap_ratio: config.min_overlap_ratio,
            narration_timing: config.narration_timing,
            duration_tolerance_secs: config.media.duration_tolerance_secs,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&RecapConfig::default())
    }
}

/// Source of the model-backed collaborators, resolved when a run needs them.
pub trait Collaborators: Send + Sync {
    fn analyzer(&self, provider: LlmProvider) -> Result<Arc<dyn StoryAnalyzer>>;

    fn synthesizer(&self) -> Result<Arc<dyn SpeechSynthesizer>>;
}

/// Collaborators built from the config file.
pub struct ConfiguredCollaborators {
    llm: LlmSettings,
    tts: TtsSettings,
}

impl ConfiguredCollaborators {
    pub fn new(config: &RecapConfig) -> Self {
        Self {
            llm: config.llm.clone(),
            tts: config.tts.clone(),
        }
    }
}

impl Collaborators for ConfiguredCollaborators {
    fn analyzer(&self, provider: LlmProvider) -> Result<Arc<dyn StoryAnalyzer>> {
        Ok(Arc::from(create_analyzer(provider, &self.llm)?))
    }

    fn synthesizer(&self) -> Result<Arc<dyn SpeechSynthesizer>> {
        Ok(Arc::from(create_synthesizer(&self.tts, &self.llm)?))
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    media: Arc<dyn MediaTool>,
    collaborators: Arc<dyn Collaborators>,
    dirs: JobDirectories,
    settings: PipelineSettings,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        media: Arc<dyn MediaTool>,
        collaborators: Arc<dyn Collaborators>,
        dirs: JobDirectories,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            media,
            collaborators,
            dirs,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Claim a pending job and run it to a terminal state.
    pub async fn start(&self, id: &str) -> Result<Job> {
        let job = self.store.claim_pending(id).await?;
        self.run(job).await
    }

    /// Run a job on its own task. A task that panics or is cancelled still
    /// leaves the record `failed`, so it can be reset and started again.
    pub fn spawn(&self, id: String) -> JoinHandle<Result<Job>> {
        let this = self.clone();
        tokio::spawn(async move {
            let runner = this.clone();
            let run_id = id.clone();
            match tokio::spawn(async move { runner.start(&run_id).await }).await {
                Ok(result) => result,
                Err(join_err) => {
                    let reason = if join_err.is_panic() {
                        "job task panicked"
                    } else {
                        "job task was cancelled"
                    };
                    this.record_abort(&id, reason).await?;
                    Err(anyhow::anyhow!("{} for {}", reason, id))
                }
            }
        })
    }

    /// Mark a job that stopped without reaching a terminal state as failed.
    async fn record_abort(&self, id: &str, reason: &str) -> Result<()> {
        let mut job = self.store.get(id).await?;
        if job.status.is_terminal() || job.status == JobStatus::Pending {
            return Ok(());
        }
        emit(
            Level::Error,
            "recap.pipeline.aborted",
            &format!("[{}] {} during {}", job.id, reason, job.progress.stage),
            None,
        );
        job.fail(reason);
        self.store.save(&job).await
    }

    async fn run(&self, mut job: Job) -> Result<Job> {
        match self.execute(&mut job).await {
            Ok(()) => {
                job.complete();
                job_log(&mut job, LogLevel::Success, "recap.pipeline.completed", "Recap completed");
                self.store.save(&job).await?;
                Ok(job)
            }
            Err(err) => {
                let message = format!("{:#}", err);
                emit(
                    Level::Error,
                    "recap.pipeline.failed",
                    &format!("[{}] failed during {}: {}", job.id, job.progress.stage, message),
                    None,
                );
                job.fail(message);
                if let Err(save_err) = self.store.save(&job).await {
                    emit(
                        Level::Error,
                        "recap.pipeline.persist",
                        &format!("Could not record failure of {}: {:#}", job.id, save_err),
                        None,
                    );
                }
                Err(err)
            }
        }
    }

    async fn execute(&self, job: &mut Job) -> Result<()> {
        tokio::fs::create_dir_all(self.dirs.outputs_dir(&job.id))
            .await
            .context("Failed to create output directory")?;
        let work_root = self.dirs.work_root();
        tokio::fs::create_dir_all(&work_root)
            .await
            .context("Failed to create work directory")?;
        // Dropped on every exit path, which removes everything extracted or synthesized
        let work = tempfile::Builder::new()
            .prefix(&format!("{}-", job.id))
            .tempdir_in(&work_root)
            .context("Failed to create job work directory")?;

        if job.status != JobStatus::Validating {
            self.enter(job, JobStatus::Validating).await?;
        }
        self.validate(job).await?;

        self.enter(job, JobStatus::Parsing).await?;
        let inputs = self.parse(job).await?;

        self.enter(job, JobStatus::Analyzing).await?;
        let analyzer = self.analyze(job, &inputs).await?;

        self.enter(job, JobStatus::GeneratingClips).await?;
        let clips = self.generate_clips(job, &inputs).await?;

        self.enter(job, JobStatus::ProcessingVideo).await?;
        let video = self.process_video(job, &clips, work.path()).await?;

        self.enter(job, JobStatus::GeneratingSrt).await?;
        self.generate_subtitles(job, &inputs, &clips).await?;

        if job.config.mode == Mode::B {
            self.enter(job, JobStatus::GeneratingTts).await?;
            match self.narrate(job, analyzer.as_ref(), &clips, work.path()).await? {
                Some(narration) => {
                    self.enter(job, JobStatus::MixingAudio).await?;
                    self.mix(job, &video, &narration).await?;
                }
                None => self.publish_muted(job, &video).await?,
            }
        }

        Ok(())
    }

    async fn enter(&self, job: &mut Job, stage: JobStatus) -> Result<()> {
        job.enter_stage(stage);
        job_log(
            job,
            LogLevel::Info,
            "recap.pipeline.stage",
            format!("Stage {} started", stage),
        );
        self.persist(job).await
    }

    async fn persist(&self, job: &mut Job) -> Result<()> {
        job.touch();
        self.store.save(job).await
    }
}
