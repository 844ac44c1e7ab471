use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::common::paths;

use super::narration::TimingAllocation;
use super::remap::BoundaryPolicy;

/// Settings for the external media tools.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MediaSettings {
    /// ffmpeg program name or path
    pub ffmpeg: String,
    /// ffprobe program name or path
    pub ffprobe: String,
    /// x264 quality used when clips have to be re-encoded to concatenate
    pub reencode_crf: u8,
    pub reencode_preset: String,
    pub audio_bitrate: String,
    /// Allowed gap between probed and computed recap duration before warning
    pub duration_tolerance_secs: f64,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            reencode_crf: 23,
            reencode_preset: "medium".to_string(),
            audio_bitrate: "192k".to_string(),
            duration_tolerance_secs: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmSettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub timeout_secs: u64,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub ollama_url: String,
    pub ollama_model: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            timeout_secs: 300,
            openai_api_key: None,
            openai_model: "gpt-4o".to_string(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            anthropic_api_key: None,
            anthropic_model: "claude-sonnet-4-20250514".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3.1".to_string(),
        }
    }
}

impl LlmSettings {
    pub fn openai_key(&self) -> Option<String> {
        key_or_env(&self.openai_api_key, "OPENAI_API_KEY")
    }

    pub fn anthropic_key(&self) -> Option<String> {
        key_or_env(&self.anthropic_api_key, "ANTHROPIC_API_KEY")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsProvider {
    #[default]
    OpenAi,
    ElevenLabs,
}

impl std::fmt::Display for TtsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TtsProvider::OpenAi => write!(f, "openai"),
            TtsProvider::ElevenLabs => write!(f, "elevenlabs"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TtsSettings {
    pub provider: TtsProvider,
    pub openai_voice: String,
    pub openai_model: String,
    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_voice_id: String,
    pub elevenlabs_model: String,
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            provider: TtsProvider::default(),
            openai_voice: "onyx".to_string(),
            openai_model: "tts-1".to_string(),
            elevenlabs_api_key: None,
            elevenlabs_voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
            elevenlabs_model: "eleven_multilingual_v2".to_string(),
        }
    }
}

impl TtsSettings {
    pub fn elevenlabs_key(&self) -> Option<String> {
        key_or_env(&self.elevenlabs_api_key, "ELEVENLABS_API_KEY")
    }
}

fn key_or_env(configured: &Option<String>, var: &str) -> Option<String> {
    configured
        .as_ref()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .or_else(|| std::env::var(var).ok().filter(|k| !k.trim().is_empty()))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecapConfig {
    /// Root for job records, uploads and outputs
    pub data_dir: PathBuf,
    /// Dialogue characters per episode sent to the analysis model
    pub max_chars_per_episode: usize,
    pub subtitle_boundary: BoundaryPolicy,
    /// Only used with the clamp boundary policy
    pub min_overlap_ratio: f64,
    pub narration_timing: TimingAllocation,
    pub media: MediaSettings,
    pub llm: LlmSettings,
    pub tts: TtsSettings,
}

impl Default for RecapConfig {
    fn default() -> Self {
        Self {
            data_dir: paths::default_data_dir(),
            max_chars_per_episode: Self::DEFAULT_MAX_CHARS_PER_EPISODE,
            subtitle_boundary: BoundaryPolicy::default(),
            min_overlap_ratio: Self::DEFAULT_MIN_OVERLAP_RATIO,
            narration_timing: TimingAllocation::default(),
            media: MediaSettings::default(),
            llm: LlmSettings::default(),
            tts: TtsSettings::default(),
        }
    }
}

impl RecapConfig {
    pub const DEFAULT_MAX_CHARS_PER_EPISODE: usize = 12_000;
    pub const DEFAULT_MIN_OVERLAP_RATIO: f64 = 0.5;

    pub fn load() -> Result<Self> {
        Self::load_from_path(paths::recap_config_file()?)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            let config = Self::default();
            config.save_to_path(path)?;
            return Ok(config);
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading recap config from {}", path.display()))?;
        let mut config: Self = toml::from_str(&contents).context("parsing recap config")?;
        if !(0.0..=1.0).contains(&config.min_overlap_ratio) {
            config.min_overlap_ratio = Self::DEFAULT_MIN_OVERLAP_RATIO;
        }
        if config.llm.max_attempts == 0 {
            config.llm.max_attempts = 1;
        }
        Ok(config)
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating recap config directory {}", parent.display()))?;
        }

        let toml = toml::to_string_pretty(self).context("serializing recap config")?;
        fs::write(path, toml)
            .with_context(|| format!("writing recap config to {}", path.display()))?;
        Ok(())
    }

    pub fn directories(&self) -> JobDirectories {
        JobDirectories::new(self.data_dir.clone())
    }
}

/// Where a job's record, uploads and outputs live under the data directory.
#[derive(Debug, Clone)]
pub struct JobDirectories {
    root: PathBuf,
}

impl JobDirectories {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn jobs_dir(&self) -> PathBuf {
        self.root.join("jobs")
    }

    pub fn uploads_dir(&self, job_id: &str) -> PathBuf {
        self.root.join("uploads").join(job_id)
    }

    pub fn outputs_dir(&self, job_id: &str) -> PathBuf {
        self.root.join("outputs").join(job_id)
    }

    /// Absolute and data-dir-relative path of an output artifact.
    pub fn output_file(&self, job_id: &str, name: &str) -> (PathBuf, PathBuf) {
        let relative = Path::new("outputs").join(job_id).join(name);
        (self.root.join(&relative), relative)
    }

    /// Scratch space for one run; removed when the run ends.
    pub fn work_root(&self) -> PathBuf {
        self.root.join("work")
    }

    pub fn ensure(&self) -> Result<()> {
        let dirs = [
            self.jobs_dir(),
            self.root.join("uploads"),
            self.root.join("outputs"),
            self.work_root(),
        ];
        for dir in dirs {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create data directory {}", dir.display()))?;
        }
        Ok(())
    }
}
