//! Text-to-speech backends and chunked narration synthesis.

pub mod elevenlabs;
pub mod openai;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::config::{LlmSettings, TtsProvider, TtsSettings};
use super::narration::split_for_speech;
use super::support::ffmpeg::MediaTool;
use crate::ui::prelude::{Level, emit};

/// Speaking rate used when a backend does not report duration.
pub const WORDS_PER_SECOND: f64 = 2.5;

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechClip {
    pub path: PathBuf,
    pub duration_ms: u64,
}

impl SpeechClip {
    pub fn duration_secs(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Longest text accepted in one call, in characters
    fn max_chars(&self) -> usize;

    async fn synthesize(&self, text: &str, out: &Path) -> Result<SpeechClip>;
}

pub fn estimate_duration_ms(text: &str) -> u64 {
    let words = text.split_whitespace().count() as f64;
    (words / WORDS_PER_SECOND * 1000.0).round() as u64
}

pub fn create_synthesizer(
    tts: &TtsSettings,
    llm: &LlmSettings,
) -> Result<Box<dyn SpeechSynthesizer>> {
    match tts.provider {
        TtsProvider::OpenAi => {
            let key = llm
                .openai_key()
                .context("OpenAI API key missing: set llm.openai_api_key or OPENAI_API_KEY")?;
            Ok(Box::new(openai::OpenAiSpeech::new(
                &llm.openai_base_url,
                key,
                &tts.openai_model,
                &tts.openai_voice,
            )?))
        }
        TtsProvider::ElevenLabs => {
            let key = tts
                .elevenlabs_key()
                .context("ElevenLabs API key missing: set tts.elevenlabs_api_key or ELEVENLABS_API_KEY")?;
            Ok(Box::new(elevenlabs::ElevenLabsSpeech::new(
                key,
                &tts.elevenlabs_voice_id,
                &tts.elevenlabs_model,
            )?))
        }
    }
}

/// Speak `text` into `out`, splitting it to the backend's limit and joining
/// the parts losslessly. Part files live in a temporary directory under
/// `work_dir` that is removed however this returns.
///
/// The returned duration is probed from the joined file when possible and
/// falls back to the sum of per-part durations.
pub async fn synthesize_narration(
    synthesizer: &dyn SpeechSynthesizer,
    media: &dyn MediaTool,
    text: &str,
    out: &Path,
    work_dir: &Path,
) -> Result<SpeechClip> {
    let chunks = split_for_speech(text, synthesizer.max_chars());
    if chunks.is_empty() {
        anyhow::bail!("narration text is empty");
    }

    let parts_dir = tempfile::Builder::new()
        .prefix("tts-")
        .tempdir_in(work_dir)
        .with_context(|| {
            format!("Failed to create speech work directory in {}", work_dir.display())
        })?;

    let mut parts = Vec::with_capacity(chunks.len());
    let mut estimated_ms = 0u64;
    for (i, chunk) in chunks.iter().enumerate() {
        emit(
            Level::Debug,
            "recap.tts.chunk",
            &format!(
                "{}: chunk {}/{} ({} chars)",
                synthesizer.name(),
                i + 1,
                chunks.len(),
                chunk.chars().count()
            ),
            None,
        );
        let part_path = parts_dir.path().join(format!("part_{:03}.mp3", i + 1));
        let clip = synthesizer
            .synthesize(chunk, &part_path)
            .await
            .with_context(|| {
                format!("speech synthesis failed for chunk {}/{}", i + 1, chunks.len())
            })?;
        estimated_ms += clip.duration_ms;
        parts.push(clip.path);
    }

    if parts.len() == 1 {
        tokio::fs::copy(&parts[0], out)
            .await
            .with_context(|| format!("Failed to write narration audio to {}", out.display()))?;
    } else {
        media
            .concat_audio(&parts, out, parts_dir.path())
            .await
            .context("Failed to join narration audio parts")?;
    }

    let duration_ms = match media.probe_duration(out).await {
        Ok(secs) => (secs * 1000.0).round() as u64,
        Err(err) => {
            emit(
                Level::Warn,
                "recap.tts.probe",
                &format!("Could not measure narration audio, using estimate: {}", err),
                None,
            );
            estimated_ms
        }
    };

    Ok(SpeechClip {
        path: out.to_path_buf(),
        duration_ms,
    })
}
