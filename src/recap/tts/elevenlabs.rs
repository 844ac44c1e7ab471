use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::json;
use std::path::Path;
use std::time::Duration;

use super::{SpeechClip, SpeechSynthesizer, estimate_duration_ms};

const BASE_URL: &str = "https://api.elevenlabs.io/v1";
pub const ELEVENLABS_MAX_CHARS: usize = 5000;

pub struct ElevenLabsSpeech {
    client: Client,
    api_key: String,
    voice_id: String,
    model: String,
}

impl ElevenLabsSpeech {
    pub fn new(api_key: String, voice_id: &str, model: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(180))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            api_key,
            voice_id: voice_id.to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSpeech {
    fn name(&self) -> &'static str {
        "elevenlabs"
    }

    fn max_chars(&self) -> usize {
        ELEVENLABS_MAX_CHARS
    }

    async fn synthesize(&self, text: &str, out: &Path) -> Result<SpeechClip> {
        let url = format!("{}/text-to-speech/{}", BASE_URL, self.voice_id);
        let resp = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header(ACCEPT, "audio/mpeg")
            .header(CONTENT_TYPE, "application/json")
            .json(&json!({
                "text": text,
                "model_id": self.model,
            }))
            .send()
            .await
            .context("Failed to connect to ElevenLabs API")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("ElevenLabs API error ({}): {}", status, text);
        }

        let audio = resp.bytes().await.context("Failed to read ElevenLabs audio")?;
        tokio::fs::write(out, &audio)
            .await
            .with_context(|| format!("Failed to write speech audio to {}", out.display()))?;

        Ok(SpeechClip {
            path: out.to_path_buf(),
            duration_ms: estimate_duration_ms(text),
        })
    }
}
