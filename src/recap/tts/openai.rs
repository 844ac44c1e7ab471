use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::json;
use std::path::Path;
use std::time::Duration;

use super::{SpeechClip, SpeechSynthesizer, estimate_duration_ms};

/// Per-request input ceiling of `/audio/speech`.
pub const OPENAI_MAX_CHARS: usize = 4096;

pub struct OpenAiSpeech {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    voice: String,
}

impl OpenAiSpeech {
    pub fn new(base_url: &str, api_key: String, model: &str, voice: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(180))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            voice: voice.to_string(),
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeech {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn max_chars(&self) -> usize {
        OPENAI_MAX_CHARS
    }

    async fn synthesize(&self, text: &str, out: &Path) -> Result<SpeechClip> {
        let body = json!({
            "model": self.model,
            "voice": self.voice,
            "input": text,
            "response_format": "mp3",
        });

        let resp = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
            .context("Failed to connect to OpenAI speech API")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI speech API error ({}): {}", status, text);
        }

        let audio = resp
            .bytes()
            .await
            .context("Failed to read OpenAI speech audio")?;
        tokio::fs::write(out, &audio)
            .await
            .with_context(|| format!("Failed to write speech audio to {}", out.display()))?;

        Ok(SpeechClip {
            path: out.to_path_buf(),
            duration_ms: estimate_duration_ms(text),
        })
    }
}
