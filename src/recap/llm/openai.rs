//! OpenAI-compatible chat completions. Also serves Ollama through its `/v1` endpoint.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::types::ChatBackend;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

pub struct OpenAiChat {
    client: Client,
    name: &'static str,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiChat {
    pub fn new(
        name: &'static str,
        base_url: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            name,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl ChatBackend for OpenAiChat {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.4,
            stream: false,
        };

        let mut builder = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", key));
        }

        let resp = builder
            .send()
            .await
            .with_context(|| format!("Failed to connect to {} at {}", self.name, self.base_url))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("{} API error ({}): {}", self.name, status, text);
        }

        let body: ChatResponse = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", self.name))?;

        let text: String = body
            .choices
            .into_iter()
            .filter_map(|c| c.message.content)
            .collect();
        if text.trim().is_empty() {
            anyhow::bail!("{} returned an empty response", self.name);
        }
        Ok(text)
    }
}
