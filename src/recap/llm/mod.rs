//! Story analysis backed by a language model.
//!
//! Every provider reduces to a [`ChatBackend`] (one text completion). The
//! shared [`ModelAnalyzer`] builds prompts, parses replies and retries, so an
//! unparseable reply costs an attempt just like a transport failure.

pub mod anthropic;
pub mod openai;
pub mod prompts;
pub mod retry;
mod types;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub use retry::{RetryPolicy, retry_with_backoff};
pub use types::{
    ChatBackend, MomentRequest, MomentSelection, NarrationRequest, NarrationScript,
    NarrativeOutline, StoryAnalyzer,
};

use super::config::LlmSettings;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    #[value(name = "openai")]
    OpenAi,
    Anthropic,
    Ollama,
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmProvider::OpenAi => write!(f, "openai"),
            LlmProvider::Anthropic => write!(f, "anthropic"),
            LlmProvider::Ollama => write!(f, "ollama"),
        }
    }
}

pub struct ModelAnalyzer<B> {
    backend: B,
    policy: RetryPolicy,
}

impl<B: ChatBackend> ModelAnalyzer<B> {
    pub fn new(backend: B, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }
}

#[async_trait]
impl<B: ChatBackend> StoryAnalyzer for ModelAnalyzer<B> {
    fn name(&self) -> &'static str {
        self.backend.name()
    }

    async fn select_moments(&self, request: &MomentRequest) -> Result<MomentSelection> {
        let prompt = prompts::moment_prompt(request);
        let (backend, prompt) = (&self.backend, prompt.as_str());
        retry_with_backoff(self.policy, "moment selection", move |_| async move {
            let reply = backend
                .complete(prompts::MOMENT_SYSTEM_PROMPT, prompt)
                .await?;
            prompts::parse_moment_selection(&reply)
        })
        .await
    }

    async fn generate_narration(&self, request: &NarrationRequest) -> Result<NarrationScript> {
        let prompt = prompts::narration_prompt(request);
        let (backend, prompt) = (&self.backend, prompt.as_str());
        retry_with_backoff(self.policy, "narration generation", move |_| async move {
            let reply = backend
                .complete(prompts::NARRATION_SYSTEM_PROMPT, prompt)
                .await?;
            prompts::parse_narration(&reply)
        })
        .await
    }

    async fn check_connection(&self) -> Result<()> {
        self.backend
            .complete("You are a health check.", "Reply with the single word OK.")
            .await
            .with_context(|| format!("{} is not reachable", self.backend.name()))?;
        Ok(())
    }
}

/// Create an analyzer for the given provider
pub fn create_analyzer(
    provider: LlmProvider,
    settings: &LlmSettings,
) -> Result<Box<dyn StoryAnalyzer>> {
    let policy = RetryPolicy::from_settings(settings);
    let timeout = Duration::from_secs(settings.timeout_secs.max(1));

    let analyzer: Box<dyn StoryAnalyzer> = match provider {
        LlmProvider::OpenAi => {
            let key = settings
                .openai_key()
                .context("OpenAI API key missing: set llm.openai_api_key or OPENAI_API_KEY")?;
            Box::new(ModelAnalyzer::new(
                openai::OpenAiChat::new(
                    "openai",
                    &settings.openai_base_url,
                    &settings.openai_model,
                    Some(key),
                    timeout,
                )?,
                policy,
            ))
        }
        LlmProvider::Ollama => Box::new(ModelAnalyzer::new(
            openai::OpenAiChat::new(
                "ollama",
                &format!("{}/v1", settings.ollama_url.trim_end_matches('/')),
                &settings.ollama_model,
                None,
                timeout,
            )?,
            policy,
        )),
        LlmProvider::Anthropic => {
            let key = settings
                .anthropic_key()
                .context("Anthropic API key missing: set llm.anthropic_api_key or ANTHROPIC_API_KEY")?;
            Box::new(ModelAnalyzer::new(
                anthropic::AnthropicChat::new(&settings.anthropic_model, key, timeout)?,
                policy,
            ))
        }
    };
    Ok(analyzer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recap::jobs::Mode;
    use std::sync::Mutex;

    struct ScriptedChat {
        replies: Mutex<Vec<Result<String>>>,
    }

    impl ScriptedChat {
        fn new(replies: Vec<Result<String>>) -> Self {
            let mut replies = replies;
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
            }
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedChat {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(anyhow::anyhow!("script exhausted")))
        }
    }

    fn instant_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::ZERO,
        }
    }

    fn request() -> MomentRequest {
        MomentRequest {
            series_name: "Show".into(),
            season: 1,
            language: "en".into(),
            mode: Mode::A,
            target_length_secs: 120,
            season_text: String::new(),
        }
    }

    #[tokio::test]
    async fn malformed_reply_consumes_an_attempt() {
        let analyzer = ModelAnalyzer::new(
            ScriptedChat::new(vec![
                Ok("not json at all".into()),
                Err(anyhow::anyhow!("HTTP 503")),
                Ok(r#"{"moments": [{"episodeId": "S01E01", "startTime": 1, "endTime": 4}]}"#.into()),
            ]),
            instant_policy(),
        );
        let selection = analyzer.select_moments(&request()).await.unwrap();
        assert_eq!(selection.moments.len(), 1);
    }

    #[tokio::test]
    async fn exhausted_attempts_surface_error() {
        let analyzer = ModelAnalyzer::new(
            ScriptedChat::new(vec![Ok("{".into()), Ok("{".into()), Ok("{".into())]),
            instant_policy(),
        );
        let err = analyzer.select_moments(&request()).await.unwrap_err();
        assert!(format!("{err:#}").contains("after 3 attempts"));
    }

    #[test]
    fn missing_key_is_reported() {
        let settings = LlmSettings {
            anthropic_api_key: Some("  ".into()),
            ..Default::default()
        };
        // Only meaningful when the environment does not provide a key either
        if std::env::var("ANTHROPIC_API_KEY").is_err() {
            assert!(create_analyzer(LlmProvider::Anthropic, &settings).is_err());
        }
        assert!(create_analyzer(LlmProvider::Ollama, &settings).is_ok());
    }
}
