use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::recap::clips::KeyMoment;
use crate::recap::jobs::Mode;
use crate::recap::narration::NarrationBlock;

/// Four-part story arc returned alongside the selected moments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrativeOutline {
    pub intro: String,
    pub development: String,
    pub climax: String,
    pub resolution: String,
}

#[derive(Debug, Clone)]
pub struct MomentRequest {
    pub series_name: String,
    pub season: u32,
    pub language: String,
    pub mode: Mode,
    pub target_length_secs: u32,
    /// Rendered season dialogue
    pub season_text: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MomentSelection {
    pub moments: Vec<KeyMoment>,
    pub outline: NarrativeOutline,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NarrationRequest {
    pub series_name: String,
    pub season: u32,
    pub language: String,
    pub moments: Vec<KeyMoment>,
    pub outline: NarrativeOutline,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NarrationScript {
    pub narrative: String,
    /// One block per moment, in moment order
    pub blocks: Vec<NarrationBlock>,
}

/// The story-analysis collaborator: picks moments and writes narration.
#[async_trait]
pub trait StoryAnalyzer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn select_moments(&self, request: &MomentRequest) -> Result<MomentSelection>;

    async fn generate_narration(&self, request: &NarrationRequest) -> Result<NarrationScript>;

    /// Cheap round trip proving credentials and endpoint work
    async fn check_connection(&self) -> Result<()>;
}

/// Raw text completion against one provider's API.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}
