use clap::{Args, Subcommand, ValueHint};
use std::path::PathBuf;

use super::jobs::Mode;
use super::llm::LlmProvider;

#[derive(Subcommand, Debug, Clone)]
pub enum RecapCommands {
    /// Create, run and inspect recap jobs
    #[command(subcommand)]
    Job(JobCommands),
    /// Inspect subtitle files without creating a job
    #[command(subcommand)]
    Srt(SrtCommands),
    /// Check that ffmpeg and the configured model provider are reachable
    Check(CheckArgs),
}

#[derive(Subcommand, Debug, Clone)]
pub enum JobCommands {
    /// Register a new job from subtitle and video files
    Create(CreateArgs),
    /// Run one or more pending jobs
    Start(StartArgs),
    /// Show the progress and log of a job
    Status(StatusArgs),
    /// List all jobs, newest first
    List,
    /// Show (and optionally copy) the artifacts of a completed job
    Outputs(OutputsArgs),
    /// Return a failed job to pending so it can be started again
    Reset(JobIdArgs),
    /// Delete a job together with its uploads and outputs
    Delete(JobIdArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CreateArgs {
    /// Series title used in prompts and narration
    #[arg(long)]
    pub series: String,

    /// Season number
    #[arg(long)]
    pub season: u32,

    /// Language of the subtitles and the narration
    #[arg(long, default_value = "en")]
    pub language: String,

    /// a: original audio with remapped subtitles, b: muted video with narration
    #[arg(long, value_enum, default_value_t = Mode::A)]
    pub mode: Mode,

    /// Desired recap length in seconds
    #[arg(long = "target-length", default_value_t = 300)]
    pub target_length: u32,

    /// Model provider used for moment selection and narration
    #[arg(long = "llm", value_enum, default_value_t = LlmProvider::OpenAi)]
    pub llm: LlmProvider,

    /// Subtitle files (.srt), one per episode
    #[arg(long = "srt", required = true, num_args = 1.., value_hint = ValueHint::FilePath)]
    pub srt: Vec<PathBuf>,

    /// Episode video files
    #[arg(long = "video", required = true, num_args = 1.., value_hint = ValueHint::FilePath)]
    pub video: Vec<PathBuf>,

    /// Reference the files in place instead of copying them into the data directory
    #[arg(long)]
    pub link: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StartArgs {
    /// Job ids to run concurrently
    #[arg(required = true)]
    pub ids: Vec<String>,

    /// Do not draw progress bars while the jobs run
    #[arg(long)]
    pub no_watch: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    pub id: String,

    /// Print the full job log
    #[arg(long)]
    pub logs: bool,

    /// Print the planned clips from the job's clip manifest
    #[arg(long)]
    pub clips: bool,
}

#[derive(Args, Debug, Clone)]
pub struct OutputsArgs {
    pub id: String,

    /// Copy every artifact into this directory
    #[arg(long = "copy-to", value_hint = ValueHint::DirPath)]
    pub copy_to: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct JobIdArgs {
    pub id: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SrtCommands {
    /// Parse subtitle files and report entry counts
    Check(SrtFilesArgs),
    /// Print the episode id inferred from each file name (`-` when none)
    Episode(EpisodeArgs),
    /// Print the season text that would be sent for analysis
    Timeline(TimelineArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SrtFilesArgs {
    /// Subtitle files to parse
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    pub files: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct EpisodeArgs {
    /// File names to resolve
    #[arg(required = true)]
    pub names: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct TimelineArgs {
    #[arg(long)]
    pub series: String,

    #[arg(long)]
    pub season: u32,

    #[arg(long, default_value = "en")]
    pub language: String,

    /// Per-episode character budget (0 disables truncation); defaults to the config value
    #[arg(long = "max-chars")]
    pub max_chars: Option<usize>,

    /// Subtitle files, one per episode
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    pub files: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// Provider whose connection should be tested
    #[arg(long = "llm", value_enum, default_value_t = LlmProvider::OpenAi)]
    pub llm: LlmProvider,

    /// Only check the media tools
    #[arg(long)]
    pub skip_llm: bool,
}
