//! Season recap builder: subtitles and episode videos in, a condensed recap out.

pub mod cli;
pub mod clips;
pub mod commands;
pub mod config;
pub mod episode;
pub mod jobs;
pub mod llm;
pub mod narration;
pub mod pipeline;
pub mod remap;
pub mod season;
pub mod srt;
pub mod support;
pub mod tts;

#[cfg(test)]
pub mod testing;

pub use cli::RecapCommands;
pub use commands::handle_recap_command;
