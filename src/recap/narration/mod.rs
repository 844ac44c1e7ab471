//! Narration (mode B): cue timing for the spoken script and chunking for speech synthesis.

pub mod segment;
pub mod speech;

pub use segment::{NarrationBlock, TimingAllocation, rescale_blocks, segment_blocks};
pub use speech::split_for_speech;
