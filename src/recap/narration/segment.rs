//! Narration script to subtitle cues.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::recap::srt::RawEntry;

/// Readable on-screen duration for one cue.
pub const TARGET_CHUNK_SECS: f64 = 8.0;

lazy_static! {
    static ref SENTENCE_RE: Regex = Regex::new(r"[^.!?]+[.!?]*").expect("valid sentence regex");
}

/// How a block's duration is shared between its sentences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimingAllocation {
    /// Every sentence gets the same share
    #[default]
    Uniform,
    /// Shares proportional to word count
    Weighted,
}

/// A piece of narration and how long it takes to speak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrationBlock {
    pub text: String,
    pub duration_seconds: f64,
}

/// Sentences with their terminal punctuation, empty fragments dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    SENTENCE_RE
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| s.chars().any(|c| c.is_alphanumeric()))
        .collect()
}

fn allocate(sentences: &[String], total: f64, allocation: TimingAllocation) -> Vec<f64> {
    let count = sentences.len() as f64;
    match allocation {
        TimingAllocation::Uniform => vec![total / count; sentences.len()],
        TimingAllocation::Weighted => {
            let words: Vec<usize> = sentences
                .iter()
                .map(|s| s.split_whitespace().count().max(1))
                .collect();
            let sum: usize = words.iter().sum();
            words
                .iter()
                .map(|w| total * *w as f64 / sum as f64)
                .collect()
        }
    }
}

/// Break one sentence into word groups sized for roughly eight seconds each.
fn chunk_sentence(sentence: &str, duration: f64) -> Vec<String> {
    let words: Vec<&str> = sentence.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }
    let target_chunks = ((duration / TARGET_CHUNK_SECS).ceil() as usize).max(1);
    let words_per_chunk = words.len().div_ceil(target_chunks).max(1);
    words
        .chunks(words_per_chunk)
        .map(|chunk| chunk.join(" "))
        .collect()
}

/// Cues for a single block starting at `offset`. Returns the cues and the
/// clock position after the block.
pub fn segment_block(
    text: &str,
    duration_seconds: f64,
    offset: f64,
    allocation: TimingAllocation,
) -> (Vec<RawEntry>, f64) {
    let sentences = split_sentences(text);
    if sentences.is_empty() || duration_seconds <= 0.0 {
        return (Vec::new(), offset + duration_seconds.max(0.0));
    }

    let mut entries = Vec::new();
    let mut clock = offset;

    let shares = allocate(&sentences, duration_seconds, allocation);
    for (sentence, share) in sentences.iter().zip(shares) {
        let chunks = chunk_sentence(sentence, share);
        let per_chunk = share / chunks.len() as f64;
        for chunk in chunks {
            entries.push(RawEntry {
                index: entries.len() as u32 + 1,
                start_time: clock,
                end_time: clock + per_chunk,
                text: chunk,
            });
            clock += per_chunk;
        }
    }

    (entries, offset + duration_seconds)
}

/// Cues for consecutive blocks, numbered from 1 across all of them.
pub fn segment_blocks(
    blocks: &[NarrationBlock],
    start_offset: f64,
    allocation: TimingAllocation,
) -> Vec<RawEntry> {
    let mut all = Vec::new();
    let mut clock = start_offset;
    for block in blocks {
        let (entries, next) = segment_block(&block.text, block.duration_seconds, clock, allocation);
        for mut entry in entries {
            entry.index = all.len() as u32 + 1;
            all.push(entry);
        }
        clock = next;
    }
    all
}

/// Stretch or shrink block durations so they add up to `actual_total`.
pub fn rescale_blocks(blocks: &[NarrationBlock], actual_total: f64) -> Vec<NarrationBlock> {
    let estimated: f64 = blocks.iter().map(|b| b.duration_seconds.max(0.0)).sum();
    if estimated <= 0.0 || actual_total <= 0.0 {
        let share = if blocks.is_empty() {
            0.0
        } else {
            actual_total.max(0.0) / blocks.len() as f64
        };
        return blocks
            .iter()
            .map(|b| NarrationBlock {
                text: b.text.clone(),
                duration_seconds: share,
            })
            .collect();
    }
    let factor = actual_total / estimated;
    blocks
        .iter()
        .map(|b| NarrationBlock {
            text: b.text.clone(),
            duration_seconds: b.duration_seconds.max(0.0) * factor,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentences_keep_punctuation() {
        assert_eq!(
            split_sentences("One. Two!  Three?? ... four"),
            vec!["One.", "Two!", "Three??", "four"]
        );
        assert!(split_sentences("  ... ").is_empty());
    }

    #[test]
    fn two_blocks_end_at_summed_duration() {
        let blocks = vec![
            NarrationBlock {
                text: "This is the first part of the narrative.".into(),
                duration_seconds: 10.0,
            },
            NarrationBlock {
                text: "And this is the second part.".into(),
                duration_seconds: 8.0,
            },
        ];
        let cues = segment_blocks(&blocks, 0.0, TimingAllocation::Uniform);
        assert_eq!(cues.len(), 3);
        assert_eq!(cues[0].text, "This is the first");
        assert!((cues[1].end_time - 10.0).abs() < 1e-9);
        assert!((cues.last().unwrap().end_time - 18.0).abs() < 1e-9);
        assert_eq!(cues[2].index, 3);
    }

    #[test]
    fn uniform_allocation_ignores_length() {
        let (cues, end) = segment_block(
            "Short. This sentence is a good deal longer.",
            6.0,
            2.0,
            TimingAllocation::Uniform,
        );
        assert_eq!(cues.len(), 2);
        assert!((cues[0].end_time - 5.0).abs() < 1e-9);
        assert!((end - 8.0).abs() < 1e-9);
    }

    #[test]
    fn weighted_allocation_follows_word_count() {
        let (cues, _) = segment_block(
            "One two. Three four five six seven eight.",
            8.0,
            0.0,
            TimingAllocation::Weighted,
        );
        assert_eq!(cues.len(), 2);
        assert!((cues[0].end_time - 2.0).abs() < 1e-9);
        assert!((cues[1].end_time - 8.0).abs() < 1e-9);
    }

    #[test]
    fn long_sentence_splits_into_timed_chunks() {
        let words = (1..=12).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let (cues, _) = segment_block(&words, 20.0, 0.0, TimingAllocation::Uniform);
        // ceil(20/8) = 3 chunks of 4 words
        assert_eq!(cues.len(), 3);
        assert_eq!(cues[0].text, "w1 w2 w3 w4");
        assert!((cues[1].start_time - 20.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_block_still_advances_clock() {
        let blocks = vec![
            NarrationBlock {
                text: "  ".into(),
                duration_seconds: 3.0,
            },
            NarrationBlock {
                text: "Hello.".into(),
                duration_seconds: 2.0,
            },
        ];
        let cues = segment_blocks(&blocks, 1.0, TimingAllocation::Uniform);
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].start_time, 4.0);
        assert_eq!(cues[0].index, 1);
    }

    #[test]
    fn rescaling_matches_measured_total() {
        let blocks = vec![
            NarrationBlock {
                text: "a".into(),
                duration_seconds: 4.0,
            },
            NarrationBlock {
                text: "b".into(),
                duration_seconds: 6.0,
            },
        ];
        let scaled = rescale_blocks(&blocks, 15.0);
        assert!((scaled[0].duration_seconds - 6.0).abs() < 1e-9);
        assert!((scaled[1].duration_seconds - 9.0).abs() < 1e-9);

        let zeroed = rescale_blocks(
            &[NarrationBlock {
                text: "x".into(),
                duration_seconds: 0.0,
            }],
            5.0,
        );
        assert_eq!(zeroed[0].duration_seconds, 5.0);
    }
}
