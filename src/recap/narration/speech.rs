//! Splitting narration into pieces a speech backend accepts in one call.
//!
//! Preference order: whole sentences, then comma-separated clauses, then
//! plain word packing, and finally a hard character cut for a single word
//! that is longer than the limit.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref SPEECH_SENTENCE_RE: Regex =
        Regex::new(r"[^.!?]+(?:[.!?]+|$)").expect("valid speech sentence regex");
    static ref CLAUSE_RE: Regex = Regex::new(r"[^,;]+(?:[,;]|$)").expect("valid clause regex");
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Greedily joins `pieces` with spaces while staying within `max_chars`.
struct Packer {
    max_chars: usize,
    chunks: Vec<String>,
    current: String,
}

impl Packer {
    fn new(max_chars: usize) -> Self {
        Self {
            max_chars,
            chunks: Vec::new(),
            current: String::new(),
        }
    }

    fn push(&mut self, piece: &str) {
        let piece = piece.trim();
        if piece.is_empty() {
            return;
        }
        let needed = if self.current.is_empty() {
            char_len(piece)
        } else {
            char_len(&self.current) + 1 + char_len(piece)
        };
        if needed > self.max_chars {
            self.flush();
        }
        if !self.current.is_empty() {
            self.current.push(' ');
        }
        self.current.push_str(piece);
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            self.chunks.push(std::mem::take(&mut self.current));
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.chunks
    }
}

fn hard_split(word: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    chars
        .chunks(max_chars)
        .map(|c| c.iter().collect())
        .collect()
}

/// Pieces of `text` no longer than `max_chars`, each at the best boundary available.
fn pieces_within(text: &str, max_chars: usize, depth: usize) -> Vec<String> {
    let text = text.trim();
    if char_len(text) <= max_chars {
        return vec![text.to_string()];
    }

    let units: Vec<&str> = match depth {
        0 => SPEECH_SENTENCE_RE.find_iter(text).map(|m| m.as_str()).collect(),
        1 => CLAUSE_RE.find_iter(text).map(|m| m.as_str()).collect(),
        2 => text.split_whitespace().collect(),
        _ => return hard_split(text, max_chars),
    };

    let mut out = Vec::new();
    for unit in units {
        let unit = unit.trim();
        if unit.is_empty() {
            continue;
        }
        if char_len(unit) <= max_chars {
            out.push(unit.to_string());
        } else {
            out.extend(pieces_within(unit, max_chars, depth + 1));
        }
    }
    out
}

/// Split `text` into chunks of at most `max_chars` characters for speech synthesis.
pub fn split_for_speech(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut packer = Packer::new(max_chars);
    for piece in pieces_within(text, max_chars, 0) {
        packer.push(&piece);
    }
    packer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_for_speech("Hello there. Bye.", 100), vec!["Hello there. Bye."]);
        assert!(split_for_speech("   ", 100).is_empty());
    }

    #[test]
    fn packs_whole_sentences() {
        let text = "One two three. Four five six. Seven eight nine.";
        let chunks = split_for_speech(text, 30);
        assert_eq!(chunks, vec!["One two three. Four five six.", "Seven eight nine."]);
    }

    #[test]
    fn long_sentence_falls_back_to_commas() {
        let text = "Alpha beta gamma, delta epsilon zeta, eta theta iota.";
        let chunks = split_for_speech(text, 20);
        assert_eq!(chunks, vec!["Alpha beta gamma,", "delta epsilon zeta,", "eta theta iota."]);
    }

    #[test]
    fn no_punctuation_packs_words() {
        let text = "aaaa bbbb cccc dddd eeee";
        let chunks = split_for_speech(text, 10);
        assert_eq!(chunks, vec!["aaaa bbbb", "cccc dddd", "eeee"]);
    }

    #[test]
    fn oversized_word_is_cut() {
        let chunks = split_for_speech("abcdefghij", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn every_chunk_respects_limit() {
        let text = "Réunion à l'été, très long texte sans fin; encore des mots ici. Puis une autre phrase! Et la fin?";
        for limit in [5, 12, 25, 60] {
            for chunk in split_for_speech(text, limit) {
                assert!(chunk.chars().count() <= limit, "{chunk:?} > {limit}");
            }
        }
    }
}
