//! In-memory stand-ins for the external collaborators, shared by unit tests.

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::clips::ClipSpec;
use super::llm::{MomentRequest, MomentSelection, NarrationRequest, NarrationScript, StoryAnalyzer};
use super::support::ffmpeg::{ConcatMode, MediaError, MediaTool};
use super::tts::{SpeechClip, SpeechSynthesizer, estimate_duration_ms};

fn touch(path: &Path) -> Result<(), MediaError> {
    std::fs::write(path, b"media")?;
    Ok(())
}

/// Media tool that writes placeholder files and records every call.
pub struct FakeMedia {
    pub calls: Mutex<Vec<String>>,
    /// Duration reported by `probe_duration`; `None` makes probing fail
    pub probe_secs: Option<f64>,
    /// 1-based extraction that fails
    pub fail_extract_at: Option<usize>,
    pub reencode: bool,
}

impl Default for FakeMedia {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            probe_secs: Some(10.0),
            fail_extract_at: None,
            reencode: false,
        }
    }
}

impl FakeMedia {
    fn record(&self, name: &str) -> usize {
        let mut calls = self.calls.lock().unwrap();
        calls.push(name.to_string());
        calls.iter().filter(|c| *c == name).count()
    }

    pub fn calls_named(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == name).count()
    }
}

#[async_trait]
impl MediaTool for FakeMedia {
    async fn extract_clip(&self, _clip: &ClipSpec, out: &Path) -> Result<(), MediaError> {
        let n = self.record("extract_clip");
        if self.fail_extract_at == Some(n) {
            return Err(MediaError::ToolFailed {
                tool: "ffmpeg".into(),
                code: Some(1),
                stderr: "Invalid data found when processing input".into(),
            });
        }
        touch(out)
    }

    async fn concatenate(
        &self,
        _inputs: &[PathBuf],
        out: &Path,
        _work_dir: &Path,
    ) -> Result<ConcatMode, MediaError> {
        self.record("concatenate");
        touch(out)?;
        Ok(if self.reencode {
            ConcatMode::Reencoded
        } else {
            ConcatMode::StreamCopy
        })
    }

    async fn remove_audio(&self, _input: &Path, out: &Path) -> Result<(), MediaError> {
        self.record("remove_audio");
        touch(out)
    }

    async fn mux_audio(&self, _video: &Path, _audio: &Path, out: &Path) -> Result<(), MediaError> {
        self.record("mux_audio");
        touch(out)
    }

    async fn concat_audio(
        &self,
        _inputs: &[PathBuf],
        out: &Path,
        _work_dir: &Path,
    ) -> Result<(), MediaError> {
        self.record("concat_audio");
        touch(out)
    }

    async fn probe_duration(&self, path: &Path) -> Result<f64, MediaError> {
        self.record("probe_duration");
        self.probe_secs.ok_or_else(|| MediaError::Probe {
            path: path.to_path_buf(),
            reason: "no duration".into(),
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}

pub struct FakeSynth {
    pub max_chars: usize,
    /// 1-based call that fails
    pub fail_on_call: Option<usize>,
    pub count: AtomicUsize,
}

impl FakeSynth {
    pub fn with_limit(max_chars: usize) -> Self {
        Self {
            max_chars,
            fail_on_call: None,
            count: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSynth {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn max_chars(&self) -> usize {
        self.max_chars
    }

    async fn synthesize(&self, text: &str, out: &Path) -> Result<SpeechClip> {
        let n = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_call == Some(n) {
            anyhow::bail!("voice service rejected the request");
        }
        std::fs::write(out, text.as_bytes())?;
        Ok(SpeechClip {
            path: out.to_path_buf(),
            duration_ms: estimate_duration_ms(text),
        })
    }
}

/// Analyzer returning canned answers.
pub struct FakeAnalyzer {
    pub selection: MomentSelection,
    pub script: NarrationScript,
    pub fail_selection: bool,
    pub panic_selection: bool,
    pub narration_requests: Mutex<Vec<NarrationRequest>>,
}

impl FakeAnalyzer {
    pub fn new(selection: MomentSelection, script: NarrationScript) -> Self {
        Self {
            selection,
            script,
            fail_selection: false,
            panic_selection: false,
            narration_requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl StoryAnalyzer for FakeAnalyzer {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn select_moments(&self, _request: &MomentRequest) -> Result<MomentSelection> {
        if self.panic_selection {
            panic!("analyzer crashed");
        }
        if self.fail_selection {
            anyhow::bail!("model unavailable");
        }
        Ok(self.selection.clone())
    }

    async fn generate_narration(&self, request: &NarrationRequest) -> Result<NarrationScript> {
        self.narration_requests.lock().unwrap().push(request.clone());
        Ok(self.script.clone())
    }

    async fn check_connection(&self) -> Result<()> {
        Ok(())
    }
}
