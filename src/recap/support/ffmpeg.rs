use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::recap::clips::ClipSpec;
use crate::recap::config::MediaSettings;
use crate::ui::prelude::{Level, emit};

/// Lines of stderr kept when a tool fails.
const STDERR_TAIL_LINES: usize = 15;

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("failed to launch {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with status {code:?}: {stderr}")]
    ToolFailed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("could not read duration of {}: {reason}", .path.display())]
    Probe { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs an external program to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, MediaError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, MediaError> {
        emit(
            Level::Debug,
            "recap.media.exec",
            &format!("{} {}", program, args.join(" ")),
            None,
        );

        let output = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| MediaError::Spawn {
                tool: program.to_string(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            return Err(MediaError::ToolFailed {
                tool: program.to_string(),
                code: output.status.code(),
                stderr: stderr_tail(&stderr),
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// How the clips ended up joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcatMode {
    StreamCopy,
    Reencoded,
}

/// The operations the pipeline needs from a media toolkit.
#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Cut `[start, end)` of the clip's source video into `out`, copying streams.
    async fn extract_clip(&self, clip: &ClipSpec, out: &Path) -> Result<(), MediaError>;

    /// Join videos in order. Falls back to a re-encode when stream copy fails.
    async fn concatenate(
        &self,
        inputs: &[PathBuf],
        out: &Path,
        work_dir: &Path,
    ) -> Result<ConcatMode, MediaError>;

    async fn remove_audio(&self, input: &Path, out: &Path) -> Result<(), MediaError>;

    /// Put `audio` under the video stream of `video`, ending with the shorter input.
    async fn mux_audio(&self, video: &Path, audio: &Path, out: &Path) -> Result<(), MediaError>;

    /// Lossless join of audio parts that share one encoding.
    async fn concat_audio(
        &self,
        inputs: &[PathBuf],
        out: &Path,
        work_dir: &Path,
    ) -> Result<(), MediaError>;

    async fn probe_duration(&self, path: &Path) -> Result<f64, MediaError>;

    fn is_available(&self) -> bool;
}

/// [`MediaTool`] backed by the ffmpeg/ffprobe command line.
pub struct Ffmpeg<R = SystemRunner> {
    runner: R,
    settings: MediaSettings,
}

impl Ffmpeg<SystemRunner> {
    pub fn system(settings: MediaSettings) -> Self {
        Self::with_runner(SystemRunner, settings)
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Body of a concat demuxer list file. The demuxer resolves relative entries
/// against the list's own directory, so every entry is made absolute.
pub fn concat_list(inputs: &[PathBuf]) -> String {
    inputs
        .iter()
        .map(|p| {
            let absolute = std::path::absolute(p).unwrap_or_else(|_| p.clone());
            format!("file '{}'\n", path_arg(&absolute).replace('\'', r"'\''"))
        })
        .collect()
}

impl<R: CommandRunner> Ffmpeg<R> {
    pub fn with_runner(runner: R, settings: MediaSettings) -> Self {
        Self { runner, settings }
    }

    async fn ffmpeg(&self, args: Vec<String>) -> Result<CommandOutput, MediaError> {
        let mut full: Vec<String> = ["-y", "-hide_banner", "-loglevel", "error"]
            .iter()
            .map(|a| a.to_string())
            .collect();
        full.extend(args);
        self.runner.run(&self.settings.ffmpeg, &full).await
    }

    async fn write_list(
        &self,
        inputs: &[PathBuf],
        work_dir: &Path,
        name: &str,
    ) -> Result<PathBuf, MediaError> {
        let list_path = work_dir.join(name);
        tokio::fs::write(&list_path, concat_list(inputs)).await?;
        Ok(list_path)
    }

    fn concat_copy_args(list: &Path, out: &Path) -> Vec<String> {
        vec![
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            path_arg(list),
            "-c".into(),
            "copy".into(),
            path_arg(out),
        ]
    }

    fn concat_reencode_args(&self, list: &Path, out: &Path) -> Vec<String> {
        vec![
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            path_arg(list),
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            self.settings.reencode_preset.clone(),
            "-crf".into(),
            self.settings.reencode_crf.to_string(),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            self.settings.audio_bitrate.clone(),
            "-movflags".into(),
            "+faststart".into(),
            path_arg(out),
        ]
    }
}

#[async_trait]
impl<R: CommandRunner> MediaTool for Ffmpeg<R> {
    async fn extract_clip(&self, clip: &ClipSpec, out: &Path) -> Result<(), MediaError> {
        let duration = clip.end_time - clip.start_time;
        self.ffmpeg(vec![
            "-ss".into(),
            format!("{:.3}", clip.start_time),
            "-i".into(),
            path_arg(&clip.video_path),
            "-t".into(),
            format!("{:.3}", duration),
            "-map".into(),
            "0:v:0".into(),
            "-map".into(),
            "0:a:0?".into(),
            "-c".into(),
            "copy".into(),
            "-avoid_negative_ts".into(),
            "make_zero".into(),
            path_arg(out),
        ])
        .await?;
        Ok(())
    }

    async fn concatenate(
        &self,
        inputs: &[PathBuf],
        out: &Path,
        work_dir: &Path,
    ) -> Result<ConcatMode, MediaError> {
        let list = self.write_list(inputs, work_dir, "concat_video.txt").await?;

        match self.ffmpeg(Self::concat_copy_args(&list, out)).await {
            Ok(_) => Ok(ConcatMode::StreamCopy),
            Err(MediaError::ToolFailed { stderr, .. }) => {
                emit(
                    Level::Warn,
                    "recap.media.fallback",
                    &format!("Stream-copy concatenation failed, re-encoding instead: {}", stderr),
                    None,
                );
                self.ffmpeg(self.concat_reencode_args(&list, out)).await?;
                Ok(ConcatMode::Reencoded)
            }
            Err(other) => Err(other),
        }
    }

    async fn remove_audio(&self, input: &Path, out: &Path) -> Result<(), MediaError> {
        self.ffmpeg(vec![
            "-i".into(),
            path_arg(input),
            "-c:v".into(),
            "copy".into(),
            "-an".into(),
            path_arg(out),
        ])
        .await?;
        Ok(())
    }

    async fn mux_audio(&self, video: &Path, audio: &Path, out: &Path) -> Result<(), MediaError> {
        self.ffmpeg(vec![
            "-i".into(),
            path_arg(video),
            "-i".into(),
            path_arg(audio),
            "-map".into(),
            "0:v:0".into(),
            "-map".into(),
            "1:a:0".into(),
            "-c:v".into(),
            "copy".into(),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            self.settings.audio_bitrate.clone(),
            "-shortest".into(),
            path_arg(out),
        ])
        .await?;
        Ok(())
    }

    async fn concat_audio(
        &self,
        inputs: &[PathBuf],
        out: &Path,
        work_dir: &Path,
    ) -> Result<(), MediaError> {
        let list = self.write_list(inputs, work_dir, "concat_audio.txt").await?;
        self.ffmpeg(Self::concat_copy_args(&list, out)).await?;
        Ok(())
    }

    async fn probe_duration(&self, path: &Path) -> Result<f64, MediaError> {
        let args: Vec<String> = vec![
            "-v".into(),
            "error".into(),
            "-show_entries".into(),
            "format=duration".into(),
            "-of".into(),
            "default=noprint_wrappers=1:nokey=1".into(),
            path_arg(path),
        ];
        let output = self.runner.run(&self.settings.ffprobe, &args).await?;
        output
            .stdout
            .trim()
            .parse::<f64>()
            .map_err(|_| MediaError::Probe {
                path: path.to_path_buf(),
                reason: format!("unexpected ffprobe output '{}'", output.stdout.trim()),
            })
    }

    fn is_available(&self) -> bool {
        which::which(&self.settings.ffmpeg).is_ok() && which::which(&self.settings.ffprobe).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records invocations; fails any stream-copy concat when `fail_copy_concat` is set.
    #[derive(Default)]
    struct ScriptedRunner {
        calls: Mutex<Vec<(String, Vec<String>)>>,
        fail_copy_concat: bool,
        fail_everything: bool,
        probe_stdout: String,
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, MediaError> {
            self.calls
                .lock()
                .unwrap()
                .push((program.to_string(), args.to_vec()));

            let is_copy_concat = args.iter().any(|a| a == "concat")
                && args.windows(2).any(|w| w[0] == "-c" && w[1] == "copy");
            if self.fail_everything || (self.fail_copy_concat && is_copy_concat) {
                return Err(MediaError::ToolFailed {
                    tool: program.to_string(),
                    code: Some(1),
                    stderr: "Non-monotonous DTS".to_string(),
                });
            }
            Ok(CommandOutput {
                stdout: self.probe_stdout.clone(),
                stderr: String::new(),
            })
        }
    }

    fn tool(runner: ScriptedRunner) -> Ffmpeg<ScriptedRunner> {
        Ffmpeg::with_runner(runner, MediaSettings::default())
    }

    #[tokio::test]
    async fn extract_uses_stream_copy_and_clip_range() {
        let ffmpeg = tool(ScriptedRunner::default());
        let clip = ClipSpec {
            episode_id: "S01E01".into(),
            video_path: PathBuf::from("/videos/e1.mkv"),
            start_time: 10.0,
            end_time: 22.5,
            order: 1,
            moment: None,
        };
        ffmpeg.extract_clip(&clip, Path::new("/tmp/out.mp4")).await.unwrap();

        let calls = ffmpeg.runner.calls.lock().unwrap();
        let (program, args) = &calls[0];
        assert_eq!(program, "ffmpeg");
        let joined = args.join(" ");
        assert!(joined.contains("-ss 10.000 -i /videos/e1.mkv -t 12.500"));
        assert!(joined.contains("-c copy"));
        assert!(joined.ends_with("/tmp/out.mp4"));
    }

    #[tokio::test]
    async fn concat_prefers_stream_copy() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = tool(ScriptedRunner::default());
        let inputs = vec![dir.path().join("a.mp4"), dir.path().join("b.mp4")];
        let mode = ffmpeg
            .concatenate(&inputs, &dir.path().join("out.mp4"), dir.path())
            .await
            .unwrap();
        assert_eq!(mode, ConcatMode::StreamCopy);
        assert_eq!(ffmpeg.runner.calls.lock().unwrap().len(), 1);

        let list = std::fs::read_to_string(dir.path().join("concat_video.txt")).unwrap();
        assert_eq!(list.lines().count(), 2);
        assert!(list.starts_with("file '"));
    }

    #[tokio::test]
    async fn concat_falls_back_to_reencode() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = tool(ScriptedRunner {
            fail_copy_concat: true,
            ..Default::default()
        });
        let inputs = vec![dir.path().join("a.mp4")];
        let mode = ffmpeg
            .concatenate(&inputs, &dir.path().join("out.mp4"), dir.path())
            .await
            .unwrap();
        assert_eq!(mode, ConcatMode::Reencoded);

        let calls = ffmpeg.runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        let second = calls[1].1.join(" ");
        assert!(second.contains("-c:v libx264"));
        assert!(second.contains("-crf 23"));
    }

    #[tokio::test]
    async fn reencode_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = tool(ScriptedRunner {
            fail_everything: true,
            ..Default::default()
        });
        let err = ffmpeg
            .concatenate(&[dir.path().join("a.mp4")], &dir.path().join("o.mp4"), dir.path())
            .await
            .unwrap_err();
        match err {
            MediaError::ToolFailed { stderr, code, .. } => {
                assert_eq!(code, Some(1));
                assert!(stderr.contains("DTS"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(ffmpeg.runner.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn mux_keeps_video_and_trims_to_shortest() {
        let ffmpeg = tool(ScriptedRunner::default());
        ffmpeg
            .mux_audio(Path::new("v.mp4"), Path::new("a.mp3"), Path::new("o.mp4"))
            .await
            .unwrap();
        let calls = ffmpeg.runner.calls.lock().unwrap();
        let joined = calls[0].1.join(" ");
        assert!(joined.contains("-c:v copy"));
        assert!(joined.contains("-shortest"));
        assert!(joined.contains("-map 1:a:0"));
    }

    #[tokio::test]
    async fn probe_parses_seconds() {
        let ffmpeg = tool(ScriptedRunner {
            probe_stdout: "42.512000\n".into(),
            ..Default::default()
        });
        let secs = ffmpeg.probe_duration(Path::new("x.mp4")).await.unwrap();
        assert!((secs - 42.512).abs() < 1e-9);
        assert_eq!(ffmpeg.runner.calls.lock().unwrap()[0].0, "ffprobe");
    }

    #[tokio::test]
    async fn probe_rejects_garbage() {
        let ffmpeg = tool(ScriptedRunner {
            probe_stdout: "N/A".into(),
            ..Default::default()
        });
        assert!(matches!(
            ffmpeg.probe_duration(Path::new("x.mp4")).await,
            Err(MediaError::Probe { .. })
        ));
    }

    #[test]
    fn list_escapes_quotes() {
        let list = concat_list(&[PathBuf::from("/a/it's.mp4")]);
        assert_eq!(list, "file '/a/it'\\''s.mp4'\n");
    }

    #[test]
    fn tail_keeps_last_lines() {
        let text = (0..40).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let tail = stderr_tail(&text);
        assert_eq!(tail.lines().count(), STDERR_TAIL_LINES);
        assert!(tail.ends_with("line 39"));
    }
}
