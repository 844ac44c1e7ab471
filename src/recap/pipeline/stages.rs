use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::logging::job_log;
use super::{
    CLIPS_MANIFEST, NARRATION_AUDIO, NARRATION_SRT, Orchestrator, RECAP_SRT, RECAP_VIDEO,
};
use crate::recap::clips::{ClipSpec, KeyMoment, plan_clips, total_duration, write_manifest};
use crate::recap::episode::{resolve_episode_id, resolve_with_fallback, split_episode_id};
use crate::recap::jobs::{Job, JobError, JobFile, LogLevel, Mode};
use crate::recap::llm::{MomentRequest, NarrationRequest, NarrationScript, StoryAnalyzer};
use crate::recap::narration::{NarrationBlock, rescale_blocks, segment_blocks};
use crate::recap::remap::remap_subtitles;
use crate::recap::season::{EpisodeSubtitles, SeasonSubtitles, build_season, render_for_analysis};
use crate::recap::srt::{SubtitleEntry, attach_episode, generate_srt, parse_srt};
use crate::recap::support::ffmpeg::ConcatMode;
use crate::recap::support::utils::{
    SUBTITLE_EXTENSIONS, VIDEO_EXTENSIONS, has_extension, read_text_lossy,
};
use crate::recap::tts::{SpeechClip, synthesize_narration};

/// Parsed subtitles plus the video file for each episode id.
pub(super) struct ParsedInputs {
    pub season: SeasonSubtitles,
    pub videos: HashMap<String, PathBuf>,
}

pub(super) struct Narration {
    pub script: NarrationScript,
    pub audio: SpeechClip,
}

fn sorted_by_name(files: &[JobFile]) -> Vec<JobFile> {
    let mut files = files.to_vec();
    files.sort_by(|a, b| a.original_name.cmp(&b.original_name));
    files
}

fn percent(done: usize, total: usize, span: f64) -> f64 {
    if total == 0 {
        span
    } else {
        done as f64 / total as f64 * span
    }
}

impl Orchestrator {
    pub(super) async fn validate(&self, job: &mut Job) -> Result<()> {
        job_log(job, LogLevel::Info, "recap.pipeline.stage", "Validating uploads");

        if job.srt_files.is_empty() {
            anyhow::bail!("no subtitle files were uploaded");
        }
        if job.video_files.is_empty() {
            anyhow::bail!("no video files were uploaded");
        }

        let checks = [
            ("subtitle", &job.srt_files, SUBTITLE_EXTENSIONS),
            ("video", &job.video_files, VIDEO_EXTENSIONS),
        ];
        for (kind, files, allowed) in checks {
            for file in files.iter() {
                if !has_extension(Path::new(&file.original_name), allowed) {
                    return Err(JobError::UnsupportedUpload {
                        kind,
                        file: file.original_name.clone(),
                        expected: allowed.join(", "),
                    }
                    .into());
                }
                if !file.path.is_file() {
                    anyhow::bail!("{} file {} not found", kind, file.path.display());
                }
            }
        }

        job.set_stage_progress(100.0, "Uploads validated");
        self.persist(job).await
    }

    pub(super) async fn parse(&self, job: &mut Job) -> Result<ParsedInputs> {
        let season = job.config.season;

        let videos = sorted_by_name(&job.video_files);
        let video_names: Vec<String> = videos.iter().map(|f| f.original_name.clone()).collect();
        let mut video_paths: HashMap<String, PathBuf> = HashMap::new();
        let mut video_names_by_id: HashMap<String, String> = HashMap::new();
        for (file, id) in videos.iter().zip(resolve_with_fallback(&video_names, season)) {
            if video_paths.contains_key(&id) {
                job_log(
                    job,
                    LogLevel::Warn,
                    "recap.pipeline.video",
                    format!("{} also resolves to {}; ignoring it", file.original_name, id),
                );
                continue;
            }
            video_names_by_id.insert(id.clone(), file.original_name.clone());
            video_paths.insert(id, file.path.clone());
        }

        let srt_files = sorted_by_name(&job.srt_files);
        let srt_names: Vec<String> = srt_files.iter().map(|f| f.original_name.clone()).collect();
        let ids = resolve_with_fallback(&srt_names, season);
        let total = srt_files.len();
        let mut episodes = Vec::with_capacity(total);
        let mut subtitle_names_by_id: HashMap<String, String> = HashMap::new();

        for (pos, (file, id)) in srt_files.iter().zip(ids).enumerate() {
            let content = read_text_lossy(&file.path).await?;
            let parsed = parse_srt(&content);

            if parsed.skipped > 0 {
                job_log(
                    job,
                    LogLevel::Warn,
                    "recap.pipeline.srt",
                    format!(
                        "{}: skipped {} malformed block(s)",
                        file.original_name, parsed.skipped
                    ),
                );
            }
            if resolve_episode_id(&file.original_name).is_none() {
                job_log(
                    job,
                    LogLevel::Warn,
                    "recap.pipeline.episode",
                    format!("{} has no episode marker; treating it as {}", file.original_name, id),
                );
            }

            if let Some(first) = subtitle_names_by_id.get(&id) {
                job_log(
                    job,
                    LogLevel::Warn,
                    "recap.pipeline.episode",
                    format!(
                        "{} also resolves to {} ({}); their cues are merged",
                        file.original_name, id, first
                    ),
                );
            } else {
                subtitle_names_by_id.insert(id.clone(), file.original_name.clone());
            }

            let video_file_name = video_names_by_id.get(&id).cloned();
            if video_file_name.is_none() {
                job_log(
                    job,
                    LogLevel::Warn,
                    "recap.pipeline.episode",
                    format!("No video file matches {} ({})", id, file.original_name),
                );
            }

            let episode_number = split_episode_id(&id)
                .map(|(_, episode)| episode)
                .unwrap_or(pos as u32 + 1);
            let entries = attach_episode(parsed.entries, &id);

            episodes.push(EpisodeSubtitles {
                episode_id: id,
                episode_number,
                video_file_name,
                entries,
            });

            job.set_stage_progress(
                percent(pos + 1, total, 100.0),
                format!("Parsed {}", file.original_name),
            );
            self.persist(job).await?;
        }

        let season_subtitles = build_season(
            episodes,
            &job.config.series_name,
            season,
            &job.config.language,
        );
        if season_subtitles.total_entries == 0 {
            anyhow::bail!("no subtitle entries could be parsed from {} file(s)", total);
        }

        job_log(
            job,
            LogLevel::Info,
            "recap.pipeline.srt",
            format!(
                "Parsed {} subtitle entries across {} episode(s)",
                season_subtitles.total_entries,
                season_subtitles.episodes.len()
            ),
        );
        self.persist(job).await?;

        Ok(ParsedInputs {
            season: season_subtitles,
            videos: video_paths,
        })
    }

    pub(super) async fn analyze(
        &self,
        job: &mut Job,
        inputs: &ParsedInputs,
    ) -> Result<Arc<dyn StoryAnalyzer>> {
        let analyzer = self.collaborators.analyzer(job.config.llm_provider)?;

        let budget = self.settings.max_chars_per_episode;
        let season_text = render_for_analysis(&inputs.season, (budget > 0).then_some(budget));
        job.set_stage_progress(10.0, format!("Asking {} for key moments", analyzer.name()));
        self.persist(job).await?;

        let request = MomentRequest {
            series_name: job.config.series_name.clone(),
            season: job.config.season,
            language: job.config.language.clone(),
            mode: job.config.mode,
            target_length_secs: job.config.target_length,
            season_text,
        };
        let selection = analyzer
            .select_moments(&request)
            .await
            .context("moment selection failed")?;

        if selection.moments.is_empty() {
            anyhow::bail!("the analysis returned no usable moments");
        }

        let selected_secs: f64 = selection.moments.iter().map(KeyMoment::duration).sum();
        job_log(
            job,
            LogLevel::Info,
            "recap.pipeline.analysis",
            format!(
                "{} moments selected ({:.1}s of {}s target)",
                selection.moments.len(),
                selected_secs,
                job.config.target_length
            ),
        );
        if let Some(notes) = &selection.notes {
            job_log(job, LogLevel::Info, "recap.pipeline.analysis", format!("Notes: {}", notes));
        }

        job.key_moments = Some(selection.moments);
        job.narrative_outline = Some(selection.outline);
        job.set_stage_progress(100.0, "Key moments selected");
        self.persist(job).await?;
        Ok(analyzer)
    }

    pub(super) async fn generate_clips(
        &self,
        job: &mut Job,
        inputs: &ParsedInputs,
    ) -> Result<Vec<ClipSpec>> {
        let moments = job.key_moments.clone().unwrap_or_default();
        let plan = plan_clips(&moments, &inputs.videos);

        for (moment, reason) in &plan.rejected {
            job_log(
                job,
                LogLevel::Warn,
                "recap.pipeline.clips",
                format!(
                    "Skipping moment {} {:.1}-{:.1}: {}",
                    moment.episode_id, moment.start_time, moment.end_time, reason
                ),
            );
        }
        if plan.clips.is_empty() {
            anyhow::bail!(
                "none of the {} selected moments could be turned into clips",
                moments.len()
            );
        }

        let (manifest_path, relative) = self.dirs.output_file(&job.id, CLIPS_MANIFEST);
        write_manifest(&manifest_path, &plan.clips).await?;
        job.outputs.clips_json_path = Some(relative);

        job_log(
            job,
            LogLevel::Info,
            "recap.pipeline.clips",
            format!(
                "{} clips planned, {:.1}s in total",
                plan.clips.len(),
                total_duration(&plan.clips)
            ),
        );
        job.set_stage_progress(100.0, "Clip manifest written");
        self.persist(job).await?;
        Ok(plan.clips)
    }

    /// Extract and join the clips. Returns the video later stages build on:
    /// the published recap in mode A, a muted work copy in mode B.
    pub(super) async fn process_video(
        &self,
        job: &mut Job,
        clips: &[ClipSpec],
        work_dir: &Path,
    ) -> Result<PathBuf> {
        let clip_dir = tempfile::Builder::new()
            .prefix("clips-")
            .tempdir_in(work_dir)
            .context("Failed to create clip work directory")?;

        let mut clip_paths = Vec::with_capacity(clips.len());
        for (i, clip) in clips.iter().enumerate() {
            let out = clip_dir.path().join(format!("clip_{:03}.mp4", clip.order));
            self.media.extract_clip(clip, &out).await.with_context(|| {
                format!(
                    "extracting clip {} ({} {:.1}-{:.1}) from {}",
                    clip.order,
                    clip.episode_id,
                    clip.start_time,
                    clip.end_time,
                    clip.video_path.display()
                )
            })?;
            clip_paths.push(out);
            job.set_stage_progress(
                percent(i + 1, clips.len(), 80.0),
                format!("Extracted clip {}/{}", i + 1, clips.len()),
            );
            self.persist(job).await?;
        }

        let (recap_path, recap_relative) = self.dirs.output_file(&job.id, RECAP_VIDEO);
        let joined = match job.config.mode {
            Mode::A => recap_path.clone(),
            Mode::B => work_dir.join("joined.mp4"),
        };

        let concat_mode = self
            .media
            .concatenate(&clip_paths, &joined, clip_dir.path())
            .await
            .context("concatenating clips")?;
        if concat_mode == ConcatMode::Reencoded {
            job_log(
                job,
                LogLevel::Warn,
                "recap.pipeline.video",
                "Clips had mismatched encodings and were re-encoded",
            );
        }
        job.set_stage_progress(90.0, "Clips joined");
        self.persist(job).await?;

        self.check_duration(job, &joined, total_duration(clips)).await;

        let result = match job.config.mode {
            Mode::A => {
                job.outputs.video_path = Some(recap_relative);
                recap_path
            }
            Mode::B => {
                let muted = work_dir.join("muted.mp4");
                self.media
                    .remove_audio(&joined, &muted)
                    .await
                    .context("removing original audio")?;
                muted
            }
        };

        clip_dir
            .close()
            .context("Failed to remove extracted clips")?;
        job.set_stage_progress(100.0, "Video assembled");
        self.persist(job).await?;
        Ok(result)
    }

    async fn check_duration(&self, job: &mut Job, video: &Path, expected: f64) {
        match self.media.probe_duration(video).await {
            Ok(actual) => {
                let drift = (actual - expected).abs();
                if drift > self.settings.duration_tolerance_secs {
                    job_log(
                        job,
                        LogLevel::Warn,
                        "recap.pipeline.duration",
                        format!(
                            "Joined video is {:.2}s but clips add up to {:.2}s; subtitles may drift",
                            actual, expected
                        ),
                    );
                }
            }
            Err(err) => job_log(
                job,
                LogLevel::Warn,
                "recap.pipeline.duration",
                format!("Could not verify joined video duration: {}", err),
            ),
        }
    }

    pub(super) async fn generate_subtitles(
        &self,
        job: &mut Job,
        inputs: &ParsedInputs,
        clips: &[ClipSpec],
    ) -> Result<()> {
        let mut by_episode: HashMap<String, Vec<SubtitleEntry>> = HashMap::new();
        for episode in &inputs.season.episodes {
            by_episode
                .entry(episode.episode_id.clone())
                .or_default()
                .extend(episode.entries.iter().cloned());
        }

        let remapped = remap_subtitles(
            clips,
            &by_episode,
            self.settings.boundary,
            self.settings.min_overlap_ratio,
        );

        let (srt_path, relative) = self.dirs.output_file(&job.id, RECAP_SRT);
        tokio::fs::write(&srt_path, generate_srt(&remapped.subtitles))
            .await
            .with_context(|| format!("writing {}", srt_path.display()))?;
        job.outputs.srt_path = Some(relative);

        if remapped.subtitles.is_empty() {
            job_log(
                job,
                LogLevel::Warn,
                "recap.pipeline.srt",
                "No subtitle lines fit inside the selected clips",
            );
        }
        job_log(
            job,
            LogLevel::Info,
            "recap.pipeline.srt",
            format!(
                "{} subtitles remapped onto a {:.1}s timeline",
                remapped.subtitles.len(),
                remapped.total_duration
            ),
        );
        job.set_stage_progress(100.0, "Subtitles written");
        self.persist(job).await
    }

    /// Narration text and speech. `None` when the analysis produced no narration.
    pub(super) async fn narrate(
        &self,
        job: &mut Job,
        analyzer: &dyn StoryAnalyzer,
        clips: &[ClipSpec],
        work_dir: &Path,
    ) -> Result<Option<Narration>> {
        job.set_stage_progress(5.0, "Writing narration");
        self.persist(job).await?;

        let request = NarrationRequest {
            series_name: job.config.series_name.clone(),
            season: job.config.season,
            language: job.config.language.clone(),
            moments: clips.iter().filter_map(|c| c.moment.clone()).collect(),
            outline: job.narrative_outline.clone().unwrap_or_default(),
        };
        let script = analyzer
            .generate_narration(&request)
            .await
            .context("narration generation failed")?;

        if script.narrative.trim().is_empty() {
            job_log(
                job,
                LogLevel::Warn,
                "recap.pipeline.narration",
                "The analysis returned no narration; skipping speech synthesis",
            );
            return Ok(None);
        }
        job.narrative = Some(script.narrative.clone());

        let synthesizer = self.collaborators.synthesizer()?;
        job.set_stage_progress(30.0, format!("Synthesizing speech with {}", synthesizer.name()));
        self.persist(job).await?;

        let (audio_path, relative) = self.dirs.output_file(&job.id, NARRATION_AUDIO);
        let audio = synthesize_narration(
            synthesizer.as_ref(),
            self.media.as_ref(),
            &script.narrative,
            &audio_path,
            work_dir,
        )
        .await?;
        job.outputs.audio_path = Some(relative);

        job_log(
            job,
            LogLevel::Info,
            "recap.pipeline.narration",
            format!("Narration audio is {:.1}s long", audio.duration_secs()),
        );
        job.set_stage_progress(100.0, "Narration synthesized");
        self.persist(job).await?;
        Ok(Some(Narration { script, audio }))
    }

    pub(super) async fn mix(
        &self,
        job: &mut Job,
        muted: &Path,
        narration: &Narration,
    ) -> Result<()> {
        let (recap_path, recap_relative) = self.dirs.output_file(&job.id, RECAP_VIDEO);
        self.media
            .mux_audio(muted, &narration.audio.path, &recap_path)
            .await
            .context("mixing narration into the video")?;
        job.outputs.video_path = Some(recap_relative);
        job.set_stage_progress(60.0, "Timing narration subtitles");
        self.persist(job).await?;

        let audio_secs = narration.audio.duration_secs();
        let blocks = if narration.script.blocks.is_empty() {
            vec![NarrationBlock {
                text: narration.script.narrative.clone(),
                duration_seconds: audio_secs,
            }]
        } else {
            rescale_blocks(&narration.script.blocks, audio_secs)
        };
        let cues = segment_blocks(&blocks, 0.0, self.settings.narration_timing);

        let (srt_path, relative) = self.dirs.output_file(&job.id, NARRATION_SRT);
        tokio::fs::write(&srt_path, generate_srt(&cues))
            .await
            .with_context(|| format!("writing {}", srt_path.display()))?;
        job.outputs.narrative_srt_path = Some(relative);

        job_log(
            job,
            LogLevel::Info,
            "recap.pipeline.narration",
            format!("{} narration subtitles written", cues.len()),
        );
        job.set_stage_progress(100.0, "Narration mixed");
        self.persist(job).await
    }

    /// Mode B without narration still publishes the muted video.
    pub(super) async fn publish_muted(&self, job: &mut Job, muted: &Path) -> Result<()> {
        let (recap_path, relative) = self.dirs.output_file(&job.id, RECAP_VIDEO);
        tokio::fs::copy(muted, &recap_path)
            .await
            .with_context(|| format!("writing {}", recap_path.display()))?;
        job.outputs.video_path = Some(relative);
        self.persist(job).await
    }
}
