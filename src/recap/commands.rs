use anyhow::{Context, Result};
use comfy_table::{Table, presets::UTF8_FULL};
use indicatif::{MultiProgress, ProgressBar};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::cli::{
    CheckArgs, CreateArgs, EpisodeArgs, JobCommands, JobIdArgs, OutputsArgs, RecapCommands,
    SrtCommands, SrtFilesArgs, StartArgs, StatusArgs, TimelineArgs,
};
use super::clips::read_manifest;
use super::config::RecapConfig;
use super::episode::{resolve_episode_id, resolve_with_fallback, split_episode_id};
use super::jobs::{
    FileJobStore, Job, JobConfig, JobError, JobFile, JobStatus, JobStore, generate_job_id,
};
use super::llm::create_analyzer;
use super::pipeline::{ConfiguredCollaborators, Orchestrator, PipelineSettings};
use super::season::{EpisodeSubtitles, build_season, render_for_analysis};
use super::srt::{attach_episode, format_timestamp, parse_srt};
use super::support::ffmpeg::{Ffmpeg, MediaTool};
use super::support::utils::{
    SUBTITLE_EXTENSIONS, VIDEO_EXTENSIONS, canonicalize_existing, file_name_string,
    has_extension, read_text_lossy,
};
use crate::common::progress::{create_job_bar, finish_job_bar};
use crate::ui::prelude::{Level, OutputFormat, emit, get_output_format, print_line};

pub async fn handle_recap_command(command: RecapCommands, debug: bool) -> Result<()> {
    match command {
        RecapCommands::Job(command) => handle_job_command(command, debug).await,
        RecapCommands::Srt(command) => handle_srt_command(command).await,
        RecapCommands::Check(args) => handle_check(args).await,
    }
}

async fn handle_job_command(command: JobCommands, debug: bool) -> Result<()> {
    let config = RecapConfig::load()?;
    if debug {
        emit(
            Level::Debug,
            "recap.config.data_dir",
            &format!("Using data directory {}", config.data_dir.display()),
            None,
        );
    }
    let store = Arc::new(FileJobStore::new(config.directories())?);

    match command {
        JobCommands::Create(args) => handle_create(store.as_ref(), args).await,
        JobCommands::Start(args) => handle_start(&config, store, args).await,
        JobCommands::Status(args) => handle_status(store.as_ref(), args).await,
        JobCommands::List => handle_list(store.as_ref()).await,
        JobCommands::Outputs(args) => handle_outputs(store.as_ref(), args).await,
        JobCommands::Reset(JobIdArgs { id }) => {
            let job = store.reset_failed(&id).await?;
            emit(
                Level::Success,
                "recap.job.reset",
                &format!("Job {} is pending again", job.id),
                Some(json!({ "job": job.id })),
            );
            Ok(())
        }
        JobCommands::Delete(JobIdArgs { id }) => {
            store.delete(&id).await?;
            emit(
                Level::Success,
                "recap.job.deleted",
                &format!("Deleted job {}", id),
                Some(json!({ "job": id })),
            );
            Ok(())
        }
    }
}

fn check_uploads(files: &[PathBuf], kind: &'static str, allowed: &[&str]) -> Result<()> {
    for file in files {
        if !has_extension(file, allowed) {
            return Err(JobError::UnsupportedUpload {
                kind,
                file: file.display().to_string(),
                expected: allowed.join(", "),
            }
            .into());
        }
    }
    Ok(())
}

/// Copy (or with `link`, reference) input files for a job.
async fn stage_uploads(files: &[PathBuf], upload_dir: &Path, link: bool) -> Result<Vec<JobFile>> {
    let mut staged = Vec::with_capacity(files.len());
    for file in files {
        let source = canonicalize_existing(file)?;
        let original_name = file_name_string(&source);
        let path = if link {
            source
        } else {
            let target = upload_dir.join(&original_name);
            if target.exists() {
                anyhow::bail!("Two uploads are named {}", original_name);
            }
            tokio::fs::copy(&source, &target).await.with_context(|| {
                format!("Failed to copy {} into {}", source.display(), upload_dir.display())
            })?;
            target
        };
        staged.push(JobFile { original_name, path });
    }
    Ok(staged)
}

async fn handle_create(store: &FileJobStore, args: CreateArgs) -> Result<()> {
    check_uploads(&args.srt, "subtitle", SUBTITLE_EXTENSIONS)?;
    check_uploads(&args.video, "video", VIDEO_EXTENSIONS)?;
    if args.target_length == 0 {
        anyhow::bail!("Target length must be at least one second");
    }

    let id = generate_job_id();
    let upload_dir = store.directories().uploads_dir(&id);
    tokio::fs::create_dir_all(&upload_dir)
        .await
        .with_context(|| format!("Failed to create {}", upload_dir.display()))?;

    let staged = async {
        let srt_files = stage_uploads(&args.srt, &upload_dir, args.link).await?;
        let video_files = stage_uploads(&args.video, &upload_dir, args.link).await?;
        anyhow::Ok((srt_files, video_files))
    }
    .await;
    let (srt_files, video_files) = match staged {
        Ok(files) => files,
        Err(err) => {
            let _ = tokio::fs::remove_dir_all(&upload_dir).await;
            return Err(err);
        }
    };

    let config = JobConfig {
        series_name: args.series,
        season: args.season,
        language: args.language,
        mode: args.mode,
        target_length: args.target_length,
        llm_provider: args.llm,
    };
    let job = Job::with_id(id, config, srt_files, video_files);
    store.create(&job).await?;

    match get_output_format() {
        OutputFormat::Json => emit(
            Level::Success,
            "recap.job.created",
            &format!("Created job {}", job.id),
            Some(json!({ "job": job.id })),
        ),
        OutputFormat::Text => print_line(&job.id),
    }
    Ok(())
}

async fn handle_start(
    config: &RecapConfig,
    store: Arc<FileJobStore>,
    args: StartArgs,
) -> Result<()> {
    let media = Arc::new(Ffmpeg::system(config.media.clone()));
    let orchestrator = Orchestrator::new(
        store.clone(),
        media,
        Arc::new(ConfiguredCollaborators::new(config)),
        config.directories(),
        PipelineSettings::from_config(config),
    );

    let handles: Vec<(String, JoinHandle<Result<Job>>)> = args
        .ids
        .iter()
        .map(|id| (id.clone(), orchestrator.spawn(id.clone())))
        .collect();

    let watch = !args.no_watch && get_output_format() == OutputFormat::Text;
    let bars = if watch {
        Some(watch_jobs(store.as_ref(), &handles).await)
    } else {
        None
    };

    let mut failed = 0usize;
    for (index, (id, handle)) in handles.into_iter().enumerate() {
        let outcome = handle
            .await
            .with_context(|| format!("Job task for {} stopped", id))
            .and_then(|r| r);
        let bar = bars.as_ref().and_then(|b| b.get(index)).cloned();

        match outcome {
            Ok(job) => {
                let message = format!("{} completed", job.id);
                match bar {
                    Some(bar) => finish_job_bar(bar, true, message),
                    None => emit(
                        Level::Success,
                        "recap.job.completed",
                        &message,
                        Some(json!({ "job": job.id })),
                    ),
                }
            }
            Err(err) => {
                failed += 1;
                let message = format!("{} failed: {:#}", id, err);
                match bar {
                    Some(bar) => finish_job_bar(bar, false, message),
                    None => emit(
                        Level::Error,
                        "recap.job.failed",
                        &message,
                        Some(json!({ "job": id })),
                    ),
                }
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} job(s) failed", failed, args.ids.len());
    }
    Ok(())
}

/// Poll the store and draw one bar per job until every task has finished.
async fn watch_jobs(
    store: &FileJobStore,
    handles: &[(String, JoinHandle<Result<Job>>)],
) -> Vec<ProgressBar> {
    let multi = MultiProgress::new();
    let bars: Vec<ProgressBar> = handles
        .iter()
        .map(|(id, _)| multi.add(create_job_bar(id)))
        .collect();

    let mut interval = tokio::time::interval(Duration::from_millis(500));
    loop {
        interval.tick().await;
        for ((id, _), bar) in handles.iter().zip(&bars) {
            if let Ok(job) = store.get(id).await {
                bar.set_position(job.overall_progress().round() as u64);
                bar.set_message(format!("{} {}", job.progress.stage, job.progress.current_step));
            }
        }
        if handles.iter().all(|(_, h)| h.is_finished()) {
            break;
        }
    }
    bars
}

async fn handle_status(store: &FileJobStore, args: StatusArgs) -> Result<()> {
    let job = store.get(&args.id).await?;

    if get_output_format() == OutputFormat::Json {
        print_line(&serde_json::to_string_pretty(&job)?);
        return Ok(());
    }

    print_line(&format!("Job:      {}", job.id));
    print_line(&format!(
        "Series:   {} season {} ({}, mode {})",
        job.config.series_name, job.config.season, job.config.language, job.config.mode
    ));
    print_line(&format!("Status:   {}", job.status));
    print_line(&format!(
        "Progress: {:.0}% ({} {:.0}%)",
        job.overall_progress(),
        job.progress.stage,
        job.progress.stage_progress
    ));
    if !job.progress.current_step.is_empty() {
        print_line(&format!("Step:     {}", job.progress.current_step));
    }
    if let Some(error) = &job.error {
        print_line(&format!("Error:    {}", error));
    }

    if args.clips {
        print_clips(store, &job).await?;
    }

    if args.logs {
        print_line("");
        for entry in &job.progress.logs {
            print_line(&format!(
                "{} {:<7} {}",
                entry.timestamp.format("%H:%M:%S"),
                format!("{:?}", entry.level).to_lowercase(),
                entry.message
            ));
        }
    }
    Ok(())
}

async fn print_clips(store: &FileJobStore, job: &Job) -> Result<()> {
    let Some(relative) = &job.outputs.clips_json_path else {
        print_line("");
        print_line("No clips planned yet");
        return Ok(());
    };
    let clips = read_manifest(&store.directories().root().join(relative)).await?;

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["#", "Episode", "Start", "End", "Length"]);
    for clip in &clips {
        table.add_row(vec![
            clip.order.to_string(),
            clip.episode_id.clone(),
            format_timestamp(clip.start_time),
            format_timestamp(clip.end_time),
            format!("{:.1}s", clip.duration()),
        ]);
    }
    print_line("");
    print_line(&table.to_string());
    Ok(())
}

async fn handle_list(store: &FileJobStore) -> Result<()> {
    let jobs = store.list().await?;

    if get_output_format() == OutputFormat::Json {
        print_line(&serde_json::to_string_pretty(&jobs)?);
        return Ok(());
    }
    if jobs.is_empty() {
        emit(Level::Info, "recap.job.list.empty", "No jobs yet", None);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["ID", "Series", "Season", "Mode", "Status", "Progress", "Created"]);
    for job in &jobs {
        table.add_row(vec![
            job.id.clone(),
            job.config.series_name.clone(),
            job.config.season.to_string(),
            job.config.mode.to_string(),
            job.status.to_string(),
            format!("{:.0}%", job.overall_progress()),
            job.created_at.format("%Y-%m-%d %H:%M").to_string(),
        ]);
    }
    print_line(&table.to_string());
    Ok(())
}

async fn handle_outputs(store: &FileJobStore, args: OutputsArgs) -> Result<()> {
    let job = store.get(&args.id).await?;
    if job.status != JobStatus::Completed {
        return Err(JobError::NotCompleted {
            id: job.id,
            status: job.status,
        }
        .into());
    }

    let root = store.directories().root();
    if let Some(dest) = &args.copy_to {
        tokio::fs::create_dir_all(dest)
            .await
            .with_context(|| format!("Failed to create {}", dest.display()))?;
    }

    let mut listing = serde_json::Map::new();
    for (label, relative) in job.outputs.entries() {
        let absolute = root.join(relative);
        let shown = match &args.copy_to {
            Some(dest) => {
                let target = dest.join(file_name_string(&absolute));
                tokio::fs::copy(&absolute, &target)
                    .await
                    .with_context(|| format!("Failed to copy {}", absolute.display()))?;
                target
            }
            None => absolute,
        };
        if get_output_format() == OutputFormat::Text {
            print_line(&format!("{:<20} {}", label, shown.display()));
        }
        listing.insert(label.to_string(), json!(shown));
    }

    if get_output_format() == OutputFormat::Json {
        print_line(&serde_json::to_string_pretty(&listing)?);
    }
    Ok(())
}

async fn handle_srt_command(command: SrtCommands) -> Result<()> {
    match command {
        SrtCommands::Check(args) => handle_srt_check(args).await,
        SrtCommands::Episode(args) => {
            handle_episode(args);
            Ok(())
        }
        SrtCommands::Timeline(args) => handle_timeline(args).await,
    }
}

async fn handle_srt_check(args: SrtFilesArgs) -> Result<()> {
    for file in &args.files {
        let content = read_text_lossy(file).await?;
        let parsed = parse_srt(&content);
        let span = parsed
            .entries
            .last()
            .map(|e| e.end_time)
            .unwrap_or_default();

        let level = if parsed.skipped > 0 { Level::Warn } else { Level::Success };
        emit(
            level,
            "recap.srt.check",
            &format!(
                "{}: {} entries, {} skipped, ends at {:.1}s",
                file.display(),
                parsed.entries.len(),
                parsed.skipped,
                span
            ),
            Some(json!({
                "file": file,
                "entries": parsed.entries.len(),
                "skipped": parsed.skipped,
                "end": span,
            })),
        );
    }
    Ok(())
}

fn handle_episode(args: EpisodeArgs) {
    for name in &args.names {
        let id = resolve_episode_id(name);
        match get_output_format() {
            OutputFormat::Json => emit(
                Level::Info,
                "recap.srt.episode",
                id.as_deref().unwrap_or("-"),
                Some(json!({ "name": name, "episode": id })),
            ),
            OutputFormat::Text => {
                print_line(&format!("{}\t{}", id.as_deref().unwrap_or("-"), name))
            }
        }
    }
}

async fn handle_timeline(args: TimelineArgs) -> Result<()> {
    let budget = match args.max_chars {
        Some(n) => n,
        None => RecapConfig::load()?.max_chars_per_episode,
    };

    let mut files = args.files.clone();
    files.sort_by_key(|f| file_name_string(f));
    let names: Vec<String> = files.iter().map(|f| file_name_string(f)).collect();
    let ids = resolve_with_fallback(&names, args.season);

    let mut episodes = Vec::with_capacity(files.len());
    for (pos, (file, id)) in files.iter().zip(ids).enumerate() {
        let parsed = parse_srt(&read_text_lossy(file).await?);
        let episode_number = split_episode_id(&id)
            .map(|(_, episode)| episode)
            .unwrap_or(pos as u32 + 1);
        episodes.push(EpisodeSubtitles {
            entries: attach_episode(parsed.entries, &id),
            episode_id: id,
            episode_number,
            video_file_name: None,
        });
    }

    let season = build_season(episodes, &args.series, args.season, &args.language);
    print_line(&render_for_analysis(&season, (budget > 0).then_some(budget)));
    Ok(())
}

async fn handle_check(args: CheckArgs) -> Result<()> {
    let config = RecapConfig::load()?;
    let media = Ffmpeg::system(config.media.clone());

    if media.is_available() {
        emit(
            Level::Success,
            "recap.check.media",
            &format!("{} and {} found", config.media.ffmpeg, config.media.ffprobe),
            None,
        );
    } else {
        anyhow::bail!(
            "{} or {} is not installed or not on PATH",
            config.media.ffmpeg,
            config.media.ffprobe
        );
    }

    if args.skip_llm {
        return Ok(());
    }

    let analyzer = create_analyzer(args.llm, &config.llm)?;
    analyzer
        .check_connection()
        .await
        .with_context(|| format!("{} is not reachable", args.llm))?;
    emit(
        Level::Success,
        "recap.check.llm",
        &format!("{} answered", analyzer.name()),
        None,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uploads_with_wrong_extension_are_rejected() {
        let files = vec![PathBuf::from("a.srt"), PathBuf::from("notes.txt")];
        let err = check_uploads(&files, "subtitle", SUBTITLE_EXTENSIONS).unwrap_err();
        match err.downcast_ref::<JobError>() {
            Some(JobError::UnsupportedUpload { kind, file, .. }) => {
                assert_eq!(*kind, "subtitle");
                assert_eq!(file, "notes.txt");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn video_extensions_are_case_insensitive() {
        let files = vec![PathBuf::from("Show.S01E01.MKV")];
        assert!(check_uploads(&files, "video", VIDEO_EXTENSIONS).is_ok());
    }

    #[tokio::test]
    async fn staging_copies_into_upload_dir() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("Show.S01E01.srt");
        std::fs::write(&source, "1\n00:00:01,000 --> 00:00:02,000\nHi\n").unwrap();
        let uploads = dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();

        let staged = stage_uploads(&[source.clone()], &uploads, false).await.unwrap();
        assert_eq!(staged[0].original_name, "Show.S01E01.srt");
        assert_eq!(staged[0].path, uploads.join("Show.S01E01.srt"));
        assert!(staged[0].path.exists());

        let linked = stage_uploads(&[source.clone()], &uploads, true).await.unwrap();
        assert_eq!(linked[0].path, source.canonicalize().unwrap());
    }

    #[tokio::test]
    async fn staging_rejects_duplicate_names() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::create_dir_all(&a).unwrap();
        std::fs::create_dir_all(&b).unwrap();
        std::fs::write(a.join("ep.srt"), "").unwrap();
        std::fs::write(b.join("ep.srt"), "").unwrap();
        let uploads = dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();

        let result = stage_uploads(&[a.join("ep.srt"), b.join("ep.srt")], &uploads, false).await;
        assert!(result.is_err());
    }
}
