mod common;
mod utils;

use anyhow::Result;
use common::TestEnvironment;
use serial_test::serial;

const EPISODE_ONE: &str = "1\n00:00:01,000 --> 00:00:02,500\nHello there\n\n2\n00:01:05,000 --> 00:01:07,000\nGeneral Kenobi\n";
const EPISODE_TWO: &str = "1\n00:00:03,000 --> 00:00:04,000\nWe meet again\n\nbroken block\n";

#[test]
fn episode_ids_follow_marker_precedence() -> Result<()> {
    let env = TestEnvironment::new()?;
    let output = utils::run_recap_command(
        &env,
        &["srt", "episode", "Show.S01E02.720p.mkv", "Show.1x03.mkv", "E04.srt", "finale.mkv"],
    )?;
    assert_eq!(output.exit_code, 0, "episode failed: {}", output.stderr);

    let lines: Vec<&str> = output.stdout.lines().collect();
    assert_eq!(lines[0], "S01E02\tShow.S01E02.720p.mkv");
    assert_eq!(lines[1], "S01E03\tShow.1x03.mkv");
    assert_eq!(lines[2], "S01E04\tE04.srt");
    assert_eq!(lines[3], "-\tfinale.mkv");
    Ok(())
}

#[test]
fn srt_check_reports_skipped_blocks() -> Result<()> {
    let env = TestEnvironment::new()?;
    let clean = env.input("Show.S01E01.srt", EPISODE_ONE)?;
    let damaged = env.input("Show.S01E02.srt", EPISODE_TWO)?;

    let output = utils::run_recap_command(
        &env,
        &["srt", "check", clean.to_str().unwrap(), damaged.to_str().unwrap()],
    )?;
    assert_eq!(output.exit_code, 0, "check failed: {}", output.stderr);
    assert!(output.stdout.contains("2 entries, 0 skipped"));
    assert!(output.stderr.contains("1 entries, 1 skipped"));
    Ok(())
}

#[test]
fn timeline_orders_episodes_and_formats_times() -> Result<()> {
    let env = TestEnvironment::new()?;
    let second = env.input("Show.S01E02.srt", EPISODE_TWO)?;
    let first = env.input("Show.S01E01.srt", EPISODE_ONE)?;

    let output = utils::run_recap_command(
        &env,
        &[
            "srt",
            "timeline",
            "--series",
            "Show",
            "--season",
            "1",
            "--max-chars",
            "0",
            second.to_str().unwrap(),
            first.to_str().unwrap(),
        ],
    )?;
    assert_eq!(output.exit_code, 0, "timeline failed: {}", output.stderr);

    let text = output.stdout;
    assert!(text.contains("Series: Show"));
    assert!(text.contains("[00:01] Hello there"));
    assert!(text.contains("[01:05] General Kenobi"));
    let first_pos = text.find("--- S01E01 ---").unwrap();
    let second_pos = text.find("--- S01E02 ---").unwrap();
    assert!(first_pos < second_pos);
    Ok(())
}

#[test]
#[serial]
fn job_lifecycle_without_running() -> Result<()> {
    let env = TestEnvironment::new()?;
    let srt = env.input("Show.S01E01.srt", EPISODE_ONE)?;
    let video = env.input("Show.S01E01.mkv", "not really a video")?;

    let output = utils::run_recap_command(
        &env,
        &[
            "job",
            "create",
            "--series",
            "Show",
            "--season",
            "1",
            "--mode",
            "b",
            "--target-length",
            "90",
            "--llm",
            "ollama",
            "--srt",
            srt.to_str().unwrap(),
            "--video",
            video.to_str().unwrap(),
        ],
    )?;
    assert_eq!(output.exit_code, 0, "create failed: {}", output.stderr);
    let id = output.stdout.trim().to_string();
    assert!(id.starts_with("job_"));

    let uploads = env.data_home().join("recap").join("uploads").join(&id);
    assert!(uploads.join("Show.S01E01.srt").exists());
    assert!(uploads.join("Show.S01E01.mkv").exists());

    let output = utils::run_recap_command(&env, &["--output", "json", "job", "list"])?;
    assert_eq!(output.exit_code, 0, "list failed: {}", output.stderr);
    let jobs: serde_json::Value = serde_json::from_str(&output.stdout)?;
    assert_eq!(jobs.as_array().map(|a| a.len()), Some(1));
    assert_eq!(jobs[0]["id"], id.as_str());
    assert_eq!(jobs[0]["status"], "pending");
    assert_eq!(jobs[0]["config"]["mode"], "B");
    assert_eq!(jobs[0]["config"]["llmProvider"], "ollama");

    let output = utils::run_recap_command(&env, &["job", "status", &id])?;
    assert_eq!(output.exit_code, 0);
    assert!(output.stdout.contains("Status:   pending"));

    let output = utils::run_recap_command(&env, &["job", "status", &id, "--clips"])?;
    assert_eq!(output.exit_code, 0, "status failed: {}", output.stderr);
    assert!(output.stdout.contains("No clips planned yet"));

    let output = utils::run_recap_command(&env, &["job", "outputs", &id])?;
    assert_eq!(output.exit_code, 1);
    assert!(output.stderr.contains("has no outputs yet"));

    let output = utils::run_recap_command(&env, &["job", "reset", &id])?;
    assert_eq!(output.exit_code, 1);
    assert!(output.stderr.contains("only be reset after failing"));

    let output = utils::run_recap_command(&env, &["job", "delete", &id])?;
    assert_eq!(output.exit_code, 0, "delete failed: {}", output.stderr);
    assert!(!uploads.exists());

    let output = utils::run_recap_command(&env, &["job", "status", &id])?;
    assert_eq!(output.exit_code, 1);
    assert!(output.stderr.contains("not found"));
    Ok(())
}

#[test]
#[serial]
fn create_rejects_unsupported_subtitles() -> Result<()> {
    let env = TestEnvironment::new()?;
    let notes = env.input("Show.S01E01.txt", "plain text")?;
    let video = env.input("Show.S01E01.mp4", "video")?;

    let output = utils::run_recap_command(
        &env,
        &[
            "job",
            "create",
            "--series",
            "Show",
            "--season",
            "1",
            "--srt",
            notes.to_str().unwrap(),
            "--video",
            video.to_str().unwrap(),
        ],
    )?;
    assert_eq!(output.exit_code, 1);
    assert!(output.stderr.contains("unsupported subtitle file"));

    let jobs_dir = env.data_home().join("recap").join("jobs");
    let records = std::fs::read_dir(&jobs_dir)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(records, 0);
    Ok(())
}
