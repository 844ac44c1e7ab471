use serde_json::json;

use crate::recap::jobs::{Job, LogLevel};
use crate::ui::prelude::{Level, emit};

fn ui_level(level: LogLevel) -> Level {
    match level {
        LogLevel::Info => Level::Info,
        LogLevel::Warn => Level::Warn,
        LogLevel::Error => Level::Error,
        LogLevel::Success => Level::Success,
    }
}

/// Append to the job's log and echo as a ui event.
pub(super) fn job_log(job: &mut Job, level: LogLevel, code: &str, message: impl Into<String>) {
    let message = message.into();
    emit(
        ui_level(level),
        code,
        &format!("[{}] {}", job.id, message),
        Some(json!({ "job": job.id, "stage": job.progress.stage.as_str() })),
    );
    job.log(level, message);
}
