use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar tracking a job's overall progress (0-100).
pub fn create_job_bar(job_id: &str) -> ProgressBar {
    let pb = ProgressBar::new(100);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} {prefix} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏ ");
    pb.set_style(style);
    pb.set_prefix(job_id.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Finish a bar and print a message with a checkmark or cross
pub fn finish_job_bar(pb: ProgressBar, ok: bool, message: impl Into<String>) {
    pb.finish_and_clear();
    let mark = if ok { "✓" } else { "✗" };
    println!("{} {}", mark, message.into());
}
