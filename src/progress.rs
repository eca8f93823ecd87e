//! Progress reporting utilities

use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};

/// Stages of a reconcile run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Validate,
    Diff,
    Merge,
    Export,
}

impl Stage {
    fn message(&self) -> &'static str {
        match self {
            Stage::Load => "Loading raw snapshot and canonical dataset...",
            Stage::Validate => "Validating schemas...",
            Stage::Diff => "Classifying records...",
            Stage::Merge => "Applying changes...",
            Stage::Export => "Publishing canonical dataset...",
        }
    }
}

/// Spinner-per-stage progress reporter for reconcile runs
#[derive(Debug)]
pub struct ProgressReporter {
    current: Option<ProgressBar>,
    show_progress: bool,
    start_time: Instant,
}

impl ProgressReporter {
    pub fn new(show_progress: bool) -> Self {
        Self {
            current: None,
            show_progress,
            start_time: Instant::now(),
        }
    }

    /// Begin a stage, clearing any unfinished spinner
    pub fn start(&mut self, stage: Stage) {
        if let Some(pb) = self.current.take() {
            pb.finish_and_clear();
        }
        if self.show_progress {
            self.current = Some(create_spinner(stage.message()));
        }
    }

    /// Finish the running stage with a message
    pub fn finish(&mut self, message: &str) {
        if let Some(pb) = self.current.take() {
            pb.finish_with_message(message.to_string());
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        if let Some(pb) = self.current.take() {
            pb.finish_and_clear();
        }
    }
}

/// Create a spinner progress bar
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Create a byte progress bar for file operations; hidden when progress is off
pub fn create_file_progress(total: u64, message: &str, show_progress: bool) -> ProgressBar {
    if !show_progress {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes:>7}/{total_bytes:7} {msg}")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb
}
