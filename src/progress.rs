//! Progress display for catalog builds.
//!
//! Everything here writes to stderr; stdout is reserved for the diff.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use taskpool::{ProgressCallback, TaskStatus};

/// Spinner plus one status line per finished build
pub struct BuildProgress {
    bar: ProgressBar,
    running: usize,
}

impl BuildProgress {
    pub fn new(quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg} ({elapsed})") {
                bar.set_style(style);
            }
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        };
        Self { bar, running: 0 }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressCallback for BuildProgress {
    fn on_task_start(&mut self, _index: usize, description: &str) {
        self.running += 1;
        self.bar.set_message(description.to_string());
    }

    fn on_task_complete(&mut self, _index: usize, description: &str, status: TaskStatus) {
        self.running = self.running.saturating_sub(1);
        let marker = match status {
            TaskStatus::Succeeded => "✓".green(),
            TaskStatus::Failed => "✗".red(),
            TaskStatus::Killed => "⊘".yellow(),
        };
        if !self.bar.is_hidden() {
            self.bar
                .suspend(|| eprintln!("{} {}", marker, description));
        }
        if self.running == 0 {
            self.bar.set_message("comparing");
        }
    }
}

impl Drop for BuildProgress {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}
