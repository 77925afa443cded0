//! # Console Reporter
//!
//! Routes the script API's `print`, `warning` and progress calls to the
//! terminal.

use rigbuilder_core::HostReporter;
use std::sync::Mutex;

/// Prints script output to stdout and everything else through `tracing`.
#[derive(Debug, Default)]
pub struct ConsoleReporter {
    quiet: bool,
    progress: Mutex<Option<Progress>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Progress {
    text: String,
    total: u64,
}

impl ConsoleReporter {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            progress: Mutex::new(None),
        }
    }

    /// `(text, total)` of the progress bar currently open, if any.
    pub fn current_progress(&self) -> Option<(String, u64)> {
        self.progress
            .lock()
            .ok()
            .and_then(|p| p.as_ref().map(|p| (p.text.clone(), p.total)))
    }
}

impl HostReporter for ConsoleReporter {
    fn print(&self, text: &str) {
        if !self.quiet {
            println!("{}", text);
        }
    }

    fn warning(&self, text: &str) {
        tracing::warn!(target: "rigbuilder::script", "{}", text);
    }

    fn begin_progress(&self, text: &str, total: u64) {
        tracing::info!(target: "rigbuilder::script", total, "{}", text);
        if let Ok(mut progress) = self.progress.lock() {
            *progress = Some(Progress {
                text: text.to_string(),
                total,
            });
        }
    }

    fn step_progress(&self, step: u64, text: &str) {
        let total = self.current_progress().map(|(_, total)| total).unwrap_or(0);
        tracing::info!(target: "rigbuilder::script", "[{}/{}] {}", step, total, text);
    }

    fn end_progress(&self) {
        if let Ok(mut progress) = self.progress.lock() {
            if let Some(done) = progress.take() {
                tracing::info!(target: "rigbuilder::script", "{}: done", done.text);
            }
        }
    }
}
