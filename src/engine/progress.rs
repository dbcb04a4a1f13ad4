//! Observational progress reporting for batch runs.
//!
//! A side channel only: the bar reflects completion counts and never
//! influences scheduling or result ordering.

use indicatif::{ProgressBar, ProgressStyle};

pub struct BatchProgress {
    bar: Option<ProgressBar>,
}

impl BatchProgress {
    pub fn new(total: usize, description: &str, enabled: bool) -> Self {
        if !enabled {
            return Self { bar: None };
        }

        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "{msg} [{bar:40.cyan/blue}] {pos}/{len} hosts ({elapsed})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
        );
        bar.set_message(description.to_string());
        Self { bar: Some(bar) }
    }

    /// Record one completed task with the running success/failure counts.
    pub fn record(&self, succeeded: usize, failed: usize) {
        if let Some(bar) = &self.bar {
            bar.set_message(format!("ok {} / failed {}", succeeded, failed));
            bar.inc(1);
        }
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}
