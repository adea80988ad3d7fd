//! Progress reporting utilities

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress bars for the three diff tiers, one tick per finished table
#[derive(Debug)]
pub struct ProgressReporter {
    multi: Option<MultiProgress>,
    pub tables_pb: Option<ProgressBar>,
    pub tier_pb: Option<ProgressBar>,
    show_progress: bool,
}

impl ProgressReporter {
    /// Create progress reporter for a diff run
    pub fn new_for_run() -> Self {
        let multi = MultiProgress::new();
        let tables_pb = multi.add(create_spinner("Listing tables to compare..."));

        Self {
            multi: Some(multi),
            tables_pb: Some(tables_pb),
            tier_pb: None,
            show_progress: true,
        }
    }

    /// Create minimal progress reporter (no progress bars)
    pub fn new_minimal() -> Self {
        Self {
            multi: None,
            tables_pb: None,
            tier_pb: None,
            show_progress: false,
        }
    }

    /// Finish table discovery
    pub fn finish_tables(&mut self, message: &str) {
        if let Some(pb) = self.tables_pb.take() {
            pb.finish_with_message(message.to_string());
        }
    }

    /// Start a bar for one tier over `total` tables, finishing any previous tier
    pub fn start_tier(&mut self, name: &str, total: u64) {
        self.finish_tier("done");
        if !self.show_progress {
            return;
        }

        let pb = create_progress_bar(total, name);
        self.tier_pb = Some(match &self.multi {
            Some(multi) => multi.add(pb),
            None => pb,
        });
    }

    /// Record a finished table in the current tier
    pub fn table_done(&self, table: &str) {
        if let Some(pb) = &self.tier_pb {
            pb.set_message(table.to_string());
            pb.inc(1);
        }
    }

    /// Finish the current tier bar
    pub fn finish_tier(&mut self, message: &str) {
        if let Some(pb) = self.tier_pb.take() {
            pb.finish_with_message(message.to_string());
        }
    }

    /// Finish all progress bars
    pub fn finish_all(&mut self, message: &str) {
        self.finish_tables(message);
        self.finish_tier(message);
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        if let Some(pb) = self.tables_pb.take() {
            pb.finish_and_clear();
        }
        if let Some(pb) = self.tier_pb.take() {
            pb.finish_and_clear();
        }
    }
}

/// Create a spinner progress bar
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        .template("{spinner:.green} {msg}")
    {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Create a progress bar with known total
fn create_progress_bar(total: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} {prefix:>12} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}/{len:3} {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_prefix(prefix.to_string());
    pb
}
