// src/progress.rs

//! Progress Aggregator: one overall percentage out of the per-phase counters.
//!
//! A transaction first downloads everything and then installs / removes, so
//! the overall bar restarts once. Front-ends drop percentages that go
//! backwards, hence the `Invalid` sentinel before any lower value.

use tracing::{debug, info};

use crate::frontend::JobReporter;
use crate::types::Percentage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Phase {
    #[default]
    NoProgressYet,
    Downloading,
    InstallingOrRemoving,
}

/// Execution counters of one Transaction Executor run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressAggregator {
    phase: Phase,
    last: Option<u8>,
    pub total_downloads: u32,
    pub current_downloads: u32,
    pub total_installs: u32,
    pub current_installs: u32,
    pub total_removals: u32,
    pub current_removals: u32,
}

impl ProgressAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn last_percentage(&self) -> Option<u8> {
        self.last
    }

    /// Back to `NoProgressYet` with all counters cleared.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Move forward to `phase`. Going back is ignored within a run.
    pub fn set_phase(&mut self, phase: Phase) {
        if phase <= self.phase {
            if phase < self.phase {
                debug!(current = ?self.phase, requested = ?phase, "ignoring backwards phase change");
            }
            return;
        }
        match phase {
            Phase::Downloading => info!("entering download phase"),
            Phase::InstallingOrRemoving => info!("entering install phase"),
            Phase::NoProgressYet => {}
        }
        self.phase = phase;
    }

    /// `(current, total)` for the active phase, clamped so current <= total.
    pub fn counts(&self) -> (u32, u32) {
        let (current, total) = match self.phase {
            Phase::Downloading => (self.current_downloads, self.total_downloads),
            Phase::InstallingOrRemoving => (
                self.current_installs + self.current_removals,
                self.total_installs + self.total_removals,
            ),
            Phase::NoProgressYet => (0, 1),
        };
        if current > total {
            debug!(current, total, "more completions than planned; clamping");
        }
        (current.min(total), total)
    }

    /// Percentage of the active phase; `None` while its total is zero.
    pub fn percentage(&self) -> Option<u8> {
        let (current, total) = self.counts();
        if total == 0 {
            return None;
        }
        let pct = u64::from(current) * 100 / u64::from(total);
        Some(pct.min(100) as u8)
    }

    /// Recompute and emit the overall percentage.
    ///
    /// A phase with nothing to count reports `Invalid`; the reporter re-arms
    /// the front-end when the value drops.
    pub fn update(&mut self, reporter: &JobReporter) {
        let (current, total) = self.counts();
        debug!(phase = ?self.phase, current, total, "progress update");

        let next = self.percentage();
        match next {
            Some(pct) => reporter.percentage(Percentage::Value(pct)),
            None => reporter.percentage(Percentage::Invalid),
        }
        self.last = next;
    }

    pub fn download_finished(&mut self, reporter: &JobReporter) {
        self.set_phase(Phase::Downloading);
        self.current_downloads += 1;
        self.update(reporter);
    }

    pub fn installation_finished(&mut self, reporter: &JobReporter) {
        self.set_phase(Phase::InstallingOrRemoving);
        self.current_installs += 1;
        self.update(reporter);
    }

    pub fn removal_finished(&mut self, reporter: &JobReporter) {
        self.set_phase(Phase::InstallingOrRemoving);
        self.current_removals += 1;
        self.update(reporter);
    }
}
