//! Lock-free outcome counters for the pipeline.
//!
//! Archival failures are invisible to chat users, so these counters (exposed
//! on `/health`) are how operators notice lost events.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::pipeline::Stage;

#[derive(Debug, Default)]
pub struct Counter {
    v: AtomicU64,
}

impl Counter {
    #[inline]
    pub fn inc(&self) {
        self.v.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn load(&self) -> u64 {
        self.v.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct PipelineStats {
    pub received: Counter,
    pub published: Counter,
    pub push_conflicts: Counter,
    failed_normalize: Counter,
    failed_clone: Counter,
    failed_archive: Counter,
    failed_commit: Counter,
    failed_publish: Counter,
}

impl PipelineStats {
    pub fn record_failure(&self, stage: Stage) {
        self.failed_counter(stage).inc();
    }

    pub fn failed(&self, stage: Stage) -> u64 {
        self.failed_counter(stage).load()
    }

    fn failed_counter(&self, stage: Stage) -> &Counter {
        match stage {
            // Nothing can fail on the way into `Received`; fold it into the first stage.
            Stage::Received | Stage::Normalized => &self.failed_normalize,
            Stage::Cloned => &self.failed_clone,
            Stage::Archived => &self.failed_archive,
            Stage::Committed => &self.failed_commit,
            Stage::Published => &self.failed_publish,
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(),
            published: self.published.load(),
            push_conflicts: self.push_conflicts.load(),
            failed: FailedByStage {
                normalized: self.failed_normalize.load(),
                cloned: self.failed_clone.load(),
                archived: self.failed_archive.load(),
                committed: self.failed_commit.load(),
                published: self.failed_publish.load(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub published: u64,
    pub push_conflicts: u64,
    pub failed: FailedByStage,
}

/// Failures keyed by the stage that could not be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FailedByStage {
    pub normalized: u64,
    pub cloned: u64,
    pub archived: u64,
    pub committed: u64,
    pub published: u64,
}

impl FailedByStage {
    pub fn total(&self) -> u64 {
        self.normalized + self.cloned + self.archived + self.committed + self.published
    }
}
