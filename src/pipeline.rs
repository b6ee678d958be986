//! Per-event orchestration: normalize, clone, write, commit, push.
//!
//! Each call to [`Pipeline::handle`] owns its own repository snapshot, so the
//! pipeline can be shared across threads without locks. The only shared
//! resource is the remote, where git's fast-forward check arbitrates.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::archive;
use crate::archive_path::ArchivePath;
use crate::config::Config;
use crate::error::PipelineError;
use crate::git::Snapshot;
use crate::models::{CanonicalEvent, MessageEvent};
use crate::normalize::normalize;
use crate::stats::PipelineStats;

/// States of one event's run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Normalized,
    Cloned,
    Archived,
    Committed,
    Published,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Normalized => "normalized",
            Stage::Cloned => "cloned",
            Stage::Archived => "archived",
            Stage::Committed => "committed",
            Stage::Published => "published",
        };
        f.write_str(name)
    }
}

/// A successfully archived event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    /// Repository-relative path of the file that was appended to.
    pub path: String,
    pub commit: git2::Oid,
    /// Remote ref that now points at `commit`.
    pub branch: String,
    /// 1 unless push conflicts were retried.
    pub attempts: u32,
}

/// Terminal state of one run.
#[derive(Debug)]
pub enum Outcome {
    Published(Published),
    /// `stage` is the state that could not be reached.
    Failed { stage: Stage, error: PipelineError },
}

impl Outcome {
    pub fn is_published(&self) -> bool {
        matches!(self, Outcome::Published(_))
    }

    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            Outcome::Published(_) => None,
            Outcome::Failed { stage, .. } => Some(*stage),
        }
    }
}

pub struct Pipeline {
    config: Arc<Config>,
    stats: PipelineStats,
}

impl Pipeline {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            stats: PipelineStats::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Archive one inbound message event.
    ///
    /// Never panics on event data and never propagates an error: every failure
    /// is logged with the event's identity and returned as `Outcome::Failed`.
    pub fn handle(&self, payload: &Value, message: &MessageEvent) -> Outcome {
        let delivery = Uuid::new_v4();
        let span = tracing::info_span!("archive_event", %delivery, channel = %message.channel);
        let _enter = span.enter();

        self.stats.received.inc();

        let event = match normalize(payload, message) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, stage = %Stage::Normalized, "dropping unarchivable event");
                self.stats.record_failure(Stage::Normalized);
                return Outcome::Failed {
                    stage: Stage::Normalized,
                    error: e.into(),
                };
            }
        };
        tracing::debug!(author = %event.author, ts = %event.timestamp, "event normalized");

        self.publish(&event, || self.archive(&event, Utc::now()))
    }

    /// Run `cycle` under the push-conflict policy, then log and count the
    /// result. Each call of `cycle` must start from a fresh snapshot.
    pub(crate) fn publish<F>(&self, event: &CanonicalEvent, mut cycle: F) -> Outcome
    where
        F: FnMut() -> Result<Published, PipelineError>,
    {
        let result = retry_on_rejection(self.config.push_conflict_retries, |attempt| {
            if attempt > 1 {
                self.stats.push_conflicts.inc();
                tracing::warn!(attempt, ts = %event.timestamp, "push rejected, re-cloning and reapplying");
            }
            cycle().map(|published| Published {
                attempts: attempt,
                ..published
            })
        });

        match result {
            Ok(published) => {
                tracing::info!(
                    author = %event.author,
                    ts = %event.timestamp,
                    path = %published.path,
                    commit = %published.commit,
                    "event archived"
                );
                self.stats.published.inc();
                Outcome::Published(published)
            }
            Err(error) => {
                let stage = error.stage();
                if error.is_push_rejection() {
                    self.stats.push_conflicts.inc();
                    tracing::error!(
                        author = %event.author,
                        channel = %event.channel_id,
                        ts = %event.timestamp,
                        stage = %stage,
                        error = %error,
                        "push rejected as non-fast-forward; event is LOST from the archive"
                    );
                } else {
                    tracing::error!(
                        author = %event.author,
                        channel = %event.channel_id,
                        ts = %event.timestamp,
                        stage = %stage,
                        error = %error,
                        "failed to archive event"
                    );
                }
                self.stats.record_failure(stage);
                Outcome::Failed { stage, error }
            }
        }
    }

    /// One clone → write → commit → push cycle for an already normalized event.
    pub fn archive(
        &self,
        event: &CanonicalEvent,
        at: DateTime<Utc>,
    ) -> Result<Published, PipelineError> {
        let repository = &self.config.repository;

        let snapshot = Snapshot::clone_from(repository)?;
        tracing::debug!(stage = %Stage::Cloned, "repository cloned");

        let path = ArchivePath::resolve(
            &repository.url,
            at,
            &event.channel_id,
            self.config.date_layout,
        )?;
        archive::append_entry(snapshot.workdir(), &path, &event.entry())?;
        tracing::debug!(stage = %Stage::Archived, path = %path, "entry written");

        let tree = snapshot.stage(&path)?;
        let commit = snapshot.commit(tree, &event.commit_message(), &self.config.identity, at)?;
        tracing::debug!(stage = %Stage::Committed, %commit, "commit created");

        let branch = snapshot.push()?;

        Ok(Published {
            path: path.to_string(),
            commit,
            branch,
            attempts: 1,
        })
    }
}

/// Run `attempt` once, plus up to `retries` more times while it fails with a
/// non-fast-forward push rejection. Other failures end the loop immediately.
///
/// The closure receives the 1-based attempt number.
pub fn retry_on_rejection<T, F>(retries: u32, mut attempt: F) -> Result<T, PipelineError>
where
    F: FnMut(u32) -> Result<T, PipelineError>,
{
    let mut n = 1;
    loop {
        match attempt(n) {
            Err(e) if e.is_push_rejection() && n <= retries => n += 1,
            other => return other,
        }
    }
}
