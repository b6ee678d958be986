//! Error types for the archival pipeline.

use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::Stage;

/// The inbound event could not be turned into a `CanonicalEvent`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("missing required field `{field}`")]
    Missing { field: &'static str },

    #[error("malformed field `{field}`")]
    Malformed { field: &'static str },
}

impl NormalizationError {
    pub fn field(&self) -> &'static str {
        match self {
            Self::Missing { field } | Self::Malformed { field } => field,
        }
    }
}

/// The configured repository URL does not yield a repository name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathResolutionError {
    #[error("repository url `{0}` has no `/` separator")]
    NoSeparator(String),

    #[error("repository url `{0}` has no repository name segment")]
    EmptyName(String),
}

#[derive(Error, Debug)]
pub enum CloneError {
    #[error("failed to create snapshot directory: {0}")]
    TempDir(#[source] std::io::Error),

    #[error("failed to clone {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: git2::Error,
    },

    #[error("failed to initialize empty snapshot for {url}: {source}")]
    Init {
        url: String,
        #[source]
        source: git2::Error,
    },
}

/// A failure while appending to the working tree.
///
/// Every variant reports the same pipeline stage; the variant records which
/// filesystem step failed.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to close {path}: {source}")]
    Close {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
#[error("failed to stage {path}: {source}")]
pub struct StageError {
    pub path: String,
    #[source]
    pub source: git2::Error,
}

#[derive(Error, Debug)]
#[error("failed to commit: {0}")]
pub struct CommitError(#[from] pub git2::Error);

#[derive(Error, Debug)]
pub enum PushError {
    /// The remote refused the update because it is not a fast-forward.
    #[error("push of {refname} rejected: {reason}")]
    Rejected { refname: String, reason: String },

    #[error("push failed: {0}")]
    Transport(#[source] git2::Error),

    #[error("HEAD is not on a branch")]
    DetachedHead,
}

impl PushError {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// Any failure of a single pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    #[error(transparent)]
    PathResolution(#[from] PathResolutionError),

    #[error(transparent)]
    Clone(#[from] CloneError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error(transparent)]
    Push(#[from] PushError),
}

impl PipelineError {
    /// The state the run failed to reach.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Normalization(_) => Stage::Normalized,
            Self::Clone(_) => Stage::Cloned,
            Self::PathResolution(_) | Self::Write(_) => Stage::Archived,
            Self::Stage(_) | Self::Commit(_) => Stage::Committed,
            Self::Push(_) => Stage::Published,
        }
    }

    pub fn is_push_rejection(&self) -> bool {
        matches!(self, Self::Push(e) if e.is_rejected())
    }
}

/// Startup configuration errors. These abort the process.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is empty")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
