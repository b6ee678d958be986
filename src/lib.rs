//! Archive chat messages into a git repository.
//!
//! Each inbound message is normalized, appended to
//! `<repo>/<year>/<month>/<day>/<channel>.md` in a fresh clone of the archive
//! repository, committed as the bot, and pushed to `origin`.

pub mod archive;
pub mod archive_path;
pub mod config;
pub mod error;
pub mod git;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod server;
pub mod stats;

pub use config::Config;
pub use pipeline::{Outcome, Pipeline, Stage};
