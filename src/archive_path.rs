//! Date/channel partitioned archive paths.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Datelike, Utc};

use crate::error::PathResolutionError;

/// How date components are rendered in directory names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DateLayout {
    /// `2024/3/5`, the layout existing archives use.
    #[default]
    Unpadded,
    /// `2024/03/05`
    Padded,
}

/// `<repo>/<year>/<month>/<day>/<channel>.md`, relative to the repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePath {
    pub repo_name: String,
    pub year: String,
    pub month: String,
    pub day: String,
    pub channel_id: String,
}

impl ArchivePath {
    pub fn resolve(
        repo_url: &str,
        at: DateTime<Utc>,
        channel_id: &str,
        layout: DateLayout,
    ) -> Result<Self, PathResolutionError> {
        let repo_name = repo_name(repo_url)?.to_string();
        let (month, day) = match layout {
            DateLayout::Unpadded => (at.month().to_string(), at.day().to_string()),
            DateLayout::Padded => (format!("{:02}", at.month()), format!("{:02}", at.day())),
        };

        Ok(Self {
            repo_name,
            year: at.year().to_string(),
            month,
            day,
            channel_id: channel_id.to_string(),
        })
    }

    /// Directory holding the file, relative to the repository root.
    pub fn dir(&self) -> PathBuf {
        [&self.repo_name, &self.year, &self.month, &self.day]
            .iter()
            .collect()
    }

    pub fn file_name(&self) -> String {
        format!("{}.md", self.channel_id)
    }

    pub fn relative(&self) -> PathBuf {
        self.dir().join(self.file_name())
    }
}

/// Forward-slash form, as git stores it in the index.
impl fmt::Display for ArchivePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}.md",
            self.repo_name, self.year, self.month, self.day, self.channel_id
        )
    }
}

/// Repository name: text after the last `/`, cut at the first `.`.
pub fn repo_name(repo_url: &str) -> Result<&str, PathResolutionError> {
    let (_, last) = repo_url
        .rsplit_once('/')
        .ok_or_else(|| PathResolutionError::NoSeparator(repo_url.to_string()))?;
    let name = last.split('.').next().unwrap_or_default();
    if name.is_empty() {
        return Err(PathResolutionError::EmptyName(repo_url.to_string()));
    }
    Ok(name)
}
