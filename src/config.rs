//! Startup configuration.
//!
//! Read once from the environment (after `.env` is loaded) and passed by
//! reference into the pipeline and HTTP layer.

use std::fmt;
use std::str::FromStr;

use crate::archive_path::{self, DateLayout};
use crate::error::ConfigError;

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
pub const DEFAULT_AUTHOR_NAME: &str = "real-history-bot";
pub const DEFAULT_AUTHOR_EMAIL: &str = "realhistorybot@example.com";

#[derive(Clone)]
pub struct SlackConfig {
    pub app_token: String,
    pub bot_token: String,
    /// When set, inbound requests must carry a valid Slack signature.
    pub signing_secret: Option<String>,
}

#[derive(Clone)]
pub struct RepositoryConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    /// 0 clones full history.
    pub clone_depth: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub name: String,
    pub email: String,
}

impl Default for BotIdentity {
    fn default() -> Self {
        Self {
            name: DEFAULT_AUTHOR_NAME.to_string(),
            email: DEFAULT_AUTHOR_EMAIL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub slack: SlackConfig,
    pub repository: RepositoryConfig,
    pub identity: BotIdentity,
    pub date_layout: DateLayout,
    /// Extra clone/commit/push cycles after a non-fast-forward rejection.
    pub push_conflict_retries: u32,
    pub bind_address: String,
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| -> Result<String, ConfigError> {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(key))
        };
        let optional = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let slack = SlackConfig {
            app_token: required("SLACK_APP_TOKEN")?,
            bot_token: required("SLACK_BOT_TOKEN")?,
            signing_secret: optional("SLACK_SIGNING_SECRET"),
        };

        let url = required("GIT_REPOSITORY_URL")?;
        archive_path::repo_name(&url).map_err(|e| ConfigError::Invalid {
            key: "GIT_REPOSITORY_URL",
            reason: e.to_string(),
        })?;

        let repository = RepositoryConfig {
            url,
            username: required("GIT_REPOSITORY_USERNAME")?,
            password: required("GIT_REPOSITORY_PASSWORD")?,
            clone_depth: parse_or("GIT_CLONE_DEPTH", optional("GIT_CLONE_DEPTH"), 1)?,
        };

        let identity = BotIdentity {
            name: optional("GIT_AUTHOR_NAME").unwrap_or_else(|| DEFAULT_AUTHOR_NAME.into()),
            email: optional("GIT_AUTHOR_EMAIL").unwrap_or_else(|| DEFAULT_AUTHOR_EMAIL.into()),
        };

        let date_layout = match optional("ARCHIVE_DATE_LAYOUT").as_deref() {
            None | Some("unpadded") => DateLayout::Unpadded,
            Some("padded") => DateLayout::Padded,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "ARCHIVE_DATE_LAYOUT",
                    reason: format!("expected `unpadded` or `padded`, got `{other}`"),
                })
            }
        };

        Ok(Self {
            slack,
            repository,
            identity,
            date_layout,
            push_conflict_retries: parse_or(
                "GIT_PUSH_CONFLICT_RETRIES",
                optional("GIT_PUSH_CONFLICT_RETRIES"),
                0,
            )?,
            bind_address: optional("BIND_ADDRESS")
                .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
        })
    }
}

fn parse_or<T>(key: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
    }
}

fn redact(secret: &str) -> String {
    format!("<redacted, {} chars>", secret.len())
}

impl fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlackConfig")
            .field("app_token", &redact(&self.app_token))
            .field("bot_token", &redact(&self.bot_token))
            .field("signing_secret", &self.signing_secret.as_deref().map(redact))
            .finish()
    }
}

impl fmt::Debug for RepositoryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("clone_depth", &self.clone_depth)
            .finish()
    }
}
