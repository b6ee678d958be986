//! Event normalization: raw payload + parsed message event -> `CanonicalEvent`.

use serde::Deserialize;
use serde_json::Value;

use crate::error::NormalizationError;
use crate::models::{CanonicalEvent, FileRef, MessageEvent};

/// Extract a canonical record from one inbound event.
///
/// Required fields are checked in order and the first failure is reported.
/// Attachments are best-effort: entries without a string `url_private` are
/// skipped with a warning.
pub fn normalize(
    payload: &Value,
    message: &MessageEvent,
) -> Result<CanonicalEvent, NormalizationError> {
    let event = match payload.get("event") {
        Some(event @ Value::Object(_)) => event,
        Some(_) => return Err(NormalizationError::Malformed { field: "event" }),
        None => return Err(NormalizationError::Missing { field: "event" }),
    };

    let author = required_str(event, "user", "event.user")?;
    let timestamp = required_str(event, "ts", "event.ts")?;
    let text = required_str(event, "text", "event.text")?;

    if !is_path_safe(&message.channel) {
        return Err(NormalizationError::Malformed { field: "channel" });
    }

    Ok(CanonicalEvent {
        author,
        timestamp,
        channel_id: message.channel.clone(),
        text,
        attachment_urls: attachment_urls(event),
    })
}

fn required_str(
    event: &Value,
    key: &str,
    field: &'static str,
) -> Result<String, NormalizationError> {
    match event.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(NormalizationError::Malformed { field }),
        None => Err(NormalizationError::Missing { field }),
    }
}

fn attachment_urls(event: &Value) -> Vec<String> {
    let Some(files) = event.get("files").and_then(Value::as_array) else {
        tracing::debug!("no files attached");
        return Vec::new();
    };

    files
        .iter()
        .enumerate()
        .filter_map(|(idx, file)| match FileRef::deserialize(file) {
            Ok(file) => Some(file.url_private),
            Err(e) => {
                tracing::warn!(index = idx, error = %e, "skipping attachment without url_private");
                None
            }
        })
        .collect()
}

/// The channel id becomes a file name, so it must be a single plain component.
fn is_path_safe(channel: &str) -> bool {
    !channel.is_empty()
        && channel != "."
        && channel != ".."
        && !channel.contains(['/', '\\', '\0'])
}
