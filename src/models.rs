use std::fmt;

use serde::Deserialize;

/// Outer Events API envelope. Only the variants the bot reacts to are typed.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    UrlVerification { challenge: String },
    EventCallback { event: InnerEvent },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InnerEvent {
    Message(MessageEvent),
    #[serde(other)]
    Other,
}

/// The parsed message event as delivered by the transport.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageEvent {
    #[serde(default)]
    pub channel: String,
}

impl MessageEvent {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
        }
    }
}

/// A file attached to a message. Only the private URL is recorded.
#[derive(Debug, Clone, Deserialize)]
pub struct FileRef {
    pub url_private: String,
}

/// A fully validated chat message, ready to be archived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalEvent {
    pub author: String,
    /// Source message id (`ts`), used verbatim.
    pub timestamp: String,
    pub channel_id: String,
    pub text: String,
    pub attachment_urls: Vec<String>,
}

impl CanonicalEvent {
    /// Text plus attachment lines, always newline-terminated.
    pub fn body(&self) -> String {
        let mut body = String::with_capacity(self.text.len() + 1);
        body.push_str(&self.text);
        body.push('\n');
        for url in &self.attachment_urls {
            body.push_str(url);
            body.push('\n');
        }
        body
    }

    pub fn entry(&self) -> ArchiveEntry {
        ArchiveEntry {
            timestamp: self.timestamp.clone(),
            author: self.author.clone(),
            body: self.body(),
        }
    }

    /// `(<timestamp>) <author>@<body>`
    pub fn commit_message(&self) -> String {
        format!("({}) {}@{}", self.timestamp, self.author, self.body())
    }
}

/// One block appended to a channel's daily file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub timestamp: String,
    pub author: String,
    pub body: String,
}

impl fmt::Display for ArchiveEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}) {}\n```\n{}```\n",
            self.timestamp, self.author, self.body
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(text: &str, urls: &[&str]) -> CanonicalEvent {
        CanonicalEvent {
            author: "U1".into(),
            timestamp: "171000.1".into(),
            channel_id: "C1".into(),
            text: text.into(),
            attachment_urls: urls.iter().map(|u| u.to_string()).collect(),
        }
    }

    #[test]
    fn test_entry_format() {
        let entry = event("hello", &[]).entry();
        assert_eq!(entry.to_string(), "(171000.1) U1\n```\nhello\n```\n");
    }

    #[test]
    fn test_entry_with_attachments() {
        let entry = event("see files", &["https://files/a.png", "https://files/b.pdf"]).entry();
        assert_eq!(
            entry.to_string(),
            "(171000.1) U1\n```\nsee files\nhttps://files/a.png\nhttps://files/b.pdf\n```\n"
        );
    }

    #[test]
    fn test_empty_text_still_has_body() {
        let ev = event("", &[]);
        assert_eq!(ev.body(), "\n");
        assert_eq!(ev.entry().to_string(), "(171000.1) U1\n```\n\n```\n");
    }

    #[test]
    fn test_commit_message() {
        let ev = event("hello", &["https://files/a.png"]);
        assert_eq!(ev.commit_message(), "(171000.1) U1@hello\nhttps://files/a.png\n");
    }

    #[test]
    fn test_envelope_parsing() {
        let raw = r#"{"type":"url_verification","challenge":"abc","token":"t"}"#;
        match serde_json::from_str::<Envelope>(raw).unwrap() {
            Envelope::UrlVerification { challenge } => assert_eq!(challenge, "abc"),
            other => panic!("unexpected envelope: {other:?}"),
        }

        let raw = r#"{"type":"event_callback","event":{"type":"message","channel":"C1","user":"U1"}}"#;
        match serde_json::from_str::<Envelope>(raw).unwrap() {
            Envelope::EventCallback {
                event: InnerEvent::Message(msg),
            } => assert_eq!(msg.channel, "C1"),
            other => panic!("unexpected envelope: {other:?}"),
        }

        let raw = r#"{"type":"event_callback","event":{"type":"reaction_added","user":"U1"}}"#;
        assert!(matches!(
            serde_json::from_str::<Envelope>(raw).unwrap(),
            Envelope::EventCallback {
                event: InnerEvent::Other
            }
        ));

        let raw = r#"{"type":"app_rate_limited"}"#;
        assert!(matches!(
            serde_json::from_str::<Envelope>(raw).unwrap(),
            Envelope::Other
        ));
    }
}
