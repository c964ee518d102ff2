//! Replies with the durable handles of attachments, so operators can copy
//! them into the asset configuration.
//!
//! Only messages whose caption or text mention `file_id` are answered.

use teloxide::types::Message;

/// Keyword that triggers the echo.
pub const ECHO_TRIGGER: &str = "file_id";

/// Durable handles found on a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachmentIds {
    /// Document handle
    pub document: Option<String>,
    /// Largest photo size handle
    pub photo: Option<String>,
    /// Video handle
    pub video: Option<String>,
    /// Audio handle
    pub audio: Option<String>,
    /// Voice handle
    pub voice: Option<String>,
    /// Animation handle
    pub animation: Option<String>,
}

impl AttachmentIds {
    /// Collect handles from a message.
    #[must_use]
    pub fn from_message(msg: &Message) -> Self {
        Self {
            document: msg.document().map(|d| d.file.id.to_string()),
            photo: msg
                .photo()
                .and_then(<[_]>::last)
                .map(|p| p.file.id.to_string()),
            video: msg.video().map(|v| v.file.id.to_string()),
            audio: msg.audio().map(|a| a.file.id.to_string()),
            voice: msg.voice().map(|v| v.file.id.to_string()),
            animation: msg.animation().map(|a| a.file.id.to_string()),
        }
    }

    /// Whether the message carries any attachment.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines().is_empty()
    }

    fn lines(&self) -> Vec<String> {
        [
            ("Document", &self.document),
            ("Photo", &self.photo),
            ("Video", &self.video),
            ("Audio", &self.audio),
            ("Voice", &self.voice),
            ("GIF", &self.animation),
        ]
        .into_iter()
        .filter_map(|(label, id)| id.as_ref().map(|id| format!("{label}: {id}")))
        .collect()
    }

    /// Reply text, one line per attachment.
    #[must_use]
    pub fn reply_text(&self) -> Option<String> {
        let lines = self.lines();
        (!lines.is_empty()).then(|| lines.join("\n"))
    }
}

/// Whether the caption or text asks for the handles.
#[must_use]
pub fn wants_echo(trigger: Option<&str>) -> bool {
    trigger.is_some_and(|text| text.trim().to_lowercase().contains(ECHO_TRIGGER))
}

/// Echo text for a message, if it asks for one and has attachments.
#[must_use]
pub fn echo_for(msg: &Message) -> Option<String> {
    if !wants_echo(msg.caption().or_else(|| msg.text())) {
        return None;
    }
    AttachmentIds::from_message(msg).reply_text()
}
