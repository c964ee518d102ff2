//! Messaging gateway abstraction
//!
//! The funnel never talks to a messaging platform directly. Everything goes
//! through [`MessagingGateway`], which a transport crate implements.

use crate::error::GatewayError;
use async_trait::async_trait;

/// Where an outbound message goes, and as whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Chat to deliver to
    pub chat_id: i64,
    /// Recipient user, used for logging only
    pub user_id: Option<u64>,
    /// Alternate send-as identity
    pub business_connection_id: Option<String>,
}

/// Reference to a media asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaRef {
    /// Durable content handle already known to the platform
    FileId(String),
    /// Publicly reachable URL
    Url(String),
    /// Raw bytes uploaded with the request
    Bytes(Vec<u8>),
}

impl MediaRef {
    /// Parse a configured asset identifier.
    ///
    /// Strings starting with `http://` or `https://` are URLs, anything else
    /// is treated as a durable file handle.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.starts_with("http://") || raw.starts_with("https://") {
            Self::Url(raw.to_string())
        } else {
            Self::FileId(raw.to_string())
        }
    }

    /// Durable handle, if this is one.
    #[must_use]
    pub fn file_id(&self) -> Option<&str> {
        match self {
            Self::FileId(id) => Some(id),
            Self::Url(_) | Self::Bytes(_) => None,
        }
    }
}

/// A single item of a grouped album.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaItem {
    /// Photo
    Photo(MediaRef),
    /// Video
    Video(MediaRef),
}

/// What to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundContent {
    /// Plain or formatted text
    Text(String),
    /// Single photo
    Photo(MediaRef),
    /// Single video
    Video(MediaRef),
    /// Generic audio attachment
    Audio(MediaRef),
    /// Native voice note
    Voice(MediaRef),
    /// Album of photos or videos
    MediaGroup(Vec<MediaItem>),
}

impl OutboundContent {
    /// Short name used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Photo(_) => "photo",
            Self::Video(_) => "video",
            Self::Audio(_) => "audio",
            Self::Voice(_) => "voice",
            Self::MediaGroup(_) => "media_group",
        }
    }
}

/// Text formatting mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Formatting {
    /// HTML markup
    Html,
    /// MarkdownV2 markup
    MarkdownV2,
}

/// Inline button that opens a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkButton {
    /// Button label
    pub text: String,
    /// Target URL
    pub url: String,
}

/// Optional parameters for a send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Caption for media sends
    pub caption: Option<String>,
    /// Parse mode for text or caption
    pub formatting: Option<Formatting>,
    /// One button per row
    pub keyboard: Vec<LinkButton>,
    /// Message to reply to
    pub reply_to: Option<i32>,
}

impl SendOptions {
    /// Options carrying only a keyboard.
    #[must_use]
    pub fn with_keyboard(keyboard: Vec<LinkButton>) -> Self {
        Self {
            keyboard,
            ..Self::default()
        }
    }
}

/// A message accepted by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentMessage {
    /// Chat the message landed in
    pub chat_id: i64,
    /// Platform message id
    pub message_id: i32,
}

/// Raw membership status as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    /// Group owner
    Creator,
    /// Administrator
    Administrator,
    /// Regular member
    Member,
    /// Restricted member
    Restricted,
    /// Not in the group
    Left,
    /// Banned from the group
    Kicked,
}

/// Result of a membership query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatMembership {
    /// Reported status
    pub status: MemberStatus,
    /// Explicit membership flag (set for restricted members still in the chat)
    pub is_member: bool,
}

impl ChatMembership {
    /// Whether the user counts as a member of the group.
    #[must_use]
    pub const fn counts_as_member(&self) -> bool {
        matches!(
            self.status,
            MemberStatus::Member | MemberStatus::Administrator | MemberStatus::Creator
        ) || self.is_member
    }
}

/// Outbound capabilities of a messaging platform.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Send content to a target. Media groups return the first message.
    async fn send(
        &self,
        target: &Target,
        content: &OutboundContent,
        options: &SendOptions,
    ) -> Result<SentMessage, GatewayError>;

    /// Delete a message.
    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<(), GatewayError>;

    /// Query membership of `user_id` in `group_id`.
    async fn get_chat_member(
        &self,
        group_id: i64,
        user_id: u64,
    ) -> Result<ChatMembership, GatewayError>;

    /// Approve a pending join request.
    async fn approve_join_request(&self, group_id: i64, user_id: u64)
        -> Result<(), GatewayError>;

    /// Resolve a durable handle to a server-side file path.
    async fn get_file(&self, file_id: &str) -> Result<String, GatewayError>;

    /// Build a direct download URL for a file path returned by [`Self::get_file`].
    fn file_url(&self, file_path: &str) -> String;
}
