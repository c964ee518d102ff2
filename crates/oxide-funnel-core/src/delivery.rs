//! Resilient delivery on top of a [`MessagingGateway`].
//!
//! Every outbound call goes through [`Delivery`], which returns `Option`
//! instead of `Result`: a failed send is logged according to its
//! [`ErrorClass`] and reported as "not delivered", never propagated. Two
//! fallback chains are built in:
//!
//! - voice: native voice, then voice from a resolved file URL (durable
//!   handles only), then generic audio;
//! - replies: a reply that fails on parameter shape is retried as a direct
//!   send to the same chat and business identity.

use crate::error::{ErrorClass, GatewayError};
use crate::gateway::{
    MediaItem, MediaRef, MessagingGateway, OutboundContent, SendOptions, SentMessage, Target,
};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Bot API file links stay valid for at least one hour.
const FILE_URL_TTL: Duration = Duration::from_secs(50 * 60);
const FILE_URL_CACHE_CAPACITY: u64 = 1_000;

/// Inbound message a reply refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTo {
    /// Chat of the inbound message
    pub chat_id: i64,
    /// Inbound message id
    pub message_id: i32,
    /// Sender, used for logging only
    pub user_id: Option<u64>,
    /// Business identity the inbound message arrived through
    pub business_connection_id: Option<String>,
}

impl ReplyTo {
    fn target(&self) -> Target {
        Target {
            chat_id: self.chat_id,
            user_id: self.user_id,
            business_connection_id: self.business_connection_id.clone(),
        }
    }
}

/// How a batch of media is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchPlan {
    /// Nothing configured
    Skip,
    /// Exactly one item, sent on its own
    Single(MediaItem),
    /// Two or more items, sent as an album
    Group(Vec<MediaItem>),
}

impl BatchPlan {
    /// Albums need at least two items; a single item goes out on its own.
    #[must_use]
    pub fn for_items(mut items: Vec<MediaItem>) -> Self {
        match items.len() {
            0 => Self::Skip,
            1 => items.pop().map_or(Self::Skip, Self::Single),
            _ => Self::Group(items),
        }
    }
}

/// Log a swallowed delivery failure.
///
/// This is the one place where delivery errors end up; callers only see
/// "not delivered".
pub fn absorb(target: &Target, kind: &str, err: &GatewayError) {
    match err.class() {
        ErrorClass::TransientDelivery => info!(
            chat_id = target.chat_id,
            user_id = ?target.user_id,
            kind,
            "Recipient unreachable (blocked, deactivated or chat gone): {err}"
        ),
        ErrorClass::MalformedCall => warn!(
            chat_id = target.chat_id,
            user_id = ?target.user_id,
            kind,
            "Delivery rejected by the platform: {err}"
        ),
        ErrorClass::Unclassified => error!(
            chat_id = target.chat_id,
            user_id = ?target.user_id,
            kind,
            "Delivery failed: {err}"
        ),
    }
}

/// Delivery layer with fallback chains.
#[derive(Clone)]
pub struct Delivery {
    gateway: Arc<dyn MessagingGateway>,
    file_urls: Cache<String, String>,
}

impl Delivery {
    /// Wrap a gateway.
    #[must_use]
    pub fn new(gateway: Arc<dyn MessagingGateway>) -> Self {
        let file_urls = Cache::builder()
            .max_capacity(FILE_URL_CACHE_CAPACITY)
            .time_to_live(FILE_URL_TTL)
            .build();
        Self { gateway, file_urls }
    }

    /// Underlying gateway.
    #[must_use]
    pub fn gateway(&self) -> &Arc<dyn MessagingGateway> {
        &self.gateway
    }

    /// Send anything, absorbing failures.
    pub async fn send(
        &self,
        target: &Target,
        content: &OutboundContent,
        options: &SendOptions,
    ) -> Option<SentMessage> {
        match self.gateway.send(target, content, options).await {
            Ok(sent) => Some(sent),
            Err(e) => {
                absorb(target, content.kind(), &e);
                None
            }
        }
    }

    /// Send plain text.
    pub async fn send_text(&self, target: &Target, text: &str) -> Option<SentMessage> {
        self.send(
            target,
            &OutboundContent::Text(text.to_string()),
            &SendOptions::default(),
        )
        .await
    }

    /// Send a voice clip, degrading to a URL-based voice send and then to a
    /// plain audio attachment.
    ///
    /// Each level is tried at most once.
    pub async fn send_voice_prefer(
        &self,
        target: &Target,
        voice: &MediaRef,
        options: &SendOptions,
    ) -> Option<SentMessage> {
        match self
            .gateway
            .send(target, &OutboundContent::Voice(voice.clone()), options)
            .await
        {
            Ok(sent) => return Some(sent),
            Err(e) => debug!(chat_id = target.chat_id, "Native voice send failed: {e}"),
        }

        if let Some(file_id) = voice.file_id() {
            if let Some(url) = self.resolve_file_url(file_id).await {
                let by_url = OutboundContent::Voice(MediaRef::Url(url));
                match self.gateway.send(target, &by_url, options).await {
                    Ok(sent) => return Some(sent),
                    Err(e) => debug!(chat_id = target.chat_id, "Voice send by URL failed: {e}"),
                }
            }
        }

        self.send(target, &OutboundContent::Audio(voice.clone()), options)
            .await
    }

    /// Send a batch of photos or videos: nothing, a single item, or an album.
    pub async fn send_batch(&self, target: &Target, items: Vec<MediaItem>) -> Option<SentMessage> {
        let content = match BatchPlan::for_items(items) {
            BatchPlan::Skip => return None,
            BatchPlan::Single(MediaItem::Photo(photo)) => OutboundContent::Photo(photo),
            BatchPlan::Single(MediaItem::Video(video)) => OutboundContent::Video(video),
            BatchPlan::Group(items) => OutboundContent::MediaGroup(items),
        };
        self.send(target, &content, &SendOptions::default()).await
    }

    /// Reply to an inbound message.
    ///
    /// If the reply is rejected because of its parameters, the text is sent
    /// directly to the chat under the same business identity instead.
    pub async fn reply_text(
        &self,
        origin: &ReplyTo,
        text: &str,
        options: &SendOptions,
    ) -> Option<SentMessage> {
        let target = origin.target();
        let content = OutboundContent::Text(text.to_string());
        let reply_options = SendOptions {
            reply_to: Some(origin.message_id),
            ..options.clone()
        };

        match self.gateway.send(&target, &content, &reply_options).await {
            Ok(sent) => Some(sent),
            Err(e) if e.class() == ErrorClass::MalformedCall => {
                debug!(chat_id = origin.chat_id, "Reply rejected, sending directly: {e}");
                let direct = SendOptions {
                    reply_to: None,
                    ..options.clone()
                };
                self.send(&target, &content, &direct).await
            }
            Err(e) => {
                absorb(&target, content.kind(), &e);
                None
            }
        }
    }

    /// Delete a message. Returns whether it was deleted.
    pub async fn delete_message(&self, chat_id: i64, message_id: i32) -> bool {
        match self.gateway.delete_message(chat_id, message_id).await {
            Ok(()) => true,
            Err(e) => {
                debug!(chat_id, message_id, "Message deletion skipped: {e}");
                false
            }
        }
    }

    async fn resolve_file_url(&self, file_id: &str) -> Option<String> {
        if let Some(url) = self.file_urls.get(file_id).await {
            return Some(url);
        }

        match self.gateway.get_file(file_id).await {
            Ok(path) if !path.is_empty() => {
                let url = self.gateway.file_url(path.trim_start_matches('/'));
                self.file_urls
                    .insert(file_id.to_string(), url.clone())
                    .await;
                Some(url)
            }
            Ok(_) => None,
            Err(e) => {
                debug!("Could not resolve file handle: {e}");
                None
            }
        }
    }
}
