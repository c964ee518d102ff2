//! Bot API implementation of [`MessagingGateway`].
//!
//! Translates outbound content into teloxide requests, maps request errors
//! into [`GatewayError`] and retries transport failures.

use crate::resilient::retry_telegram_operation;
use async_trait::async_trait;
use oxide_funnel_core::error::GatewayError;
use oxide_funnel_core::gateway::{
    ChatMembership, Formatting, LinkButton, MediaItem, MediaRef, MemberStatus, MessagingGateway,
    OutboundContent, SendOptions, SentMessage, Target,
};
use teloxide::payloads::setters::*;
use teloxide::prelude::*;
use teloxide::types::{
    BusinessConnectionId, ChatMemberKind, FileId, InlineKeyboardButton, InlineKeyboardMarkup,
    InputFile, InputMedia, InputMediaPhoto, InputMediaVideo, MessageId, ParseMode,
    ReplyParameters,
};
use teloxide::{ApiError, RequestError};
use url::Url;

/// Set business identity, keyboard and reply reference on a request.
macro_rules! with_common {
    ($req:expr, $target:expr, $options:expr, $markup:expr) => {{
        let mut req = $req;
        if let Some(id) = &$target.business_connection_id {
            req = req.business_connection_id(BusinessConnectionId(id.clone()));
        }
        if let Some(markup) = $markup {
            req = req.reply_markup(markup.clone());
        }
        if let Some(reply_to) = $options.reply_to {
            req = req.reply_parameters(ReplyParameters::new(MessageId(reply_to)));
        }
        req
    }};
}

/// Set caption and parse mode on a media request.
macro_rules! with_caption {
    ($req:expr, $options:expr) => {{
        let mut req = $req;
        if let Some(caption) = &$options.caption {
            req = req.caption(caption.clone());
        }
        if let Some(formatting) = $options.formatting {
            req = req.parse_mode(parse_mode(formatting));
        }
        req
    }};
}

/// Map a teloxide request error to a gateway error.
#[must_use]
pub fn map_request_error(err: RequestError) -> GatewayError {
    match err {
        RequestError::Api(api) => map_api_error(&api),
        RequestError::RetryAfter(after) => GatewayError::RateLimited {
            retry_after_secs: after.duration().as_secs(),
        },
        RequestError::MigrateToChatId(id) => {
            GatewayError::BadRequest(format!("group migrated to supergroup {id}"))
        }
        RequestError::Network(e) => GatewayError::Network(e.to_string()),
        RequestError::Io(e) => GatewayError::Network(e.to_string()),
        other => GatewayError::Other(other.to_string()),
    }
}

fn map_api_error(api: &ApiError) -> GatewayError {
    let description = api.to_string();
    match api {
        ApiError::BotBlocked
        | ApiError::BotKicked
        | ApiError::BotKickedFromSupergroup
        | ApiError::UserDeactivated
        | ApiError::CantInitiateConversation
        | ApiError::CantTalkWithBots => GatewayError::Forbidden(description),
        ApiError::ChatNotFound => GatewayError::ChatNotFound(description),
        _ if description.starts_with("Forbidden") => GatewayError::Forbidden(description),
        _ => GatewayError::BadRequest(description),
    }
}

const fn parse_mode(formatting: Formatting) -> ParseMode {
    match formatting {
        Formatting::Html => ParseMode::Html,
        Formatting::MarkdownV2 => ParseMode::MarkdownV2,
    }
}

/// Convert a media reference to an upload.
///
/// # Errors
///
/// Returns `GatewayError::BadRequest` for an unparsable URL.
pub fn input_file(media: &MediaRef) -> Result<InputFile, GatewayError> {
    match media {
        MediaRef::FileId(id) => Ok(InputFile::file_id(FileId(id.clone()))),
        MediaRef::Url(raw) => Url::parse(raw)
            .map(InputFile::url)
            .map_err(|e| GatewayError::BadRequest(format!("invalid media URL '{raw}': {e}"))),
        MediaRef::Bytes(bytes) => Ok(InputFile::memory(bytes.clone())),
    }
}

/// Build a one-button-per-row URL keyboard.
///
/// # Errors
///
/// Returns `GatewayError::BadRequest` if a button URL is invalid.
pub fn link_keyboard(buttons: &[LinkButton]) -> Result<Option<InlineKeyboardMarkup>, GatewayError> {
    if buttons.is_empty() {
        return Ok(None);
    }
    let rows = buttons
        .iter()
        .map(|button| {
            Url::parse(&button.url)
                .map(|url| vec![InlineKeyboardButton::url(button.text.clone(), url)])
                .map_err(|e| {
                    GatewayError::BadRequest(format!("invalid button URL '{}': {e}", button.url))
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(InlineKeyboardMarkup::new(rows)))
}

fn media_group_item(item: &MediaItem) -> Result<InputMedia, GatewayError> {
    Ok(match item {
        MediaItem::Photo(media) => InputMedia::Photo(InputMediaPhoto::new(input_file(media)?)),
        MediaItem::Video(media) => InputMedia::Video(InputMediaVideo::new(input_file(media)?)),
    })
}

fn membership_of(kind: &ChatMemberKind) -> ChatMembership {
    let status = if kind.is_owner() {
        MemberStatus::Creator
    } else if kind.is_administrator() {
        MemberStatus::Administrator
    } else if kind.is_restricted() {
        MemberStatus::Restricted
    } else if kind.is_left() {
        MemberStatus::Left
    } else if kind.is_banned() {
        MemberStatus::Kicked
    } else {
        MemberStatus::Member
    };
    let is_member = matches!(kind, ChatMemberKind::Restricted(restricted) if restricted.is_member);
    ChatMembership { status, is_member }
}

const fn sent(message: &Message) -> SentMessage {
    SentMessage {
        chat_id: message.chat.id.0,
        message_id: message.id.0,
    }
}

/// Gateway over a teloxide [`Bot`].
#[derive(Clone)]
pub struct TelegramGateway {
    bot: Bot,
}

impl TelegramGateway {
    /// Wrap a bot.
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// Underlying bot.
    #[must_use]
    pub const fn bot(&self) -> &Bot {
        &self.bot
    }

    async fn send_once(
        &self,
        target: &Target,
        content: &OutboundContent,
        options: &SendOptions,
        markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<SentMessage, GatewayError> {
        let bot = &self.bot;
        let chat_id = ChatId(target.chat_id);
        let message = match content {
            OutboundContent::Text(text) => {
                let mut req = with_common!(bot.send_message(chat_id, text.clone()), target, options, markup);
                if let Some(formatting) = options.formatting {
                    req = req.parse_mode(parse_mode(formatting));
                }
                req.await
            }
            OutboundContent::Photo(media) => {
                let req = with_common!(bot.send_photo(chat_id, input_file(media)?), target, options, markup);
                with_caption!(req, options).await
            }
            OutboundContent::Video(media) => {
                let req = with_common!(bot.send_video(chat_id, input_file(media)?), target, options, markup);
                with_caption!(req, options).await
            }
            OutboundContent::Audio(media) => {
                let req = with_common!(bot.send_audio(chat_id, input_file(media)?), target, options, markup);
                with_caption!(req, options).await
            }
            OutboundContent::Voice(media) => {
                let req = with_common!(bot.send_voice(chat_id, input_file(media)?), target, options, markup);
                with_caption!(req, options).await
            }
            OutboundContent::MediaGroup(items) => return self.send_album(target, items, options).await,
        }
        .map_err(map_request_error)?;
        Ok(sent(&message))
    }

    async fn send_album(
        &self,
        target: &Target,
        items: &[MediaItem],
        options: &SendOptions,
    ) -> Result<SentMessage, GatewayError> {
        let media = items
            .iter()
            .map(media_group_item)
            .collect::<Result<Vec<_>, _>>()?;
        let mut req = self.bot.send_media_group(ChatId(target.chat_id), media);
        if let Some(id) = &target.business_connection_id {
            req = req.business_connection_id(BusinessConnectionId(id.clone()));
        }
        if let Some(reply_to) = options.reply_to {
            req = req.reply_parameters(ReplyParameters::new(MessageId(reply_to)));
        }
        let messages = req.await.map_err(map_request_error)?;
        messages
            .first()
            .map(sent)
            .ok_or_else(|| GatewayError::Other("empty media group response".to_string()))
    }
}

#[async_trait]
impl MessagingGateway for TelegramGateway {
    async fn send(
        &self,
        target: &Target,
        content: &OutboundContent,
        options: &SendOptions,
    ) -> Result<SentMessage, GatewayError> {
        let markup = link_keyboard(&options.keyboard)?;
        let markup = markup.as_ref();
        retry_telegram_operation(move || self.send_once(target, content, options, markup)).await
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<(), GatewayError> {
        let bot = &self.bot;
        retry_telegram_operation(move || async move {
            bot.delete_message(ChatId(chat_id), MessageId(message_id))
                .await
                .map(|_| ())
                .map_err(map_request_error)
        })
        .await
    }

    async fn get_chat_member(
        &self,
        group_id: i64,
        user_id: u64,
    ) -> Result<ChatMembership, GatewayError> {
        let bot = &self.bot;
        retry_telegram_operation(move || async move {
            bot.get_chat_member(ChatId(group_id), UserId(user_id))
                .await
                .map(|member| membership_of(&member.kind))
                .map_err(map_request_error)
        })
        .await
    }

    async fn approve_join_request(&self, group_id: i64, user_id: u64) -> Result<(), GatewayError> {
        let bot = &self.bot;
        retry_telegram_operation(move || async move {
            bot.approve_chat_join_request(ChatId(group_id), UserId(user_id))
                .await
                .map(|_| ())
                .map_err(map_request_error)
        })
        .await
    }

    async fn get_file(&self, file_id: &str) -> Result<String, GatewayError> {
        let bot = &self.bot;
        retry_telegram_operation(move || async move {
            bot.get_file(FileId(file_id.to_string()))
                .await
                .map(|file| file.path)
                .map_err(map_request_error)
        })
        .await
    }

    fn file_url(&self, file_path: &str) -> String {
        let api_url = self.bot.api_url();
        format!(
            "{}/file/bot{}/{}",
            api_url.as_str().trim_end_matches('/'),
            self.bot.token(),
            file_path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::Seconds;

    #[test]
    fn test_blocked_and_deactivated_map_to_forbidden() {
        for api in [ApiError::BotBlocked, ApiError::UserDeactivated, ApiError::BotKicked] {
            assert!(matches!(
                map_request_error(RequestError::Api(api)),
                GatewayError::Forbidden(_)
            ));
        }
    }

    #[test]
    fn test_unknown_api_errors_split_on_prefix() {
        let forbidden = RequestError::Api(ApiError::Unknown(
            "Forbidden: bot is not a member of the channel chat".to_string(),
        ));
        assert!(matches!(map_request_error(forbidden), GatewayError::Forbidden(_)));

        let bad = RequestError::Api(ApiError::Unknown(
            "Bad Request: VOICE_MESSAGES_FORBIDDEN".to_string(),
        ));
        assert!(matches!(map_request_error(bad), GatewayError::BadRequest(_)));

        assert!(matches!(
            map_request_error(RequestError::Api(ApiError::ChatNotFound)),
            GatewayError::ChatNotFound(_)
        ));
    }

    #[test]
    fn test_retry_after_maps_to_rate_limit() {
        let err = RequestError::RetryAfter(Seconds::from_seconds(5));
        assert!(matches!(
            map_request_error(err),
            GatewayError::RateLimited { retry_after_secs: 5 }
        ));
    }

    #[test]
    fn test_link_keyboard_rejects_invalid_urls() {
        assert!(matches!(link_keyboard(&[]), Ok(None)));

        let valid = [LinkButton {
            text: "Join".to_string(),
            url: "https://pay.test/1m".to_string(),
        }];
        let markup = link_keyboard(&valid);
        assert!(matches!(&markup, Ok(Some(m)) if m.inline_keyboard.len() == 1));

        let invalid = [LinkButton {
            text: "Join".to_string(),
            url: "not a url".to_string(),
        }];
        assert!(matches!(link_keyboard(&invalid), Err(GatewayError::BadRequest(_))));
    }

    #[test]
    fn test_invalid_media_url_is_bad_request() {
        assert!(matches!(
            input_file(&MediaRef::Url("http://".to_string())),
            Err(GatewayError::BadRequest(_))
        ));
        assert!(input_file(&MediaRef::parse("AwACAgEAAxkB")).is_ok());
    }

    #[test]
    fn test_file_url_uses_token_and_api_url() {
        let gateway = TelegramGateway::new(Bot::new("123:abc"));
        assert_eq!(
            gateway.file_url("voice/file_0.oga"),
            "https://api.telegram.org/file/bot123:abc/voice/file_0.oga"
        );
    }
}
