//! Update handlers.
//!
//! Private messages feed the funnel. Attachments elsewhere may ask for
//! their handles. Business connection changes are logged and join requests
//! for the funnel group are approved.

use super::attachments::echo_for;
use oxide_funnel_core::delivery::ReplyTo;
use oxide_funnel_core::funnel::{Admission, ChatKind, FunnelEngine, InboundMessage, Sender};
use oxide_funnel_core::gateway::SendOptions;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{BusinessConnection, Chat, ChatJoinRequest, MessageKind};
use tracing::{debug, info};

/// Kind of a Telegram chat.
#[must_use]
pub fn chat_kind(chat: &Chat) -> ChatKind {
    if chat.is_private() {
        ChatKind::Private
    } else if chat.is_supergroup() {
        ChatKind::Supergroup
    } else if chat.is_channel() {
        ChatKind::Channel
    } else {
        ChatKind::Group
    }
}

/// Reduce a Telegram message to what the funnel needs.
#[must_use]
pub fn inbound_from(msg: &Message) -> InboundMessage {
    InboundMessage {
        chat_id: msg.chat.id.0,
        chat_kind: chat_kind(&msg.chat),
        message_id: msg.id.0,
        sender: msg.from.as_ref().map(|user| Sender {
            user_id: user.id.0,
            is_bot: user.is_bot,
        }),
        business_connection_id: match &msg.kind {
            MessageKind::Common(common) => common.business_connection_id.as_ref().map(|id| id.0.clone()),
            _ => None,
        },
    }
}

/// Handle a regular or business message.
///
/// Private chats go to the funnel; anything else only gets the attachment
/// echo.
pub async fn handle_message(
    msg: Message,
    engine: Arc<FunnelEngine>,
) -> Result<(), teloxide::RequestError> {
    let inbound = inbound_from(&msg);

    if inbound.chat_kind == ChatKind::Private {
        match engine.on_inbound(&inbound) {
            Admission::Admitted => {}
            Admission::Ignored(reason) => {
                debug!(chat_id = inbound.chat_id, ?reason, "Message not admitted to funnel");
            }
        }
        return respond(());
    }

    if let Some(text) = echo_for(&msg) {
        let origin = ReplyTo {
            chat_id: inbound.chat_id,
            message_id: inbound.message_id,
            user_id: inbound.sender.map(|sender| sender.user_id),
            business_connection_id: inbound.business_connection_id,
        };
        engine
            .delivery()
            .reply_text(&origin, &text, &SendOptions::default())
            .await;
    }
    respond(())
}

/// Log business connection changes.
pub async fn handle_business_connection(
    connection: BusinessConnection,
) -> Result<(), teloxide::RequestError> {
    let status = if connection.is_enabled {
        "connected"
    } else {
        "disconnected"
    };
    info!(
        connection_id = %connection.id.0,
        user_id = connection.user.id.0,
        "Business connection {status}"
    );
    respond(())
}

/// Approve join requests for the funnel group.
pub async fn handle_join_request(
    request: ChatJoinRequest,
    engine: Arc<FunnelEngine>,
) -> Result<(), teloxide::RequestError> {
    let decision = engine
        .handle_join_request(request.chat.id.0, request.from.id.0)
        .await;
    debug!(chat_id = request.chat.id.0, ?decision, "Join request handled");
    respond(())
}
