//! Telegram runtime: dispatcher wiring, webhook or long polling, and the
//! health endpoint.
//!
//! Both transports subscribe to every update kind explicitly; Telegram
//! otherwise keeps whatever subscription was stored last.

use crate::bot::handlers::{handle_business_connection, handle_join_request, handle_message};
use crate::config::BotSettings;
use crate::gateway::TelegramGateway;
use axum::routing::get;
use axum::{Json, Router};
use oxide_funnel_core::funnel::FunnelEngine;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use teloxide::dispatching::{DefaultKey, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::AllowedUpdate;
use teloxide::update_listeners::{webhooks, Polling};
use teloxide::RequestError;
use tracing::{error, info, warn};

type BotDispatcher = Dispatcher<Bot, RequestError, DefaultKey>;

/// Update kinds the bot subscribes to.
#[must_use]
pub fn allowed_updates() -> Vec<AllowedUpdate> {
    vec![
        AllowedUpdate::Message,
        AllowedUpdate::EditedMessage,
        AllowedUpdate::ChannelPost,
        AllowedUpdate::EditedChannelPost,
        AllowedUpdate::BusinessConnection,
        AllowedUpdate::BusinessMessage,
        AllowedUpdate::EditedBusinessMessage,
        AllowedUpdate::DeletedBusinessMessages,
        AllowedUpdate::MessageReaction,
        AllowedUpdate::MessageReactionCount,
        AllowedUpdate::InlineQuery,
        AllowedUpdate::ChosenInlineResult,
        AllowedUpdate::CallbackQuery,
        AllowedUpdate::ShippingQuery,
        AllowedUpdate::PreCheckoutQuery,
        AllowedUpdate::Poll,
        AllowedUpdate::PollAnswer,
        AllowedUpdate::MyChatMember,
        AllowedUpdate::ChatMember,
        AllowedUpdate::ChatJoinRequest,
        AllowedUpdate::ChatBoost,
        AllowedUpdate::RemovedChatBoost,
    ]
}

/// Run the Telegram transport runtime.
///
/// Uses a webhook when a public URL is configured and long polling
/// otherwise. Either way `/healthz` is served on the configured port. On
/// exit all pending funnel jobs are cancelled.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the webhook or HTTP
/// server cannot be set up.
pub async fn run_bot(settings: Arc<BotSettings>) -> anyhow::Result<()> {
    let bot = Bot::new(settings.telegram.token()?);
    let engine = init_engine(&bot, &settings)?;
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.telegram.port()));

    let mut dispatcher = Dispatcher::builder(bot.clone(), setup_handler())
        .dependencies(dptree::deps![Arc::clone(&engine)])
        .enable_ctrlc_handler()
        .build();

    let result = match settings.telegram.webhook_url()? {
        Some(url) => run_webhook(bot, &mut dispatcher, addr, url).await,
        None => run_polling(bot, &mut dispatcher, addr).await,
    };

    engine.shutdown();
    info!("Bot stopped");
    result
}

fn init_engine(bot: &Bot, settings: &BotSettings) -> anyhow::Result<Arc<FunnelEngine>> {
    let gateway = Arc::new(TelegramGateway::new(bot.clone()));
    let engine = FunnelEngine::from_settings(gateway, &settings.funnel, settings.timings)?;

    let timings = engine.timings();
    info!(
        "Funnel engine initialized (group: {}, reply delay: {}s, offer delay: {}s, check interval: {}s, max checks: {})",
        engine.group_id(),
        timings.auto_reply_delay.as_secs(),
        timings.vip_offer_delay.as_secs(),
        timings.group_check_interval.as_secs(),
        timings.group_check_max_attempts
    );
    Ok(Arc::new(engine))
}

fn setup_handler() -> UpdateHandler<RequestError> {
    dptree::entry()
        .branch(Update::filter_business_connection().endpoint(handle_business_connection))
        .branch(Update::filter_chat_join_request().endpoint(handle_join_request))
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_business_message().endpoint(handle_message))
}

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn health_router() -> Router {
    Router::new().route("/healthz", get(healthz))
}

async fn run_webhook(
    bot: Bot,
    dispatcher: &mut BotDispatcher,
    addr: SocketAddr,
    url: url::Url,
) -> anyhow::Result<()> {
    info!("Starting in webhook mode at {url}");
    // The listener setup below omits the subscription, which keeps this one
    bot.set_webhook(url.clone())
        .allowed_updates(allowed_updates())
        .drop_pending_updates(true)
        .await?;
    let options = webhooks::Options::new(addr, url).drop_pending_updates();
    let (listener, stop_flag, router) = webhooks::axum_to_router(bot, options).await?;
    let app = router.merge(health_router());

    let tcp = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP server listening on {addr}");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(tcp, app)
            .with_graceful_shutdown(stop_flag)
            .await
        {
            error!("HTTP server error: {e}");
        }
    });

    dispatcher
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("An error from the update listener"),
        )
        .await;
    Ok(())
}

async fn run_polling(
    bot: Bot,
    dispatcher: &mut BotDispatcher,
    addr: SocketAddr,
) -> anyhow::Result<()> {
    info!("No public URL configured, starting in polling mode");
    if let Err(e) = bot.delete_webhook().drop_pending_updates(true).await {
        warn!("Failed to delete webhook: {e}");
    }

    let tcp = tokio::net::TcpListener::bind(addr).await?;
    info!("Health endpoint listening on {addr}");
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(tcp, health_router()).await {
            error!("Health server error: {e}");
        }
    });

    let listener = Polling::builder(bot)
        .allowed_updates(allowed_updates())
        .drop_pending_updates()
        .build();
    dispatcher
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("An error from the update listener"),
        )
        .await;
    server.abort();
    Ok(())
}
