#![deny(missing_docs)]
//! Telegram transport adapter for Oxide Funnel.

/// Update handlers.
pub mod bot;
/// Telegram transport configuration.
pub mod config;
/// `MessagingGateway` backed by the Bot API.
pub mod gateway;
/// Retry helpers for Bot API calls.
pub mod resilient;
/// Telegram runtime entrypoint.
pub mod runner;
