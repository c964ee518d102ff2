//! Error taxonomy for the funnel.
//!
//! Gateway failures are classified once, here, so that the delivery layer and
//! the membership poller can apply a single "swallow and log" policy instead
//! of ad hoc string checks at every call site.

use thiserror::Error;

/// Errors returned by a [`crate::gateway::MessagingGateway`] implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The bot is not allowed to act: blocked by the user, user deactivated,
    /// kicked from the chat.
    #[error("Forbidden: {0}")]
    Forbidden(String),
    /// The target conversation can no longer be resolved.
    #[error("Chat not found: {0}")]
    ChatNotFound(String),
    /// The request was rejected because of its parameters.
    #[error("Bad request: {0}")]
    BadRequest(String),
    /// Rate limited and the gateway gave up waiting.
    #[error("Rate limited (retry after {retry_after_secs}s)")]
    RateLimited {
        /// Seconds the server asked us to wait
        retry_after_secs: u64,
    },
    /// Transport-level failure after the gateway's own retries.
    #[error("Network error: {0}")]
    Network(String),
    /// Anything the gateway could not classify.
    #[error("Gateway error: {0}")]
    Other(String),
}

/// Classification of a gateway failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Recipient blocked the sender, account deactivated, or conversation
    /// not found. Expected background noise.
    TransientDelivery,
    /// Unsupported parameter combination for the target identity. Triggers
    /// a fallback chain where one exists.
    MalformedCall,
    /// Network, rate limit or unknown failures.
    Unclassified,
}

const BLOCKING_MARKERS: &[&str] = &["blocked", "deactivated", "chat not found"];

impl GatewayError {
    /// Classify this error.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Forbidden(_) | Self::ChatNotFound(_) => ErrorClass::TransientDelivery,
            Self::BadRequest(description) => {
                let lower = description.to_lowercase();
                if BLOCKING_MARKERS.iter().any(|m| lower.contains(m)) {
                    ErrorClass::TransientDelivery
                } else {
                    ErrorClass::MalformedCall
                }
            }
            Self::RateLimited { .. } | Self::Network(_) | Self::Other(_) => {
                ErrorClass::Unclassified
            }
        }
    }

    /// Whether the error means the bot itself is not authorized.
    #[must_use]
    pub const fn is_authorization_failure(&self) -> bool {
        matches!(self, Self::Forbidden(_))
    }
}

/// Top-level funnel errors.
#[derive(Debug, Error)]
pub enum FunnelError {
    /// Required startup configuration missing or invalid. Fatal.
    #[error("Configuration error: {0}")]
    Config(String),
    /// Membership status could not be determined.
    #[error("Membership query inconclusive: {0}")]
    MembershipQuery(String),
    /// A scheduled action failed or panicked.
    #[error("Scheduled job '{job}' failed: {reason}")]
    SchedulerAction {
        /// Job name
        job: String,
        /// Failure description
        reason: String,
    },
}

impl From<config::ConfigError> for FunnelError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
