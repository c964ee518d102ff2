//! Telegram transport settings.

use config::ConfigError;
use oxide_funnel_core::config::{FunnelSettings, FunnelTimings};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

/// Default HTTP port for the webhook and health endpoints.
pub const DEFAULT_PORT: u16 = 8080;
/// Default webhook path.
pub const DEFAULT_WEBHOOK_PATH: &str = "/telegram/webhook";

/// Telegram transport settings loaded from environment variables.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct TelegramSettings {
    /// Telegram Bot API token.
    pub telegram_bot_token: Option<String>,
    /// Public base URL for webhook mode.
    pub telegram_webhook_url: Option<String>,
    /// Webhook path appended to the base URL.
    pub telegram_webhook_path: Option<String>,
    /// Platform-provided public domain, used when no base URL is set.
    pub railway_public_domain: Option<String>,
    /// Platform-provided public URL, used when no domain is set.
    pub railway_url: Option<String>,
    /// HTTP port.
    pub port: Option<u16>,
}

/// Combined settings used by the Telegram transport layer.
#[derive(Clone)]
pub struct BotSettings {
    /// Funnel settings.
    pub funnel: Arc<FunnelSettings>,
    /// Funnel timings.
    pub timings: FunnelTimings,
    /// Telegram-specific settings.
    pub telegram: Arc<TelegramSettings>,
}

impl BotSettings {
    /// Create a new combined settings bundle.
    #[must_use]
    pub fn new(funnel: FunnelSettings, timings: FunnelTimings, telegram: TelegramSettings) -> Self {
        Self {
            funnel: Arc::new(funnel),
            timings,
            telegram: Arc::new(telegram),
        }
    }
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

impl TelegramSettings {
    /// Create new settings by loading from environment and files.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or the bot token is missing.
    pub fn new() -> Result<Self, ConfigError> {
        let settings: Self = oxide_funnel_core::config::build_config()?.try_deserialize()?;
        settings.token()?;
        Ok(settings)
    }

    /// Bot token.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if the token is missing or blank.
    pub fn token(&self) -> Result<&str, ConfigError> {
        non_empty(self.telegram_bot_token.as_ref())
            .ok_or_else(|| ConfigError::NotFound("TELEGRAM_BOT_TOKEN".to_string()))
    }

    /// HTTP port, defaulting to [`DEFAULT_PORT`].
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// Webhook path, always starting with `/`.
    #[must_use]
    pub fn webhook_path(&self) -> String {
        let path = non_empty(self.telegram_webhook_path.as_ref()).unwrap_or(DEFAULT_WEBHOOK_PATH);
        if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        }
    }

    /// Public base URL, if webhook mode is configured.
    ///
    /// An explicit base URL wins, then the platform domain, then the
    /// platform URL. A bare domain is prefixed with `https://`.
    #[must_use]
    pub fn webhook_base(&self) -> Option<String> {
        if let Some(base) = non_empty(self.telegram_webhook_url.as_ref()) {
            return Some(base.to_string());
        }
        let domain = non_empty(self.railway_public_domain.as_ref())
            .or_else(|| non_empty(self.railway_url.as_ref()))?;
        if domain.starts_with("http") {
            Some(domain.to_string())
        } else {
            Some(format!("https://{domain}"))
        }
    }

    /// Full webhook URL. `None` means long polling.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Message` if the resulting URL is invalid.
    pub fn webhook_url(&self) -> Result<Option<Url>, ConfigError> {
        let Some(base) = self.webhook_base() else {
            return Ok(None);
        };
        let full = format!("{}{}", base.trim_end_matches('/'), self.webhook_path());
        Url::parse(&full)
            .map(Some)
            .map_err(|e| ConfigError::Message(format!("invalid webhook URL '{full}': {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_public_url_means_polling() -> Result<(), ConfigError> {
        let settings = TelegramSettings::default();
        assert_eq!(settings.webhook_url()?, None);
        assert_eq!(settings.port(), 8080);
        assert_eq!(settings.webhook_path(), "/telegram/webhook");
        Ok(())
    }

    #[test]
    fn test_explicit_base_wins_over_platform_domain() -> Result<(), ConfigError> {
        let settings = TelegramSettings {
            telegram_webhook_url: Some("https://bot.example.com/".to_string()),
            railway_public_domain: Some("app.up.railway.app".to_string()),
            ..TelegramSettings::default()
        };
        assert_eq!(
            settings.webhook_url()?.map(String::from),
            Some("https://bot.example.com/telegram/webhook".to_string())
        );
        Ok(())
    }

    #[test]
    fn test_platform_domain_gets_https_scheme() -> Result<(), ConfigError> {
        let settings = TelegramSettings {
            railway_public_domain: Some("  ".to_string()),
            railway_url: Some("app.up.railway.app".to_string()),
            telegram_webhook_path: Some("hook".to_string()),
            ..TelegramSettings::default()
        };
        assert_eq!(
            settings.webhook_url()?.map(String::from),
            Some("https://app.up.railway.app/hook".to_string())
        );
        Ok(())
    }

    #[test]
    fn test_missing_token_is_reported() {
        let settings = TelegramSettings {
            telegram_bot_token: Some(String::new()),
            ..TelegramSettings::default()
        };
        assert!(settings.token().is_err());
    }
}
