mod redact;

use dotenvy::dotenv;
use oxide_funnel_core::config::{FunnelSettings, FunnelTimings};
use oxide_funnel_transport_telegram::config::{BotSettings, TelegramSettings};
use oxide_funnel_transport_telegram::runner::run_bot;
use redact::{RedactingMakeWriter, RedactionPatterns};
use std::io;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    // Before logging, so nothing is written unredacted
    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);

    init_logging(patterns);

    info!("Starting Oxide Funnel bot...");

    let settings = match load_settings() {
        Ok(settings) => Arc::new(settings),
        Err(reason) => {
            error!("Refusing to start the funnel, invalid {reason}");
            std::process::exit(1);
        }
    };
    info!("Serving {}", startup_summary(&settings));

    if let Err(e) = run_bot(settings).await {
        error!("Bot terminated with error: {e:#}");
        std::process::exit(1);
    }

    Ok(())
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter::new(io::stderr, patterns);

    let debug_mode = std::env::var("DEBUG_MODE")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    let filter = if debug_mode {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "oxide_funnel_core=info,oxide_funnel_transport_telegram=info,oxide_funnel_bot=info,teloxide=warn,hyper=warn,h2=error,reqwest=warn,tokio=warn,tower=warn,axum=warn",
            )
        })
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

/// Load both settings layers, naming the variables to check on failure.
fn load_settings() -> Result<BotSettings, String> {
    let funnel = FunnelSettings::new()
        .map_err(|e| format!("funnel settings (GROUP_ID, assets, purchase links): {e}"))?;
    let telegram = TelegramSettings::new()
        .map_err(|e| format!("telegram settings (TELEGRAM_BOT_TOKEN, webhook URL): {e}"))?;
    telegram
        .webhook_url()
        .map_err(|e| format!("telegram settings (TELEGRAM_WEBHOOK_URL, TELEGRAM_WEBHOOK_PATH): {e}"))?;
    Ok(BotSettings::new(funnel, FunnelTimings::from_env(), telegram))
}

fn startup_summary(settings: &BotSettings) -> String {
    let group = settings
        .funnel
        .group_id()
        .map_or_else(|_| "unset".to_string(), |id| id.to_string());
    let transport = if settings.telegram.webhook_base().is_some() {
        "webhook"
    } else {
        "long polling"
    };
    let tiers = [
        &settings.funnel.vip_link_1_month,
        &settings.funnel.vip_link_6_months,
        &settings.funnel.vip_link_1_year,
    ]
    .into_iter()
    .filter(|link| link.as_deref().is_some_and(|l| !l.trim().is_empty()))
    .count();
    format!(
        "funnel for group {group} over {transport}, {tiers} purchase tier(s), first reply after {}s",
        settings.timings.auto_reply_delay.as_secs()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_names_group_transport_and_tiers() {
        let funnel = FunnelSettings {
            group_id: Some("-1001".to_string()),
            vip_link_1_month: Some("https://pay.test/1m".to_string()),
            vip_link_6_months: Some("  ".to_string()),
            vip_link_1_year: Some("https://pay.test/1y".to_string()),
            ..FunnelSettings::default()
        };
        let telegram = TelegramSettings {
            railway_public_domain: Some("bot.test".to_string()),
            ..TelegramSettings::default()
        };
        let settings = BotSettings::new(funnel, FunnelTimings::default(), telegram);

        let summary = startup_summary(&settings);
        assert!(summary.contains("group -1001"), "{summary}");
        assert!(summary.contains("over webhook"), "{summary}");
        assert!(summary.contains("2 purchase tier(s)"), "{summary}");
    }

    #[test]
    fn test_summary_without_public_url_uses_polling() {
        let settings = BotSettings::new(
            FunnelSettings::default(),
            FunnelTimings::default(),
            TelegramSettings::default(),
        );

        let summary = startup_summary(&settings);
        assert!(summary.contains("group unset"), "{summary}");
        assert!(summary.contains("over long polling"), "{summary}");
        assert!(summary.contains("0 purchase tier(s)"), "{summary}");
    }
}
