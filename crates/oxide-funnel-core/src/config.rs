//! Configuration and settings management
//!
//! Loads funnel settings from config files and environment variables and
//! defines the funnel timing constants.

use crate::error::FunnelError;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum number of photos in the combo album.
pub const MAX_COMBO_PHOTOS: usize = 10;
/// Maximum number of videos in the combo album.
pub const MAX_COMBO_VIDEOS: usize = 4;

/// Build the layered configuration shared by all crates.
///
/// Sources, later ones winning: `config/default`, `config/{RUN_MODE}`,
/// `config/local`, `APP__`-prefixed environment, plain environment.
///
/// # Errors
///
/// Returns a `ConfigError` if a present source cannot be parsed.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Not checked into git
        .add_source(File::with_name("config/local").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        // Environment::default() maps UPPER_SNAKE_CASE to snake_case
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

/// Funnel settings: target group, content assets and purchase links.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct FunnelSettings {
    /// Group whose membership is polled and whose join requests are approved
    pub group_id: Option<String>,

    /// Intro voice clip sent with the combo
    pub audio_combo_delivery: Option<String>,
    /// Closing voice clip sent after the combo
    pub audio_post_combo: Option<String>,
    /// Voice clip opening the upsell
    pub audio_upsell_offer: Option<String>,
    /// Preview video sent with the upsell
    pub video_vip_preview: Option<String>,
    /// Discount voice clip sent on remarketing
    pub audio_remarketing: Option<String>,
    /// Follow-up voice clip sent after the remarketing pause
    pub audio_remarketing_2: Option<String>,

    /// Photos of the combo, separated by commas, semicolons or whitespace
    #[serde(rename = "combo_photos")]
    pub combo_photos_str: Option<String>,
    /// Videos of the combo, separated by commas, semicolons or whitespace
    #[serde(rename = "combo_videos")]
    pub combo_videos_str: Option<String>,

    /// Purchase link for the one month tier
    pub vip_link_1_month: Option<String>,
    /// Purchase link for the six months tier
    pub vip_link_6_months: Option<String>,
    /// Purchase link for the one year tier
    pub vip_link_1_year: Option<String>,
    /// Call-to-action link of the remarketing message
    pub remarketing_link: Option<String>,
}

impl FunnelSettings {
    /// Load settings from config files and environment.
    ///
    /// # Errors
    ///
    /// Returns `FunnelError::Config` if loading fails or the target group is
    /// missing or not numeric.
    pub fn new() -> Result<Self, FunnelError> {
        let settings: Self = build_config()?.try_deserialize()?;
        settings.group_id()?;
        Ok(settings)
    }

    /// Parsed target group id.
    ///
    /// # Errors
    ///
    /// Returns `FunnelError::Config` if the id is missing or not numeric.
    pub fn group_id(&self) -> Result<i64, FunnelError> {
        let raw = self
            .group_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| FunnelError::Config("missing variable: GROUP_ID".to_string()))?;

        raw.parse::<i64>().map_err(|_| {
            FunnelError::Config(format!(
                "GROUP_ID must be numeric (e.g. -1001234567890), got '{raw}'"
            ))
        })
    }

    /// Configured combo photos, capped at [`MAX_COMBO_PHOTOS`].
    #[must_use]
    pub fn combo_photos(&self) -> Vec<String> {
        let mut photos = split_list(self.combo_photos_str.as_deref());
        photos.truncate(MAX_COMBO_PHOTOS);
        photos
    }

    /// Configured combo videos, capped at [`MAX_COMBO_VIDEOS`].
    #[must_use]
    pub fn combo_videos(&self) -> Vec<String> {
        let mut videos = split_list(self.combo_videos_str.as_deref());
        videos.truncate(MAX_COMBO_VIDEOS);
        videos
    }
}

/// Split a list on commas, semicolons and whitespace, dropping empty tokens.
#[must_use]
pub fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Delay between the first private message and the combo delivery.
pub const AUTO_REPLY_DELAY_SECS: u64 = 30;
/// Delay between the combo delivery and the upsell.
pub const VIP_OFFER_DELAY_SECS: u64 = 180;
/// Interval (and first delay) of the membership poll.
pub const GROUP_CHECK_INTERVAL_SECS: u64 = 60;
/// Membership checks before falling back to remarketing.
pub const GROUP_CHECK_MAX_ATTEMPTS: u32 = 5;
/// Pause before the second remarketing voice clip.
pub const REMARKETING_FOLLOWUP_DELAY_SECS: u64 = 45;

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Get the auto reply delay from env or default.
///
/// Environment variable: `AUTO_REPLY_DELAY_SECS`.
#[must_use]
pub fn get_auto_reply_delay() -> u64 {
    env_or("AUTO_REPLY_DELAY_SECS", AUTO_REPLY_DELAY_SECS)
}

/// Get the VIP offer delay from env or default.
///
/// Environment variable: `VIP_OFFER_DELAY_SECS`.
#[must_use]
pub fn get_vip_offer_delay() -> u64 {
    env_or("VIP_OFFER_DELAY_SECS", VIP_OFFER_DELAY_SECS)
}

/// Get the group check interval from env or default.
///
/// Environment variable: `GROUP_CHECK_INTERVAL_SECS`.
#[must_use]
pub fn get_group_check_interval() -> u64 {
    env_or("GROUP_CHECK_INTERVAL_SECS", GROUP_CHECK_INTERVAL_SECS)
}

/// Get the group check attempt budget from env or default.
///
/// Environment variable: `GROUP_CHECK_MAX_ATTEMPTS`.
#[must_use]
pub fn get_group_check_max_attempts() -> u32 {
    env_or("GROUP_CHECK_MAX_ATTEMPTS", GROUP_CHECK_MAX_ATTEMPTS).max(1)
}

/// Get the remarketing follow-up delay from env or default.
///
/// Environment variable: `REMARKETING_FOLLOWUP_DELAY_SECS`.
#[must_use]
pub fn get_remarketing_followup_delay() -> u64 {
    env_or(
        "REMARKETING_FOLLOWUP_DELAY_SECS",
        REMARKETING_FOLLOWUP_DELAY_SECS,
    )
}

/// Timings of the funnel stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunnelTimings {
    /// First message to combo delivery
    pub auto_reply_delay: Duration,
    /// Combo delivery to upsell
    pub vip_offer_delay: Duration,
    /// Membership poll interval and first delay
    pub group_check_interval: Duration,
    /// Membership poll attempt budget
    pub group_check_max_attempts: u32,
    /// Remarketing pause before the second clip
    pub remarketing_followup_delay: Duration,
}

impl Default for FunnelTimings {
    fn default() -> Self {
        Self {
            auto_reply_delay: Duration::from_secs(AUTO_REPLY_DELAY_SECS),
            vip_offer_delay: Duration::from_secs(VIP_OFFER_DELAY_SECS),
            group_check_interval: Duration::from_secs(GROUP_CHECK_INTERVAL_SECS),
            group_check_max_attempts: GROUP_CHECK_MAX_ATTEMPTS,
            remarketing_followup_delay: Duration::from_secs(REMARKETING_FOLLOWUP_DELAY_SECS),
        }
    }
}

impl FunnelTimings {
    /// Timings with environment overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            auto_reply_delay: Duration::from_secs(get_auto_reply_delay()),
            vip_offer_delay: Duration::from_secs(get_vip_offer_delay()),
            group_check_interval: Duration::from_secs(get_group_check_interval()),
            group_check_max_attempts: get_group_check_max_attempts(),
            remarketing_followup_delay: Duration::from_secs(get_remarketing_followup_delay()),
        }
    }
}
