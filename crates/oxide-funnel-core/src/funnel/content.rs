//! Content assets of the funnel, resolved from settings.
//!
//! Every asset is optional; a missing asset skips its step.

use super::copy;
use crate::config::FunnelSettings;
use crate::gateway::{LinkButton, MediaItem, MediaRef};

/// Assets and links used by the funnel stages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunnelContent {
    /// Voice clip after the apology text
    pub intro_voice: Option<MediaRef>,
    /// First media batch
    pub photos: Vec<MediaRef>,
    /// Second media batch
    pub videos: Vec<MediaRef>,
    /// Closing voice clip; closing text when absent
    pub closing_voice: Option<MediaRef>,
    /// Voice clip opening the upsell
    pub upsell_voice: Option<MediaRef>,
    /// Preview video of the upsell
    pub preview_video: Option<MediaRef>,
    /// Purchase tiers, one button each
    pub offers: Vec<LinkButton>,
    /// Discount voice clip of the remarketing
    pub remarketing_voice: Option<MediaRef>,
    /// Call-to-action link of the remarketing
    pub remarketing_link: Option<String>,
    /// Voice clip sent after the remarketing pause
    pub remarketing_followup_voice: Option<MediaRef>,
}

fn asset(raw: Option<&String>) -> Option<MediaRef> {
    raw.map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(MediaRef::parse)
}

fn link(raw: Option<&String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl FunnelContent {
    /// Resolve content from settings.
    #[must_use]
    pub fn from_settings(settings: &FunnelSettings) -> Self {
        let offers = [
            (copy::OFFER_1_MONTH_LABEL, &settings.vip_link_1_month),
            (copy::OFFER_6_MONTHS_LABEL, &settings.vip_link_6_months),
            (copy::OFFER_1_YEAR_LABEL, &settings.vip_link_1_year),
        ]
        .into_iter()
        .filter_map(|(label, url)| {
            link(url.as_ref()).map(|url| LinkButton {
                text: label.to_string(),
                url,
            })
        })
        .collect();

        Self {
            intro_voice: asset(settings.audio_combo_delivery.as_ref()),
            photos: settings
                .combo_photos()
                .iter()
                .map(|p| MediaRef::parse(p))
                .collect(),
            videos: settings
                .combo_videos()
                .iter()
                .map(|v| MediaRef::parse(v))
                .collect(),
            closing_voice: asset(settings.audio_post_combo.as_ref()),
            upsell_voice: asset(settings.audio_upsell_offer.as_ref()),
            preview_video: asset(settings.video_vip_preview.as_ref()),
            offers,
            remarketing_voice: asset(settings.audio_remarketing.as_ref()),
            remarketing_link: link(settings.remarketing_link.as_ref()),
            remarketing_followup_voice: asset(settings.audio_remarketing_2.as_ref()),
        }
    }

    /// First media batch as album items.
    #[must_use]
    pub fn photo_items(&self) -> Vec<MediaItem> {
        self.photos.iter().cloned().map(MediaItem::Photo).collect()
    }

    /// Second media batch as album items.
    #[must_use]
    pub fn video_items(&self) -> Vec<MediaItem> {
        self.videos.iter().cloned().map(MediaItem::Video).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_assets_are_skipped() {
        let settings = FunnelSettings {
            audio_combo_delivery: Some("   ".to_string()),
            audio_post_combo: Some("closing-voice".to_string()),
            vip_link_1_month: Some("https://pay.test/1m".to_string()),
            vip_link_1_year: Some(String::new()),
            combo_photos_str: Some("p1, https://cdn.test/p2.jpg".to_string()),
            ..FunnelSettings::default()
        };
        let content = FunnelContent::from_settings(&settings);

        assert_eq!(content.intro_voice, None);
        assert_eq!(
            content.closing_voice,
            Some(MediaRef::FileId("closing-voice".to_string()))
        );
        assert_eq!(
            content.photos,
            vec![
                MediaRef::FileId("p1".to_string()),
                MediaRef::Url("https://cdn.test/p2.jpg".to_string()),
            ]
        );
        assert_eq!(content.offers.len(), 1);
        assert_eq!(content.offers[0].url, "https://pay.test/1m");
        assert_eq!(content.offers[0].text, copy::OFFER_1_MONTH_LABEL);
    }

    #[test]
    fn test_three_tiers_keep_their_order() {
        let settings = FunnelSettings {
            vip_link_1_year: Some("https://pay.test/1y".to_string()),
            vip_link_6_months: Some(" https://pay.test/6m ".to_string()),
            vip_link_1_month: Some("https://pay.test/1m".to_string()),
            ..FunnelSettings::default()
        };
        let content = FunnelContent::from_settings(&settings);

        assert_eq!(
            content.offers,
            vec![
                LinkButton {
                    text: copy::OFFER_1_MONTH_LABEL.to_string(),
                    url: "https://pay.test/1m".to_string(),
                },
                LinkButton {
                    text: copy::OFFER_6_MONTHS_LABEL.to_string(),
                    url: "https://pay.test/6m".to_string(),
                },
                LinkButton {
                    text: copy::OFFER_1_YEAR_LABEL.to_string(),
                    url: "https://pay.test/1y".to_string(),
                },
            ]
        );
    }
}
