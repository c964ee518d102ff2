//! Upsell stage.

use super::jobs::poll_job_name;
use super::{copy, Conversation, FunnelEngine, FunnelJob, FunnelStage};
use crate::error::FunnelError;
use crate::gateway::{OutboundContent, SendOptions};
use crate::scheduler::JobControl;
use std::sync::Arc;
use tracing::info;

impl FunnelEngine {
    /// Send the upsell offer and start the membership poll.
    ///
    /// The poll only starts when the user is known.
    pub(super) async fn send_upsell(
        self: &Arc<Self>,
        conversation: Conversation,
    ) -> anyhow::Result<JobControl<FunnelJob>> {
        let chat_id = conversation.chat_id;
        if !self.expect_stage("upsell", chat_id, FunnelStage::ComboDelivered) {
            return Ok(JobControl::Remove);
        }

        let target = conversation.target();
        let options = SendOptions::default();

        if let Some(voice) = &self.content.upsell_voice {
            self.delivery
                .send_voice_prefer(&target, voice, &options)
                .await;
        }
        if let Some(video) = &self.content.preview_video {
            self.delivery
                .send(&target, &OutboundContent::Video(video.clone()), &options)
                .await;
        }
        self.delivery.send_text(&target, copy::UPSELL_TEXT).await;
        if !self.content.offers.is_empty() {
            self.delivery
                .send(
                    &target,
                    &OutboundContent::Text(copy::OFFER_PROMPT.to_string()),
                    &SendOptions::with_keyboard(self.content.offers.clone()),
                )
                .await;
        }

        self.stages.advance(chat_id, FunnelStage::UpsellSent);

        if conversation.user_id.is_none() {
            info!(chat_id, "Upsell sent, user unknown so membership is not polled");
            return Ok(JobControl::Remove);
        }

        if !self.schedule_poll(conversation) {
            return Err(FunnelError::SchedulerAction {
                job: poll_job_name(chat_id),
                reason: "scheduler is shut down".to_string(),
            }
            .into());
        }
        self.stages.advance(chat_id, FunnelStage::PollingMembership);

        info!(
            chat_id,
            interval_secs = self.timings.group_check_interval.as_secs(),
            max_attempts = self.timings.group_check_max_attempts,
            "Upsell sent, membership poll started"
        );
        Ok(JobControl::Remove)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{ChatKind, FunnelContent, InboundMessage, Sender};
    use super::*;
    use crate::config::{FunnelSettings, FunnelTimings};
    use crate::gateway::{LinkButton, MockMessagingGateway};
    use crate::scheduler::JobKind;
    use crate::testing::sent;
    use mockall::Sequence;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_offer_keyboard_and_poll_start() {
        let mut mock = MockMessagingGateway::new();
        mock.expect_send()
            .withf(|_, c, o| {
                matches!(c, OutboundContent::Text(t) if t == copy::OFFER_PROMPT)
                    && o.keyboard.len() == 2
                    && o.keyboard[1].url == "https://pay.test/1y"
            })
            .times(1)
            .returning(|t, _, _| Ok(sent(t.chat_id, 10)));
        mock.expect_send()
            .returning(|t, _, _| Ok(sent(t.chat_id, 1)));

        let content = FunnelContent {
            offers: vec![
                LinkButton {
                    text: copy::OFFER_1_MONTH_LABEL.to_string(),
                    url: "https://pay.test/1m".to_string(),
                },
                LinkButton {
                    text: copy::OFFER_1_YEAR_LABEL.to_string(),
                    url: "https://pay.test/1y".to_string(),
                },
            ],
            ..FunnelContent::default()
        };
        let engine = Arc::new(FunnelEngine::new(
            Arc::new(mock),
            -100,
            content,
            FunnelTimings::default(),
        ));

        let message = InboundMessage {
            chat_id: 7,
            chat_kind: ChatKind::Private,
            message_id: 1,
            sender: Some(Sender {
                user_id: 7,
                is_bot: false,
            }),
            business_connection_id: None,
        };
        engine.on_inbound(&message);
        tokio::time::sleep(Duration::from_secs(30 + 180 + 1)).await;

        assert_eq!(engine.stage(7), FunnelStage::PollingMembership);
        assert_eq!(
            engine.scheduler().kind_of("group_check:7"),
            Some(JobKind::Repeating)
        );
        assert!(!engine.scheduler().is_scheduled("upsell:7"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_tier_keyboard_follows_upsell_text() -> Result<(), FunnelError> {
        let mut seq = Sequence::new();
        let mut mock = MockMessagingGateway::new();
        mock.expect_send()
            .withf(|_, c, _| matches!(c, OutboundContent::Text(t) if t == copy::APOLOGY_TEXT || t == copy::CLOSING_TEXT))
            .times(2)
            .in_sequence(&mut seq)
            .returning(|t, _, _| Ok(sent(t.chat_id, 1)));
        mock.expect_send()
            .withf(|_, c, o| {
                matches!(c, OutboundContent::Text(t) if t == copy::UPSELL_TEXT) && o.keyboard.is_empty()
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|t, _, _| Ok(sent(t.chat_id, 2)));
        mock.expect_send()
            .withf(|_, c, o| {
                let labels: Vec<&str> = o.keyboard.iter().map(|b| b.text.as_str()).collect();
                matches!(c, OutboundContent::Text(t) if t == copy::OFFER_PROMPT)
                    && labels
                        == [
                            copy::OFFER_1_MONTH_LABEL,
                            copy::OFFER_6_MONTHS_LABEL,
                            copy::OFFER_1_YEAR_LABEL,
                        ]
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|t, _, _| Ok(sent(t.chat_id, 3)));

        let settings = FunnelSettings {
            group_id: Some("-100".to_string()),
            vip_link_1_month: Some("https://pay.test/1m".to_string()),
            vip_link_6_months: Some("https://pay.test/6m".to_string()),
            vip_link_1_year: Some("https://pay.test/1y".to_string()),
            ..FunnelSettings::default()
        };
        let engine = Arc::new(FunnelEngine::from_settings(
            Arc::new(mock),
            &settings,
            FunnelTimings::default(),
        )?);

        let message = InboundMessage {
            chat_id: 9,
            chat_kind: ChatKind::Private,
            message_id: 1,
            sender: None,
            business_connection_id: None,
        };
        engine.on_inbound(&message);
        tokio::time::sleep(Duration::from_secs(30 + 180 + 1)).await;

        assert_eq!(engine.stage(9), FunnelStage::UpsellSent);
        Ok(())
    }
}
