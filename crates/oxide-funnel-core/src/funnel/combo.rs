//! Combo delivery stage.

use super::jobs::upsell_job_name;
use super::{copy, Conversation, FunnelEngine, FunnelJob, FunnelStage};
use crate::error::FunnelError;
use crate::gateway::SendOptions;
use crate::scheduler::JobControl;
use std::sync::Arc;
use tracing::info;

impl FunnelEngine {
    /// Send the combo and schedule the upsell.
    ///
    /// Order: apology text, intro voice, photos, videos, then the closing
    /// voice or closing text. Any step that fails is skipped.
    pub(super) async fn deliver_combo(
        self: &Arc<Self>,
        conversation: Conversation,
    ) -> anyhow::Result<JobControl<FunnelJob>> {
        let chat_id = conversation.chat_id;
        if !self.expect_stage("combo", chat_id, FunnelStage::ComboScheduled) {
            return Ok(JobControl::Remove);
        }

        let target = conversation.target();
        let delivery = &self.delivery;
        let options = SendOptions::default();

        delivery.send_text(&target, copy::APOLOGY_TEXT).await;

        if let Some(voice) = &self.content.intro_voice {
            delivery.send_voice_prefer(&target, voice, &options).await;
        }

        delivery
            .send_batch(&target, self.content.photo_items())
            .await;
        delivery
            .send_batch(&target, self.content.video_items())
            .await;

        match &self.content.closing_voice {
            Some(voice) => {
                delivery.send_voice_prefer(&target, voice, &options).await;
            }
            None => {
                delivery.send_text(&target, copy::CLOSING_TEXT).await;
            }
        }

        self.stages.advance(chat_id, FunnelStage::ComboDelivered);

        let delay = self.timings.vip_offer_delay;
        if !self.schedule_once(FunnelJob::Upsell(conversation), delay) {
            return Err(FunnelError::SchedulerAction {
                job: upsell_job_name(chat_id),
                reason: "scheduler is shut down".to_string(),
            }
            .into());
        }

        info!(chat_id, delay_secs = delay.as_secs(), "Combo delivered, upsell scheduled");
        Ok(JobControl::Remove)
    }
}
