//! Remarketing fallback, sent once the membership poll gives up.

use super::{copy, Conversation, FunnelEngine};
use crate::gateway::{LinkButton, OutboundContent, SendOptions};
use tracing::debug;

impl FunnelEngine {
    /// Discount voice, call-to-action text, then after a pause the
    /// follow-up voice.
    ///
    /// The pause happens inside the calling job, after it has already been
    /// unscheduled.
    pub(super) async fn send_remarketing(&self, conversation: &Conversation) {
        let target = conversation.target();
        let options = SendOptions::default();

        if let Some(voice) = &self.content.remarketing_voice {
            self.delivery
                .send_voice_prefer(&target, voice, &options)
                .await;
        }

        let keyboard = self
            .content
            .remarketing_link
            .iter()
            .map(|url| LinkButton {
                text: copy::REMARKETING_BUTTON_LABEL.to_string(),
                url: url.clone(),
            })
            .collect();
        self.delivery
            .send(
                &target,
                &OutboundContent::Text(copy::REMARKETING_TEXT.to_string()),
                &SendOptions::with_keyboard(keyboard),
            )
            .await;

        if let Some(voice) = &self.content.remarketing_followup_voice {
            let pause = self.timings.remarketing_followup_delay;
            debug!(chat_id = conversation.chat_id, pause_secs = pause.as_secs(), "Remarketing pause");
            tokio::time::sleep(pause).await;
            self.delivery
                .send_voice_prefer(&target, voice, &options)
                .await;
        }
    }
}
