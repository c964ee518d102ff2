//! Bounded membership polling.

use super::{copy, Conversation, FunnelEngine, FunnelJob, FunnelStage};
use crate::error::FunnelError;
use crate::scheduler::{JobContext, JobControl};
use std::sync::Arc;
use tracing::{debug, info, warn};

impl FunnelEngine {
    /// Whether `user_id` is a member of the target group.
    ///
    /// An authorization failure means the bot cannot see the group, so the
    /// answer is unknown and reported as `FunnelError::MembershipQuery`.
    /// Any other failure counts as "not a member".
    async fn check_membership(&self, user_id: u64) -> Result<bool, FunnelError> {
        match self
            .delivery
            .gateway()
            .get_chat_member(self.group_id, user_id)
            .await
        {
            Ok(membership) => Ok(membership.counts_as_member()),
            Err(e) if e.is_authorization_failure() => {
                Err(FunnelError::MembershipQuery(e.to_string()))
            }
            Err(e) => {
                debug!(user_id, group_id = self.group_id, "Membership query failed: {e}");
                Ok(false)
            }
        }
    }

    /// One poll invocation.
    ///
    /// Every invocation counts toward the attempt budget, including
    /// inconclusive ones. Once the budget is spent the job unschedules
    /// itself before anything else happens. A budget that runs out on an
    /// inconclusive answer ends the funnel as abandoned, without
    /// remarketing.
    pub(super) async fn poll_membership(
        self: &Arc<Self>,
        ctx: &JobContext<FunnelJob>,
        conversation: Conversation,
        attempt: u32,
    ) -> JobControl<FunnelJob> {
        let chat_id = conversation.chat_id;
        if !self.expect_stage("group_check", chat_id, FunnelStage::PollingMembership) {
            ctx.schedule_removal();
            return JobControl::Remove;
        }

        let Some(user_id) = conversation.user_id else {
            warn!(chat_id, "Membership poll without a user, removing");
            ctx.schedule_removal();
            return JobControl::Remove;
        };

        let attempt = attempt.saturating_add(1);
        let max_attempts = self.timings.group_check_max_attempts;
        let exhausted = attempt >= max_attempts;

        match self.check_membership(user_id).await {
            Ok(true) => {
                ctx.schedule_removal();
                self.delivery
                    .send_text(&conversation.target(), copy::GROUP_APPROVED_MESSAGE)
                    .await;
                self.stages.advance(chat_id, FunnelStage::Approved);
                info!(chat_id, user_id, attempt, "User joined the group");
                JobControl::Remove
            }
            Ok(false) if exhausted => {
                ctx.schedule_removal();
                self.stages.advance(chat_id, FunnelStage::RemarketingSent);
                info!(chat_id, user_id, attempt, "User did not join, sending remarketing");
                self.send_remarketing(&conversation).await;
                JobControl::Remove
            }
            Ok(false) => {
                debug!(chat_id, user_id, attempt, max_attempts, "User not in the group yet");
                JobControl::Continue(FunnelJob::Poll {
                    conversation,
                    attempt,
                })
            }
            Err(e) if exhausted => {
                ctx.schedule_removal();
                self.stages.advance(chat_id, FunnelStage::Abandoned);
                warn!(chat_id, user_id, attempt, "Membership never resolved, giving up: {e}");
                JobControl::Remove
            }
            Err(e) => {
                warn!(chat_id, user_id, attempt, "Check bot permissions in the group: {e}");
                JobControl::Continue(FunnelJob::Poll {
                    conversation,
                    attempt,
                })
            }
        }
    }
}
