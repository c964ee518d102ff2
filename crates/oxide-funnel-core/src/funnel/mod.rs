//! Delayed outbound funnel
//!
//! A first private message from a user starts a fixed sequence of timed
//! stages: combo content, an upsell offer, a bounded membership poll of the
//! target group, and finally either a confirmation or a remarketing message.
//!
//! [`FunnelEngine`] owns everything the stages need and is shared behind an
//! `Arc` between the inbound handlers and the scheduled jobs.

mod combo;
pub mod content;
pub mod copy;
pub mod guard;
pub mod jobs;
mod membership;
mod remarketing;
pub mod stage;
mod upsell;

use crate::config::{FunnelSettings, FunnelTimings};
use crate::delivery::Delivery;
use crate::error::FunnelError;
use crate::gateway::{MessagingGateway, Target};
use crate::scheduler::{JobContext, JobControl, Scheduler};
use futures_util::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use content::FunnelContent;
pub use guard::{DispatchStore, InMemoryDispatchStore};
pub use jobs::FunnelJob;
pub use stage::{FunnelStage, StageTracker};

/// The chat a funnel runs in, with the identities needed to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Conversation {
    /// Private chat with the user
    pub chat_id: i64,
    /// The user, when known
    pub user_id: Option<u64>,
    /// Business identity to send as
    pub business_connection_id: Option<String>,
}

impl Conversation {
    /// Outbound target of this conversation.
    #[must_use]
    pub fn target(&self) -> Target {
        Target {
            chat_id: self.chat_id,
            user_id: self.user_id,
            business_connection_id: self.business_connection_id.clone(),
        }
    }
}

/// Kind of chat a message arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    /// One-to-one chat
    Private,
    /// Basic group
    Group,
    /// Supergroup
    Supergroup,
    /// Channel
    Channel,
}

/// Sender of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sender {
    /// User id
    pub user_id: u64,
    /// Whether the sender is a bot
    pub is_bot: bool,
}

/// Inbound message, reduced to what the funnel looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Chat the message arrived in
    pub chat_id: i64,
    /// Kind of that chat
    pub chat_kind: ChatKind,
    /// Message id
    pub message_id: i32,
    /// Sender, absent for anonymous or channel posts
    pub sender: Option<Sender>,
    /// Business identity the message arrived through
    pub business_connection_id: Option<String>,
}

/// Why an inbound message did not start a funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Not a private chat
    NotPrivate,
    /// Sent by a bot
    FromBot,
    /// Funnel already started for this chat
    AlreadyDispatched,
    /// Engine is shutting down
    ShuttingDown,
}

/// Outcome of [`FunnelEngine::on_inbound`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Funnel started
    Admitted,
    /// Message ignored
    Ignored(IgnoreReason),
}

/// Outcome of [`FunnelEngine::handle_join_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinDecision {
    /// Request approved
    Approved,
    /// Request for another chat, left alone
    NotTargetGroup,
    /// Approval call failed
    Failed,
}

/// Funnel orchestrator.
pub struct FunnelEngine {
    delivery: Delivery,
    scheduler: Scheduler,
    guard: Arc<dyn DispatchStore>,
    stages: StageTracker,
    content: FunnelContent,
    timings: FunnelTimings,
    group_id: i64,
}

impl FunnelEngine {
    /// Create an engine with an in-memory dispatch guard.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn MessagingGateway>,
        group_id: i64,
        content: FunnelContent,
        timings: FunnelTimings,
    ) -> Self {
        Self {
            delivery: Delivery::new(gateway),
            scheduler: Scheduler::new(),
            guard: Arc::new(InMemoryDispatchStore::new()),
            stages: StageTracker::new(),
            content,
            timings,
            group_id,
        }
    }

    /// Create an engine from loaded settings.
    ///
    /// # Errors
    ///
    /// Returns `FunnelError::Config` if the target group id is invalid.
    pub fn from_settings(
        gateway: Arc<dyn MessagingGateway>,
        settings: &FunnelSettings,
        timings: FunnelTimings,
    ) -> Result<Self, FunnelError> {
        let group_id = settings.group_id()?;
        Ok(Self::new(
            gateway,
            group_id,
            FunnelContent::from_settings(settings),
            timings,
        ))
    }

    /// Replace the dispatch guard.
    #[must_use]
    pub fn with_dispatch_store(mut self, guard: Arc<dyn DispatchStore>) -> Self {
        self.guard = guard;
        self
    }

    /// Delivery layer.
    #[must_use]
    pub const fn delivery(&self) -> &Delivery {
        &self.delivery
    }

    /// Job scheduler.
    #[must_use]
    pub const fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Target group id.
    #[must_use]
    pub const fn group_id(&self) -> i64 {
        self.group_id
    }

    /// Configured timings.
    #[must_use]
    pub const fn timings(&self) -> &FunnelTimings {
        &self.timings
    }

    /// Current stage of a chat.
    #[must_use]
    pub fn stage(&self, chat_id: i64) -> FunnelStage {
        self.stages.get(chat_id)
    }

    /// Whether a funnel was ever started for a chat.
    #[must_use]
    pub fn is_dispatched(&self, chat_id: i64) -> bool {
        self.guard.is_dispatched(chat_id)
    }

    /// Handle an inbound message.
    ///
    /// Starts the funnel on the first eligible message of a private chat by
    /// scheduling the combo delivery. Never blocks and never sends anything
    /// itself.
    pub fn on_inbound(self: &Arc<Self>, message: &InboundMessage) -> Admission {
        if message.chat_kind != ChatKind::Private {
            return Admission::Ignored(IgnoreReason::NotPrivate);
        }
        if message.sender.is_some_and(|sender| sender.is_bot) {
            return Admission::Ignored(IgnoreReason::FromBot);
        }

        let conversation = Conversation {
            chat_id: message.chat_id,
            user_id: message.sender.map(|sender| sender.user_id),
            business_connection_id: message.business_connection_id.clone(),
        };

        if !self.guard.try_admit(&conversation) {
            debug!(chat_id = conversation.chat_id, "Funnel already dispatched");
            return Admission::Ignored(IgnoreReason::AlreadyDispatched);
        }

        self.stages
            .advance(conversation.chat_id, FunnelStage::ComboScheduled);
        let chat_id = conversation.chat_id;
        let user_id = conversation.user_id;
        if !self.schedule_once(FunnelJob::Combo(conversation), self.timings.auto_reply_delay) {
            warn!(chat_id, "Scheduler is shut down, funnel not started");
            return Admission::Ignored(IgnoreReason::ShuttingDown);
        }

        info!(
            chat_id,
            user_id = ?user_id,
            delay_secs = self.timings.auto_reply_delay.as_secs(),
            "Funnel started, combo scheduled"
        );
        Admission::Admitted
    }

    /// Approve a join request if it targets the funnel group.
    pub async fn handle_join_request(&self, chat_id: i64, user_id: u64) -> JoinDecision {
        if chat_id != self.group_id {
            return JoinDecision::NotTargetGroup;
        }
        match self
            .delivery
            .gateway()
            .approve_join_request(chat_id, user_id)
            .await
        {
            Ok(()) => {
                info!(chat_id, user_id, "Join request approved");
                JoinDecision::Approved
            }
            Err(e) => {
                warn!(chat_id, user_id, "Failed to approve join request: {e}");
                JoinDecision::Failed
            }
        }
    }

    /// Cancel all pending jobs and refuse new funnels.
    ///
    /// An invocation already running finishes on its own.
    pub fn shutdown(&self) {
        info!("Shutting down funnel engine");
        self.scheduler.shutdown();
    }

    fn schedule_once(self: &Arc<Self>, job: FunnelJob, delay: std::time::Duration) -> bool {
        let engine = Arc::clone(self);
        self.scheduler
            .schedule_once(job.name(), delay, job, move |ctx| engine.run_job(ctx))
    }

    fn schedule_poll(self: &Arc<Self>, conversation: Conversation) -> bool {
        let engine = Arc::clone(self);
        let job = FunnelJob::Poll {
            conversation,
            attempt: 0,
        };
        let interval = self.timings.group_check_interval;
        self.scheduler
            .schedule_repeating(job.name(), interval, interval, job, move |ctx| {
                Arc::clone(&engine).run_job(ctx)
            })
    }

    fn run_job(
        self: Arc<Self>,
        ctx: JobContext<FunnelJob>,
    ) -> BoxFuture<'static, anyhow::Result<JobControl<FunnelJob>>> {
        async move {
            match ctx.payload.clone() {
                FunnelJob::Combo(conversation) => self.deliver_combo(conversation).await,
                FunnelJob::Upsell(conversation) => self.send_upsell(conversation).await,
                FunnelJob::Poll {
                    conversation,
                    attempt,
                } => Ok(self.poll_membership(&ctx, conversation, attempt).await),
            }
        }
        .boxed()
    }

    /// Refuse to run a stage whose precondition no longer holds.
    fn expect_stage(&self, job: &str, chat_id: i64, expected: FunnelStage) -> bool {
        let current = self.stages.get(chat_id);
        if current == expected {
            return true;
        }
        warn!(job, chat_id, %current, %expected, "Skipping job in unexpected stage");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{MediaRef, MemberStatus, MockMessagingGateway};
    use crate::testing::{membership, mock_gateway_accepting, sent};
    use std::time::Duration;

    fn private(chat_id: i64) -> InboundMessage {
        InboundMessage {
            chat_id,
            chat_kind: ChatKind::Private,
            message_id: 1,
            sender: u64::try_from(chat_id).ok().map(|user_id| Sender {
                user_id,
                is_bot: false,
            }),
            business_connection_id: None,
        }
    }

    fn engine(gateway: MockMessagingGateway) -> Arc<FunnelEngine> {
        Arc::new(FunnelEngine::new(
            Arc::new(gateway),
            -100,
            FunnelContent::default(),
            FunnelTimings::default(),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_message_admits_and_schedules_combo() {
        let engine = engine(mock_gateway_accepting());

        assert_eq!(engine.on_inbound(&private(7)), Admission::Admitted);
        assert_eq!(
            engine.on_inbound(&private(7)),
            Admission::Ignored(IgnoreReason::AlreadyDispatched)
        );
        assert!(engine.scheduler().is_scheduled("combo:7"));
        assert_eq!(engine.stage(7), FunnelStage::ComboScheduled);
        assert!(engine.is_dispatched(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignored_messages_do_not_consume_dispatch() {
        let engine = engine(mock_gateway_accepting());

        let group = InboundMessage {
            chat_kind: ChatKind::Supergroup,
            ..private(7)
        };
        assert_eq!(
            engine.on_inbound(&group),
            Admission::Ignored(IgnoreReason::NotPrivate)
        );

        let bot = InboundMessage {
            sender: Some(Sender {
                user_id: 7,
                is_bot: true,
            }),
            ..private(7)
        };
        assert_eq!(
            engine.on_inbound(&bot),
            Admission::Ignored(IgnoreReason::FromBot)
        );

        assert!(!engine.is_dispatched(7));
        assert!(engine.scheduler().is_empty());
        assert_eq!(engine.on_inbound(&private(7)), Admission::Admitted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_after_shutdown_is_refused() {
        let engine = engine(mock_gateway_accepting());
        engine.shutdown();
        assert_eq!(
            engine.on_inbound(&private(7)),
            Admission::Ignored(IgnoreReason::ShuttingDown)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_member_is_approved_on_first_check() {
        let mut mock = MockMessagingGateway::new();
        mock.expect_send()
            .returning(|t, _, _| Ok(sent(t.chat_id, 1)));
        mock.expect_get_chat_member()
            .times(1)
            .returning(|_, _| Ok(membership(MemberStatus::Administrator)));
        let engine = engine(mock);

        engine.on_inbound(&private(7));
        tokio::time::sleep(Duration::from_secs(30 + 180 + 60 + 1)).await;

        assert_eq!(engine.stage(7), FunnelStage::Approved);
        assert!(engine.scheduler().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_user_skips_polling() {
        let engine = engine(mock_gateway_accepting());
        let anonymous = InboundMessage {
            sender: None,
            ..private(7)
        };

        assert_eq!(engine.on_inbound(&anonymous), Admission::Admitted);
        tokio::time::sleep(Duration::from_secs(30 + 180 + 1)).await;

        assert_eq!(engine.stage(7), FunnelStage::UpsellSent);
        assert!(engine.scheduler().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_forbidden_membership_checks_exhaust_budget_without_remarketing() {
        let mut mock = MockMessagingGateway::new();
        mock.expect_send()
            .withf(|_, c, _| c.kind() != "voice" && c.kind() != "audio")
            .returning(|t, _, _| Ok(sent(t.chat_id, 1)));
        mock.expect_get_chat_member()
            .times(5)
            .returning(|_, _| Err(crate::error::GatewayError::Forbidden("bot is not a member".into())));
        let content = FunnelContent {
            remarketing_voice: Some(MediaRef::parse("never-sent")),
            ..FunnelContent::default()
        };
        let engine = Arc::new(FunnelEngine::new(
            Arc::new(mock),
            -100,
            content,
            FunnelTimings::default(),
        ));

        engine.on_inbound(&private(7));
        tokio::time::sleep(Duration::from_secs(30 + 180 + 60 * 8)).await;

        assert_eq!(engine.stage(7), FunnelStage::Abandoned);
        assert!(engine.stage(7).is_terminal());
        assert!(engine.scheduler().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_engines_sharing_a_dispatch_store_admit_once() {
        let store = Arc::new(InMemoryDispatchStore::new());
        let first = Arc::new(
            FunnelEngine::new(
                Arc::new(mock_gateway_accepting()),
                -100,
                FunnelContent::default(),
                FunnelTimings::default(),
            )
            .with_dispatch_store(store.clone()),
        );
        let second = Arc::new(
            FunnelEngine::new(
                Arc::new(mock_gateway_accepting()),
                -100,
                FunnelContent::default(),
                FunnelTimings::default(),
            )
            .with_dispatch_store(store.clone()),
        );

        assert_eq!(first.on_inbound(&private(7)), Admission::Admitted);
        assert_eq!(
            second.on_inbound(&private(7)),
            Admission::Ignored(IgnoreReason::AlreadyDispatched)
        );
        assert!(second.is_dispatched(7));
        assert_eq!(store.dispatched_count(), 1);
        assert!(second.scheduler().is_empty());

        assert_eq!(second.on_inbound(&private(8)), Admission::Admitted);
        assert_eq!(store.dispatched_count(), 2);
    }

    #[tokio::test]
    async fn test_join_request_for_other_chat_is_ignored() {
        let mut mock = MockMessagingGateway::new();
        mock.expect_approve_join_request()
            .withf(|group, user| *group == -100 && *user == 5)
            .times(1)
            .returning(|_, _| Ok(()));
        let engine = engine(mock);

        assert_eq!(
            engine.handle_join_request(-999, 5).await,
            JoinDecision::NotTargetGroup
        );
        assert_eq!(
            engine.handle_join_request(-100, 5).await,
            JoinDecision::Approved
        );
    }
}
