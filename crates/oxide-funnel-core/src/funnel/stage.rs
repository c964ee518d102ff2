//! Funnel stages and their transition table.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Stage of a conversation in the funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FunnelStage {
    /// No funnel started
    #[default]
    Idle,
    /// Combo delivery job scheduled
    ComboScheduled,
    /// Combo content sent, upsell scheduled
    ComboDelivered,
    /// Upsell offer sent
    UpsellSent,
    /// Membership poll running
    PollingMembership,
    /// Membership confirmed
    Approved,
    /// Poll exhausted, remarketing sent
    RemarketingSent,
    /// Poll exhausted without ever getting an answer
    Abandoned,
}

impl FunnelStage {
    /// Stages reachable from this one.
    #[must_use]
    pub const fn successors(self) -> &'static [Self] {
        match self {
            Self::Idle => &[Self::ComboScheduled],
            Self::ComboScheduled => &[Self::ComboDelivered],
            Self::ComboDelivered => &[Self::UpsellSent],
            Self::UpsellSent => &[Self::PollingMembership],
            Self::PollingMembership => &[Self::Approved, Self::RemarketingSent, Self::Abandoned],
            Self::Approved | Self::RemarketingSent | Self::Abandoned => &[],
        }
    }

    /// Whether `next` is a legal transition from this stage.
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        self.successors().contains(&next)
    }

    /// Whether the funnel has ended.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }
}

impl fmt::Display for FunnelStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::ComboScheduled => "combo_scheduled",
            Self::ComboDelivered => "combo_delivered",
            Self::UpsellSent => "upsell_sent",
            Self::PollingMembership => "polling_membership",
            Self::Approved => "approved",
            Self::RemarketingSent => "remarketing_sent",
            Self::Abandoned => "abandoned",
        };
        f.write_str(name)
    }
}

/// Current stage of every conversation.
#[derive(Default)]
pub struct StageTracker {
    stages: Mutex<HashMap<i64, FunnelStage>>,
}

impl StageTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn stages(&self) -> MutexGuard<'_, HashMap<i64, FunnelStage>> {
        self.stages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current stage of a chat.
    #[must_use]
    pub fn get(&self, chat_id: i64) -> FunnelStage {
        self.stages().get(&chat_id).copied().unwrap_or_default()
    }

    /// Whether the chat is currently at `stage`.
    #[must_use]
    pub fn is_at(&self, chat_id: i64, stage: FunnelStage) -> bool {
        self.get(chat_id) == stage
    }

    /// Move a chat to `next`. Illegal transitions are refused and logged.
    pub fn advance(&self, chat_id: i64, next: FunnelStage) -> bool {
        let mut stages = self.stages();
        let current = stages.get(&chat_id).copied().unwrap_or_default();
        if !current.can_advance_to(next) {
            warn!(chat_id, %current, %next, "Refusing illegal funnel transition");
            return false;
        }
        stages.insert(chat_id, next);
        debug!(chat_id, from = %current, to = %next, "Funnel stage advanced");
        true
    }
}
