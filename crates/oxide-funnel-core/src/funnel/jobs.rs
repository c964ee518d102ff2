//! Payloads of the scheduled funnel jobs.
//!
//! Each job carries exactly what its stage needs, so any stage can be run
//! from its payload alone.

use super::Conversation;

/// A scheduled funnel job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunnelJob {
    /// Combo content delivery
    Combo(Conversation),
    /// Upsell offer
    Upsell(Conversation),
    /// Membership poll
    Poll {
        /// Conversation to report to
        conversation: Conversation,
        /// Checks performed so far
        attempt: u32,
    },
}

impl FunnelJob {
    /// Conversation the job belongs to.
    #[must_use]
    pub const fn conversation(&self) -> &Conversation {
        match self {
            Self::Combo(conversation)
            | Self::Upsell(conversation)
            | Self::Poll { conversation, .. } => conversation,
        }
    }

    /// Scheduler key of the job.
    #[must_use]
    pub fn name(&self) -> String {
        let chat_id = self.conversation().chat_id;
        match self {
            Self::Combo(_) => combo_job_name(chat_id),
            Self::Upsell(_) => upsell_job_name(chat_id),
            Self::Poll { .. } => poll_job_name(chat_id),
        }
    }
}

/// Key of the combo delivery job of a chat.
#[must_use]
pub fn combo_job_name(chat_id: i64) -> String {
    format!("combo:{chat_id}")
}

/// Key of the upsell job of a chat.
#[must_use]
pub fn upsell_job_name(chat_id: i64) -> String {
    format!("upsell:{chat_id}")
}

/// Key of the membership poll of a chat.
#[must_use]
pub fn poll_job_name(chat_id: i64) -> String {
    format!("group_check:{chat_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_names_are_keyed_by_chat() {
        let conversation = Conversation {
            chat_id: -42,
            user_id: None,
            business_connection_id: None,
        };
        assert_eq!(FunnelJob::Combo(conversation.clone()).name(), "combo:-42");
        assert_eq!(FunnelJob::Upsell(conversation.clone()).name(), "upsell:-42");
        assert_eq!(
            FunnelJob::Poll {
                conversation,
                attempt: 3
            }
            .name(),
            "group_check:-42"
        );
    }
}
