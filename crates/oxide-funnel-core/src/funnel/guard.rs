//! Dispatch guard
//!
//! Decides whether a conversation may start a funnel. A conversation is
//! admitted at most once for the lifetime of the process.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::Conversation;

/// Admit-once store keyed by chat id.
pub trait DispatchStore: Send + Sync {
    /// Admit `conversation` if it has never been admitted before.
    ///
    /// Checking and marking happen in one step; two concurrent calls for
    /// the same chat can never both return `true`.
    fn try_admit(&self, conversation: &Conversation) -> bool;

    /// Whether the chat has been admitted.
    fn is_dispatched(&self, chat_id: i64) -> bool;
}

/// Per-conversation state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatState {
    /// Funnel started for this chat
    pub combo_dispatched: bool,
    /// Business identity seen on the admitting message
    pub business_connection_id: Option<String>,
}

#[derive(Default)]
struct DispatchState {
    /// Process-wide set; never cleared.
    dispatched: HashSet<i64>,
    /// Per-conversation records; may be reset independently.
    chats: HashMap<i64, ChatState>,
}

/// In-memory [`DispatchStore`].
///
/// Keeps both a per-conversation record and a process-wide set, so a reset
/// of the per-conversation records cannot re-admit a chat.
#[derive(Default)]
pub struct InMemoryDispatchStore {
    state: Mutex<DispatchState>,
}

impl InMemoryDispatchStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Per-conversation record of a chat.
    #[must_use]
    pub fn chat_state(&self, chat_id: i64) -> Option<ChatState> {
        self.state().chats.get(&chat_id).cloned()
    }

    /// Drop the per-conversation record of a chat.
    ///
    /// The process-wide set is untouched, so the chat stays dispatched.
    pub fn reset_chat_state(&self, chat_id: i64) {
        self.state().chats.remove(&chat_id);
    }

    /// Number of admitted chats.
    #[must_use]
    pub fn dispatched_count(&self) -> usize {
        self.state().dispatched.len()
    }
}

impl DispatchStore for InMemoryDispatchStore {
    fn try_admit(&self, conversation: &Conversation) -> bool {
        let mut state = self.state();
        let chat_id = conversation.chat_id;

        let already = state.dispatched.contains(&chat_id)
            || state
                .chats
                .get(&chat_id)
                .is_some_and(|chat| chat.combo_dispatched);
        if already {
            return false;
        }

        state.dispatched.insert(chat_id);
        let chat = state.chats.entry(chat_id).or_default();
        chat.combo_dispatched = true;
        if conversation.business_connection_id.is_some() {
            chat.business_connection_id
                .clone_from(&conversation.business_connection_id);
        }
        true
    }

    fn is_dispatched(&self, chat_id: i64) -> bool {
        let state = self.state();
        state.dispatched.contains(&chat_id)
            || state
                .chats
                .get(&chat_id)
                .is_some_and(|chat| chat.combo_dispatched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn conversation(chat_id: i64) -> Conversation {
        Conversation {
            chat_id,
            user_id: u64::try_from(chat_id).ok(),
            business_connection_id: None,
        }
    }

    #[test]
    fn test_admits_once() {
        let store = InMemoryDispatchStore::new();
        assert!(store.try_admit(&conversation(1)));
        assert!(!store.try_admit(&conversation(1)));
        assert!(store.try_admit(&conversation(2)));
        assert_eq!(store.dispatched_count(), 2);
    }

    #[test]
    fn test_reset_chat_state_does_not_readmit() {
        let store = InMemoryDispatchStore::new();
        assert!(store.try_admit(&conversation(1)));
        store.reset_chat_state(1);
        assert_eq!(store.chat_state(1), None);
        assert!(store.is_dispatched(1));
        assert!(!store.try_admit(&conversation(1)));
    }

    #[test]
    fn test_business_identity_recorded_on_admission() {
        let store = InMemoryDispatchStore::new();
        let conv = Conversation {
            business_connection_id: Some("biz-1".to_string()),
            ..conversation(5)
        };
        assert!(store.try_admit(&conv));
        assert_eq!(
            store.chat_state(5),
            Some(ChatState {
                combo_dispatched: true,
                business_connection_id: Some("biz-1".to_string()),
            })
        );
    }

    #[test]
    fn test_concurrent_admission_yields_single_winner() {
        let store = Arc::new(InMemoryDispatchStore::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.try_admit(&conversation(9)))
            })
            .collect();
        let admitted = handles
            .into_iter()
            .filter_map(|h| h.join().ok())
            .filter(|admitted| *admitted)
            .count();
        assert_eq!(admitted, 1);
    }

    proptest! {
        /// Any sequence of messages admits each chat exactly once.
        #[test]
        fn admits_each_chat_exactly_once(chats in proptest::collection::vec(-5_i64..5, 1..64)) {
            let store = InMemoryDispatchStore::new();
            let mut admitted = HashSet::new();
            for chat in &chats {
                if store.try_admit(&conversation(*chat)) {
                    prop_assert!(admitted.insert(*chat), "chat {} admitted twice", chat);
                }
            }
            let distinct: HashSet<i64> = chats.iter().copied().collect();
            prop_assert_eq!(admitted, distinct);
        }
    }
}
