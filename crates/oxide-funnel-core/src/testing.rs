//! Testing helpers and mock utilities.
//!
//! Provides convenient constructors for mocked gateways and common values.

use crate::gateway::{ChatMembership, MemberStatus, MockMessagingGateway, SentMessage, Target};

/// A sent message in `chat_id` with the given id.
#[must_use]
pub const fn sent(chat_id: i64, message_id: i32) -> SentMessage {
    SentMessage {
        chat_id,
        message_id,
    }
}

/// Target a chat whose user id equals the chat id, as in private chats.
#[must_use]
pub fn target(chat_id: i64) -> Target {
    Target {
        chat_id,
        user_id: u64::try_from(chat_id).ok(),
        business_connection_id: None,
    }
}

/// Membership with the given status and no explicit flag.
#[must_use]
pub const fn membership(status: MemberStatus) -> ChatMembership {
    ChatMembership {
        status,
        is_member: false,
    }
}

/// Create a mock gateway that accepts every send.
///
/// Membership queries report `left`, file resolution fails.
#[must_use]
pub fn mock_gateway_accepting() -> MockMessagingGateway {
    let mut mock = MockMessagingGateway::new();

    mock.expect_send()
        .returning(|t, _, _| Ok(sent(t.chat_id, 1)));

    mock.expect_delete_message().returning(|_, _| Ok(()));

    mock.expect_get_chat_member()
        .returning(|_, _| Ok(membership(MemberStatus::Left)));

    mock.expect_approve_join_request().returning(|_, _| Ok(()));

    mock.expect_get_file().returning(|_| {
        Err(crate::error::GatewayError::BadRequest(
            "file not found".to_string(),
        ))
    });

    mock.expect_file_url()
        .returning(|p| format!("https://files.test/{p}"));

    mock
}
