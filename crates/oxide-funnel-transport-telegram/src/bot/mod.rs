/// Attachment handle echo
pub mod attachments;
/// Update handlers and inbound mapping
pub mod handlers;
