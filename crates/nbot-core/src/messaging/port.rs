use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    errors::SendError,
    messaging::types::MessagingCapabilities,
};

/// Cross-messenger port.
///
/// Used both for replies to inbound commands and for broadcast fan-out. Failures
/// come back already classified so callers never inspect transport internals.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef, SendError>;
}
