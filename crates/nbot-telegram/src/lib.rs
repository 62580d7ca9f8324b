//! Telegram adapter (teloxide).
//!
//! This crate implements the `nbot-core` MessagingPort over Telegram Bot API
//! and wires inbound updates to the core command handler.

use async_trait::async_trait;

use teloxide::{prelude::*, ApiError, RequestError};

pub mod handlers;
pub mod router;

use nbot_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::SendError,
    messaging::{port::MessagingPort, types::MessagingCapabilities},
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }
}

/// Sort a Telegram failure into the buckets the dispatcher cares about.
///
/// Recipients that blocked the bot or no longer exist are expected churn; any
/// other failure may point at a transport problem.
pub fn classify(e: RequestError) -> SendError {
    match e {
        RequestError::Api(
            ApiError::BotBlocked
            | ApiError::ChatNotFound
            | ApiError::UserNotFound
            | ApiError::UserDeactivated
            | ApiError::BotKicked
            | ApiError::BotKickedFromSupergroup
            | ApiError::CantInitiateConversation
            | ApiError::CantTalkWithBots,
        ) => SendError::Unreachable(e.to_string()),
        other => SendError::Transport(format!("telegram error: {other}")),
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            max_message_len: 4096,
        }
    }

    /// Single attempt; no retry on flood control either.
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef, SendError> {
        let msg = self
            .bot
            .send_message(Self::tg_chat(chat_id), text.to_string())
            .await
            .map_err(classify)?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_and_missing_chats_are_unreachable() {
        for api in [
            ApiError::BotBlocked,
            ApiError::ChatNotFound,
            ApiError::UserNotFound,
            ApiError::UserDeactivated,
            ApiError::BotKicked,
            ApiError::BotKickedFromSupergroup,
            ApiError::CantInitiateConversation,
            ApiError::CantTalkWithBots,
        ] {
            assert!(classify(RequestError::Api(api)).is_unreachable());
        }
    }

    #[test]
    fn other_api_errors_are_transport_failures() {
        let e = classify(RequestError::Api(ApiError::Unknown("boom".to_string())));
        assert!(matches!(e, SendError::Transport(ref s) if s.contains("boom")));
        assert!(!e.is_unreachable());
    }
}
