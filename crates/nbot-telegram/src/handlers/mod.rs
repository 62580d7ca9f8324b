//! Telegram update handlers.
//!
//! Thin adapter: extract the sender identity and text from the update, then hand
//! off to the transport-agnostic command handler in `nbot-core`.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use nbot_core::{
    app::AppContext,
    commands,
    domain::{ChatId, Sender, UserId},
};

pub async fn handle_message(msg: Message, ctx: Arc<AppContext>) -> ResponseResult<()> {
    let chat_id = ChatId(msg.chat.id.0);

    let Some(sender) = sender_of(&msg) else {
        // Channel posts and anonymous admins carry no user; nothing to key on.
        tracing::debug!(chat_id = chat_id.0, "ignoring message without sender");
        return Ok(());
    };

    // Non-text updates (stickers, photos, ...) fall through to the fallback reply.
    let text = msg.text().unwrap_or_default();
    commands::handle_text(&ctx, &sender, text).await;
    Ok(())
}

fn sender_of(msg: &Message) -> Option<Sender> {
    let user = msg.from()?;
    Some(Sender {
        user_id: UserId(user.id.0 as i64),
        chat_id: ChatId(msg.chat.id.0),
        username: user.username.clone(),
        first_name: Some(user.first_name.clone()).filter(|s| !s.is_empty()),
        last_name: user.last_name.clone(),
    })
}
