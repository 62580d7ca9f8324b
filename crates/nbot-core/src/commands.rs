use crate::{
    app::AppContext,
    domain::Sender,
    registry::{AddOutcome, Profile, RemoveOutcome},
    Error,
};

pub const NOT_AUTHORIZED: &str = "❌ You are not allowed to use this command.";
const FAILURE: &str = "❌ Something went wrong. Please try again later.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Subscribe,
    Unsubscribe,
    Broadcast(String),
    Statistics,
    Help,
    Unknown,
}

impl Command {
    pub fn parse(text: &str) -> Self {
        if !text.trim_start().starts_with('/') {
            return Command::Unknown;
        }
        let (cmd, arg) = parse_command(text);
        match cmd.as_str() {
            "start" | "subscribe" => Command::Subscribe,
            "unsubscribe" | "stop" => Command::Unsubscribe,
            "send" | "broadcast" => Command::Broadcast(arg),
            "stats" | "statistics" => Command::Statistics,
            "help" => Command::Help,
            _ => Command::Unknown,
        }
    }
}

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

/// Handle one inbound text message. Every path replies exactly once to the
/// sender, except a broadcast which also sends a start notice.
pub async fn handle_text(ctx: &AppContext, sender: &Sender, text: &str) {
    match Command::parse(text) {
        Command::Subscribe => subscribe(ctx, sender).await,
        Command::Unsubscribe => unsubscribe(ctx, sender).await,
        Command::Broadcast(body) => broadcast(ctx, sender, &body).await,
        Command::Statistics => statistics(ctx, sender).await,
        Command::Help => ctx.reply(sender.chat_id, &help_text(ctx.is_operator(sender.user_id))).await,
        Command::Unknown => {
            ctx.reply(
                sender.chat_id,
                "❓ Unknown command.\n\nUse /help to see the available commands.",
            )
            .await
        }
    }
}

async fn subscribe(ctx: &AppContext, sender: &Sender) {
    let profile = Profile {
        username: sender.username.clone(),
        first_name: sender.first_name.clone(),
        last_name: sender.last_name.clone(),
    };
    let msg = match ctx.registry.try_add(sender.user_id, &profile).await {
        Ok(AddOutcome::Created) => {
            "🎉 Welcome!\n\nYou are now subscribed.\nUse /unsubscribe to opt out.\n/help - other commands"
        }
        Ok(AddOutcome::AlreadyExists) => {
            "✅ You are already subscribed!\n\nUse /unsubscribe to opt out."
        }
        Err(_) => "❌ Subscription failed.\nPlease try again later.",
    };
    ctx.reply(sender.chat_id, msg).await;
}

async fn unsubscribe(ctx: &AppContext, sender: &Sender) {
    let msg = match ctx.registry.try_remove(sender.user_id).await {
        Ok(RemoveOutcome::Removed) => {
            "👋 You have unsubscribed.\n\nUse /start to subscribe again."
        }
        Ok(RemoveOutcome::NotFound) => {
            "ℹ️ You were not subscribed.\n\nUse /start to subscribe."
        }
        Err(_) => FAILURE,
    };
    ctx.reply(sender.chat_id, msg).await;
}

async fn broadcast(ctx: &AppContext, sender: &Sender, body: &str) {
    if !ctx.is_operator(sender.user_id) {
        tracing::info!(user_id = sender.user_id.0, "unauthorized broadcast attempt");
        ctx.reply(sender.chat_id, NOT_AUTHORIZED).await;
        return;
    }

    let caps = ctx.messenger.capabilities();
    if !caps.fits(body) {
        ctx.reply(
            sender.chat_id,
            &format!(
                "❌ Message is too long ({} characters, limit {}).",
                body.chars().count(),
                caps.max_message_len
            ),
        )
        .await;
        return;
    }

    let run = match ctx.broadcaster.prepare(body).await {
        Ok(run) => run,
        Err(Error::InvalidInput(_)) => {
            ctx.reply(
                sender.chat_id,
                "📝 Usage: /send <message text>\n\nExample: /send Hello everyone! This is a test broadcast.",
            )
            .await;
            return;
        }
        Err(_) => {
            ctx.reply(
                sender.chat_id,
                "❌ Could not read the subscriber list. Please try again later.",
            )
            .await;
            return;
        }
    };
    if run.is_empty() {
        ctx.reply(sender.chat_id, "📭 There are no subscribers to send to.")
            .await;
        return;
    }

    let total = run.total();
    ctx.reply(
        sender.chat_id,
        &format!("📤 Starting broadcast to {total} subscribers..."),
    )
    .await;

    let journaled = match ctx.journal.begin(sender.chat_id.0, total).await {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::warn!("failed to write broadcast journal: {e}");
            None
        }
    };
    let report = run.deliver(ctx.messenger.as_ref()).await;
    if let Some(id) = journaled {
        ctx.journal.finish(id).await;
    }

    ctx.reply(
        sender.chat_id,
        &format!(
            "📊 Broadcast finished!\n\n✅ Delivered: {}\n❌ Failed: {}\n📝 Total subscribers: {}",
            report.succeeded, report.failed, report.total
        ),
    )
    .await;
}

async fn statistics(ctx: &AppContext, sender: &Sender) {
    if !ctx.is_operator(sender.user_id) {
        ctx.reply(sender.chat_id, NOT_AUTHORIZED).await;
        return;
    }

    let msg = match ctx.registry.try_count().await {
        Ok(n) => {
            let mut msg = format!("📊 Bot statistics:\n\n👥 Subscribers: {n}");
            let failures = ctx.registry.storage_failures();
            if failures > 0 {
                msg.push_str(&format!("\n⚠️ Storage errors since start: {failures}"));
            }
            msg
        }
        Err(_) => "❌ Could not load statistics.".to_string(),
    };
    ctx.reply(sender.chat_id, &msg).await;
}

fn help_text(operator: bool) -> String {
    let mut text = String::from(
        "🤖 Commands:\n\n\
👋 /start - Subscribe to broadcasts\n\
🚫 /unsubscribe - Unsubscribe\n\
❓ /help - Show this help",
    );
    if operator {
        text.push_str(
            "\n\n🔧 Operator commands:\n\
📤 /send <text> - Broadcast to all subscribers\n\
📊 /stats - Show subscriber statistics",
        );
    }
    text
}

#[cfg(test)]
mod tests {
    use std::sync::{atomic::Ordering, Arc};

    use super::*;
    use crate::{
        broadcast::{testing::FakeMessenger, BroadcastOptions, Broadcaster},
        domain::{ChatId, UserId},
        errors::SendError,
        journal::testing::in_memory_journal,
        messaging::port::MessagingPort,
        registry::{
            testing::{registry_with, BrokenStore},
            SubscriberRegistry,
        },
    };

    const OPERATOR: i64 = 1000;

    async fn ctx(registry: SubscriberRegistry, api: Arc<FakeMessenger>) -> AppContext {
        let registry = Arc::new(registry);
        AppContext {
            operator: UserId(OPERATOR),
            broadcaster: Broadcaster::new(registry.clone(), BroadcastOptions::default()),
            registry,
            messenger: api as Arc<dyn MessagingPort>,
            journal: in_memory_journal().await,
        }
    }

    fn user(id: i64) -> Sender {
        Sender::new(UserId(id), ChatId(id))
    }

    fn last_reply(api: &FakeMessenger, chat: i64) -> String {
        api.texts_for(chat).pop().unwrap_or_default()
    }

    #[test]
    fn parses_commands_with_bot_suffix_and_args() {
        assert_eq!(Command::parse("/start"), Command::Subscribe);
        assert_eq!(Command::parse("/START@my_bot"), Command::Subscribe);
        assert_eq!(Command::parse("/unsubscribe"), Command::Unsubscribe);
        assert_eq!(
            Command::parse("/send@my_bot  hello   world "),
            Command::Broadcast("hello   world".to_string())
        );
        assert_eq!(Command::parse("/send"), Command::Broadcast(String::new()));
        assert_eq!(Command::parse("/stats"), Command::Statistics);
        assert_eq!(Command::parse("/help"), Command::Help);
        assert_eq!(Command::parse("/nope"), Command::Unknown);
        assert_eq!(Command::parse("start"), Command::Unknown);
    }

    #[tokio::test]
    async fn subscribe_and_unsubscribe_replies() {
        let api = Arc::new(FakeMessenger::default());
        let ctx = ctx(registry_with(&[]).await, api.clone()).await;
        let mut u = user(42);
        u.username = Some("alice".into());

        handle_text(&ctx, &u, "/start").await;
        assert!(last_reply(&api, 42).contains("Welcome"));
        handle_text(&ctx, &u, "/start").await;
        assert!(last_reply(&api, 42).contains("already subscribed"));

        let stored = ctx.registry.get(UserId(42)).await.unwrap().unwrap();
        assert_eq!(stored.username.as_deref(), Some("alice"));

        handle_text(&ctx, &u, "/unsubscribe").await;
        assert!(last_reply(&api, 42).contains("have unsubscribed"));
        handle_text(&ctx, &u, "/unsubscribe").await;
        assert!(last_reply(&api, 42).contains("were not subscribed"));
    }

    #[tokio::test]
    async fn non_operator_broadcast_is_denied_without_touching_registry() {
        let store = Arc::new(BrokenStore::default());
        let registry = SubscriberRegistry::open(store.clone()).await.unwrap();
        let api = Arc::new(FakeMessenger::default());
        let ctx = ctx(registry, api.clone()).await;

        handle_text(&ctx, &user(7), "/send hello").await;
        handle_text(&ctx, &user(7), "/stats").await;

        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
        assert_eq!(api.sent_to(), vec![7, 7]);
        assert_eq!(
            api.texts_for(7),
            vec![NOT_AUTHORIZED.to_string(), NOT_AUTHORIZED.to_string()]
        );
    }

    #[tokio::test]
    async fn operator_broadcast_reports_counts() {
        let api = Arc::new(FakeMessenger::failing(vec![(
            2,
            SendError::Unreachable("bot was blocked by the user".into()),
        )]));
        let ctx = ctx(registry_with(&[1, 2, 3]).await, api.clone()).await;

        handle_text(&ctx, &user(OPERATOR), "/send hi").await;

        assert_eq!(api.texts_for(1), vec!["hi".to_string()]);
        assert_eq!(api.texts_for(2), vec!["hi".to_string()]);
        assert_eq!(api.texts_for(3), vec!["hi".to_string()]);

        let replies = api.texts_for(OPERATOR);
        assert_eq!(replies.len(), 2);
        assert!(replies[0].contains("Starting broadcast to 3"));
        assert!(replies[1].contains("Delivered: 2"));
        assert!(replies[1].contains("Failed: 1"));
        assert!(replies[1].contains("Total subscribers: 3"));
        assert!(ctx.journal.take_interrupted().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn operator_broadcast_without_subscribers() {
        let api = Arc::new(FakeMessenger::default());
        let ctx = ctx(registry_with(&[]).await, api.clone()).await;

        handle_text(&ctx, &user(OPERATOR), "/send hi").await;
        assert_eq!(api.sent_to(), vec![OPERATOR]);
        assert!(last_reply(&api, OPERATOR).contains("no subscribers"));
    }

    #[tokio::test]
    async fn operator_broadcast_needs_text() {
        let api = Arc::new(FakeMessenger::default());
        let ctx = ctx(registry_with(&[1]).await, api.clone()).await;

        handle_text(&ctx, &user(OPERATOR), "/send   ").await;
        assert_eq!(api.sent_to(), vec![OPERATOR]);
        assert!(last_reply(&api, OPERATOR).starts_with("📝 Usage"));
    }

    #[tokio::test]
    async fn operator_broadcast_rejects_oversized_text() {
        let api = Arc::new(FakeMessenger::default());
        let ctx = ctx(registry_with(&[1]).await, api.clone()).await;

        let body = "x".repeat(5000);
        handle_text(&ctx, &user(OPERATOR), &format!("/send {body}")).await;
        assert_eq!(api.sent_to(), vec![OPERATOR]);
        assert!(last_reply(&api, OPERATOR).contains("too long"));
    }

    #[tokio::test]
    async fn storage_outage_gets_failure_notices() {
        let registry = SubscriberRegistry::open(Arc::new(BrokenStore::default()))
            .await
            .unwrap();
        let api = Arc::new(FakeMessenger::default());
        let ctx = ctx(registry, api.clone()).await;

        handle_text(&ctx, &user(5), "/start").await;
        assert!(last_reply(&api, 5).contains("Subscription failed"));

        handle_text(&ctx, &user(OPERATOR), "/send hi").await;
        assert!(last_reply(&api, OPERATOR).contains("Could not read the subscriber list"));

        handle_text(&ctx, &user(OPERATOR), "/stats").await;
        assert!(last_reply(&api, OPERATOR).contains("Could not load statistics"));
    }

    #[tokio::test]
    async fn statistics_shows_count() {
        let api = Arc::new(FakeMessenger::default());
        let ctx = ctx(registry_with(&[1, 2]).await, api.clone()).await;

        handle_text(&ctx, &user(OPERATOR), "/stats").await;
        let reply = last_reply(&api, OPERATOR);
        assert!(reply.contains("Subscribers: 2"));
        assert!(!reply.contains("Storage errors"));
    }

    #[tokio::test]
    async fn help_hides_operator_commands_from_others() {
        let api = Arc::new(FakeMessenger::default());
        let ctx = ctx(registry_with(&[]).await, api.clone()).await;

        handle_text(&ctx, &user(3), "/help").await;
        assert!(!last_reply(&api, 3).contains("/send"));

        handle_text(&ctx, &user(OPERATOR), "/help").await;
        assert!(last_reply(&api, OPERATOR).contains("/send"));
        assert!(last_reply(&api, OPERATOR).contains("/stats"));
    }

    #[tokio::test]
    async fn unknown_input_gets_fallback() {
        let api = Arc::new(FakeMessenger::default());
        let ctx = ctx(registry_with(&[]).await, api.clone()).await;

        handle_text(&ctx, &user(3), "hello there").await;
        handle_text(&ctx, &user(3), "/whatever").await;
        let replies = api.texts_for(3);
        assert_eq!(replies.len(), 2);
        assert!(replies.iter().all(|r| r.contains("Unknown command")));
    }
}
