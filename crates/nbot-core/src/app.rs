use std::sync::Arc;

use crate::{
    broadcast::{BroadcastOptions, Broadcaster},
    config::Config,
    domain::{ChatId, UserId},
    journal::BroadcastJournal,
    messaging::port::MessagingPort,
    registry::{SqliteSubscriberStore, SubscriberRegistry},
    security::is_operator,
    Result,
};

/// Everything a command handler needs, built once at startup.
pub struct AppContext {
    pub operator: UserId,
    pub registry: Arc<SubscriberRegistry>,
    pub broadcaster: Broadcaster,
    pub messenger: Arc<dyn MessagingPort>,
    pub journal: BroadcastJournal,
}

impl AppContext {
    pub fn new(
        cfg: &Config,
        storage: Storage,
        messenger: Arc<dyn MessagingPort>,
    ) -> Self {
        let Storage { registry, journal } = storage;
        let broadcaster = Broadcaster::new(
            registry.clone(),
            BroadcastOptions {
                send_timeout: cfg.broadcast_send_timeout,
                concurrency: cfg.broadcast_concurrency,
            },
        );
        Self {
            operator: cfg.operator_id,
            registry,
            broadcaster,
            messenger,
            journal,
        }
    }

    pub fn is_operator(&self, user_id: UserId) -> bool {
        is_operator(Some(user_id), self.operator)
    }

    /// Best-effort reply; a failed reply is logged, never propagated.
    pub async fn reply(&self, chat_id: ChatId, text: &str) {
        if let Err(e) = self.messenger.send_text(chat_id, text).await {
            tracing::warn!(chat_id = chat_id.0, "reply failed: {e}");
        }
    }

    /// Tell the operator about every broadcast the previous process never
    /// finished.
    pub async fn report_interrupted_broadcast(&self) {
        let runs = match self.journal.take_interrupted().await {
            Ok(runs) => runs,
            Err(e) => {
                tracing::error!("failed to read broadcast journal: {e}");
                return;
            }
        };
        for run in runs {
            tracing::warn!(
                run_id = run.id.0,
                chat_id = run.chat_id,
                total = run.total,
                "previous broadcast was interrupted"
            );
            self.reply(ChatId::from(self.operator), &run.notice()).await;
        }
    }
}

/// Subscriber registry plus the broadcast journal, both on one SQLite pool.
pub struct Storage {
    pub registry: Arc<SubscriberRegistry>,
    pub journal: BroadcastJournal,
}

/// Open the configured SQLite database and ensure its schema.
pub async fn open_storage(cfg: &Config) -> Result<Storage> {
    let store =
        SqliteSubscriberStore::connect(&cfg.database_url, cfg.database_max_connections).await?;
    let journal = BroadcastJournal::open(store.pool().clone()).await?;
    let registry = SubscriberRegistry::open(Arc::new(store)).await?;
    Ok(Storage {
        registry: Arc::new(registry),
        journal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        broadcast::testing::FakeMessenger, journal::testing::in_memory_journal,
        registry::testing::sqlite_registry,
    };

    const OPERATOR: i64 = 1000;

    fn config() -> Config {
        Config {
            bot_token: "token".into(),
            operator_id: UserId(OPERATOR),
            database_url: "sqlite::memory:".into(),
            database_max_connections: 1,
            broadcast_send_timeout: None,
            broadcast_concurrency: 1,
            webhook: None,
        }
    }

    #[tokio::test]
    async fn interrupted_runs_are_reported_to_operator_once() {
        let journal = in_memory_journal().await;
        journal.begin(OPERATOR, 12).await.unwrap();
        journal.begin(-100, 3).await.unwrap();

        let api = Arc::new(FakeMessenger::default());
        let storage = Storage {
            registry: Arc::new(sqlite_registry().await),
            journal,
        };
        let ctx = AppContext::new(&config(), storage, api.clone());

        ctx.report_interrupted_broadcast().await;
        let notices = api.texts_for(OPERATOR);
        assert_eq!(notices.len(), 2);
        assert!(notices[0].contains("12 subscribers"));
        assert!(notices[1].contains("3 subscribers"));

        ctx.report_interrupted_broadcast().await;
        assert_eq!(api.texts_for(OPERATOR).len(), 2);
    }

    #[tokio::test]
    async fn clean_start_sends_nothing() {
        let api = Arc::new(FakeMessenger::default());
        let storage = Storage {
            registry: Arc::new(sqlite_registry().await),
            journal: in_memory_journal().await,
        };
        let ctx = AppContext::new(&config(), storage, api.clone());

        ctx.report_interrupted_broadcast().await;
        assert!(api.sent_to().is_empty());
    }
}
