//! Broadcast dispatcher: one message fanned out to every current subscriber.
//!
//! Each recipient in the snapshot taken at the start of a run is attempted
//! exactly once. Individual failures are classified, logged and tallied; none
//! of them aborts the run. There is no retry and no persisted progress.

use std::{sync::Arc, time::Duration};

use futures::stream::{self, StreamExt};

use crate::{
    domain::{ChatId, UserId},
    errors::SendError,
    messaging::port::MessagingPort,
    registry::SubscriberRegistry,
    Error, Result,
};

/// Result of one broadcast run. `succeeded + failed == total`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BroadcastReport {
    /// No recipients: nothing was attempted.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    fn record(mut self, delivery: Delivery) -> Self {
        self.total += 1;
        match delivery {
            Delivery::Sent => self.succeeded += 1,
            Delivery::Unreachable | Delivery::Failed => self.failed += 1,
        }
        self
    }
}

/// Per-recipient classification of a send attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Unreachable,
    Failed,
}

#[derive(Clone, Copy, Debug)]
pub struct BroadcastOptions {
    /// Upper bound for a single send; `None` waits for the transport.
    pub send_timeout: Option<Duration>,
    /// Max sends in flight. `1` keeps sends sequential in snapshot order.
    pub concurrency: usize,
}

impl Default for BroadcastOptions {
    fn default() -> Self {
        Self {
            send_timeout: Some(Duration::from_secs(10)),
            concurrency: 1,
        }
    }
}

pub struct Broadcaster {
    registry: Arc<SubscriberRegistry>,
    opts: BroadcastOptions,
}

impl Broadcaster {
    pub fn new(registry: Arc<SubscriberRegistry>, opts: BroadcastOptions) -> Self {
        Self { registry, opts }
    }

    /// Recipient snapshot for a run. Storage failure is an error here, not an
    /// empty list, so an outage never reads as "no subscribers".
    pub async fn snapshot(&self) -> Result<Vec<UserId>> {
        self.registry.try_list_ids().await
    }

    /// Check `text` and take the recipient snapshot, without sending anything.
    ///
    /// Empty text is rejected before the registry is read.
    pub async fn prepare<'a>(&'a self, text: &'a str) -> Result<BroadcastRun<'a>> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("broadcast text is empty".to_string()));
        }
        let recipients = self.snapshot().await?;
        Ok(BroadcastRun {
            broadcaster: self,
            text,
            recipients,
        })
    }

    /// Snapshot the registry and deliver `text` to everyone in it.
    pub async fn broadcast(&self, text: &str, port: &dyn MessagingPort) -> Result<BroadcastReport> {
        Ok(self.prepare(text).await?.deliver(port).await)
    }

    /// Attempt each recipient exactly once.
    async fn deliver(
        &self,
        recipients: Vec<UserId>,
        text: &str,
        port: &dyn MessagingPort,
    ) -> BroadcastReport {
        if recipients.is_empty() {
            tracing::info!("broadcast skipped: no subscribers");
            return BroadcastReport::default();
        }
        let total = recipients.len();
        tracing::info!(total = total, concurrency = self.opts.concurrency, "broadcast started");

        let report = stream::iter(recipients)
            .map(|id| self.send_one(port, id, text))
            .buffer_unordered(self.opts.concurrency.max(1))
            .fold(BroadcastReport::default(), |acc, d| async move { acc.record(d) })
            .await;

        debug_assert_eq!(report.total, total);
        tracing::info!(
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed,
            "broadcast finished"
        );
        report
    }

    async fn send_one(&self, port: &dyn MessagingPort, id: UserId, text: &str) -> Delivery {
        let chat_id = ChatId::from(id);
        let res = match self.opts.send_timeout {
            Some(limit) => match tokio::time::timeout(limit, port.send_text(chat_id, text)).await {
                Ok(r) => r.map(|_| ()),
                Err(_) => Err(SendError::TimedOut(limit)),
            },
            None => port.send_text(chat_id, text).await.map(|_| ()),
        };

        match res {
            Ok(()) => Delivery::Sent,
            Err(e) if e.is_unreachable() => {
                tracing::warn!(user_id = id.0, "broadcast recipient unreachable: {e}");
                Delivery::Unreachable
            }
            Err(e) => {
                tracing::error!(user_id = id.0, "broadcast send failed: {e}");
                Delivery::Failed
            }
        }
    }
}

/// A broadcast whose text is checked and whose recipients are fixed.
pub struct BroadcastRun<'a> {
    broadcaster: &'a Broadcaster,
    text: &'a str,
    recipients: Vec<UserId>,
}

impl BroadcastRun<'_> {
    pub fn total(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    pub async fn deliver(self, port: &dyn MessagingPort) -> BroadcastReport {
        self.broadcaster
            .deliver(self.recipients, self.text, port)
            .await
    }
}
