//! Subscriber registry: durable set of opted-in recipients.
//!
//! Two layers of API sit on top of a [`SubscriberStore`]:
//! - the `try_*` methods return tagged outcomes and keep storage failures
//!   distinguishable from legitimate absence;
//! - the plain methods collapse storage failures into `false` / empty / `0`,
//!   after logging them and bumping [`SubscriberRegistry::storage_failures`].

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

pub mod sqlite;
pub mod store;

pub use sqlite::SqliteSubscriberStore;
pub use store::{AddOutcome, Profile, RemoveOutcome, Subscriber, SubscriberStore};

use crate::{domain::UserId, Error, Result};

pub struct SubscriberRegistry {
    store: Arc<dyn SubscriberStore>,
    storage_failures: AtomicU64,
}

impl SubscriberRegistry {
    /// Wrap `store` and ensure its schema exists.
    pub async fn open(store: Arc<dyn SubscriberStore>) -> Result<Self> {
        store.init().await?;
        tracing::info!("subscriber registry initialized");
        Ok(Self {
            store,
            storage_failures: AtomicU64::new(0),
        })
    }

    /// Number of storage-layer failures observed since startup.
    pub fn storage_failures(&self) -> u64 {
        self.storage_failures.load(Ordering::Relaxed)
    }

    fn record_failure(&self, op: &str, id: Option<UserId>, e: &Error) {
        self.storage_failures.fetch_add(1, Ordering::Relaxed);
        match id {
            Some(id) => tracing::error!(op = op, user_id = id.0, "registry storage failure: {e}"),
            None => tracing::error!(op = op, "registry storage failure: {e}"),
        }
    }

    // ============== Tagged API ==============

    pub async fn try_add(&self, id: UserId, profile: &Profile) -> Result<AddOutcome> {
        let out = self
            .store
            .insert_if_absent(id, profile)
            .await
            .inspect_err(|e| self.record_failure("add", Some(id), e))?;
        match out {
            AddOutcome::Created => tracing::info!(user_id = id.0, "subscriber added"),
            AddOutcome::AlreadyExists => tracing::info!(user_id = id.0, "subscriber already exists"),
        }
        Ok(out)
    }

    pub async fn try_remove(&self, id: UserId) -> Result<RemoveOutcome> {
        let out = self
            .store
            .delete(id)
            .await
            .inspect_err(|e| self.record_failure("remove", Some(id), e))?;
        match out {
            RemoveOutcome::Removed => tracing::info!(user_id = id.0, "subscriber removed"),
            RemoveOutcome::NotFound => tracing::info!(user_id = id.0, "subscriber not found"),
        }
        Ok(out)
    }

    pub async fn try_is_subscribed(&self, id: UserId) -> Result<bool> {
        self.store
            .exists(id)
            .await
            .inspect_err(|e| self.record_failure("is_subscribed", Some(id), e))
    }

    /// Snapshot of every current subscriber id. Later mutations do not affect the
    /// returned vector.
    pub async fn try_list_ids(&self) -> Result<Vec<UserId>> {
        self.store
            .list_ids()
            .await
            .inspect_err(|e| self.record_failure("list_ids", None, e))
    }

    pub async fn try_count(&self) -> Result<u64> {
        self.store
            .count()
            .await
            .inspect_err(|e| self.record_failure("count", None, e))
    }

    pub async fn get(&self, id: UserId) -> Result<Option<Subscriber>> {
        self.store
            .get(id)
            .await
            .inspect_err(|e| self.record_failure("get", Some(id), e))
    }

    // ============== Collapsed API ==============

    /// `true` if a new subscriber was created.
    pub async fn add_subscriber(&self, id: UserId, profile: &Profile) -> bool {
        matches!(self.try_add(id, profile).await, Ok(AddOutcome::Created))
    }

    /// `true` if a subscriber was deleted.
    pub async fn remove_subscriber(&self, id: UserId) -> bool {
        matches!(self.try_remove(id).await, Ok(RemoveOutcome::Removed))
    }

    pub async fn is_subscribed(&self, id: UserId) -> bool {
        self.try_is_subscribed(id).await.unwrap_or(false)
    }

    pub async fn list_subscriber_ids(&self) -> Vec<UserId> {
        self.try_list_ids().await.unwrap_or_default()
    }

    pub async fn count(&self) -> u64 {
        self.try_count().await.unwrap_or(0)
    }

    pub async fn close(&self) {
        self.store.close().await;
        tracing::info!("subscriber registry closed");
    }
}
