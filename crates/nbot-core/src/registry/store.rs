use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{domain::UserId, Result};

/// One opted-in recipient.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscriber {
    pub id: UserId,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Set once on first successful subscribe, never updated.
    pub subscribed_at: DateTime<Utc>,
}

/// Display metadata forwarded from the inbound command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Profile {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    Created,
    AlreadyExists,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotFound,
}

/// Storage primitives behind the subscriber registry.
///
/// Every method is a single short operation on the shared backend. Failures are
/// returned, never swallowed; the registry decides how to surface them.
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    /// Ensure the schema exists. Called once before any other operation.
    async fn init(&self) -> Result<()>;

    /// Atomic insert-if-absent keyed by `id`.
    async fn insert_if_absent(&self, id: UserId, profile: &Profile) -> Result<AddOutcome>;

    async fn delete(&self, id: UserId) -> Result<RemoveOutcome>;

    async fn exists(&self, id: UserId) -> Result<bool>;

    async fn get(&self, id: UserId) -> Result<Option<Subscriber>>;

    async fn list_ids(&self) -> Result<Vec<UserId>>;

    async fn count(&self) -> Result<u64>;

    /// Release pooled connections.
    async fn close(&self);
}
