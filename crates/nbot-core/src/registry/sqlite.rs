use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use super::store::{AddOutcome, Profile, RemoveOutcome, Subscriber, SubscriberStore};
use crate::{domain::UserId, Result};

/// SQLite-backed subscriber store.
pub struct SqliteSubscriberStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct SubscriberRow {
    id: i64,
    username: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    subscribed_at: i64,
}

impl From<SubscriberRow> for Subscriber {
    fn from(r: SubscriberRow) -> Self {
        Self {
            id: UserId(r.id),
            username: r.username,
            first_name: r.first_name,
            last_name: r.last_name,
            subscribed_at: DateTime::from_timestamp_millis(r.subscribed_at).unwrap_or_default(),
        }
    }
}

impl SqliteSubscriberStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open (creating if missing) the database at `url`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let opts = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;
        Ok(Self::new(pool))
    }

    /// Private in-memory database. A single connection keeps every query on the
    /// same database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl SubscriberStore for SqliteSubscriberStore {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS subscribers (
                id            INTEGER PRIMARY KEY,
                username      TEXT,
                first_name    TEXT,
                last_name     TEXT,
                subscribed_at INTEGER NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_if_absent(&self, id: UserId, profile: &Profile) -> Result<AddOutcome> {
        let now = Utc::now().timestamp_millis();
        let res = sqlx::query(
            r#"INSERT INTO subscribers (id, username, first_name, last_name, subscribed_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(id) DO NOTHING"#,
        )
        .bind(id.0)
        .bind(&profile.username)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 1 {
            Ok(AddOutcome::Created)
        } else {
            Ok(AddOutcome::AlreadyExists)
        }
    }

    async fn delete(&self, id: UserId) -> Result<RemoveOutcome> {
        let res = sqlx::query("DELETE FROM subscribers WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        if res.rows_affected() > 0 {
            Ok(RemoveOutcome::Removed)
        } else {
            Ok(RemoveOutcome::NotFound)
        }
    }

    async fn exists(&self, id: UserId) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM subscribers WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn get(&self, id: UserId) -> Result<Option<Subscriber>> {
        let row = sqlx::query_as::<_, SubscriberRow>(
            "SELECT id, username, first_name, last_name, subscribed_at FROM subscribers WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn list_ids(&self) -> Result<Vec<UserId>> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT id FROM subscribers ORDER BY subscribed_at, id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| UserId(id)).collect())
    }

    async fn count(&self) -> Result<u64> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM subscribers")
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as u64)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
