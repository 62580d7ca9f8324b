use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;

use crate::Result;

/// Id of one journaled broadcast run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunId(pub i64);

/// A broadcast that was in flight.
///
/// A row is written before the first send and deleted after the last one. A row
/// found at startup means the process died mid-run and the operator cannot know
/// how many recipients were reached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BroadcastEntry {
    pub id: RunId,
    pub chat_id: i64,
    pub total: usize,
    pub started_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct RunRow {
    id: i64,
    chat_id: i64,
    total: i64,
    started_at: i64,
}

impl From<RunRow> for BroadcastEntry {
    fn from(r: RunRow) -> Self {
        Self {
            id: RunId(r.id),
            chat_id: r.chat_id,
            total: r.total.max(0) as usize,
            started_at: DateTime::from_timestamp_millis(r.started_at).unwrap_or_default(),
        }
    }
}

impl BroadcastEntry {
    pub fn notice(&self) -> String {
        format!(
            "⚠️ The bot restarted during a broadcast started at {} for {} subscribers.\n\
The number of recipients reached is unknown.",
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.total
        )
    }
}

/// In-flight broadcast runs, kept in the same SQLite database as the
/// subscriber registry so they outlive the process and its temp dirs.
#[derive(Clone, Debug)]
pub struct BroadcastJournal {
    pool: SqlitePool,
}

impl BroadcastJournal {
    /// Wrap `pool` and ensure the `broadcast_runs` table exists.
    pub async fn open(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS broadcast_runs (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id    INTEGER NOT NULL,
                total      INTEGER NOT NULL,
                started_at INTEGER NOT NULL
            )"#,
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }

    pub async fn begin(&self, chat_id: i64, total: usize) -> Result<RunId> {
        let res = sqlx::query(
            "INSERT INTO broadcast_runs (chat_id, total, started_at) VALUES (?, ?, ?)",
        )
        .bind(chat_id)
        .bind(total as i64)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(RunId(res.last_insert_rowid()))
    }

    /// Clear one run. Other runs still in flight keep their rows.
    pub async fn finish(&self, run: RunId) {
        if let Err(e) = sqlx::query("DELETE FROM broadcast_runs WHERE id = ?")
            .bind(run.0)
            .execute(&self.pool)
            .await
        {
            tracing::warn!(run_id = run.0, "failed to clear broadcast journal: {e}");
        }
    }

    /// Return and clear every run left behind by a previous process, oldest
    /// first.
    pub async fn take_interrupted(&self) -> Result<Vec<BroadcastEntry>> {
        let rows = sqlx::query_as::<_, RunRow>(
            "DELETE FROM broadcast_runs RETURNING id, chat_id, total, started_at",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut runs: Vec<BroadcastEntry> = rows.into_iter().map(Into::into).collect();
        runs.sort_by_key(|r| (r.started_at, r.id.0));
        Ok(runs)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use sqlx::sqlite::SqlitePoolOptions;

    use super::BroadcastJournal;

    pub(crate) async fn in_memory_journal() -> BroadcastJournal {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        BroadcastJournal::open(pool).await.unwrap()
    }
}
