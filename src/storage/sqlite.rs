//! `sqlx`-backed `Storage`, with a single background task owning the SQLite
//! connection (grounded on the original's `SQLite` helper and its WAL-mode
//! pragma tuning). All writes funnel through an mpsc channel to that task so
//! the hot query path never blocks on disk I/O.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use tokio::sync::{mpsc, oneshot};
use tracing::error;

use super::{CounterKind, Storage};
use crate::error::{Error, Result};

enum Command {
    UpsertCounter { fingerprint: String, kind: &'static str },
    UpsertBlocklistSource { url: String, status: String, contents: Option<String>, count: Option<i64> },
    UpsertSetting { key: String, value: String },
    GetSetting { key: String, reply: oneshot::Sender<Option<String>> },
    Flush { reply: oneshot::Sender<()> },
}

pub struct SqliteStorage {
    tx: mpsc::Sender<Command>,
}

impl SqliteStorage {
    pub async fn connect(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await?;

        run_migrations(&pool).await?;

        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(run_writer(pool, rx));

        Ok(Self { tx })
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| Error::StorageTransient("storage writer task has exited".to_string()))
    }
}

async fn run_migrations(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS counters (\
            fingerprint TEXT NOT NULL, \
            kind TEXT NOT NULL, \
            count INTEGER NOT NULL DEFAULT 0, \
            first_seen TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP, \
            last_seen TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP, \
            PRIMARY KEY (fingerprint, kind)\
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS blocklist_sources (\
            url TEXT PRIMARY KEY, \
            status TEXT NOT NULL, \
            contents TEXT, \
            count INTEGER, \
            fetched_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP\
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS settings (\
            key TEXT PRIMARY KEY, \
            value TEXT NOT NULL, \
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP\
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn run_writer(pool: Pool<Sqlite>, mut rx: mpsc::Receiver<Command>) {
    while let Some(command) = rx.recv().await {
        let result = match command {
            Command::UpsertCounter { fingerprint, kind } => {
                sqlx::query(
                    "INSERT INTO counters (fingerprint, kind, count, first_seen, last_seen) \
                     VALUES (?1, ?2, 1, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP) \
                     ON CONFLICT(fingerprint, kind) DO UPDATE SET \
                         count = count + 1, last_seen = CURRENT_TIMESTAMP",
                )
                .bind(fingerprint)
                .bind(kind)
                .execute(&pool)
                .await
                .map(|_| ())
            }
            Command::UpsertBlocklistSource { url, status, contents, count } => sqlx::query(
                "INSERT INTO blocklist_sources (url, status, contents, count, fetched_at) \
                 VALUES (?1, ?2, ?3, ?4, CURRENT_TIMESTAMP) \
                 ON CONFLICT(url) DO UPDATE SET status = excluded.status, \
                     contents = COALESCE(excluded.contents, blocklist_sources.contents), \
                     count = COALESCE(excluded.count, blocklist_sources.count), \
                     fetched_at = CURRENT_TIMESTAMP",
            )
            .bind(url)
            .bind(status)
            .bind(contents)
            .bind(count)
            .execute(&pool)
            .await
            .map(|_| ()),
            Command::UpsertSetting { key, value } => sqlx::query(
                "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
            )
            .bind(key)
            .bind(value)
            .execute(&pool)
            .await
            .map(|_| ()),
            Command::GetSetting { key, reply } => {
                let row: Option<(String,)> =
                    sqlx::query_as("SELECT value FROM settings WHERE key = ?1")
                        .bind(key)
                        .fetch_optional(&pool)
                        .await
                        .unwrap_or(None);
                let _ = reply.send(row.map(|(value,)| value));
                continue;
            }
            Command::Flush { reply } => {
                let _ = reply.send(());
                continue;
            }
        };

        if let Err(err) = result {
            error!(error = %err, "storage write failed");
        }
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn upsert_counter(&self, fingerprint: &str, kind: CounterKind) -> Result<()> {
        self.send(Command::UpsertCounter { fingerprint: fingerprint.to_string(), kind: kind.as_str() }).await
    }

    async fn upsert_blocklist_source(
        &self,
        url: &str,
        status: &str,
        contents: Option<&str>,
        count: Option<i64>,
    ) -> Result<()> {
        self.send(Command::UpsertBlocklistSource {
            url: url.to_string(),
            status: status.to_string(),
            contents: contents.map(|c| c.to_string()),
            count,
        })
        .await
    }

    async fn upsert_setting(&self, key: &str, value: &str) -> Result<()> {
        self.send(Command::UpsertSetting { key: key.to_string(), value: value.to_string() }).await
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::GetSetting { key: key.to_string(), reply: reply_tx }).await?;
        reply_rx
            .await
            .map_err(|_| Error::StorageTransient("storage writer task dropped the reply".to_string()))
    }

    async fn flush(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::Flush { reply: reply_tx }).await?;
        reply_rx
            .await
            .map_err(|_| Error::StorageTransient("storage writer task dropped the reply".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn setting_round_trips_through_sqlite() {
        let storage = SqliteStorage::connect(":memory:").await.unwrap();
        assert_eq!(storage.get_setting("config-sha256").await.unwrap(), None);

        storage.upsert_setting("config-sha256", "abc123").await.unwrap();
        storage.flush().await.unwrap();
        assert_eq!(storage.get_setting("config-sha256").await.unwrap(), Some("abc123".to_string()));

        storage.upsert_setting("config-sha256", "def456").await.unwrap();
        storage.flush().await.unwrap();
        assert_eq!(storage.get_setting("config-sha256").await.unwrap(), Some("def456".to_string()));
    }

    #[tokio::test]
    async fn counters_accumulate_across_upserts() {
        let storage = SqliteStorage::connect(":memory:").await.unwrap();
        storage.upsert_counter("widget.test.:A", CounterKind::Upstream).await.unwrap();
        storage.upsert_counter("widget.test.:A", CounterKind::Upstream).await.unwrap();
        storage.flush().await.unwrap();
        // No direct getter for counters; this simply proves the write path doesn't error.
    }

    #[tokio::test]
    async fn blocklist_source_failure_path_keeps_prior_contents() {
        let storage = SqliteStorage::connect(":memory:").await.unwrap();
        storage
            .upsert_blocklist_source("https://example.invalid/list.txt", "success", Some("a.test\n"), Some(1))
            .await
            .unwrap();
        storage.upsert_blocklist_source("https://example.invalid/list.txt", "timeout", None, None).await.unwrap();
        storage.flush().await.unwrap();
    }
}
