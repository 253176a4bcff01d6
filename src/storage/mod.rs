//! Persistence as a narrow external collaborator (SPEC_FULL.md §6): the
//! resolver core never issues ad-hoc queries against the database, it only
//! calls these upsert/lookup functions and lets the concrete `Storage`
//! implementation own connection pooling, schema, and durability.

mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;

use crate::error::Result;

/// The kind of event a counter upsert represents, per §3's Counter Row and
/// §4.3's per-step counter names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterKind {
    CustomHit,
    Blacklisted,
    CacheHit,
    Forward,
    Upstream,
}

impl CounterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CounterKind::CustomHit => "custom-hit",
            CounterKind::Blacklisted => "blacklisted",
            CounterKind::CacheHit => "cache-hit",
            CounterKind::Forward => "forward",
            CounterKind::Upstream => "upstream",
        }
    }
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Increments `count` and refreshes `last_seen` for `(fingerprint, kind)`.
    async fn upsert_counter(&self, fingerprint: &str, kind: CounterKind) -> Result<()>;

    /// Records the outcome of fetching one blocklist source. The success
    /// path carries `contents`/`count`; the failure path passes `None` for
    /// both and only updates `status`.
    async fn upsert_blocklist_source(
        &self,
        url: &str,
        status: &str,
        contents: Option<&str>,
        count: Option<i64>,
    ) -> Result<()>;

    /// Persists an arbitrary key/value setting (`config-sha256`,
    /// `blocked-domains`, `blocked-stats`).
    async fn upsert_setting(&self, key: &str, value: &str) -> Result<()>;

    /// Reads back a previously persisted setting, if any.
    async fn get_setting(&self, key: &str) -> Result<Option<String>>;

    /// Flushes any buffered writes and blocks until they're durable. Called
    /// once during graceful shutdown.
    async fn flush(&self) -> Result<()>;
}
