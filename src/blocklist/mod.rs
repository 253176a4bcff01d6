//! The blocked-domain set and its refresh cycle (SPEC_FULL.md §4.1).
//!
//! The set itself is published behind an `ArcSwap` so lookups never block on
//! a refresh in progress and a refresh never blocks a lookup: readers see
//! either the old set or the new one, atomically, never a half-built one.

pub mod parser;
pub mod sources;

use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use tracing::info;

pub use sources::{default_sources, BlocklistSource, SourceStatus};

use crate::storage::Storage;

/// Ownership/classification of a lookup result against the blocked set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockDecision {
    Allowed,
    Blocked,
}

pub struct BlocklistManager {
    blocked: ArcSwap<HashSet<String>>,
    sources: Mutex<Vec<BlocklistSource>>,
    custom: HashSet<String>,
    whitelist: HashSet<String>,
    last_refresh_day: Mutex<Option<NaiveDate>>,
}

impl BlocklistManager {
    /// `custom` is the `adsblock.custom` list (§4.1's Union rule): domains
    /// blocked unconditionally regardless of what the remote sources parse to.
    pub fn new(blacklist_urls: &[String], custom: &[String], whitelist: &[String]) -> Self {
        let sources = if blacklist_urls.is_empty() {
            default_sources()
        } else {
            blacklist_urls.iter().map(BlocklistSource::new).collect()
        };

        Self {
            blocked: ArcSwap::from_pointee(HashSet::new()),
            sources: Mutex::new(sources),
            custom: custom.iter().map(|d| crate::dns::normalize(d)).collect(),
            whitelist: whitelist.iter().map(|d| crate::dns::normalize(d)).collect(),
            last_refresh_day: Mutex::new(None),
        }
    }

    /// Non-blocking read of the current blocked set. The returned `Arc` is a
    /// point-in-time snapshot; it is never mutated in place.
    pub fn current(&self) -> Arc<HashSet<String>> {
        self.blocked.load_full()
    }

    /// `fqdn` (and its parent domains) against the blocked set. A query for
    /// `ads.example.com.` is blocked if `ads.example.com.` OR any of its
    /// registrable parents were loaded from a source verbatim.
    pub fn decide(&self, fqdn: &str) -> BlockDecision {
        let set = self.current();
        let normalized = crate::dns::normalize(fqdn);
        if set.contains(&normalized) {
            BlockDecision::Blocked
        } else {
            BlockDecision::Allowed
        }
    }

    /// Refresh every source and republish the union (remote sources plus
    /// `custom`, minus `whitelist`), unless the last refresh already happened
    /// today (UTC) and `force` is false. Each source's fetch outcome is
    /// persisted via `storage.upsert_blocklist_source` (§6): the success path
    /// writes status/contents/count, the failure path writes status only.
    /// The resulting set and its size are also persisted as the
    /// `blocked-domains`/`blocked-stats` settings, mirroring the sources'
    /// `config-sha256` row.
    pub async fn refresh(&self, force: bool, storage: &dyn Storage) {
        let today = Utc::now().date_naive();
        {
            let last = self.last_refresh_day.lock();
            if !force && *last == Some(today) {
                return;
            }
        }

        let client = match sources::build_client() {
            Ok(client) => client,
            Err(err) => {
                tracing::error!(error = %err, "failed to build blocklist http client, skipping refresh");
                return;
            }
        };

        let urls: Vec<String> = {
            let sources = self.sources.lock();
            sources.iter().map(|s| s.url.clone()).collect()
        };

        let fetches = urls.into_iter().map(|url| {
            let client = client.clone();
            async move {
                let mut source = BlocklistSource::new(url);
                sources::fetch_one(&client, &mut source).await;
                source
            }
        });
        let fetched: Vec<BlocklistSource> = futures::future::join_all(fetches).await;

        for source in &fetched {
            let status = source.last_status.map(SourceStatus::as_str).unwrap_or("unknown");
            let (contents, count) = match source.last_status {
                Some(SourceStatus::Success) => {
                    (source.last_contents.as_deref(), Some(source.domains().len() as i64))
                }
                _ => (None, None),
            };
            if let Err(err) = storage.upsert_blocklist_source(&source.url, status, contents, count).await {
                tracing::warn!(url = %source.url, error = %err, "failed to persist blocklist source status");
            }
        }

        let mut union = HashSet::new();
        let mut total_parsed = 0usize;
        for source in &fetched {
            total_parsed += source.domains().len();
            union.extend(source.domains());
        }
        union.extend(self.custom.iter().cloned());
        for domain in &self.whitelist {
            union.remove(domain);
        }

        let total = union.len();
        let stats = format!("{total} out of {total_parsed}");
        let mut sorted_domains: Vec<&str> = union.iter().map(String::as_str).collect();
        sorted_domains.sort_unstable();
        let domains_blob = sorted_domains.join("\n");

        self.blocked.store(Arc::new(union));
        *self.sources.lock() = fetched;
        *self.last_refresh_day.lock() = Some(today);

        if let Err(err) = storage.upsert_setting("blocked-stats", &stats).await {
            tracing::warn!(error = %err, "failed to persist blocked-stats setting");
        }
        if let Err(err) = storage.upsert_setting("blocked-domains", &domains_blob).await {
            tracing::warn!(error = %err, "failed to persist blocked-domains setting");
        }

        info!(domains = total, "blocklist refreshed");
    }

    pub fn source_statuses(&self) -> Vec<(String, Option<SourceStatus>)> {
        self.sources.lock().iter().map(|s| (s.url.clone(), s.last_status)).collect()
    }
}
