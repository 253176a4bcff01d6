//! Bounded fingerprint -> cached-answer map with TTL eviction and a
//! singleflight overlay (SPEC_FULL.md §4.2).

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::dns::DnsResourceRecord;
use crate::error::{Error, Result};

#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub answer: Vec<DnsResourceRecord>,
    pub inserted_at: Instant,
}

impl CachedEntry {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() <= ttl
    }
}

struct InFlight {
    sender: broadcast::Sender<Result<Vec<DnsResourceRecord>>>,
}

/// Removes the `in_flight` entry and wakes any waiters on drop, unless
/// `complete` has been called first. Guards against the leader's future being
/// aborted or dropped before `compute` resolves (§5's cancellation model):
/// without this, the entry would stay behind forever and every follower would
/// await a `broadcast::Receiver` whose sender never sends.
struct LeaderGuard<'a> {
    cache: &'a ResponseCache,
    fingerprint: &'a str,
    done: bool,
}

impl<'a> LeaderGuard<'a> {
    fn complete(mut self) -> Option<InFlight> {
        self.done = true;
        self.cache.in_flight.remove(self.fingerprint).map(|(_, v)| v)
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if let Some((_, leader)) = self.cache.in_flight.remove(self.fingerprint) {
            let _ = leader.sender.send(Err(Error::UpstreamTransient(
                "singleflight leader cancelled before completion".to_string(),
            )));
        }
    }
}

/// A singleflight-protected, TTL-bounded response cache.
///
/// Eviction is LRU-by-insertion-order once `max_size` is exceeded: entries
/// are tracked in a `DashMap`, and overflow evicts the entry whose
/// `inserted_at` is oldest. This is O(n) on overflow rather than O(1), which
/// is an acceptable trade for the expected cache sizes here (low thousands).
pub struct ResponseCache {
    entries: DashMap<String, CachedEntry>,
    in_flight: DashMap<String, InFlight>,
    max_size: usize,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self { entries: DashMap::new(), in_flight: DashMap::new(), max_size, ttl }
    }

    pub fn get(&self, fingerprint: &str) -> Option<CachedEntry> {
        let entry = self.entries.get(fingerprint)?;
        if entry.is_fresh(self.ttl) {
            Some(entry.clone())
        } else {
            drop(entry);
            self.entries.remove(fingerprint);
            None
        }
    }

    pub fn set(&self, fingerprint: String, answer: Vec<DnsResourceRecord>) {
        self.entries.insert(fingerprint, CachedEntry { answer, inserted_at: Instant::now() });
        self.evict_if_over_capacity();
    }

    fn evict_if_over_capacity(&self) {
        if self.entries.len() <= self.max_size {
            return;
        }
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.inserted_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    /// The singleflight contract: if no computation is in flight for
    /// `fingerprint`, this caller becomes the leader and runs `compute`.
    /// Concurrent callers for the same fingerprint instead subscribe to the
    /// leader's broadcast and receive the same result. The in-flight token is
    /// removed before the result is dispatched to any waiter.
    pub async fn get_or_compute<F, Fut>(
        &self,
        fingerprint: &str,
        compute: F,
    ) -> Result<Vec<DnsResourceRecord>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Vec<DnsResourceRecord>>>,
    {
        if let Some(cached) = self.get(fingerprint) {
            return Ok(cached.answer);
        }

        let (sender, mut receiver) = broadcast::channel(1);
        let is_leader = match self.in_flight.entry(fingerprint.to_string()) {
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(InFlight { sender });
                true
            }
            dashmap::mapref::entry::Entry::Occupied(occupied) => {
                receiver = occupied.get().sender.subscribe();
                false
            }
        };

        if !is_leader {
            return match receiver.recv().await {
                Ok(result) => result,
                Err(_) => Err(Error::UpstreamTransient(
                    "singleflight leader dropped without a result".to_string(),
                )),
            };
        }

        let guard = LeaderGuard { cache: self, fingerprint, done: false };
        let result = compute().await;

        // Remove the token before broadcasting so a new leader can be
        // elected the instant this resolves, rather than racing the waiters.
        let leader = guard.complete();

        if let Ok(ref answer) = result {
            self.set(fingerprint.to_string(), answer.clone());
        }

        if let Some(leader) = leader {
            // Ignore send errors: no receivers simply means nobody waited.
            let _ = leader.sender.send(clone_result(&result));
        }

        result
    }
}

fn clone_result(result: &Result<Vec<DnsResourceRecord>>) -> Result<Vec<DnsResourceRecord>> {
    match result {
        Ok(answer) => Ok(answer.clone()),
        Err(err) => Err(Error::UpstreamTransient(err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_answer() -> Vec<DnsResourceRecord> {
        vec![DnsResourceRecord::a("example.com.", 300, Ipv4Addr::new(1, 1, 1, 1))]
    }

    #[tokio::test]
    async fn get_is_none_for_absent_key() {
        let cache = ResponseCache::new(10, Duration::from_secs(60));
        assert!(cache.get("example.com.:A").is_none());
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = ResponseCache::new(10, Duration::from_secs(60));
        cache.set("example.com.:A".to_string(), sample_answer());
        let got = cache.get("example.com.:A").unwrap();
        assert_eq!(got.answer, sample_answer());
    }

    #[tokio::test]
    async fn expired_entries_are_evicted_lazily() {
        let cache = ResponseCache::new(10, Duration::from_millis(1));
        cache.set("example.com.:A".to_string(), sample_answer());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.get("example.com.:A").is_none());
    }

    #[tokio::test]
    async fn overflow_evicts_oldest_entry() {
        let cache = ResponseCache::new(2, Duration::from_secs(60));
        cache.set("a:A".to_string(), sample_answer());
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.set("b:A".to_string(), sample_answer());
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.set("c:A".to_string(), sample_answer());

        assert!(cache.get("a:A").is_none());
        assert!(cache.get("b:A").is_some());
        assert!(cache.get("c:A").is_some());
    }

    #[tokio::test]
    async fn concurrent_callers_coalesce_into_one_compute() {
        let cache = Arc::new(ResponseCache::new(10, Duration::from_secs(60)));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..50 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_compute("widget.test.:A", || {
                        let calls = calls.clone();
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok(sample_answer())
                        }
                    })
                    .await
            }));
        }

        for handle in handles {
            let result = handle.await.unwrap().unwrap();
            assert_eq!(result, sample_answer());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn aborting_the_leader_wakes_followers_instead_of_hanging() {
        let cache = Arc::new(ResponseCache::new(10, Duration::from_secs(60)));

        let leader_cache = cache.clone();
        let leader = tokio::spawn(async move {
            leader_cache
                .get_or_compute("widget.test.:A", || async move {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(sample_answer())
                })
                .await
        });

        // Give the leader a chance to register the in-flight entry before
        // the follower subscribes to it.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let follower_cache = cache.clone();
        let follower = tokio::spawn(async move {
            follower_cache.get_or_compute("widget.test.:A", || async move { Ok(sample_answer()) }).await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        leader.abort();

        let result = tokio::time::timeout(Duration::from_secs(2), follower).await;
        assert!(result.is_ok(), "follower hung instead of being woken by the aborted leader");
        assert!(result.unwrap().unwrap().is_err());
    }
}
