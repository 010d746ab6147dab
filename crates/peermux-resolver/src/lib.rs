#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]
#![allow(unexpected_cfgs)]

//! Bounded LRU cache of IP → hostname with non-blocking lookups.
//!
//! `hostname` never waits on the network: a fresh entry is returned from
//! cache, anything else returns `None` immediately and schedules a
//! background reverse lookup unless one is already in flight for that IP.
//! Success and failure entries age out on separate TTLs; eviction is strict
//! LRU, and a read touches the entry to the MRU end.

use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[cfg(test)]
use async_trait::async_trait;
use hashlink::LruCache;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use peermux_core::PeerInfo;

mod lookup;

pub use lookup::{DnsReverseLookup, ReverseLookup};

/// Tuning knobs for the resolver cache.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Time a successful resolution stays fresh.
    pub ttl: Duration,
    /// Time a negative entry stays fresh.
    pub failed_ttl: Duration,
    /// Strict upper bound on cached entries.
    pub max_cache_size: usize,
    /// Per-lookup deadline.
    pub lookup_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(6 * 60 * 60),
            failed_ttl: Duration::from_secs(15 * 60),
            max_cache_size: 1_024,
            lookup_timeout: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    hostname: Option<String>,
    resolved_at: Instant,
}

struct Inner {
    cache: LruCache<IpAddr, CacheEntry>,
    pending: std::collections::HashSet<IpAddr>,
}

/// Shared hostname resolver with a bounded LRU cache.
pub struct HostnameResolver {
    config: ResolverConfig,
    inner: Mutex<Inner>,
    lookup: Arc<dyn ReverseLookup>,
}

impl HostnameResolver {
    /// Construct a resolver over the supplied lookup backend.
    #[must_use]
    pub fn new(config: ResolverConfig, lookup: Arc<dyn ReverseLookup>) -> Arc<Self> {
        let capacity = config.max_cache_size.max(1);
        Arc::new(Self {
            config,
            inner: Mutex::new(Inner {
                cache: LruCache::new(capacity),
                pending: std::collections::HashSet::new(),
            }),
            lookup,
        })
    }

    /// Non-blocking hostname fetch.
    ///
    /// Returns the cached hostname (possibly `None` from a fresh negative
    /// entry) or `None` immediately while a background lookup is scheduled.
    /// An unparseable IP returns `None` without scheduling anything.
    #[must_use]
    pub fn hostname(self: &Arc<Self>, ip: &str) -> Option<String> {
        let addr: IpAddr = ip.parse().ok()?;

        let needs_lookup = {
            let mut inner = self.lock_inner();
            if let Some(entry) = inner.cache.get(&addr) {
                let ttl = if entry.hostname.is_some() {
                    self.config.ttl
                } else {
                    self.config.failed_ttl
                };
                if entry.resolved_at.elapsed() < ttl {
                    return entry.hostname.clone();
                }
            }
            // Stale or absent: schedule at most one in-flight lookup.
            inner.pending.insert(addr)
        };

        if needs_lookup {
            let resolver = Arc::clone(self);
            tokio::spawn(async move {
                resolver.resolve_in_background(addr).await;
            });
        }
        None
    }

    /// Augment peers with cached hostnames without blocking.
    #[must_use]
    pub fn enrich_peers(self: &Arc<Self>, peers: Vec<PeerInfo>) -> Vec<PeerInfo> {
        peers
            .into_iter()
            .map(|mut peer| {
                peer.hostname = self.hostname(&peer.ip);
                peer
            })
            .collect()
    }

    /// Number of cached entries; never exceeds `max_cache_size`.
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.lock_inner().cache.len()
    }

    async fn resolve_in_background(self: Arc<Self>, addr: IpAddr) {
        let result = match timeout(self.config.lookup_timeout, self.lookup.lookup(addr)).await {
            Ok(hostname) => hostname,
            Err(_) => {
                debug!(ip = %addr, "reverse lookup timed out");
                None
            }
        };

        match &result {
            Some(hostname) => trace!(ip = %addr, hostname = %hostname, "reverse lookup resolved"),
            None => trace!(ip = %addr, "reverse lookup negative"),
        }

        let mut inner = self.lock_inner();
        inner.cache.insert(
            addr,
            CacheEntry {
                hostname: result,
                resolved_at: Instant::now(),
            },
        );
        inner.pending.remove(&addr);
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("resolver cache lock poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    struct StubLookup {
        answers: HashMap<IpAddr, String>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl StubLookup {
        fn new(answers: HashMap<IpAddr, String>) -> Arc<Self> {
            Arc::new(Self {
                answers,
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            })
        }
    }

    #[async_trait]
    impl ReverseLookup for StubLookup {
        async fn lookup(&self, ip: IpAddr) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
            self.answers.get(&ip).cloned()
        }
    }

    fn config(max: usize) -> ResolverConfig {
        ResolverConfig {
            ttl: Duration::from_secs(60),
            failed_ttl: Duration::from_secs(60),
            max_cache_size: max,
            lookup_timeout: Duration::from_millis(200),
        }
    }

    async fn settle() {
        // Give spawned lookups a chance to complete.
        for _ in 0..20 {
            sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn first_miss_schedules_then_serves_from_cache() {
        let ip: IpAddr = "192.0.2.1".parse().expect("ip");
        let lookup = StubLookup::new(HashMap::from([(ip, "peer.example".to_string())]));
        let resolver = HostnameResolver::new(config(8), lookup.clone());

        assert!(resolver.hostname("192.0.2.1").is_none());
        settle().await;
        assert_eq!(
            resolver.hostname("192.0.2.1").as_deref(),
            Some("peer.example")
        );
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_ip_never_schedules() {
        let lookup = StubLookup::new(HashMap::new());
        let resolver = HostnameResolver::new(config(8), lookup.clone());
        assert!(resolver.hostname("not-an-ip").is_none());
        settle().await;
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn pending_set_coalesces_concurrent_misses() {
        let ip: IpAddr = "192.0.2.2".parse().expect("ip");
        let lookup = Arc::new(StubLookup {
            answers: HashMap::from([(ip, "slow.example".to_string())]),
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(50),
        });
        let resolver = HostnameResolver::new(config(8), lookup.clone());

        assert!(resolver.hostname("192.0.2.2").is_none());
        assert!(resolver.hostname("192.0.2.2").is_none());
        assert!(resolver.hostname("192.0.2.2").is_none());
        settle().await;
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            resolver.hostname("192.0.2.2").as_deref(),
            Some("slow.example")
        );
    }

    #[tokio::test]
    async fn negative_results_are_cached() {
        let lookup = StubLookup::new(HashMap::new());
        let resolver = HostnameResolver::new(config(8), lookup.clone());

        assert!(resolver.hostname("192.0.2.3").is_none());
        settle().await;
        // Fresh negative entry: no new lookup scheduled.
        assert!(resolver.hostname("192.0.2.3").is_none());
        settle().await;
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cache_never_exceeds_max_size() {
        let lookup = StubLookup::new(HashMap::new());
        let resolver = HostnameResolver::new(config(4), lookup);

        for i in 0..16 {
            let _ = resolver.hostname(&format!("192.0.2.{i}"));
        }
        settle().await;
        assert!(resolver.cache_len() <= 4);
    }

    #[tokio::test]
    async fn enrich_peers_is_non_blocking() {
        let ip: IpAddr = "192.0.2.4".parse().expect("ip");
        let lookup = StubLookup::new(HashMap::from([(ip, "seed.example".to_string())]));
        let resolver = HostnameResolver::new(config(8), lookup);

        let peers = vec![PeerInfo {
            ip: "192.0.2.4".into(),
            hostname: None,
            client_name: "client/1.0".into(),
            download_speed: 0,
            upload_speed: 0,
        }];
        let first = resolver.enrich_peers(peers.clone());
        assert!(first[0].hostname.is_none());
        settle().await;
        let second = resolver.enrich_peers(peers);
        assert_eq!(second[0].hostname.as_deref(), Some("seed.example"));
    }
}
