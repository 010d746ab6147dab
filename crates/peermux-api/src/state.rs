//! Shared application state and the category cache with its first-init
//! barrier.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use rand::Rng;
use rand::distr::Alphanumeric;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use peermux_bridge::{CategoryManager, ClientManager, HistoryRecorder, UnifiedPlane};
use peermux_config::ConfigService;
use peermux_core::{BridgeError, BridgeResult, ClientKind, EngineClient};
use peermux_events::EventBus;
use peermux_resolver::HostnameResolver;
use peermux_store::HashStore;

use crate::compat_qb::QbCategory;
use crate::ws::Broadcaster;

/// Safety deadline after which category-dependent requests proceed with
/// whatever the cache holds.
pub const CATEGORY_INIT_DEADLINE: Duration = Duration::from_secs(60);

/// Everything the handlers share.
pub struct ApiState {
    /// Loaded configuration.
    pub config: Arc<ConfigService>,
    /// Event bus spine.
    pub events: EventBus,
    /// Unified data plane.
    pub plane: Arc<UnifiedPlane>,
    /// Category manager.
    pub categories: Arc<CategoryManager>,
    /// ed2k ↔ magnet hash store.
    pub hash_store: Arc<HashStore>,
    /// History recorder.
    pub history: Arc<HistoryRecorder>,
    /// Client supervisors.
    pub managers: Vec<Arc<ClientManager>>,
    /// qBittorrent category cache.
    pub cache: Arc<CategoryCache>,
    /// WebSocket fan-out.
    pub broadcaster: Arc<Broadcaster>,
    /// Hostname cache for peer enrichment.
    pub resolver: Arc<HostnameResolver>,
    /// Outbound HTTP client (.torrent fetch, Prowlarr).
    pub http: reqwest::Client,
    sessions: Mutex<HashSet<String>>,
    last_search: Mutex<Vec<peermux_core::SearchResult>>,
}

impl ApiState {
    /// Supervisor for one back-end, when configured.
    #[must_use]
    pub fn manager_for(&self, kind: ClientKind) -> Option<&Arc<ClientManager>> {
        self.managers.iter().find(|manager| manager.kind() == kind)
    }

    /// Connected engine for one back-end.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` when the back-end is absent or down.
    pub fn engine(&self, kind: ClientKind) -> BridgeResult<Arc<dyn EngineClient>> {
        self.manager_for(kind)
            .ok_or(BridgeError::NotConnected { client: kind })?
            .engine()
    }

    /// Issue a qBittorrent-style session cookie value.
    #[must_use]
    pub fn issue_session(&self) -> String {
        let sid: String = rand::rng()
            .sample_iter(Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        self.lock_sessions().insert(sid.clone());
        sid
    }

    /// Forget a session cookie.
    pub fn revoke_session(&self, sid: &str) {
        self.lock_sessions().remove(sid);
    }

    /// Remember the latest search results for late subscribers.
    pub fn store_search_results(&self, results: Vec<peermux_core::SearchResult>) {
        *self.lock_search() = results;
    }

    /// The most recent search results.
    #[must_use]
    pub fn last_search_results(&self) -> Vec<peermux_core::SearchResult> {
        self.lock_search().clone()
    }

    fn lock_sessions(&self) -> MutexGuard<'_, HashSet<String>> {
        match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("session set lock poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }

    fn lock_search(&self) -> MutexGuard<'_, Vec<peermux_core::SearchResult>> {
        match self.last_search.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("search result lock poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }

    /// Construct the state; used by the router builder and tests.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<ConfigService>,
        events: EventBus,
        plane: Arc<UnifiedPlane>,
        categories: Arc<CategoryManager>,
        hash_store: Arc<HashStore>,
        history: Arc<HistoryRecorder>,
        managers: Vec<Arc<ClientManager>>,
        cache: Arc<CategoryCache>,
        broadcaster: Arc<Broadcaster>,
        resolver: Arc<HostnameResolver>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            events,
            plane,
            categories,
            hash_store,
            history,
            managers,
            cache,
            broadcaster,
            resolver,
            http: reqwest::Client::new(),
            sessions: Mutex::new(HashSet::new()),
            last_search: Mutex::new(Vec::new()),
        })
    }
}

type SyncFuture = Shared<BoxFuture<'static, ()>>;

/// qBittorrent category cache.
///
/// The cache snapshot is replaced atomically by `sync`; concurrent syncs
/// coalesce onto the same in-flight future; and the first-init barrier is
/// a one-shot latch guarded by a safety deadline so category-dependent
/// requests never hang on an unreachable back-end.
pub struct CategoryCache {
    categories: Arc<CategoryManager>,
    snapshot: Mutex<HashMap<String, QbCategory>>,
    init_tx: watch::Sender<bool>,
    inflight: Mutex<Option<SyncFuture>>,
    init_deadline: Duration,
}

impl CategoryCache {
    /// Construct an uninitialised cache.
    #[must_use]
    pub fn new(categories: Arc<CategoryManager>, init_deadline: Duration) -> Arc<Self> {
        let (init_tx, _) = watch::channel(false);
        Arc::new(Self {
            categories,
            snapshot: Mutex::new(HashMap::new()),
            init_tx,
            inflight: Mutex::new(None),
            init_deadline,
        })
    }

    /// Whether the first successful sync (or the deadline) has resolved.
    #[must_use]
    pub fn initialized(&self) -> bool {
        *self.init_tx.borrow()
    }

    /// Await the first-init barrier.
    ///
    /// The latch resolves on the first successful sync; the safety
    /// deadline resolves it anyway so callers proceed with an empty
    /// cache when the back-end never connects.
    pub async fn ensure_initialized(&self) {
        if self.initialized() {
            return;
        }
        let mut rx = self.init_tx.subscribe();
        let waited = tokio::time::timeout(self.init_deadline, async {
            while !*rx.borrow_and_update() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await;
        if waited.is_err() {
            warn!("category cache init deadline hit; serving without a warm cache");
            let _ = self.init_tx.send(true);
        }
    }

    /// Run (or join) a category sync.
    ///
    /// The cache snapshot is replaced in one assignment, so concurrent
    /// readers observe either the previous or the new view, never a mix.
    pub async fn sync(self: &Arc<Self>) {
        let fut = {
            let mut inflight = self.lock_inflight();
            if let Some(existing) = inflight.as_ref() {
                existing.clone()
            } else {
                let cache = Arc::clone(self);
                let fresh: SyncFuture = async move {
                    cache.categories.reconcile_client(ClientKind::Amule).await;
                    let listed = cache.categories.list().await;
                    let snapshot: HashMap<String, QbCategory> = listed
                        .into_iter()
                        .map(|category| {
                            (
                                category.name.clone(),
                                QbCategory {
                                    name: category.name,
                                    save_path: category.path,
                                },
                            )
                        })
                        .collect();
                    *cache.lock_snapshot() = snapshot;
                    let _ = cache.init_tx.send(true);
                    *cache.lock_inflight() = None;
                    debug!("category cache synced");
                }
                .boxed()
                .shared();
                *inflight = Some(fresh.clone());
                fresh
            }
        };
        fut.await;
    }

    /// The cached category map, after the init barrier.
    pub async fn get(&self) -> HashMap<String, QbCategory> {
        self.ensure_initialized().await;
        self.lock_snapshot().clone()
    }

    /// Register the warm-on-connect hook with the ED2K supervisor.
    pub fn register_on_connect(self: &Arc<Self>, manager: &Arc<ClientManager>) {
        let cache = Arc::clone(self);
        manager.on_connect(Arc::new(move || {
            let cache = Arc::clone(&cache);
            Box::pin(async move {
                cache.sync().await;
            })
        }));
    }

    /// Launch the periodic refresh tick.
    pub fn spawn_refresh(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                cache.sync().await;
            }
        })
    }

    fn lock_snapshot(&self) -> MutexGuard<'_, HashMap<String, QbCategory>> {
        match self.snapshot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("category cache lock poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }

    fn lock_inflight(&self) -> MutexGuard<'_, Option<SyncFuture>> {
        match self.inflight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("category sync lock poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }
}
