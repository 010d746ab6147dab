//! Unified data plane: merges per-client snapshots into one item stream.
//!
//! Every tick (and immediately after any mutation the bridge itself
//! performed) the plane queries each connected client, projects records
//! through the client adapters, widens ED2K hashes through the hash
//! store, resolves categories against the mirror tables, and publishes
//! the merged snapshot on a watch channel consumed by the broadcaster,
//! the history recorder, and the qBittorrent facade.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use peermux_core::{ClientKind, Item, TransferStats};
use peermux_store::{HashMeta, HashStore, synthesize_magnet_hash};

use crate::categories::CategoryManager;
use crate::manager::ClientManager;

/// One merged view of the live plane.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Normalised items from every connected client.
    pub items: Vec<Item>,
    /// Aggregate transfer statistics.
    pub stats: TransferStats,
    /// When the snapshot was taken.
    pub taken_at: Option<DateTime<Utc>>,
}

/// The merge loop and its outputs.
pub struct UnifiedPlane {
    managers: Vec<Arc<ClientManager>>,
    categories: Arc<CategoryManager>,
    hash_store: Arc<HashStore>,
    snapshot_tx: watch::Sender<Arc<Snapshot>>,
    poke: Notify,
}

impl UnifiedPlane {
    /// Construct the plane over the supervised clients.
    #[must_use]
    pub fn new(
        managers: Vec<Arc<ClientManager>>,
        categories: Arc<CategoryManager>,
        hash_store: Arc<HashStore>,
    ) -> Arc<Self> {
        let (snapshot_tx, _) = watch::channel(Arc::new(Snapshot::default()));
        Arc::new(Self {
            managers,
            categories,
            hash_store,
            snapshot_tx,
            poke: Notify::new(),
        })
    }

    /// The most recent snapshot.
    #[must_use]
    pub fn latest(&self) -> Arc<Snapshot> {
        self.snapshot_tx.borrow().clone()
    }

    /// Watch snapshot publications.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshot_tx.subscribe()
    }

    /// Request an immediate merge after a bridge-initiated mutation.
    pub fn poke(&self) {
        self.poke.notify_one();
    }

    /// Launch the merge loop at the given cadence.
    pub fn spawn(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let plane = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tick.tick() => {}
                    () = plane.poke.notified() => {}
                }
                let snapshot = plane.collect().await;
                let _ = plane.snapshot_tx.send(Arc::new(snapshot));
            }
        })
    }

    /// Merge live items from every connected client.
    pub async fn collect(&self) -> Snapshot {
        let mut items: Vec<Item> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut stats = TransferStats::default();

        for supervisor in &self.managers {
            let Ok(engine) = supervisor.engine() else {
                continue;
            };
            let client_items = match engine.snapshot().await {
                Ok(client_items) => client_items,
                Err(err) => {
                    warn!(client = %supervisor.kind(), error = %err, "snapshot query failed");
                    continue;
                }
            };

            for projected in client_items {
                let mut item = projected.item;
                item.category = self
                    .categories
                    .resolve_token(item.client, projected.category_token.as_deref())
                    .await;
                if item.client == ClientKind::Amule {
                    match self.widen_hash(&item) {
                        Some(magnet) => item.hash = magnet,
                        None => continue,
                    }
                }
                item.tracker = projected
                    .tracker_url
                    .as_deref()
                    .map(extract_tracker_domain)
                    .unwrap_or_default();
                item.normalize();

                // Exactly one session is authoritative per hash.
                if !seen.insert(item.hash.clone()) {
                    warn!(hash = %item.hash, "duplicate hash across back-ends dropped");
                    continue;
                }
                stats.download_speed += item.download_speed;
                stats.upload_speed += item.upload_speed;
                stats.session_downloaded += item.size_downloaded;
                stats.session_uploaded += item.upload_session;
                items.push(item);
            }
        }

        stats.item_count = items.len();
        debug!(items = items.len(), "plane snapshot merged");
        Snapshot {
            items,
            stats,
            taken_at: Some(Utc::now()),
        }
    }

    /// Widen a native 32-hex ED2K hash to the 40-hex facade form,
    /// persisting a fresh mapping when none exists.
    fn widen_hash(&self, item: &Item) -> Option<String> {
        if let Some(magnet) = self.hash_store.magnet_for(&item.hash) {
            return Some(magnet);
        }
        let magnet = synthesize_magnet_hash(&item.hash, item.name.len());
        let meta = HashMeta {
            file_name: item.name.clone(),
            category: item.category.clone(),
            added_at: Utc::now(),
        };
        match self.hash_store.set_mapping(&item.hash, &magnet, meta) {
            Ok(()) => Some(magnet),
            Err(err) => {
                warn!(hash = %item.hash, error = %err, "hash widening refused; item skipped");
                None
            }
        }
    }
}

/// Extract a registrable domain (eTLD+1) from a tracker URL.
///
/// Hosts that are IP literals pass through; otherwise the last two labels
/// are kept, or three when the second-level label is a well-known country
/// SLD. Absent or unparseable URLs map to the empty string.
#[must_use]
pub fn extract_tracker_domain(raw: &str) -> String {
    const COUNTRY_SLDS: [&str; 7] = ["co", "com", "net", "org", "ac", "gov", "edu"];

    let Some(host) = Url::parse(raw).ok().and_then(|url| {
        url.host_str().map(str::to_ascii_lowercase)
    }) else {
        return String::new();
    };
    if host.parse::<std::net::IpAddr>().is_ok() {
        return host;
    }

    let labels: Vec<&str> = host.split('.').filter(|label| !label.is_empty()).collect();
    match labels.len() {
        0 => String::new(),
        1 | 2 => labels.join("."),
        n => {
            let keep = if COUNTRY_SLDS.contains(&labels[n - 2]) {
                3
            } else {
                2
            };
            labels[n - keep..].join(".")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::SupervisorOptions;
    use anyhow::Result;
    use async_trait::async_trait;
    use peermux_core::{
        AddRequest, BridgeResult, Category, CategoryPriority, ClientItem, EngineClient, ItemStatus,
        MirrorCategory, PathMappings,
    };
    use peermux_events::EventBus;
    use peermux_store::CategoryStore;
    use tempfile::TempDir;
    use tokio::time::timeout;

    struct FixedEngine {
        kind: ClientKind,
        items: Vec<ClientItem>,
    }

    #[async_trait]
    impl EngineClient for FixedEngine {
        fn kind(&self) -> ClientKind {
            self.kind
        }

        async fn connect(&self) -> BridgeResult<()> {
            Ok(())
        }

        async fn probe(&self) -> BridgeResult<()> {
            Ok(())
        }

        async fn disconnect(&self) {}

        async fn snapshot(&self) -> BridgeResult<Vec<ClientItem>> {
            Ok(self.items.clone())
        }

        async fn add(&self, _request: AddRequest) -> BridgeResult<String> {
            Ok(String::new())
        }

        async fn remove(&self, _hash: &str, _delete_files: bool) -> BridgeResult<()> {
            Ok(())
        }

        async fn pause(&self, _hash: &str) -> BridgeResult<()> {
            Ok(())
        }

        async fn resume(&self, _hash: &str) -> BridgeResult<()> {
            Ok(())
        }

        async fn set_category(&self, _hash: &str, _token: &str) -> BridgeResult<()> {
            Ok(())
        }

        async fn list_categories(&self) -> BridgeResult<Vec<MirrorCategory>> {
            Ok(vec![MirrorCategory {
                id: Some(3),
                name: "Movies".to_string(),
                path: "/mnt/m".to_string(),
            }])
        }

        async fn create_category(&self, name: &str, path: &str) -> BridgeResult<MirrorCategory> {
            Ok(MirrorCategory {
                id: Some(9),
                name: name.to_string(),
                path: path.to_string(),
            })
        }
    }

    fn raw_item(client: ClientKind, hash: &str, name: &str) -> ClientItem {
        ClientItem {
            item: Item {
                hash: hash.to_string(),
                client,
                name: name.to_string(),
                size: 1_000,
                size_downloaded: 500,
                progress: 0,
                download_speed: 100,
                upload_speed: 10,
                upload_session: 5,
                upload_total: 50,
                eta_seconds: None,
                status: ItemStatus::Downloading,
                message: None,
                category: String::new(),
                tracker: String::new(),
                added_at: Utc::now(),
                completed_at: None,
                part_status: None,
                gap_status: None,
                req_status: None,
            },
            category_token: None,
            tracker_url: None,
        }
    }

    async fn connected(engine: Arc<dyn EngineClient>) -> Arc<ClientManager> {
        let supervisor = ClientManager::new(
            engine,
            true,
            SupervisorOptions {
                initial_backoff: Duration::from_millis(5),
                health_interval: Duration::from_secs(60),
                ..SupervisorOptions::default()
            },
            EventBus::new(),
        );
        let _handle = supervisor.spawn();
        let mut rx = supervisor.watch_state();
        timeout(Duration::from_secs(1), async {
            while *rx.borrow() != peermux_events::ClientState::Connected {
                rx.changed().await.expect("state channel");
            }
        })
        .await
        .expect("connected");
        supervisor
    }

    async fn build_plane(
        temp: &TempDir,
        engines: Vec<Arc<dyn EngineClient>>,
    ) -> Result<(Arc<UnifiedPlane>, Arc<HashStore>)> {
        let mut managers = Vec::new();
        for engine in engines {
            managers.push(connected(engine).await);
        }
        let categories = CategoryManager::load(
            CategoryStore::new(temp.path().join("categories.json")),
            managers.clone(),
            EventBus::new(),
        )?;
        categories
            .create(Category {
                name: "Movies".into(),
                title: "Movies".into(),
                path: "/mnt/m".into(),
                path_mappings: PathMappings::default(),
                color: 0,
                priority: CategoryPriority::Normal,
                comment: String::new(),
            })
            .await?;
        categories.reconcile_all().await;
        let hash_store = Arc::new(HashStore::open(temp.path().join("hashes.json"))?);
        let plane = UnifiedPlane::new(managers, categories, Arc::clone(&hash_store));
        Ok((plane, hash_store))
    }

    #[tokio::test]
    async fn amule_hashes_widen_and_persist() -> Result<()> {
        let temp = TempDir::new()?;
        let ed2k = "0123456789ABCDEF0123456789ABCDEF";
        let engine: Arc<dyn EngineClient> = Arc::new(FixedEngine {
            kind: ClientKind::Amule,
            items: vec![raw_item(ClientKind::Amule, ed2k, "demo.iso")],
        });
        let (plane, hash_store) = build_plane(&temp, vec![engine]).await?;

        let snapshot = plane.collect().await;
        assert_eq!(snapshot.items.len(), 1);
        let widened = &snapshot.items[0].hash;
        assert_eq!(widened.len(), 40);
        assert_eq!(hash_store.magnet_for(ed2k).as_deref(), Some(widened.as_str()));

        // Second pass reuses the persisted mapping.
        let second = plane.collect().await;
        assert_eq!(second.items[0].hash, *widened);
        Ok(())
    }

    #[tokio::test]
    async fn category_tokens_resolve_against_mirrors() -> Result<()> {
        let temp = TempDir::new()?;
        let mut with_category = raw_item(
            ClientKind::Amule,
            "FFFF0123456789ABCDEF0123456789AB",
            "movie.mkv",
        );
        with_category.category_token = Some("3".to_string());
        let mut unknown = raw_item(
            ClientKind::Amule,
            "EEEE0123456789ABCDEF0123456789AB",
            "stray.bin",
        );
        unknown.category_token = Some("42".to_string());

        let engine: Arc<dyn EngineClient> = Arc::new(FixedEngine {
            kind: ClientKind::Amule,
            items: vec![with_category, unknown],
        });
        let (plane, _) = build_plane(&temp, vec![engine]).await?;

        let snapshot = plane.collect().await;
        let by_name: std::collections::HashMap<_, _> = snapshot
            .items
            .iter()
            .map(|item| (item.name.as_str(), item.category.as_str()))
            .collect();
        assert_eq!(by_name["movie.mkv"], "Movies");
        assert_eq!(by_name["stray.bin"], "Default");
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_hashes_keep_one_authority() -> Result<()> {
        let temp = TempDir::new()?;
        let hash = "aa00000000000000000000000000000000000000";
        let first: Arc<dyn EngineClient> = Arc::new(FixedEngine {
            kind: ClientKind::Rtorrent,
            items: vec![raw_item(ClientKind::Rtorrent, hash, "one.mkv")],
        });
        let second: Arc<dyn EngineClient> = Arc::new(FixedEngine {
            kind: ClientKind::Rtorrent,
            items: vec![raw_item(ClientKind::Rtorrent, hash, "two.mkv")],
        });
        let (plane, _) = build_plane(&temp, vec![first, second]).await?;

        let snapshot = plane.collect().await;
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.stats.item_count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn stats_aggregate_across_clients() -> Result<()> {
        let temp = TempDir::new()?;
        let first: Arc<dyn EngineClient> = Arc::new(FixedEngine {
            kind: ClientKind::Rtorrent,
            items: vec![
                raw_item(
                    ClientKind::Rtorrent,
                    "aa00000000000000000000000000000000000000",
                    "one.mkv",
                ),
                raw_item(
                    ClientKind::Rtorrent,
                    "bb00000000000000000000000000000000000000",
                    "two.mkv",
                ),
            ],
        });
        let (plane, _) = build_plane(&temp, vec![first]).await?;

        let snapshot = plane.collect().await;
        assert_eq!(snapshot.stats.download_speed, 200);
        assert_eq!(snapshot.stats.upload_speed, 20);
        assert_eq!(snapshot.stats.item_count, 2);
        Ok(())
    }

    #[test]
    fn tracker_domains_reduce_to_etld_plus_one() {
        assert_eq!(
            extract_tracker_domain("https://tracker.example.com:8080/announce"),
            "example.com"
        );
        assert_eq!(
            extract_tracker_domain("udp://a.b.tracker.co.uk/announce"),
            "tracker.co.uk"
        );
        assert_eq!(extract_tracker_domain("http://localhost/a"), "localhost");
        assert_eq!(
            extract_tracker_domain("http://192.0.2.7:6969/announce"),
            "192.0.2.7"
        );
        assert_eq!(extract_tracker_domain("not a url"), "");
        assert_eq!(extract_tracker_domain(""), "");
    }
}
