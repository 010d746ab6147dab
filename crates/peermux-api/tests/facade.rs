//! End-to-end tests of the qBittorrent facade over stubbed engines.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::time::timeout;

use peermux_api::state::CategoryCache;
use peermux_api::{ApiServer, ApiState};
use peermux_bridge::{
    CategoryManager, ClientManager, HistoryRecorder, SupervisorOptions, UnifiedPlane,
};
use peermux_config::ConfigService;
use peermux_core::{
    AddRequest, BridgeResult, ClientItem, ClientKind, EngineClient, MirrorCategory,
};
use peermux_events::EventBus;
use peermux_resolver::{HostnameResolver, ResolverConfig, ReverseLookup};
use peermux_store::{CategoryStore, HashStore, HistoryStore};

/// Reverse lookup that never resolves; peer enrichment is exercised
/// elsewhere.
struct NullLookup;

#[async_trait]
impl ReverseLookup for NullLookup {
    async fn lookup(&self, _ip: std::net::IpAddr) -> Option<String> {
        None
    }
}

/// ED2K engine stub: numeric-id category mirror plus a recorded add log.
struct StubAmule {
    mirrors: Mutex<Vec<MirrorCategory>>,
    added: Mutex<Vec<(String, u32)>>,
    next_id: Mutex<u32>,
}

impl StubAmule {
    fn new(seeded: Vec<MirrorCategory>) -> Arc<Self> {
        let next_id = seeded.iter().filter_map(|m| m.id).max().unwrap_or(0) + 1;
        Arc::new(Self {
            mirrors: Mutex::new(seeded),
            added: Mutex::new(Vec::new()),
            next_id: Mutex::new(next_id),
        })
    }
}

#[async_trait]
impl EngineClient for StubAmule {
    fn kind(&self) -> ClientKind {
        ClientKind::Amule
    }

    async fn connect(&self) -> BridgeResult<()> {
        Ok(())
    }

    async fn probe(&self) -> BridgeResult<()> {
        Ok(())
    }

    async fn disconnect(&self) {}

    async fn snapshot(&self) -> BridgeResult<Vec<ClientItem>> {
        Ok(Vec::new())
    }

    async fn add(&self, request: AddRequest) -> BridgeResult<String> {
        let AddRequest::Ed2kLink { link, category_id } = request else {
            return Err(peermux_core::BridgeError::Unsupported { operation: "add" });
        };
        let parsed = peermux_core::Ed2kLink::parse(&link)?;
        self.added
            .lock()
            .expect("added")
            .push((parsed.hash.clone(), category_id));
        Ok(parsed.hash)
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
        Ok(self.mirrors.lock().expect("mirrors").clone())
    }

    async fn create_category(&self, name: &str, path: &str) -> BridgeResult<MirrorCategory> {
        let mut next_id = self.next_id.lock().expect("next id");
        let mirror = MirrorCategory {
            id: Some(*next_id),
            name: name.to_string(),
            path: path.to_string(),
        };
        *next_id += 1;
        self.mirrors.lock().expect("mirrors").push(mirror.clone());
        Ok(mirror)
    }
}

struct Harness {
    base: String,
    http: reqwest::Client,
    amule: Arc<StubAmule>,
    state: Arc<ApiState>,
    _temp: tempfile::TempDir,
}

/// Build a full stack over the stub engine. `init_deadline` controls the
/// category cache barrier; `warm` decides whether the connect hook warms
/// the cache before the harness returns.
async fn harness(init_deadline: Duration, warm: bool) -> Result<Harness> {
    let temp = tempfile::TempDir::new()?;
    let events = EventBus::new();
    let config = Arc::new(ConfigService::load_from(temp.path().join("peermux.json"))?);

    let amule = StubAmule::new(vec![
        MirrorCategory {
            id: Some(0),
            name: "Default".into(),
            path: String::new(),
        },
        MirrorCategory {
            id: Some(3),
            name: "Movies".into(),
            path: "/mnt/m".into(),
        },
    ]);

    let manager = ClientManager::new(
        amule.clone(),
        true,
        SupervisorOptions {
            initial_backoff: Duration::from_millis(5),
            health_interval: Duration::from_secs(60),
            ..SupervisorOptions::default()
        },
        events.clone(),
    );

    let categories = CategoryManager::load(
        CategoryStore::new(temp.path().join("categories.json")),
        vec![manager.clone()],
        events.clone(),
    )?;
    categories
        .create(peermux_core::Category {
            name: "Movies".into(),
            title: "Movies".into(),
            path: "/mnt/m".into(),
            path_mappings: peermux_core::PathMappings::default(),
            color: 0,
            priority: peermux_core::CategoryPriority::Normal,
            comment: String::new(),
        })
        .await?;

    let hash_store = Arc::new(HashStore::open(temp.path().join("hashes.json"))?);
    let history = Arc::new(HistoryRecorder::new(
        Arc::new(HistoryStore::open(temp.path().join("history.json"))?),
        events.clone(),
    ));
    let plane = UnifiedPlane::new(
        vec![manager.clone()],
        categories.clone(),
        hash_store.clone(),
    );
    let cache = CategoryCache::new(categories.clone(), init_deadline);
    cache.register_on_connect(&manager);

    if warm {
        let _handle = manager.spawn();
        let mut rx = manager.watch_state();
        timeout(Duration::from_secs(2), async {
            while *rx.borrow() != peermux_events::ClientState::Connected {
                rx.changed().await.expect("state channel");
            }
        })
        .await
        .expect("supervisor connected");
        cache.sync().await;
    }

    let broadcaster = peermux_api::ws::Broadcaster::new();
    let resolver = HostnameResolver::new(ResolverConfig::default(), Arc::new(NullLookup));
    let state = ApiState::new(
        config,
        events,
        plane,
        categories,
        hash_store,
        history,
        vec![manager],
        cache,
        broadcaster,
        resolver,
    );

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let server = ApiServer::new(state.clone());
    tokio::spawn(async move {
        let _ = server.serve_on(listener).await;
    });

    Ok(Harness {
        base: format!("http://{addr}"),
        http: reqwest::Client::new(),
        amule,
        state,
        _temp: temp,
    })
}

#[tokio::test]
async fn version_endpoints_return_the_pinned_lies() -> Result<()> {
    let harness = harness(Duration::from_millis(100), true).await?;

    let version = harness
        .http
        .get(format!("{}/api/v2/app/version", harness.base))
        .send()
        .await?
        .text()
        .await?;
    assert_eq!(version, "v5.1.4");

    let webapi = harness
        .http
        .get(format!("{}/api/v2/app/webapiVersion", harness.base))
        .send()
        .await?
        .text()
        .await?;
    assert_eq!(webapi, "2.11.4");
    Ok(())
}

#[tokio::test]
async fn login_without_auth_returns_ok_and_cookie() -> Result<()> {
    let harness = harness(Duration::from_millis(100), true).await?;

    let response = harness
        .http
        .post(format!("{}/api/v2/auth/login", harness.base))
        .form(&[("username", "admin"), ("password", "whatever")])
        .send()
        .await?;
    let cookie = response
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    assert_eq!(response.text().await?, "Ok.");
    assert!(cookie.is_some_and(|c| c.starts_with("SID=")));
    Ok(())
}

#[tokio::test]
async fn categories_before_any_session_resolve_via_deadline() -> Result<()> {
    // S1: no connected session; the safety deadline releases the barrier
    // and the response is the default-only set.
    let harness = harness(Duration::from_millis(200), false).await?;

    let started = std::time::Instant::now();
    let body: serde_json::Value = harness
        .http
        .get(format!("{}/api/v2/torrents/categories", harness.base))
        .send()
        .await?
        .json()
        .await?;
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert_eq!(body, serde_json::json!({}));
    Ok(())
}

#[tokio::test]
async fn create_category_appears_in_subsequent_get() -> Result<()> {
    // S2: createCategory writes through and the next GET includes it.
    let harness = harness(Duration::from_secs(5), true).await?;

    let created = harness
        .http
        .post(format!("{}/api/v2/torrents/createCategory", harness.base))
        .form(&[("category", "Shows"), ("savePath", "/mnt/s")])
        .send()
        .await?;
    assert_eq!(created.text().await?, "Ok.");

    let body: serde_json::Value = harness
        .http
        .get(format!("{}/api/v2/torrents/categories", harness.base))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["Shows"]["name"], "Shows");
    assert_eq!(body["Shows"]["savePath"], "/mnt/s");
    assert!(body["Movies"].is_object());
    Ok(())
}

#[tokio::test]
async fn magnet_add_converts_and_maps_and_dispatches() -> Result<()> {
    // S3: magnet → ed2k conversion → hash-store mapping → engine add
    // with the mirror category id → exact body "Ok.".
    let harness = harness(Duration::from_secs(5), true).await?;
    let info_hash = "0123456789abcdef0123456789abcdef01234567";

    let form = reqwest::multipart::Form::new()
        .text(
            "urls",
            format!("magnet:?xt=urn:btih:{info_hash}&dn=File.iso&xl=1048576"),
        )
        .text("category", "Movies");
    let response = harness
        .http
        .post(format!("{}/api/v2/torrents/add", harness.base))
        .multipart(form)
        .send()
        .await?;
    assert_eq!(response.text().await?, "Ok.");

    let added = harness.amule.added.lock().expect("added").clone();
    assert_eq!(added.len(), 1);
    let (ed2k_hash, category_id) = &added[0];
    assert_eq!(*category_id, 3, "mirror id for Movies");
    assert_eq!(
        harness.state.hash_store.magnet_for(ed2k_hash).as_deref(),
        Some(info_hash)
    );
    assert_eq!(
        harness.state.hash_store.ed2k_for(info_hash).as_deref(),
        Some(ed2k_hash.as_str())
    );
    Ok(())
}

#[tokio::test]
async fn malformed_url_fails_batch_without_aborting() -> Result<()> {
    let harness = harness(Duration::from_secs(5), true).await?;
    let info_hash = "aaaa456789abcdef0123456789abcdef01234567";

    let form = reqwest::multipart::Form::new()
        .text(
            "urls",
            format!("not-a-link\nmagnet:?xt=urn:btih:{info_hash}&dn=Good.iso"),
        )
        .text("category", "Movies");
    let response = harness
        .http
        .post(format!("{}/api/v2/torrents/add", harness.base))
        .multipart(form)
        .send()
        .await?;
    assert_eq!(response.text().await?, "Fail.");

    // The good magnet still went through.
    assert_eq!(harness.amule.added.lock().expect("added").len(), 1);
    Ok(())
}

#[tokio::test]
async fn concurrent_category_reads_see_consistent_views() -> Result<()> {
    // S4: readers racing a sync observe either the pre- or post-sync
    // cache, never a partial one.
    let harness = harness(Duration::from_secs(5), true).await?;

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let http = harness.http.clone();
        let base = harness.base.clone();
        tasks.push(tokio::spawn(async move {
            http.get(format!("{base}/api/v2/torrents/categories"))
                .send()
                .await?
                .json::<serde_json::Value>()
                .await
        }));
    }
    let sync = {
        let cache = harness.state.cache.clone();
        tokio::spawn(async move { cache.sync().await })
    };

    for task in tasks {
        let body = task.await??;
        let keys: Vec<&str> = body
            .as_object()
            .expect("object")
            .keys()
            .map(String::as_str)
            .collect();
        // Every view is one of the two complete snapshots.
        assert!(keys.contains(&"Default"));
        assert!(keys.contains(&"Movies"));
    }
    sync.await?;
    Ok(())
}

#[tokio::test]
async fn preferences_carry_bridge_paths_and_port() -> Result<()> {
    let harness = harness(Duration::from_secs(5), true).await?;
    let body: serde_json::Value = harness
        .http
        .get(format!("{}/api/v2/app/preferences", harness.base))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["web_ui_port"], 8686);
    assert!(body.get("dht").is_some());
    Ok(())
}
