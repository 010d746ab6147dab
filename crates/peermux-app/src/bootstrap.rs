//! Application bootstrap: configuration, stores, supervisors, loops,
//! and the HTTP surface.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use peermux_amule::{AmuleClient, AmuleConfig};
use peermux_api::state::{CATEGORY_INIT_DEADLINE, CategoryCache};
use peermux_api::ws::{Broadcaster, spawn_broadcast_loops};
use peermux_api::{ApiServer, ApiState};
use peermux_bridge::{
    CategoryManager, ClientManager, HistoryRecorder, Notifier, NotifyOptions, SupervisorOptions,
    UnifiedPlane,
};
use peermux_config::ConfigService;
use peermux_core::{ClientKind, EngineClient};
use peermux_events::EventBus;
use peermux_resolver::{DnsReverseLookup, HostnameResolver, ResolverConfig, ReverseLookup};
use peermux_rtorrent::{RtorrentClient, RtorrentConfig};
use peermux_store::{CategoryStore, HashStore, HistoryStore, NotificationsStore};
use peermux_telemetry::{LoggingConfig, init_logging};

use crate::error::{AppError, AppResult};
use crate::orchestrator::Orchestrator;

/// Reverse lookup fallback when the system resolver is unusable.
struct NoLookup;

#[async_trait::async_trait]
impl ReverseLookup for NoLookup {
    async fn lookup(&self, _ip: std::net::IpAddr) -> Option<String> {
        None
    }
}

/// Entry point for the bridge boot sequence.
///
/// # Errors
///
/// Returns an error when configuration, persistence, or the HTTP
/// listener cannot be brought up.
pub async fn run_app() -> AppResult<()> {
    let config = Arc::new(ConfigService::load_from_env()?);
    init_logging(&LoggingConfig::default())
        .map_err(|err| AppError::Telemetry(err.to_string()))?;
    info!(config = %config.path().display(), "peermux starting");

    let events = EventBus::new();
    let settings = config.config().clone();
    let data_dir = settings.data_dir.clone();

    // Persistent state.
    let hash_store = Arc::new(HashStore::open(data_dir.join("hashes.json"))?);
    let history_store = Arc::new(HistoryStore::open(data_dir.join("history.json"))?);
    let category_store = CategoryStore::new(data_dir.join("categories.json"));
    let notifications_store = NotificationsStore::new(data_dir.join("notifications.json"));

    // Engine clients behind their supervisors.
    let mut managers: Vec<Arc<ClientManager>> = Vec::new();
    let amule_manager = {
        let client: Arc<dyn EngineClient> = Arc::new(AmuleClient::new(AmuleConfig {
            host: settings.engines.amule_host.clone(),
            port: settings.engines.amule_port,
            password: settings.engines.amule_password.clone(),
            ..AmuleConfig::default()
        }));
        ClientManager::new(
            client,
            settings.engines.amule_enabled,
            SupervisorOptions::default(),
            events.clone(),
        )
    };
    managers.push(Arc::clone(&amule_manager));
    managers.push(ClientManager::new(
        Arc::new(RtorrentClient::new(RtorrentConfig {
            addr: settings.engines.rtorrent_addr.clone(),
            ..RtorrentConfig::default()
        })),
        settings.engines.rtorrent_enabled,
        SupervisorOptions::default(),
        events.clone(),
    ));

    // Category set, plane, history, hash widening.
    let categories = CategoryManager::load(category_store, managers.clone(), events.clone())?;
    categories.register_hooks();
    let plane = UnifiedPlane::new(managers.clone(), Arc::clone(&categories), hash_store.clone());
    {
        let plane = Arc::clone(&plane);
        for manager in &managers {
            let plane = Arc::clone(&plane);
            manager.on_connect(Arc::new(move || {
                let plane = Arc::clone(&plane);
                Box::pin(async move {
                    plane.poke();
                })
            }));
        }
    }
    let history = Arc::new(HistoryRecorder::new(history_store, events.clone()));

    // qBittorrent category cache: warm on the ED2K connect, guarded by
    // the safety deadline.
    let cache = CategoryCache::new(Arc::clone(&categories), CATEGORY_INIT_DEADLINE);
    cache.register_on_connect(&amule_manager);

    // Hostname resolver.
    let resolver_settings = &settings.resolver;
    let lookup: Arc<dyn ReverseLookup> = match DnsReverseLookup::from_system_conf() {
        Ok(lookup) => lookup,
        Err(err) => {
            warn!(error = %err, "system resolver unavailable; hostnames disabled");
            Arc::new(NoLookup)
        }
    };
    let resolver = HostnameResolver::new(
        ResolverConfig {
            ttl: Duration::from_secs(resolver_settings.ttl_secs),
            failed_ttl: Duration::from_secs(resolver_settings.failed_ttl_secs),
            max_cache_size: resolver_settings.max_cache_size,
            lookup_timeout: Duration::from_secs(resolver_settings.lookup_timeout_secs),
        },
        lookup,
    );

    // Fire-and-forget event hand-off.
    let notifier = Notifier::new(
        notifications_store,
        NotifyOptions {
            apprise_bin: settings.notifier.apprise_bin.clone(),
            script_path: settings.notifier.script_path.clone(),
            apprise_timeout: Duration::from_secs(30),
            script_timeout: Duration::from_secs(settings.notifier.script_timeout_secs),
        },
    );

    // Shared API state and the fan-out hub.
    let broadcaster = Broadcaster::new();
    let state = ApiState::new(
        Arc::clone(&config),
        events.clone(),
        Arc::clone(&plane),
        Arc::clone(&categories),
        hash_store,
        Arc::clone(&history),
        managers.clone(),
        Arc::clone(&cache),
        broadcaster,
        resolver,
    );

    // Background loops.
    let mut orchestrator = Orchestrator::new();
    for manager in &managers {
        let name: &'static str = match manager.kind() {
            ClientKind::Amule => "supervisor.amule",
            ClientKind::Rtorrent => "supervisor.rtorrent",
        };
        orchestrator.track(name, manager.spawn());
    }
    orchestrator.track(
        "plane",
        plane.spawn(Duration::from_secs(settings.cadence.snapshot_secs)),
    );
    orchestrator.track(
        "categories.refresh",
        categories.spawn_refresh(Duration::from_secs(settings.cadence.category_sync_secs)),
    );
    orchestrator.track(
        "cache.refresh",
        cache.spawn_refresh(Duration::from_secs(settings.cadence.category_sync_secs)),
    );
    orchestrator.track(
        "history",
        history.spawn(&plane, Duration::from_secs(settings.cadence.history_secs)),
    );
    orchestrator.track("notifier", notifier.spawn(&events));
    orchestrator.track(
        "broadcast",
        spawn_broadcast_loops(&state, Duration::from_secs(settings.cadence.snapshot_secs)),
    );

    // Serve until a shutdown signal, then reap the loops.
    let bind: IpAddr = settings.http.bind_addr.parse().map_err(|_| {
        AppError::Config(peermux_config::ConfigError::invalid(
            "http.bind_addr is not an IP address",
        ))
    })?;
    let addr = SocketAddr::new(bind, settings.http.port);
    let server = ApiServer::new(state);

    tokio::select! {
        served = server.serve(addr) => {
            served?;
        }
        () = shutdown_signal() => {
            info!("shutdown signal received");
        }
    }
    orchestrator.shutdown();
    info!("peermux stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut signal) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            signal.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
