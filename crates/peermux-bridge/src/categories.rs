//! Source-of-truth category set with per-client mirrors.
//!
//! The unified set is name-keyed; each connected engine mirrors it under
//! its own identity scheme (numeric id for ED2K, bare label for
//! BitTorrent). All mutations run under the write lock for their full
//! duration, including client write-through, so readers never observe a
//! half-synced set.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use peermux_core::{
    BridgeError, BridgeResult, Category, CategoryPriority, ClientKind, DEFAULT_CATEGORY,
    MirrorCategory, PathMappings,
};
use peermux_events::{Event, EventBus};
use peermux_store::CategoryStore;

use crate::manager::ClientManager;
use crate::paths::{CONTAINER_HINT, probe_dir, running_in_container};

/// Field-wise patch applied to an existing category.
#[derive(Debug, Clone, Default)]
pub struct CategoryPatch {
    /// New display title.
    pub title: Option<String>,
    /// New canonical path.
    pub path: Option<String>,
    /// New comment.
    pub comment: Option<String>,
    /// New colour.
    pub color: Option<u32>,
    /// New priority.
    pub priority: Option<CategoryPriority>,
    /// New per-client path translations.
    pub path_mappings: Option<PathMappings>,
}

/// One unusable effective path, attributed to a category and client.
#[derive(Debug, Clone, serde::Serialize, PartialEq, Eq)]
pub struct PathWarning {
    /// Category name.
    pub category: String,
    /// Client whose effective path failed the probe.
    pub client: ClientKind,
    /// Path that was probed.
    pub path: String,
    /// Probe failure plus the container hint when applicable.
    pub detail: String,
}

#[derive(Default)]
struct State {
    categories: BTreeMap<String, Category>,
    mirrors: HashMap<ClientKind, Vec<MirrorCategory>>,
    warnings: Vec<PathWarning>,
}

/// Name-keyed category manager.
pub struct CategoryManager {
    store: CategoryStore,
    state: RwLock<State>,
    managers: Vec<Arc<ClientManager>>,
    events: EventBus,
    container: bool,
}

impl CategoryManager {
    /// Load the persisted set and wire the manager over the supervisors.
    ///
    /// # Errors
    ///
    /// Returns an error when the persisted document cannot be read.
    pub fn load(
        store: CategoryStore,
        managers: Vec<Arc<ClientManager>>,
        events: EventBus,
    ) -> BridgeResult<Arc<Self>> {
        let loaded = store.load().map_err(BridgeError::from)?;
        let mut categories = BTreeMap::new();
        for category in loaded {
            categories.insert(category.name.clone(), category);
        }

        let container = running_in_container();
        let manager = Arc::new(Self {
            store,
            state: RwLock::new(State {
                categories,
                mirrors: HashMap::new(),
                warnings: Vec::new(),
            }),
            managers,
            events,
            container,
        });

        // Warnings are available before any client connects.
        {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                let mut state = manager.state.write().await;
                manager.recompute_warnings(&mut state);
            });
        }
        Ok(manager)
    }

    /// Register reconcile-on-connect hooks with every supervisor.
    pub fn register_hooks(self: &Arc<Self>) {
        for supervisor in &self.managers {
            let manager = Arc::clone(self);
            let kind = supervisor.kind();
            supervisor.on_connect(Arc::new(move || {
                let manager = Arc::clone(&manager);
                Box::pin(async move {
                    manager.reconcile_client(kind).await;
                })
            }));
        }
    }

    /// Launch the periodic reconcile tick.
    pub fn spawn_refresh(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                manager.reconcile_all().await;
            }
        })
    }

    /// All categories: `Default` first, the rest by name.
    pub async fn list(&self) -> Vec<Category> {
        let state = self.state.read().await;
        let mut categories: Vec<Category> = Vec::with_capacity(state.categories.len());
        if let Some(default) = state.categories.get(DEFAULT_CATEGORY) {
            categories.push(default.clone());
        }
        categories.extend(
            state
                .categories
                .values()
                .filter(|category| !category.is_default())
                .cloned(),
        );
        categories
    }

    /// Fetch one category by name.
    pub async fn get(&self, name: &str) -> Option<Category> {
        self.state.read().await.categories.get(name).cloned()
    }

    /// Create a category and mirror it into every connected client.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` for duplicate names and `BadRequest` for an
    /// empty name.
    pub async fn create(&self, category: Category) -> BridgeResult<()> {
        if category.name.is_empty() {
            return Err(BridgeError::bad_request("category name must not be empty"));
        }
        let mut state = self.state.write().await;
        if state.categories.contains_key(&category.name) {
            return Err(BridgeError::conflict(format!(
                "category '{}' already exists",
                category.name
            )));
        }

        state
            .categories
            .insert(category.name.clone(), category.clone());
        self.persist(&state)?;

        for supervisor in &self.managers {
            let Ok(engine) = supervisor.engine() else {
                continue;
            };
            let path = category.effective_path(supervisor.kind()).to_string();
            if let Err(err) = engine.create_category(&category.name, &path).await {
                warn!(
                    client = %supervisor.kind(),
                    category = %category.name,
                    error = %err,
                    "mirror create failed; reconcile will retry"
                );
            }
        }
        self.refresh_mirrors(&mut state).await;
        self.recompute_warnings(&mut state);
        drop(state);

        info!(category = %category.name, "category created");
        self.events.publish(Event::CategoriesUpdated);
        Ok(())
    }

    /// Apply a patch to a category.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown names and `Conflict` when the patch
    /// touches a protected `Default` attribute.
    pub async fn update(&self, name: &str, patch: CategoryPatch) -> BridgeResult<Category> {
        let mut state = self.state.write().await;
        let category = state
            .categories
            .get_mut(name)
            .ok_or_else(|| BridgeError::NotFound {
                hash: name.to_string(),
            })?;

        if category.is_default()
            && (patch.path.is_some() || patch.priority.is_some())
        {
            return Err(BridgeError::conflict(
                "the Default category cannot be repathed or reprioritised",
            ));
        }

        if let Some(title) = patch.title {
            category.title = title;
        }
        if let Some(path) = patch.path {
            category.path = path;
        }
        if let Some(comment) = patch.comment {
            category.comment = comment;
        }
        if let Some(color) = patch.color {
            category.color = color;
        }
        if let Some(priority) = patch.priority {
            category.priority = priority;
        }
        if let Some(path_mappings) = patch.path_mappings {
            category.path_mappings = path_mappings;
        }
        let updated = category.clone();
        self.persist(&state)?;

        for supervisor in &self.managers {
            let Ok(engine) = supervisor.engine() else {
                continue;
            };
            let mirror = state
                .mirrors
                .get(&supervisor.kind())
                .and_then(|mirrors| mirrors.iter().find(|mirror| mirror.name == updated.name));
            let mirror = MirrorCategory {
                id: mirror.and_then(|mirror| mirror.id),
                name: updated.name.clone(),
                path: updated.effective_path(supervisor.kind()).to_string(),
            };
            match engine.update_category(&mirror).await {
                Ok(()) | Err(BridgeError::Unsupported { .. }) => {}
                Err(err) => {
                    warn!(
                        client = %supervisor.kind(),
                        category = %updated.name,
                        error = %err,
                        "mirror update failed; reconcile will retry"
                    );
                }
            }
        }
        self.refresh_mirrors(&mut state).await;
        self.recompute_warnings(&mut state);
        drop(state);

        self.events.publish(Event::CategoriesUpdated);
        Ok(updated)
    }

    /// Delete a category.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` for `Default` and `NotFound` for unknown names.
    pub async fn delete(&self, name: &str) -> BridgeResult<()> {
        if name == DEFAULT_CATEGORY {
            return Err(BridgeError::conflict(
                "the Default category cannot be deleted",
            ));
        }
        let mut state = self.state.write().await;
        if state.categories.remove(name).is_none() {
            return Err(BridgeError::NotFound {
                hash: name.to_string(),
            });
        }
        self.persist(&state)?;

        for supervisor in &self.managers {
            let Ok(engine) = supervisor.engine() else {
                continue;
            };
            let token = match supervisor.kind() {
                ClientKind::Amule => state
                    .mirrors
                    .get(&ClientKind::Amule)
                    .and_then(|mirrors| mirrors.iter().find(|mirror| mirror.name == name))
                    .and_then(|mirror| mirror.id)
                    .map(|id| id.to_string()),
                ClientKind::Rtorrent => Some(name.to_string()),
            };
            let Some(token) = token else { continue };
            match engine.delete_category(&token).await {
                Ok(()) | Err(BridgeError::Unsupported { .. }) => {}
                Err(err) => {
                    warn!(
                        client = %supervisor.kind(),
                        category = %name,
                        error = %err,
                        "mirror delete failed"
                    );
                }
            }
        }
        self.refresh_mirrors(&mut state).await;
        self.recompute_warnings(&mut state);
        drop(state);

        info!(category = %name, "category deleted");
        self.events.publish(Event::CategoriesUpdated);
        Ok(())
    }

    /// Reconcile every connected client's mirror with the unified set.
    pub async fn reconcile_all(&self) {
        for supervisor in &self.managers {
            self.reconcile_client(supervisor.kind()).await;
        }
    }

    /// Reconcile one client: create missing mirror entries, then refresh
    /// the authoritative mirror view.
    pub async fn reconcile_client(&self, kind: ClientKind) {
        let Some(supervisor) = self.managers.iter().find(|m| m.kind() == kind) else {
            return;
        };
        let Ok(engine) = supervisor.engine() else {
            return;
        };

        let mut state = self.state.write().await;
        let existing = match engine.list_categories().await {
            Ok(mirrors) => mirrors,
            Err(err) => {
                warn!(client = %kind, error = %err, "mirror listing failed");
                return;
            }
        };

        for category in state.categories.values() {
            if category.is_default() {
                continue;
            }
            if existing.iter().any(|mirror| mirror.name == category.name) {
                continue;
            }
            let path = category.effective_path(kind).to_string();
            if let Err(err) = engine.create_category(&category.name, &path).await {
                warn!(
                    client = %kind,
                    category = %category.name,
                    error = %err,
                    "mirror create during reconcile failed"
                );
            }
        }

        match engine.list_categories().await {
            Ok(mirrors) => {
                debug!(client = %kind, mirrors = mirrors.len(), "mirror view refreshed");
                state.mirrors.insert(kind, mirrors);
            }
            Err(err) => warn!(client = %kind, error = %err, "mirror refresh failed"),
        }
        self.recompute_warnings(&mut state);
        drop(state);
        self.events.publish(Event::CategoriesUpdated);
    }

    /// Resolve a client's raw category token into a unified name.
    ///
    /// Unresolvable tokens map to `Default`.
    pub async fn resolve_token(&self, kind: ClientKind, token: Option<&str>) -> String {
        let Some(token) = token else {
            return DEFAULT_CATEGORY.to_string();
        };
        let state = self.state.read().await;
        let name = match kind {
            ClientKind::Amule => token.parse::<u32>().ok().and_then(|id| {
                state
                    .mirrors
                    .get(&ClientKind::Amule)
                    .and_then(|mirrors| mirrors.iter().find(|mirror| mirror.id == Some(id)))
                    .map(|mirror| mirror.name.clone())
            }),
            ClientKind::Rtorrent => Some(token.to_string()),
        };
        match name {
            Some(name) if state.categories.contains_key(&name) => name,
            _ => DEFAULT_CATEGORY.to_string(),
        }
    }

    /// Resolve a unified name into the client's raw token.
    pub async fn token_for(&self, kind: ClientKind, name: &str) -> Option<String> {
        let state = self.state.read().await;
        if !state.categories.contains_key(name) {
            return None;
        }
        match kind {
            ClientKind::Amule => state
                .mirrors
                .get(&ClientKind::Amule)
                .and_then(|mirrors| mirrors.iter().find(|mirror| mirror.name == name))
                .and_then(|mirror| mirror.id)
                .map(|id| id.to_string()),
            ClientKind::Rtorrent => Some(name.to_string()),
        }
    }

    /// Current path warnings.
    pub async fn warnings(&self) -> Vec<PathWarning> {
        self.state.read().await.warnings.clone()
    }

    /// Whether any category has an unusable effective path.
    pub async fn has_path_warnings(&self) -> bool {
        !self.state.read().await.warnings.is_empty()
    }

    fn persist(&self, state: &State) -> BridgeResult<()> {
        let categories: Vec<Category> = state.categories.values().cloned().collect();
        self.store.save(&categories).map_err(BridgeError::from)
    }

    async fn refresh_mirrors(&self, state: &mut State) {
        for supervisor in &self.managers {
            let Ok(engine) = supervisor.engine() else {
                continue;
            };
            if let Ok(mirrors) = engine.list_categories().await {
                state.mirrors.insert(supervisor.kind(), mirrors);
            }
        }
    }

    fn recompute_warnings(&self, state: &mut State) {
        let mut warnings = Vec::new();
        for category in state.categories.values() {
            for supervisor in &self.managers {
                if !supervisor.enabled() {
                    continue;
                }
                let path = category.effective_path(supervisor.kind());
                if path.is_empty() {
                    continue;
                }
                let result = probe_dir(Path::new(path));
                if !result.is_ok() {
                    let mut detail = result.detail().to_string();
                    if self.container {
                        detail = format!("{detail}; {CONTAINER_HINT}");
                    }
                    warnings.push(PathWarning {
                        category: category.name.clone(),
                        client: supervisor.kind(),
                        path: path.to_string(),
                        detail,
                    });
                }
            }
        }
        state.warnings = warnings;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::SupervisorOptions;
    use anyhow::Result;
    use async_trait::async_trait;
    use peermux_core::{AddRequest, BridgeResult, ClientItem, EngineClient};
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;
    use tokio::time::{Duration, sleep, timeout};

    /// Engine stub holding a mutable mirror set keyed like the ED2K
    /// engine (numeric ids assigned in creation order).
    struct MirrorEngine {
        kind: ClientKind,
        mirrors: StdMutex<Vec<MirrorCategory>>,
        next_id: StdMutex<u32>,
    }

    impl MirrorEngine {
        fn new(kind: ClientKind, seeded: Vec<MirrorCategory>) -> Arc<Self> {
            let next_id = seeded
                .iter()
                .filter_map(|mirror| mirror.id)
                .max()
                .unwrap_or(0)
                + 1;
            Arc::new(Self {
                kind,
                mirrors: StdMutex::new(seeded),
                next_id: StdMutex::new(next_id),
            })
        }
    }

    #[async_trait]
    impl EngineClient for MirrorEngine {
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
            Ok(Vec::new())
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

        async fn update_category(&self, updated: &MirrorCategory) -> BridgeResult<()> {
            let mut mirrors = self.mirrors.lock().expect("mirrors");
            if let Some(existing) = mirrors.iter_mut().find(|mirror| mirror.id == updated.id) {
                existing.name.clone_from(&updated.name);
                existing.path.clone_from(&updated.path);
            }
            Ok(())
        }

        async fn delete_category(&self, token: &str) -> BridgeResult<()> {
            let id: u32 = token.parse().map_err(|_| BridgeError::bad_request("id"))?;
            self.mirrors
                .lock()
                .expect("mirrors")
                .retain(|mirror| mirror.id != Some(id));
            Ok(())
        }
    }

    async fn connected_manager(engine: Arc<MirrorEngine>) -> Arc<ClientManager> {
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
        .expect("supervisor connected");
        supervisor
    }

    fn movies() -> Category {
        Category {
            name: "Movies".into(),
            title: "Movies".into(),
            path: "/mnt/m".into(),
            path_mappings: PathMappings::default(),
            color: 0x00aa_0000,
            priority: CategoryPriority::Normal,
            comment: String::new(),
        }
    }

    async fn build_manager(
        temp: &TempDir,
        engine: Arc<MirrorEngine>,
    ) -> Result<Arc<CategoryManager>> {
        let supervisor = connected_manager(engine).await;
        let manager = CategoryManager::load(
            CategoryStore::new(temp.path().join("categories.json")),
            vec![supervisor],
            EventBus::new(),
        )?;
        Ok(manager)
    }

    #[tokio::test]
    async fn default_category_always_listed_first() -> Result<()> {
        let temp = TempDir::new()?;
        let engine = MirrorEngine::new(ClientKind::Amule, Vec::new());
        let manager = build_manager(&temp, engine).await?;

        let listed = manager.list().await;
        assert_eq!(listed[0].name, DEFAULT_CATEGORY);
        Ok(())
    }

    #[tokio::test]
    async fn create_writes_through_and_resolves_tokens() -> Result<()> {
        let temp = TempDir::new()?;
        let engine = MirrorEngine::new(
            ClientKind::Amule,
            vec![MirrorCategory {
                id: Some(0),
                name: DEFAULT_CATEGORY.into(),
                path: String::new(),
            }],
        );
        let manager = build_manager(&temp, Arc::clone(&engine)).await?;

        manager.create(movies()).await?;
        let token = manager
            .token_for(ClientKind::Amule, "Movies")
            .await
            .expect("token");
        assert_eq!(
            manager
                .resolve_token(ClientKind::Amule, Some(&token))
                .await,
            "Movies"
        );
        assert_eq!(
            manager.resolve_token(ClientKind::Amule, Some("99")).await,
            DEFAULT_CATEGORY
        );
        assert_eq!(
            manager.resolve_token(ClientKind::Amule, None).await,
            DEFAULT_CATEGORY
        );
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_create_conflicts() -> Result<()> {
        let temp = TempDir::new()?;
        let engine = MirrorEngine::new(ClientKind::Amule, Vec::new());
        let manager = build_manager(&temp, engine).await?;

        manager.create(movies()).await?;
        assert!(matches!(
            manager.create(movies()).await,
            Err(BridgeError::Conflict { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn default_cannot_be_deleted_or_repathed() -> Result<()> {
        let temp = TempDir::new()?;
        let engine = MirrorEngine::new(ClientKind::Amule, Vec::new());
        let manager = build_manager(&temp, engine).await?;

        assert!(matches!(
            manager.delete(DEFAULT_CATEGORY).await,
            Err(BridgeError::Conflict { .. })
        ));
        assert!(matches!(
            manager
                .update(
                    DEFAULT_CATEGORY,
                    CategoryPatch {
                        path: Some("/elsewhere".into()),
                        ..CategoryPatch::default()
                    },
                )
                .await,
            Err(BridgeError::Conflict { .. })
        ));
        // Cosmetic fields stay editable.
        let updated = manager
            .update(
                DEFAULT_CATEGORY,
                CategoryPatch {
                    color: Some(0x0000_ff00),
                    ..CategoryPatch::default()
                },
            )
            .await?;
        assert_eq!(updated.color, 0x0000_ff00);
        Ok(())
    }

    #[tokio::test]
    async fn reconcile_creates_missing_mirrors() -> Result<()> {
        let temp = TempDir::new()?;
        let engine = MirrorEngine::new(ClientKind::Amule, Vec::new());
        let manager = build_manager(&temp, Arc::clone(&engine)).await?;

        // Seed the unified set while the mirror is empty, then reconcile.
        manager.create(movies()).await?;
        engine.mirrors.lock().expect("mirrors").clear();
        manager.reconcile_client(ClientKind::Amule).await;

        let mirrors = engine.mirrors.lock().expect("mirrors").clone();
        assert!(mirrors.iter().any(|mirror| mirror.name == "Movies"));
        Ok(())
    }

    #[tokio::test]
    async fn delete_removes_mirror_entry() -> Result<()> {
        let temp = TempDir::new()?;
        let engine = MirrorEngine::new(ClientKind::Amule, Vec::new());
        let manager = build_manager(&temp, Arc::clone(&engine)).await?;

        manager.create(movies()).await?;
        manager.delete("Movies").await?;
        sleep(Duration::from_millis(10)).await;
        let mirrors = engine.mirrors.lock().expect("mirrors").clone();
        assert!(!mirrors.iter().any(|mirror| mirror.name == "Movies"));
        assert!(manager.get("Movies").await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn missing_paths_produce_warnings() -> Result<()> {
        let temp = TempDir::new()?;
        let engine = MirrorEngine::new(ClientKind::Amule, Vec::new());
        let manager = build_manager(&temp, engine).await?;

        let mut bad = movies();
        bad.path = "/definitely/not/here".into();
        manager.create(bad).await?;
        assert!(manager.has_path_warnings().await);
        let warnings = manager.warnings().await;
        assert!(
            warnings
                .iter()
                .any(|warning| warning.category == "Movies"
                    && warning.detail.contains("does not exist"))
        );

        let mut good = movies();
        good.name = "Local".into();
        good.path = temp.path().to_string_lossy().into_owned();
        manager.create(good).await?;
        assert!(
            manager
                .warnings()
                .await
                .iter()
                .all(|warning| warning.category != "Local")
        );
        Ok(())
    }
}
