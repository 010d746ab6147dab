//! WebSocket fan-out and inbound action dispatch.
//!
//! Outbound state travels as coalesced `batch-update` frames: deltas are
//! merged per subscriber with later values winning, so a subscriber that
//! stalls for several ticks observes one frame carrying the most recent
//! state when it resumes. Action replies ride a separate bounded queue
//! whose head is dropped past the high-water mark; a slow consumer is
//! never blocked on.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use peermux_core::{BridgeError, ClientKind};
use peermux_events::Event;

use crate::actions::{self, ItemOutcome};
use crate::state::ApiState;
use crate::torznab;

/// Maximum queued reply frames per subscriber before head-drop.
const HIGH_WATER: usize = 64;

/// Pending per-data-type deltas; later assignments win.
#[derive(Debug, Default, Clone)]
pub struct PendingDelta {
    /// Aggregate transfer statistics.
    pub stats: Option<Value>,
    /// Unified item list.
    pub items: Option<Value>,
    /// Category definitions.
    pub categories: Option<Value>,
    /// Per-client default save paths.
    pub client_default_paths: Option<Value>,
    /// Whether any category path warning is active.
    pub has_path_warnings: Option<Value>,
}

impl PendingDelta {
    fn merge(&mut self, newer: Self) {
        if newer.stats.is_some() {
            self.stats = newer.stats;
        }
        if newer.items.is_some() {
            self.items = newer.items;
        }
        if newer.categories.is_some() {
            self.categories = newer.categories;
        }
        if newer.client_default_paths.is_some() {
            self.client_default_paths = newer.client_default_paths;
        }
        if newer.has_path_warnings.is_some() {
            self.has_path_warnings = newer.has_path_warnings;
        }
    }

    fn is_empty(&self) -> bool {
        self.stats.is_none()
            && self.items.is_none()
            && self.categories.is_none()
            && self.client_default_paths.is_none()
            && self.has_path_warnings.is_none()
    }

    fn into_frame(self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let mut data = serde_json::Map::new();
        if let Some(stats) = self.stats {
            data.insert("stats".to_string(), stats);
        }
        if let Some(items) = self.items {
            data.insert("items".to_string(), items);
        }
        if let Some(categories) = self.categories {
            data.insert("categories".to_string(), categories);
        }
        if let Some(paths) = self.client_default_paths {
            data.insert("clientDefaultPaths".to_string(), paths);
        }
        if let Some(warnings) = self.has_path_warnings {
            data.insert("hasPathWarnings".to_string(), warnings);
        }
        Some(frame("batch-update", Value::Object(data)))
    }
}

/// One connected subscriber's outbound state.
pub struct Subscriber {
    pending: Mutex<PendingDelta>,
    replies: Mutex<VecDeque<String>>,
    notify: Notify,
}

impl Subscriber {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            pending: Mutex::new(PendingDelta::default()),
            replies: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        })
    }

    /// Merge a delta; later values win within each data type.
    pub fn push_delta(&self, delta: PendingDelta) {
        lock_or_recover(&self.pending, "subscriber delta").merge(delta);
        self.notify.notify_one();
    }

    /// Queue a reply frame, dropping the oldest past high-water.
    pub fn push_reply(&self, reply: String) {
        {
            let mut replies = lock_or_recover(&self.replies, "subscriber replies");
            if replies.len() >= HIGH_WATER {
                replies.pop_front();
            }
            replies.push_back(reply);
        }
        self.notify.notify_one();
    }

    fn drain(&self) -> (Option<String>, Vec<String>) {
        let batch = std::mem::take(&mut *lock_or_recover(&self.pending, "subscriber delta"))
            .into_frame();
        let replies = lock_or_recover(&self.replies, "subscriber replies")
            .drain(..)
            .collect();
        (batch, replies)
    }
}

/// Fan-out hub over all connected subscribers.
pub struct Broadcaster {
    subscribers: Mutex<HashMap<u64, Arc<Subscriber>>>,
    next_id: AtomicU64,
}

impl Broadcaster {
    /// Construct an empty hub.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Register a subscriber.
    pub fn subscribe(&self) -> (u64, Arc<Subscriber>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let subscriber = Subscriber::new();
        lock_or_recover(&self.subscribers, "subscriber set").insert(id, Arc::clone(&subscriber));
        (id, subscriber)
    }

    /// Deregister a subscriber.
    pub fn unsubscribe(&self, id: u64) {
        lock_or_recover(&self.subscribers, "subscriber set").remove(&id);
    }

    /// Number of connected subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        lock_or_recover(&self.subscribers, "subscriber set").len()
    }

    /// Merge a delta into every subscriber.
    pub fn broadcast_delta(&self, delta: &PendingDelta) {
        let subscribers: Vec<Arc<Subscriber>> = lock_or_recover(&self.subscribers, "subscriber set")
            .values()
            .cloned()
            .collect();
        for subscriber in subscribers {
            subscriber.push_delta(delta.clone());
        }
    }

    /// Queue a reply frame on every subscriber.
    pub fn broadcast_reply(&self, reply: &str) {
        let subscribers: Vec<Arc<Subscriber>> = lock_or_recover(&self.subscribers, "subscriber set")
            .values()
            .cloned()
            .collect();
        for subscriber in subscribers {
            subscriber.push_reply(reply.to_string());
        }
    }
}

/// Build a typed outbound frame.
#[must_use]
pub fn frame(kind: &str, data: Value) -> String {
    json!({"type": kind, "data": data}).to_string()
}

/// Attach the WebSocket endpoint to the primary router.
pub fn mount(router: Router<Arc<ApiState>>) -> Router<Arc<ApiState>> {
    router.route("/ws", get(upgrade))
}

async fn upgrade(State(state): State<Arc<ApiState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: Arc<ApiState>, socket: WebSocket) {
    let (id, subscriber) = state.broadcaster.subscribe();
    debug!(subscriber = id, "websocket subscriber connected");

    // Seed the connection with the full current state and the results
    // of the most recent search.
    subscriber.push_delta(full_delta(&state).await);
    let previous = state.last_search_results();
    if !previous.is_empty() {
        subscriber.push_reply(frame(
            "previous-search-results",
            serde_json::to_value(previous).unwrap_or(Value::Null),
        ));
    }

    let (mut sink, mut stream) = socket.split();
    let writer: JoinHandle<()> = {
        let subscriber = Arc::clone(&subscriber);
        tokio::spawn(async move {
            loop {
                subscriber.notify.notified().await;
                let (batch, replies) = subscriber.drain();
                if let Some(batch) = batch
                    && sink.send(Message::Text(batch.into())).await.is_err()
                {
                    return;
                }
                for reply in replies {
                    if sink.send(Message::Text(reply.into())).await.is_err() {
                        return;
                    }
                }
            }
        })
    };

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                dispatch_action(&state, &subscriber, text.as_str()).await;
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    state.broadcaster.unsubscribe(id);
    writer.abort();
    debug!(subscriber = id, "websocket subscriber disconnected");
}

/// Launch the broadcast tick and the event-driven refresh.
pub fn spawn_broadcast_loops(state: &Arc<ApiState>, tick_interval: Duration) -> JoinHandle<()> {
    let state = Arc::clone(state);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(tick_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut events = state.events.subscribe(None);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let delta = live_delta(&state);
                    state.broadcaster.broadcast_delta(&delta);
                }
                envelope = events.next() => {
                    let Some(envelope) = envelope else { return };
                    if matches!(envelope.event, Event::CategoriesUpdated) {
                        let delta = categories_delta(&state).await;
                        state.broadcaster.broadcast_delta(&delta);
                    }
                }
            }
        }
    })
}

fn live_delta(state: &Arc<ApiState>) -> PendingDelta {
    let snapshot = state.plane.latest();
    PendingDelta {
        stats: serde_json::to_value(&snapshot.stats).ok(),
        items: serde_json::to_value(&snapshot.items).ok(),
        ..PendingDelta::default()
    }
}

async fn categories_delta(state: &Arc<ApiState>) -> PendingDelta {
    let categories = state.categories.list().await;
    let warnings = state.categories.has_path_warnings().await;
    let default_paths: HashMap<&'static str, String> = state
        .managers
        .iter()
        .map(|manager| (manager.kind().as_str(), String::new()))
        .collect();
    PendingDelta {
        categories: serde_json::to_value(categories).ok(),
        client_default_paths: serde_json::to_value(default_paths).ok(),
        has_path_warnings: Some(Value::Bool(warnings)),
        ..PendingDelta::default()
    }
}

async fn full_delta(state: &Arc<ApiState>) -> PendingDelta {
    let mut delta = live_delta(state);
    delta.merge(categories_delta(state).await);
    delta
}

#[derive(Debug, serde::Deserialize)]
struct ActionFrame {
    action: String,
    #[serde(default)]
    query: String,
    #[serde(default)]
    links: Vec<String>,
    #[serde(default)]
    hashes: Vec<String>,
    #[serde(default)]
    category: String,
    #[serde(default, rename = "deleteFiles")]
    delete_files: bool,
    #[serde(default, rename = "savePath")]
    save_path: String,
    #[serde(default)]
    addr: String,
    #[serde(default, rename = "serverAction")]
    server_action: String,
}

async fn dispatch_action(state: &Arc<ApiState>, subscriber: &Arc<Subscriber>, raw: &str) {
    let parsed: ActionFrame = match serde_json::from_str(raw) {
        Ok(parsed) => parsed,
        Err(err) => {
            subscriber.push_reply(frame("error", json!({"message": err.to_string()})));
            return;
        }
    };

    match parsed.action.as_str() {
        "search" => run_search(state, subscriber, &parsed.query).await,
        "batch-download" => {
            let outcomes = run_batch(&parsed.links, |link| {
                let state = Arc::clone(state);
                let category = parsed.category.clone();
                let link = link.clone();
                async move { actions::add_url(&state, &link, &category).await.map(|_| ()) }
            })
            .await;
            for outcome in outcomes.iter().filter(|outcome| outcome.error.is_none()) {
                subscriber.push_reply(frame(
                    added_frame_kind(&outcome.input),
                    json!({"link": outcome.input}),
                ));
            }
            subscriber.push_reply(complete_frame("batch-download-complete", &outcomes));
        }
        "batch-pause" => {
            let outcomes = run_batch(&parsed.hashes, |hash| {
                let state = Arc::clone(state);
                let hash = hash.clone();
                async move { actions::pause_hash(&state, &hash).await }
            })
            .await;
            subscriber.push_reply(complete_frame("batch-pause-complete", &outcomes));
        }
        "batch-resume" => {
            let outcomes = run_batch(&parsed.hashes, |hash| {
                let state = Arc::clone(state);
                let hash = hash.clone();
                async move { actions::resume_hash(&state, &hash).await }
            })
            .await;
            subscriber.push_reply(complete_frame("batch-resume-complete", &outcomes));
        }
        "batch-delete" => {
            let outcomes = run_batch(&parsed.hashes, |hash| {
                let state = Arc::clone(state);
                let hash = hash.clone();
                let delete_files = parsed.delete_files;
                async move { actions::delete_hash(&state, &hash, delete_files).await }
            })
            .await;
            subscriber.push_reply(complete_frame("batch-delete-complete", &outcomes));
        }
        "set-category" => {
            let outcomes = run_batch(&parsed.hashes, |hash| {
                let state = Arc::clone(state);
                let hash = hash.clone();
                let category = parsed.category.clone();
                async move { actions::set_category_hash(&state, &hash, &category).await }
            })
            .await;
            subscriber.push_reply(complete_frame("batch-category-changed-complete", &outcomes));
        }
        "set-label" => {
            let outcomes = run_batch(&parsed.hashes, |hash| {
                let state = Arc::clone(state);
                let hash = hash.clone();
                let label = parsed.category.clone();
                async move {
                    state
                        .engine(ClientKind::Rtorrent)?
                        .set_category(&hash, &label)
                        .await
                }
            })
            .await;
            subscriber.push_reply(complete_frame("batch-label-changed-complete", &outcomes));
        }
        "create-category" => {
            let result = state
                .categories
                .create(peermux_core::Category {
                    name: parsed.category.clone(),
                    title: parsed.category.clone(),
                    path: parsed.save_path.clone(),
                    path_mappings: peermux_core::PathMappings::default(),
                    color: 0,
                    priority: peermux_core::CategoryPriority::Normal,
                    comment: String::new(),
                })
                .await;
            push_category_result(state, subscriber, result).await;
        }
        "update-category" => {
            let result = state
                .categories
                .update(
                    &parsed.category,
                    peermux_bridge::CategoryPatch {
                        path: (!parsed.save_path.is_empty()).then(|| parsed.save_path.clone()),
                        ..peermux_bridge::CategoryPatch::default()
                    },
                )
                .await
                .map(|_| ());
            push_category_result(state, subscriber, result).await;
        }
        "delete-category" => {
            let result = state.categories.delete(&parsed.category).await;
            push_category_result(state, subscriber, result).await;
        }
        "get-peers" => {
            let outcome = match first_hash(&parsed.hashes) {
                Some(hash) => match peer_owner(state, hash) {
                    Ok(engine) => engine.peers(hash).await,
                    Err(err) => Err(err),
                },
                None => Err(BridgeError::bad_request("get-peers requires a hash")),
            };
            match outcome {
                Ok(peers) => {
                    let enriched = state.resolver.enrich_peers(peers);
                    subscriber.push_reply(frame(
                        "server-info-update",
                        json!({
                            "hash": first_hash(&parsed.hashes),
                            "peers": enriched,
                        }),
                    ));
                }
                Err(err) => push_error(subscriber, &err),
            }
        }
        "get-servers" => {
            match state.engine(ClientKind::Amule) {
                Ok(engine) => match engine.list_servers().await {
                    Ok(servers) => subscriber.push_reply(frame(
                        "servers-update",
                        serde_json::to_value(servers).unwrap_or(Value::Null),
                    )),
                    Err(err) => push_error(subscriber, &err),
                },
                Err(err) => push_error(subscriber, &err),
            }
        }
        "server-action" => {
            let outcome = match state.engine(ClientKind::Amule) {
                Ok(engine) => engine
                    .server_action(&parsed.addr, &parsed.server_action)
                    .await,
                Err(err) => Err(err),
            };
            subscriber.push_reply(frame(
                "server-action",
                json!({
                    "addr": parsed.addr,
                    "action": parsed.server_action,
                    "ok": outcome.is_ok(),
                    "error": outcome.err().map(|err| err.to_string()),
                }),
            ));
        }
        other => {
            subscriber.push_reply(frame(
                "error",
                json!({"message": format!("unknown action '{other}'")}),
            ));
        }
    }
}

async fn run_search(state: &Arc<ApiState>, subscriber: &Arc<Subscriber>, query: &str) {
    subscriber.push_reply(frame("search-lock", json!({"locked": true})));

    let mut results = Vec::new();
    match state.engine(ClientKind::Amule) {
        Ok(engine) => match engine.search(query).await {
            Ok(raw) => results.extend(torznab::widen_results(state, raw)),
            Err(err) => warn!(error = %err, "ed2k search failed"),
        },
        Err(err) => debug!(error = %err, "ed2k search skipped"),
    }
    if state.config.config().prowlarr.enabled {
        match torznab::prowlarr_search(state, query).await {
            Ok(extra) => results.extend(extra),
            Err(err) => warn!(error = %err, "prowlarr search failed"),
        }
    }

    state.store_search_results(results.clone());
    subscriber.push_reply(frame(
        "search-results",
        serde_json::to_value(&results).unwrap_or(Value::Null),
    ));
    subscriber.push_reply(frame("search-lock", json!({"locked": false})));
}

/// Which `*-added` frame an admitted link maps to.
fn added_frame_kind(link: &str) -> &'static str {
    if link.starts_with("ed2k://") {
        "ed2k-added"
    } else if link.starts_with("magnet:") {
        "magnet-added"
    } else {
        "torrent-added"
    }
}

async fn run_batch<F, Fut>(inputs: &[String], op: F) -> Vec<ItemOutcome>
where
    F: Fn(&String) -> Fut,
    Fut: Future<Output = peermux_core::BridgeResult<()>>,
{
    let mut outcomes = Vec::with_capacity(inputs.len());
    for input in inputs {
        match op(input).await {
            Ok(()) => outcomes.push(ItemOutcome::ok(input.clone())),
            Err(err) => outcomes.push(ItemOutcome::failed(input.clone(), &err)),
        }
    }
    outcomes
}

fn complete_frame(kind: &str, outcomes: &[ItemOutcome]) -> String {
    let successes: Vec<&ItemOutcome> = outcomes.iter().filter(|o| o.error.is_none()).collect();
    let failures: Vec<&ItemOutcome> = outcomes.iter().filter(|o| o.error.is_some()).collect();
    frame(
        kind,
        json!({
            "successes": successes,
            "failures": failures,
        }),
    )
}

async fn push_category_result(
    state: &Arc<ApiState>,
    subscriber: &Arc<Subscriber>,
    result: peermux_core::BridgeResult<()>,
) {
    match result {
        Ok(()) => {
            let categories = state.categories.list().await;
            state.broadcaster.broadcast_reply(&frame(
                "categories-update",
                serde_json::to_value(categories).unwrap_or(Value::Null),
            ));
        }
        Err(err) => push_error(subscriber, &err),
    }
}

fn first_hash(hashes: &[String]) -> Option<&str> {
    hashes.first().map(String::as_str)
}

/// Which engine owns a facade hash for peer queries.
fn peer_owner(
    state: &Arc<ApiState>,
    hash: &str,
) -> peermux_core::BridgeResult<Arc<dyn peermux_core::EngineClient>> {
    if state.hash_store.ed2k_for(hash).is_some() {
        state.engine(ClientKind::Amule)
    } else {
        state.engine(ClientKind::Rtorrent)
    }
}

fn push_error(subscriber: &Arc<Subscriber>, err: &BridgeError) {
    subscriber.push_reply(frame("error", json!({"message": err.to_string()})));
}

fn lock_or_recover<'a, T>(lock: &'a Mutex<T>, what: &str) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(lock = %what, "lock poisoned; continuing with recovered guard");
            poisoned.into_inner()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deltas_coalesce_with_later_values_winning() {
        let subscriber = Subscriber::new();
        for round in 0..5 {
            subscriber.push_delta(PendingDelta {
                stats: Some(json!({"round": round})),
                ..PendingDelta::default()
            });
        }

        let (batch, replies) = subscriber.drain();
        let batch = batch.expect("one coalesced frame");
        let parsed: Value = serde_json::from_str(&batch).expect("frame json");
        assert_eq!(parsed["type"], "batch-update");
        assert_eq!(parsed["data"]["stats"]["round"], 4);
        assert!(replies.is_empty());

        // Nothing remains after the drain.
        let (empty, _) = subscriber.drain();
        assert!(empty.is_none());
    }

    #[test]
    fn distinct_data_types_share_one_frame() {
        let subscriber = Subscriber::new();
        subscriber.push_delta(PendingDelta {
            stats: Some(json!({"speed": 1})),
            ..PendingDelta::default()
        });
        subscriber.push_delta(PendingDelta {
            categories: Some(json!([])),
            has_path_warnings: Some(Value::Bool(true)),
            ..PendingDelta::default()
        });

        let (batch, _) = subscriber.drain();
        let parsed: Value = serde_json::from_str(&batch.expect("frame")).expect("json");
        assert_eq!(parsed["data"]["stats"]["speed"], 1);
        assert_eq!(parsed["data"]["hasPathWarnings"], true);
        assert!(parsed["data"]["categories"].is_array());
    }

    #[test]
    fn reply_queue_drops_oldest_past_high_water() {
        let subscriber = Subscriber::new();
        for index in 0..(HIGH_WATER + 8) {
            subscriber.push_reply(format!("reply-{index}"));
        }
        let (_, replies) = subscriber.drain();
        assert_eq!(replies.len(), HIGH_WATER);
        assert_eq!(replies.first().map(String::as_str), Some("reply-8"));
        assert_eq!(
            replies.last().map(String::as_str),
            Some(format!("reply-{}", HIGH_WATER + 7).as_str())
        );
    }

    #[test]
    fn added_frames_follow_the_link_scheme() {
        assert_eq!(added_frame_kind("ed2k://|file|x|1|ABCD|/"), "ed2k-added");
        assert_eq!(added_frame_kind("magnet:?xt=urn:btih:aa"), "magnet-added");
        assert_eq!(added_frame_kind("https://example.com/a.torrent"), "torrent-added");
    }

    #[test]
    fn broadcaster_tracks_subscriber_lifecycle() {
        let broadcaster = Broadcaster::new();
        let (first, _sub1) = broadcaster.subscribe();
        let (second, sub2) = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 2);

        broadcaster.broadcast_delta(&PendingDelta {
            stats: Some(json!({"speed": 9})),
            ..PendingDelta::default()
        });
        let (batch, _) = sub2.drain();
        assert!(batch.is_some());

        broadcaster.unsubscribe(first);
        broadcaster.unsubscribe(second);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[test]
    fn complete_frames_split_successes_and_failures() {
        let outcomes = vec![
            ItemOutcome::ok("aa".to_string()),
            ItemOutcome::failed(
                "bb".to_string(),
                &BridgeError::NotFound {
                    hash: "bb".to_string(),
                },
            ),
        ];
        let rendered = complete_frame("batch-delete-complete", &outcomes);
        let parsed: Value = serde_json::from_str(&rendered).expect("json");
        assert_eq!(parsed["type"], "batch-delete-complete");
        assert_eq!(parsed["data"]["successes"][0]["input"], "aa");
        assert_eq!(parsed["data"]["failures"][0]["input"], "bb");
        assert!(
            parsed["data"]["failures"][0]["error"]
                .as_str()
                .expect("error text")
                .contains("not found")
        );
    }
}
