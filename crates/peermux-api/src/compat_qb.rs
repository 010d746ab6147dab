//! qBittorrent compatibility facade (`/api/v2`).
//!
//! The facade maps the unified plane onto the subset of qBittorrent
//! WebUI v2 endpoints the *arr tools drive. Response bodies follow
//! qBittorrent exactly (`Ok.`, `Fails.`, and its JSON shapes); the
//! advertised versions are protocol compatibility lies upstream tools
//! gate features on.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Multipart, Query, State},
    http::{
        HeaderMap, HeaderValue,
        header::{CONTENT_TYPE, SET_COOKIE},
    },
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use peermux_core::{Category, CategoryPriority, Item, ItemStatus, PathMappings};

use crate::actions;
use crate::errors::ApiError;
use crate::state::ApiState;

/// Application version advertised to upstream tools.
pub const APP_VERSION: &str = "v5.1.4";
/// WebAPI version advertised to upstream tools.
pub const WEBAPI_VERSION: &str = "2.11.4";
/// qBittorrent's "no eta" sentinel.
const ETA_INFINITE: i64 = 8_640_000;

/// Attach the facade to the primary router.
pub fn mount(router: Router<Arc<ApiState>>) -> Router<Arc<ApiState>> {
    router
        .route("/api/v2/auth/login", post(login))
        .route("/api/v2/auth/logout", post(logout))
        .route("/api/v2/app/version", get(app_version))
        .route("/api/v2/app/webapiVersion", get(webapi_version))
        .route("/api/v2/app/preferences", get(app_preferences))
        .route("/api/v2/torrents/info", get(torrents_info))
        .route("/api/v2/torrents/add", post(torrents_add))
        .route("/api/v2/torrents/delete", post(torrents_delete))
        .route("/api/v2/torrents/pause", post(torrents_pause))
        .route("/api/v2/torrents/resume", post(torrents_resume))
        .route("/api/v2/torrents/categories", get(torrents_categories))
        .route("/api/v2/torrents/createCategory", post(create_category))
}

/// One category as the facade serialises it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QbCategory {
    /// Category name.
    pub name: String,
    /// Save path advertised for the category.
    #[serde(rename = "savePath")]
    pub save_path: String,
}

/// One torrent entry in the `torrents/info` shape.
#[derive(Debug, Clone, Serialize)]
pub struct QbTorrentEntry {
    /// Unix timestamp of admission.
    pub added_on: i64,
    /// Unix timestamp of completion, `-1` when incomplete.
    pub completion_on: i64,
    /// Category name.
    pub category: String,
    /// Download rate in bytes per second.
    pub dlspeed: i64,
    /// Upload rate in bytes per second.
    pub upspeed: i64,
    /// Bytes downloaded.
    pub downloaded: i64,
    /// Bytes uploaded.
    pub uploaded: i64,
    /// Total size in bytes.
    pub size: i64,
    /// Completion fraction in `0..=1`.
    pub progress: f64,
    /// qBittorrent state word.
    pub state: String,
    /// Display name.
    pub name: String,
    /// 40-hex hash.
    pub hash: String,
    /// Save path of the category.
    pub save_path: String,
    /// Seconds to completion, `8640000` when unknown.
    pub eta: i64,
    /// Share ratio.
    pub ratio: f64,
    /// Tracker domain.
    pub tracker: String,
    /// Tag list; always empty here.
    pub tags: String,
}

#[derive(Debug, Default, Deserialize)]
struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

async fn login(
    State(state): State<Arc<ApiState>>,
    axum::extract::Form(form): axum::extract::Form<LoginForm>,
) -> Response {
    let auth = &state.config.config().auth;
    if auth.enabled {
        let known_user = auth.username.is_empty() || auth.username == form.username;
        if !known_user || !state.config.verify_password(&form.password) {
            info!(username = %form.username, "qbittorrent login rejected");
            return plain("Fails.");
        }
    }
    let sid = state.issue_session();
    let mut response = plain("Ok.");
    if let Ok(cookie) = HeaderValue::from_str(&format!("SID={sid}; HttpOnly; Path=/")) {
        response.headers_mut().insert(SET_COOKIE, cookie);
    }
    response
}

async fn logout(State(state): State<Arc<ApiState>>, headers: HeaderMap) -> Response {
    if let Some(sid) = session_from(&headers) {
        state.revoke_session(&sid);
    }
    let mut response = plain("Ok.");
    response.headers_mut().insert(
        SET_COOKIE,
        HeaderValue::from_static("SID=; HttpOnly; Path=/; Max-Age=0"),
    );
    response
}

async fn app_version() -> Response {
    plain(APP_VERSION)
}

async fn webapi_version() -> Response {
    plain(WEBAPI_VERSION)
}

async fn app_preferences(State(state): State<Arc<ApiState>>) -> Json<serde_json::Value> {
    Json(crate::preferences::preferences_json(state.config.config()))
}

#[derive(Debug, Default, Deserialize)]
struct InfoParams {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    hashes: Option<String>,
}

async fn torrents_info(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<InfoParams>,
) -> Json<Vec<QbTorrentEntry>> {
    // Category-dependent view: honour the first-init barrier so early
    // requests see a warmed (or deadline-released) cache.
    let categories = state.cache.get().await;
    let snapshot = state.plane.latest();

    let hash_filter = params
        .hashes
        .as_deref()
        .filter(|value| !value.is_empty())
        .map(split_hashes);

    let mut entries = Vec::new();
    for item in &snapshot.items {
        if let Some(category) = params.category.as_deref()
            && item.category != category
        {
            continue;
        }
        if let Some(filter) = &hash_filter {
            let include_all = filter.iter().any(|hash| hash.eq_ignore_ascii_case("all"));
            if !include_all && !filter.iter().any(|hash| hash.eq_ignore_ascii_case(&item.hash)) {
                continue;
            }
        }
        let save_path = categories
            .get(&item.category)
            .map(|category| category.save_path.clone())
            .unwrap_or_default();
        entries.push(qb_entry(item, save_path));
    }
    Json(entries)
}

async fn torrents_add(
    State(state): State<Arc<ApiState>>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut urls = Vec::new();
    let mut torrents: Vec<Vec<u8>> = Vec::new();
    let mut category = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request(format!("multipart decode failed: {err}")))?
    {
        match field.name().unwrap_or_default() {
            "urls" => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| ApiError::bad_request(err.to_string()))?;
                urls.extend(
                    text.lines()
                        .map(str::trim)
                        .filter(|line| !line.is_empty())
                        .map(str::to_string),
                );
            }
            "torrents" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| ApiError::bad_request(err.to_string()))?;
                torrents.push(bytes.to_vec());
            }
            "category" => {
                category = field
                    .text()
                    .await
                    .map_err(|err| ApiError::bad_request(err.to_string()))?;
            }
            // savepath and the rest of qBittorrent's add options are
            // accepted and ignored.
            _ => {
                let _ = field.bytes().await;
            }
        }
    }

    let all_ok = add_batch(&state, urls, torrents, &category).await;
    state.cache.sync().await;
    Ok(plain(if all_ok { "Ok." } else { "Fail." }))
}

/// Run one add batch; `true` when every element succeeded.
async fn add_batch(
    state: &Arc<ApiState>,
    urls: Vec<String>,
    torrents: Vec<Vec<u8>>,
    category: &str,
) -> bool {
    let mut all_ok = !(urls.is_empty() && torrents.is_empty());
    for url in urls {
        if let Err(err) = actions::add_url(state, &url, category).await {
            warn!(url = %url, error = %err, "add url failed");
            all_ok = false;
        }
    }
    for bytes in torrents {
        if let Err(err) = actions::add_torrent_bytes(state, bytes, category).await {
            warn!(error = %err, "add torrent payload failed");
            all_ok = false;
        }
    }
    all_ok
}

#[derive(Debug, Deserialize)]
struct DeleteForm {
    hashes: String,
    #[serde(default, rename = "deleteFiles")]
    delete_files: bool,
}

async fn torrents_delete(
    State(state): State<Arc<ApiState>>,
    axum::extract::Form(form): axum::extract::Form<DeleteForm>,
) -> Response {
    let mut all_ok = true;
    for hash in split_hashes(&form.hashes) {
        if let Err(err) = actions::delete_hash(&state, &hash, form.delete_files).await {
            warn!(hash = %hash, error = %err, "delete failed");
            all_ok = false;
        }
    }
    plain(if all_ok { "Ok." } else { "Fail." })
}

#[derive(Debug, Deserialize)]
struct HashesForm {
    hashes: String,
}

async fn torrents_pause(
    State(state): State<Arc<ApiState>>,
    axum::extract::Form(form): axum::extract::Form<HashesForm>,
) -> Response {
    batch_transfer_op(&state, &form.hashes, TransferOp::Pause).await
}

async fn torrents_resume(
    State(state): State<Arc<ApiState>>,
    axum::extract::Form(form): axum::extract::Form<HashesForm>,
) -> Response {
    batch_transfer_op(&state, &form.hashes, TransferOp::Resume).await
}

#[derive(Clone, Copy)]
enum TransferOp {
    Pause,
    Resume,
}

async fn batch_transfer_op(state: &Arc<ApiState>, hashes: &str, op: TransferOp) -> Response {
    let targets: Vec<String> = if hashes.eq_ignore_ascii_case("all") {
        state
            .plane
            .latest()
            .items
            .iter()
            .map(|item| item.hash.clone())
            .collect()
    } else {
        split_hashes(hashes)
    };

    let mut all_ok = true;
    for hash in targets {
        let outcome = match op {
            TransferOp::Pause => actions::pause_hash(state, &hash).await,
            TransferOp::Resume => actions::resume_hash(state, &hash).await,
        };
        if let Err(err) = outcome {
            warn!(hash = %hash, error = %err, "transfer op failed");
            all_ok = false;
        }
    }
    plain(if all_ok { "Ok." } else { "Fail." })
}

async fn torrents_categories(
    State(state): State<Arc<ApiState>>,
) -> Json<HashMap<String, QbCategory>> {
    Json(state.cache.get().await)
}

#[derive(Debug, Deserialize)]
struct CreateCategoryForm {
    category: String,
    #[serde(default, rename = "savePath")]
    save_path: String,
}

async fn create_category(
    State(state): State<Arc<ApiState>>,
    axum::extract::Form(form): axum::extract::Form<CreateCategoryForm>,
) -> Result<Response, ApiError> {
    state
        .categories
        .create(Category {
            name: form.category.clone(),
            title: form.category,
            path: form.save_path,
            path_mappings: PathMappings::default(),
            color: 0,
            priority: CategoryPriority::Normal,
            comment: String::new(),
        })
        .await?;
    state.cache.sync().await;
    Ok(plain("Ok."))
}

/// Project one unified item into the qBittorrent entry shape.
fn qb_entry(item: &Item, save_path: String) -> QbTorrentEntry {
    QbTorrentEntry {
        added_on: item.added_at.timestamp(),
        completion_on: item.completed_at.map_or(-1, |at| at.timestamp()),
        category: item.category.clone(),
        dlspeed: to_i64(item.download_speed),
        upspeed: to_i64(item.upload_speed),
        downloaded: to_i64(item.size_downloaded),
        uploaded: to_i64(item.upload_total),
        size: to_i64(item.size),
        progress: f64::from(item.progress) / 100.0,
        state: qb_state(item.status).to_string(),
        name: item.name.clone(),
        hash: item.hash.clone(),
        save_path,
        eta: item.eta_seconds.map_or(ETA_INFINITE, to_i64),
        ratio: ratio(item.upload_total, item.size_downloaded),
        tracker: item.tracker.clone(),
        tags: String::new(),
    }
}

/// Map the unified status onto qBittorrent's state vocabulary.
const fn qb_state(status: ItemStatus) -> &'static str {
    match status {
        ItemStatus::Downloading => "downloading",
        ItemStatus::Paused => "pausedDL",
        ItemStatus::Seeding => "uploading",
        ItemStatus::Completed => "pausedUP",
        ItemStatus::Queued => "queuedDL",
        ItemStatus::Checking => "checkingDL",
        ItemStatus::Error => "error",
        ItemStatus::Other => "unknown",
    }
}

fn split_hashes(raw: &str) -> Vec<String> {
    raw.split('|')
        .map(str::trim)
        .filter(|hash| !hash.is_empty())
        .map(str::to_string)
        .collect()
}

fn plain(body: &'static str) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    (headers, body).into_response()
}

fn session_from(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == "SID").then(|| value.to_string())
    })
}

fn ratio(uploaded: u64, downloaded: u64) -> f64 {
    if downloaded == 0 {
        0.0
    } else {
        to_f64(uploaded) / to_f64(downloaded)
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

const fn to_f64(value: u64) -> f64 {
    #[expect(
        clippy::cast_precision_loss,
        reason = "u64 to f64 conversion is required for user-facing ratio reporting"
    )]
    {
        value as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_vocabulary_matches_qbittorrent() {
        assert_eq!(qb_state(ItemStatus::Downloading), "downloading");
        assert_eq!(qb_state(ItemStatus::Seeding), "uploading");
        assert_eq!(qb_state(ItemStatus::Paused), "pausedDL");
        assert_eq!(qb_state(ItemStatus::Other), "unknown");
    }

    #[test]
    fn hash_splitting_trims_and_drops_empties() {
        assert_eq!(
            split_hashes("aa|bb| cc ||"),
            vec!["aa".to_string(), "bb".to_string(), "cc".to_string()]
        );
        assert!(split_hashes("").is_empty());
    }

    #[test]
    fn entry_projection_scales_progress_and_eta() {
        let mut item = Item {
            hash: "a".repeat(40),
            client: peermux_core::ClientKind::Rtorrent,
            name: "demo.mkv".into(),
            size: 1_000,
            size_downloaded: 250,
            progress: 0,
            download_speed: 50,
            upload_speed: 0,
            upload_session: 0,
            upload_total: 500,
            eta_seconds: None,
            status: ItemStatus::Downloading,
            message: None,
            category: "Movies".into(),
            tracker: "tracker.example".into(),
            added_at: chrono::Utc::now(),
            completed_at: None,
            part_status: None,
            gap_status: None,
            req_status: None,
        };
        item.normalize();
        let entry = qb_entry(&item, "/mnt/m".to_string());
        assert!((entry.progress - 0.25).abs() < f64::EPSILON);
        assert_eq!(entry.eta, 15);
        assert_eq!(entry.completion_on, -1);
        assert!((entry.ratio - 2.0).abs() < f64::EPSILON);
        assert_eq!(entry.save_path, "/mnt/m");

        item.download_speed = 0;
        item.eta_seconds = None;
        let stalled = qb_entry(&item, String::new());
        assert_eq!(stalled.eta, ETA_INFINITE);
    }

    #[test]
    fn version_lies_are_pinned() {
        assert_eq!(APP_VERSION, "v5.1.4");
        assert_eq!(WEBAPI_VERSION, "2.11.4");
    }

    #[test]
    fn session_cookie_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("theme=dark; SID=abc123; lang=en"),
        );
        assert_eq!(session_from(&headers).as_deref(), Some("abc123"));
        assert!(session_from(&HeaderMap::new()).is_none());
    }
}
