//! Add/delete/pause/resume/categorise dispatch shared by the qBittorrent
//! facade and the WebSocket actions.
//!
//! Ownership resolution: a 40-hex hash with a reverse hash-store entry
//! belongs to the ED2K engine (translated to its native 32-hex form);
//! anything else is addressed to the BitTorrent engine verbatim.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use peermux_core::{
    AddRequest, BridgeError, BridgeResult, ClientKind, Ed2kLink, MagnetLink, convert_magnet_to_ed2k,
};
use peermux_events::Event;
use peermux_store::{HashMeta, synthesize_magnet_hash};

use crate::state::ApiState;

/// Outcome of one element of a batch operation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ItemOutcome {
    /// The URL or hash the element referred to.
    pub input: String,
    /// `None` on success, the failure text otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ItemOutcome {
    /// Successful element.
    #[must_use]
    pub const fn ok(input: String) -> Self {
        Self { input, error: None }
    }

    /// Failed element.
    #[must_use]
    pub fn failed(input: String, err: &BridgeError) -> Self {
        Self {
            input,
            error: Some(err.to_string()),
        }
    }
}

/// Admit one URL: `magnet:`, `ed2k://`, or an HTTP(S) `.torrent` link.
///
/// # Errors
///
/// Returns the per-item failure; batch callers fold these into their
/// success/error lists.
pub async fn add_url(state: &Arc<ApiState>, url: &str, category: &str) -> BridgeResult<String> {
    let hash = if url.starts_with("magnet:") {
        add_magnet(state, url, category).await?
    } else if url.starts_with("ed2k://") {
        add_ed2k(state, url, category).await?
    } else if url.starts_with("http://") || url.starts_with("https://") {
        let bytes = fetch_torrent(state, url).await?;
        add_torrent_bytes(state, bytes, category).await?
    } else {
        return Err(BridgeError::bad_request(format!(
            "unsupported url scheme in '{url}'"
        )));
    };
    state.plane.poke();
    Ok(hash)
}

/// Admit raw `.torrent` bytes through the BitTorrent engine.
///
/// # Errors
///
/// Returns the engine failure or `NotConnected`.
pub async fn add_torrent_bytes(
    state: &Arc<ApiState>,
    bytes: Vec<u8>,
    category: &str,
) -> BridgeResult<String> {
    let engine = state.engine(ClientKind::Rtorrent)?;
    let label = state
        .categories
        .token_for(ClientKind::Rtorrent, category)
        .await
        .unwrap_or_default();
    let hash = engine.add(AddRequest::TorrentFile { bytes, label }).await?;
    publish_added(state, &hash, "", ClientKind::Rtorrent);
    Ok(hash)
}

/// Magnet admission: converted for the ED2K engine when it is configured,
/// passed through to the BitTorrent engine otherwise.
async fn add_magnet(state: &Arc<ApiState>, uri: &str, category: &str) -> BridgeResult<String> {
    let magnet = MagnetLink::parse(uri)?;

    if let Some(manager) = state.manager_for(ClientKind::Amule)
        && manager.enabled()
    {
        let engine = manager.engine()?;
        let ed2k = convert_magnet_to_ed2k(&magnet)?;
        let meta = HashMeta {
            file_name: ed2k.name.clone(),
            category: category.to_string(),
            added_at: Utc::now(),
        };
        state
            .hash_store
            .set_mapping(&ed2k.hash, &magnet.info_hash, meta)?;
        let category_id = amule_category_id(state, category).await;
        let link = ed2k.to_link();
        engine
            .add(AddRequest::Ed2kLink { link, category_id })
            .await?;
        info!(hash = %magnet.info_hash, category = %category, "magnet admitted via ed2k conversion");
        publish_added(state, &magnet.info_hash, &ed2k.name, ClientKind::Amule);
        return Ok(magnet.info_hash);
    }

    let engine = state.engine(ClientKind::Rtorrent)?;
    let label = state
        .categories
        .token_for(ClientKind::Rtorrent, category)
        .await
        .unwrap_or_default();
    let hash = engine
        .add(AddRequest::Magnet {
            uri: uri.to_string(),
            label,
        })
        .await?;
    let name = magnet.display_name.unwrap_or_default();
    publish_added(state, &hash, &name, ClientKind::Rtorrent);
    Ok(hash)
}

/// Direct ed2k link admission.
async fn add_ed2k(state: &Arc<ApiState>, link: &str, category: &str) -> BridgeResult<String> {
    let parsed = Ed2kLink::parse(link)?;
    let engine = state.engine(ClientKind::Amule)?;

    let magnet_hash = state
        .hash_store
        .magnet_for(&parsed.hash)
        .unwrap_or_else(|| synthesize_magnet_hash(&parsed.hash, parsed.name.len()));
    state.hash_store.set_mapping(
        &parsed.hash,
        &magnet_hash,
        HashMeta {
            file_name: parsed.name.clone(),
            category: category.to_string(),
            added_at: Utc::now(),
        },
    )?;

    let category_id = amule_category_id(state, category).await;
    engine
        .add(AddRequest::Ed2kLink {
            link: link.to_string(),
            category_id,
        })
        .await?;
    publish_added(state, &magnet_hash, &parsed.name, ClientKind::Amule);
    Ok(magnet_hash)
}

/// Remove one record by facade hash.
///
/// # Errors
///
/// Returns the engine failure; the hash-store mapping survives a failed
/// removal so the item stays addressable.
pub async fn delete_hash(
    state: &Arc<ApiState>,
    hash: &str,
    delete_files: bool,
) -> BridgeResult<()> {
    let name = display_name(state, hash);
    let category = state
        .plane
        .latest()
        .items
        .iter()
        .find(|item| item.hash == hash)
        .map(|item| item.category.clone());

    if let Some(ed2k) = state.hash_store.ed2k_for(hash) {
        let engine = state.engine(ClientKind::Amule)?;
        engine.remove(&ed2k, delete_files).await?;
        if let Err(err) = state.hash_store.remove_mapping(&ed2k) {
            warn!(hash = %hash, error = %err, "mapping removal failed after delete");
        }
    } else {
        let engine = state.engine(ClientKind::Rtorrent)?;
        engine.remove(hash, delete_files).await?;
    }

    if delete_files {
        if let Some(category) = category {
            remove_payload(state, &category, &name).await;
        }
        state.events.publish(Event::FileDeleted {
            hash: hash.to_string(),
            name,
        });
    }
    let _ = state.history.delete(hash);
    state.plane.poke();
    Ok(())
}

/// Best-effort payload cleanup through the bridge's own filesystem view
/// (the qBittorrent path mapping, falling back to the canonical path).
/// The engines already delete from their side; this covers mounts only
/// the bridge can reach.
async fn remove_payload(state: &Arc<ApiState>, category: &str, name: &str) {
    let Some(definition) = state.categories.get(category).await else {
        return;
    };
    let base = definition
        .path_mappings
        .qbittorrent
        .as_deref()
        .unwrap_or(definition.path.as_str());
    if base.is_empty() || name.is_empty() {
        return;
    }
    let target = std::path::Path::new(base).join(name);
    match tokio::fs::remove_file(&target).await {
        Ok(()) => info!(path = %target.display(), "payload removed"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %target.display(), error = %err, "payload removal failed"),
    }
}

/// Pause one record by facade hash.
///
/// # Errors
///
/// Returns the engine failure or `NotConnected`.
pub async fn pause_hash(state: &Arc<ApiState>, hash: &str) -> BridgeResult<()> {
    if let Some(ed2k) = state.hash_store.ed2k_for(hash) {
        state.engine(ClientKind::Amule)?.pause(&ed2k).await?;
    } else {
        state.engine(ClientKind::Rtorrent)?.pause(hash).await?;
    }
    state.plane.poke();
    Ok(())
}

/// Resume one record by facade hash.
///
/// # Errors
///
/// Returns the engine failure or `NotConnected`.
pub async fn resume_hash(state: &Arc<ApiState>, hash: &str) -> BridgeResult<()> {
    if let Some(ed2k) = state.hash_store.ed2k_for(hash) {
        state.engine(ClientKind::Amule)?.resume(&ed2k).await?;
    } else {
        state.engine(ClientKind::Rtorrent)?.resume(hash).await?;
    }
    state.plane.poke();
    Ok(())
}

/// Re-categorise one record by facade hash.
///
/// # Errors
///
/// Returns `NotFound` for unknown categories and the engine failure
/// otherwise.
pub async fn set_category_hash(
    state: &Arc<ApiState>,
    hash: &str,
    category: &str,
) -> BridgeResult<()> {
    let target = state
        .categories
        .get(category)
        .await
        .ok_or_else(|| BridgeError::NotFound {
            hash: category.to_string(),
        })?;

    let owner = if state.hash_store.ed2k_for(hash).is_some() {
        ClientKind::Amule
    } else {
        ClientKind::Rtorrent
    };
    let token = state
        .categories
        .token_for(owner, category)
        .await
        .ok_or_else(|| {
            BridgeError::bad_request(format!("category '{category}' has no {owner} mirror"))
        })?;

    match owner {
        ClientKind::Amule => {
            let ed2k = state
                .hash_store
                .ed2k_for(hash)
                .ok_or_else(|| BridgeError::NotFound {
                    hash: hash.to_string(),
                })?;
            state
                .engine(ClientKind::Amule)?
                .set_category(&ed2k, &token)
                .await?;
        }
        ClientKind::Rtorrent => {
            state
                .engine(ClientKind::Rtorrent)?
                .set_category(hash, &token)
                .await?;
        }
    }

    state.events.publish(Event::CategoryChanged {
        hash: hash.to_string(),
        category: category.to_string(),
    });
    let destination = target.effective_path(owner);
    if !destination.is_empty() {
        state.events.publish(Event::FileMoved {
            hash: hash.to_string(),
            path: destination.to_string(),
        });
    }
    state.plane.poke();
    Ok(())
}

async fn fetch_torrent(state: &Arc<ApiState>, url: &str) -> BridgeResult<Vec<u8>> {
    let response = state
        .http
        .get(url)
        .timeout(std::time::Duration::from_secs(30))
        .send()
        .await
        .map_err(BridgeError::transport)?;
    if !response.status().is_success() {
        return Err(BridgeError::bad_request(format!(
            "torrent fetch returned {}",
            response.status()
        )));
    }
    response
        .bytes()
        .await
        .map(|bytes| bytes.to_vec())
        .map_err(BridgeError::transport)
}

async fn amule_category_id(state: &Arc<ApiState>, category: &str) -> u32 {
    state
        .categories
        .token_for(ClientKind::Amule, category)
        .await
        .and_then(|token| token.parse().ok())
        .unwrap_or(0)
}

fn display_name(state: &Arc<ApiState>, hash: &str) -> String {
    if let Some(item) = state
        .plane
        .latest()
        .items
        .iter()
        .find(|item| item.hash == hash)
    {
        return item.name.clone();
    }
    state
        .hash_store
        .ed2k_for(hash)
        .and_then(|ed2k| state.hash_store.meta_for(&ed2k))
        .map(|meta| meta.file_name)
        .unwrap_or_default()
}

fn publish_added(state: &Arc<ApiState>, hash: &str, name: &str, client: ClientKind) {
    state.events.publish(Event::DownloadAdded {
        hash: hash.to_string(),
        name: name.to_string(),
        client: client.as_str().to_string(),
    });
}
