//! Torznab indexer facade over the ED2K search, plus the optional
//! Prowlarr passthrough.
//!
//! Each hit carries a 40-hex info-hash and a magnet link synthesised
//! from the ED2K identity, so indexer consumers can hand results
//! straight back to the qBittorrent facade.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use peermux_core::{BridgeError, BridgeResult, ClientKind, SearchResult};
use peermux_store::{HashMeta, synthesize_magnet_hash};

use crate::errors::ApiError;
use crate::state::ApiState;

/// Attach the indexer endpoint to the primary router.
pub fn mount(router: Router<Arc<ApiState>>) -> Router<Arc<ApiState>> {
    router.route("/indexer/amule", get(indexer))
}

#[derive(Debug, Default, Deserialize)]
struct IndexerParams {
    #[serde(default)]
    t: String,
    #[serde(default)]
    q: String,
    #[serde(default)]
    apikey: String,
}

#[derive(Debug, Serialize)]
#[serde(rename = "rss")]
struct Rss {
    #[serde(rename = "@version")]
    version: &'static str,
    #[serde(rename = "@xmlns:torznab")]
    xmlns_torznab: &'static str,
    channel: Channel,
}

#[derive(Debug, Serialize)]
struct Channel {
    title: &'static str,
    description: &'static str,
    item: Vec<RssItem>,
}

#[derive(Debug, Serialize)]
struct RssItem {
    title: String,
    guid: String,
    size: u64,
    link: String,
    #[serde(rename = "torznab:attr")]
    attrs: Vec<TorznabAttr>,
}

#[derive(Debug, Serialize)]
struct TorznabAttr {
    #[serde(rename = "@name")]
    name: &'static str,
    #[serde(rename = "@value")]
    value: String,
}

async fn indexer(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<IndexerParams>,
) -> Result<Response, ApiError> {
    let auth = &state.config.config().auth;
    if auth.enabled && !state.config.verify_password(&params.apikey) {
        return Err(ApiError::unauthorized("bad api key"));
    }

    match params.t.as_str() {
        "caps" => Ok(xml_response(caps_document())),
        "search" | "tvsearch" | "movie" | "music" | "book" => {
            let results = ed2k_search(&state, &params.q).await?;
            let document = render_results(&results)
                .map_err(|err| ApiError::internal(format!("rss encoding failed: {err}")))?;
            Ok(xml_response(document))
        }
        other => Err(ApiError::bad_request(format!(
            "unsupported torznab function '{other}'"
        ))),
    }
}

/// Run the ED2K search and widen every hit to the 40-hex facade form.
async fn ed2k_search(state: &Arc<ApiState>, query: &str) -> BridgeResult<Vec<SearchResult>> {
    let engine = state.engine(ClientKind::Amule)?;
    let raw = engine.search(query).await?;
    Ok(widen_results(state, raw))
}

/// Replace native ED2K hashes with facade hashes, persisting mappings so
/// later adds and deletes resolve the same identity.
pub(crate) fn widen_results(
    state: &Arc<ApiState>,
    results: Vec<SearchResult>,
) -> Vec<SearchResult> {
    results
        .into_iter()
        .filter_map(|mut result| {
            if result.client != ClientKind::Amule {
                return Some(result);
            }
            let magnet = state
                .hash_store
                .magnet_for(&result.hash)
                .unwrap_or_else(|| synthesize_magnet_hash(&result.hash, result.name.len()));
            let meta = HashMeta {
                file_name: result.name.clone(),
                category: String::new(),
                added_at: Utc::now(),
            };
            if let Err(err) = state.hash_store.set_mapping(&result.hash, &magnet, meta) {
                warn!(hash = %result.hash, error = %err, "search hit widening refused");
                return None;
            }
            result.link = magnet_link(&magnet, &result.name, result.size);
            result.hash = magnet;
            Some(result)
        })
        .collect()
}

/// Synthesise the magnet link handed to indexer consumers.
#[must_use]
pub fn magnet_link(hash: &str, name: &str, size: u64) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(name.as_bytes()).collect();
    format!("magnet:?xt=urn:btih:{hash}&dn={encoded}&xl={size}")
}

fn render_results(results: &[SearchResult]) -> Result<String, quick_xml::SeError> {
    let items = results
        .iter()
        .map(|result| RssItem {
            title: result.name.clone(),
            guid: result.hash.clone(),
            size: result.size,
            link: result.link.clone(),
            attrs: vec![
                TorznabAttr {
                    name: "infohash",
                    value: result.hash.clone(),
                },
                TorznabAttr {
                    name: "magneturl",
                    value: result.link.clone(),
                },
                TorznabAttr {
                    name: "seeders",
                    value: result.complete_sources.to_string(),
                },
                TorznabAttr {
                    name: "peers",
                    value: result.sources.to_string(),
                },
            ],
        })
        .collect();

    let rss = Rss {
        version: "2.0",
        xmlns_torznab: "http://torznab.com/schemas/2015/feed",
        channel: Channel {
            title: "Peermux",
            description: "ED2K search bridged as a Torznab indexer",
            item: items,
        },
    };
    let body = quick_xml::se::to_string(&rss)?;
    Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>{body}"))
}

fn caps_document() -> String {
    concat!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>",
        "<caps>",
        "<server title=\"Peermux\"/>",
        "<limits max=\"100\" default=\"50\"/>",
        "<searching>",
        "<search available=\"yes\" supportedParams=\"q\"/>",
        "<tv-search available=\"yes\" supportedParams=\"q\"/>",
        "<movie-search available=\"yes\" supportedParams=\"q\"/>",
        "</searching>",
        "<categories>",
        "<category id=\"8000\" name=\"Other\"/>",
        "</categories>",
        "</caps>",
    )
    .to_string()
}

fn xml_response(body: String) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/rss+xml; charset=utf-8"),
    );
    (headers, body).into_response()
}

/// Prowlarr passthrough: one REST search translated into the unified
/// search-result shape.
///
/// # Errors
///
/// Returns `Unavailable` when the passthrough is disabled and transport
/// or decode failures otherwise.
pub async fn prowlarr_search(
    state: &Arc<ApiState>,
    query: &str,
) -> BridgeResult<Vec<SearchResult>> {
    let prowlarr = &state.config.config().prowlarr;
    if !prowlarr.enabled {
        return Err(BridgeError::Unavailable { what: "prowlarr" });
    }

    let url = format!(
        "{}/api/v1/search?query={}&apikey={}",
        prowlarr.base_url.trim_end_matches('/'),
        url::form_urlencoded::byte_serialize(query.as_bytes()).collect::<String>(),
        prowlarr.api_key
    );
    let response = state
        .http
        .get(&url)
        .timeout(std::time::Duration::from_secs(30))
        .send()
        .await
        .map_err(BridgeError::transport)?;
    if !response.status().is_success() {
        return Err(BridgeError::bad_request(format!(
            "prowlarr search returned {}",
            response.status()
        )));
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct ProwlarrHit {
        #[serde(default)]
        title: String,
        #[serde(default)]
        size: u64,
        #[serde(default)]
        info_hash: Option<String>,
        #[serde(default)]
        magnet_url: Option<String>,
        #[serde(default)]
        seeders: u32,
        #[serde(default)]
        leechers: u32,
    }

    let hits: Vec<ProwlarrHit> = response.json().await.map_err(BridgeError::transport)?;
    Ok(hits
        .into_iter()
        .filter_map(|hit| {
            let hash = hit.info_hash?.to_ascii_lowercase();
            let link = hit
                .magnet_url
                .unwrap_or_else(|| magnet_link(&hash, &hit.title, hit.size));
            Some(SearchResult {
                hash,
                name: hit.title,
                size: hit.size,
                sources: hit.seeders + hit.leechers,
                complete_sources: hit.seeders,
                link,
                client: ClientKind::Rtorrent,
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(hash: &str, name: &str) -> SearchResult {
        SearchResult {
            hash: hash.to_string(),
            name: name.to_string(),
            size: 1_048_576,
            sources: 12,
            complete_sources: 7,
            link: String::new(),
            client: ClientKind::Amule,
        }
    }

    #[test]
    fn rss_document_carries_hash_and_magnet() {
        let mut result = hit("0123456789abcdef0123456789abcdef01234567", "File.iso");
        result.link = magnet_link(&result.hash, &result.name, result.size);
        let document = render_results(std::slice::from_ref(&result)).expect("render");

        assert!(document.starts_with("<?xml version=\"1.0\""));
        assert!(document.contains("<rss"));
        assert!(document.contains("File.iso"));
        assert!(document.contains("0123456789abcdef0123456789abcdef01234567"));
        assert!(document.contains("magnet:?xt=urn:btih:"));
        assert!(document.contains("name=\"seeders\" value=\"7\""));
    }

    #[test]
    fn magnet_link_encodes_display_name() {
        let link = magnet_link("aa".repeat(20).as_str(), "two words.iso", 42);
        assert!(link.contains("dn=two+words.iso"));
        assert!(link.contains("xl=42"));
    }

    #[test]
    fn caps_document_lists_search_modes() {
        let caps = caps_document();
        assert!(caps.contains("<caps>"));
        assert!(caps.contains("tv-search"));
    }

    #[test]
    fn empty_result_set_renders_an_empty_channel() {
        let document = render_results(&[]).expect("render");
        assert!(document.contains("<rss"));
        assert!(!document.contains("<item>"));
    }
}
