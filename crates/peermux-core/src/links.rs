//! Magnet and ed2k link parsing plus the magnet→ed2k conversion used by the
//! qBittorrent add path.

use url::Url;

use crate::error::{BridgeError, BridgeResult};

/// Parsed `magnet:` URI restricted to the fields the bridge consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetLink {
    /// 40-hex lowercased BitTorrent info-hash from `xt=urn:btih:`.
    pub info_hash: String,
    /// Display name from `dn=`, if present.
    pub display_name: Option<String>,
    /// Exact length from `xl=`, if present.
    pub exact_length: Option<u64>,
    /// Tracker URLs from `tr=`.
    pub trackers: Vec<String>,
}

impl MagnetLink {
    /// Parse a magnet URI.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` when the URI is not a magnet, lacks a
    /// `urn:btih` exact topic, or carries a malformed info-hash.
    pub fn parse(uri: &str) -> BridgeResult<Self> {
        let url = Url::parse(uri)
            .map_err(|err| BridgeError::bad_request(format!("invalid magnet uri: {err}")))?;
        if url.scheme() != "magnet" {
            return Err(BridgeError::bad_request(format!(
                "expected magnet scheme, got '{}'",
                url.scheme()
            )));
        }

        let mut info_hash = None;
        let mut display_name = None;
        let mut exact_length = None;
        let mut trackers = Vec::new();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "xt" => {
                    if let Some(hash) = value.strip_prefix("urn:btih:") {
                        info_hash = Some(normalize_info_hash(hash)?);
                    }
                }
                "dn" => display_name = Some(value.into_owned()),
                "xl" => exact_length = value.parse::<u64>().ok(),
                "tr" => trackers.push(value.into_owned()),
                _ => {}
            }
        }

        let info_hash = info_hash
            .ok_or_else(|| BridgeError::bad_request("magnet uri lacks a urn:btih exact topic"))?;
        Ok(Self {
            info_hash,
            display_name,
            exact_length,
            trackers,
        })
    }
}

/// Parsed `ed2k://|file|…|/` link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ed2kLink {
    /// 32-hex uppercased ED2K hash.
    pub hash: String,
    /// File name segment.
    pub name: String,
    /// File size in bytes.
    pub size: u64,
}

impl Ed2kLink {
    /// Parse an ed2k file link of the form `ed2k://|file|name|size|hash|/`.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` on any structural or field-level mismatch.
    pub fn parse(link: &str) -> BridgeResult<Self> {
        let rest = link
            .strip_prefix("ed2k://|file|")
            .ok_or_else(|| BridgeError::bad_request("not an ed2k file link"))?;
        let mut parts = rest.split('|');
        let name = parts
            .next()
            .filter(|segment| !segment.is_empty())
            .ok_or_else(|| BridgeError::bad_request("ed2k link lacks a file name"))?;
        let size = parts
            .next()
            .and_then(|segment| segment.parse::<u64>().ok())
            .ok_or_else(|| BridgeError::bad_request("ed2k link lacks a valid size"))?;
        let hash = parts
            .next()
            .ok_or_else(|| BridgeError::bad_request("ed2k link lacks a hash"))?;
        if hash.len() != 32 || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(BridgeError::bad_request("ed2k hash must be 32 hex chars"));
        }
        Ok(Self {
            hash: hash.to_ascii_uppercase(),
            name: name.to_string(),
            size,
        })
    }

    /// Render the canonical link form.
    #[must_use]
    pub fn to_link(&self) -> String {
        format!("ed2k://|file|{}|{}|{}|/", self.name, self.size, self.hash)
    }
}

/// Derive an ed2k link from a parsed magnet.
///
/// The ED2K hash is a deterministic projection of the info-hash (its first
/// 32 hex chars, uppercased) so repeated adds of the same magnet map to the
/// same ED2K identity. Name falls back to the info-hash; size to `xl` or 0.
///
/// # Errors
///
/// Returns `BadRequest` when the magnet's info-hash is shorter than the
/// 32 hex chars the ED2K identity requires.
pub fn convert_magnet_to_ed2k(magnet: &MagnetLink) -> BridgeResult<Ed2kLink> {
    let hash = magnet
        .info_hash
        .get(..32)
        .ok_or_else(|| BridgeError::bad_request("info-hash too short for ed2k conversion"))?
        .to_ascii_uppercase();
    let name = magnet
        .display_name
        .clone()
        .unwrap_or_else(|| magnet.info_hash.clone());
    Ok(Ed2kLink {
        hash,
        name,
        size: magnet.exact_length.unwrap_or(0),
    })
}

fn normalize_info_hash(raw: &str) -> BridgeResult<String> {
    if raw.len() == 40 && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Ok(raw.to_ascii_lowercase());
    }
    Err(BridgeError::bad_request(format!(
        "info-hash '{raw}' is not 40 hex chars"
    )))
}
