//! Bidirectional, persistent map between ED2K hashes and synthesised
//! BitTorrent-style 40-hex info-hashes.
//!
//! Reads take a shared lock; writes serialise behind the exclusive lock and
//! persist the whole document atomically before returning. The forward map
//! (ed2k → magnet) and reverse index (magnet → ed2k) are mutated together
//! under the same guard so the bijection can never tear.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::atomic;
use crate::error::{StoreError, StoreResult};

/// Metadata sidecar stored alongside each mapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HashMeta {
    /// Display name captured at insert time.
    pub file_name: String,
    /// Unified category name captured at insert time.
    pub category: String,
    /// Insert timestamp.
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredMapping {
    magnet: String,
    meta: HashMeta,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct HashStoreDoc {
    #[serde(default)]
    mappings: HashMap<String, StoredMapping>,
}

#[derive(Debug, Default)]
struct State {
    forward: HashMap<String, StoredMapping>,
    reverse: HashMap<String, String>,
}

/// Persistent ed2k ↔ magnet hash store.
#[derive(Debug)]
pub struct HashStore {
    path: PathBuf,
    state: RwLock<State>,
}

impl HashStore {
    /// Open the store, creating a fresh one when the file is absent.
    ///
    /// # Errors
    ///
    /// Returns an error when an existing document cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let doc: HashStoreDoc = atomic::read_json(&path)?.unwrap_or_default();
        let mut state = State::default();
        for (ed2k, mapping) in doc.mappings {
            state.reverse.insert(mapping.magnet.clone(), ed2k.clone());
            state.forward.insert(ed2k, mapping);
        }
        debug!(
            path = %path.display(),
            mappings = state.forward.len(),
            "hash store opened"
        );
        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    /// Insert a mapping, refusing inserts that would break the bijection.
    ///
    /// Re-inserting an identical pair is idempotent and refreshes the
    /// metadata sidecar.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` when either side of the pair is already bound to
    /// a different counterpart, or an IO/codec error when persisting fails.
    pub fn set_mapping(&self, ed2k: &str, magnet: &str, meta: HashMeta) -> StoreResult<()> {
        let ed2k = normalize_ed2k(ed2k)?;
        let magnet = normalize_magnet(magnet)?;

        let mut state = self.write_state();
        if let Some(existing) = state.forward.get(&ed2k)
            && existing.magnet != magnet
        {
            return Err(StoreError::Conflict {
                detail: format!("ed2k hash {ed2k} already maps to {}", existing.magnet),
            });
        }
        if let Some(existing) = state.reverse.get(&magnet)
            && existing != &ed2k
        {
            return Err(StoreError::Conflict {
                detail: format!("magnet hash {magnet} already maps to {existing}"),
            });
        }

        state.forward.insert(
            ed2k.clone(),
            StoredMapping {
                magnet: magnet.clone(),
                meta,
            },
        );
        state.reverse.insert(magnet, ed2k);
        self.persist(&state)
    }

    /// Look up the magnet hash for an ED2K hash.
    #[must_use]
    pub fn magnet_for(&self, ed2k: &str) -> Option<String> {
        let ed2k = normalize_ed2k(ed2k).ok()?;
        self.read_state()
            .forward
            .get(&ed2k)
            .map(|mapping| mapping.magnet.clone())
    }

    /// Look up the ED2K hash for a magnet hash.
    #[must_use]
    pub fn ed2k_for(&self, magnet: &str) -> Option<String> {
        let magnet = normalize_magnet(magnet).ok()?;
        self.read_state().reverse.get(&magnet).cloned()
    }

    /// Fetch the metadata sidecar for an ED2K hash.
    #[must_use]
    pub fn meta_for(&self, ed2k: &str) -> Option<HashMeta> {
        let ed2k = normalize_ed2k(ed2k).ok()?;
        self.read_state()
            .forward
            .get(&ed2k)
            .map(|mapping| mapping.meta.clone())
    }

    /// Remove a mapping, returning its metadata when it existed.
    ///
    /// # Errors
    ///
    /// Returns an IO/codec error when persisting the removal fails.
    pub fn remove_mapping(&self, ed2k: &str) -> StoreResult<Option<HashMeta>> {
        let ed2k = normalize_ed2k(ed2k)?;
        let mut state = self.write_state();
        let Some(removed) = state.forward.remove(&ed2k) else {
            return Ok(None);
        };
        state.reverse.remove(&removed.magnet);
        self.persist(&state)?;
        Ok(Some(removed.meta))
    }

    /// Number of mappings currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read_state().forward.len()
    }

    /// Whether the store holds no mappings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self, state: &State) -> StoreResult<()> {
        let doc = HashStoreDoc {
            mappings: state.forward.clone(),
        };
        atomic::write_json(&self.path, &doc)
    }

    fn read_state(&self) -> RwLockReadGuard<'_, State> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("hash store lock poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, State> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("hash store lock poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }
}

/// Synthesise a 40-hex magnet hash for an ED2K item without a native
/// info-hash.
///
/// The 8-hex prefix mixes the digest bytes with the file-name length
/// (FNV-1a), then the 32-hex ed2k hash is appended. The transform is
/// deterministic so the same item maps identically across restarts; true
/// bijectivity is enforced at insert time by refusing collisions.
#[must_use]
pub fn synthesize_magnet_hash(ed2k: &str, file_name_len: usize) -> String {
    const FNV_OFFSET: u32 = 0x811c_9dc5;
    const FNV_PRIME: u32 = 0x0100_0193;

    let mut acc = FNV_OFFSET;
    for byte in ed2k.as_bytes() {
        acc ^= u32::from(byte.to_ascii_lowercase());
        acc = acc.wrapping_mul(FNV_PRIME);
    }
    acc ^= u32::try_from(file_name_len).unwrap_or(u32::MAX);
    acc = acc.wrapping_mul(FNV_PRIME);

    format!("{acc:08x}{}", ed2k.to_ascii_lowercase())
}

fn normalize_ed2k(raw: &str) -> StoreResult<String> {
    if raw.len() == 32 && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(raw.to_ascii_uppercase())
    } else {
        Err(StoreError::Conflict {
            detail: format!("'{raw}' is not a 32-hex ed2k hash"),
        })
    }
}

fn normalize_magnet(raw: &str) -> StoreResult<String> {
    if raw.len() == 40 && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(raw.to_ascii_lowercase())
    } else {
        Err(StoreError::Conflict {
            detail: format!("'{raw}' is not a 40-hex magnet hash"),
        })
    }
}
