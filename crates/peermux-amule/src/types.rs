//! Decoded EC record shapes and their projection into the unified model.

use chrono::{DateTime, Utc};
use peermux_core::{ClientItem, ClientKind, Item, ItemStatus, MirrorCategory, SearchResult};

use crate::codec::EcTag;
use crate::error::{EcError, EcResult};
use crate::rle;
use crate::tags::{status, tag};

/// One download or shared-file record decoded from an `ITEM` tag.
#[derive(Debug, Clone)]
pub struct AmuleRecord {
    /// 16-byte ED2K hash.
    pub hash: [u8; 16],
    /// File name.
    pub name: String,
    /// Total size in bytes.
    pub size_full: u64,
    /// Bytes completed.
    pub size_done: u64,
    /// Download rate in bytes per second.
    pub speed_down: u64,
    /// Upload rate in bytes per second.
    pub speed_up: u64,
    /// Engine status byte.
    pub status: u8,
    /// Category id.
    pub category_id: u32,
    /// Session upload bytes.
    pub up_session: u64,
    /// Lifetime upload bytes.
    pub up_total: u64,
    /// Sources currently offering the file.
    pub source_count: u32,
    /// Sources holding the complete file.
    pub source_complete: u32,
    /// Unix timestamp of admission.
    pub added_at: u64,
    /// Engine status message, when present.
    pub message: Option<String>,
    /// Decoded per-part source counts.
    pub part_status: Option<Vec<u8>>,
    /// Decoded gap ranges.
    pub gap_status: Option<Vec<(u64, u64)>>,
    /// Decoded pending request ranges.
    pub req_status: Option<Vec<(u64, u64)>>,
}

impl AmuleRecord {
    /// Decode an `ITEM` tag into a record.
    ///
    /// # Errors
    ///
    /// Returns a frame error when the mandatory hash or name children are
    /// missing.
    pub fn from_tag(item: &EcTag) -> EcResult<Self> {
        let hash = *item
            .child(tag::ITEM_HASH)
            .and_then(EcTag::as_hash)
            .ok_or_else(|| EcError::frame("item record lacks a hash"))?;
        let name = item
            .child(tag::ITEM_NAME)
            .and_then(EcTag::as_str)
            .ok_or_else(|| EcError::frame("item record lacks a name"))?
            .to_string();

        let number =
            |name: u16| -> u64 { item.child(name).and_then(EcTag::as_u64).unwrap_or_default() };

        Ok(Self {
            hash,
            name,
            size_full: number(tag::ITEM_SIZE_FULL),
            size_done: number(tag::ITEM_SIZE_DONE),
            speed_down: number(tag::ITEM_SPEED_DOWN),
            speed_up: number(tag::ITEM_SPEED_UP),
            status: u8::try_from(number(tag::ITEM_STATUS)).unwrap_or(u8::MAX),
            category_id: u32::try_from(number(tag::ITEM_CATEGORY)).unwrap_or_default(),
            up_session: number(tag::ITEM_UP_SESSION),
            up_total: number(tag::ITEM_UP_TOTAL),
            source_count: u32::try_from(number(tag::ITEM_SOURCE_COUNT)).unwrap_or_default(),
            source_complete: u32::try_from(number(tag::ITEM_SOURCE_COMPLETE)).unwrap_or_default(),
            added_at: number(tag::ITEM_ADDED_AT),
            message: item
                .child(tag::ITEM_MESSAGE)
                .and_then(EcTag::as_str)
                .map(str::to_string),
            part_status: item
                .child(tag::ITEM_PART_STATUS)
                .and_then(EcTag::as_bytes)
                .map(rle::decode_part_status),
            gap_status: item
                .child(tag::ITEM_GAP_STATUS)
                .and_then(EcTag::as_bytes)
                .map(rle::decode_ranges),
            req_status: item
                .child(tag::ITEM_REQ_STATUS)
                .and_then(EcTag::as_bytes)
                .map(rle::decode_ranges),
        })
    }

    /// 32-hex uppercase rendering of the record hash.
    #[must_use]
    pub fn hex_hash(&self) -> String {
        hex::encode_upper(self.hash)
    }

    /// Project the record into the unified shape.
    ///
    /// The item hash stays in native 32-hex form here; the data plane
    /// widens it to 40-hex through the hash store.
    #[must_use]
    pub fn into_client_item(self, shared: bool) -> ClientItem {
        let status = if shared {
            ItemStatus::Seeding
        } else {
            map_status(self.status)
        };
        let added_at = i64::try_from(self.added_at)
            .ok()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .unwrap_or_else(Utc::now);
        let hash = self.hex_hash();
        let category_token = Some(self.category_id.to_string());

        let mut item = Item {
            hash,
            client: ClientKind::Amule,
            name: self.name,
            size: self.size_full,
            size_downloaded: if shared { self.size_full } else { self.size_done },
            progress: 0,
            download_speed: self.speed_down,
            upload_speed: self.speed_up,
            upload_session: self.up_session,
            upload_total: self.up_total,
            eta_seconds: None,
            status,
            message: self.message,
            category: String::new(),
            tracker: String::new(),
            added_at,
            completed_at: None,
            part_status: self.part_status,
            gap_status: self.gap_status,
            req_status: self.req_status,
        };
        item.normalize();
        ClientItem {
            item,
            category_token,
            tracker_url: None,
        }
    }

    /// Project a search hit into the unified shape.
    ///
    /// The hash stays in native 32-hex form; the facade widens it.
    #[must_use]
    pub fn into_search_result(self) -> SearchResult {
        let link = peermux_core::Ed2kLink {
            hash: self.hex_hash(),
            name: self.name.clone(),
            size: self.size_full,
        }
        .to_link();
        SearchResult {
            hash: self.hex_hash(),
            name: self.name,
            size: self.size_full,
            sources: self.source_count,
            complete_sources: self.source_complete,
            link,
            client: ClientKind::Amule,
        }
    }
}

/// Decode a `CATEGORY` tag into a mirror entry.
///
/// # Errors
///
/// Returns a frame error when the id or title is missing.
pub fn category_from_tag(category: &EcTag) -> EcResult<MirrorCategory> {
    let id = category
        .child(tag::CATEGORY_ID)
        .and_then(EcTag::as_u64)
        .ok_or_else(|| EcError::frame("category record lacks an id"))?;
    let name = category
        .child(tag::CATEGORY_TITLE)
        .and_then(EcTag::as_str)
        .ok_or_else(|| EcError::frame("category record lacks a title"))?
        .to_string();
    let path = category
        .child(tag::CATEGORY_PATH)
        .and_then(EcTag::as_str)
        .unwrap_or_default()
        .to_string();
    Ok(MirrorCategory {
        id: Some(u32::try_from(id).unwrap_or_default()),
        name,
        path,
    })
}

fn map_status(raw: u8) -> ItemStatus {
    match raw {
        status::DOWNLOADING => ItemStatus::Downloading,
        status::PAUSED => ItemStatus::Paused,
        status::COMPLETED => ItemStatus::Completed,
        status::SHARED => ItemStatus::Seeding,
        status::ERROR => ItemStatus::Error,
        status::QUEUED => ItemStatus::Queued,
        status::CHECKING => ItemStatus::Checking,
        _ => ItemStatus::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::EcValue;

    fn item_tag() -> EcTag {
        EcTag::with_children(
            tag::ITEM,
            EcValue::Custom(Vec::new()),
            vec![
                EcTag::hash(tag::ITEM_HASH, [0x0f; 16]),
                EcTag::string(tag::ITEM_NAME, "demo.iso"),
                EcTag::u64(tag::ITEM_SIZE_FULL, 1_000),
                EcTag::u64(tag::ITEM_SIZE_DONE, 400),
                EcTag::u32(tag::ITEM_SPEED_DOWN, 100),
                EcTag::u8(tag::ITEM_STATUS, status::DOWNLOADING),
                EcTag::u32(tag::ITEM_CATEGORY, 3),
                EcTag::custom(tag::ITEM_PART_STATUS, rle::encode_bytes(&[2, 2, 0])),
                EcTag::custom(tag::ITEM_GAP_STATUS, rle::encode_u64s(&[400, 1_000])),
            ],
        )
    }

    #[test]
    fn record_decodes_fields_and_buffers() {
        let record = AmuleRecord::from_tag(&item_tag()).expect("decode");
        assert_eq!(record.name, "demo.iso");
        assert_eq!(record.size_done, 400);
        assert_eq!(record.category_id, 3);
        assert_eq!(record.part_status.as_deref(), Some(&[2_u8, 2, 0][..]));
        assert_eq!(record.gap_status.as_deref(), Some(&[(400, 1_000)][..]));
        assert!(record.req_status.is_none());
    }

    #[test]
    fn missing_hash_is_a_frame_error() {
        let bare = EcTag::with_children(
            tag::ITEM,
            EcValue::Custom(Vec::new()),
            vec![EcTag::string(tag::ITEM_NAME, "x")],
        );
        assert!(AmuleRecord::from_tag(&bare).is_err());
    }

    #[test]
    fn projection_keeps_native_hash_and_token() {
        let record = AmuleRecord::from_tag(&item_tag()).expect("decode");
        let projected = record.into_client_item(false);
        assert_eq!(projected.item.hash, "0F".repeat(16));
        assert_eq!(projected.category_token.as_deref(), Some("3"));
        assert_eq!(projected.item.progress, 40);
        assert_eq!(projected.item.eta_seconds, Some(6));
    }

    #[test]
    fn shared_projection_forces_seeding() {
        let record = AmuleRecord::from_tag(&item_tag()).expect("decode");
        let projected = record.into_client_item(true);
        assert_eq!(projected.item.status, ItemStatus::Seeding);
        assert_eq!(projected.item.progress, 100);
    }

    #[test]
    fn category_tag_decodes_mirror_entry() {
        let tag = EcTag::with_children(
            tag::CATEGORY,
            EcValue::Custom(Vec::new()),
            vec![
                EcTag::u32(tag::CATEGORY_ID, 3),
                EcTag::string(tag::CATEGORY_TITLE, "Movies"),
                EcTag::string(tag::CATEGORY_PATH, "/mnt/m"),
            ],
        );
        let mirror = category_from_tag(&tag).expect("decode");
        assert_eq!(mirror.id, Some(3));
        assert_eq!(mirror.name, "Movies");
        assert_eq!(mirror.path, "/mnt/m");
    }
}
