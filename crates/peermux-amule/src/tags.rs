//! Opcode, tag-name, and value-type constants for the EC wire grammar.

/// Flags word carried by every frame (UTF-8 payloads, no compression).
pub const FLAGS_DEFAULT: u32 = 0x20;

/// Value-type discriminators.
pub mod value_type {
    /// Opaque byte payload (RLE buffers and unknown extensions).
    pub const CUSTOM: u8 = 0x01;
    /// Unsigned 8-bit integer.
    pub const U8: u8 = 0x02;
    /// Unsigned 16-bit integer, network order.
    pub const U16: u8 = 0x03;
    /// Unsigned 32-bit integer, network order.
    pub const U32: u8 = 0x04;
    /// Unsigned 64-bit integer, network order.
    pub const U64: u8 = 0x05;
    /// NUL-terminated UTF-8 string.
    pub const STRING: u8 = 0x06;
    /// IPv4 address plus port.
    pub const IPV4: u8 = 0x08;
    /// 16-byte ED2K hash.
    pub const HASH16: u8 = 0x09;
}

/// Request/response opcodes.
pub mod op {
    /// Empty acknowledgement.
    pub const NOOP: u8 = 0x01;
    /// Authentication request carrying the password tag.
    pub const AUTH_REQ: u8 = 0x02;
    /// Authentication accepted.
    pub const AUTH_OK: u8 = 0x04;
    /// Authentication rejected.
    pub const AUTH_FAIL: u8 = 0x05;
    /// Generic failure carrying an optional message tag.
    pub const FAILED: u8 = 0x06;
    /// Statistics request (used as the health probe).
    pub const STAT_REQ: u8 = 0x0a;
    /// Statistics snapshot.
    pub const STATS: u8 = 0x0b;
    /// Download queue request.
    pub const GET_DLOAD_QUEUE: u8 = 0x0d;
    /// Download queue snapshot.
    pub const DLOAD_QUEUE: u8 = 0x0e;
    /// Shared files request.
    pub const GET_SHARED_FILES: u8 = 0x10;
    /// Shared files snapshot.
    pub const SHARED_FILES: u8 = 0x11;
    /// Admit an ed2k link.
    pub const ADD_LINK: u8 = 0x14;
    /// Pause a download.
    pub const PAUSE: u8 = 0x18;
    /// Resume a download.
    pub const RESUME: u8 = 0x19;
    /// Delete a download or shared file.
    pub const DELETE: u8 = 0x1a;
    /// Assign a download to a category id.
    pub const SET_CATEGORY: u8 = 0x1b;
    /// Run a name search and return hits.
    pub const SEARCH: u8 = 0x26;
    /// Search hits snapshot.
    pub const SEARCH_RESULTS: u8 = 0x28;
    /// Category list request.
    pub const GET_CATEGORIES: u8 = 0x30;
    /// Category list snapshot.
    pub const CATEGORIES: u8 = 0x31;
    /// Create a category.
    pub const CREATE_CATEGORY: u8 = 0x32;
    /// Update a category in place.
    pub const UPDATE_CATEGORY: u8 = 0x33;
    /// Delete a category by id.
    pub const DELETE_CATEGORY: u8 = 0x34;
    /// Server table request.
    pub const GET_SERVERS: u8 = 0x36;
    /// Server table snapshot.
    pub const SERVERS: u8 = 0x37;
    /// Apply a server action (connect/disconnect/remove).
    pub const SERVER_ACTION: u8 = 0x38;
}

/// Tag names (15-bit identifiers; the wire shifts them left one bit).
pub mod tag {
    /// Password string on `AUTH_REQ`.
    pub const PASSWORD: u16 = 0x0001;
    /// Client banner on `AUTH_REQ`.
    pub const CLIENT_NAME: u16 = 0x0002;
    /// Protocol revision on `AUTH_REQ`.
    pub const PROTOCOL_VERSION: u16 = 0x0003;
    /// Failure detail on `FAILED`.
    pub const MESSAGE: u16 = 0x0005;
    /// One download/shared-file record (nested).
    pub const ITEM: u16 = 0x0020;
    /// 16-byte file hash.
    pub const ITEM_HASH: u16 = 0x0021;
    /// File name.
    pub const ITEM_NAME: u16 = 0x0022;
    /// Total size in bytes.
    pub const ITEM_SIZE_FULL: u16 = 0x0023;
    /// Bytes completed.
    pub const ITEM_SIZE_DONE: u16 = 0x0024;
    /// Download rate in bytes per second.
    pub const ITEM_SPEED_DOWN: u16 = 0x0025;
    /// Upload rate in bytes per second.
    pub const ITEM_SPEED_UP: u16 = 0x0026;
    /// Engine status byte.
    pub const ITEM_STATUS: u16 = 0x0027;
    /// Category id the record belongs to.
    pub const ITEM_CATEGORY: u16 = 0x0028;
    /// Session upload bytes.
    pub const ITEM_UP_SESSION: u16 = 0x0029;
    /// Lifetime upload bytes.
    pub const ITEM_UP_TOTAL: u16 = 0x002a;
    /// Source count offering the file.
    pub const ITEM_SOURCE_COUNT: u16 = 0x002b;
    /// Sources holding the complete file.
    pub const ITEM_SOURCE_COMPLETE: u16 = 0x002c;
    /// Unix timestamp of admission.
    pub const ITEM_ADDED_AT: u16 = 0x002d;
    /// Engine status message.
    pub const ITEM_MESSAGE: u16 = 0x002e;
    /// RLE per-part source counts.
    pub const ITEM_PART_STATUS: u16 = 0x0030;
    /// RLE gap ranges.
    pub const ITEM_GAP_STATUS: u16 = 0x0031;
    /// RLE pending request ranges.
    pub const ITEM_REQ_STATUS: u16 = 0x0032;
    /// ed2k link string on `ADD_LINK`.
    pub const ED2K_LINK: u16 = 0x0040;
    /// Whether a delete should also remove payload data.
    pub const DELETE_FILES: u16 = 0x0041;
    /// Search query string.
    pub const SEARCH_QUERY: u16 = 0x0042;
    /// One category definition (nested).
    pub const CATEGORY: u16 = 0x0050;
    /// Numeric category id.
    pub const CATEGORY_ID: u16 = 0x0051;
    /// Category title.
    pub const CATEGORY_TITLE: u16 = 0x0052;
    /// Category incoming path.
    pub const CATEGORY_PATH: u16 = 0x0053;
    /// 24-bit RGB colour.
    pub const CATEGORY_COLOR: u16 = 0x0054;
    /// Priority byte.
    pub const CATEGORY_PRIO: u16 = 0x0055;
    /// Free-form comment.
    pub const CATEGORY_COMMENT: u16 = 0x0056;
    /// One server entry (nested).
    pub const SERVER: u16 = 0x0060;
    /// Server display name.
    pub const SERVER_NAME: u16 = 0x0061;
    /// Server `host:port`.
    pub const SERVER_ADDR: u16 = 0x0062;
    /// Users currently on the server.
    pub const SERVER_USERS: u16 = 0x0063;
    /// Files indexed by the server.
    pub const SERVER_FILES: u16 = 0x0064;
    /// Whether the engine is connected to this server.
    pub const SERVER_CONNECTED: u16 = 0x0065;
    /// Action verb on `SERVER_ACTION`.
    pub const SERVER_ACTION_KIND: u16 = 0x0066;
}

/// Engine status bytes carried in `ITEM_STATUS`.
pub mod status {
    /// Actively downloading.
    pub const DOWNLOADING: u8 = 0;
    /// Paused by the user.
    pub const PAUSED: u8 = 1;
    /// Download complete.
    pub const COMPLETED: u8 = 2;
    /// Shared and uploading.
    pub const SHARED: u8 = 3;
    /// Engine-reported error.
    pub const ERROR: u8 = 4;
    /// Waiting for a transfer slot.
    pub const QUEUED: u8 = 5;
    /// Hashing or verifying.
    pub const CHECKING: u8 = 6;
}
