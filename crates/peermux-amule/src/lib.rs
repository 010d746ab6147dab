#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]
#![allow(unexpected_cfgs)]

//! ED2K engine adapter: External-Control frame codec and session client.
//!
//! The EC protocol is a framed binary exchange carrying a tagged value
//! tree. This crate owns the codec (including the RLE-compressed segment
//! buffers shipped with download snapshots) and a request/response session
//! worker that the bridge's client manager supervises.

/// ED2K session client implementing the engine seam.
pub mod client;
/// EC frame and tag-tree codec.
pub mod codec;
/// Error types for the EC adapter.
pub mod error;
/// RLE codecs for segment buffers.
pub mod rle;
/// Tag, type, and opcode constants.
pub mod tags;
/// Decoded record shapes and projections.
pub mod types;

pub use client::{AmuleClient, AmuleConfig};
pub use codec::{EcCodec, EcFrame, EcTag, EcValue};
pub use error::{EcError, EcResult};
pub use rle::PART_SIZE;
