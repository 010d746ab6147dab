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

//! Configuration for the bridge: typed model, defaults, validation, and a
//! JSON-file loader. Secrets (the web password) are stored as argon2 PHC
//! strings and verified here so raw passwords never travel further.

/// Default values and file names.
pub mod defaults;
/// Error types for configuration handling.
pub mod error;
/// JSON-file loader and password handling.
pub mod loader;
/// Typed configuration model.
pub mod model;
/// Structural validation.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigService;
pub use model::{
    AppConfig, AuthConfig, CadenceConfig, EngineEndpoints, HttpConfig, NotifierConfig,
    ProwlarrConfig, ResolverConfig,
};
pub use validate::validate;
