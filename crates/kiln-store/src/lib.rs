//! On-disk layer management for Kiln.
//!
//! This crate provides the storage side of the engine: `StoreLayout` for the
//! directory structure, `LayerStore` for attaching, clearing and finalizing a
//! buildpack's layers, `LayerMetadataFile` for the checksummed per-layer side
//! file, and the ordered build/launch/shared environment model in [`env`].

pub mod env;
pub mod layers;
pub mod layout;
pub mod metadata;

pub use env::{Environment, LayerEnv, Mutation, Scope, Verb};
pub use layers::{FinalizeReport, LayerFlag, LayerFlags, LayerHandle, LayerStore};
pub use layout::{StoreLayout, RESERVED_LAYER_NAMES, STORE_FORMAT_VERSION};
pub use metadata::LayerMetadataFile;

use std::path::Path;
use thiserror::Error;

/// Fsync a directory so that a preceding `rename()` is durable.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Schema(#[from] kiln_schema::SchemaError),
    #[error("metadata file '{path}' is corrupt: {reason}")]
    CorruptMetadata { path: String, reason: String },
    #[error("integrity check failed for '{path}': expected {expected}, got {actual}")]
    IntegrityFailure {
        path: String,
        expected: String,
        actual: String,
    },
    #[error("layer name '{0}' is reserved")]
    ReservedName(String),
    #[error("layer not attached: {0}")]
    LayerNotFound(String),
    #[error("layer '{name}' already attached with flags [{existing}], requested [{requested}]")]
    FlagConflict {
        name: String,
        existing: String,
        requested: String,
    },
    #[error("store format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("TOML encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),
    #[error("TOML decode error: {0}")]
    TomlDecode(#[from] toml::de::Error),
}
