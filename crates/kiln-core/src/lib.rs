//! Execution engine for Kiln buildpacks.
//!
//! A buildpack implements [`Buildpack`] and hands itself to
//! [`buildpack_main`]. The [`Driver`] runs detection, then (only on opt-in)
//! the build phase, each with a fresh [`Context`]. The context is the single
//! surface a module touches: layers and their metadata, scoped environment
//! mutations, the bill of materials, file and process helpers. Failures are
//! classified into user and internal errors and mapped to distinct exit codes.

pub mod cache;
pub mod context;
pub mod detect;
pub mod driver;
pub mod entry;
pub mod error;
pub mod exec;
pub mod http;
pub mod lifecycle;
pub mod report;

mod glob;

pub use cache::{CacheOutcome, Fingerprint, FINGERPRINT_KEY};
pub use context::{Context, ContextMode};
pub use detect::DetectResult;
pub use driver::{Buildpack, Driver};
pub use entry::buildpack_main;
pub use error::{
    BuildpackError, ErrorKind, EXIT_INTERNAL_ERROR, EXIT_SUCCESS, EXIT_USER_ERROR,
};
pub use exec::{Attribution, ExecOptions, ExecResult, ExecTiming};
pub use http::HttpProbe;
pub use lifecycle::{validate_transition, Lifecycle, Phase};
pub use report::{ErrorReport, GroupReport, ModuleReport, Outcome, PhaseReport, Stage};

pub use kiln_schema::{BomEntry, BuildPlan, PlatformEnv, Process};
pub use kiln_store::{LayerFlag, LayerHandle};

use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("store error: {0}")]
    Store(#[from] kiln_store::StoreError),
    #[error("schema error: {0}")]
    Schema(#[from] kiln_schema::SchemaError),
    #[error("invalid phase transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("{operation} is not available during {mode}")]
    WrongMode {
        operation: &'static str,
        mode: &'static str,
    },
    #[error("empty command")]
    EmptyCommand,
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("running {command:?} failed ({status}){}", fmt_tail(.output_tail))]
    CommandFailed {
        command: String,
        status: String,
        output_tail: String,
    },
    #[error("HTTP request to {url} failed: {reason}")]
    Http { url: String, reason: String },
    #[error("invalid glob pattern '{pattern}': {reason}")]
    Glob { pattern: String, reason: String },
    #[error("I/O error on {path}: {source}")]
    File {
        path: String,
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("TOML encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),
}

/// Write `contents` to `path` via a temp file in the same directory, fsync
/// and rename.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CoreError> {
    let dir = path
        .parent()
        .ok_or_else(|| std::io::Error::other("output path has no parent"))?;
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| CoreError::Io(e.error))?;
    Ok(())
}

fn fmt_tail(tail: &str) -> String {
    if tail.is_empty() {
        String::new()
    } else {
        format!(":\n{tail}")
    }
}
