//! Shared vocabulary for the Kiln buildpack engine.
//!
//! This crate defines the data that crosses crate boundaries: validated
//! identifiers (`BuildpackId`, `LayerName`), the captured platform environment
//! (`PlatformEnv`), build-plan contributions made during detection, the
//! bill-of-materials ledger, and the launch/build descriptions handed to the
//! image assembler.

pub mod bom;
pub mod launch;
pub mod plan;
pub mod platform;
pub mod types;

pub use bom::{BomEntry, BomLedger};
pub use launch::{BuildDescription, LaunchDescription, Process, WEB_PROCESS};
pub use plan::{BuildPlan, Provide, Require};
pub use platform::PlatformEnv;
pub use types::{validate_name, BuildpackId, LayerName};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid name: {0}")]
    InvalidName(String),
    #[error("parsing {var}: invalid boolean '{value}'")]
    InvalidBool { var: String, value: String },
}
