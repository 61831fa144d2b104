//! Per-buildpack outputs consumed by the downstream image assembler.

use crate::bom::BomEntry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const WEB_PROCESS: &str = "web";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Process {
    #[serde(rename = "type")]
    pub kind: String,
    pub command: Vec<String>,
    #[serde(default)]
    pub default: bool,
}

impl Process {
    pub fn new(kind: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            kind: kind.into(),
            command,
            default: false,
        }
    }

    #[must_use]
    pub fn default_process(mut self, default: bool) -> Self {
        self.default = default;
        self
    }
}

/// Contents of `launch.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LaunchDescription {
    /// Names of the layers exported into the image.
    #[serde(default)]
    pub layers: Vec<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub processes: Vec<Process>,
    #[serde(default)]
    pub bom: Vec<BomEntry>,
}

impl LaunchDescription {
    /// Add or replace the process of the same type, keeping first-seen order.
    /// Only one process may be the default.
    pub fn set_process(&mut self, process: Process) {
        if process.default {
            for p in &mut self.processes {
                p.default = false;
            }
        }
        if let Some(existing) = self.processes.iter_mut().find(|p| p.kind == process.kind) {
            *existing = process;
        } else {
            self.processes.push(process);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
            && self.labels.is_empty()
            && self.processes.is_empty()
            && self.bom.is_empty()
    }
}

/// Contents of `build.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BuildDescription {
    #[serde(default)]
    pub bom: Vec<BomEntry>,
}
