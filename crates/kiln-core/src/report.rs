//! Structured run reports, written to `<root>/report.json`.

use crate::error::{BuildpackError, ErrorKind, EXIT_SUCCESS};
use crate::exec::ExecTiming;
use crate::lifecycle::Phase;
use crate::{write_atomic, CoreError};
use kiln_schema::BomEntry;
use kiln_store::StoreLayout;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    OptedOut,
    /// Detection-only run that opted in.
    OptedIn,
    Succeeded,
    Failed,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Outcome::OptedOut => "opted out",
            Outcome::OptedIn => "opted in",
            Outcome::Succeeded => "succeeded",
            Outcome::Failed => "failed",
        })
    }
}

/// Where a module failed. `Setup` covers everything before detection starts,
/// such as an invalid buildpack id or an unusable layers root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Setup,
    Detect,
    Build,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Setup => "setup",
            Stage::Detect => "detect",
            Stage::Build => "build",
        })
    }
}

/// Timing and cache activity of one phase.
///
/// `user_ms` is the time spent in commands attributed to the user's build;
/// everything else in the phase counts as `internal_ms`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub duration_ms: u64,
    pub user_ms: u64,
    pub internal_ms: u64,
    #[serde(default)]
    pub commands: Vec<ExecTiming>,
    #[serde(default)]
    pub cache_hits: Vec<String>,
    #[serde(default)]
    pub cache_misses: Vec<String>,
}

impl PhaseReport {
    pub fn new(
        elapsed: Duration,
        commands: Vec<ExecTiming>,
        cache_hits: Vec<String>,
        cache_misses: Vec<String>,
    ) -> Self {
        let duration_ms = elapsed.as_millis() as u64;
        let user_ms: u64 = commands
            .iter()
            .filter(|c| c.attribution.timing_is_user())
            .map(|c| c.duration_ms)
            .sum();
        Self {
            duration_ms,
            user_ms,
            internal_ms: duration_ms.saturating_sub(user_ms),
            commands,
            cache_hits,
            cache_misses,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&BuildpackError> for ErrorReport {
    fn from(err: &BuildpackError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleReport {
    pub buildpack: String,
    pub started_at: String,
    pub outcome: Outcome,
    pub exit_code: u8,
    /// Phases visited, in order. Ends in a terminal phase except after a
    /// setup failure, which never leaves `Start`; `failed_stage` says so.
    pub phases: Vec<Phase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detect_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detect: Option<PhaseReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<PhaseReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
    #[serde(default)]
    pub launch_layers: Vec<String>,
    #[serde(default)]
    pub removed_layers: Vec<String>,
    #[serde(default)]
    pub bom: Vec<BomEntry>,
}

impl ModuleReport {
    pub fn new(buildpack: &str) -> Self {
        Self {
            buildpack: buildpack.to_owned(),
            started_at: chrono::Utc::now().to_rfc3339(),
            outcome: Outcome::Failed,
            exit_code: EXIT_SUCCESS,
            phases: Vec::new(),
            failed_stage: None,
            detect_reason: None,
            detect: None,
            build: None,
            error: None,
            launch_layers: Vec::new(),
            removed_layers: Vec::new(),
            bom: Vec::new(),
        }
    }

    pub fn failed(&self) -> bool {
        self.outcome == Outcome::Failed
    }

    /// Cache hits across both phases.
    pub fn cache_hits(&self) -> usize {
        self.detect.iter().chain(&self.build).map(|p| p.cache_hits.len()).sum()
    }

    pub fn cache_misses(&self) -> usize {
        self.detect.iter().chain(&self.build).map(|p| p.cache_misses.len()).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupReport {
    pub started_at: String,
    pub exit_code: u8,
    pub modules: Vec<ModuleReport>,
}

impl GroupReport {
    pub fn new(modules: Vec<ModuleReport>) -> Self {
        let exit_code = modules
            .iter()
            .find(|m| m.failed())
            .map_or(EXIT_SUCCESS, |m| m.exit_code);
        let started_at = modules
            .first()
            .map_or_else(|| chrono::Utc::now().to_rfc3339(), |m| m.started_at.clone());
        Self {
            started_at,
            exit_code,
            modules,
        }
    }

    pub fn write(&self, layout: &StoreLayout) -> Result<(), CoreError> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(&layout.report_file(), json.as_bytes())
    }

    /// `Ok(None)` when no run has written a report yet.
    pub fn read(layout: &StoreLayout) -> Result<Option<Self>, CoreError> {
        let path = layout.report_file();
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}
