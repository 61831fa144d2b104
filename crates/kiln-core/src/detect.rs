use kiln_schema::BuildPlan;
use std::fmt;

/// Outcome of a module's detection function.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectResult {
    OptIn {
        reason: String,
        plan: Option<BuildPlan>,
    },
    OptOut {
        reason: String,
    },
}

impl DetectResult {
    pub fn opt_in(reason: impl Into<String>) -> Self {
        DetectResult::OptIn {
            reason: reason.into(),
            plan: None,
        }
    }

    pub fn opt_out(reason: impl Into<String>) -> Self {
        DetectResult::OptOut {
            reason: reason.into(),
        }
    }

    pub fn opt_in_file_found(path: &str) -> Self {
        Self::opt_in(format!("found {path}"))
    }

    pub fn opt_out_file_not_found(path: &str) -> Self {
        Self::opt_out(format!("{path} not found"))
    }

    pub fn opt_in_env_set(var: &str) -> Self {
        Self::opt_in(format!("{var} set"))
    }

    pub fn opt_out_env_not_set(var: &str) -> Self {
        Self::opt_out(format!("{var} not set"))
    }

    /// Attach a build plan. Has no effect on an opt-out.
    #[must_use]
    pub fn with_build_plan(self, plan: BuildPlan) -> Self {
        match self {
            DetectResult::OptIn { reason, .. } => DetectResult::OptIn {
                reason,
                plan: Some(plan),
            },
            out @ DetectResult::OptOut { .. } => out,
        }
    }

    pub fn is_opt_in(&self) -> bool {
        matches!(self, DetectResult::OptIn { .. })
    }

    pub fn reason(&self) -> &str {
        match self {
            DetectResult::OptIn { reason, .. } | DetectResult::OptOut { reason } => reason,
        }
    }

    pub fn plan(&self) -> Option<&BuildPlan> {
        match self {
            DetectResult::OptIn { plan, .. } => plan.as_ref(),
            DetectResult::OptOut { .. } => None,
        }
    }
}

impl fmt::Display for DetectResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectResult::OptIn { reason, .. } => write!(f, "opt-in: {reason}"),
            DetectResult::OptOut { reason } => write!(f, "opt-out: {reason}"),
        }
    }
}
