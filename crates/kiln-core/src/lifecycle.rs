use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of one module invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Start,
    Detecting,
    OptedOut,
    OptedIn,
    Building,
    Succeeded,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::OptedOut | Phase::Succeeded | Phase::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Start => "start",
            Phase::Detecting => "detecting",
            Phase::OptedOut => "opted-out",
            Phase::OptedIn => "opted-in",
            Phase::Building => "building",
            Phase::Succeeded => "succeeded",
            Phase::Failed => "failed",
        })
    }
}

pub fn validate_transition(from: Phase, to: Phase) -> Result<(), CoreError> {
    let valid = matches!(
        (from, to),
        (Phase::Start, Phase::Detecting)
            | (
                Phase::Detecting,
                Phase::OptedOut | Phase::OptedIn | Phase::Failed
            )
            | (Phase::OptedIn, Phase::Building)
            | (Phase::Building, Phase::Succeeded | Phase::Failed)
    );

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Tracks the phase of one module and refuses to re-enter a phase.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    current: Phase,
    visited: Vec<Phase>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            current: Phase::Start,
            visited: vec![Phase::Start],
        }
    }

    pub fn current(&self) -> Phase {
        self.current
    }

    /// Every phase entered so far, in order.
    pub fn visited(&self) -> &[Phase] {
        &self.visited
    }

    pub fn advance(&mut self, to: Phase) -> Result<(), CoreError> {
        validate_transition(self.current, to)?;
        self.current = to;
        self.visited.push(to);
        Ok(())
    }

    /// Move to `Failed` if the current phase allows it. Returns whether it
    /// did; a module that fails before detection starts stays in `Start`.
    pub fn fail(&mut self) -> bool {
        self.advance(Phase::Failed).is_ok()
    }
}
