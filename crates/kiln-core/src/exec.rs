//! Subprocess execution.
//!
//! Commands are always an argument vector handed to [`std::process::Command`];
//! nothing is ever passed through a shell by the engine. Each run is tagged
//! with an [`Attribution`] that decides how a failure is classified and whose
//! clock the elapsed time is charged to.

use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};
use tracing::debug;

/// Lines of captured output embedded in a failure message.
pub const FAILURE_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Attribution {
    /// Engine work: failures are internal, time is internal.
    #[default]
    Internal,
    /// The user's own build: failures are user errors, time is user time.
    User,
    /// User time, but a failure is still the engine's fault.
    UserTiming,
}

impl Attribution {
    pub fn failure_is_user(self) -> bool {
        self == Attribution::User
    }

    pub fn timing_is_user(self) -> bool {
        matches!(self, Attribution::User | Attribution::UserTiming)
    }
}

impl fmt::Display for Attribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Attribution::Internal => "internal",
            Attribution::User => "user",
            Attribution::UserTiming => "user-timing",
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub attribution: Attribution,
    pub work_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Log the last N lines of stdout once the command has finished.
    pub stdout_tail: Option<usize>,
}

impl ExecOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user() -> Self {
        Self {
            attribution: Attribution::User,
            ..Self::default()
        }
    }

    pub fn user_timing() -> Self {
        Self {
            attribution: Attribution::UserTiming,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn stdout_tail(mut self, lines: usize) -> Self {
        self.stdout_tail = Some(lines);
        self
    }
}

/// Captured result of a finished subprocess.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn status_description(&self) -> String {
        match self.code {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_owned(),
        }
    }

    /// The tail used in failure messages: stderr, or stdout when stderr is
    /// empty.
    pub fn failure_tail(&self) -> String {
        let text = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        tail_lines(text, FAILURE_TAIL_LINES)
    }
}

/// One entry of the per-phase timing ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecTiming {
    pub command: String,
    pub attribution: Attribution,
    pub duration_ms: u64,
}

/// Human-readable rendering of an argument vector, for logs and messages only.
pub fn display_command(argv: &[&str]) -> String {
    argv.join(" ")
}

/// Last `n` lines of `text`, without a trailing newline.
pub fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

/// Run `argv` to completion and capture its output.
///
/// `env` is layered on top of the inherited environment, then the
/// per-call overrides in `opts` on top of that.
pub(crate) fn run(
    argv: &[&str],
    default_dir: &Path,
    env: &BTreeMap<String, String>,
    opts: &ExecOptions,
) -> Result<ExecResult, CoreError> {
    let (program, args) = argv.split_first().ok_or(CoreError::EmptyCommand)?;
    let dir = opts.work_dir.as_deref().unwrap_or(default_dir);

    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(dir).envs(env);
    for (name, value) in &opts.env {
        cmd.env(name, value);
    }

    debug!(
        command = %display_command(argv),
        dir = %dir.display(),
        attribution = %opts.attribution,
        "exec"
    );
    let started = Instant::now();
    let output = cmd.output().map_err(|source| CoreError::Spawn {
        program: (*program).to_owned(),
        source,
    })?;
    let duration = started.elapsed();

    Ok(ExecResult {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        duration,
    })
}
