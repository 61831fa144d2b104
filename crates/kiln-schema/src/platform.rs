//! Platform environment variables understood by the engine and its buildpacks.
//!
//! The process environment is captured exactly once into a [`PlatformEnv`]
//! and passed down explicitly; nothing below the entry point reads
//! `std::env` directly.

use crate::SchemaError;
use std::collections::BTreeMap;

/// Constrains autodetection: a runtime buildpack opts in only when this names it.
pub const RUNTIME: &str = "KILN_RUNTIME";
/// Runtime version to install, e.g. `6.0.100` for .NET or `1.21.3` for Go.
pub const RUNTIME_VERSION: &str = "KILN_RUNTIME_VERSION";
/// Verbose logging and noisier tool invocations.
pub const DEBUG_MODE: &str = "KILN_DEBUG";
/// Development mode: `LaunchIfDevMode` layers are exported into the image.
pub const DEV_MODE: &str = "KILN_DEVMODE";
/// Overrides the command of the `web` process.
pub const ENTRYPOINT: &str = "KILN_ENTRYPOINT";
/// Asks source-building buildpacks to drop sources from the final image.
pub const CLEAR_SOURCE: &str = "KILN_CLEAR_SOURCE";
/// Buildable unit, e.g. `./cmd/server` for Go.
pub const BUILDABLE: &str = "KILN_BUILDABLE";
/// Extra arguments appended to the build tool invocation.
pub const BUILD_ARGS: &str = "KILN_BUILD_ARGS";

pub const FUNCTION_TARGET: &str = "KILN_FUNCTION_TARGET";
pub const FUNCTION_SOURCE: &str = "KILN_FUNCTION_SOURCE";
pub const FUNCTION_SIGNATURE_TYPE: &str = "KILN_FUNCTION_SIGNATURE_TYPE";
/// Launch-time counterpart of [`FUNCTION_TARGET`].
pub const FUNCTION_TARGET_LAUNCH: &str = "FUNCTION_TARGET";
/// Launch-time counterpart of [`FUNCTION_SOURCE`].
pub const FUNCTION_SOURCE_LAUNCH: &str = "FUNCTION_SOURCE";
/// Launch-time counterpart of [`FUNCTION_SIGNATURE_TYPE`].
pub const FUNCTION_SIGNATURE_TYPE_LAUNCH: &str = "FUNCTION_SIGNATURE_TYPE";

/// Variables with this prefix become image labels: `KILN_LABEL_FOO_BAR=x`
/// yields the label `kiln.foo-bar=x`.
pub const LABEL_PREFIX: &str = "KILN_LABEL_";
const LABEL_NAMESPACE: &str = "kiln.";

/// Snapshot of the platform environment for one engine run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformEnv {
    vars: BTreeMap<String, String>,
}

impl PlatformEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the current process environment. This is the single place the
    /// engine reads ambient state.
    pub fn from_process_env() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    #[must_use]
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Non-empty value of `name`, mirroring how an unset and an empty variable
    /// are treated alike by most buildpacks.
    pub fn non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| !v.is_empty())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    pub fn debug_mode(&self) -> Result<bool, SchemaError> {
        self.flag(DEBUG_MODE)
    }

    pub fn dev_mode(&self) -> Result<bool, SchemaError> {
        self.flag(DEV_MODE)
    }

    /// `false` when absent; otherwise the value must parse as a boolean.
    pub fn flag(&self, name: &str) -> Result<bool, SchemaError> {
        match self.get(name) {
            None => Ok(false),
            Some(value) => parse_bool(value).ok_or_else(|| SchemaError::InvalidBool {
                var: name.to_owned(),
                value: value.to_owned(),
            }),
        }
    }

    /// Image labels derived from `KILN_LABEL_*` variables, sorted by key.
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.vars
            .iter()
            .filter_map(|(k, v)| {
                let rest = k.strip_prefix(LABEL_PREFIX)?;
                if rest.is_empty() {
                    return None;
                }
                let key = rest.to_ascii_lowercase().replace('_', "-");
                Some((format!("{LABEL_NAMESPACE}{key}"), v.clone()))
            })
            .collect()
    }
}

impl FromIterator<(String, String)> for PlatformEnv {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}

/// `1 t T TRUE true True` and `0 f F FALSE false False`; nothing else.
fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_flag_is_false() {
        let env = PlatformEnv::new();
        assert!(!env.dev_mode().unwrap());
        assert!(!env.debug_mode().unwrap());
    }

    #[test]
    fn flag_spellings() {
        for v in ["1", "t", "TRUE", "true", "True"] {
            let env = PlatformEnv::new().with_var(DEV_MODE, v);
            assert!(env.dev_mode().unwrap(), "{v} should be true");
        }
        for v in ["0", "f", "FALSE", "false", "False"] {
            let env = PlatformEnv::new().with_var(DEV_MODE, v);
            assert!(!env.dev_mode().unwrap(), "{v} should be false");
        }
    }

    #[test]
    fn invalid_flag_is_an_error() {
        let env = PlatformEnv::new().with_var(DEBUG_MODE, "yes");
        let err = env.debug_mode().unwrap_err();
        assert!(err.to_string().contains(DEBUG_MODE));
        assert!(err.to_string().contains("yes"));
    }

    #[test]
    fn labels_are_normalized() {
        let env = PlatformEnv::new()
            .with_var("KILN_LABEL_BUILD_ID", "42")
            .with_var("KILN_LABEL_Team", "infra")
            .with_var("KILN_LABEL_", "ignored")
            .with_var("OTHER", "x");
        let labels = env.labels();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels["kiln.build-id"], "42");
        assert_eq!(labels["kiln.team"], "infra");
    }

    #[test]
    fn non_empty_filters_empty_values() {
        let env = PlatformEnv::new()
            .with_var(FUNCTION_TARGET, "")
            .with_var(RUNTIME, "python");
        assert_eq!(env.non_empty(FUNCTION_TARGET), None);
        assert!(env.contains(FUNCTION_TARGET));
        assert_eq!(env.non_empty(RUNTIME), Some("python"));
    }

    #[test]
    fn collect_from_pairs() {
        let env: PlatformEnv = vec![("A".to_owned(), "1".to_owned())].into_iter().collect();
        assert_eq!(env.get("A"), Some("1"));
    }
}
