//! Scoped environment mutations attached to a layer.
//!
//! Each layer carries three ordered mutation lists: `build` (visible to later
//! build steps), `launch` (visible to the running image) and `shared` (both).
//! Mutations are kept as a `Vec` in call order and serialized in that order,
//! so replaying the same calls always produces byte-identical files.

use crate::{fsync_dir, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Build,
    Launch,
    Shared,
}

impl Scope {
    pub const ALL: [Scope; 3] = [Scope::Build, Scope::Launch, Scope::Shared];

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Build => "build",
            Scope::Launch => "launch",
            Scope::Shared => "shared",
        }
    }

    fn file_name(self) -> String {
        format!("{}.toml", self.as_str())
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    /// Set only if the variable has no value yet.
    Default,
    /// Replace any previous value.
    Override,
    Append,
    Prepend,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    pub name: String,
    pub verb: Verb,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delim: Option<String>,
}

/// Ordered mutations of a single scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default, rename = "mutation")]
    mutations: Vec<Mutation>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mutation: Mutation) -> &mut Self {
        self.mutations.push(mutation);
        self
    }

    pub fn default_var(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.push(Mutation {
            name: name.into(),
            verb: Verb::Default,
            value: value.into(),
            delim: None,
        })
    }

    pub fn override_var(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.push(Mutation {
            name: name.into(),
            verb: Verb::Override,
            value: value.into(),
            delim: None,
        })
    }

    pub fn append_var(
        &mut self,
        name: impl Into<String>,
        delim: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.push(Mutation {
            name: name.into(),
            verb: Verb::Append,
            value: value.into(),
            delim: Some(delim.into()),
        })
    }

    pub fn prepend_var(
        &mut self,
        name: impl Into<String>,
        delim: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.push(Mutation {
            name: name.into(),
            verb: Verb::Prepend,
            value: value.into(),
            delim: Some(delim.into()),
        })
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Replay the mutations in order on top of `base`.
    pub fn apply(&self, base: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut out = base.clone();
        for m in &self.mutations {
            let delim = m.delim.as_deref().unwrap_or("");
            match m.verb {
                Verb::Default => {
                    out.entry(m.name.clone()).or_insert_with(|| m.value.clone());
                }
                Verb::Override => {
                    out.insert(m.name.clone(), m.value.clone());
                }
                Verb::Append => {
                    let next = match out.get(&m.name) {
                        Some(cur) if !cur.is_empty() => format!("{cur}{delim}{}", m.value),
                        _ => m.value.clone(),
                    };
                    out.insert(m.name.clone(), next);
                }
                Verb::Prepend => {
                    let next = match out.get(&m.name) {
                        Some(cur) if !cur.is_empty() => format!("{}{delim}{cur}", m.value),
                        _ => m.value.clone(),
                    };
                    out.insert(m.name.clone(), next);
                }
            }
        }
        out
    }

    pub fn to_toml(&self) -> Result<String, StoreError> {
        Ok(toml::to_string(self)?)
    }

    pub fn from_toml(text: &str) -> Result<Self, StoreError> {
        Ok(toml::from_str(text)?)
    }
}

/// The three scopes of one layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerEnv {
    build: Environment,
    launch: Environment,
    shared: Environment,
}

impl LayerEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(&self, scope: Scope) -> &Environment {
        match scope {
            Scope::Build => &self.build,
            Scope::Launch => &self.launch,
            Scope::Shared => &self.shared,
        }
    }

    pub fn scope_mut(&mut self, scope: Scope) -> &mut Environment {
        match scope {
            Scope::Build => &mut self.build,
            Scope::Launch => &mut self.launch,
            Scope::Shared => &mut self.shared,
        }
    }

    pub fn build_mut(&mut self) -> &mut Environment {
        &mut self.build
    }

    pub fn launch_mut(&mut self) -> &mut Environment {
        &mut self.launch
    }

    pub fn shared_mut(&mut self) -> &mut Environment {
        &mut self.shared
    }

    pub fn is_empty(&self) -> bool {
        self.build.is_empty() && self.launch.is_empty() && self.shared.is_empty()
    }

    /// What a consumer of `scope` actually sees: shared mutations first, then
    /// the scope's own. Asking for `Shared` returns the shared list alone.
    pub fn materialized(&self, scope: Scope) -> Environment {
        let mut env = self.shared.clone();
        match scope {
            Scope::Build => env.mutations.extend(self.build.mutations.iter().cloned()),
            Scope::Launch => env.mutations.extend(self.launch.mutations.iter().cloned()),
            Scope::Shared => {}
        }
        env
    }

    /// Persist the scopes that received mutations in this run.
    ///
    /// Scopes without mutations keep whatever file a previous run left
    /// behind, unless `cleared` is set: a cleared layer's old environment no
    /// longer describes its contents and is removed.
    pub fn write_to(&self, dir: &Path, cleared: bool) -> Result<(), StoreError> {
        fs::create_dir_all(dir)?;
        for scope in Scope::ALL {
            let path = dir.join(scope.file_name());
            let env = self.scope(scope);
            if !env.is_empty() {
                let mut tmp = NamedTempFile::new_in(dir)?;
                tmp.write_all(env.to_toml()?.as_bytes())?;
                tmp.as_file().sync_all()?;
                tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
            } else if cleared && path.exists() {
                fs::remove_file(&path)?;
            }
        }
        fsync_dir(dir)?;
        Ok(())
    }

    /// Load previously persisted scopes. Missing files read as empty.
    pub fn read_from(dir: &Path) -> Result<Self, StoreError> {
        let mut env = Self::new();
        for scope in Scope::ALL {
            let path = dir.join(scope.file_name());
            if path.exists() {
                let text = fs::read_to_string(&path)?;
                *env.scope_mut(scope) =
                    Environment::from_toml(&text).map_err(|e| StoreError::CorruptMetadata {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    })?;
            }
        }
        Ok(env)
    }
}
