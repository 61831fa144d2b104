//! Build-plan contributions made during detection.
//!
//! The engine only records these; matching `requires` against `provides`
//! across buildpacks is the job of an external plan resolver.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Provide {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Require {
    pub name: String,
    #[serde(default, skip_serializing_if = "toml::Table::is_empty")]
    pub metadata: toml::Table,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BuildPlan {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provides: Vec<Provide>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<Require>,
}

impl BuildPlan {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn provides(mut self, name: impl Into<String>) -> Self {
        self.provides.push(Provide { name: name.into() });
        self
    }

    #[must_use]
    pub fn requires(mut self, name: impl Into<String>) -> Self {
        self.requires.push(Require {
            name: name.into(),
            metadata: toml::Table::new(),
        });
        self
    }

    #[must_use]
    pub fn requires_with(mut self, name: impl Into<String>, metadata: toml::Table) -> Self {
        self.requires.push(Require {
            name: name.into(),
            metadata,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.provides.is_empty() && self.requires.is_empty()
    }

    /// Convenience for the common "this buildpack both provides and requires
    /// `name`" plan.
    pub fn provides_and_requires(name: &str) -> Self {
        Self::new().provides(name).requires(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_preserves_order() {
        let plan = BuildPlan::new().provides("a").provides("b").requires("a");
        assert_eq!(plan.provides[0].name, "a");
        assert_eq!(plan.provides[1].name, "b");
        assert_eq!(plan.requires.len(), 1);
    }

    #[test]
    fn toml_shape() {
        let mut meta = toml::Table::new();
        meta.insert("version".to_owned(), toml::Value::String("3.9".to_owned()));
        let plan = BuildPlan::new()
            .provides("python")
            .requires_with("python", meta);
        let text = toml::to_string(&plan).unwrap();
        assert!(text.contains("[[provides]]"));
        assert!(text.contains("[[requires]]"));
        assert!(text.contains("version = \"3.9\""));
        let back: BuildPlan = toml::from_str(&text).unwrap();
        assert_eq!(back, plan);
    }

    #[test]
    fn empty_plan() {
        assert!(BuildPlan::new().is_empty());
        assert!(!BuildPlan::provides_and_requires("pip").is_empty());
    }
}
