use serde::{Deserialize, Serialize};

/// One declared contribution to the build or the final image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BomEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "toml::Table::is_empty")]
    pub metadata: toml::Table,
    #[serde(default)]
    pub build: bool,
    #[serde(default)]
    pub launch: bool,
}

impl BomEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: toml::Table::new(),
            build: false,
            launch: false,
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn build(mut self, build: bool) -> Self {
        self.build = build;
        self
    }

    #[must_use]
    pub fn launch(mut self, launch: bool) -> Self {
        self.launch = launch;
        self
    }
}

/// Append-only ledger. Entries are never merged or deduplicated: the same
/// name may legitimately appear once for build and once for launch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct BomLedger {
    entries: Vec<BomEntry>,
}

impl BomLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: BomEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[BomEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn build_entries(&self) -> impl Iterator<Item = &BomEntry> {
        self.entries.iter().filter(|e| e.build)
    }

    pub fn launch_entries(&self) -> impl Iterator<Item = &BomEntry> {
        self.entries.iter().filter(|e| e.launch)
    }
}
