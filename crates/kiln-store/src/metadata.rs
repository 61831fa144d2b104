use crate::layers::LayerFlags;
use crate::{fsync_dir, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// The `<layer>.toml` side file.
///
/// Holds the layer's flags and its string metadata. Written atomically on
/// every change and verified against an embedded blake3 checksum on read, so
/// a torn or hand-edited file surfaces as an integrity failure rather than as
/// a silent cache hit.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LayerMetadataFile {
    /// blake3 over the file content without this field. `None` for files
    /// written by hand.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default)]
    pub types: LayerFlags,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl LayerMetadataFile {
    fn compute_checksum(&self) -> Result<String, StoreError> {
        let mut copy = self.clone();
        copy.checksum = None;
        let text = toml::to_string(&copy)?;
        Ok(blake3::hash(text.as_bytes()).to_hex().to_string())
    }

    /// Read a side file. `Ok(None)` when it does not exist yet.
    pub fn read(path: &Path) -> Result<Option<Self>, StoreError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        let file: Self = toml::from_str(&content).map_err(|e| StoreError::CorruptMetadata {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        if let Some(ref expected) = file.checksum {
            let actual = file.compute_checksum()?;
            if actual != *expected {
                return Err(StoreError::IntegrityFailure {
                    path: path.display().to_string(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        Ok(Some(file))
    }

    /// Write with a fresh checksum via temp file, fsync and rename.
    pub fn write(&self, path: &Path) -> Result<(), StoreError> {
        let mut with_checksum = self.clone();
        with_checksum.checksum = Some(self.compute_checksum()?);
        let content = toml::to_string(&with_checksum)?;

        let dir = path
            .parent()
            .ok_or_else(|| StoreError::Io(std::io::Error::other("metadata path has no parent")))?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(dir)?;
        Ok(())
    }
}
