use crate::StoreError;
use kiln_schema::{BuildpackId, LayerName};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Current layout version. Incremented on incompatible layout changes.
pub const STORE_FORMAT_VERSION: u32 = 1;
const VERSION_FILE: &str = "version";

/// Names whose side file would collide with a per-buildpack output file.
pub const RESERVED_LAYER_NAMES: [&str; 3] = ["build", "launch", "plan"];

/// Directory layout for a Kiln layers root.
///
/// Every buildpack gets its own directory under `layers/`, and every layer
/// lives at `layers/<buildpack>/<layer>` with its side files next to it. The
/// same buildpack id and layer name always map to the same path, which is
/// what makes cache layers reusable between runs.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreVersion {
    format_version: u32,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn layers_root(&self) -> PathBuf {
        self.root.join("layers")
    }

    #[inline]
    pub fn buildpack_dir(&self, buildpack: &BuildpackId) -> PathBuf {
        self.layers_root().join(buildpack)
    }

    #[inline]
    pub fn layer_dir(&self, buildpack: &BuildpackId, layer: &LayerName) -> PathBuf {
        self.buildpack_dir(buildpack).join(layer)
    }

    /// `<layer>.toml`: flags and the key/value metadata map.
    #[inline]
    pub fn layer_metadata_file(&self, buildpack: &BuildpackId, layer: &LayerName) -> PathBuf {
        self.buildpack_dir(buildpack).join(format!("{layer}.toml"))
    }

    /// `<layer>.env/`: one serialized mutation file per scope.
    #[inline]
    pub fn layer_env_dir(&self, buildpack: &BuildpackId, layer: &LayerName) -> PathBuf {
        self.buildpack_dir(buildpack).join(format!("{layer}.env"))
    }

    #[inline]
    pub fn launch_file(&self, buildpack: &BuildpackId) -> PathBuf {
        self.buildpack_dir(buildpack).join("launch.toml")
    }

    #[inline]
    pub fn build_file(&self, buildpack: &BuildpackId) -> PathBuf {
        self.buildpack_dir(buildpack).join("build.toml")
    }

    #[inline]
    pub fn plan_file(&self, buildpack: &BuildpackId) -> PathBuf {
        self.buildpack_dir(buildpack).join("plan.toml")
    }

    #[inline]
    pub fn report_file(&self) -> PathBuf {
        self.root.join("report.json")
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(self.layers_root())?;

        let version_path = self.root.join(VERSION_FILE);
        if version_path.exists() {
            self.verify_version()?;
        } else {
            let ver = StoreVersion {
                format_version: STORE_FORMAT_VERSION,
            };
            let content = serde_json::to_string_pretty(&ver)?;
            let mut tmp = NamedTempFile::new_in(&self.root)?;
            tmp.write_all(content.as_bytes())?;
            tmp.as_file().sync_all()?;
            tmp.persist(&version_path)
                .map_err(|e| StoreError::Io(e.error))?;
            crate::fsync_dir(&self.root)?;
        }

        Ok(())
    }

    pub fn verify_version(&self) -> Result<(), StoreError> {
        let version_path = self.root.join(VERSION_FILE);
        let content = fs::read_to_string(&version_path)?;
        let ver: StoreVersion = serde_json::from_str(&content)?;

        if ver.format_version != STORE_FORMAT_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: STORE_FORMAT_VERSION,
                found: ver.format_version,
            });
        }
        Ok(())
    }

    /// Buildpack ids that have a directory under `layers/`, sorted.
    pub fn list_buildpacks(&self) -> Result<Vec<String>, StoreError> {
        let dir = self.layers_root();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    if !name.starts_with('.') {
                        ids.push(name.to_owned());
                    }
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Layer names present for `buildpack`, sorted. A layer is any
    /// directory that is not an environment directory.
    pub fn list_layers(&self, buildpack: &BuildpackId) -> Result<Vec<String>, StoreError> {
        let dir = self.buildpack_dir(buildpack);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.ends_with(".env") && LayerName::parse(name).is_ok() {
                    names.push(name.to_owned());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (BuildpackId, LayerName) {
        (
            BuildpackId::parse("dotnet").unwrap(),
            LayerName::parse("sdk").unwrap(),
        )
    }

    #[test]
    fn layout_paths_are_correct() {
        let layout = StoreLayout::new("/tmp/kiln-test");
        let (bp, layer) = ids();
        assert_eq!(layout.layers_root(), PathBuf::from("/tmp/kiln-test/layers"));
        assert_eq!(
            layout.layer_dir(&bp, &layer),
            PathBuf::from("/tmp/kiln-test/layers/dotnet/sdk")
        );
        assert_eq!(
            layout.layer_metadata_file(&bp, &layer),
            PathBuf::from("/tmp/kiln-test/layers/dotnet/sdk.toml")
        );
        assert_eq!(
            layout.layer_env_dir(&bp, &layer),
            PathBuf::from("/tmp/kiln-test/layers/dotnet/sdk.env")
        );
        assert_eq!(
            layout.launch_file(&bp),
            PathBuf::from("/tmp/kiln-test/layers/dotnet/launch.toml")
        );
        assert_eq!(
            layout.report_file(),
            PathBuf::from("/tmp/kiln-test/report.json")
        );
    }

    #[test]
    fn initialize_creates_layers_root() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        assert!(layout.layers_root().is_dir());
    }

    #[test]
    fn initialize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        layout.initialize().unwrap();
        layout.verify_version().unwrap();
    }

    #[test]
    fn version_mismatch_detected() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        fs::write(dir.path().join(VERSION_FILE), r#"{"format_version": 99}"#).unwrap();
        assert!(matches!(
            layout.verify_version(),
            Err(StoreError::VersionMismatch { found: 99, .. })
        ));
    }

    #[test]
    fn list_layers_skips_env_dirs_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        let (bp, _) = ids();
        let bp_dir = layout.buildpack_dir(&bp);
        fs::create_dir_all(bp_dir.join("sdk")).unwrap();
        fs::create_dir_all(bp_dir.join("sdk.env")).unwrap();
        fs::create_dir_all(bp_dir.join("runtime")).unwrap();
        fs::write(bp_dir.join("sdk.toml"), "").unwrap();
        fs::write(bp_dir.join("launch.toml"), "").unwrap();
        assert_eq!(layout.list_layers(&bp).unwrap(), ["runtime", "sdk"]);
    }

    #[test]
    fn list_buildpacks_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        fs::create_dir_all(layout.layers_root().join("python")).unwrap();
        fs::create_dir_all(layout.layers_root().join("dotnet")).unwrap();
        assert_eq!(layout.list_buildpacks().unwrap(), ["dotnet", "python"]);
    }
}
