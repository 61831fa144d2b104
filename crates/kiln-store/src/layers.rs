use crate::env::LayerEnv;
use crate::layout::{StoreLayout, RESERVED_LAYER_NAMES};
use crate::metadata::LayerMetadataFile;
use crate::StoreError;
use kiln_schema::{BuildpackId, LayerName};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerFlag {
    /// Visible to subsequent buildpacks during the build.
    Build,
    /// Kept between builds.
    Cache,
    /// Exported into the final image.
    Launch,
    /// Exported into the final image only when dev mode is on.
    LaunchIfDevMode,
}

/// The flag set of a layer, persisted as `[types]` in the side file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerFlags {
    pub build: bool,
    pub cache: bool,
    pub launch: bool,
    pub launch_if_dev_mode: bool,
}

impl LayerFlags {
    pub fn from_flags(flags: &[LayerFlag]) -> Self {
        let mut out = Self::default();
        for flag in flags {
            match flag {
                LayerFlag::Build => out.build = true,
                LayerFlag::Cache => out.cache = true,
                LayerFlag::Launch => out.launch = true,
                LayerFlag::LaunchIfDevMode => out.launch_if_dev_mode = true,
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn is_launch(&self, dev_mode: bool) -> bool {
        self.launch || (dev_mode && self.launch_if_dev_mode)
    }

    /// Whether the layer outlives the build phase that created it.
    pub fn persists(&self, dev_mode: bool) -> bool {
        self.build || self.cache || self.is_launch(dev_mode)
    }
}

impl fmt::Display for LayerFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.build {
            names.push("build");
        }
        if self.cache {
            names.push("cache");
        }
        if self.launch {
            names.push("launch");
        }
        if self.launch_if_dev_mode {
            names.push("launch-if-dev-mode");
        }
        if names.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&names.join(","))
        }
    }
}

/// Handle to an attached layer. Cheap to clone; all mutation goes through
/// the owning [`LayerStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerHandle {
    name: LayerName,
    path: PathBuf,
    flags: LayerFlags,
}

impl LayerHandle {
    pub fn name(&self) -> &LayerName {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn flags(&self) -> LayerFlags {
        self.flags
    }
}

struct AttachedLayer {
    handle: LayerHandle,
    env: LayerEnv,
    cleared: bool,
}

/// Summary of [`LayerStore::finalize`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalizeReport {
    /// Layers exported into the image, in attach order.
    pub launch_layers: Vec<String>,
    /// Layers deleted because no flag kept them alive.
    pub removed: Vec<String>,
}

/// The layers of one buildpack during one build phase.
///
/// Layers are attached lazily with [`layer`](Self::layer); attaching the same
/// name again returns the same handle. Metadata is read from and written to
/// disk on every call so a crash never loses a completed `set_metadata`.
pub struct LayerStore {
    layout: StoreLayout,
    buildpack: BuildpackId,
    dev_mode: bool,
    attached: Vec<AttachedLayer>,
}

impl LayerStore {
    pub fn new(
        layout: StoreLayout,
        buildpack: BuildpackId,
        dev_mode: bool,
    ) -> Result<Self, StoreError> {
        fs::create_dir_all(layout.buildpack_dir(&buildpack))?;
        Ok(Self {
            layout,
            buildpack,
            dev_mode,
            attached: Vec::new(),
        })
    }

    pub fn buildpack(&self) -> &BuildpackId {
        &self.buildpack
    }

    pub fn dev_mode(&self) -> bool {
        self.dev_mode
    }

    /// Attach (or re-attach) a layer.
    ///
    /// The first call in this store fixes the flags. Repeating the call with
    /// no flags or the identical flags returns the same handle; any other
    /// flag set is a [`StoreError::FlagConflict`].
    pub fn layer(&mut self, name: &str, flags: &[LayerFlag]) -> Result<LayerHandle, StoreError> {
        let name = LayerName::parse(name)?;
        if RESERVED_LAYER_NAMES.contains(&name.as_str()) {
            return Err(StoreError::ReservedName(name.into_inner()));
        }
        let requested = LayerFlags::from_flags(flags);

        if let Some(existing) = self.attached.iter().find(|l| l.handle.name == name) {
            if flags.is_empty() || existing.handle.flags == requested {
                return Ok(existing.handle.clone());
            }
            return Err(StoreError::FlagConflict {
                name: name.into_inner(),
                existing: existing.handle.flags.to_string(),
                requested: requested.to_string(),
            });
        }

        let path = self.layout.layer_dir(&self.buildpack, &name);
        fs::create_dir_all(&path)?;

        let meta_path = self.layout.layer_metadata_file(&self.buildpack, &name);
        let mut file = LayerMetadataFile::read(&meta_path)?.unwrap_or_default();
        if file.types != requested || file.checksum.is_none() {
            file.types = requested;
            file.write(&meta_path)?;
        }

        debug!(layer = %name, flags = %requested, path = %path.display(), "attached layer");
        let handle = LayerHandle {
            name,
            path,
            flags: requested,
        };
        self.attached.push(AttachedLayer {
            handle: handle.clone(),
            env: LayerEnv::new(),
            cleared: false,
        });
        Ok(handle)
    }

    pub fn get(&self, name: &str) -> Option<&LayerHandle> {
        self.attached
            .iter()
            .find(|l| l.handle.name == *name)
            .map(|l| &l.handle)
    }

    pub fn handles(&self) -> impl Iterator<Item = &LayerHandle> {
        self.attached.iter().map(|l| &l.handle)
    }

    fn position(&self, layer: &LayerHandle) -> Result<usize, StoreError> {
        self.attached
            .iter()
            .position(|l| l.handle.name == layer.name && l.handle.path == layer.path)
            .ok_or_else(|| StoreError::LayerNotFound(layer.name.to_string()))
    }

    fn meta_path(&self, layer: &LayerHandle) -> PathBuf {
        self.layout.layer_metadata_file(&self.buildpack, &layer.name)
    }

    /// Stored value for `key`, or `None` when the layer has no such key.
    pub fn try_metadata(&self, layer: &LayerHandle, key: &str) -> Result<Option<String>, StoreError> {
        self.position(layer)?;
        Ok(LayerMetadataFile::read(&self.meta_path(layer))?
            .and_then(|mut f| f.metadata.remove(key)))
    }

    /// Stored value for `key`, or the empty string when absent.
    pub fn metadata(&self, layer: &LayerHandle, key: &str) -> Result<String, StoreError> {
        Ok(self.try_metadata(layer, key)?.unwrap_or_default())
    }

    /// Persist `key = value` immediately.
    pub fn set_metadata(&self, layer: &LayerHandle, key: &str, value: &str) -> Result<(), StoreError> {
        self.position(layer)?;
        let path = self.meta_path(layer);
        let mut file = LayerMetadataFile::read(&path)?.unwrap_or_default();
        file.types = layer.flags;
        file.metadata.insert(key.to_owned(), value.to_owned());
        file.write(&path)?;
        debug!(layer = %layer.name, key, value, "metadata written");
        Ok(())
    }

    /// Drop `key` from the side file. Returns whether it was present.
    pub fn remove_metadata(&self, layer: &LayerHandle, key: &str) -> Result<bool, StoreError> {
        self.position(layer)?;
        let path = self.meta_path(layer);
        let Some(mut file) = LayerMetadataFile::read(&path)? else {
            return Ok(false);
        };
        if file.metadata.remove(key).is_none() {
            return Ok(false);
        }
        file.write(&path)?;
        debug!(layer = %layer.name, key, "metadata removed");
        Ok(true)
    }

    /// Empty the layer directory. The side file, and therefore the stored
    /// metadata, is left untouched.
    pub fn clear(&mut self, layer: &LayerHandle) -> Result<(), StoreError> {
        let idx = self.position(layer)?;
        clear_dir(&layer.path)?;
        self.attached[idx].cleared = true;
        debug!(layer = %layer.name, "layer cleared");
        Ok(())
    }

    pub fn env(&self, layer: &LayerHandle) -> Result<&LayerEnv, StoreError> {
        let idx = self.position(layer)?;
        Ok(&self.attached[idx].env)
    }

    pub fn env_mut(&mut self, layer: &LayerHandle) -> Result<&mut LayerEnv, StoreError> {
        let idx = self.position(layer)?;
        Ok(&mut self.attached[idx].env)
    }

    /// End of the build phase: write environment files, delete layers that
    /// nothing keeps alive, and report which layers go into the image.
    pub fn finalize(self) -> Result<FinalizeReport, StoreError> {
        let mut report = FinalizeReport::default();
        for layer in &self.attached {
            let name = &layer.handle.name;
            let env_dir = self.layout.layer_env_dir(&self.buildpack, name);
            if !layer.handle.flags.persists(self.dev_mode) {
                self.remove_layer(&layer.handle)?;
                report.removed.push(name.to_string());
                continue;
            }
            if !layer.env.is_empty() || (layer.cleared && env_dir.exists()) {
                layer.env.write_to(&env_dir, layer.cleared)?;
            }
            if layer.handle.flags.is_launch(self.dev_mode) {
                report.launch_layers.push(name.to_string());
            }
        }
        Ok(report)
    }

    /// End of a failed build phase: delete the layers nothing keeps alive
    /// and leave everything else as it is. Environment files are not
    /// written.
    pub fn discard_scratch(self) -> Result<Vec<String>, StoreError> {
        let mut removed = Vec::new();
        for layer in &self.attached {
            if !layer.handle.flags.persists(self.dev_mode) {
                self.remove_layer(&layer.handle)?;
                removed.push(layer.handle.name.to_string());
            }
        }
        Ok(removed)
    }

    fn remove_layer(&self, layer: &LayerHandle) -> Result<(), StoreError> {
        let name = &layer.name;
        remove_if_exists(&layer.path)?;
        remove_if_exists(&self.layout.layer_env_dir(&self.buildpack, name))?;
        remove_if_exists(&self.layout.layer_metadata_file(&self.buildpack, name))?;
        debug!(layer = %name, "removed scratch layer");
        Ok(())
    }
}

fn clear_dir(dir: &Path) -> Result<(), StoreError> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<(), StoreError> {
    match path.symlink_metadata() {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path)?,
        Ok(_) => fs::remove_file(path)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            warn!("cannot stat {}: {e}", path.display());
            return Err(e.into());
        }
    }
    Ok(())
}
