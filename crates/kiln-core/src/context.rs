//! The execution context handed to a buildpack module.
//!
//! One `Context` exists per module per phase. A detect context has no layer
//! store; asking it for layers is an internal error. A build context owns the
//! module's [`LayerStore`] and is flushed by [`Context::finish`] once the
//! build function has returned successfully.

use crate::detect::DetectResult;
use crate::error::BuildpackError;
use crate::exec::{self, display_command, tail_lines, ExecOptions, ExecResult, ExecTiming};
use crate::http::HttpProbe;
use crate::report::PhaseReport;
use crate::{glob, user_error, write_atomic, CoreError};
use kiln_schema::platform::{
    ENTRYPOINT, FUNCTION_SIGNATURE_TYPE, FUNCTION_SIGNATURE_TYPE_LAUNCH, FUNCTION_SOURCE,
    FUNCTION_SOURCE_LAUNCH, FUNCTION_TARGET, FUNCTION_TARGET_LAUNCH, RUNTIME,
};
use kiln_schema::{
    BomEntry, BomLedger, BuildDescription, BuildpackId, LaunchDescription, PlatformEnv, Process,
    WEB_PROCESS,
};
use kiln_store::{Environment, LayerEnv, LayerFlag, LayerHandle, LayerStore, StoreLayout};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextMode {
    Detect,
    Build,
}

impl ContextMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ContextMode::Detect => "detect",
            ContextMode::Build => "build",
        }
    }
}

/// What [`Context::finish`] wrote.
#[derive(Debug, Clone, Default)]
pub struct FlushSummary {
    pub launch_layers: Vec<String>,
    pub removed_layers: Vec<String>,
    pub bom: BomLedger,
}

pub struct Context {
    mode: ContextMode,
    buildpack: BuildpackId,
    app_dir: PathBuf,
    platform: PlatformEnv,
    debug_mode: bool,
    dev_mode: bool,
    layout: StoreLayout,
    layers: Option<LayerStore>,
    bom: BomLedger,
    launch: LaunchDescription,
    exec_env: BTreeMap<String, String>,
    timings: Vec<ExecTiming>,
    cache_hits: Vec<String>,
    cache_misses: Vec<String>,
    http: HttpProbe,
}

impl Context {
    pub fn for_detect(
        layout: &StoreLayout,
        buildpack: BuildpackId,
        app_dir: impl Into<PathBuf>,
        platform: PlatformEnv,
    ) -> Result<Self, CoreError> {
        Self::new(ContextMode::Detect, layout, buildpack, app_dir.into(), platform)
    }

    pub fn for_build(
        layout: &StoreLayout,
        buildpack: BuildpackId,
        app_dir: impl Into<PathBuf>,
        platform: PlatformEnv,
    ) -> Result<Self, CoreError> {
        Self::new(ContextMode::Build, layout, buildpack, app_dir.into(), platform)
    }

    fn new(
        mode: ContextMode,
        layout: &StoreLayout,
        buildpack: BuildpackId,
        app_dir: PathBuf,
        platform: PlatformEnv,
    ) -> Result<Self, CoreError> {
        let debug_mode = platform.debug_mode()?;
        let dev_mode = platform.dev_mode()?;
        let layers = match mode {
            ContextMode::Detect => None,
            ContextMode::Build => Some(LayerStore::new(
                layout.clone(),
                buildpack.clone(),
                dev_mode,
            )?),
        };
        Ok(Self {
            mode,
            buildpack,
            app_dir,
            platform,
            debug_mode,
            dev_mode,
            layout: layout.clone(),
            layers,
            bom: BomLedger::new(),
            launch: LaunchDescription::default(),
            exec_env: BTreeMap::new(),
            timings: Vec::new(),
            cache_hits: Vec::new(),
            cache_misses: Vec::new(),
            http: HttpProbe::new(),
        })
    }

    pub fn mode(&self) -> ContextMode {
        self.mode
    }

    pub fn buildpack_id(&self) -> &BuildpackId {
        &self.buildpack
    }

    pub fn app_dir(&self) -> &Path {
        &self.app_dir
    }

    pub fn platform(&self) -> &PlatformEnv {
        &self.platform
    }

    pub fn debug_mode(&self) -> bool {
        self.debug_mode
    }

    pub fn dev_mode(&self) -> bool {
        self.dev_mode
    }

    pub fn bom(&self) -> &BomLedger {
        &self.bom
    }

    pub fn launch(&self) -> &LaunchDescription {
        &self.launch
    }

    pub fn timings(&self) -> &[ExecTiming] {
        &self.timings
    }

    pub fn cache_hits(&self) -> &[String] {
        &self.cache_hits
    }

    pub fn cache_misses(&self) -> &[String] {
        &self.cache_misses
    }

    // --- logging ---

    pub fn logf(&self, msg: impl fmt::Display) {
        info!(buildpack = %self.buildpack, "{msg}");
    }

    pub fn warnf(&self, msg: impl fmt::Display) {
        warn!(buildpack = %self.buildpack, "{msg}");
    }

    pub fn debugf(&self, msg: impl fmt::Display) {
        debug!(buildpack = %self.buildpack, "{msg}");
    }

    // --- files ---

    /// `path` relative to the application directory; absolute paths pass
    /// through unchanged.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.app_dir.join(path)
        }
    }

    pub fn file_exists(&self, path: impl AsRef<Path>) -> Result<bool, BuildpackError> {
        let path = self.resolve(path);
        Ok(path.try_exists().map_err(file_error(&path))?)
    }

    /// Paths under the application directory matching `pattern`, relative to
    /// it and sorted.
    pub fn glob(&self, pattern: &str) -> Result<Vec<String>, BuildpackError> {
        Ok(glob::glob(&self.app_dir, pattern)?)
    }

    pub fn read_file(&self, path: impl AsRef<Path>) -> Result<Vec<u8>, BuildpackError> {
        let path = self.resolve(path);
        Ok(fs::read(&path).map_err(file_error(&path))?)
    }

    pub fn read_to_string(&self, path: impl AsRef<Path>) -> Result<String, BuildpackError> {
        let path = self.resolve(path);
        Ok(fs::read_to_string(&path).map_err(file_error(&path))?)
    }

    pub fn write_file(
        &self,
        path: impl AsRef<Path>,
        contents: impl AsRef<[u8]>,
    ) -> Result<(), BuildpackError> {
        let path = self.resolve(path);
        Ok(fs::write(&path, contents).map_err(file_error(&path))?)
    }

    pub fn create_file(&self, path: impl AsRef<Path>) -> Result<fs::File, BuildpackError> {
        let path = self.resolve(path);
        Ok(fs::File::create(&path).map_err(file_error(&path))?)
    }

    pub fn mkdir_all(&self, path: impl AsRef<Path>) -> Result<(), BuildpackError> {
        let path = self.resolve(path);
        Ok(fs::create_dir_all(&path).map_err(file_error(&path))?)
    }

    /// Remove a file or a directory tree. A missing path is not an error.
    pub fn remove_all(&self, path: impl AsRef<Path>) -> Result<(), BuildpackError> {
        let path = self.resolve(path);
        let result = match path.symlink_metadata() {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(&path),
            Ok(_) => fs::remove_file(&path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        };
        Ok(result.map_err(file_error(&path))?)
    }

    pub fn rename(
        &self,
        from: impl AsRef<Path>,
        to: impl AsRef<Path>,
    ) -> Result<(), BuildpackError> {
        let from = self.resolve(from);
        let to = self.resolve(to);
        Ok(fs::rename(&from, &to).map_err(file_error(&from))?)
    }

    /// A temporary directory removed when the returned guard is dropped.
    pub fn temp_dir(&self, prefix: &str) -> Result<TempDir, BuildpackError> {
        Ok(tempfile::Builder::new()
            .prefix(prefix)
            .tempdir()
            .map_err(CoreError::from)?)
    }

    pub fn http_status(&self, url: &str) -> Result<u16, BuildpackError> {
        let code = self.http.status(url)?;
        debug!(url, code, "http status");
        Ok(code)
    }

    // --- processes ---

    /// Set a variable for every subprocess started from this context.
    pub fn set_exec_env(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.exec_env.insert(name.into(), value.into());
    }

    fn subprocess_env(&self) -> BTreeMap<String, String> {
        let mut env = self.platform.vars().clone();
        env.extend(
            self.exec_env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        env
    }

    /// Run a command and fail on a non-zero exit.
    ///
    /// The failure is a user error when `opts` is [`ExecOptions::user`], an
    /// internal error otherwise. Either way the message carries the tail of
    /// the command's output.
    pub fn exec(&mut self, argv: &[&str], opts: ExecOptions) -> Result<ExecResult, BuildpackError> {
        let attribution = opts.attribution;
        let result = self.exec_unchecked(argv, opts)?;
        if result.success() {
            return Ok(result);
        }
        let err = CoreError::CommandFailed {
            command: display_command(argv),
            status: result.status_description(),
            output_tail: result.failure_tail(),
        };
        if attribution.failure_is_user() {
            Err(BuildpackError::user(err.to_string()).with_source(err))
        } else {
            Err(err.into())
        }
    }

    /// Run a command and return its result whatever the exit status. Only a
    /// failure to start the process is an error.
    pub fn exec_unchecked(
        &mut self,
        argv: &[&str],
        opts: ExecOptions,
    ) -> Result<ExecResult, BuildpackError> {
        let env = self.subprocess_env();
        let result = exec::run(argv, &self.app_dir, &env, &opts)?;

        self.timings.push(ExecTiming {
            command: display_command(argv),
            attribution: opts.attribution,
            duration_ms: result.duration.as_millis() as u64,
        });

        if let Some(lines) = opts.stdout_tail {
            let tail = tail_lines(&result.stdout, lines);
            if !tail.is_empty() {
                info!(buildpack = %self.buildpack, "{tail}");
            }
        }
        Ok(result)
    }

    // --- layers ---

    fn store(&self, operation: &'static str) -> Result<&LayerStore, CoreError> {
        self.layers.as_ref().ok_or(CoreError::WrongMode {
            operation,
            mode: self.mode.as_str(),
        })
    }

    fn store_mut(&mut self, operation: &'static str) -> Result<&mut LayerStore, CoreError> {
        let mode = self.mode.as_str();
        self.layers
            .as_mut()
            .ok_or(CoreError::WrongMode { operation, mode })
    }

    /// Attach a layer. See [`LayerStore::layer`] for the idempotence and
    /// conflict rules.
    pub fn layer(&mut self, name: &str, flags: &[LayerFlag]) -> Result<LayerHandle, BuildpackError> {
        let store = self.store_mut("layer")?;
        Ok(store.layer(name, flags).map_err(CoreError::from)?)
    }

    /// Stored metadata value, `""` when absent.
    pub fn get_metadata(&self, layer: &LayerHandle, key: &str) -> Result<String, BuildpackError> {
        let store = self.store("get_metadata")?;
        Ok(store.metadata(layer, key).map_err(CoreError::from)?)
    }

    /// Stored metadata value, `None` when absent.
    pub fn try_metadata(
        &self,
        layer: &LayerHandle,
        key: &str,
    ) -> Result<Option<String>, BuildpackError> {
        let store = self.store("try_metadata")?;
        Ok(store.try_metadata(layer, key).map_err(CoreError::from)?)
    }

    pub fn set_metadata(
        &self,
        layer: &LayerHandle,
        key: &str,
        value: &str,
    ) -> Result<(), BuildpackError> {
        let store = self.store("set_metadata")?;
        Ok(store.set_metadata(layer, key, value).map_err(CoreError::from)?)
    }

    /// Drop `key` from the layer's metadata. Returns whether it was present.
    pub fn remove_metadata(&self, layer: &LayerHandle, key: &str) -> Result<bool, BuildpackError> {
        let store = self.store("remove_metadata")?;
        Ok(store.remove_metadata(layer, key).map_err(CoreError::from)?)
    }

    pub fn clear_layer(&mut self, layer: &LayerHandle) -> Result<(), BuildpackError> {
        let store = self.store_mut("clear_layer")?;
        Ok(store.clear(layer).map_err(CoreError::from)?)
    }

    pub fn env_mut(&mut self, layer: &LayerHandle) -> Result<&mut LayerEnv, BuildpackError> {
        let store = self.store_mut("env")?;
        Ok(store.env_mut(layer).map_err(CoreError::from)?)
    }

    pub fn build_env(&mut self, layer: &LayerHandle) -> Result<&mut Environment, BuildpackError> {
        Ok(self.env_mut(layer)?.build_mut())
    }

    pub fn launch_env(&mut self, layer: &LayerHandle) -> Result<&mut Environment, BuildpackError> {
        Ok(self.env_mut(layer)?.launch_mut())
    }

    pub fn shared_env(&mut self, layer: &LayerHandle) -> Result<&mut Environment, BuildpackError> {
        Ok(self.env_mut(layer)?.shared_mut())
    }

    pub fn cache_hit(&mut self, layer: &str) {
        info!(buildpack = %self.buildpack, layer, "cache hit");
        self.cache_hits.push(layer.to_owned());
    }

    pub fn cache_miss(&mut self, layer: &str) {
        info!(buildpack = %self.buildpack, layer, "cache miss");
        self.cache_misses.push(layer.to_owned());
    }

    // --- bill of materials and launch ---

    pub fn add_bom_entry(&mut self, entry: BomEntry) {
        self.bom.push(entry);
    }

    /// Register a launch process, replacing any earlier process of the same
    /// type. A non-empty `KILN_ENTRYPOINT` replaces the command of `web`.
    pub fn add_process(&mut self, mut process: Process) {
        if process.kind == WEB_PROCESS {
            if let Some(entrypoint) = self.platform.non_empty(ENTRYPOINT) {
                info!(buildpack = %self.buildpack, entrypoint, "using {ENTRYPOINT} for the web process");
                process.command = vec!["/bin/sh".to_owned(), "-c".to_owned(), entrypoint.to_owned()];
            }
        }
        debug!(kind = %process.kind, command = ?process.command, "process registered");
        self.launch.set_process(process);
    }

    pub fn add_web_process(&mut self, command: Vec<String>) {
        self.add_process(Process::new(WEB_PROCESS, command));
    }

    pub fn add_default_web_process(&mut self, command: Vec<String>) {
        self.add_process(Process::new(WEB_PROCESS, command).default_process(true));
    }

    /// Expose the function target, signature type and source to the running
    /// image as launch defaults on `layer`.
    pub fn set_functions_env_vars(&mut self, layer: &LayerHandle) -> Result<(), BuildpackError> {
        let target = self
            .platform
            .non_empty(FUNCTION_TARGET)
            .map(str::to_owned)
            .ok_or_else(|| user_error!("required env var {FUNCTION_TARGET} not found"))?;
        let signature = self.platform.get(FUNCTION_SIGNATURE_TYPE).map(str::to_owned);
        let source = self.platform.get(FUNCTION_SOURCE).map(str::to_owned);

        let env = self.launch_env(layer)?;
        env.default_var(FUNCTION_TARGET, &target)
            .default_var(FUNCTION_TARGET_LAUNCH, &target);
        if let Some(signature) = signature {
            env.default_var(FUNCTION_SIGNATURE_TYPE_LAUNCH, signature);
        }
        if let Some(source) = source {
            env.default_var(FUNCTION_SOURCE_LAUNCH, source);
        }
        Ok(())
    }

    /// Detection shortcut for an explicit `KILN_RUNTIME` choice.
    ///
    /// `None` when the variable is unset; otherwise opt in if it names
    /// `runtime` and opt out if it names anything else.
    pub fn check_runtime_override(&self, runtime: &str) -> Option<DetectResult> {
        let requested = self.platform.non_empty(RUNTIME)?;
        if requested == runtime {
            Some(DetectResult::opt_in(format!("{RUNTIME} set to {runtime}")))
        } else {
            Some(DetectResult::opt_out(format!(
                "{RUNTIME} set to {requested}, not {runtime}"
            )))
        }
    }

    // --- reporting and flush ---

    pub(crate) fn phase_report(&self, elapsed: Duration) -> PhaseReport {
        PhaseReport::new(
            elapsed,
            self.timings.clone(),
            self.cache_hits.clone(),
            self.cache_misses.clone(),
        )
    }

    /// Tear down after a failed build: scratch layers are deleted, nothing
    /// else is flushed. A detect context has nothing to discard.
    pub(crate) fn discard(self) -> Result<Vec<String>, CoreError> {
        match self.layers {
            Some(store) => Ok(store.discard_scratch()?),
            None => Ok(Vec::new()),
        }
    }

    /// Flush a successful build: finalize the layer store, then write
    /// `launch.toml` and `build.toml`. Files with nothing to say are removed
    /// so a previous run's output never lingers.
    pub fn finish(self) -> Result<FlushSummary, CoreError> {
        let store = self.layers.ok_or(CoreError::WrongMode {
            operation: "finish",
            mode: self.mode.as_str(),
        })?;
        let finalized = store.finalize()?;

        let launch = LaunchDescription {
            layers: finalized.launch_layers.clone(),
            labels: self.platform.labels(),
            processes: self.launch.processes,
            bom: self.bom.launch_entries().cloned().collect(),
        };
        let launch_path = self.layout.launch_file(&self.buildpack);
        if launch.is_empty() {
            remove_stale(&launch_path)?;
        } else {
            write_atomic(&launch_path, toml::to_string(&launch)?.as_bytes())?;
        }

        let build = BuildDescription {
            bom: self.bom.build_entries().cloned().collect(),
        };
        let build_path = self.layout.build_file(&self.buildpack);
        if build.bom.is_empty() {
            remove_stale(&build_path)?;
        } else {
            write_atomic(&build_path, toml::to_string(&build)?.as_bytes())?;
        }

        debug!(
            buildpack = %self.buildpack,
            launch_layers = finalized.launch_layers.len(),
            removed = finalized.removed.len(),
            bom = self.bom.len(),
            "build flushed"
        );
        Ok(FlushSummary {
            launch_layers: finalized.launch_layers,
            removed_layers: finalized.removed,
            bom: self.bom,
        })
    }
}

fn file_error(path: &Path) -> impl FnOnce(std::io::Error) -> CoreError + '_ {
    move |source| CoreError::File {
        path: path.display().to_string(),
        source,
    }
}

pub(crate) fn remove_stale(path: &Path) -> Result<(), CoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(CoreError::File {
            path: path.display().to_string(),
            source,
        }),
    }
}
