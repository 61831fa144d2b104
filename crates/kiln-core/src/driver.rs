//! The two-phase driver.
//!
//! For each module: one detect call with a fresh detect context; on opt-in,
//! one build call with a fresh build context over the same application
//! directory; on success, flush. The outcome is mapped to an exit code and
//! the failure reason, if any, is written to the output stream exactly once.
//! A failed build still deletes its scratch layers; an opt-out removes the
//! plan and launch/build files an earlier run of the same module left.

use crate::context::{remove_stale, Context};
use crate::detect::DetectResult;
use crate::error::{BuildpackError, EXIT_SUCCESS};
use crate::lifecycle::{Lifecycle, Phase};
use crate::report::{ErrorReport, GroupReport, ModuleReport, Outcome, Stage};
use crate::{write_atomic, CoreError};
use kiln_schema::{BuildpackId, PlatformEnv};
use kiln_store::StoreLayout;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// The capability every buildpack module provides.
pub trait Buildpack {
    fn detect(&self, ctx: &mut Context) -> Result<DetectResult, BuildpackError>;
    fn build(&self, ctx: &mut Context) -> Result<(), BuildpackError>;
}

pub struct Driver {
    layout: StoreLayout,
    app_dir: PathBuf,
    platform: PlatformEnv,
}

impl Driver {
    pub fn new(root: impl Into<PathBuf>, app_dir: impl Into<PathBuf>, platform: PlatformEnv) -> Self {
        Self {
            layout: StoreLayout::new(root),
            app_dir: app_dir.into(),
            platform,
        }
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn app_dir(&self) -> &Path {
        &self.app_dir
    }

    /// Full lifecycle for one module.
    pub fn run(&self, id: &str, buildpack: &dyn Buildpack, out: &mut dyn Write) -> ModuleReport {
        self.invoke(id, buildpack, out, true)
    }

    /// Detection only. An opt-in ends the run as [`Outcome::OptedIn`].
    pub fn detect(&self, id: &str, buildpack: &dyn Buildpack, out: &mut dyn Write) -> ModuleReport {
        self.invoke(id, buildpack, out, false)
    }

    /// Run modules one after another in the given order, stopping at the
    /// first failure.
    pub fn run_group(
        &self,
        modules: &[(&str, &dyn Buildpack)],
        out: &mut dyn Write,
    ) -> GroupReport {
        let mut reports = Vec::with_capacity(modules.len());
        for (id, buildpack) in modules {
            let report = self.run(id, *buildpack, out);
            let failed = report.failed();
            reports.push(report);
            if failed {
                debug!(buildpack = %id, "stopping group after failure");
                break;
            }
        }
        GroupReport::new(reports)
    }

    fn invoke(
        &self,
        id: &str,
        buildpack: &dyn Buildpack,
        out: &mut dyn Write,
        build: bool,
    ) -> ModuleReport {
        let mut report = ModuleReport::new(id);
        let mut lifecycle = Lifecycle::new();

        let result = self.phases(id, buildpack, out, build, &mut lifecycle, &mut report);
        match result {
            Ok(outcome) => {
                report.outcome = outcome;
                report.exit_code = EXIT_SUCCESS;
            }
            Err(err) => {
                let stage = match lifecycle.current() {
                    Phase::Detecting => Stage::Detect,
                    Phase::Building => Stage::Build,
                    _ => Stage::Setup,
                };
                if !lifecycle.fail() {
                    debug!(buildpack = %id, phase = %lifecycle.current(), "failed before detection");
                }
                if let Err(e) = writeln!(out, "[{id}] {stage} failed: {err}") {
                    warn!("cannot write failure line: {e}");
                }
                debug!(buildpack = %id, kind = %err.kind(), %stage, "module failed");
                report.outcome = Outcome::Failed;
                report.exit_code = err.exit_code();
                report.failed_stage = Some(stage);
                report.error = Some(ErrorReport::from(&err));
            }
        }
        report.phases = lifecycle.visited().to_vec();
        report
    }

    fn phases(
        &self,
        id: &str,
        buildpack: &dyn Buildpack,
        out: &mut dyn Write,
        build: bool,
        lifecycle: &mut Lifecycle,
        report: &mut ModuleReport,
    ) -> Result<Outcome, BuildpackError> {
        let bp_id = BuildpackId::parse(id).map_err(CoreError::from)?;
        self.layout.initialize().map_err(CoreError::from)?;

        lifecycle.advance(Phase::Detecting)?;
        let started = Instant::now();
        let mut ctx = Context::for_detect(
            &self.layout,
            bp_id.clone(),
            &self.app_dir,
            self.platform.clone(),
        )?;
        let detected = buildpack.detect(&mut ctx);
        report.detect = Some(ctx.phase_report(started.elapsed()));
        drop(ctx);
        let detected = detected?;
        report.detect_reason = Some(detected.reason().to_owned());

        let plan_path = self.layout.plan_file(&bp_id);
        match &detected {
            DetectResult::OptOut { reason } => {
                remove_stale(&plan_path)?;
                remove_stale(&self.layout.launch_file(&bp_id))?;
                remove_stale(&self.layout.build_file(&bp_id))?;
                lifecycle.advance(Phase::OptedOut)?;
                info!(buildpack = %id, "opted out: {reason}");
                if let Err(e) = writeln!(out, "[{id}] opted out: {reason}") {
                    warn!("cannot write opt-out line: {e}");
                }
                return Ok(Outcome::OptedOut);
            }
            DetectResult::OptIn { reason, plan } => {
                match plan {
                    Some(plan) => {
                        let text = toml::to_string(plan).map_err(CoreError::from)?;
                        write_atomic(&plan_path, text.as_bytes())?;
                    }
                    None => remove_stale(&plan_path)?,
                }
                lifecycle.advance(Phase::OptedIn)?;
                info!(buildpack = %id, "opted in: {reason}");
            }
        }
        if !build {
            return Ok(Outcome::OptedIn);
        }

        lifecycle.advance(Phase::Building)?;
        let started = Instant::now();
        let mut ctx = Context::for_build(&self.layout, bp_id, &self.app_dir, self.platform.clone())?;
        let built = buildpack.build(&mut ctx);
        report.build = Some(ctx.phase_report(started.elapsed()));
        if let Err(err) = built {
            match ctx.discard() {
                Ok(removed) => report.removed_layers = removed,
                Err(e) => warn!(buildpack = %id, "cannot discard scratch layers: {e}"),
            }
            return Err(err);
        }

        let summary = ctx.finish()?;
        report.launch_layers = summary.launch_layers;
        report.removed_layers = summary.removed_layers;
        report.bom = summary.bom.entries().to_vec();
        lifecycle.advance(Phase::Succeeded)?;
        info!(buildpack = %id, "build succeeded");
        Ok(Outcome::Succeeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{user_error, LayerFlag, EXIT_INTERNAL_ERROR, EXIT_USER_ERROR};
    use kiln_schema::{BomEntry, BuildPlan};
    use std::cell::Cell;

    #[derive(Default)]
    struct Scripted {
        opt_in: bool,
        detect_error: bool,
        build_error: Option<bool>,
        builds: Cell<u32>,
    }

    impl Buildpack for Scripted {
        fn detect(&self, _ctx: &mut Context) -> Result<DetectResult, BuildpackError> {
            if self.detect_error {
                return Err(user_error!("invalid global.json"));
            }
            Ok(if self.opt_in {
                DetectResult::opt_in("found app.csproj")
                    .with_build_plan(BuildPlan::provides_and_requires("dotnet"))
            } else {
                DetectResult::opt_out("no project file")
            })
        }

        fn build(&self, ctx: &mut Context) -> Result<(), BuildpackError> {
            self.builds.set(self.builds.get() + 1);
            let layer = ctx.layer("sdk", &[LayerFlag::Cache, LayerFlag::Launch])?;
            ctx.add_bom_entry(BomEntry::new("dotnet-sdk").launch(true));
            match self.build_error {
                Some(true) => Err(user_error!("no project file in {}", layer.path().display())),
                Some(false) => Err(std::io::Error::other("disk full").into()),
                None => Ok(()),
            }
        }
    }

    fn driver() -> (tempfile::TempDir, tempfile::TempDir, Driver) {
        let root = tempfile::tempdir().unwrap();
        let app = tempfile::tempdir().unwrap();
        let driver = Driver::new(root.path(), app.path(), PlatformEnv::new());
        (root, app, driver)
    }

    #[test]
    fn opt_out_never_builds() {
        let (_r, _a, driver) = driver();
        let bp = Scripted::default();
        let mut out = Vec::new();
        let report = driver.run("dotnet", &bp, &mut out);
        assert_eq!(bp.builds.get(), 0);
        assert_eq!(report.outcome, Outcome::OptedOut);
        assert_eq!(report.exit_code, EXIT_SUCCESS);
        assert_eq!(report.phases, [Phase::Start, Phase::Detecting, Phase::OptedOut]);
        assert!(String::from_utf8(out).unwrap().contains("opted out"));
    }

    #[test]
    fn opt_in_builds_once_and_writes_plan() {
        let (_r, _a, driver) = driver();
        let bp = Scripted {
            opt_in: true,
            ..Scripted::default()
        };
        let report = driver.run("dotnet", &bp, &mut Vec::new());
        assert_eq!(bp.builds.get(), 1);
        assert_eq!(report.outcome, Outcome::Succeeded);
        assert_eq!(report.launch_layers, ["sdk"]);
        let id = BuildpackId::parse("dotnet").unwrap();
        assert!(driver.layout().plan_file(&id).exists());
    }

    #[test]
    fn detect_only_stops_after_opt_in() {
        let (_r, _a, driver) = driver();
        let bp = Scripted {
            opt_in: true,
            ..Scripted::default()
        };
        let report = driver.detect("dotnet", &bp, &mut Vec::new());
        assert_eq!(bp.builds.get(), 0);
        assert_eq!(report.outcome, Outcome::OptedIn);
        assert_eq!(report.exit_code, EXIT_SUCCESS);
    }

    #[test]
    fn user_and_internal_failures_have_distinct_codes() {
        let (_r, _a, driver) = driver();
        let user = Scripted {
            opt_in: true,
            build_error: Some(true),
            ..Scripted::default()
        };
        let internal = Scripted {
            opt_in: true,
            build_error: Some(false),
            ..Scripted::default()
        };
        let u = driver.run("dotnet", &user, &mut Vec::new());
        let i = driver.run("dotnet", &internal, &mut Vec::new());
        assert_eq!(u.exit_code, EXIT_USER_ERROR);
        assert_eq!(i.exit_code, EXIT_INTERNAL_ERROR);
        assert_ne!(u.exit_code, i.exit_code);
        assert_eq!(u.phases.last(), Some(&Phase::Failed));
    }

    #[test]
    fn failure_line_is_written_once() {
        let (_r, _a, driver) = driver();
        let bp = Scripted {
            opt_in: true,
            build_error: Some(false),
            ..Scripted::default()
        };
        let mut out = Vec::new();
        driver.run("dotnet", &bp, &mut out);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("disk full").count(), 1);
        assert!(text.contains("(internal)"));
    }

    #[test]
    fn detect_failure_skips_build() {
        let (_r, _a, driver) = driver();
        let bp = Scripted {
            detect_error: true,
            ..Scripted::default()
        };
        let report = driver.run("dotnet", &bp, &mut Vec::new());
        assert_eq!(bp.builds.get(), 0);
        assert_eq!(report.exit_code, EXIT_USER_ERROR);
        assert_eq!(report.phases, [Phase::Start, Phase::Detecting, Phase::Failed]);
    }

    #[test]
    fn group_stops_at_first_failure() {
        let (_r, _a, driver) = driver();
        let ok = Scripted {
            opt_in: true,
            ..Scripted::default()
        };
        let bad = Scripted {
            opt_in: true,
            build_error: Some(true),
            ..Scripted::default()
        };
        let never = Scripted {
            opt_in: true,
            ..Scripted::default()
        };
        let modules: [(&str, &dyn Buildpack); 3] =
            [("dotnet", &ok), ("python", &bad), ("go", &never)];
        let group = driver.run_group(&modules, &mut Vec::new());
        assert_eq!(group.modules.len(), 2);
        assert_eq!(never.builds.get(), 0);
        assert_eq!(group.exit_code, EXIT_USER_ERROR);
    }

    #[test]
    fn invalid_buildpack_id_is_internal_failure() {
        let (_r, _a, driver) = driver();
        let report = driver.run("../evil", &Scripted::default(), &mut Vec::new());
        assert_eq!(report.exit_code, EXIT_INTERNAL_ERROR);
        assert_eq!(report.phases, [Phase::Start]);
        assert_eq!(report.failed_stage, Some(Stage::Setup));
        assert_eq!(report.outcome, Outcome::Failed);
    }
}
