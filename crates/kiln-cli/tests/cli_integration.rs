//! CLI subprocess integration tests.
//!
//! These tests seed a layers root by running a buildpack through the driver,
//! then invoke the `kiln` binary against it and check exit codes, table
//! output and JSON output.

use kiln_core::{
    BomEntry, Buildpack, BuildpackError, Context, DetectResult, Driver, LayerFlag, PlatformEnv,
};
use std::path::Path;
use std::process::Command;

struct GoBuildpack;

impl Buildpack for GoBuildpack {
    fn detect(&self, _ctx: &mut Context) -> Result<DetectResult, BuildpackError> {
        Ok(DetectResult::opt_in("found go.mod"))
    }

    fn build(&self, ctx: &mut Context) -> Result<(), BuildpackError> {
        let go = ctx.layer("go", &[LayerFlag::Build, LayerFlag::Cache, LayerFlag::Launch])?;
        ctx.cached_install(&go, "go:1.22.1", |ctx, layer| {
            ctx.write_file(layer.path().join("VERSION"), "go1.22.1")
        })?;
        ctx.shared_env(&go)?.prepend_var("PATH", ":", "/layers/go/go/bin");
        ctx.add_bom_entry(
            BomEntry::new("go")
                .with_metadata("version", "1.22.1")
                .build(true)
                .launch(true),
        );
        Ok(())
    }
}

fn kiln_bin(root: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_kiln"));
    cmd.arg("--root").arg(root);
    cmd
}

fn seeded_root() -> (tempfile::TempDir, tempfile::TempDir) {
    let root = tempfile::tempdir().unwrap();
    let app = tempfile::tempdir().unwrap();
    let driver = Driver::new(root.path(), app.path(), PlatformEnv::new());
    let modules: [(&str, &dyn Buildpack); 1] = [("go", &GoBuildpack)];
    let report = driver.run_group(&modules, &mut Vec::new());
    assert_eq!(report.exit_code, 0, "seed run failed: {report:?}");
    report.write(driver.layout()).unwrap();
    (root, app)
}

#[test]
fn cli_help_lists_commands() {
    let output = Command::new(env!("CARGO_BIN_EXE_kiln"))
        .arg("--help")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for cmd in ["layers", "env", "bom", "report"] {
        assert!(stdout.contains(cmd), "help must list '{cmd}': {stdout}");
    }
}

#[test]
fn cli_missing_root_is_store_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = kiln_bin(&dir.path().join("absent")).arg("layers").output().unwrap();
    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.starts_with("error: store error:"), "{stderr}");
}

#[test]
fn cli_layers_table_shows_fingerprint() {
    let (root, _app) = seeded_root();
    let output = kiln_bin(root.path()).arg("layers").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("FINGERPRINT"));
    assert!(stdout.contains("go:1.22.1"));
    assert!(stdout.contains("build,cache,launch"));
}

#[test]
fn cli_layers_json_is_parseable() {
    let (root, _app) = seeded_root();
    let output = kiln_bin(root.path())
        .args(["--json", "layers", "--buildpack", "go"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["layer"], "go");
    assert_eq!(rows[0]["flags"]["launch"], true);
}

#[test]
fn cli_env_resolves_shared_into_launch() {
    let (root, _app) = seeded_root();
    let output = kiln_bin(root.path())
        .args(["--json", "env", "go", "go", "--scope", "launch"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let views: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(views[0]["scope"], "launch");
    assert_eq!(views[0]["resolved"]["PATH"], "/layers/go/go/bin");
}

#[test]
fn cli_env_unknown_layer_fails() {
    let (root, _app) = seeded_root();
    let output = kiln_bin(root.path())
        .args(["env", "go", "gopath"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn cli_bom_lists_entry_once() {
    let (root, _app) = seeded_root();
    let output = kiln_bin(root.path()).args(["--json", "bom"]).output().unwrap();
    assert!(output.status.success());
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["buildpack"], "go");
    assert_eq!(rows[0]["metadata"]["version"], "1.22.1");
}

#[test]
fn cli_report_summarizes_run() {
    let (root, _app) = seeded_root();
    let output = kiln_bin(root.path()).arg("report").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("exit code: 0"));
    assert!(stdout.contains("succeeded"));
    assert!(stdout.contains("detect: found go.mod"));
}

#[test]
fn cli_report_json_has_cache_miss() {
    let (root, _app) = seeded_root();
    let output = kiln_bin(root.path())
        .args(["--json", "report"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["modules"][0]["outcome"], "succeeded");
    assert_eq!(report["modules"][0]["build"]["cache_misses"][0], "go");
}
