//! Process entry point for buildpack binaries.
//!
//! ```no_run
//! use kiln_core::{Buildpack, BuildpackError, Context, DetectResult};
//!
//! struct Python;
//!
//! impl Buildpack for Python {
//!     fn detect(&self, ctx: &mut Context) -> Result<DetectResult, BuildpackError> {
//!         if ctx.file_exists("requirements.txt")? {
//!             Ok(DetectResult::opt_in_file_found("requirements.txt"))
//!         } else {
//!             Ok(DetectResult::opt_out_file_not_found("requirements.txt"))
//!         }
//!     }
//!
//!     fn build(&self, _ctx: &mut Context) -> Result<(), BuildpackError> {
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> std::process::ExitCode {
//!     kiln_core::buildpack_main(&Python)
//! }
//! ```

use crate::driver::{Buildpack, Driver};
use crate::error::{EXIT_INTERNAL_ERROR, EXIT_SUCCESS};
use clap::{Args, Parser, Subcommand};
use kiln_schema::PlatformEnv;
use std::path::PathBuf;
use std::process::ExitCode;

/// Exit code for malformed command lines.
pub const EXIT_USAGE: u8 = 1;

#[derive(Debug, Parser)]
#[command(version, about = "Kiln buildpack")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Detect, then build if the buildpack opts in.
    Run(Target),
    /// Run detection only.
    Detect(Target),
}

#[derive(Debug, Args)]
struct Target {
    /// Application source directory.
    #[arg(long, default_value = ".")]
    app: PathBuf,
    /// Root of the layer store.
    #[arg(long)]
    layers: PathBuf,
    /// Identifier of this buildpack; names its directory under `layers/`.
    #[arg(long)]
    buildpack_id: String,
}

/// Parse the command line, capture the platform environment once, run the
/// requested phases and return the classified exit code.
pub fn buildpack_main(buildpack: &dyn Buildpack) -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let usage_error = e.use_stderr();
            if let Err(print_err) = e.print() {
                eprintln!("error: {print_err}");
            }
            return ExitCode::from(if usage_error { EXIT_USAGE } else { EXIT_SUCCESS });
        }
    };

    let platform = PlatformEnv::from_process_env();
    init_tracing(&platform);

    let mut stderr = std::io::stderr();
    let code = match cli.command {
        Commands::Run(target) => {
            let driver = Driver::new(target.layers, target.app, platform);
            let modules: [(&str, &dyn Buildpack); 1] = [(target.buildpack_id.as_str(), buildpack)];
            let report = driver.run_group(&modules, &mut stderr);
            match report.write(driver.layout()) {
                Ok(()) => report.exit_code,
                Err(e) => {
                    eprintln!("error: (internal) writing report: {e}");
                    EXIT_INTERNAL_ERROR
                }
            }
        }
        Commands::Detect(target) => {
            let driver = Driver::new(target.layers, target.app, platform);
            driver
                .detect(&target.buildpack_id, buildpack, &mut stderr)
                .exit_code
        }
    };
    ExitCode::from(code)
}

fn init_tracing(platform: &PlatformEnv) {
    // An unparsable KILN_DEBUG is reported when the context is created.
    let default_level = if platform.debug_mode().unwrap_or(false) {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("KILN_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_arguments() {
        let cli = Cli::try_parse_from([
            "python",
            "run",
            "--app",
            "/workspace",
            "--layers",
            "/layers",
            "--buildpack-id",
            "python",
        ])
        .unwrap();
        let Commands::Run(target) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(target.app, PathBuf::from("/workspace"));
        assert_eq!(target.buildpack_id, "python");
    }

    #[test]
    fn missing_layers_is_usage_error() {
        let err = Cli::try_parse_from(["python", "detect", "--buildpack-id", "python"])
            .unwrap_err();
        assert!(err.use_stderr());
    }
}
