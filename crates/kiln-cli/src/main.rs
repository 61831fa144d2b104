mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use commands::{open_layout, EXIT_FAILURE, EXIT_STORE_ERROR};
use kiln_store::Scope;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "kiln",
    version,
    about = "Inspect the layers, environments and reports left by Kiln buildpacks"
)]
struct Cli {
    /// Root directory the buildpacks wrote their layers to.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List layers with their flags and cache fingerprint.
    Layers {
        /// Only show layers of this buildpack.
        #[arg(long)]
        buildpack: Option<String>,
    },
    /// Show the environment mutations recorded for a layer.
    Env {
        buildpack: String,
        layer: String,
        /// Only show this scope.
        #[arg(long, value_enum)]
        scope: Option<ScopeArg>,
    },
    /// List bill-of-materials entries from launch.toml and build.toml.
    Bom {
        #[arg(long)]
        buildpack: Option<String>,
    },
    /// Summarize the last run report.
    Report,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ScopeArg {
    Build,
    Launch,
    Shared,
}

impl From<ScopeArg> for Scope {
    fn from(arg: ScopeArg) -> Self {
        match arg {
            ScopeArg::Build => Scope::Build,
            ScopeArg::Launch => Scope::Launch,
            ScopeArg::Shared => Scope::Shared,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("KILN_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let json_output = cli.json;
    let result = open_layout(&cli.root).and_then(|layout| match cli.command {
        Commands::Layers { buildpack } => {
            commands::layers::run(&layout, buildpack.as_deref(), json_output)
        }
        Commands::Env {
            buildpack,
            layer,
            scope,
        } => commands::env::run(&layout, &buildpack, &layer, scope.map(Scope::from), json_output),
        Commands::Bom { buildpack } => commands::bom::run(&layout, buildpack.as_deref(), json_output),
        Commands::Report => commands::report::run(&layout, json_output),
    });

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("store error:") {
                EXIT_STORE_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
