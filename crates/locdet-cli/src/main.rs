mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::job::JobSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "locdet",
    about = "Blueprint room detection — submit jobs, run the pipeline, serve the API",
    version,
    propagate_version = true
)]
struct Cli {
    /// Service root (default: auto-detect from locdet.yaml, .locdet/, or .git/)
    #[arg(long, global = true, env = "LOCDET_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default locdet.yaml and create the data directory
    Init,

    /// Start the API server
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8080")]
        port: u16,
    },

    /// Manage jobs against a running server
    Job {
        #[command(subcommand)]
        subcommand: JobSubcommand,
    },

    /// Run preview room detection over a stored analysis JSON file
    Detect {
        /// Path to an analysis.json file
        analysis: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let root_path = cli.root.as_deref();
    let root = root::resolve_root(root_path);

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Serve { port } => cmd::serve::run(&root, port),
        Commands::Job { subcommand } => cmd::job::run(subcommand, cli.json),
        Commands::Detect { analysis } => cmd::detect::run(&analysis, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
