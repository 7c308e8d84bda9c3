//! Clusterpack CLI - kpt functions for composing Kubernetes cluster packages

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;
mod config;
mod error;
mod exit_codes;
mod io;
mod logging;

#[derive(Parser)]
#[command(name = "clusterpack")]
#[command(author = "Clusterpack Contributors")]
#[command(version)]
#[command(about = "kpt functions for composing Kubernetes cluster packages", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Expand a ClusterPackages descriptor into the resources of its packages
    Sync {
        /// ResourceList file (default: stdin)
        input: Option<PathBuf>,
    },

    /// Stamp digests of referenced resources into hash-dependency annotations
    HashDependency {
        /// ResourceList file (default: stdin)
        input: Option<PathBuf>,
    },

    /// Render template-enabled resources with setters from Kptfiles
    RenderTemplate {
        /// ResourceList file (default: stdin)
        input: Option<PathBuf>,
    },

    /// Replace literal tokens in resources that opt in
    TokenReplace {
        /// ResourceList file (default: stdin)
        input: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Sync { input } => commands::sync::run(input.as_deref()).await,
        Commands::HashDependency { input } => commands::hash_dependency::run(input.as_deref()),
        Commands::RenderTemplate { input } => commands::render_template::run(input.as_deref()),
        Commands::TokenReplace { input } => commands::token_replace::run(input.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            ExitCode::from(code)
        }
    }
}
