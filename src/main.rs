// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use image_effect::EngineConfig;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "image-effect")]
#[command(about = "Apply image filters on the CPU or GPU")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered filters
    List {
        /// Lookup key: Default, Category:<name>, Format:<name> or part of a name
        key: Option<String>,
    },

    /// Show the formats, paths and color spaces of a filter
    Info {
        /// Filter name (from 'image-effect list')
        name: String,
    },

    /// Run a filter chain over an image file
    Apply {
        /// Input image
        #[arg(short, long)]
        input: PathBuf,

        /// Output image (default: input name with an "_effect" suffix)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Filter and parameters, e.g. Brightness:FilterIntensity=40; repeat to chain
        #[arg(short, long = "filter", required = true)]
        filters: Vec<String>,

        /// Processing path: auto, cpu or gpu (default from config)
        #[arg(long)]
        path: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match EngineConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Ignoring config: {e}");
            EngineConfig::default()
        }
    };

    // RUST_LOG wins over the configured filter
    // Examples: RUST_LOG=debug, RUST_LOG=image_effect=debug, RUST_LOG=telemetry=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter)),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List { key } => cli::list_filters(key.as_deref()),
        Commands::Info { name } => cli::show_filter(&name),
        Commands::Apply {
            input,
            output,
            filters,
            path,
        } => cli::apply(config, input, output, &filters, path.as_deref()),
    }
}
