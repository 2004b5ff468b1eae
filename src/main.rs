use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use aero_motion_runtime::config::RobotConfig;

/// Aero motion runtime: base wheels and joint trajectory controllers over zenoh
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Robot configuration (controllers, joint groups, timing) as JSON
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    let config = match args.config {
        Some(path) => match RobotConfig::from_file(&path) {
            Ok(config) => {
                info!("Loaded {} controllers from {}", config.controllers.len(), path.display());
                Some(config)
            }
            Err(e) => {
                error!("Failed to load config {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => {
            info!("No config given, base only");
            None
        }
    };

    if let Err(e) = aero_motion_runtime::runtime::run(config).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
