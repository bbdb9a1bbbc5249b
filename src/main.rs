use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wheeled_motion::config::RobotConfig;

/// Motion command runtime on a simulated robot
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Robot description (JSON). Defaults to a 56mm/128mm differential base.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => match RobotConfig::from_json_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => RobotConfig::default(),
    };
    info!("Robot: {:?}", config);

    if let Err(e) = wheeled_motion::runtime::run(config).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
