//! Standalone launcher for running a gateway instance straight off a config
//! file, without embedding it in a larger binary.
//!
//! Exit codes:
//! - `0`: clean shutdown (SIGINT/SIGTERM received, requests drained)
//! - `1`: configuration could not be loaded
//! - `2`: the server failed to start or exited with an error

use acton_gateway::prelude::*;
use clap::Parser;

#[derive(Parser)]
#[command(name = "gateway")]
#[command(version, about = "Run an acton-gateway instance", long_about = None)]
struct Cli {
    /// Path to a config.toml file. When omitted, the standard
    /// cwd/XDG/system search order is used instead.
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    config: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::<()>::load_from(path),
        None => Config::<()>::load(),
    };

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = acton_gateway::observability::init_tracing(&config) {
        eprintln!("Warning: failed to initialize tracing: {e}");
    }

    if let Err(e) = run(config).await {
        eprintln!("Error: {e}");
        std::process::exit(2);
    }

    std::process::exit(0);
}

async fn run(config: Config) -> Result<()> {
    // AppState::new rather than the AppStateBuilder: tracing is already
    // initialized above and the builder's own init_tracing would try (and
    // panic) to install a second global subscriber.
    let state = AppState::new(config.clone());

    let app = axum::Router::new()
        .route("/health", axum::routing::get(health))
        .route("/ready", axum::routing::get(readiness))
        .with_state(state);

    Server::new(config).serve(app).await
}
