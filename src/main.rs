//! fate-gateway - Spark chat gateway
//!
//! Main entry point for the gateway binary.

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fate_gateway::cli::{Cli, Commands};
use fate_gateway::commands;
use fate_gateway::config::Config;
use fate_gateway::metrics::init_metrics_exporter;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    init_tracing(config.logging.json);

    // Validate configuration
    config.validate()?;

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("TLS crypto provider already installed");
    }
    init_metrics_exporter(config.server.metrics_bind.as_deref());

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        credentials = config.has_credentials(),
        "fate-gateway starting"
    );

    match cli.command {
        Commands::Serve { .. } => commands::serve(config).await,
        Commands::Handshake => commands::handshake(&config),
        Commands::Draw { profile_id } => {
            tracing::info!(profile_id = %profile_id, "Generating daily draw");
            commands::draw(config, &profile_id).await
        }
    }
}

fn init_tracing(json: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fate_gateway=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}
