//! Command handlers for the binary
//!
//! Each subcommand of the CLI maps to one function here.

use crate::config::Config;
use crate::error::Result;
use crate::server::{self, AppState};
use crate::signer::Signer;

/// Run the HTTP server
pub async fn serve(config: Config) -> Result<()> {
    let state = AppState::from_config(&config)?;
    server::serve(&config, state).await
}

/// Print a freshly signed upstream URL
pub fn handshake(config: &Config) -> Result<()> {
    let signer = Signer::from_config(&config.spark);
    let endpoint = signer.sign()?;
    tracing::info!(issued_at = %endpoint.issued_at, "Signed upstream URL");
    println!("{}", endpoint.url);
    Ok(())
}

/// Print today's draw for a profile, generating it if needed
pub async fn draw(config: Config, profile_id: &str) -> Result<()> {
    let state = AppState::from_config(&config)?;
    let draw = state.draws.get_or_create_today(profile_id).await?;
    println!("{}", serde_json::to_string_pretty(&draw)?);
    Ok(())
}
