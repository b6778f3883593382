//! Command-line interface definition for the gateway
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands to run the server and to exercise the upstream
//! integration from a terminal.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// fate-gateway - Spark chat gateway
///
/// Bridges HTTP chat clients to the Spark streaming model service.
#[derive(Parser, Debug, Clone)]
#[command(name = "fate-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Override the SQLite database path
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Emit JSON log lines
    #[arg(long)]
    pub json_logs: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the HTTP server
    Serve {
        /// Address to bind, e.g. 0.0.0.0:8000
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Print a freshly signed upstream URL
    Handshake,

    /// Get or generate today's draw for a profile
    Draw {
        /// Profile identifier
        #[arg(short, long)]
        profile_id: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            db_path: None,
            json_logs: false,
            command: Commands::Serve { bind: None },
        }
    }
}
