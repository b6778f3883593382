//! fate-gateway - Spark chat gateway library
//!
//! This library bridges HTTP chat clients to the Spark model service, which
//! speaks a signed, framed WebSocket protocol. It signs connection URLs,
//! assembles conversation context, reassembles streamed frames and serves
//! the results as JSON or server-sent events. It also produces a
//! once-per-day structured "draw" for each subject profile.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `signer`: HMAC-SHA256 signed connection URLs
//! - `prompts`: instruction templates and the profile preamble
//! - `context`: cleanup of client history into the upstream message list
//! - `providers`: message types, wire format and the WebSocket transport
//! - `reassembler`: one upstream session per chat invocation
//! - `chat`: blocking, streaming and title adapters
//! - `draw`: idempotent daily draw generation
//! - `storage`: profile and draw persistence
//! - `server`: axum router and handlers
//! - `config`, `cli`, `error`, `metrics`: ambient plumbing
//!
//! # Example
//!
//! ```no_run
//! use fate_gateway::config::Config;
//! use fate_gateway::server::{self, AppState};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let state = AppState::from_config(&config)?;
//!     server::serve(&config, state).await
//! }
//! ```

pub mod chat;
pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod draw;
pub mod error;
pub mod metrics;
pub mod prompts;
pub mod providers;
pub mod reassembler;
pub mod server;
pub mod signer;
pub mod storage;

// Re-export commonly used types
pub use chat::{ChatService, Reply, SseFrame};
pub use config::Config;
pub use draw::DrawGenerator;
pub use error::{GatewayError, Result};
pub use providers::{Message, Role};
pub use signer::{SignedEndpoint, Signer};
