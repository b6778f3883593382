//! Upstream model service integration
//!
//! This module contains the message types, the transport abstraction, the
//! Spark wire format and the WebSocket connector.

pub mod base;
pub mod spark;
pub mod websocket;

#[cfg(test)]
pub mod fake;

pub use base::{Connector, FrameTransport, Message, Role};
pub use spark::{ChatRequest, StreamFrame};
pub use websocket::WsConnector;

use crate::config::SparkConfig;
use std::sync::Arc;
use std::time::Duration;

/// Create the production connector from configuration
pub fn create_connector(config: &SparkConfig) -> Arc<dyn Connector> {
    Arc::new(WsConnector::new(Duration::from_secs(
        config.connect_timeout_seconds,
    )))
}
