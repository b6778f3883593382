//! Message types and the upstream transport seam
//!
//! This module defines the role-tagged [`Message`] exchanged with the model,
//! and the [`Connector`] / [`FrameTransport`] traits that hide the WebSocket
//! behind a small interface.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Author of a conversational turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instruction block prepended by the gateway
    System,
    /// End user
    User,
    /// Model output
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One turn of a conversation
///
/// Serialized as `{"role":"user","content":"..."}`, which is also the shape
/// the model service expects in `payload.message.text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the author
    pub role: Role,
    /// Text of the turn
    #[serde(default)]
    pub content: String,
}

impl Message {
    /// Creates a new user message
    ///
    /// # Examples
    ///
    /// ```
    /// use fate_gateway::providers::{Message, Role};
    ///
    /// let msg = Message::user("今天运势如何？");
    /// assert_eq!(msg.role, Role::User);
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Creates a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// An open, bidirectional text-frame channel to the model service
///
/// One transport carries exactly one chat exchange.
#[async_trait]
pub trait FrameTransport: Send {
    /// Send one complete JSON text frame
    async fn send(&mut self, frame: String) -> Result<()>;

    /// Wait for the next inbound text frame
    ///
    /// Returns `Ok(None)` when the peer closed the connection.
    async fn next_frame(&mut self) -> Result<Option<String>>;

    /// Release the connection
    ///
    /// Callers invoke this exactly once per transport.
    async fn close(&mut self);
}

/// Opens [`FrameTransport`]s to a signed URL
#[async_trait]
pub trait Connector: Send + Sync + fmt::Debug {
    /// Open a fresh connection
    async fn connect(&self, url: &str) -> Result<Box<dyn FrameTransport>>;
}
