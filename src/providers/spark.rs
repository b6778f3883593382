//! Spark wire format
//!
//! Outbound chat request and inbound stream frame, as JSON text frames.

use crate::config::GenerationConfig;
use crate::error::{GatewayError, Result};
use crate::providers::base::Message;
use serde::{Deserialize, Serialize};

/// `uid` sent in every request header
const REQUEST_UID: &str = "user_id";

/// `payload.choices.status` value of the last frame
const TERMINAL_STATUS: i64 = 2;

/// Outbound chat request
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    header: RequestHeader,
    parameter: RequestParameter,
    payload: RequestPayload,
}

#[derive(Debug, Clone, Serialize)]
struct RequestHeader {
    app_id: String,
    uid: String,
}

#[derive(Debug, Clone, Serialize)]
struct RequestParameter {
    chat: ChatParameter,
}

#[derive(Debug, Clone, Serialize)]
struct ChatParameter {
    domain: String,
    max_tokens: u32,
    presence_penalty: f32,
    temperature: f32,
    frequency_penalty: f32,
    top_k: u32,
    tools: Vec<ToolSpec>,
}

#[derive(Debug, Clone, Serialize)]
struct ToolSpec {
    #[serde(rename = "type")]
    kind: String,
    web_search: WebSearch,
}

#[derive(Debug, Clone, Serialize)]
struct WebSearch {
    enable: bool,
    search_mode: String,
}

#[derive(Debug, Clone, Serialize)]
struct RequestPayload {
    message: MessageText,
}

#[derive(Debug, Clone, Serialize)]
struct MessageText {
    text: Vec<Message>,
}

impl ChatRequest {
    /// Builds the request for a message list
    pub fn new(
        app_id: &str,
        domain: &str,
        generation: &GenerationConfig,
        messages: Vec<Message>,
    ) -> Self {
        Self {
            header: RequestHeader {
                app_id: app_id.to_string(),
                uid: REQUEST_UID.to_string(),
            },
            parameter: RequestParameter {
                chat: ChatParameter {
                    domain: domain.to_string(),
                    max_tokens: generation.max_tokens,
                    presence_penalty: generation.presence_penalty,
                    temperature: generation.temperature,
                    frequency_penalty: generation.frequency_penalty,
                    top_k: generation.top_k,
                    tools: vec![ToolSpec {
                        kind: "web_search".to_string(),
                        web_search: WebSearch {
                            enable: generation.web_search,
                            search_mode: "normal".to_string(),
                        },
                    }],
                },
            },
            payload: RequestPayload {
                message: MessageText { text: messages },
            },
        }
    }

    /// Serializes the request to a text frame
    pub fn to_frame(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawFrame {
    #[serde(default)]
    header: RawHeader,
    #[serde(default)]
    payload: RawPayload,
}

#[derive(Debug, Default, Deserialize)]
struct RawHeader {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPayload {
    #[serde(default)]
    choices: RawChoices,
}

#[derive(Debug, Default, Deserialize)]
struct RawChoices {
    #[serde(default)]
    status: i64,
    #[serde(default)]
    text: Vec<RawText>,
}

#[derive(Debug, Default, Deserialize)]
struct RawText {
    #[serde(default)]
    content: Option<String>,
}

/// One decoded inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    /// `header.code`, zero on success
    pub status_code: i64,
    /// `header.message`
    pub error_message: Option<String>,
    /// Content of the first choice, when non-empty
    pub content_delta: Option<String>,
    /// True for the last frame of a response
    pub terminal: bool,
}

impl StreamFrame {
    /// Decodes a text frame
    ///
    /// Missing sections default to an empty, non-terminal, successful frame.
    ///
    /// # Examples
    ///
    /// ```
    /// use fate_gateway::providers::spark::StreamFrame;
    ///
    /// let frame = StreamFrame::decode(
    ///     r#"{"header":{"code":0},"payload":{"choices":{"status":2,"text":[{"content":"好"}]}}}"#,
    /// ).unwrap();
    /// assert_eq!(frame.content_delta.as_deref(), Some("好"));
    /// assert!(frame.terminal);
    /// ```
    pub fn decode(raw: &str) -> Result<Self> {
        let frame: RawFrame = serde_json::from_str(raw)
            .map_err(|e| GatewayError::Transport(format!("undecodable frame: {}", e)))?;

        let content_delta = frame
            .payload
            .choices
            .text
            .into_iter()
            .next()
            .and_then(|t| t.content)
            .filter(|c| !c.is_empty());

        Ok(Self {
            status_code: frame.header.code,
            error_message: frame.header.message,
            content_delta,
            terminal: frame.payload.choices.status == TERMINAL_STATUS,
        })
    }

    /// The upstream error carried by this frame, if any
    pub fn upstream_error(&self) -> Option<GatewayError> {
        if self.status_code == 0 {
            return None;
        }
        Some(GatewayError::Upstream {
            code: self.status_code,
            message: self
                .error_message
                .clone()
                .unwrap_or_else(|| "spark error".to_string()),
        })
    }
}
