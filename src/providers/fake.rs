//! In-process fake upstream for unit tests
//!
//! [`FakeConnector`] hands out [`FakeTransport`]s that replay a scripted
//! list of frames. The connector records what was sent and how many times
//! each transport was closed, so tests can assert on connection release.

use crate::error::{GatewayError, Result};
use crate::providers::base::{Connector, FrameTransport};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted step of a fake session
#[derive(Debug, Clone)]
pub enum Step {
    /// Deliver this text frame
    Frame(String),
    /// Fail the receive with a transport error
    Fail(String),
    /// Stall the receive for the duration before continuing
    Delay(Duration),
}

/// Shared counters observed by tests
#[derive(Debug, Default)]
pub struct FakeStats {
    /// Number of successful `connect` calls
    pub connects: AtomicUsize,
    /// Number of `close` calls across all transports
    pub closes: AtomicUsize,
    /// Frames sent by the code under test
    pub sent: Mutex<Vec<String>>,
}

impl FakeStats {
    /// Closes observed so far
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Connects observed so far
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Copy of the frames sent so far
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// Connector that replays a script
#[derive(Debug, Clone)]
pub struct FakeConnector {
    script: Vec<Step>,
    fail_connect: bool,
    stats: Arc<FakeStats>,
}

impl FakeConnector {
    /// Create a connector replaying `script` on every connection
    pub fn new(script: Vec<Step>) -> Self {
        Self {
            script,
            fail_connect: false,
            stats: Arc::new(FakeStats::default()),
        }
    }

    /// Create a connector whose `connect` always fails
    pub fn refusing() -> Self {
        Self {
            script: Vec::new(),
            fail_connect: true,
            stats: Arc::new(FakeStats::default()),
        }
    }

    /// Counters shared with every transport this connector opens
    pub fn stats(&self) -> Arc<FakeStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn FrameTransport>> {
        if self.fail_connect {
            return Err(GatewayError::Transport("connection refused".to_string()).into());
        }
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeTransport {
            steps: self.script.iter().cloned().collect(),
            stats: Arc::clone(&self.stats),
        }))
    }
}

/// Transport replaying scripted steps, then reporting a closed socket
#[derive(Debug)]
pub struct FakeTransport {
    steps: VecDeque<Step>,
    stats: Arc<FakeStats>,
}

#[async_trait]
impl FrameTransport for FakeTransport {
    async fn send(&mut self, frame: String) -> Result<()> {
        if let Ok(mut sent) = self.stats.sent.lock() {
            sent.push(frame);
        }
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<String>> {
        while let Some(step) = self.steps.pop_front() {
            match step {
                Step::Frame(frame) => return Ok(Some(frame)),
                Step::Fail(reason) => return Err(GatewayError::Transport(reason).into()),
                Step::Delay(duration) => tokio::time::sleep(duration).await,
            }
        }
        Ok(None)
    }

    async fn close(&mut self) {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// A successful delta frame
pub fn delta(content: &str, status: i64) -> Step {
    Step::Frame(
        serde_json::json!({
            "header": {"code": 0, "message": "Success"},
            "payload": {"choices": {"status": status, "text": [{"content": content}]}}
        })
        .to_string(),
    )
}

/// An error frame
pub fn error_frame(code: i64, message: &str) -> Step {
    Step::Frame(serde_json::json!({"header": {"code": code, "message": message}}).to_string())
}

/// Script for a reply split into the given deltas, the last one terminal
pub fn reply(parts: &[&str]) -> Vec<Step> {
    let last = parts.len().saturating_sub(1);
    parts
        .iter()
        .enumerate()
        .map(|(i, part)| delta(part, if i == last { 2 } else { 1 }))
        .collect()
}
