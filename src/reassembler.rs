//! Upstream session driver
//!
//! One chat invocation owns one WebSocket connection for its whole life:
//!
//! ```text
//! Connecting -> Sending -> Receiving -> Closed
//! ```
//!
//! The session runs on its own task and forwards content deltas over a
//! bounded channel. The receiving side may be a blocking collector or an SSE
//! response body; if it is dropped the worker notices on its next wait and
//! tears the connection down. The connection is closed exactly once on every
//! exit path.

use crate::config::{GenerationConfig, SparkConfig};
use crate::error::{GatewayError, Result};
use crate::metrics::UpstreamSessionMetrics;
use crate::providers::{ChatRequest, Connector, FrameTransport, Message, StreamFrame};
use crate::signer::Signer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::Instrument;

/// Buffered deltas between the upstream worker and the consumer
const CHANNEL_CAPACITY: usize = 32;

/// Item delivered to the consumer of a session
#[derive(Debug)]
pub enum StreamEvent {
    /// A non-empty piece of model output
    Delta(String),
    /// The terminal frame arrived; no more events follow
    Done,
    /// The session failed; no more events follow
    Failed(anyhow::Error),
}

/// Consumer end of a running session
#[derive(Debug)]
pub struct DeltaStream {
    rx: mpsc::Receiver<StreamEvent>,
}

impl DeltaStream {
    /// Next event, or `None` once the worker has finished
    pub async fn next(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }

    /// Concatenate all deltas until the session ends
    ///
    /// # Errors
    ///
    /// Returns the session's error, or a transport error if the worker went
    /// away without reporting an outcome.
    pub async fn collect_text(mut self) -> Result<String> {
        let mut text = String::new();
        while let Some(event) = self.next().await {
            match event {
                StreamEvent::Delta(delta) => text.push_str(&delta),
                StreamEvent::Done => return Ok(text),
                StreamEvent::Failed(err) => return Err(err),
            }
        }
        Err(GatewayError::Transport("upstream session ended without a result".to_string()).into())
    }
}

/// How a session ended, from the worker's point of view
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    Completed,
    Cancelled,
}

/// Opens upstream sessions
#[derive(Debug, Clone)]
pub struct Reassembler {
    signer: Signer,
    connector: Arc<dyn Connector>,
    domain: String,
    generation: GenerationConfig,
    idle_timeout: Duration,
    debug_frames: bool,
}

impl Reassembler {
    /// Create a reassembler from the `spark` configuration section
    pub fn new(config: &SparkConfig, signer: Signer, connector: Arc<dyn Connector>) -> Self {
        Self {
            signer,
            connector,
            domain: config.domain.clone(),
            generation: config.generation.clone(),
            idle_timeout: Duration::from_secs(config.idle_timeout_seconds),
            debug_frames: config.debug_frames,
        }
    }

    /// Override the per-receive idle timeout
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Start a session for the given messages
    ///
    /// Signing happens before anything is spawned so that missing
    /// credentials surface synchronously.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::AuthUnavailable`] when the signer is not
    /// configured. Every later failure is delivered as
    /// [`StreamEvent::Failed`].
    pub fn open(&self, messages: Vec<Message>) -> Result<DeltaStream> {
        let endpoint = self.signer.sign()?;
        let request = ChatRequest::new(
            self.signer.app_id(),
            &self.domain,
            &self.generation,
            messages,
        );
        let frame = request.to_frame()?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let worker = Worker {
            connector: Arc::clone(&self.connector),
            url: endpoint.url,
            frame,
            idle_timeout: self.idle_timeout,
            debug_frames: self.debug_frames,
        };
        let span = tracing::info_span!("upstream_session", session_id = %uuid::Uuid::new_v4());
        tokio::spawn(worker.run(tx).instrument(span));

        Ok(DeltaStream { rx })
    }
}

struct Worker {
    connector: Arc<dyn Connector>,
    url: String,
    frame: String,
    idle_timeout: Duration,
    debug_frames: bool,
}

impl Worker {
    async fn run(self, tx: mpsc::Sender<StreamEvent>) {
        let metrics = UpstreamSessionMetrics::new();

        let mut transport = match self.connect(&tx).await {
            Ok(Some(transport)) => transport,
            Ok(None) => {
                metrics.record_cancelled();
                return;
            }
            Err(err) => {
                tracing::warn!(error = %err, "Upstream connect failed");
                metrics.record_error(&err);
                let _ = tx.send(StreamEvent::Failed(err)).await;
                return;
            }
        };

        let outcome = self.exchange(transport.as_mut(), &tx).await;
        transport.close().await;

        match outcome {
            Ok(SessionEnd::Completed) => {
                tracing::debug!("Upstream session completed");
                metrics.record_completion();
                let _ = tx.send(StreamEvent::Done).await;
            }
            Ok(SessionEnd::Cancelled) => {
                tracing::debug!("Consumer went away, upstream session released");
                metrics.record_cancelled();
            }
            Err(err) => {
                tracing::warn!(error = %err, "Upstream session failed");
                metrics.record_error(&err);
                let _ = tx.send(StreamEvent::Failed(err)).await;
            }
        }
    }

    /// `Ok(None)` when the consumer left while connecting
    async fn connect(
        &self,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> Result<Option<Box<dyn FrameTransport>>> {
        tokio::select! {
            biased;
            _ = tx.closed() => Ok(None),
            connected = self.connector.connect(&self.url) => connected.map(Some),
        }
    }

    async fn exchange(
        &self,
        transport: &mut dyn FrameTransport,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> Result<SessionEnd> {
        transport.send(self.frame.clone()).await?;

        let mut deltas = 0usize;
        loop {
            let received = tokio::select! {
                biased;
                _ = tx.closed() => return Ok(SessionEnd::Cancelled),
                received = tokio::time::timeout(self.idle_timeout, transport.next_frame()) => received,
            };

            let raw = received
                .map_err(|_| {
                    GatewayError::Transport(format!(
                        "no frame received for {}s",
                        self.idle_timeout.as_secs()
                    ))
                })??
                .ok_or_else(|| {
                    GatewayError::Transport("upstream closed before completion".to_string())
                })?;

            if self.debug_frames {
                tracing::trace!(frame = %raw, "Upstream frame");
            }

            let frame = StreamFrame::decode(&raw)?;
            if let Some(err) = frame.upstream_error() {
                return Err(err.into());
            }

            if let Some(delta) = frame.content_delta {
                deltas += 1;
                if tx.send(StreamEvent::Delta(delta)).await.is_err() {
                    return Ok(SessionEnd::Cancelled);
                }
            }

            if frame.terminal {
                tracing::debug!(deltas, "Terminal frame received");
                return Ok(SessionEnd::Completed);
            }
        }
    }
}
