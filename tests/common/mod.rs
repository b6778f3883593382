use async_trait::async_trait;
use fate_gateway::config::Config;
use fate_gateway::providers::{Connector, FrameTransport};
use fate_gateway::server::{self, AppState};
use fate_gateway::storage::SqliteStore;
use fate_gateway::Result;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Connector replaying the same frames on every connection
#[derive(Debug, Default)]
pub struct ScriptedConnector {
    frames: Vec<String>,
    connects: AtomicUsize,
    closes: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl ScriptedConnector {
    pub fn new(frames: Vec<String>) -> Self {
        Self {
            frames,
            ..Default::default()
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn FrameTransport>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedTransport {
            frames: self.frames.iter().cloned().collect(),
            closes: Arc::clone(&self.closes),
        }))
    }
}

struct ScriptedTransport {
    frames: VecDeque<String>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl FrameTransport for ScriptedTransport {
    async fn send(&mut self, _frame: String) -> Result<()> {
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<String>> {
        Ok(self.frames.pop_front())
    }

    async fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Encode one upstream frame carrying `content`
pub fn upstream_frame(content: &str, status: i64) -> String {
    serde_json::json!({
        "header": { "code": 0, "message": "Success" },
        "payload": {
            "choices": {
                "status": status,
                "text": [{ "role": "assistant", "content": content }]
            }
        }
    })
    .to_string()
}

/// Frames for a reply split into `parts`; the last part is terminal
#[allow(dead_code)]
pub fn reply_frames(parts: &[&str]) -> Vec<String> {
    let last = parts.len().saturating_sub(1);
    parts
        .iter()
        .enumerate()
        .map(|(i, part)| upstream_frame(part, if i == last { 2 } else { 1 }))
        .collect()
}

/// Config with no Spark credentials
pub fn unconfigured_config() -> Config {
    Config::default()
}

/// Config with dummy Spark credentials
#[allow(dead_code)]
pub fn configured_config() -> Config {
    let mut config = Config::default();
    config.spark.app_id = "app-test".to_string();
    config.spark.api_key = "key-test".to_string();
    config.spark.api_secret = "secret-test".to_string();
    config
}

/// Router over a temporary SQLite database
///
/// The returned [`TempDir`] must outlive the router.
pub fn test_app(
    config: &Config,
    connector: Arc<ScriptedConnector>,
) -> (axum::Router, SqliteStore, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let store =
        SqliteStore::new_with_path(tmp.path().join("fate.db")).expect("failed to create store");
    let state = AppState::new(config, connector, Arc::new(store.clone()));
    (server::router(state), store, tmp)
}
