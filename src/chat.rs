//! Chat response adapters
//!
//! Three ways of consuming an upstream session:
//!
//! - blocking: the whole reply as one string
//! - streaming: server-sent event frames, one per delta
//! - title: a short conversation title from the first user message
//!
//! Missing credentials are a soft failure. Blocking and streaming callers
//! receive a configured notice; the title adapter falls back to a fixed
//! title.

use crate::config::ChatConfig;
use crate::context::ContextBuilder;
use crate::error::{gateway_error, GatewayError, Result};
use crate::metrics;
use crate::prompts::TITLE_PROMPT;
use crate::providers::Message;
use crate::reassembler::{DeltaStream, Reassembler, StreamEvent};
use crate::storage::{Store, SubjectProfile};
use futures::Stream;
use std::sync::Arc;

/// Quotation marks stripped from generated titles
const TITLE_QUOTES: &[char] = &['"', '\'', '“', '”', '‘', '’', '「', '」', '『', '』', '《', '》'];

/// Outcome of a blocking exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Concatenated model output
    Text(String),
    /// No credentials are configured; nothing was sent upstream
    Unconfigured,
}

/// One server-sent event of a chat stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// A content delta, unescaped
    Data(String),
    /// End of a successful stream
    Done,
    /// End of a failed stream, carrying the error text, unescaped
    Error(String),
}

impl SseFrame {
    /// Event name, `None` for plain data events
    pub fn event(&self) -> Option<&'static str> {
        match self {
            SseFrame::Data(_) => None,
            SseFrame::Done => Some("done"),
            SseFrame::Error(_) => Some("error"),
        }
    }

    /// Single-line `data` payload
    pub fn data(&self) -> String {
        match self {
            SseFrame::Data(text) | SseFrame::Error(text) => escape_sse(text),
            SseFrame::Done => "[DONE]".to_string(),
        }
    }

    /// Wire form of the event including the blank-line terminator
    ///
    /// # Examples
    ///
    /// ```
    /// use fate_gateway::chat::SseFrame;
    ///
    /// assert_eq!(SseFrame::Data("a\nb".into()).render(), "data: a\\nb\n\n");
    /// assert_eq!(SseFrame::Done.render(), "event: done\ndata: [DONE]\n\n");
    /// ```
    pub fn render(&self) -> String {
        match self.event() {
            Some(event) => format!("event: {}\ndata: {}\n\n", event, self.data()),
            None => format!("data: {}\n\n", self.data()),
        }
    }
}

/// Replaces every line break with the two characters `\n`
///
/// `\r\n`, a lone `\r` and `\n` all count as one break, so the result is
/// always a single SSE line.
pub fn escape_sse(text: &str) -> String {
    text.replace("\r\n", "\\n")
        .replace('\r', "\\n")
        .replace('\n', "\\n")
}

/// Trims a generated title and strips surrounding quotation marks
pub fn clean_title(raw: &str) -> String {
    raw.trim().trim_matches(TITLE_QUOTES).trim().to_string()
}

/// Chat entry points shared by the HTTP handlers and the draw generator
#[derive(Clone)]
pub struct ChatService {
    reassembler: Reassembler,
    context: ContextBuilder,
    store: Arc<dyn Store>,
    unconfigured_notice: String,
    fallback_title: String,
}

impl std::fmt::Debug for ChatService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatService")
            .field("reassembler", &self.reassembler)
            .field("context", &self.context)
            .finish()
    }
}

/// Result of starting a session
enum Opened {
    Stream(DeltaStream),
    Unconfigured,
}

impl ChatService {
    /// Create a chat service
    pub fn new(reassembler: Reassembler, config: &ChatConfig, store: Arc<dyn Store>) -> Self {
        Self {
            reassembler,
            context: ContextBuilder::from_config(config),
            store,
            unconfigured_notice: config.unconfigured_notice.clone(),
            fallback_title: config.fallback_title.clone(),
        }
    }

    /// Run one blocking exchange with an already-built context
    pub async fn complete(&self, messages: Vec<Message>) -> Result<Reply> {
        match self.open(messages)? {
            Opened::Stream(stream) => Ok(Reply::Text(stream.collect_text().await?)),
            Opened::Unconfigured => Ok(Reply::Unconfigured),
        }
    }

    /// Answer a client conversation in one piece
    pub async fn chat(&self, turns: Vec<Message>, profile_id: Option<&str>) -> Result<String> {
        metrics::record_chat_request("blocking");
        let messages = self.prepare(turns, profile_id).await?;
        match self.complete(messages).await? {
            Reply::Text(text) => Ok(text),
            Reply::Unconfigured => Ok(self.unconfigured_notice.clone()),
        }
    }

    /// Answer a client conversation as a stream of SSE frames
    ///
    /// Every failure, including context preparation, is delivered in-band as
    /// a final [`SseFrame::Error`]. Dropping the stream releases the
    /// upstream connection.
    pub fn stream(
        &self,
        turns: Vec<Message>,
        profile_id: Option<String>,
    ) -> impl Stream<Item = SseFrame> + Send + 'static {
        metrics::record_chat_request("stream");
        let start = StreamState::Prepare {
            service: self.clone(),
            turns,
            profile_id,
        };

        futures::stream::unfold(start, |mut state| async move {
            loop {
                state = match state {
                    StreamState::Prepare {
                        service,
                        turns,
                        profile_id,
                    } => {
                        let opened = match service.prepare(turns, profile_id.as_deref()).await {
                            Ok(messages) => service.open(messages),
                            Err(err) => Err(err),
                        };
                        match opened {
                            Ok(Opened::Stream(stream)) => StreamState::Running(stream),
                            Ok(Opened::Unconfigured) => {
                                return Some((
                                    SseFrame::Data(service.unconfigured_notice.clone()),
                                    StreamState::DoneNext,
                                ));
                            }
                            Err(err) => {
                                let frame = SseFrame::Error(err.to_string());
                                return Some((frame, StreamState::Finished));
                            }
                        }
                    }
                    StreamState::Running(mut stream) => {
                        return match stream.next().await {
                            Some(StreamEvent::Delta(delta)) => {
                                Some((SseFrame::Data(delta), StreamState::Running(stream)))
                            }
                            Some(StreamEvent::Done) => {
                                Some((SseFrame::Done, StreamState::Finished))
                            }
                            Some(StreamEvent::Failed(err)) => {
                                Some((SseFrame::Error(err.to_string()), StreamState::Finished))
                            }
                            None => Some((
                                SseFrame::Error(
                                    "upstream session ended without a result".to_string(),
                                ),
                                StreamState::Finished,
                            )),
                        };
                    }
                    StreamState::DoneNext => return Some((SseFrame::Done, StreamState::Finished)),
                    StreamState::Finished => return None,
                };
            }
        })
    }

    /// Generate a short title for a conversation's first message
    pub async fn title(&self, text: &str) -> Result<String> {
        metrics::record_chat_request("title");
        let messages = vec![Message::system(TITLE_PROMPT), Message::user(text)];
        let title = match self.complete(messages).await? {
            Reply::Text(raw) => clean_title(&raw),
            Reply::Unconfigured => String::new(),
        };
        if title.is_empty() {
            Ok(self.fallback_title.clone())
        } else {
            Ok(title)
        }
    }

    /// Look up the profile, if any, and build the upstream context
    pub async fn prepare(
        &self,
        turns: Vec<Message>,
        profile_id: Option<&str>,
    ) -> Result<Vec<Message>> {
        let profile = self.load_profile(profile_id).await?;
        tracing::info!(
            profile_id = profile_id.unwrap_or(""),
            profile_found = profile.is_some(),
            turns = turns.len(),
            "Building chat context"
        );
        let messages = self.context.build(turns, profile.as_ref());
        tracing::debug!(messages = messages.len(), "Chat context built");
        Ok(messages)
    }

    async fn load_profile(&self, profile_id: Option<&str>) -> Result<Option<SubjectProfile>> {
        match profile_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => self.store.fetch_profile(id).await,
            None => Ok(None),
        }
    }

    fn open(&self, messages: Vec<Message>) -> Result<Opened> {
        match self.reassembler.open(messages) {
            Ok(stream) => Ok(Opened::Stream(stream)),
            Err(err) if matches!(gateway_error(&err), Some(GatewayError::AuthUnavailable)) => {
                tracing::warn!("Spark credentials missing, returning notice");
                Ok(Opened::Unconfigured)
            }
            Err(err) => Err(err),
        }
    }
}

enum StreamState {
    Prepare {
        service: ChatService,
        turns: Vec<Message>,
        profile_id: Option<String>,
    },
    Running(DeltaStream),
    DoneNext,
    Finished,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SparkConfig;
    use crate::providers::fake::{self, FakeConnector, Step};
    use crate::providers::Role;
    use crate::signer::Signer;
    use crate::storage::memory::MemoryStore;
    use futures::StreamExt;
    use std::time::Duration;

    const NOTICE: &str = "服务端未配置 Spark 凭证，请联系管理员。";

    fn service_with(
        connector: &FakeConnector,
        signer: Signer,
        store: Arc<MemoryStore>,
    ) -> ChatService {
        let reassembler =
            Reassembler::new(&SparkConfig::default(), signer, Arc::new(connector.clone()))
                .with_idle_timeout(Duration::from_millis(200));
        ChatService::new(reassembler, &ChatConfig::default(), store)
    }

    fn configured() -> Signer {
        Signer::new("app", "key", "secret", "wss://spark.example.com/v1/x1")
    }

    fn unconfigured() -> Signer {
        Signer::new("", "", "", "")
    }

    fn service(script: Vec<Step>) -> (ChatService, FakeConnector) {
        let connector = FakeConnector::new(script);
        let svc = service_with(&connector, configured(), Arc::new(MemoryStore::new()));
        (svc, connector)
    }

    async fn collect(stream: impl Stream<Item = SseFrame>) -> Vec<SseFrame> {
        stream.collect::<Vec<_>>().await
    }

    #[test]
    fn test_escape_sse_line_breaks() {
        assert_eq!(escape_sse("a\nb"), "a\\nb");
        assert_eq!(escape_sse("a\r\nb"), "a\\nb");
        assert_eq!(escape_sse("a\rb"), "a\\nb");
        assert_eq!(escape_sse("\n\n"), "\\n\\n");
        assert_eq!(escape_sse("plain"), "plain");
    }

    #[test]
    fn test_rendered_frames_are_single_line() {
        let frames = [
            SseFrame::Data("第一行\r\n第二行\r第三行\n".to_string()),
            SseFrame::Error("boom\nagain".to_string()),
            SseFrame::Done,
        ];
        for frame in frames {
            let rendered = frame.render();
            let body = rendered.strip_suffix("\n\n").unwrap();
            assert!(!body.contains('\r'));
            let data_lines = body.lines().filter(|l| l.starts_with("data: ")).count();
            assert_eq!(data_lines, 1);
        }
    }

    #[test]
    fn test_error_frame_render() {
        assert_eq!(
            SseFrame::Error("x\ny".to_string()).render(),
            "event: error\ndata: x\\ny\n\n"
        );
    }

    #[test]
    fn test_clean_title() {
        assert_eq!(clean_title("  “今日运势”  "), "今日运势");
        assert_eq!(clean_title("\"八字咨询\"\n"), "八字咨询");
        assert_eq!(clean_title("「事业」"), "事业");
        assert_eq!(clean_title(" \"\" "), "");
    }

    #[tokio::test]
    async fn test_chat_concatenates_reply() {
        let (svc, connector) = service(fake::reply(&["你好", "，", "世界"]));
        let answer = svc.chat(vec![Message::user("hi")], None).await.unwrap();
        assert_eq!(answer, "你好，世界");
        assert_eq!(connector.stats().connects(), 1);
    }

    #[tokio::test]
    async fn test_chat_unconfigured_returns_notice() {
        let connector = FakeConnector::new(fake::reply(&["x"]));
        let svc = service_with(&connector, unconfigured(), Arc::new(MemoryStore::new()));
        let answer = svc.chat(vec![Message::user("hi")], None).await.unwrap();
        assert_eq!(answer, NOTICE);
        assert_eq!(connector.stats().connects(), 0);
    }

    #[tokio::test]
    async fn test_chat_upstream_error_propagates() {
        let (svc, _) = service(vec![fake::error_frame(10013, "audit failed")]);
        let err = svc.chat(vec![Message::user("hi")], None).await.unwrap_err();
        assert_eq!(err.to_string(), "audit failed");
    }

    #[tokio::test]
    async fn test_chat_includes_profile_preamble() {
        let connector = FakeConnector::new(fake::reply(&["ok"]));
        let store = Arc::new(MemoryStore::new());
        store.put_profile(SubjectProfile {
            id: "p-1".to_string(),
            name: "林晓".to_string(),
            ..SubjectProfile::default()
        });
        let svc = service_with(&connector, configured(), store);

        svc.chat(vec![Message::user("hi")], Some("p-1")).await.unwrap();

        let sent = connector.stats().sent();
        let value: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
        let system = value["payload"]["message"]["text"][0]["content"].as_str().unwrap();
        assert!(system.contains("- 姓名：林晓"));
    }

    #[tokio::test]
    async fn test_stream_emits_deltas_then_done() {
        let (svc, _) = service(fake::reply(&["a\nb", "c"]));
        let frames = collect(svc.stream(vec![Message::user("hi")], None)).await;
        assert_eq!(
            frames,
            vec![
                SseFrame::Data("a\nb".to_string()),
                SseFrame::Data("c".to_string()),
                SseFrame::Done,
            ]
        );
        assert_eq!(frames[0].render(), "data: a\\nb\n\n");
    }

    #[tokio::test]
    async fn test_stream_ends_with_exactly_one_terminator() {
        let scripts = vec![
            fake::reply(&["x"]),
            vec![fake::delta("x", 1), fake::error_frame(1, "bad\nthing")],
            vec![Step::Fail("reset".to_string())],
            vec![fake::delta("x", 1)],
        ];
        for script in scripts {
            let (svc, _) = service(script);
            let frames = collect(svc.stream(vec![Message::user("hi")], None)).await;
            let terminators = frames
                .iter()
                .filter(|f| matches!(f, SseFrame::Done | SseFrame::Error(_)))
                .count();
            assert_eq!(terminators, 1);
            assert!(matches!(
                frames.last(),
                Some(SseFrame::Done) | Some(SseFrame::Error(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_stream_error_text_is_escaped() {
        let (svc, _) = service(vec![fake::error_frame(1, "bad\r\nthing")]);
        let frames = collect(svc.stream(vec![Message::user("hi")], None)).await;
        assert_eq!(frames.last().unwrap().render(), "event: error\ndata: bad\\nthing\n\n");
    }

    #[tokio::test]
    async fn test_stream_unconfigured_emits_notice_then_done() {
        let connector = FakeConnector::new(vec![]);
        let svc = service_with(&connector, unconfigured(), Arc::new(MemoryStore::new()));
        let frames = collect(svc.stream(vec![Message::user("hi")], None)).await;
        assert_eq!(
            frames,
            vec![SseFrame::Data(NOTICE.to_string()), SseFrame::Done]
        );
    }

    #[tokio::test]
    async fn test_stream_store_failure_is_in_band_error() {
        let connector = FakeConnector::new(fake::reply(&["x"]));
        let store = Arc::new(MemoryStore::new());
        store.set_failing(true);
        let svc = service_with(&connector, configured(), store);

        let frames = collect(svc.stream(vec![Message::user("hi")], Some("p-1".to_string()))).await;
        assert_eq!(frames.len(), 1);
        assert!(matches!(&frames[0], SseFrame::Error(msg) if msg.contains("store unavailable")));
        assert_eq!(connector.stats().connects(), 0);
    }

    #[tokio::test]
    async fn test_dropping_stream_releases_connection() {
        let (svc, connector) = service(vec![
            fake::delta("a", 1),
            Step::Delay(Duration::from_secs(5)),
            fake::delta("b", 2),
        ]);
        let mut stream = Box::pin(svc.stream(vec![Message::user("hi")], None));
        assert_eq!(stream.next().await, Some(SseFrame::Data("a".to_string())));
        drop(stream);

        let stats = connector.stats();
        for _ in 0..200 {
            if stats.closes() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(stats.closes(), 1);
    }

    #[tokio::test]
    async fn test_title_uses_fixed_context_and_strips_quotes() {
        let (svc, connector) = service(fake::reply(&["“八字", "咨询”\n"]));
        let title = svc.title("帮我看看八字").await.unwrap();
        assert_eq!(title, "八字咨询");

        let sent = connector.stats().sent();
        let value: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
        let text = value["payload"]["message"]["text"].as_array().unwrap();
        assert_eq!(text.len(), 2);
        assert_eq!(text[0]["role"], Role::System.to_string());
        assert_eq!(text[0]["content"], TITLE_PROMPT);
        assert_eq!(text[1]["content"], "帮我看看八字");
    }

    #[tokio::test]
    async fn test_title_unconfigured_falls_back() {
        let connector = FakeConnector::new(vec![]);
        let svc = service_with(&connector, unconfigured(), Arc::new(MemoryStore::new()));
        assert_eq!(svc.title("hello").await.unwrap(), "新建聊天");
    }

    #[tokio::test]
    async fn test_title_empty_reply_falls_back() {
        let (svc, _) = service(fake::reply(&["  \"\"  "]));
        assert_eq!(svc.title("hello").await.unwrap(), "新建聊天");
    }

    #[tokio::test]
    async fn test_title_with_notice_text_is_not_special_cased() {
        let (svc, _) = service(fake::reply(&["未配置 Spark 凭证的处理"]));
        assert_eq!(svc.title("hello").await.unwrap(), "未配置 Spark 凭证的处理");
    }
}
