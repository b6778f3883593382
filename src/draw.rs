//! Daily draw generation
//!
//! A draw is a small structured reading (card name, keywords,
//! interpretation, advice) produced by the model at most once per subject
//! per calendar day. The store's unique constraint settles concurrent
//! generations; the losing request still returns the draw it generated.

use crate::chat::{ChatService, Reply};
use crate::error::{GatewayError, Result};
use crate::metrics;
use crate::prompts::draw_prompt::{generate_draw_prompt, DRAW_USER_TURN};
use crate::prompts::PROMPT_TIME_FORMAT;
use crate::providers::Message;
use crate::storage::{DailyDraw, Store};
use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Parses model output into a JSON object
///
/// Tries the whole trimmed text first, then the span from the first `{` to
/// the last `}`.
///
/// # Errors
///
/// Returns [`GatewayError::MalformedDrawResponse`] when neither attempt
/// yields a JSON object.
///
/// # Examples
///
/// ```
/// use fate_gateway::draw::parse_draw_response;
///
/// let obj = parse_draw_response("好的：{\"cardName\":\"星辰\"} 祝好").unwrap();
/// assert_eq!(obj["cardName"], "星辰");
/// assert!(parse_draw_response("no json here").is_err());
/// ```
pub fn parse_draw_response(text: &str) -> Result<Map<String, Value>> {
    let raw = text.trim();
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(raw) {
        return Ok(obj);
    }

    if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) {
        if end > start {
            if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(&raw[start..=end]) {
                return Ok(obj);
            }
        }
    }

    Err(GatewayError::MalformedDrawResponse.into())
}

/// Validates a parsed draw and turns it into a [`DailyDraw`]
///
/// # Errors
///
/// Returns [`GatewayError::IncompleteDrawResponse`] naming the fields whose
/// trimmed text is empty or missing.
pub fn validate_draw(
    obj: &Map<String, Value>,
    subject_id: &str,
    date: NaiveDate,
) -> Result<DailyDraw> {
    let card_name = text_field(obj, "cardName");
    let interpretation = text_field(obj, "interpretation");
    let advice = text_field(obj, "advice");

    let missing: Vec<&str> = [
        ("cardName", &card_name),
        ("interpretation", &interpretation),
        ("advice", &advice),
    ]
    .into_iter()
    .filter(|(_, value)| value.is_empty())
    .map(|(name, _)| name)
    .collect();
    if !missing.is_empty() {
        return Err(GatewayError::IncompleteDrawResponse(missing.join(", ")).into());
    }

    Ok(DailyDraw {
        subject_id: subject_id.to_string(),
        date,
        card_name,
        keywords: coerce_keywords(obj.get("keywords")),
        interpretation,
        advice,
    })
}

fn text_field(obj: &Map<String, Value>, name: &str) -> String {
    match obj.get(name) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string().trim().to_string(),
    }
}

/// Normalizes the `keywords` value to a list of strings
///
/// A list is kept (non-string items rendered as JSON), any other non-empty
/// value becomes a one-element list. Null, missing, `false`, zero and empty
/// values become an empty list.
pub fn coerce_keywords(value: Option<&Value>) -> Vec<String> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Bool(false)) => Vec::new(),
        Some(Value::Number(n)) if n.as_f64() == Some(0.0) => Vec::new(),
        Some(Value::String(s)) if s.is_empty() => Vec::new(),
        Some(Value::Object(map)) if map.is_empty() => Vec::new(),
        Some(Value::Array(items)) => items.iter().map(value_text).collect(),
        Some(other) => vec![value_text(other)],
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Looks up or generates a subject's daily draw
#[derive(Clone)]
pub struct DrawGenerator {
    chat: ChatService,
    store: Arc<dyn Store>,
}

impl std::fmt::Debug for DrawGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrawGenerator").finish_non_exhaustive()
    }
}

impl DrawGenerator {
    /// Create a generator
    pub fn new(chat: ChatService, store: Arc<dyn Store>) -> Self {
        Self { chat, store }
    }

    /// Local calendar date used as "today"
    pub fn today() -> NaiveDate {
        chrono::Local::now().date_naive()
    }

    /// Stored draw for today, without generating one
    pub async fn get_today(&self, subject_id: &str) -> Result<Option<DailyDraw>> {
        self.store.fetch_draw(subject_id, Self::today()).await
    }

    /// Today's draw, generating it on first request
    pub async fn get_or_create_today(&self, subject_id: &str) -> Result<DailyDraw> {
        self.get_or_create(subject_id, Self::today()).await
    }

    /// The draw for `date`, generating it if none is stored
    ///
    /// # Errors
    ///
    /// - [`GatewayError::AuthUnavailable`] when no credentials are configured
    /// - [`GatewayError::MalformedDrawResponse`] or
    ///   [`GatewayError::IncompleteDrawResponse`] for unusable model output
    /// - upstream, transport and storage errors as they occur
    pub async fn get_or_create(&self, subject_id: &str, date: NaiveDate) -> Result<DailyDraw> {
        if let Some(existing) = self.store.fetch_draw(subject_id, date).await? {
            tracing::debug!(profile_id = subject_id, %date, "Draw served from storage");
            metrics::record_draw_cache_hit();
            return Ok(existing);
        }

        let profile = self.store.fetch_profile(subject_id).await?;
        let now = chrono::Local::now().format(PROMPT_TIME_FORMAT).to_string();
        let messages = vec![
            Message::system(generate_draw_prompt(profile.as_ref(), &now)),
            Message::user(DRAW_USER_TURN),
        ];

        metrics::record_chat_request("draw");
        let raw = match self.chat.complete(messages).await? {
            Reply::Text(text) => text,
            Reply::Unconfigured => return Err(GatewayError::AuthUnavailable.into()),
        };

        let parsed = parse_draw_response(&raw).map_err(|err| {
            tracing::warn!(profile_id = subject_id, raw_len = raw.len(), "Draw response is not JSON");
            err
        })?;
        let draw = validate_draw(&parsed, subject_id, date)?;

        let inserted = self.store.insert_draw_if_absent(&draw).await?;
        tracing::info!(
            profile_id = subject_id,
            %date,
            inserted,
            card = %draw.card_name,
            "Draw generated"
        );
        metrics::record_draw_generated();

        if inserted {
            return Ok(draw);
        }
        // lost the race: serve the row that won
        Ok(self
            .store
            .fetch_draw(subject_id, date)
            .await?
            .unwrap_or(draw))
    }
}
