//! Signed connection URLs for the Spark service
//!
//! Every upstream session needs a URL carrying a short-lived HMAC-SHA256
//! signature over the host, the request date and the request line. Signing
//! is pure apart from reading the clock; no network call happens here.

use crate::config::SparkConfig;
use crate::error::{GatewayError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use std::sync::Arc;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

/// RFC 1123 date as required by the signature scheme
const RFC1123_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Source of the current time used in the `date` parameter
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// A connection URL that is valid for a short window after `issued_at`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEndpoint {
    /// Full `wss://` URL including the authorization query
    pub url: String,
    /// Time used for the signature
    pub issued_at: DateTime<Utc>,
}

/// Produces signed connection URLs from the service credentials
#[derive(Clone)]
pub struct Signer {
    app_id: String,
    api_key: String,
    api_secret: String,
    base_url: String,
    clock: Clock,
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("app_id", &self.app_id)
            .field("base_url", &self.base_url)
            .field("configured", &self.is_configured())
            .finish()
    }
}

impl Signer {
    /// Create a signer that reads the system clock
    pub fn new(
        app_id: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            base_url: base_url.into(),
            clock: Arc::new(Utc::now),
        }
    }

    /// Create a signer from the `spark` configuration section
    pub fn from_config(config: &SparkConfig) -> Self {
        Self::new(
            config.app_id.clone(),
            config.api_key.clone(),
            config.api_secret.clone(),
            config.url.clone(),
        )
    }

    /// Replace the clock, mainly so tests can pin the signed date
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Application id sent in every request header
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// True when all four credential fields are present
    pub fn is_configured(&self) -> bool {
        !self.app_id.trim().is_empty()
            && !self.api_key.trim().is_empty()
            && !self.api_secret.trim().is_empty()
            && !self.base_url.trim().is_empty()
    }

    /// Sign the base URL for the current instant
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::AuthUnavailable`] when a credential is empty
    /// or the base URL has no host.
    ///
    /// # Examples
    ///
    /// ```
    /// use fate_gateway::signer::Signer;
    ///
    /// let signer = Signer::new("app", "key", "secret", "wss://spark-api.example.com/v1/x1");
    /// let endpoint = signer.sign().unwrap();
    /// assert!(endpoint.url.contains("authorization="));
    ///
    /// assert!(Signer::new("", "key", "secret", "wss://h/p").sign().is_err());
    /// ```
    pub fn sign(&self) -> Result<SignedEndpoint> {
        if !self.is_configured() {
            return Err(GatewayError::AuthUnavailable.into());
        }

        let mut url = Url::parse(self.base_url.trim()).map_err(|_| GatewayError::AuthUnavailable)?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(GatewayError::AuthUnavailable.into()),
        };

        let issued_at = (self.clock)();
        let date = issued_at.format(RFC1123_FORMAT).to_string();
        let signature = self.signature(&host, &date, url.path())?;

        let authorization_origin = format!(
            "api_key=\"{}\", algorithm=\"hmac-sha256\", headers=\"host date request-line\", signature=\"{}\"",
            self.api_key, signature
        );
        let authorization = STANDARD.encode(authorization_origin.as_bytes());

        url.query_pairs_mut()
            .append_pair("authorization", &authorization)
            .append_pair("date", &date)
            .append_pair("host", &host);

        tracing::debug!(host = %host, date = %date, "Signed upstream URL");

        Ok(SignedEndpoint {
            url: url.to_string(),
            issued_at,
        })
    }

    fn signature(&self, host: &str, date: &str, path: &str) -> Result<String> {
        let canonical = canonical_string(host, date, path);
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|_| GatewayError::AuthUnavailable)?;
        mac.update(canonical.as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }
}

/// The three signed lines, newline separated
fn canonical_string(host: &str, date: &str, path: &str) -> String {
    format!("host: {}\ndate: {}\nGET {} HTTP/1.1", host, date, path)
}
