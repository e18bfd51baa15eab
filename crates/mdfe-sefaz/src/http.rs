//! # HTTP Authority Adapter
//!
//! Production [`AuthorityAdapter`] over a `reqwest::Client`. The wire
//! format here is the JSON contract of the gateway deployment in front
//! of the authority; it is deliberately confined to this module — the
//! rest of the stack sees only [`AuthorityResponse`].
//!
//! ## Error Mapping
//!
//! - request timeout → [`TransportFailureKind::Timeout`]
//! - connection failure → [`TransportFailureKind::Connect`]
//! - HTTP 5xx → [`TransportFailureKind::ServerError`] with a body excerpt
//! - unparseable body → [`TransportFailureKind::Malformed`]
//! - HTTP 4xx with a parseable fiscal body → a regular
//!   [`AuthorityResponse`] (the authority's own rejection travels in the
//!   body, whatever the HTTP status)
//!
//! Retries are NOT built in — the [`crate::client::TransmissionClient`]
//! owns retry policy.

use std::time::Duration;

use async_trait::async_trait;
use mdfe_core::{AccessKey, ProtocolNumber, Timestamp};
use mdfe_crypto::SignedEnvelope;
use serde::{Deserialize, Serialize};

use crate::adapter::{AuthorityAdapter, AuthorityResponse, TransportFailure};
use crate::error::TransmissionError;

/// Deployment tier of the authority service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    /// Live fiscal environment.
    Production,
    /// Homologation (testing) environment.
    Homologation,
}

impl Environment {
    /// The single-digit wire code (`tpAmb`).
    pub fn code(&self) -> u8 {
        match self {
            Self::Production => 1,
            Self::Homologation => 2,
        }
    }
}

/// Configuration for the HTTP authority adapter.
///
/// Explicitly constructed and owned by the adapter — there is no
/// process-wide configuration singleton.
#[derive(Debug, Clone)]
pub struct SefazEndpointConfig {
    /// Base URL of the authority gateway.
    pub base_url: String,
    /// Bearer token for gateway authentication.
    pub api_token: String,
    /// Client-level request timeout in seconds (default: 30). The
    /// per-call timeout enforced by the transmission client is usually
    /// tighter; this one is the hard floor.
    pub timeout_secs: u64,
    /// Deployment tier.
    pub environment: Environment,
}

impl SefazEndpointConfig {
    /// Create a configuration with the default timeout.
    pub fn new(
        base_url: impl Into<String>,
        api_token: impl Into<String>,
        environment: Environment,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: api_token.into(),
            timeout_secs: 30,
            environment,
        }
    }
}

/// HTTP client for the authority gateway.
#[derive(Debug)]
pub struct HttpAuthorityAdapter {
    client: reqwest::Client,
    base_url: String,
    environment: Environment,
}

/// Wire shape of the gateway's response body.
#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(rename = "cStat")]
    status_code: u16,
    #[serde(rename = "xMotivo")]
    message: String,
    #[serde(rename = "nProt")]
    protocol: Option<String>,
    #[serde(rename = "dhRecbto")]
    processed_at: Option<String>,
}

#[derive(Serialize)]
struct WireSubmission<'a> {
    #[serde(rename = "tpAmb")]
    environment: u8,
    envelope: &'a SignedEnvelope,
}

impl HttpAuthorityAdapter {
    /// Build an adapter from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TransmissionError::Config`] for an unusable base URL or
    /// token.
    pub fn new(config: SefazEndpointConfig) -> Result<Self, TransmissionError> {
        url::Url::parse(&config.base_url)
            .map_err(|e| TransmissionError::Config(format!("invalid base URL: {e}")))?;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&format!("Bearer {}", config.api_token))
                .map_err(|_| {
                    TransmissionError::Config("invalid API token characters".to_string())
                })?,
        );
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| TransmissionError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            environment: config.environment,
        })
    }

    async fn exchange(
        &self,
        request: reqwest::RequestBuilder,
        operation: &str,
    ) -> Result<AuthorityResponse, TransportFailure> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportFailure::timeout(format!("{operation}: {e}"))
            } else {
                TransportFailure::connect(format!("{operation}: {e}"))
            }
        })?;

        let status = response.status();
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(200).collect();
            return Err(TransportFailure::server_error(format!(
                "{operation}: HTTP {status} — {excerpt}"
            )));
        }

        let body = response.text().await.map_err(|e| {
            TransportFailure::malformed(format!("{operation}: reading body: {e}"))
        })?;
        let wire: WireResponse = serde_json::from_str(&body).map_err(|e| {
            TransportFailure::malformed(format!("{operation}: HTTP {status}: {e}"))
        })?;

        let protocol = match wire.protocol {
            Some(raw) => Some(ProtocolNumber::new(&raw).map_err(|e| {
                TransportFailure::malformed(format!("{operation}: nProt: {e}"))
            })?),
            None => None,
        };

        Ok(AuthorityResponse {
            status_code: wire.status_code,
            message: wire.message,
            protocol,
            processed_at: wire
                .processed_at
                .as_deref()
                .and_then(|s| Timestamp::parse(s).ok()),
        })
    }
}

#[async_trait]
impl AuthorityAdapter for HttpAuthorityAdapter {
    async fn submit(
        &self,
        envelope: &SignedEnvelope,
    ) -> Result<AuthorityResponse, TransportFailure> {
        let url = format!("{}/mdfe", self.base_url);
        let body = WireSubmission {
            environment: self.environment.code(),
            envelope,
        };
        tracing::debug!(url = %url, "submitting signed document");
        self.exchange(self.client.post(&url).json(&body), "submit")
            .await
    }

    async fn query(&self, key: &AccessKey) -> Result<AuthorityResponse, TransportFailure> {
        let url = format!(
            "{}/mdfe/{}?tpAmb={}",
            self.base_url,
            key.as_str(),
            self.environment.code()
        );
        self.exchange(self.client.get(&url), "query").await
    }

    async fn send_event(
        &self,
        envelope: &SignedEnvelope,
    ) -> Result<AuthorityResponse, TransportFailure> {
        let url = format!("{}/mdfe/eventos", self.base_url);
        let body = WireSubmission {
            environment: self.environment.code(),
            envelope,
        };
        tracing::debug!(url = %url, "sending lifecycle event");
        self.exchange(self.client.post(&url).json(&body), "send_event")
            .await
    }

    async fn service_status(&self) -> Result<AuthorityResponse, TransportFailure> {
        let url = format!(
            "{}/status?tpAmb={}",
            self.base_url,
            self.environment.code()
        );
        self.exchange(self.client.get(&url), "service_status").await
    }

    fn adapter_name(&self) -> &str {
        "HttpAuthorityAdapter"
    }
}
