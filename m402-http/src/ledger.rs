//! A [`LedgerVerifier`] that asks a remote ledger query service over HTTP.
//!
//! [`RemoteLedger`] posts `{ proof, requirement }` to `./verify` under its
//! base URL and expects a JSON verdict tagged by `status`:
//!
//! ```json
//! { "status": "verified" }
//! { "status": "insufficient", "paid": 5000000, "required": 15000000 }
//! { "status": "invalid", "reason": "unknown transfer" }
//! { "status": "unavailable", "reason": "rpc node lagging" }
//! ```
//!
//! Transport failures, timeouts, unreadable bodies and `5xx`/`408`/`429`
//! answers become [`Verification::Unreachable`], so a paying caller is told to
//! retry rather than that the payment was rejected. Other `4xx` answers mean
//! the service refused the proof and become [`Verification::Invalid`].

use std::fmt::Display;
use std::time::Duration;

use http::{HeaderMap, StatusCode};
use m402::verifier::{LedgerVerifier, Verification};
use m402::{BoxFuture, PaymentProof, PaymentRequirement};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::instrument;

/// Body of `POST /verify`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyBody {
    /// The caller's proof.
    pub proof: PaymentProof,
    /// What the proof must satisfy.
    pub requirement: PaymentRequirement,
}

/// Verdict returned by the ledger query service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LedgerVerdict {
    /// The transfer settled and satisfies the requirement.
    Verified,
    /// The transfer pays too little.
    Insufficient {
        /// Amount transferred.
        paid: u64,
        /// Amount required.
        required: u64,
    },
    /// The proof is unknown, reversed or mismatched.
    Invalid {
        /// Why.
        reason: String,
    },
    /// The service itself could not reach the ledger.
    Unavailable {
        /// Why.
        reason: String,
    },
}

impl From<LedgerVerdict> for Verification {
    fn from(verdict: LedgerVerdict) -> Self {
        match verdict {
            LedgerVerdict::Verified => Self::Verified,
            LedgerVerdict::Insufficient { paid, required } => Self::Insufficient { paid, required },
            LedgerVerdict::Invalid { reason } => Self::Invalid { reason },
            LedgerVerdict::Unavailable { reason } => Self::Unreachable { reason },
        }
    }
}

/// Errors that can occur while querying a remote ledger.
#[derive(Debug, thiserror::Error)]
pub enum RemoteLedgerError {
    /// URL parse error.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// HTTP transport error, including timeouts.
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// JSON deserialization error.
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// Unexpected HTTP status code.
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        /// Human-readable context.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The response body.
        body: String,
    },
    /// Failed to read response body.
    #[error("Failed to read response body as text: {context}: {source}")]
    ResponseBodyRead {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
}

impl RemoteLedgerError {
    /// Returns `true` if the error says nothing about the proof itself and
    /// the same query may succeed later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::HttpStatus { status, .. } => {
                status.is_server_error()
                    || *status == StatusCode::REQUEST_TIMEOUT
                    || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::UrlParse { .. } => false,
            Self::Http { .. } | Self::JsonDeserialization { .. } | Self::ResponseBodyRead { .. } => {
                true
            }
        }
    }
}

impl From<RemoteLedgerError> for Verification {
    fn from(error: RemoteLedgerError) -> Self {
        if error.is_transient() {
            Self::unreachable(error.to_string())
        } else {
            Self::invalid(error.to_string())
        }
    }
}

/// A client for a remote ledger query service.
#[derive(Clone, Debug)]
pub struct RemoteLedger {
    /// Base URL of the service (e.g. `https://ledger.example/`)
    base_url: Url,
    /// Full URL to `POST /verify` requests
    verify_url: Url,
    /// Shared Reqwest HTTP client
    client: Client,
    /// Optional custom headers sent with each request
    headers: HeaderMap,
    /// Optional request timeout
    timeout: Option<Duration>,
}

impl RemoteLedger {
    /// Returns the base URL used by this client.
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the computed `./verify` URL relative to [`RemoteLedger::base_url`].
    pub const fn verify_url(&self) -> &Url {
        &self.verify_url
    }

    /// Returns the configured timeout, if any.
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Constructs a new [`RemoteLedger`] from a base URL.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteLedgerError`] if URL construction fails.
    pub fn try_new(base_url: Url) -> Result<Self, RemoteLedgerError> {
        let verify_url = base_url
            .join("./verify")
            .map_err(|e| RemoteLedgerError::UrlParse {
                context: "Failed to construct ./verify URL",
                source: e,
            })?;
        Ok(Self {
            base_url,
            verify_url,
            client: Client::new(),
            headers: HeaderMap::new(),
            timeout: None,
        })
    }

    /// Attaches custom headers to all future requests.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets a timeout for all future requests.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sends a `POST /verify` request.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteLedgerError`] if the request fails or the answer is not
    /// a verdict.
    #[cfg_attr(
        feature = "telemetry",
        instrument(
            name = "m402.remote_ledger.verify",
            skip_all,
            fields(signature = %proof.signature, timeout = ?self.timeout),
            err
        )
    )]
    pub async fn query(
        &self,
        proof: &PaymentProof,
        requirement: &PaymentRequirement,
    ) -> Result<LedgerVerdict, RemoteLedgerError> {
        let context = "POST /verify";
        let body = VerifyBody {
            proof: proof.clone(),
            requirement: requirement.clone(),
        };
        let mut req = self.client.post(self.verify_url.clone()).json(&body);
        for (key, value) in &self.headers {
            req = req.header(key, value);
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let http_response = req
            .send()
            .await
            .map_err(|e| RemoteLedgerError::Http { context, source: e })?;

        let result = if http_response.status() == StatusCode::OK {
            http_response
                .json::<LedgerVerdict>()
                .await
                .map_err(|e| RemoteLedgerError::JsonDeserialization { context, source: e })
        } else {
            let status = http_response.status();
            let body = http_response
                .text()
                .await
                .map_err(|e| RemoteLedgerError::ResponseBodyRead { context, source: e })?;
            Err(RemoteLedgerError::HttpStatus {
                context,
                status,
                body,
            })
        };

        record_result(&result);

        result
    }
}

impl LedgerVerifier for RemoteLedger {
    fn verify<'a>(
        &'a self,
        proof: &'a PaymentProof,
        requirement: &'a PaymentRequirement,
    ) -> BoxFuture<'a, Verification> {
        Box::pin(async move {
            match self.query(proof, requirement).await {
                Ok(verdict) => verdict.into(),
                Err(e) => e.into(),
            }
        })
    }
}

/// Converts a string URL into a `RemoteLedger`, parsing the URL and calling `try_new`.
impl TryFrom<&str> for RemoteLedger {
    type Error = RemoteLedgerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        // Normalize: strip trailing slashes and add a single trailing slash
        let mut normalized = value.trim_end_matches('/').to_owned();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|e| RemoteLedgerError::UrlParse {
            context: "Failed to parse base url",
            source: e,
        })?;
        Self::try_new(url)
    }
}

/// Logs a failed ledger query.
#[cfg(feature = "telemetry")]
fn record_result<R, E: Display>(result: &Result<R, E>) {
    if let Err(err) = result {
        tracing::warn!(error = %err, "ledger query failed");
    }
}

/// Noop if telemetry feature is off.
#[cfg(not(feature = "telemetry"))]
fn record_result<R, E: Display>(_result: &Result<R, E>) {}

#[cfg(test)]
mod tests {
    use super::*;
    use m402::tool::Asset;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn requirement() -> PaymentRequirement {
        PaymentRequirement {
            amount: 15_000_000,
            asset: Asset::new("mint"),
            currency: "USDC".into(),
            recipient: "R".into(),
            description: "Place a pizza order".into(),
            network: "solana-devnet".into(),
        }
    }

    fn proof() -> PaymentProof {
        PaymentProof::new("sig-1", 15_000_000, "W")
    }

    async fn ledger_answering(template: ResponseTemplate) -> (MockServer, RemoteLedger) {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(template)
            .mount(&mock_server)
            .await;
        let ledger = RemoteLedger::try_from(mock_server.uri().as_str()).unwrap();
        (mock_server, ledger)
    }

    #[tokio::test]
    async fn verified_verdict() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .and(body_partial_json(json!({
                "proof": {"signature": "sig-1", "amount": "15000000"},
                "requirement": {"recipient": "R", "amount": "15000000"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "verified"})))
            .expect(1)
            .mount(&mock_server)
            .await;
        let ledger = RemoteLedger::try_new(mock_server.uri().parse::<Url>().unwrap()).unwrap();

        assert_eq!(
            ledger.verify(&proof(), &requirement()).await,
            Verification::Verified
        );
    }

    #[tokio::test]
    async fn insufficient_and_invalid_verdicts() {
        let (_server, ledger) = ledger_answering(ResponseTemplate::new(200).set_body_json(
            json!({"status": "insufficient", "paid": 5_000_000, "required": 15_000_000}),
        ))
        .await;
        assert_eq!(
            ledger.verify(&proof(), &requirement()).await,
            Verification::Insufficient {
                paid: 5_000_000,
                required: 15_000_000
            }
        );

        let (_server, ledger) = ledger_answering(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "invalid", "reason": "reversed"})),
        )
        .await;
        assert_eq!(
            ledger.verify(&proof(), &requirement()).await,
            Verification::invalid("reversed")
        );
    }

    #[tokio::test]
    async fn server_errors_are_unreachable() {
        let (_server, ledger) = ledger_answering(ResponseTemplate::new(503)).await;
        assert!(matches!(
            ledger.verify(&proof(), &requirement()).await,
            Verification::Unreachable { .. }
        ));
    }

    #[tokio::test]
    async fn client_errors_are_invalid() {
        let (_server, ledger) =
            ledger_answering(ResponseTemplate::new(422).set_body_string("bad signature")).await;
        match ledger.verify(&proof(), &requirement()).await {
            Verification::Invalid { reason } => assert!(reason.contains("bad signature")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn garbled_answers_are_unreachable() {
        let (_server, ledger) =
            ledger_answering(ResponseTemplate::new(200).set_body_string("<html>")).await;
        assert!(matches!(
            ledger.verify(&proof(), &requirement()).await,
            Verification::Unreachable { .. }
        ));
    }

    #[tokio::test]
    async fn timeouts_are_unreachable() {
        let (_server, ledger) = ledger_answering(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "verified"}))
                .set_delay(Duration::from_millis(500)),
        )
        .await;
        let ledger = ledger.with_timeout(Duration::from_millis(50));
        assert!(matches!(
            ledger.verify(&proof(), &requirement()).await,
            Verification::Unreachable { .. }
        ));
    }

    #[test]
    fn trailing_slashes_are_normalized() {
        let ledger = RemoteLedger::try_from("https://ledger.example/api//").unwrap();
        assert_eq!(ledger.verify_url().as_str(), "https://ledger.example/api/verify");
    }
}
