//! A [`ToolCaller`] that posts JSON-RPC envelopes to a remote endpoint.
//!
//! Plug [`HttpToolCaller`] into [`m402::client::PaidToolClient`] to drive the
//! payment flow against a server built with [`crate::server::rpc_router`].

use std::time::Duration;

use http::{HeaderMap, StatusCode};
use m402::BoxFuture;
use m402::call::{CallId, CallRequest, Outcome};
use m402::client::{ClientError, ToolCaller};
use m402::codec::{self, ToolList};
use reqwest::Client;
use url::Url;

/// Calls tools on a remote JSON-RPC endpoint.
#[derive(Clone, Debug)]
pub struct HttpToolCaller {
    /// Full URL of the JSON-RPC endpoint (e.g. `https://tools.example/rpc`)
    endpoint: Url,
    client: Client,
    headers: HeaderMap,
    timeout: Option<Duration>,
}

impl HttpToolCaller {
    /// Creates a caller posting to `endpoint`.
    #[must_use]
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            client: Client::new(),
            headers: HeaderMap::new(),
            timeout: None,
        }
    }

    /// Returns the endpoint URL.
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
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

    /// Asks the endpoint which tools it offers and what they cost.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the endpoint cannot be reached
    /// and [`ClientError::Envelope`] if the answer is malformed.
    pub async fn list_tools(&self, id: impl Into<CallId>) -> Result<ToolList, ClientError> {
        let body = codec::encode_list_request(&id.into())
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let bytes = self.post(body).await?;
        Ok(codec::decode_tool_list(&bytes)?)
    }

    async fn post(&self, body: Vec<u8>) -> Result<Vec<u8>, ClientError> {
        let mut req = self
            .client
            .post(self.endpoint.clone())
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(body);
        for (key, value) in &self.headers {
            req = req.header(key, value);
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let response = req
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let status = response.status();
        // JSON-RPC errors travel in 200 bodies; anything else is the transport's.
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Transport(format!("HTTP {status}: {body}")));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

impl ToolCaller for HttpToolCaller {
    fn call(&self, request: CallRequest) -> BoxFuture<'_, Result<Outcome, ClientError>> {
        Box::pin(async move {
            let body = codec::encode_request(&request)
                .map_err(|e| ClientError::Transport(e.to_string()))?;
            let bytes = self.post(body).await?;
            let (id, outcome) = codec::decode_response(&bytes)?;
            if id.as_ref().is_some_and(|id| *id != request.id) {
                return Err(ClientError::Envelope(codec::EnvelopeError::InvalidRequest(
                    format!("response id does not match request id {}", request.id),
                )));
            }
            Ok(outcome)
        })
    }
}
