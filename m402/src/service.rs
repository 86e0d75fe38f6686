//! Bytes-in, envelope-out entry point for transports.

use std::sync::Arc;

use crate::call::{CallId, Outcome};
use crate::codec::{self, Inbound, RpcResponse};
use crate::invoke::Invoker;

/// Decodes a request, runs it and encodes the answer.
///
/// Transports (HTTP, stdio, ...) hand raw request bytes to
/// [`RpcService::handle`] and write back the returned envelope.
#[derive(Debug, Clone)]
pub struct RpcService {
    invoker: Arc<Invoker>,
}

impl RpcService {
    /// Wraps an invoker.
    #[must_use]
    pub const fn new(invoker: Arc<Invoker>) -> Self {
        Self { invoker }
    }

    /// Returns the invoker.
    #[must_use]
    pub const fn invoker(&self) -> &Arc<Invoker> {
        &self.invoker
    }

    /// Handles one request envelope.
    pub async fn handle(&self, bytes: &[u8]) -> RpcResponse {
        match codec::decode_request(bytes) {
            Err(e) => {
                #[cfg(feature = "telemetry")]
                tracing::info!(code = e.error.code(), error = %e, "rejected malformed request");
                codec::encode_decode_error(&e)
            }
            Ok(Inbound::ListTools { id }) => {
                let registry = self.invoker.registry().await;
                codec::encode_tool_list(&id, &registry)
            }
            Ok(Inbound::CallTool(request)) => {
                let id = request.id.clone();
                let tool = request.tool_name.clone();
                let outcome = self.invoker.invoke(request).await;
                record_outcome(&id, &tool, &outcome);
                codec::encode_outcome(&id, &outcome)
            }
        }
    }
}

/// Logs how a call ended. A payment-required answer is a normal branch and
/// is only logged at debug level.
#[cfg(feature = "telemetry")]
fn record_outcome(id: &CallId, tool: &str, outcome: &Outcome) {
    match outcome {
        Outcome::Success(_) => tracing::info!(call_id = %id, tool, "tool call completed"),
        Outcome::PaymentRequired(requirement) => tracing::debug!(
            call_id = %id,
            tool,
            amount = requirement.amount,
            currency = %requirement.currency,
            "payment required"
        ),
        Outcome::Failure(failure)
            if failure.kind.is_retryable()
                || failure.kind == crate::ErrorKind::HandlerError =>
        {
            tracing::warn!(call_id = %id, tool, kind = %failure.kind, message = %failure.message, "tool call failed");
        }
        Outcome::Failure(failure) => {
            tracing::info!(call_id = %id, tool, kind = %failure.kind, message = %failure.message, "tool call refused");
        }
    }
}

/// Noop if telemetry feature is off.
#[cfg(not(feature = "telemetry"))]
const fn record_outcome(_id: &CallId, _tool: &str, _outcome: &Outcome) {}
