//! The invocation state machine.
//!
//! [`Invoker::invoke`] drives a single [`CallRequest`] to an [`Outcome`]:
//!
//! ```text
//! Received ─┬─> Unpriced ──────────────────────────────> Completed | HandlerFailed
//!           └─> PriceCheck ─┬─> NoProofSupplied ──────> PaymentRequired
//!                           └─> ProofSupplied ─> Verifying ─┬─> Rejected
//!                                                           ├─> VerifierUnavailable
//!                                                           └─> Accepted ─> Executing
//!                                                               ─> Completed | HandlerFailed
//! ```
//!
//! Paid calls run their verify, claim, execute and record steps on a
//! spawned task. Dropping the future returned by `invoke` does not cancel
//! that task: the signature is still consumed and the result still cached,
//! so a resumed duplicate with the same id receives it.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::RwLock;

use crate::call::{CallId, CallRequest, Outcome};
use crate::error::ErrorKind;
use crate::proof::PaymentProof;
use crate::registry::ToolRegistry;
use crate::replay::{Claim, InMemoryReplayStore, ProofRecord, ProofState, ReplayStore};
use crate::requirement::{self, PaymentRequirement};
use crate::tool::{ToolDescriptor, ToolResult};
use crate::value::Map;
use crate::verifier::{LedgerVerifier, Verification};
use crate::PAYMENT_ARGUMENT_KEY;

/// Default bound on a single ledger query.
pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// States a call moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    /// The request was accepted for processing.
    Received,
    /// The tool is free; payment logic is skipped.
    Unpriced,
    /// The tool is priced.
    PriceCheck,
    /// A priced tool was called without a proof.
    NoProofSupplied,
    /// A priced tool was called with a proof.
    ProofSupplied,
    /// The ledger is being queried.
    Verifying,
    /// The ledger accepted the proof.
    Accepted,
    /// The tool is running.
    Executing,
    /// The caller must pay first.
    PaymentRequired,
    /// The ledger refused the proof.
    Rejected,
    /// The ledger could not be queried.
    VerifierUnavailable,
    /// The tool produced a result.
    Completed,
    /// The tool failed.
    HandlerFailed,
}

impl InvocationState {
    /// Returns the `snake_case` name of the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Unpriced => "unpriced",
            Self::PriceCheck => "price_check",
            Self::NoProofSupplied => "no_proof_supplied",
            Self::ProofSupplied => "proof_supplied",
            Self::Verifying => "verifying",
            Self::Accepted => "accepted",
            Self::Executing => "executing",
            Self::PaymentRequired => "payment_required",
            Self::Rejected => "rejected",
            Self::VerifierUnavailable => "verifier_unavailable",
            Self::Completed => "completed",
            Self::HandlerFailed => "handler_failed",
        }
    }

    /// Returns `true` if a call ends in this state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::PaymentRequired
                | Self::Rejected
                | Self::VerifierUnavailable
                | Self::Completed
                | Self::HandlerFailed
        )
    }
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunables of the [`Invoker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvokerConfig {
    /// Upper bound on a single ledger query. On expiry the call resolves to
    /// [`ErrorKind::VerifierUnavailable`].
    pub verify_timeout: Duration,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            verify_timeout: DEFAULT_VERIFY_TIMEOUT,
        }
    }
}

/// Drives tool calls through the payment state machine.
///
/// # Examples
///
/// ```rust,ignore
/// let invoker = Invoker::new(registry, Arc::new(ledger));
/// match invoker.invoke(CallRequest::new(1, "place-pizza-order")).await {
///     Outcome::PaymentRequired(requirement) => { /* pay, then retry with a proof */ }
///     other => { /* ... */ }
/// }
/// ```
pub struct Invoker {
    registry: RwLock<Arc<ToolRegistry>>,
    verifier: Arc<dyn LedgerVerifier>,
    replay: Arc<dyn ReplayStore>,
    config: InvokerConfig,
}

impl fmt::Debug for Invoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invoker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Invoker {
    /// Creates an invoker with an [`InMemoryReplayStore`] and default config.
    pub fn new(registry: ToolRegistry, verifier: Arc<dyn LedgerVerifier>) -> Self {
        Self {
            registry: RwLock::new(Arc::new(registry)),
            verifier,
            replay: Arc::new(InMemoryReplayStore::default()),
            config: InvokerConfig::default(),
        }
    }

    /// Replaces the anti-replay store.
    #[must_use]
    pub fn with_replay_store(mut self, replay: Arc<dyn ReplayStore>) -> Self {
        self.replay = replay;
        self
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: InvokerConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &InvokerConfig {
        &self.config
    }

    /// Returns the anti-replay store.
    #[must_use]
    pub fn replay_store(&self) -> &Arc<dyn ReplayStore> {
        &self.replay
    }

    /// Returns the current registry.
    pub async fn registry(&self) -> Arc<ToolRegistry> {
        Arc::clone(&*self.registry.read().await)
    }

    /// Swaps in a new registry.
    ///
    /// Calls that already looked up their tool keep the old descriptor and
    /// its price.
    pub async fn reload(&self, registry: ToolRegistry) {
        *self.registry.write().await = Arc::new(registry);
    }

    /// Drives one call to its outcome.
    pub async fn invoke(&self, request: CallRequest) -> Outcome {
        let CallRequest {
            id,
            tool_name,
            mut arguments,
            payment_proof,
        } = request;
        arguments.remove(PAYMENT_ARGUMENT_KEY);
        enter(&id, &tool_name, InvocationState::Received);

        let tool = match self.registry().await.lookup(&tool_name) {
            Ok(tool) => tool,
            Err(e) => return Outcome::failure(ErrorKind::ToolNotFound, e.to_string()),
        };

        let Ok(requirement) = requirement::issue(&tool) else {
            enter(&id, &tool_name, InvocationState::Unpriced);
            enter(&id, &tool_name, InvocationState::Executing);
            return finish(&id, &tool_name, execute(&tool, arguments).await);
        };
        enter(&id, &tool_name, InvocationState::PriceCheck);

        let Some(proof) = payment_proof else {
            enter(&id, &tool_name, InvocationState::NoProofSupplied);
            enter(&id, &tool_name, InvocationState::PaymentRequired);
            return Outcome::PaymentRequired(requirement);
        };
        enter(&id, &tool_name, InvocationState::ProofSupplied);

        if let Some(record) = self.replay.lookup(&proof.signature).await
            && let Some(outcome) = resolve_held(&id, record)
        {
            return outcome;
        }

        let paid = PaidCall {
            id,
            tool,
            arguments,
            proof,
            requirement,
            verifier: Arc::clone(&self.verifier),
            replay: Arc::clone(&self.replay),
            verify_timeout: self.config.verify_timeout,
        };
        match tokio::spawn(paid.run()).await {
            Ok(outcome) => outcome,
            // Verifier and handler panics are caught inside the task.
            Err(e) => Outcome::failure(
                ErrorKind::VerifierUnavailable,
                format!("payment processing aborted, retry later: {e}"),
            ),
        }
    }
}

/// Everything a paid call needs, owned so it can outlive the caller.
struct PaidCall {
    id: CallId,
    tool: Arc<ToolDescriptor>,
    arguments: Map,
    proof: PaymentProof,
    requirement: PaymentRequirement,
    verifier: Arc<dyn LedgerVerifier>,
    replay: Arc<dyn ReplayStore>,
    verify_timeout: Duration,
}

impl PaidCall {
    async fn run(self) -> Outcome {
        let Self {
            id,
            tool,
            arguments,
            proof,
            requirement,
            verifier,
            replay,
            verify_timeout,
        } = self;
        let name = tool.name();
        enter(&id, name, InvocationState::Verifying);

        let query = AssertUnwindSafe(async { verifier.verify(&proof, &requirement).await });
        let verdict = match tokio::time::timeout(verify_timeout, query.catch_unwind()).await {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(panic)) => {
                Verification::unreachable(panic_message("ledger verifier", panic.as_ref()))
            }
            Err(_) => Verification::unreachable(format!(
                "ledger did not answer within {verify_timeout:?}"
            )),
        };

        match verdict {
            Verification::Verified => enter(&id, name, InvocationState::Accepted),
            Verification::Insufficient { paid, required } => {
                enter(&id, name, InvocationState::Rejected);
                return Outcome::failure(
                    ErrorKind::PaymentRejected,
                    format!("payment of {paid} is below the required {required}"),
                );
            }
            Verification::Invalid { reason } => {
                enter(&id, name, InvocationState::Rejected);
                return Outcome::failure(
                    ErrorKind::PaymentRejected,
                    format!("payment proof rejected: {reason}"),
                );
            }
            Verification::Unreachable { reason } => {
                enter(&id, name, InvocationState::VerifierUnavailable);
                return Outcome::failure(
                    ErrorKind::VerifierUnavailable,
                    format!("ledger unavailable, retry later: {reason}"),
                );
            }
        }

        let signature = proof.signature.as_str();
        if let Claim::Held(record) = replay.check_and_set(signature, &id).await {
            return resolve_held(&id, record).unwrap_or_else(|| {
                Outcome::failure(ErrorKind::CallInProgress, "payment is being processed")
            });
        }

        enter(&id, name, InvocationState::Executing);
        let result = execute(&tool, arguments).await;
        replay.complete(signature, result.as_ref().ok().cloned()).await;
        finish(&id, name, result)
    }
}

/// Decides what a call gets when its signature is already consumed.
///
/// Returns `None` when the same call may proceed.
fn resolve_held(id: &CallId, record: ProofRecord) -> Option<Outcome> {
    if record.call_id != *id {
        return Some(Outcome::failure(
            ErrorKind::ProofAlreadyUsed,
            format!("payment proof was already used by call {}", record.call_id),
        ));
    }
    match record.state {
        ProofState::Completed(result) => Some(Outcome::Success(result)),
        ProofState::Executing => Some(Outcome::failure(
            ErrorKind::CallInProgress,
            "call is still executing, retry later",
        )),
        ProofState::Spent => None,
    }
}

fn finish(id: &CallId, tool: &str, result: Result<ToolResult, String>) -> Outcome {
    match result {
        Ok(result) => {
            enter(id, tool, InvocationState::Completed);
            Outcome::Success(result)
        }
        Err(message) => {
            enter(id, tool, InvocationState::HandlerFailed);
            Outcome::failure(ErrorKind::HandlerError, message)
        }
    }
}

/// Runs the handler, turning errors and panics into a message.
async fn execute(tool: &ToolDescriptor, arguments: Map) -> Result<ToolResult, String> {
    let run = AssertUnwindSafe(async { tool.handler().execute(arguments).await });
    match run.catch_unwind().await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => Err(e.message().to_owned()),
        Err(panic) => Err(panic_message("tool handler", panic.as_ref())),
    }
}

fn panic_message(source: &str, panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .map_or_else(
            || format!("{source} panicked"),
            |msg| format!("{source} panicked: {msg}"),
        )
}

#[cfg(feature = "telemetry")]
fn enter(id: &CallId, tool: &str, state: InvocationState) {
    tracing::debug!(call_id = %id, tool, state = state.as_str(), "invocation state");
}

/// Noop if telemetry feature is off.
#[cfg(not(feature = "telemetry"))]
const fn enter(_id: &CallId, _tool: &str, _state: InvocationState) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(InvocationState::PaymentRequired.is_terminal());
        assert!(InvocationState::HandlerFailed.is_terminal());
        assert!(!InvocationState::Verifying.is_terminal());
        assert!(!InvocationState::Executing.is_terminal());
    }

    #[test]
    fn held_by_other_call_is_already_used() {
        let record = ProofRecord {
            call_id: CallId::Number(3),
            state: ProofState::Spent,
        };
        let outcome = resolve_held(&CallId::Number(4), record).unwrap();
        assert_eq!(outcome.error_kind(), Some(ErrorKind::ProofAlreadyUsed));
    }

    #[test]
    fn spent_by_same_call_proceeds() {
        let record = ProofRecord {
            call_id: CallId::Number(3),
            state: ProofState::Spent,
        };
        assert!(resolve_held(&CallId::Number(3), record).is_none());
    }

    #[test]
    fn panic_payloads_are_reported() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(
            panic_message("tool handler", payload.as_ref()),
            "tool handler panicked: boom"
        );
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(
            panic_message("ledger verifier", payload.as_ref()),
            "ledger verifier panicked: bang"
        );
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(
            panic_message("tool handler", payload.as_ref()),
            "tool handler panicked"
        );
    }
}
