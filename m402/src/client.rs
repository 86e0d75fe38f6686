//! Caller-side driver for the payment flow.
//!
//! [`PaidToolClient`] calls a tool, and when the answer is *payment
//! required* it asks a [`PaymentAuthorizer`] (consent dialog plus wallet) for
//! a proof, then retries as a new call carrying that proof. Retryable
//! failures (see [`ErrorKind::is_retryable`](crate::ErrorKind::is_retryable))
//! and transport errors are resent unchanged, same id and same proof, with
//! exponential backoff.
//!
//! The transport is abstracted by [`ToolCaller`]. [`Invoker`] implements it
//! in-process; `m402-http` provides an HTTP implementation.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use rand::{RngExt, rng};

use crate::BoxFuture;
use crate::call::{CallId, CallRequest, Outcome};
use crate::codec::EnvelopeError;
use crate::error::Failure;
use crate::invoke::Invoker;
use crate::proof::PaymentProof;
use crate::requirement::PaymentRequirement;
use crate::tool::ToolResult;
use crate::value::Map;

/// Errors surfaced by [`PaidToolClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The authorizer declined to pay.
    #[error("payment for `{tool}` was declined")]
    PaymentDeclined {
        /// Tool that asked for payment.
        tool: String,
        /// What it asked for.
        requirement: Box<PaymentRequirement>,
    },
    /// The authorizer could not produce a proof.
    #[error("payment failed: {0}")]
    PaymentFailed(String),
    /// The server answered with a failure.
    #[error(transparent)]
    Call(#[from] Failure),
    /// The server asked for payment again although a proof was attached.
    #[error("payment was not accepted, server still requires {}", .0.amount)]
    PaymentNotAccepted(Box<PaymentRequirement>),
    /// The request could not be delivered or the response not read.
    #[error("transport error: {0}")]
    Transport(String),
    /// The response envelope was malformed.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

impl ClientError {
    /// Returns `true` if resending the identical request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Call(failure) => failure.kind.is_retryable(),
            _ => false,
        }
    }
}

/// Sends a call and returns its outcome.
pub trait ToolCaller: Send + Sync {
    /// Sends `request` and waits for its outcome.
    fn call(&self, request: CallRequest) -> BoxFuture<'_, Result<Outcome, ClientError>>;
}

impl ToolCaller for Invoker {
    fn call(&self, request: CallRequest) -> BoxFuture<'_, Result<Outcome, ClientError>> {
        Box::pin(async move { Ok(self.invoke(request).await) })
    }
}

impl<T: ToolCaller + ?Sized> ToolCaller for Arc<T> {
    fn call(&self, request: CallRequest) -> BoxFuture<'_, Result<Outcome, ClientError>> {
        (**self).call(request)
    }
}

/// Obtains user consent and pays a requirement.
///
/// Return `Ok(None)` when the user declines.
pub trait PaymentAuthorizer: Send + Sync {
    /// Pays `requirement` for a call to `tool` and returns the proof.
    fn authorize<'a>(
        &'a self,
        tool: &'a str,
        requirement: &'a PaymentRequirement,
    ) -> BoxFuture<'a, Result<Option<PaymentProof>, ClientError>>;
}

impl<T: PaymentAuthorizer + ?Sized> PaymentAuthorizer for Arc<T> {
    fn authorize<'a>(
        &'a self,
        tool: &'a str,
        requirement: &'a PaymentRequirement,
    ) -> BoxFuture<'a, Result<Option<PaymentProof>, ClientError>> {
        (**self).authorize(tool, requirement)
    }
}

/// How retryable failures are resent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per request, the first one included.
    pub max_attempts: u32,
    /// Delay before the first resend.
    pub initial_backoff: Duration,
    /// Upper bound on the delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy that never resends.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before resend number `retry` (starting at 1).
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2_u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Result of a call made through [`PaidToolClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaidCallResult {
    /// The tool result.
    pub result: ToolResult,
    /// The proof that paid for it, if the tool was priced.
    pub payment: Option<PaymentProof>,
}

impl PaidCallResult {
    /// Returns `true` if a payment was made.
    #[must_use]
    pub const fn paid(&self) -> bool {
        self.payment.is_some()
    }
}

/// Drives the unpaid call, payment and paid retry for the caller.
pub struct PaidToolClient<C, A> {
    caller: C,
    authorizer: A,
    retry: RetryPolicy,
    next_id: AtomicI64,
}

impl<C, A> fmt::Debug for PaidToolClient<C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaidToolClient")
            .field("retry", &self.retry)
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}

impl<C: ToolCaller, A: PaymentAuthorizer> PaidToolClient<C, A> {
    /// Creates a client with the default retry policy.
    ///
    /// Call ids start at a random offset so that separate clients, or one
    /// client after a restart, do not reuse each other's ids.
    pub fn new(caller: C, authorizer: A) -> Self {
        let first_id: u32 = rng().random();
        Self {
            caller,
            authorizer,
            retry: RetryPolicy::default(),
            next_id: AtomicI64::new(i64::from(first_id)),
        }
    }

    /// Starts call ids at `first_id` instead of a random offset.
    #[must_use]
    pub fn with_first_call_id(self, first_id: i64) -> Self {
        self.next_id.store(first_id, Ordering::Relaxed);
        self
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the underlying caller.
    pub const fn caller(&self) -> &C {
        &self.caller
    }

    /// Calls a tool, paying for it if the server asks to.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the call fails, the payment is declined or
    /// fails, or the server still asks for payment after the paid retry.
    pub async fn call_tool(&self, name: &str, arguments: Map) -> Result<PaidCallResult, ClientError> {
        let unpaid = CallRequest::new(self.next_id(), name).with_arguments(arguments.clone());
        let requirement = match self.send(unpaid).await? {
            Outcome::Success(result) => {
                return Ok(PaidCallResult {
                    result,
                    payment: None,
                });
            }
            Outcome::Failure(failure) => return Err(failure.into()),
            Outcome::PaymentRequired(requirement) => requirement,
        };

        #[cfg(feature = "telemetry")]
        tracing::debug!(tool = name, amount = requirement.amount, "payment required, asking authorizer");

        let proof = self
            .authorizer
            .authorize(name, &requirement)
            .await?
            .ok_or_else(|| ClientError::PaymentDeclined {
                tool: name.to_owned(),
                requirement: Box::new(requirement),
            })?;

        let paid = CallRequest::new(self.next_id(), name)
            .with_arguments(arguments)
            .with_payment(proof.clone());
        match self.send(paid).await? {
            Outcome::Success(result) => Ok(PaidCallResult {
                result,
                payment: Some(proof),
            }),
            Outcome::PaymentRequired(requirement) => {
                Err(ClientError::PaymentNotAccepted(Box::new(requirement)))
            }
            Outcome::Failure(failure) => Err(failure.into()),
        }
    }

    /// Sends one request, resending it unchanged on retryable failures.
    async fn send(&self, request: CallRequest) -> Result<Outcome, ClientError> {
        let mut attempt = 1;
        loop {
            let result = self.caller.call(request.clone()).await;
            let retryable = match &result {
                Ok(Outcome::Failure(failure)) => failure.kind.is_retryable(),
                Ok(_) => false,
                Err(e) => e.is_retryable(),
            };
            if !retryable || attempt >= self.retry.max_attempts {
                return result;
            }
            let delay = self.retry.backoff(attempt);
            #[cfg(feature = "telemetry")]
            tracing::debug!(call_id = %request.id, attempt, ?delay, "resending call");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn next_id(&self) -> CallId {
        CallId::Number(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::tool::Asset;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct Scripted {
        replies: Mutex<VecDeque<Result<Outcome, ClientError>>>,
        seen: Mutex<Vec<CallRequest>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<Outcome, ClientError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl ToolCaller for Scripted {
        fn call(&self, request: CallRequest) -> BoxFuture<'_, Result<Outcome, ClientError>> {
            self.seen.lock().unwrap().push(request);
            let reply = self.replies.lock().unwrap().pop_front().unwrap();
            Box::pin(async move { reply })
        }
    }

    struct Wallet(Option<PaymentProof>);

    impl PaymentAuthorizer for Wallet {
        fn authorize<'a>(
            &'a self,
            _tool: &'a str,
            _requirement: &'a PaymentRequirement,
        ) -> BoxFuture<'a, Result<Option<PaymentProof>, ClientError>> {
            Box::pin(async move { Ok(self.0.clone()) })
        }
    }

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

    #[tokio::test]
    async fn pays_and_retries_with_a_new_id() {
        let proof = PaymentProof::new("sig-1", 15_000_000, "W");
        let caller = Arc::new(Scripted::new(vec![
            Ok(Outcome::PaymentRequired(requirement())),
            Ok(Outcome::Success(ToolResult::text("ordered"))),
        ]));
        let client = PaidToolClient::new(Arc::clone(&caller), Wallet(Some(proof.clone())));

        let result = client.call_tool("place-pizza-order", Map::new()).await.unwrap();
        assert_eq!(result.result.first_text(), Some("ordered"));
        assert_eq!(result.payment, Some(proof));

        let seen = caller.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_ne!(seen[0].id, seen[1].id);
        assert!(seen[0].payment_proof.is_none());
        assert_eq!(seen[1].payment_proof.as_ref().unwrap().signature, "sig-1");
    }

    #[tokio::test]
    async fn call_ids_are_seeded_per_client() {
        let caller = Arc::new(Scripted::new(vec![
            Ok(Outcome::Success(ToolResult::text("a"))),
            Ok(Outcome::Success(ToolResult::text("b"))),
        ]));
        let client = PaidToolClient::new(Arc::clone(&caller), Wallet(None)).with_first_call_id(500);
        client.call_tool("pizza-carousel", Map::new()).await.unwrap();
        client.call_tool("pizza-carousel", Map::new()).await.unwrap();

        let seen = caller.seen.lock().unwrap();
        assert_eq!(seen[0].id, CallId::Number(500));
        assert_eq!(seen[1].id, CallId::Number(501));
        drop(seen);

        let first = PaidToolClient::new(Scripted::new(vec![]), Wallet(None)).next_id();
        assert!(matches!(first, CallId::Number(n) if n >= 0));
    }

    #[tokio::test]
    async fn declined_payment_is_reported() {
        let caller = Scripted::new(vec![Ok(Outcome::PaymentRequired(requirement()))]);
        let client = PaidToolClient::new(caller, Wallet(None));
        let err = client.call_tool("place-pizza-order", Map::new()).await.unwrap_err();
        assert!(matches!(err, ClientError::PaymentDeclined { tool, .. } if tool == "place-pizza-order"));
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_failures_resend_the_identical_request() {
        let proof = PaymentProof::new("sig-1", 15_000_000, "W");
        let caller = Arc::new(Scripted::new(vec![
            Ok(Outcome::PaymentRequired(requirement())),
            Ok(Outcome::failure(ErrorKind::VerifierUnavailable, "ledger down")),
            Err(ClientError::Transport("connection reset".into())),
            Ok(Outcome::Success(ToolResult::text("ordered"))),
        ]));
        let client = PaidToolClient::new(Arc::clone(&caller), Wallet(Some(proof)));

        let result = client.call_tool("place-pizza-order", Map::new()).await.unwrap();
        assert!(result.paid());

        let seen = caller.seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[1], seen[2]);
        assert_eq!(seen[2], seen[3]);
    }

    #[tokio::test]
    async fn non_retryable_failures_surface_verbatim() {
        let caller = Scripted::new(vec![
            Ok(Outcome::PaymentRequired(requirement())),
            Ok(Outcome::failure(ErrorKind::PaymentRejected, "too little")),
        ]);
        let client = PaidToolClient::new(caller, Wallet(Some(PaymentProof::new("s", 1, "W"))));
        let err = client.call_tool("place-pizza-order", Map::new()).await.unwrap_err();
        match err {
            ClientError::Call(failure) => {
                assert_eq!(failure.kind, ErrorKind::PaymentRejected);
                assert_eq!(failure.message, "too little");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(250));
        assert_eq!(policy.backoff(2), Duration::from_millis(500));
        assert_eq!(policy.backoff(10), Duration::from_secs(5));
    }
}
