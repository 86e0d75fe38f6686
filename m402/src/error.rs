//! Failure taxonomy for tool calls.
//!
//! A [`Failure`] is one of the three shapes an [`Outcome`](crate::Outcome) can
//! take. Payment-required answers are deliberately *not* part of this
//! taxonomy: they are a normal protocol branch, not an error.

use std::fmt;

use crate::codes;

/// Classification of a failed call.
///
/// Every kind maps to its own wire code; none of them shares
/// [`codes::PAYMENT_REQUIRED`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No tool is registered under the requested name.
    ToolNotFound,
    /// A payment requirement was requested for a free tool.
    NotPriced,
    /// The ledger found the proof insufficient or invalid.
    PaymentRejected,
    /// The proof signature was already consumed by a different call.
    ProofAlreadyUsed,
    /// The ledger could not be reached; the identical request may be resent.
    VerifierUnavailable,
    /// The same call (id and proof) is still executing; resend later.
    CallInProgress,
    /// The tool handler failed.
    HandlerError,
    /// The request envelope was malformed.
    ProtocolError,
}

impl ErrorKind {
    /// Returns the JSON-RPC error code for this kind.
    ///
    /// [`ErrorKind::ProtocolError`] maps to [`codes::INVALID_REQUEST`]; the
    /// codec uses the more specific JSON-RPC codes when it knows them.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ToolNotFound => codes::TOOL_NOT_FOUND,
            Self::NotPriced => codes::INTERNAL_ERROR,
            Self::PaymentRejected => codes::PAYMENT_REJECTED,
            Self::ProofAlreadyUsed => codes::PROOF_ALREADY_USED,
            Self::VerifierUnavailable => codes::VERIFIER_UNAVAILABLE,
            Self::CallInProgress => codes::CALL_IN_PROGRESS,
            Self::HandlerError => codes::HANDLER_ERROR,
            Self::ProtocolError => codes::INVALID_REQUEST,
        }
    }

    /// Maps a wire code back to its kind.
    ///
    /// Returns `None` for [`codes::PAYMENT_REQUIRED`] and unknown codes.
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            codes::TOOL_NOT_FOUND => Some(Self::ToolNotFound),
            codes::INTERNAL_ERROR => Some(Self::NotPriced),
            codes::PAYMENT_REJECTED => Some(Self::PaymentRejected),
            codes::PROOF_ALREADY_USED => Some(Self::ProofAlreadyUsed),
            codes::VERIFIER_UNAVAILABLE => Some(Self::VerifierUnavailable),
            codes::CALL_IN_PROGRESS => Some(Self::CallInProgress),
            codes::HANDLER_ERROR => Some(Self::HandlerError),
            codes::PARSE_ERROR
            | codes::INVALID_REQUEST
            | codes::METHOD_NOT_FOUND
            | codes::INVALID_PARAMS => Some(Self::ProtocolError),
            _ => None,
        }
    }

    /// Returns `true` if the caller should resend the identical request,
    /// with backoff, instead of asking a human.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::VerifierUnavailable | Self::CallInProgress)
    }

    /// Returns the `snake_case` name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ToolNotFound => "tool_not_found",
            Self::NotPriced => "not_priced",
            Self::PaymentRejected => "payment_rejected",
            Self::ProofAlreadyUsed => "proof_already_used",
            Self::VerifierUnavailable => "verifier_unavailable",
            Self::CallInProgress => "call_in_progress",
            Self::HandlerError => "handler_error",
            Self::ProtocolError => "protocol_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed call: its kind plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Failure {
    /// Machine-readable classification.
    pub kind: ErrorKind,
    /// Human-readable explanation, surfaced verbatim to the caller.
    pub message: String,
}

impl Failure {
    /// Creates a new failure.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
