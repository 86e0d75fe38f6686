//! Call requests and the outcome of a call.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, Failure};
use crate::proof::PaymentProof;
use crate::requirement::PaymentRequirement;
use crate::tool::ToolResult;
use crate::value::{Map, Value};

/// JSON-RPC request id, chosen by the caller.
///
/// Two in-flight calls never share an id; the unpaid attempt and the paid
/// retry are distinct calls with distinct ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CallId {
    /// Numeric id.
    Number(i64),
    /// String id.
    String(String),
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<i64> for CallId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for CallId {
    fn from(value: i32) -> Self {
        Self::Number(value.into())
    }
}

impl From<&str> for CallId {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for CallId {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// A single attempt to call a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    /// Correlation id of this attempt.
    pub id: CallId,
    /// Name of the tool to call.
    pub tool_name: String,
    /// Business arguments. Never contains the payment proof once decoded.
    pub arguments: Map,
    /// Proof of payment, for priced tools.
    pub payment_proof: Option<PaymentProof>,
}

impl CallRequest {
    /// Creates a request without arguments or proof.
    pub fn new(id: impl Into<CallId>, tool_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tool_name: tool_name.into(),
            arguments: Map::new(),
            payment_proof: None,
        }
    }

    /// Adds a single argument.
    #[must_use]
    pub fn with_argument(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    /// Replaces all arguments.
    #[must_use]
    pub fn with_arguments(mut self, arguments: Map) -> Self {
        self.arguments = arguments;
        self
    }

    /// Attaches a payment proof.
    #[must_use]
    pub fn with_payment(mut self, proof: PaymentProof) -> Self {
        self.payment_proof = Some(proof);
        self
    }
}

/// How a call ended.
///
/// `PaymentRequired` is a normal protocol branch: the caller is expected to
/// pay and retry. It is never reported as a [`Failure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The tool ran and produced a result.
    Success(ToolResult),
    /// The tool is priced and no proof was supplied.
    PaymentRequired(PaymentRequirement),
    /// The call failed.
    Failure(Failure),
}

impl Outcome {
    /// Shorthand for a failure outcome.
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Failure(Failure::new(kind, message))
    }

    /// Returns the result if the call succeeded.
    #[must_use]
    pub const fn as_success(&self) -> Option<&ToolResult> {
        match self {
            Self::Success(result) => Some(result),
            _ => None,
        }
    }

    /// Returns the requirement if payment is required.
    #[must_use]
    pub const fn as_payment_required(&self) -> Option<&PaymentRequirement> {
        match self {
            Self::PaymentRequired(requirement) => Some(requirement),
            _ => None,
        }
    }

    /// Returns the failure kind, if any.
    #[must_use]
    pub const fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Failure(failure) => Some(failure.kind),
            _ => None,
        }
    }

    /// Returns a short label for logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::PaymentRequired(_) => "payment_required",
            Self::Failure(failure) => failure.kind.as_str(),
        }
    }
}
