//! Stable JSON-RPC error codes used on the wire.
//!
//! [`PAYMENT_REQUIRED`] is a fixed protocol constant and is never reused for
//! any other condition. Application failures live in the JSON-RPC server-error
//! range (`-32000..=-32099`); envelope problems use the codes reserved by the
//! JSON-RPC 2.0 specification.

/// A priced tool was called without a payment proof.
pub const PAYMENT_REQUIRED: i32 = -32001;

/// The supplied proof was insufficient or invalid.
pub const PAYMENT_REJECTED: i32 = -32002;

/// The proof signature was already consumed by another call.
pub const PROOF_ALREADY_USED: i32 = -32003;

/// The ledger could not be queried; resend the identical request later.
pub const VERIFIER_UNAVAILABLE: i32 = -32004;

/// A call with the same id and proof is still executing; resend later.
pub const CALL_IN_PROGRESS: i32 = -32005;

/// No tool is registered under the requested name.
pub const TOOL_NOT_FOUND: i32 = -32006;

/// The tool handler failed.
pub const HANDLER_ERROR: i32 = -32007;

/// Invalid JSON was received.
pub const PARSE_ERROR: i32 = -32700;

/// The JSON sent is not a valid request object.
pub const INVALID_REQUEST: i32 = -32600;

/// The method does not exist.
pub const METHOD_NOT_FOUND: i32 = -32601;

/// Invalid method parameters.
pub const INVALID_PARAMS: i32 = -32602;

/// Internal error.
pub const INTERNAL_ERROR: i32 = -32603;

/// Re-export of [`PAYMENT_REQUIRED`] under its protocol name.
pub const PAYMENT_REQUIRED_CODE: i32 = PAYMENT_REQUIRED;

/// Message sent alongside [`PAYMENT_REQUIRED`].
pub const PAYMENT_REQUIRED_MESSAGE: &str = "Payment required for this tool";
