#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for payment-gated tool calls over JSON-RPC 2.0.
//!
//! Some tools are free, others carry a price. Calling a priced tool without a
//! payment proof yields a *payment required* answer (JSON-RPC error
//! [`PAYMENT_REQUIRED_CODE`]) describing what to pay. The caller pays out of
//! band and retries with a [`PaymentProof`]; the server checks the proof with a
//! [`LedgerVerifier`], records its signature so it cannot be spent twice, and
//! only then runs the tool.
//!
//! # Modules
//!
//! - [`call`] - Call requests and the [`Outcome`] of a call
//! - [`client`] - Caller-side retry driver for the payment flow
//! - [`codec`] - JSON-RPC 2.0 envelope decoding and encoding
//! - [`codes`] - Stable error codes of the wire protocol
//! - [`error`] - Failure taxonomy
//! - [`invoke`] - The invocation state machine ([`Invoker`])
//! - [`proof`] - Caller-supplied payment proofs
//! - [`registry`] - Tool registry
//! - [`replay`] - Anti-replay record of consumed proof signatures
//! - [`requirement`] - Payment requirements and the issuer
//! - [`service`] - Bytes-in, envelope-out entry point for transports
//! - [`tool`] - Tool descriptors, prices, handlers and results
//! - [`value`] - Closed value model for arguments and metadata
//! - [`verifier`] - Ledger verifier contract and an in-memory ledger
//!
//! # Feature Flags
//!
//! - `telemetry` - Emits `tracing` events for every state transition

use std::future::Future;
use std::pin::Pin;

pub mod call;
pub mod client;
pub mod codec;
pub mod codes;
pub mod error;
pub mod invoke;
pub mod proof;
pub mod registry;
pub mod replay;
pub mod requirement;
pub mod service;
pub mod tool;
pub mod value;
pub mod verifier;

pub use call::{CallId, CallRequest, Outcome};
pub use codes::PAYMENT_REQUIRED_CODE;
pub use error::{ErrorKind, Failure};
pub use invoke::{Invoker, InvokerConfig};
pub use proof::PaymentProof;
pub use registry::ToolRegistry;
pub use requirement::PaymentRequirement;
pub use tool::{Price, Pricing, ToolDescriptor, ToolHandler, ToolResult};
pub use value::{Map, Value};
pub use verifier::{LedgerVerifier, Verification};

/// A boxed, `Send` future used by the object-safe traits of this crate.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Reserved argument key under which a payment proof may travel.
///
/// The key is stripped before arguments reach a tool handler.
pub const PAYMENT_ARGUMENT_KEY: &str = "_payment";

/// JSON-RPC protocol version carried by every envelope.
pub const JSONRPC_VERSION: &str = "2.0";
