#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP transport for payment-gated JSON-RPC tool calls.
//!
//! # Server
//!
//! [`server::rpc_router`] mounts an [`m402::service::RpcService`] on an axum
//! [`Router`](axum::Router) at `POST /rpc`.
//!
//! # Client
//!
//! [`client::HttpToolCaller`] sends calls to such an endpoint and plugs into
//! [`m402::client::PaidToolClient`]. [`ledger::RemoteLedger`] verifies
//! payment proofs against a remote ledger query service.
//!
//! # Feature Flags
//!
//! - `server` - Axum routes
//! - `client` - Reqwest-based tool caller and remote ledger verifier
//! - `telemetry` - Emits `tracing` events
//! - `full` - All of the above

#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "client")]
pub mod ledger;
#[cfg(feature = "server")]
pub mod server;

#[cfg(feature = "client")]
pub use client::HttpToolCaller;
#[cfg(feature = "client")]
pub use ledger::{RemoteLedger, RemoteLedgerError};
#[cfg(feature = "server")]
pub use server::rpc_router;
