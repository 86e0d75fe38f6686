//! Demo server exposing payment-gated tools over JSON-RPC.
//!
//! # Modules
//!
//! - [`config`] - TOML configuration with environment variable expansion
//! - [`tools`] - The demo pizza tools
//! - [`verifier`] - A development verifier that trusts declared amounts

pub mod config;
pub mod tools;
pub mod verifier;
