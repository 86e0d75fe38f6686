//! Ledger verifier contract and an in-memory ledger.
//!
//! A [`LedgerVerifier`] confirms that a [`PaymentProof`] settles a
//! [`PaymentRequirement`]. It may perform network I/O and may fail
//! transiently; a transient failure is [`Verification::Unreachable`], which
//! the invoker reports as retryable and never as a rejected payment.

use std::sync::Arc;

use dashmap::DashMap;

use crate::BoxFuture;
use crate::proof::PaymentProof;
use crate::requirement::PaymentRequirement;

/// Verdict of a ledger check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// The transfer settled and satisfies the requirement.
    Verified,
    /// The transfer exists but pays less than required.
    Insufficient {
        /// Amount actually transferred.
        paid: u64,
        /// Amount the requirement asks for.
        required: u64,
    },
    /// The proof is malformed, unknown, reversed or does not match the
    /// requirement.
    Invalid {
        /// Why the proof was refused.
        reason: String,
    },
    /// The ledger could not be queried.
    Unreachable {
        /// What went wrong.
        reason: String,
    },
}

impl Verification {
    /// Shorthand for [`Verification::Invalid`].
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`Verification::Unreachable`].
    pub fn unreachable(reason: impl Into<String>) -> Self {
        Self::Unreachable {
            reason: reason.into(),
        }
    }
}

/// Confirms payment proofs against a ledger.
pub trait LedgerVerifier: Send + Sync {
    /// Checks `proof` against `requirement`.
    fn verify<'a>(
        &'a self,
        proof: &'a PaymentProof,
        requirement: &'a PaymentRequirement,
    ) -> BoxFuture<'a, Verification>;
}

impl<T: LedgerVerifier + ?Sized> LedgerVerifier for Arc<T> {
    fn verify<'a>(
        &'a self,
        proof: &'a PaymentProof,
        requirement: &'a PaymentRequirement,
    ) -> BoxFuture<'a, Verification> {
        (**self).verify(proof, requirement)
    }
}

/// A settled transfer as recorded by [`InMemoryLedger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    /// Amount in the smallest currency unit.
    pub amount: u64,
    /// Asset address.
    pub asset: String,
    /// Receiving account.
    pub recipient: String,
    /// Network the transfer settled on.
    pub network: String,
    /// Sending account.
    pub payer: String,
}

#[derive(Debug, Clone)]
struct Entry {
    transfer: Transfer,
    reversed: bool,
}

/// A ledger held in memory, keyed by transfer signature.
///
/// Useful for tests and local development: record the transfers a caller is
/// expected to make, optionally reverse some, and hand the ledger to the
/// invoker.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    transfers: DashMap<String, Entry>,
}

impl InMemoryLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a settled transfer under `signature`.
    pub fn record(&self, signature: impl Into<String>, transfer: Transfer) {
        self.transfers.insert(
            signature.into(),
            Entry {
                transfer,
                reversed: false,
            },
        );
    }

    /// Marks a transfer as reversed. Returns `false` if it is unknown.
    pub fn reverse(&self, signature: &str) -> bool {
        self.transfers
            .get_mut(signature)
            .map(|mut entry| entry.reversed = true)
            .is_some()
    }

    fn check(&self, proof: &PaymentProof, requirement: &PaymentRequirement) -> Verification {
        let Some(entry) = self.transfers.get(&proof.signature) else {
            return Verification::invalid(format!("unknown transfer {}", proof.signature));
        };
        if entry.reversed {
            return Verification::invalid("transfer was reversed");
        }
        let transfer = &entry.transfer;
        if transfer.network != requirement.network {
            return Verification::invalid(format!(
                "network mismatch: expected {}, got {}",
                requirement.network, transfer.network
            ));
        }
        if transfer.asset != requirement.asset.address {
            return Verification::invalid("asset mismatch");
        }
        if transfer.recipient != requirement.recipient {
            return Verification::invalid("recipient mismatch");
        }
        if transfer.payer != proof.payer {
            return Verification::invalid("payer mismatch");
        }
        if proof.amount < requirement.amount {
            return Verification::Insufficient {
                paid: proof.amount,
                required: requirement.amount,
            };
        }
        if proof.amount != transfer.amount {
            return Verification::invalid("declared amount does not match settled transfer");
        }
        Verification::Verified
    }
}

impl LedgerVerifier for InMemoryLedger {
    fn verify<'a>(
        &'a self,
        proof: &'a PaymentProof,
        requirement: &'a PaymentRequirement,
    ) -> BoxFuture<'a, Verification> {
        let verdict = self.check(proof, requirement);
        Box::pin(async move { verdict })
    }
}
