//! Development-only verifier.

use m402::verifier::{LedgerVerifier, Verification};
use m402::{BoxFuture, PaymentProof, PaymentRequirement};

/// Accepts any proof whose declared amount covers the requirement.
///
/// Nothing is looked up on a ledger: the proof is taken at its word. Use it
/// only to exercise the payment flow locally.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustingVerifier;

impl LedgerVerifier for TrustingVerifier {
    fn verify<'a>(
        &'a self,
        proof: &'a PaymentProof,
        requirement: &'a PaymentRequirement,
    ) -> BoxFuture<'a, Verification> {
        let verdict = if proof.signature.trim().is_empty() {
            Verification::invalid("empty signature")
        } else if proof.amount < requirement.amount {
            Verification::Insufficient {
                paid: proof.amount,
                required: requirement.amount,
            }
        } else {
            Verification::Verified
        };
        Box::pin(async move { verdict })
    }
}
