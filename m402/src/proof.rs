//! Caller-supplied payment proofs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, PickFirst, serde_as};

/// Evidence that a payment settling a requirement has happened.
///
/// The proof is a capability token: the core never interprets it beyond
/// using `signature` as the anti-replay key, and forwards it untouched to the
/// [`LedgerVerifier`](crate::LedgerVerifier).
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentProof {
    /// Ledger reference of the settled transfer. Unique per payment.
    pub signature: String,
    /// When the payment was made.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Amount paid, in the smallest currency unit.
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    pub amount: u64,
    /// Account the payment came from.
    #[serde(alias = "from")]
    pub payer: String,
}

impl PaymentProof {
    /// Creates a proof stamped with the current time.
    pub fn new(signature: impl Into<String>, amount: u64, payer: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            timestamp: Some(Utc::now()),
            amount,
            payer: payer.into(),
        }
    }

    /// Overrides the timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_from_as_payer() {
        let proof: PaymentProof = serde_json::from_value(json!({
            "signature": "sig-1",
            "timestamp": "2025-01-01T12:00:00Z",
            "amount": "15000000",
            "from": "W"
        }))
        .unwrap();
        assert_eq!(proof.payer, "W");
        assert_eq!(proof.amount, 15_000_000);
        assert!(proof.timestamp.is_some());
    }

    #[test]
    fn timestamp_is_optional() {
        let proof: PaymentProof = serde_json::from_value(json!({
            "signature": "sig-1",
            "amount": 5,
            "payer": "W"
        }))
        .unwrap();
        assert!(proof.timestamp.is_none());
        let json = serde_json::to_value(&proof).unwrap();
        assert_eq!(json["amount"], "5");
        assert!(json.get("timestamp").is_none());
    }
}
