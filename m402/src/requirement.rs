//! Payment requirements and the issuer that derives them from a tool's price.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, PickFirst, serde_as};

use crate::tool::{Asset, Price, ToolDescriptor};

/// The server-issued restatement of a tool's [`Price`].
///
/// It is stateless: the same descriptor always yields the same requirement,
/// so no server-side session is kept between the unpaid attempt and the paid
/// retry. The fields alone are enough to show a complete payment request to
/// a user.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequirement {
    /// Amount in the smallest currency unit, serialized as a decimal string.
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    pub amount: u64,
    /// Asset to pay with.
    pub asset: Asset,
    /// Currency symbol.
    pub currency: String,
    /// Who must receive the payment.
    pub recipient: String,
    /// What the payment is for.
    pub description: String,
    /// Ledger network the payment must settle on.
    pub network: String,
}

impl PaymentRequirement {
    /// Renders the amount for humans, e.g. `15 USDC` for `15000000` with six
    /// decimals.
    ///
    /// Falls back to the raw amount in smallest units if `decimals` is out of
    /// range.
    #[must_use]
    pub fn display_amount(&self, decimals: u32) -> String {
        match Decimal::try_from_i128_with_scale(i128::from(self.amount), decimals) {
            Ok(value) => format!("{} {}", value.normalize(), self.currency),
            Err(_) => format!("{} {} (smallest units)", self.amount, self.currency),
        }
    }
}

impl From<&Price> for PaymentRequirement {
    fn from(price: &Price) -> Self {
        Self {
            amount: price.amount,
            asset: price.asset.clone(),
            currency: price.currency.clone(),
            recipient: price.recipient.clone(),
            description: price.description.clone(),
            network: price.network.clone(),
        }
    }
}

/// A requirement was requested for a tool that is not priced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("tool `{tool}` is not priced")]
pub struct NotPriced {
    /// Name of the free tool.
    pub tool: String,
}

/// Issues the canonical requirement for a priced tool.
///
/// # Errors
///
/// Returns [`NotPriced`] for free tools and for prices with a zero amount.
pub fn issue(tool: &ToolDescriptor) -> Result<PaymentRequirement, NotPriced> {
    tool.price().map(PaymentRequirement::from).ok_or_else(|| NotPriced {
        tool: tool.name().to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{HandlerError, ToolResult};
    use crate::value::Map;
    use serde_json::json;

    fn price(amount: u64) -> Price {
        Price {
            amount,
            asset: Asset::new("4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU"),
            currency: "USDC".into(),
            recipient: "R".into(),
            network: "solana-devnet".into(),
            description: "Place a pizza order".into(),
        }
    }

    async fn noop(_: Map) -> Result<ToolResult, HandlerError> {
        Ok(ToolResult::default())
    }

    #[test]
    fn requirement_matches_price_exactly() {
        let tool = ToolDescriptor::priced("place-pizza-order", price(15_000_000), noop);
        let requirement = issue(&tool).unwrap();
        assert_eq!(requirement.amount, 15_000_000);
        assert_eq!(requirement.recipient, "R");
        assert_eq!(
            requirement.asset.address,
            "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU"
        );
        assert_eq!(requirement.currency, "USDC");
        assert_eq!(requirement.network, "solana-devnet");
    }

    #[test]
    fn free_and_zero_priced_tools_are_not_priced() {
        let free = ToolDescriptor::free("pizza-carousel", noop);
        assert_eq!(issue(&free).unwrap_err().tool, "pizza-carousel");
        let zero = ToolDescriptor::priced("zero", price(0), noop);
        assert!(issue(&zero).is_err());
    }

    #[test]
    fn wire_shape_has_exactly_the_requirement_fields() {
        let json = serde_json::to_value(PaymentRequirement::from(&price(15_000_000))).unwrap();
        assert_eq!(
            json,
            json!({
                "amount": "15000000",
                "asset": {"address": "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU"},
                "currency": "USDC",
                "recipient": "R",
                "description": "Place a pizza order",
                "network": "solana-devnet"
            })
        );
    }

    #[test]
    fn display_amount_uses_decimals() {
        let requirement = PaymentRequirement::from(&price(15_000_000));
        assert_eq!(requirement.display_amount(6), "15 USDC");
        let requirement = PaymentRequirement::from(&price(1_500_000));
        assert_eq!(requirement.display_amount(6), "1.5 USDC");
        assert_eq!(requirement.display_amount(0), "1500000 USDC");
    }
}
