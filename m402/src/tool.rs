//! Tool descriptors, prices, handlers and results.
//!
//! A [`ToolDescriptor`] binds a unique name to a [`ToolHandler`] and a
//! [`Pricing`] policy. The price is fixed at construction; changing it means
//! registering a new descriptor.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, PickFirst, serde_as};

use crate::BoxFuture;
use crate::value::{Map, Value};

/// Token (or other settlement asset) identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Asset {
    /// Ledger-specific address of the asset (e.g. an SPL mint).
    pub address: String,
}

impl Asset {
    /// Creates an asset from its address.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

/// Price of a tool, set by the tool author.
///
/// `amount` is expressed in the smallest unit of the currency (e.g.
/// micro-USDC) and serialized as a decimal string so that no JSON parser
/// loses precision.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the smallest currency unit.
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    pub amount: u64,
    /// Asset to pay with.
    pub asset: Asset,
    /// Currency symbol shown to users (e.g. `"USDC"`).
    pub currency: String,
    /// Recipient of the payment.
    pub recipient: String,
    /// Ledger network identifier (e.g. `"solana-devnet"`).
    pub network: String,
    /// What the payment is for.
    pub description: String,
}

/// Price policy of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Pricing {
    /// The tool runs without any payment logic.
    #[default]
    Free,
    /// The tool requires a verified payment proof.
    Priced(Price),
}

impl Pricing {
    /// Returns the effective price.
    ///
    /// A zero-amount price is treated exactly like [`Pricing::Free`].
    #[must_use]
    pub const fn price(&self) -> Option<&Price> {
        match self {
            Self::Priced(price) if price.amount > 0 => Some(price),
            _ => None,
        }
    }

    /// Returns `true` if calls skip all payment logic.
    #[must_use]
    pub const fn is_free(&self) -> bool {
        self.price().is_none()
    }
}

/// A single block of tool output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// The text value.
        text: String,
    },
    /// Structured data.
    Structured {
        /// The structured payload.
        data: Map,
    },
}

impl ContentBlock {
    /// Creates a text block.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Returns the text if this is a text block.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Structured { .. } => None,
        }
    }
}

/// Opaque result returned by a tool handler.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ToolResult {
    /// Ordered content blocks.
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: Map,
}

impl ToolResult {
    /// Creates a result holding a single text block.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            metadata: Map::new(),
        }
    }

    /// Appends a structured block.
    #[must_use]
    pub fn with_structured(mut self, data: Map) -> Self {
        self.content.push(ContentBlock::Structured { data });
        self
    }

    /// Inserts a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Returns the first text block, if any.
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(ContentBlock::as_text)
    }
}

/// Error returned by a tool handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    /// Creates a handler error with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Executes a tool once its payment (if any) has cleared.
///
/// Handlers never see payment plumbing: the reserved payment argument is
/// removed before [`ToolHandler::execute`] is called.
///
/// Any `Fn(Map) -> impl Future<Output = Result<ToolResult, HandlerError>>`
/// closure is a handler.
pub trait ToolHandler: Send + Sync {
    /// Runs the tool with the given arguments.
    fn execute(&self, arguments: Map) -> BoxFuture<'_, Result<ToolResult, HandlerError>>;
}

impl<F, Fut> ToolHandler for F
where
    F: Fn(Map) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ToolResult, HandlerError>> + Send + 'static,
{
    fn execute(&self, arguments: Map) -> BoxFuture<'_, Result<ToolResult, HandlerError>> {
        Box::pin(self(arguments))
    }
}

/// A registered tool.
#[derive(Clone)]
pub struct ToolDescriptor {
    name: String,
    description: Option<String>,
    pricing: Pricing,
    handler: Arc<dyn ToolHandler>,
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("pricing", &self.pricing)
            .finish_non_exhaustive()
    }
}

impl ToolDescriptor {
    /// Creates a descriptor with an explicit pricing policy.
    pub fn new(name: impl Into<String>, pricing: Pricing, handler: impl ToolHandler + 'static) -> Self {
        Self {
            name: name.into(),
            description: None,
            pricing,
            handler: Arc::new(handler),
        }
    }

    /// Creates a free tool.
    pub fn free(name: impl Into<String>, handler: impl ToolHandler + 'static) -> Self {
        Self::new(name, Pricing::Free, handler)
    }

    /// Creates a priced tool.
    pub fn priced(
        name: impl Into<String>,
        price: Price,
        handler: impl ToolHandler + 'static,
    ) -> Self {
        Self::new(name, Pricing::Priced(price), handler)
    }

    /// Sets a human-readable description, listed by `tools/list`.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns the unique tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the description, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the pricing policy.
    #[must_use]
    pub const fn pricing(&self) -> &Pricing {
        &self.pricing
    }

    /// Returns the effective price, `None` for free tools.
    #[must_use]
    pub const fn price(&self) -> Option<&Price> {
        self.pricing.price()
    }

    /// Returns the handler.
    #[must_use]
    pub const fn handler(&self) -> &Arc<dyn ToolHandler> {
        &self.handler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn price(amount: u64) -> Price {
        Price {
            amount,
            asset: Asset::new("mint"),
            currency: "USDC".into(),
            recipient: "R".into(),
            network: "solana-devnet".into(),
            description: "Order a pizza".into(),
        }
    }

    #[test]
    fn zero_amount_is_free() {
        assert!(Pricing::Priced(price(0)).is_free());
        assert!(Pricing::Free.is_free());
        assert!(!Pricing::Priced(price(1)).is_free());
    }

    #[test]
    fn price_amount_accepts_strings_and_numbers() {
        let from_string: Price = serde_json::from_value(json!({
            "amount": "15000000",
            "asset": {"address": "mint"},
            "currency": "USDC",
            "recipient": "R",
            "network": "solana-devnet",
            "description": "Order a pizza"
        }))
        .unwrap();
        let from_number: Price = serde_json::from_value(json!({
            "amount": 15_000_000,
            "asset": {"address": "mint"},
            "currency": "USDC",
            "recipient": "R",
            "network": "solana-devnet",
            "description": "Order a pizza"
        }))
        .unwrap();
        assert_eq!(from_string, from_number);
        assert_eq!(serde_json::to_value(&from_string).unwrap()["amount"], "15000000");
    }

    #[test]
    fn result_serializes_tagged_blocks() {
        let mut data = Map::new();
        data.insert("pizzaTopping".into(), "pepperoni".into());
        let result = ToolResult::text("Rendered a pizza carousel!")
            .with_structured(data)
            .with_metadata("openai/widgetAccessible", true);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            json!({
                "content": [
                    {"type": "text", "text": "Rendered a pizza carousel!"},
                    {"type": "structured", "data": {"pizzaTopping": "pepperoni"}}
                ],
                "metadata": {"openai/widgetAccessible": true}
            })
        );
    }

    #[tokio::test]
    async fn closures_are_handlers() {
        let tool = ToolDescriptor::free("echo", |args: Map| async move {
            let topping = args.get("topping").and_then(Value::as_str).unwrap_or("plain");
            Ok::<_, HandlerError>(ToolResult::text(topping.to_owned()))
        });
        let mut args = Map::new();
        args.insert("topping".into(), "mushroom".into());
        let result = tool.handler().execute(args).await.unwrap();
        assert_eq!(result.first_text(), Some("mushroom"));
    }
}
