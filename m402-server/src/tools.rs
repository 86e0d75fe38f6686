//! Demo tools served by the binary.
//!
//! `pizza-carousel` browses pizza places and is normally free;
//! `place-pizza-order` confirms an order and is normally priced. Prices come
//! from the configuration, so either tool may be free or priced.

use std::time::{SystemTime, UNIX_EPOCH};

use m402::registry::RegistryError;
use m402::tool::HandlerError;
use m402::{Map, Pricing, ToolDescriptor, ToolRegistry, ToolResult, Value};

use crate::config::ServerConfig;

/// Name of the carousel tool.
pub const PIZZA_CAROUSEL: &str = "pizza-carousel";
/// Name of the ordering tool.
pub const PLACE_PIZZA_ORDER: &str = "place-pizza-order";

/// Builds the registry of demo tools, priced according to `config`.
///
/// # Errors
///
/// Returns [`RegistryError`] if two tools share a name.
pub fn demo_registry(config: &ServerConfig) -> Result<ToolRegistry, RegistryError> {
    let pricing = |tool: &str| config.price(tool).map_or(Pricing::Free, Pricing::Priced);

    let mut registry = ToolRegistry::new();
    registry.register(
        ToolDescriptor::new(PIZZA_CAROUSEL, pricing(PIZZA_CAROUSEL), |args: Map| async move {
            pizza_carousel(&args)
        })
        .with_description("Show a carousel of pizza places"),
    )?;
    registry.register(
        ToolDescriptor::new(PLACE_PIZZA_ORDER, pricing(PLACE_PIZZA_ORDER), |args: Map| async move {
            place_pizza_order(&args)
        })
        .with_description("Order a pizza from a place shown in the carousel"),
    )?;

    for tool in config.prices.keys() {
        if registry.lookup(tool).is_err() {
            tracing::warn!(tool = %tool, "Ignoring price for unknown tool");
        }
    }

    Ok(registry)
}

fn pizza_carousel(args: &Map) -> Result<ToolResult, HandlerError> {
    let topping = args
        .get("pizzaTopping")
        .and_then(Value::as_str)
        .unwrap_or("cheese");

    let mut structured = Map::new();
    structured.insert("pizzaTopping".into(), topping.into());

    Ok(ToolResult::text("Rendered a pizza carousel!")
        .with_structured(structured)
        .with_metadata("openai/outputTemplate", "ui://widget/pizza-carousel.html")
        .with_metadata("openai/toolInvocation/invoking", "Carousel some spots")
        .with_metadata("openai/toolInvocation/invoked", "Served a fresh carousel")
        .with_metadata("openai/widgetAccessible", true)
        .with_metadata("openai/resultCanProduceWidget", true))
}

fn place_pizza_order(args: &Map) -> Result<ToolResult, HandlerError> {
    let place = args
        .get("placeName")
        .or_else(|| args.get("placeId"))
        .and_then(Value::as_str)
        .ok_or_else(|| HandlerError::new("placeName or placeId is required"))?;

    let order_id = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();

    Ok(ToolResult::text(format!(
        "Pizza order placed successfully!\n\nRestaurant: {place}\nOrder ID: {order_id}\n\nYour pizza will arrive in 30 minutes!"
    ))
    .with_metadata("orderId", order_id.to_string())
    .with_metadata("place", place))
}

#[cfg(test)]
mod tests {
    use super::*;
    use m402::tool::ContentBlock;

    fn priced_config() -> ServerConfig {
        ServerConfig::from_toml(
            r#"
            [prices."place-pizza-order"]
            amount = 15000000
            asset = "mint"
            recipient = "R"
            network = "solana-devnet"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn prices_follow_the_configuration() {
        let registry = demo_registry(&priced_config()).unwrap();
        assert!(registry.lookup(PIZZA_CAROUSEL).unwrap().pricing().is_free());
        let order = registry.lookup(PLACE_PIZZA_ORDER).unwrap();
        assert_eq!(order.pricing().price().unwrap().amount, 15_000_000);

        let registry = demo_registry(&ServerConfig::default()).unwrap();
        assert!(registry.lookup(PLACE_PIZZA_ORDER).unwrap().pricing().is_free());
    }

    #[test]
    fn carousel_echoes_the_topping() {
        let mut args = Map::new();
        args.insert("pizzaTopping".into(), "pepperoni".into());
        let result = pizza_carousel(&args).unwrap();

        assert_eq!(result.first_text(), Some("Rendered a pizza carousel!"));
        let ContentBlock::Structured { data } = &result.content[1] else {
            panic!("expected structured content");
        };
        assert_eq!(data["pizzaTopping"].as_str(), Some("pepperoni"));
        assert_eq!(
            result.metadata["openai/outputTemplate"].as_str(),
            Some("ui://widget/pizza-carousel.html")
        );
    }

    #[test]
    fn order_names_the_place() {
        let mut args = Map::new();
        args.insert("placeId".into(), "place-123".into());
        args.insert("placeName".into(), "Tony's Pizza".into());
        let result = place_pizza_order(&args).unwrap();
        assert!(result.first_text().unwrap().contains("Restaurant: Tony's Pizza"));
    }

    #[test]
    fn order_without_a_place_fails() {
        let err = place_pizza_order(&Map::new()).unwrap_err();
        assert_eq!(err.message(), "placeName or placeId is required");
    }
}
