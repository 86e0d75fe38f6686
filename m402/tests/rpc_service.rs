//! Wire-level behavior of `RpcService`.

use std::sync::Arc;

use m402::codes;
use m402::service::RpcService;
use m402::tool::{Asset, HandlerError};
use m402::verifier::{InMemoryLedger, Transfer};
use m402::{Invoker, Map, Price, ToolDescriptor, ToolRegistry, ToolResult};
use serde_json::{Value, json};

fn service() -> RpcService {
    let price = Price {
        amount: 15_000_000,
        asset: Asset::new("mint"),
        currency: "USDC".into(),
        recipient: "R".into(),
        network: "solana-devnet".into(),
        description: "Place a pizza order".into(),
    };
    let mut registry = ToolRegistry::new();
    registry
        .register(
            ToolDescriptor::free("pizza-carousel", |_: Map| async move {
                Ok::<_, HandlerError>(ToolResult::text("Rendered a pizza carousel!"))
            })
            .with_description("Show a pizza carousel"),
        )
        .unwrap();
    registry
        .register(ToolDescriptor::priced("place-pizza-order", price, |_: Map| async move {
            Ok::<_, HandlerError>(ToolResult::text("ordered"))
        }))
        .unwrap();

    let ledger = InMemoryLedger::new();
    ledger.record(
        "sig-1",
        Transfer {
            amount: 15_000_000,
            asset: "mint".into(),
            recipient: "R".into(),
            network: "solana-devnet".into(),
            payer: "W".into(),
        },
    );
    RpcService::new(Arc::new(Invoker::new(registry, Arc::new(ledger))))
}

async fn roundtrip(service: &RpcService, request: &Value) -> Value {
    let response = service.handle(&serde_json::to_vec(request).unwrap()).await;
    serde_json::to_value(response).unwrap()
}

#[tokio::test]
async fn unpaid_then_paid_over_the_wire() {
    let service = service();

    let unpaid = roundtrip(
        &service,
        &json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": {"name": "place-pizza-order", "arguments": {"placeId": "place-123"}}
        }),
    )
    .await;
    assert_eq!(unpaid["id"], 2);
    assert_eq!(unpaid["error"]["code"], codes::PAYMENT_REQUIRED);
    assert_eq!(unpaid["error"]["data"]["paymentRequirement"]["amount"], "15000000");
    assert_eq!(unpaid["error"]["data"]["paymentRequirement"]["recipient"], "R");

    let paid = roundtrip(
        &service,
        &json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": {
                "name": "place-pizza-order",
                "arguments": {
                    "placeId": "place-123",
                    "_payment": {
                        "signature": "sig-1",
                        "timestamp": "2025-01-01T12:00:00Z",
                        "amount": "15000000",
                        "from": "W"
                    }
                }
            }
        }),
    )
    .await;
    assert_eq!(paid["id"], 3);
    assert_eq!(paid["result"]["content"][0]["text"], "ordered");
    assert!(paid.get("error").is_none());
}

#[tokio::test]
async fn lists_tools_with_prices() {
    let service = service();
    let list = roundtrip(&service, &json!({"jsonrpc": "2.0", "id": "l", "method": "tools/list"})).await;
    let tools = list["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 2);
    assert_eq!(tools[0]["name"], "pizza-carousel");
    assert_eq!(tools[0]["description"], "Show a pizza carousel");
    assert!(tools[0].get("price").is_none());
    assert_eq!(tools[1]["price"]["amount"], "15000000");
}

#[tokio::test]
async fn protocol_errors_answer_with_null_id_when_unreadable() {
    let service = service();
    let response = serde_json::to_value(service.handle(b"{oops").await).unwrap();
    assert_eq!(response["id"], Value::Null);
    assert_eq!(response["error"]["code"], codes::PARSE_ERROR);

    let response = roundtrip(
        &service,
        &json!({"jsonrpc": "2.0", "id": 4, "method": "resources/list"}),
    )
    .await;
    assert_eq!(response["id"], 4);
    assert_eq!(response["error"]["code"], codes::METHOD_NOT_FOUND);
}

#[tokio::test]
async fn unknown_tool_uses_its_own_code() {
    let service = service();
    let response = roundtrip(
        &service,
        &json!({
            "jsonrpc": "2.0",
            "id": 5,
            "method": "tools/call",
            "params": {"name": "nope"}
        }),
    )
    .await;
    assert_eq!(response["error"]["code"], codes::TOOL_NOT_FOUND);
}
