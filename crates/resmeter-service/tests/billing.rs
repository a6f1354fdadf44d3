//! Billing ledger integration tests.

mod common;

use axum::http::StatusCode;
use common::TestHarness;
use serde_json::json;

fn consumption_payload(order_id: Option<&str>) -> serde_json::Value {
    let mut payload = json!({
        "type": "consumption",
        "namespace": "ns-alice",
        "owner": "alice",
        "app_type": "APP",
        "app_costs": [
            { "name": "web", "used": { "cpu": 1000 } },
            { "name": "db", "used": { "memory": 500 } }
        ],
        "payment": { "method": "balance", "user_id": "alice" }
    });
    if let Some(id) = order_id {
        payload["order_id"] = json!(id);
    }
    payload
}

// ============================================================================
// Creation
// ============================================================================

#[tokio::test]
async fn consumption_sums_app_costs() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/billing")
        .add_header(TestHarness::service_key_name(), harness.service_key())
        .json(&consumption_payload(None))
        .await;

    response.assert_status(StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["type"], "consumption");
    assert_eq!(body["amount"], 83500);
    assert_eq!(body["status"], "unsettled");
    assert_eq!(body["app_type"], "APP");
    assert_eq!(body["app_costs"][0]["name"], "web");
    assert_eq!(body["app_costs"][0]["used_amount"]["cpu"], 67000);
    assert_eq!(body["app_costs"][1]["amount"], 16500);
    assert_eq!(body["payment"]["method"], "balance");
    assert!(body.get("transfer").is_none());
}

#[tokio::test]
async fn consumption_without_payment_is_rejected() {
    let harness = TestHarness::new();
    let mut payload = consumption_payload(None);
    payload.as_object_mut().unwrap().remove("payment");

    let response = harness
        .server
        .post("/v1/billing")
        .add_header(TestHarness::service_key_name(), harness.service_key())
        .json(&payload)
        .await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "invalid_billing");
}

#[tokio::test]
async fn mismatched_amount_is_rejected() {
    let harness = TestHarness::new();
    let mut payload = consumption_payload(None);
    payload["amount"] = json!(1);

    let response = harness
        .server
        .post("/v1/billing")
        .add_header(TestHarness::service_key_name(), harness.service_key())
        .json(&payload)
        .await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn transfer_takes_amount_from_transfer() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/billing")
        .add_header(TestHarness::service_key_name(), harness.service_key())
        .json(&json!({
            "type": "transfer",
            "namespace": "ns-alice",
            "owner": "alice",
            "transfer": { "from": "alice", "to": "bob", "amount": 5000 }
        }))
        .await;

    response.assert_status(StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["type"], "transfer");
    assert_eq!(body["amount"], 5000);
    assert_eq!(body["transfer"]["to"], "bob");
    assert!(body.get("payment").is_none());
}

#[tokio::test]
async fn recharge_with_payment_is_rejected() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/billing")
        .add_header(TestHarness::service_key_name(), harness.service_key())
        .json(&json!({
            "type": "recharge",
            "namespace": "ns-alice",
            "amount": 100,
            "payment": { "method": "card", "user_id": "alice" }
        }))
        .await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn create_billing_requires_service_key() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/billing")
        .json(&consumption_payload(None))
        .await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn duplicate_order_id_returns_stored_entry() {
    let harness = TestHarness::new();
    let order_id = "01HX3Z5K8Q9W2E4R6T7Y8M9N0P";

    let response = harness
        .server
        .post("/v1/billing")
        .add_header(TestHarness::service_key_name(), harness.service_key())
        .json(&consumption_payload(Some(order_id)))
        .await;
    response.assert_status(StatusCode::CREATED);

    // Same order with different usage: the original entry wins
    let mut retry = consumption_payload(Some(order_id));
    retry["app_costs"] = json!([{ "name": "web", "used": { "cpu": 1 } }]);
    let response = harness
        .server
        .post("/v1/billing")
        .add_header(TestHarness::service_key_name(), harness.service_key())
        .json(&retry)
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["order_id"], order_id);
    assert_eq!(body["amount"], 83500);
}

// ============================================================================
// Queries
// ============================================================================

#[tokio::test]
async fn list_billing_is_newest_first() {
    let harness = TestHarness::new();

    for (amount, time) in [(100, "2024-05-01T10:00:00Z"), (200, "2024-05-02T10:00:00Z")] {
        harness
            .server
            .post("/v1/billing")
            .add_header(TestHarness::service_key_name(), harness.service_key())
            .json(&json!({
                "type": "recharge",
                "namespace": "ns-alice",
                "time": time,
                "amount": amount
            }))
            .await
            .assert_status(StatusCode::CREATED);
    }

    let response = harness
        .server
        .get("/v1/billing")
        .add_query_param("namespace", "ns-alice")
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["amount"], 200);
    assert_eq!(entries[1]["amount"], 100);

    let response = harness
        .server
        .get("/v1/billing")
        .add_query_param("namespace", "ns-alice")
        .add_query_param("limit", "1")
        .add_query_param("offset", "1")
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["amount"], 100);
}

#[tokio::test]
async fn get_unknown_billing_is_not_found() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/v1/billing/01HX3Z5K8Q9W2E4R6T7Y8M9N0P")
        .await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn get_billing_rejects_malformed_id() {
    let harness = TestHarness::new();

    let response = harness.server.get("/v1/billing/not-an-id").await;

    response.assert_status_bad_request();
}

// ============================================================================
// Settlement
// ============================================================================

#[tokio::test]
async fn settle_is_idempotent() {
    let harness = TestHarness::new();

    let created: serde_json::Value = harness
        .server
        .post("/v1/billing")
        .add_header(TestHarness::service_key_name(), harness.service_key())
        .json(&consumption_payload(None))
        .await
        .json();
    let order_id = created["order_id"].as_str().unwrap().to_string();
    let path = format!("/v1/billing/{order_id}/settle");

    for _ in 0..2 {
        let response = harness
            .server
            .post(&path)
            .add_header(TestHarness::admin_key_name(), harness.admin_key())
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["status"], "settled");
        assert_eq!(body["amount"], 83500);
    }

    let body: serde_json::Value = harness
        .server
        .get(&format!("/v1/billing/{order_id}"))
        .await
        .json();
    assert_eq!(body["status"], "settled");
}

#[tokio::test]
async fn settle_requires_admin() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/billing/01HX3Z5K8Q9W2E4R6T7Y8M9N0P/settle")
        .add_header(TestHarness::service_key_name(), harness.service_key())
        .await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn settle_unknown_billing_is_not_found() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/billing/01HX3Z5K8Q9W2E4R6T7Y8M9N0P/settle")
        .add_header(TestHarness::admin_key_name(), harness.admin_key())
        .await;

    response.assert_status_not_found();
}
