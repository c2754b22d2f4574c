//! API integration tests
//!
//! Drives the full router (auth middleware included) against an in-memory
//! database.

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower::util::ServiceExt;
use uuid::Uuid;

mod common;

async fn test_app() -> (Router, SqlitePool, String) {
    let pool = common::setup_test_db().await;
    let (_, token) = common::seed_session(&pool).await;
    let app = erp_ledger::api::build_router(pool.clone());
    (app, pool, token)
}

fn request(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("X-Session-Token", token);

    match body {
        Some(value) => builder.body(Body::from(value.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn create_company(app: &Router, token: &str, name: &str, initial: Option<Value>) -> Uuid {
    let mut body = json!({ "name": name });
    if let Some(initial) = initial {
        body["initial_balance"] = initial;
    }
    let response = app
        .clone()
        .oneshot(request("POST", "/api/v1/companies", token, Some(body)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED, "company creation failed");
    let json = json_body(response).await;
    json["id"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn test_requests_without_session_are_unauthorized() {
    let (app, _pool, _token) = test_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/v1/companies")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Unknown token is rejected too
    let response = app
        .clone()
        .oneshot(request("GET", "/api/v1/companies", "bogus-token", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = json_body(response).await;
    assert_eq!(json["error_code"], "invalid_session");
}

#[tokio::test]
async fn test_health_is_open() {
    let (app, _pool, _token) = test_app().await;
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_credit_and_debit_lifecycle() {
    let (app, _pool, token) = test_app().await;
    let company_id = create_company(&app, &token, "Acme", Some(json!("1000"))).await;

    // Credit 500 with a description
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/v1/transactions",
            &token,
            Some(json!({
                "company_id": company_id,
                "amount": "500",
                "type": "credit",
                "description": "Invoice #1"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = json_body(response).await;
    assert_eq!(json["new_balance"], "1500.00");
    assert_eq!(json["transaction"]["type"], "credit");
    assert_eq!(json["transaction"]["amount"], "500.00");
    assert_eq!(json["transaction"]["description"], "Invoice #1");
    assert_eq!(json["transaction"]["created_by"]["name"], "Test Admin");

    // Debit 2000 overdraws: rejected, balance untouched
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/v1/transactions",
            &token,
            Some(json!({
                "company_id": company_id,
                "amount": 2000,
                "type": "debit"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error_code"], "insufficient_funds");

    let response = app
        .clone()
        .oneshot(request(
            "GET",
            &format!("/api/v1/companies/{company_id}"),
            &token,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["balance"], "1500.00");

    // Debit the exact balance down to zero
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/v1/transactions",
            &token,
            Some(json!({
                "company_id": company_id,
                "amount": "1500",
                "type": "debit"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = json_body(response).await;
    assert_eq!(json["new_balance"], "0.00");

    // Ledger and cached balance agree
    let response = app
        .clone()
        .oneshot(request(
            "GET",
            &format!("/api/v1/companies/{company_id}/reconcile"),
            &token,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["consistent"], true);
    assert_eq!(json["cached_balance"], "0.00");
    assert_eq!(json["ledger_balance"], "0.00");
}

#[tokio::test]
async fn test_transaction_validation_errors() {
    let (app, _pool, token) = test_app().await;
    let company_id = create_company(&app, &token, "Acme", None).await;

    // Zero, negative, and malformed amounts
    for amount in [json!(0), json!(-50), json!("abc")] {
        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/v1/transactions",
                &token,
                Some(json!({
                    "company_id": company_id,
                    "amount": amount,
                    "type": "credit"
                })),
            ))
            .await
            .unwrap();
        assert_eq!(
            response.status(),
            StatusCode::BAD_REQUEST,
            "amount {amount} should be rejected"
        );
    }

    // Type outside {credit, debit}
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/v1/transactions",
            &token,
            Some(json!({
                "company_id": company_id,
                "amount": "10",
                "type": "transfer"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error_code"], "invalid_type");

    // Unknown company, no side effects
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/v1/transactions",
            &token,
            Some(json!({
                "company_id": Uuid::new_v4(),
                "amount": "10",
                "type": "credit"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(request("GET", "/api/v1/transactions", &token, None))
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["transactions"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_update_transaction_metadata() {
    let (app, _pool, token) = test_app().await;
    let company_id = create_company(&app, &token, "Acme", None).await;

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/v1/transactions",
            &token,
            Some(json!({
                "company_id": company_id,
                "amount": "500",
                "type": "credit"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(response).await;
    let transaction_id = created["transaction"]["id"].as_str().unwrap().to_string();

    // Metadata change leaves amount and balance alone
    let response = app
        .clone()
        .oneshot(request(
            "PUT",
            &format!("/api/v1/transactions/{transaction_id}"),
            &token,
            Some(json!({
                "description": "Corrected memo",
                "order_number": "ORD-7"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["description"], "Corrected memo");
    assert_eq!(json["order_number"], "ORD-7");
    assert_eq!(json["amount"], "500.00");

    // Amount is immutable through this path
    let response = app
        .clone()
        .oneshot(request(
            "PUT",
            &format!("/api/v1/transactions/{transaction_id}"),
            &token,
            Some(json!({ "amount": "999" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error_code"], "immutable_field");

    // Type change re-derives the balance: credit 500 becomes debit 500, but
    // the balance is only 500, so the flip would overdraw by 500.
    let response = app
        .clone()
        .oneshot(request(
            "PUT",
            &format!("/api/v1/transactions/{transaction_id}"),
            &token,
            Some(json!({ "type": "debit" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Top the company up, then the flip goes through and balance follows
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/v1/transactions",
            &token,
            Some(json!({
                "company_id": company_id,
                "amount": "1000",
                "type": "credit"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(request(
            "PUT",
            &format!("/api/v1/transactions/{transaction_id}"),
            &token,
            Some(json!({ "type": "debit" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["type"], "debit");

    let response = app
        .clone()
        .oneshot(request(
            "GET",
            &format!("/api/v1/companies/{company_id}/reconcile"),
            &token,
            None,
        ))
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["consistent"], true);
    assert_eq!(json["cached_balance"], "500.00");

    // Missing transaction
    let response = app
        .clone()
        .oneshot(request(
            "PUT",
            &format!("/api/v1/transactions/{}", Uuid::new_v4()),
            &token,
            Some(json!({ "description": "x" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_transactions_filters() {
    let (app, _pool, token) = test_app().await;
    let acme = create_company(&app, &token, "Acme", Some(json!("1000"))).await;
    let globex = create_company(&app, &token, "Globex", Some(json!("1000"))).await;

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/v1/transactions",
            &token,
            Some(json!({
                "company_id": acme,
                "amount": "100",
                "type": "debit"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // Opening credits (2) plus the debit
    let response = app
        .clone()
        .oneshot(request("GET", "/api/v1/transactions", &token, None))
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["transactions"].as_array().unwrap().len(), 3);

    let response = app
        .clone()
        .oneshot(request(
            "GET",
            &format!("/api/v1/transactions?company_id={acme}&type=debit"),
            &token,
            None,
        ))
        .await
        .unwrap();
    let json = json_body(response).await;
    let transactions = json["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0]["amount"], "100.00");

    let response = app
        .clone()
        .oneshot(request(
            "GET",
            &format!("/api/v1/transactions?company_id={globex}"),
            &token,
            None,
        ))
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["transactions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_company_crud() {
    let (app, _pool, token) = test_app().await;
    let company_id = create_company(&app, &token, "Acme", Some(json!(250.50))).await;

    // Opening balance flowed through the ledger
    let response = app
        .clone()
        .oneshot(request(
            "GET",
            &format!("/api/v1/companies/{company_id}"),
            &token,
            None,
        ))
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["balance"], "250.50");
    assert_eq!(json["name"], "Acme");

    // Duplicate name conflicts
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/v1/companies",
            &token,
            Some(json!({ "name": "Acme" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Empty name is invalid
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/v1/companies",
            &token,
            Some(json!({ "name": "  " })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Rename is allowed, balance writes are not
    let response = app
        .clone()
        .oneshot(request(
            "PUT",
            &format!("/api/v1/companies/{company_id}"),
            &token,
            Some(json!({ "name": "Acme Corp" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["name"], "Acme Corp");
    assert_eq!(json["balance"], "250.50");

    let response = app
        .clone()
        .oneshot(request(
            "PUT",
            &format!("/api/v1/companies/{company_id}"),
            &token,
            Some(json!({ "balance": "9999" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error_code"], "immutable_field");

    // Delete cascades to the company's transactions
    let response = app
        .clone()
        .oneshot(request(
            "DELETE",
            &format!("/api/v1/companies/{company_id}"),
            &token,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .clone()
        .oneshot(request(
            "GET",
            &format!("/api/v1/companies/{company_id}"),
            &token,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(request("GET", "/api/v1/transactions", &token, None))
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["transactions"].as_array().unwrap().len(), 0);
}
