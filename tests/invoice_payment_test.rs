//! HTTP tests for the invoice and payment endpoints.

mod common;

use axum::http::{Method, StatusCode};
use common::{decimal, response_json, TestApp};
use invoice_ledger_api::events::Event;
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn create_invoice_computes_totals_and_audits_the_caller() {
    let app = TestApp::new().await;
    let invoice = app.create_invoice("INV-100").await;

    assert_eq!(decimal(&invoice["sub_total"]), dec!(25));
    assert_eq!(decimal(&invoice["total"]), dec!(27.5));
    assert_eq!(decimal(&invoice["balance_due"]), dec!(27.5));
    assert_eq!(invoice["payment_status"], "Unpaid");
    assert_eq!(invoice["is_paid"], false);
    assert_eq!(invoice["version"], 1);
    assert_eq!(invoice["items"].as_array().unwrap().len(), 2);
    assert_eq!(invoice["created_by"], app.user_id.to_string());
}

#[tokio::test]
async fn full_payment_settles_invoice_and_posts_credit() {
    let mut app = TestApp::new().await;
    let invoice = app.create_invoice("INV-101").await;
    let id = invoice["id"].as_str().unwrap();

    let response = app.pay(id, "27.5").await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let payment = response_json(response).await;
    assert_eq!(decimal(&payment["data"]["amount"]), dec!(27.5));

    let details = response_json(
        app.request(
            Method::GET,
            &format!("/api/v1/invoices/{id}/payment-details"),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(details["data"]["payment_status"], "Paid");
    assert_eq!(details["data"]["is_paid"], true);
    assert_eq!(decimal(&details["data"]["paid_amount"]), dec!(27.5));

    let postings = response_json(
        app.request(
            Method::GET,
            &format!("/api/v1/transactions/by-source?type=Invoice&id={id}"),
            None,
        )
        .await,
    )
    .await;
    let postings = postings["data"].as_array().unwrap();
    assert_eq!(postings.len(), 1);
    assert_eq!(postings[0]["transaction_type"], "Credit");
    assert_eq!(postings[0]["source_type"], "Invoice");
    assert_eq!(postings[0]["category_name"], "Invoice");
    assert_eq!(decimal(&postings[0]["amount"]), dec!(27.5));

    let mut seen = Vec::new();
    while let Ok(event) = app.events.try_recv() {
        seen.push(event.name());
    }
    assert!(seen.contains(&"payment_recorded"));
    assert!(seen.contains(&"invoice_paid"));
    assert!(seen.contains(&"transaction_posted"));
}

#[tokio::test]
async fn partial_payments_accumulate() {
    let app = TestApp::new().await;
    let invoice = app.create_invoice("INV-102").await;
    let id = invoice["id"].as_str().unwrap();

    assert_eq!(app.pay(id, "10").await.status(), StatusCode::CREATED);
    let current = response_json(
        app.request(Method::GET, &format!("/api/v1/invoices/{id}"), None)
            .await,
    )
    .await;
    assert_eq!(current["data"]["payment_status"], "PartiallyPaid");
    assert_eq!(decimal(&current["data"]["balance_due"]), dec!(17.5));

    assert_eq!(app.pay(id, "17.5").await.status(), StatusCode::CREATED);
    let payments = response_json(
        app.request(Method::GET, &format!("/api/v1/invoices/{id}/payments"), None)
            .await,
    )
    .await;
    assert_eq!(payments["data"].as_array().unwrap().len(), 2);

    let current = response_json(
        app.request(Method::GET, &format!("/api/v1/invoices/{id}"), None)
            .await,
    )
    .await;
    assert_eq!(current["data"]["payment_status"], "Paid");
}

#[tokio::test]
async fn invalid_payments_are_rejected_with_a_kind() {
    let app = TestApp::new().await;
    let invoice = app.create_invoice("INV-103").await;
    let id = invoice["id"].as_str().unwrap();

    let response = app.pay(id, "0").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["kind"], "validation_error");

    let response = app.pay(id, "30").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.pay(id, "0.00001").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let missing = uuid::Uuid::new_v4();
    let response = app.pay(&missing.to_string(), "1").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response_json(response).await["kind"], "not_found");

    let response = app
        .request(Method::GET, "/api/v1/invoices/not-a-uuid", None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response_json(response).await["kind"], "validation_error");
}

#[tokio::test]
async fn update_with_stale_version_conflicts() {
    let app = TestApp::new().await;
    let invoice = app.create_invoice("INV-104").await;
    let id = invoice["id"].as_str().unwrap();
    assert_eq!(app.pay(id, "5").await.status(), StatusCode::CREATED);

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/invoices/{id}"),
            Some(json!({
                "reference": "INV-104",
                "invoice_date": "2026-03-01",
                "items": [{ "description": "Widget", "quantity": "3", "unit_price": "10" }],
                "version": 1
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(
        response_json(response).await["kind"],
        "concurrent_modification"
    );

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/invoices/{id}"),
            Some(json!({
                "reference": "INV-104",
                "invoice_date": "2026-03-01",
                "items": [{ "description": "Widget", "quantity": "3", "unit_price": "10" }],
                "version": 2
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = response_json(response).await;
    assert_eq!(decimal(&updated["data"]["total"]), dec!(30));
    assert_eq!(updated["data"]["version"], 3);
    assert_eq!(updated["data"]["payment_status"], "PartiallyPaid");
}

#[tokio::test]
async fn mark_paid_settles_through_a_payment() {
    let app = TestApp::new().await;
    let invoice = app.create_invoice("INV-105").await;
    let id = invoice["id"].as_str().unwrap();
    assert_eq!(app.pay(id, "7.5").await.status(), StatusCode::CREATED);

    let response = app
        .request(Method::POST, &format!("/api/v1/invoices/{id}/mark-paid"), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let settled = response_json(response).await;
    assert_eq!(settled["data"]["payment_status"], "Paid");
    assert_eq!(decimal(&settled["data"]["paid_amount"]), dec!(27.5));

    let payments = response_json(
        app.request(Method::GET, &format!("/api/v1/invoices/{id}/payments"), None)
            .await,
    )
    .await;
    let payments = payments["data"].as_array().unwrap();
    assert_eq!(payments.len(), 2);
    assert!(payments
        .iter()
        .any(|p| p["method"] == "AdministrativeSettlement" && decimal(&p["amount"]) == dec!(20)));

    // Second call changes nothing
    let again = app
        .request(Method::POST, &format!("/api/v1/invoices/{id}/mark-paid"), None)
        .await;
    assert_eq!(again.status(), StatusCode::OK);
    let payments = response_json(
        app.request(Method::GET, &format!("/api/v1/invoices/{id}/payments"), None)
            .await,
    )
    .await;
    assert_eq!(payments["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn deleted_invoice_disappears_but_ledger_remains() {
    let app = TestApp::new().await;
    let invoice = app.create_invoice("INV-106").await;
    let id = invoice["id"].as_str().unwrap();
    let payment = response_json(app.pay(id, "10").await).await;
    let payment_id = payment["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .request(Method::DELETE, &format!("/api/v1/invoices/{id}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .request(Method::GET, &format!("/api/v1/invoices/{id}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let response = app
        .request(Method::GET, &format!("/api/v1/payments/{payment_id}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let postings = response_json(
        app.request(
            Method::GET,
            &format!("/api/v1/transactions/by-source?type=Invoice&id={id}"),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(postings["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn list_invoices_paginates_and_filters() {
    let app = TestApp::new().await;
    let first = app.create_invoice("INV-201").await;
    app.create_invoice("INV-202").await;
    app.create_invoice("INV-203").await;
    let id = first["id"].as_str().unwrap();
    assert_eq!(app.pay(id, "27.5").await.status(), StatusCode::CREATED);

    let page = response_json(
        app.request(Method::GET, "/api/v1/invoices?page=1&limit=2", None)
            .await,
    )
    .await;
    assert_eq!(page["data"]["total"], 3);
    assert_eq!(page["data"]["total_pages"], 2);
    assert_eq!(page["data"]["items"].as_array().unwrap().len(), 2);

    let paid = response_json(
        app.request(Method::GET, "/api/v1/invoices?status=Paid", None)
            .await,
    )
    .await;
    assert_eq!(paid["data"]["total"], 1);
    assert_eq!(paid["data"]["items"][0]["id"], first["id"]);
}

#[tokio::test]
async fn every_response_carries_a_request_id() {
    let app = TestApp::new().await;

    let response = app
        .request_with_headers(
            Method::GET,
            "/api/v1/invoices",
            None,
            &[("x-request-id", "req-fixed-1")],
        )
        .await;
    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "req-fixed-1"
    );
    let body = response_json(response).await;
    assert_eq!(body["meta"]["request_id"], "req-fixed-1");

    let response = app
        .request(Method::GET, &format!("/api/v1/invoices/{}", uuid::Uuid::new_v4()), None)
        .await;
    let generated = response
        .headers()
        .get("x-request-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(!generated.is_empty());
    assert_eq!(response_json(response).await["request_id"], generated);
}

#[tokio::test]
async fn malformed_user_header_is_rejected() {
    let app = TestApp::new().await;
    let response = app
        .request_with_headers(
            Method::POST,
            "/api/v1/invoices/00000000-0000-0000-0000-000000000000/mark-paid",
            None,
            &[("x-user-id", "someone")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn invoice_created_event_is_emitted() {
    let mut app = TestApp::new().await;
    let invoice = app.create_invoice("INV-300").await;
    match app.events.try_recv() {
        Ok(Event::InvoiceCreated { invoice_id, total }) => {
            assert_eq!(invoice_id.to_string(), invoice["id"].as_str().unwrap());
            assert_eq!(total, dec!(27.5));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}
