#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use invoice_ledger_api::{
    config::AppConfig,
    db,
    events::{self, Event},
    services::FixedClock,
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Application router over a fresh in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub events: mpsc::Receiver<Event>,
    pub user_id: Uuid,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::connect_in_memory()
            .await
            .expect("failed to create test database");

        let (sender, rx) = events::channel(512);
        let clock = Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        ));
        let state = AppState::new(Arc::new(pool), cfg, sender, clock);
        let router = invoice_ledger_api::app_router(state.clone());

        Self {
            router,
            state,
            events: rx,
            user_id: Uuid::new_v4(),
        }
    }

    /// Send a request as the test user.
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let user = self.user_id.to_string();
        self.request_with_headers(method, uri, body, &[("x-user-id", user.as_str())])
            .await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Creates the 27.50 invoice used across tests: 2 x 10 + 1 x 5 plus 2.50 tax.
    pub async fn create_invoice(&self, reference: &str) -> Value {
        let response = self
            .request(
                Method::POST,
                "/api/v1/invoices",
                Some(json!({
                    "reference": reference,
                    "invoice_date": "2026-03-01",
                    "due_date": "2026-03-31",
                    "tax": "2.5",
                    "items": [
                        { "description": "Widget", "quantity": "2", "unit_price": "10" },
                        { "description": "Gadget", "quantity": "1", "unit_price": "5" }
                    ]
                })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        response_json(response).await["data"].clone()
    }

    pub async fn pay(&self, invoice_id: &str, amount: &str) -> Response {
        self.request(
            Method::POST,
            &format!("/api/v1/invoices/{invoice_id}/payments"),
            Some(json!({ "amount": amount, "method": "BankTransfer" })),
        )
        .await
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Decimal fields are serialized as strings; compares them numerically.
pub fn decimal(value: &Value) -> rust_decimal::Decimal {
    value
        .as_str()
        .expect("decimal serialized as string")
        .parse()
        .expect("valid decimal")
}
