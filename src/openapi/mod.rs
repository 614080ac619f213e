use crate::AppState;
use axum::{routing::get, Json, Router};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Invoice Ledger API",
        version = "1.0.0",
        description = r#"
# Invoice Ledger API

Invoices, the payments recorded against them and the ledger transactions derived from both.

## Money

All monetary amounts are decimals serialized as strings, e.g. `"27.50"`.

## Acting user

Send `x-user-id: <uuid>` to have writes attributed in the audit fields. Requests without it are recorded as anonymous.

## Error Handling

Every failure returns a consistent body with a machine-readable `kind`:

```json
{
  "error": "Bad Request",
  "kind": "validation_error",
  "message": "Validation error: Payment amount must be greater than zero",
  "request_id": "req-abc123",
  "timestamp": "2026-01-01T00:00:00Z"
}
```

## Pagination

List endpoints accept `page` (default 1) and `limit` (configured default and maximum).
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Invoices", description = "Invoice lifecycle endpoints"),
        (name = "Payments", description = "Payments recorded against invoices"),
        (name = "Transactions", description = "Ledger postings and reporting"),
        (name = "Categories", description = "Ledger category administration")
    ),
    paths(
        // Invoices
        crate::handlers::invoices::create_invoice,
        crate::handlers::invoices::update_invoice,
        crate::handlers::invoices::delete_invoice,
        crate::handlers::invoices::get_invoice,
        crate::handlers::invoices::list_invoices,
        crate::handlers::invoices::mark_invoice_paid,

        // Payments
        crate::handlers::payments::record_payment,
        crate::handlers::payments::list_invoice_payments,
        crate::handlers::payments::get_payment_details,
        crate::handlers::payments::get_payment,

        // Transactions
        crate::handlers::transactions::post_transaction,
        crate::handlers::transactions::list_transactions,
        crate::handlers::transactions::get_transaction,
        crate::handlers::transactions::transactions_by_source,
        crate::handlers::transactions::transactions_by_category,
        crate::handlers::transactions::transaction_summary,

        // Categories
        crate::handlers::categories::list_categories,
        crate::handlers::categories::get_category,
        crate::handlers::categories::create_category,
        crate::handlers::categories::delete_category,
    ),
    components(
        schemas(
            crate::entities::Lifecycle,
            crate::entities::invoice::PaymentStatus,
            crate::entities::payment::PaymentMethod,
            crate::entities::ledger_transaction::TransactionType,
            crate::entities::ledger_transaction::SourceType,
            crate::entities::category::CategoryKind,
            crate::services::ledger::CategoryTotals,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

/// Serves the generated document at `/api-docs/openapi.json`
pub fn openapi_routes() -> Router<AppState> {
    Router::new().route(
        "/api-docs/openapi.json",
        get(|| async { Json(ApiDocV1::openapi()) }),
    )
}
