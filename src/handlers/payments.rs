use super::common::{AppJson, AppPath, CurrentUser};
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::payments::{PaymentDetailsResponse, PaymentResponse, RecordPaymentRequest};
use crate::ApiResponse;
use axum::{
    extract::{Json, State},
    http::StatusCode,
    routing::get,
    Router,
};
use uuid::Uuid;

/// Record a payment against an invoice
#[utoipa::path(
    post,
    path = "/api/v1/invoices/:id/payments",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    request_body = RecordPaymentRequest,
    responses(
        (status = 201, description = "Payment recorded", body = ApiResponse<PaymentResponse>,
            headers(
                ("X-Request-Id" = String, description = "Unique request identifier"),
            )
        ),
        (status = 400, description = "Non-positive amount or overpayment", body = crate::errors::ErrorResponse),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Invoice kept changing underneath the payment", body = crate::errors::ErrorResponse),
        (status = 504, description = "Store timeout", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn record_payment(
    State(state): State<AppState>,
    AppPath(invoice_id): AppPath<Uuid>,
    user: CurrentUser,
    AppJson(request): AppJson<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PaymentResponse>>), ServiceError> {
    let payment = state
        .services
        .payments
        .record_payment(invoice_id, request, user.id())
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(payment))))
}

/// Payments of an invoice, oldest first
#[utoipa::path(
    get,
    path = "/api/v1/invoices/:id/payments",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Payments for invoice", body = ApiResponse<Vec<PaymentResponse>>),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn list_invoice_payments(
    State(state): State<AppState>,
    AppPath(invoice_id): AppPath<Uuid>,
) -> Result<Json<ApiResponse<Vec<PaymentResponse>>>, ServiceError> {
    let payments = state.services.payments.list_for_invoice(invoice_id).await?;
    Ok(Json(ApiResponse::success(payments)))
}

/// Invoice totals with the payments applied to it
#[utoipa::path(
    get,
    path = "/api/v1/invoices/:id/payment-details",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Payment details", body = ApiResponse<PaymentDetailsResponse>),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn get_payment_details(
    State(state): State<AppState>,
    AppPath(invoice_id): AppPath<Uuid>,
) -> Result<Json<ApiResponse<PaymentDetailsResponse>>, ServiceError> {
    let details = state
        .services
        .payments
        .get_payment_details(invoice_id)
        .await?;
    Ok(Json(ApiResponse::success(details)))
}

/// Get payment by ID
#[utoipa::path(
    get,
    path = "/api/v1/payments/:id",
    params(("id" = Uuid, Path, description = "Payment ID")),
    responses(
        (status = 200, description = "Payment", body = ApiResponse<PaymentResponse>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn get_payment(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<ApiResponse<PaymentResponse>>, ServiceError> {
    let payment = state.services.payments.get_payment(id).await?;
    Ok(Json(ApiResponse::success(payment)))
}

/// Payment routes that hang off an invoice; merged into the invoice router
pub fn invoice_payment_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/:id/payments",
            get(list_invoice_payments).post(record_payment),
        )
        .route("/:id/payment-details", get(get_payment_details))
}

/// Payment routes, nested under `/payments`
pub fn payment_routes() -> Router<AppState> {
    Router::new().route("/:id", get(get_payment))
}
