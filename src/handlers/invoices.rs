use super::common::{AppJson, AppPath, AppQuery, CurrentUser, PaginationParams};
use crate::entities::invoice::PaymentStatus;
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::invoicing::{
    CreateInvoiceRequest, InvoiceResponse, InvoiceSummaryResponse, UpdateInvoiceRequest,
};
use crate::{ApiResponse, PaginatedResponse};
use axum::{
    extract::{Json, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

#[derive(Debug, Deserialize, IntoParams)]
pub struct InvoiceFilter {
    /// Filter by payment status (Unpaid, PartiallyPaid, Paid, Overpaid)
    pub status: Option<PaymentStatus>,
}

/// Create an invoice with its lines
#[utoipa::path(
    post,
    path = "/api/v1/invoices",
    request_body = CreateInvoiceRequest,
    responses(
        (status = 201, description = "Invoice created", body = ApiResponse<InvoiceResponse>),
        (status = 400, description = "Invalid invoice", body = crate::errors::ErrorResponse)
    ),
    tag = "Invoices"
)]
pub async fn create_invoice(
    State(state): State<AppState>,
    user: CurrentUser,
    AppJson(request): AppJson<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<ApiResponse<InvoiceResponse>>), ServiceError> {
    let invoice = state.services.invoices.create(request, user.id()).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(invoice))))
}

/// Replace an invoice's header and lines
#[utoipa::path(
    put,
    path = "/api/v1/invoices/:id",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    request_body = UpdateInvoiceRequest,
    responses(
        (status = 200, description = "Invoice updated", body = ApiResponse<InvoiceResponse>),
        (status = 400, description = "Invalid invoice", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Stale version or total below paid amount", body = crate::errors::ErrorResponse)
    ),
    tag = "Invoices"
)]
pub async fn update_invoice(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
    user: CurrentUser,
    AppJson(request): AppJson<UpdateInvoiceRequest>,
) -> Result<Json<ApiResponse<InvoiceResponse>>, ServiceError> {
    let invoice = state.services.invoices.update(id, request, user.id()).await?;
    Ok(Json(ApiResponse::success(invoice)))
}

/// Soft-delete an invoice with its lines and payments
#[utoipa::path(
    delete,
    path = "/api/v1/invoices/:id",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 204, description = "Invoice deleted"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Invoices"
)]
pub async fn delete_invoice(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
    user: CurrentUser,
) -> Result<StatusCode, ServiceError> {
    state.services.invoices.delete(id, user.id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/v1/invoices/:id",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice with lines", body = ApiResponse<InvoiceResponse>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Invoices"
)]
pub async fn get_invoice(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<ApiResponse<InvoiceResponse>>, ServiceError> {
    let invoice = state.services.invoices.get(id).await?;
    Ok(Json(ApiResponse::success(invoice)))
}

/// List invoices, optionally filtered by payment status
#[utoipa::path(
    get,
    path = "/api/v1/invoices",
    params(PaginationParams, InvoiceFilter),
    responses(
        (status = 200, description = "Invoices", body = ApiResponse<PaginatedResponse<InvoiceSummaryResponse>>)
    ),
    tag = "Invoices"
)]
pub async fn list_invoices(
    State(state): State<AppState>,
    AppQuery(params): AppQuery<PaginationParams>,
    AppQuery(filter): AppQuery<InvoiceFilter>,
) -> Result<Json<ApiResponse<PaginatedResponse<InvoiceSummaryResponse>>>, ServiceError> {
    let (page, limit) = params.resolve(state.config.default_page_size, state.config.max_page_size);
    let invoices = state
        .services
        .invoices
        .list(filter.status, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::from_page(
        invoices, page, limit,
    ))))
}

/// Settle the outstanding balance administratively
#[utoipa::path(
    post,
    path = "/api/v1/invoices/:id/mark-paid",
    params(("id" = Uuid, Path, description = "Invoice ID")),
    responses(
        (status = 200, description = "Invoice settled", body = ApiResponse<InvoiceResponse>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Invoices"
)]
pub async fn mark_invoice_paid(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
    user: CurrentUser,
) -> Result<Json<ApiResponse<InvoiceResponse>>, ServiceError> {
    let invoice = state.services.invoices.mark_as_paid(id, user.id()).await?;
    Ok(Json(ApiResponse::success(invoice)))
}

/// Invoice routes, nested under `/invoices`
pub fn invoice_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_invoices).post(create_invoice))
        .route(
            "/:id",
            get(get_invoice).put(update_invoice).delete(delete_invoice),
        )
        .route("/:id/mark-paid", post(mark_invoice_paid))
        .merge(super::payments::invoice_payment_routes())
}
