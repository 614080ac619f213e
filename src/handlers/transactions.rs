use super::common::{AppJson, AppPath, AppQuery, CurrentUser, PaginationParams};
use crate::entities::ledger_transaction::SourceType;
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::ledger::{LedgerSummary, PostTransactionRequest, TransactionResponse};
use crate::{ApiResponse, PaginatedResponse};
use axum::{
    extract::{Json, State},
    http::StatusCode,
    routing::get,
    Router,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

#[derive(Debug, Deserialize, IntoParams)]
pub struct BySourceQuery {
    /// Source document kind (Invoice, GRN, Manual)
    #[serde(rename = "type")]
    #[param(rename = "type")]
    pub source_type: SourceType,
    /// Source document id; omit to match every document of the kind
    pub id: Option<Uuid>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ByCategoryQuery {
    /// Category name, matched case-insensitively
    pub name: String,
}

/// Post a manual or GRN transaction
#[utoipa::path(
    post,
    path = "/api/v1/transactions",
    request_body = PostTransactionRequest,
    responses(
        (status = 201, description = "Transaction posted", body = ApiResponse<TransactionResponse>),
        (status = 400, description = "Invalid posting", body = crate::errors::ErrorResponse)
    ),
    tag = "Transactions"
)]
pub async fn post_transaction(
    State(state): State<AppState>,
    user: CurrentUser,
    AppJson(request): AppJson<PostTransactionRequest>,
) -> Result<(StatusCode, Json<ApiResponse<TransactionResponse>>), ServiceError> {
    let transaction = state
        .services
        .ledger
        .create_from_source(request, user.id())
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(transaction))))
}

#[utoipa::path(
    get,
    path = "/api/v1/transactions",
    params(PaginationParams),
    responses(
        (status = 200, description = "Transactions, newest first", body = ApiResponse<PaginatedResponse<TransactionResponse>>)
    ),
    tag = "Transactions"
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    AppQuery(params): AppQuery<PaginationParams>,
) -> Result<Json<ApiResponse<PaginatedResponse<TransactionResponse>>>, ServiceError> {
    let (page, limit) = params.resolve(state.config.default_page_size, state.config.max_page_size);
    let transactions = state.services.ledger.list(page, limit).await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::from_page(
        transactions,
        page,
        limit,
    ))))
}

#[utoipa::path(
    get,
    path = "/api/v1/transactions/:id",
    params(("id" = Uuid, Path, description = "Transaction ID")),
    responses(
        (status = 200, description = "Transaction", body = ApiResponse<TransactionResponse>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Transactions"
)]
pub async fn get_transaction(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<ApiResponse<TransactionResponse>>, ServiceError> {
    let transaction = state.services.ledger.get(id).await?;
    Ok(Json(ApiResponse::success(transaction)))
}

/// Transactions derived from one source document
#[utoipa::path(
    get,
    path = "/api/v1/transactions/by-source",
    params(BySourceQuery),
    responses(
        (status = 200, description = "Transactions for the source", body = ApiResponse<Vec<TransactionResponse>>),
        (status = 400, description = "Unknown source type", body = crate::errors::ErrorResponse)
    ),
    tag = "Transactions"
)]
pub async fn transactions_by_source(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<BySourceQuery>,
) -> Result<Json<ApiResponse<Vec<TransactionResponse>>>, ServiceError> {
    let transactions = state
        .services
        .ledger
        .by_source(query.source_type, query.id)
        .await?;
    Ok(Json(ApiResponse::success(transactions)))
}

#[utoipa::path(
    get,
    path = "/api/v1/transactions/by-category",
    params(ByCategoryQuery),
    responses(
        (status = 200, description = "Transactions in the category", body = ApiResponse<Vec<TransactionResponse>>)
    ),
    tag = "Transactions"
)]
pub async fn transactions_by_category(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<ByCategoryQuery>,
) -> Result<Json<ApiResponse<Vec<TransactionResponse>>>, ServiceError> {
    let transactions = state.services.ledger.by_category(&query.name).await?;
    Ok(Json(ApiResponse::success(transactions)))
}

/// Debit and credit totals across the ledger
#[utoipa::path(
    get,
    path = "/api/v1/transactions/summary",
    responses(
        (status = 200, description = "Ledger summary", body = ApiResponse<LedgerSummary>)
    ),
    tag = "Transactions"
)]
pub async fn transaction_summary(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<LedgerSummary>>, ServiceError> {
    let summary = state.services.ledger.summary().await?;
    Ok(Json(ApiResponse::success(summary)))
}

/// Transaction routes, nested under `/transactions`
pub fn transaction_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_transactions).post(post_transaction))
        .route("/by-source", get(transactions_by_source))
        .route("/by-category", get(transactions_by_category))
        .route("/summary", get(transaction_summary))
        .route("/:id", get(get_transaction))
}
