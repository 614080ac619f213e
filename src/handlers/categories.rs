use super::common::{AppJson, AppPath, AppQuery, CurrentUser, PaginationParams};
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::categories::{CategoryResponse, CreateCategoryRequest};
use crate::{ApiResponse, PaginatedResponse};
use axum::{
    extract::{Json, State},
    http::StatusCode,
    routing::get,
    Router,
};
use uuid::Uuid;

#[utoipa::path(
    get,
    path = "/api/v1/categories",
    params(PaginationParams),
    responses(
        (status = 200, description = "Live categories by name", body = ApiResponse<PaginatedResponse<CategoryResponse>>)
    ),
    tag = "Categories"
)]
pub async fn list_categories(
    State(state): State<AppState>,
    AppQuery(params): AppQuery<PaginationParams>,
) -> Result<Json<ApiResponse<PaginatedResponse<CategoryResponse>>>, ServiceError> {
    let (page, limit) = params.resolve(state.config.default_page_size, state.config.max_page_size);
    let categories = state.services.categories.list(page, limit).await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::from_page(
        categories, page, limit,
    ))))
}

#[utoipa::path(
    get,
    path = "/api/v1/categories/:id",
    params(("id" = Uuid, Path, description = "Category ID")),
    responses(
        (status = 200, description = "Category", body = ApiResponse<CategoryResponse>),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Categories"
)]
pub async fn get_category(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<ApiResponse<CategoryResponse>>, ServiceError> {
    let category = state.services.categories.get(id).await?;
    Ok(Json(ApiResponse::success(category)))
}

#[utoipa::path(
    post,
    path = "/api/v1/categories",
    request_body = CreateCategoryRequest,
    responses(
        (status = 201, description = "Category created", body = ApiResponse<CategoryResponse>),
        (status = 409, description = "Name already in use", body = crate::errors::ErrorResponse)
    ),
    tag = "Categories"
)]
pub async fn create_category(
    State(state): State<AppState>,
    user: CurrentUser,
    AppJson(request): AppJson<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CategoryResponse>>), ServiceError> {
    let category = state.services.categories.create(request, user.id()).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(category))))
}

/// Soft-delete a category; system categories are refused
#[utoipa::path(
    delete,
    path = "/api/v1/categories/:id",
    params(("id" = Uuid, Path, description = "Category ID")),
    responses(
        (status = 204, description = "Category deleted"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "System category", body = crate::errors::ErrorResponse)
    ),
    tag = "Categories"
)]
pub async fn delete_category(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
    user: CurrentUser,
) -> Result<StatusCode, ServiceError> {
    state.services.categories.delete(id, user.id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Category routes, nested under `/categories`
pub fn category_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_categories).post(create_category))
        .route("/:id", get(get_category).delete(delete_category))
}
