use crate::{errors::ServiceError, repositories::Page, AppState, PaginatedResponse};
use async_trait::async_trait;
use axum::{
    extract::{FromRequest, FromRequestParts},
    http::request::Parts,
};
use serde::{Deserialize, Serialize};
use utoipa::IntoParams;
use uuid::Uuid;

/// Header carrying the acting user's id, recorded in audit columns
pub const USER_ID_HEADER: &str = "x-user-id";

/// JSON body whose rejections render as `ServiceError` responses
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ServiceError))]
pub struct AppJson<T>(pub T);

/// Path parameters whose rejections render as `ServiceError` responses
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ServiceError))]
pub struct AppPath<T>(pub T);

/// Query string whose rejections render as `ServiceError` responses
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ServiceError))]
pub struct AppQuery<T>(pub T);

/// Pagination parameters for list operations
#[derive(Debug, Default, Deserialize, Serialize, IntoParams)]
pub struct PaginationParams {
    /// 1-based page number
    pub page: Option<u64>,
    /// Items per page, capped by configuration
    pub limit: Option<u64>,
}

impl PaginationParams {
    /// Applies configured defaults and caps; returns `(page, limit)`.
    pub fn resolve(&self, default_limit: u64, max_limit: u64) -> (u64, u64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(default_limit).clamp(1, max_limit.max(1));
        (page, limit)
    }
}

impl<T> PaginatedResponse<T> {
    pub fn from_page(page: Page<T>, page_number: u64, limit: u64) -> Self {
        let total_pages = if page.total == 0 {
            0
        } else {
            (page.total + limit - 1) / limit
        };
        Self {
            items: page.items,
            total: page.total,
            page: page_number,
            limit,
            total_pages,
        }
    }
}

/// The acting user, taken from `x-user-id`. Absent means anonymous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub Option<Uuid>);

impl CurrentUser {
    pub fn id(&self) -> Option<Uuid> {
        self.0
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(raw) = parts.headers.get(USER_ID_HEADER) else {
            return Ok(Self(None));
        };
        let id = raw
            .to_str()
            .ok()
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .ok_or_else(|| {
                ServiceError::ValidationError(format!("{} must be a UUID", USER_ID_HEADER))
            })?;
        Ok(Self(Some(id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(None, None, (1, 20))]
    #[case(Some(0), Some(0), (1, 1))]
    #[case(Some(3), Some(50), (3, 50))]
    #[case(Some(2), Some(5000), (2, 100))]
    fn pagination_defaults_and_caps(
        #[case] page: Option<u64>,
        #[case] limit: Option<u64>,
        #[case] expected: (u64, u64),
    ) {
        let params = PaginationParams { page, limit };
        assert_eq!(params.resolve(20, 100), expected);
    }

    #[test]
    fn total_pages_rounds_up() {
        let page = Page {
            items: vec![1, 2],
            total: 21,
        };
        let response = PaginatedResponse::from_page(page, 1, 10);
        assert_eq!(response.total_pages, 3);

        let empty = PaginatedResponse::<u8>::from_page(Page { items: vec![], total: 0 }, 1, 10);
        assert_eq!(empty.total_pages, 0);
    }
}
