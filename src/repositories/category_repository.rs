use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder,
};
use uuid::Uuid;

use crate::entities::category::{self, Entity as Category};
use crate::errors::ServiceError;

use super::{fetch_page, Page};

/// Persistence port for ledger categories
pub struct CategoryRepository<'c, C> {
    conn: &'c C,
}

impl<'c, C: ConnectionTrait> CategoryRepository<'c, C> {
    pub fn new(conn: &'c C) -> Self {
        Self { conn }
    }

    /// Live category whose normalized name equals `name_key`
    pub async fn find_by_key(&self, name_key: &str) -> Result<Option<category::Model>, ServiceError> {
        Ok(Category::find()
            .filter(category::Column::NameKey.eq(name_key))
            .filter(category::Column::IsDeleted.eq(false))
            .one(self.conn)
            .await?)
    }

    pub async fn find_active(&self, id: Uuid) -> Result<Option<category::Model>, ServiceError> {
        Ok(Category::find_by_id(id)
            .filter(category::Column::IsDeleted.eq(false))
            .one(self.conn)
            .await?)
    }

    /// Any category by ID, deleted ones included; ledger rows keep pointing at them
    pub async fn find_any(&self, ids: Vec<Uuid>) -> Result<Vec<category::Model>, ServiceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(Category::find()
            .filter(category::Column::Id.is_in(ids))
            .all(self.conn)
            .await?)
    }

    pub async fn list(&self, page: u64, per_page: u64) -> Result<Page<category::Model>, ServiceError> {
        let select = Category::find()
            .filter(category::Column::IsDeleted.eq(false))
            .order_by_asc(category::Column::NameKey);
        fetch_page(self.conn, select, page, per_page).await
    }

    /// Inserts a category; a duplicate name surfaces as a unique-constraint `DatabaseError`.
    pub async fn insert(
        &self,
        model: category::ActiveModel,
    ) -> Result<category::Model, ServiceError> {
        Ok(model.insert(self.conn).await?)
    }

    /// Soft-deletes the row and moves its name key aside so the name can be reused.
    pub async fn soft_delete(
        &self,
        id: Uuid,
        retired_key: String,
        at: DateTime<Utc>,
        by: Option<Uuid>,
    ) -> Result<bool, ServiceError> {
        let result = Category::update_many()
            .col_expr(category::Column::NameKey, Expr::value(retired_key))
            .col_expr(category::Column::IsDeleted, Expr::value(true))
            .col_expr(category::Column::DeletedAt, Expr::value(Some(at)))
            .col_expr(category::Column::DeletedBy, Expr::value(by))
            .col_expr(category::Column::UpdatedAt, Expr::value(at))
            .col_expr(category::Column::UpdatedBy, Expr::value(by))
            .filter(category::Column::Id.eq(id))
            .filter(category::Column::IsDeleted.eq(false))
            .exec(self.conn)
            .await?;
        Ok(result.rows_affected == 1)
    }
}
