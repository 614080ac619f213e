use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder,
};
use uuid::Uuid;

use crate::entities::invoice::{self, Entity as Invoice, PaymentStatus};
use crate::entities::invoice_item::{self, Entity as InvoiceItem};
use crate::entities::payment::{self, Entity as Payment};
use crate::errors::ServiceError;

use super::{fetch_page, Page};

/// Persistence port for the invoice aggregate: invoices, their lines and payments
pub struct InvoiceRepository<'c, C> {
    conn: &'c C,
}

impl<'c, C: ConnectionTrait> InvoiceRepository<'c, C> {
    pub fn new(conn: &'c C) -> Self {
        Self { conn }
    }

    /// Find a live invoice by ID
    pub async fn find_active(&self, id: Uuid) -> Result<Option<invoice::Model>, ServiceError> {
        Ok(Invoice::find_by_id(id)
            .filter(invoice::Column::IsDeleted.eq(false))
            .one(self.conn)
            .await?)
    }

    pub async fn list(
        &self,
        status: Option<PaymentStatus>,
        page: u64,
        per_page: u64,
    ) -> Result<Page<invoice::Model>, ServiceError> {
        let mut select = Invoice::find().filter(invoice::Column::IsDeleted.eq(false));
        if let Some(status) = status {
            select = select.filter(invoice::Column::PaymentStatus.eq(status));
        }
        let select = select
            .order_by_desc(invoice::Column::CreatedAt)
            .order_by_asc(invoice::Column::Id);
        fetch_page(self.conn, select, page, per_page).await
    }

    pub async fn insert(&self, model: invoice::ActiveModel) -> Result<invoice::Model, ServiceError> {
        Ok(model.insert(self.conn).await?)
    }

    /// Applies `patch` only if the row still carries `expected_version`.
    /// Returns false when another writer got there first.
    pub async fn update_if_version(
        &self,
        id: Uuid,
        expected_version: i32,
        patch: invoice::ActiveModel,
    ) -> Result<bool, ServiceError> {
        let result = Invoice::update_many()
            .set(patch)
            .filter(invoice::Column::Id.eq(id))
            .filter(invoice::Column::Version.eq(expected_version))
            .filter(invoice::Column::IsDeleted.eq(false))
            .exec(self.conn)
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// Live line items in line order
    pub async fn items_for(&self, invoice_id: Uuid) -> Result<Vec<invoice_item::Model>, ServiceError> {
        Ok(InvoiceItem::find()
            .filter(invoice_item::Column::InvoiceId.eq(invoice_id))
            .filter(invoice_item::Column::IsDeleted.eq(false))
            .order_by_asc(invoice_item::Column::LineNumber)
            .all(self.conn)
            .await?)
    }

    pub async fn insert_items(
        &self,
        items: Vec<invoice_item::ActiveModel>,
    ) -> Result<(), ServiceError> {
        if items.is_empty() {
            return Ok(());
        }
        InvoiceItem::insert_many(items)
            .exec_without_returning(self.conn)
            .await?;
        Ok(())
    }

    pub async fn soft_delete_items(
        &self,
        invoice_id: Uuid,
        at: DateTime<Utc>,
        by: Option<Uuid>,
    ) -> Result<u64, ServiceError> {
        let result = InvoiceItem::update_many()
            .col_expr(invoice_item::Column::IsDeleted, Expr::value(true))
            .col_expr(invoice_item::Column::DeletedAt, Expr::value(Some(at)))
            .col_expr(invoice_item::Column::DeletedBy, Expr::value(by))
            .col_expr(invoice_item::Column::UpdatedAt, Expr::value(at))
            .col_expr(invoice_item::Column::UpdatedBy, Expr::value(by))
            .filter(invoice_item::Column::InvoiceId.eq(invoice_id))
            .filter(invoice_item::Column::IsDeleted.eq(false))
            .exec(self.conn)
            .await?;
        Ok(result.rows_affected)
    }

    /// Live payments ordered by `paid_at` ascending
    pub async fn payments_for(&self, invoice_id: Uuid) -> Result<Vec<payment::Model>, ServiceError> {
        Ok(Payment::find()
            .filter(payment::Column::InvoiceId.eq(invoice_id))
            .filter(payment::Column::IsDeleted.eq(false))
            .order_by_asc(payment::Column::PaidAt)
            .order_by_asc(payment::Column::CreatedAt)
            .all(self.conn)
            .await?)
    }

    pub async fn find_payment(&self, id: Uuid) -> Result<Option<payment::Model>, ServiceError> {
        Ok(Payment::find_by_id(id)
            .filter(payment::Column::IsDeleted.eq(false))
            .one(self.conn)
            .await?)
    }

    pub async fn insert_payment(
        &self,
        model: payment::ActiveModel,
    ) -> Result<payment::Model, ServiceError> {
        Ok(model.insert(self.conn).await?)
    }

    pub async fn soft_delete_payments(
        &self,
        invoice_id: Uuid,
        at: DateTime<Utc>,
        by: Option<Uuid>,
    ) -> Result<u64, ServiceError> {
        let result = Payment::update_many()
            .col_expr(payment::Column::IsDeleted, Expr::value(true))
            .col_expr(payment::Column::DeletedAt, Expr::value(Some(at)))
            .col_expr(payment::Column::DeletedBy, Expr::value(by))
            .col_expr(payment::Column::UpdatedAt, Expr::value(at))
            .col_expr(payment::Column::UpdatedBy, Expr::value(by))
            .filter(payment::Column::InvoiceId.eq(invoice_id))
            .filter(payment::Column::IsDeleted.eq(false))
            .exec(self.conn)
            .await?;
        Ok(result.rows_affected)
    }
}
