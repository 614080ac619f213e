use futures::TryStreamExt;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    StreamTrait,
};
use uuid::Uuid;

use crate::entities::ledger_transaction::{self, Entity as LedgerTransaction, SourceType};
use crate::errors::ServiceError;

use super::{fetch_page, Page};

/// Append-only persistence port for ledger transactions
pub struct LedgerRepository<'c, C> {
    conn: &'c C,
}

impl<'c, C: ConnectionTrait> LedgerRepository<'c, C> {
    pub fn new(conn: &'c C) -> Self {
        Self { conn }
    }

    pub async fn insert(
        &self,
        model: ledger_transaction::ActiveModel,
    ) -> Result<ledger_transaction::Model, ServiceError> {
        Ok(model.insert(self.conn).await?)
    }

    pub async fn find_active(
        &self,
        id: Uuid,
    ) -> Result<Option<ledger_transaction::Model>, ServiceError> {
        Ok(LedgerTransaction::find_by_id(id)
            .filter(ledger_transaction::Column::IsDeleted.eq(false))
            .one(self.conn)
            .await?)
    }

    pub async fn list(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<Page<ledger_transaction::Model>, ServiceError> {
        let select = LedgerTransaction::find()
            .filter(ledger_transaction::Column::IsDeleted.eq(false))
            .order_by_desc(ledger_transaction::Column::TransactionDate)
            .order_by_desc(ledger_transaction::Column::CreatedAt);
        fetch_page(self.conn, select, page, per_page).await
    }

    /// Postings attributed to one source document, oldest first.
    /// A `None` source id matches postings recorded without one.
    pub async fn by_source(
        &self,
        source_type: SourceType,
        source_id: Option<Uuid>,
    ) -> Result<Vec<ledger_transaction::Model>, ServiceError> {
        let mut select = LedgerTransaction::find()
            .filter(ledger_transaction::Column::IsDeleted.eq(false))
            .filter(ledger_transaction::Column::SourceType.eq(source_type));
        select = match source_id {
            Some(id) => select.filter(ledger_transaction::Column::SourceId.eq(id)),
            None => select.filter(ledger_transaction::Column::SourceId.is_null()),
        };
        Ok(select
            .order_by_asc(ledger_transaction::Column::TransactionDate)
            .order_by_asc(ledger_transaction::Column::CreatedAt)
            .all(self.conn)
            .await?)
    }

    pub async fn by_category(
        &self,
        category_id: Uuid,
    ) -> Result<Vec<ledger_transaction::Model>, ServiceError> {
        Ok(LedgerTransaction::find()
            .filter(ledger_transaction::Column::IsDeleted.eq(false))
            .filter(ledger_transaction::Column::CategoryId.eq(category_id))
            .order_by_asc(ledger_transaction::Column::TransactionDate)
            .order_by_asc(ledger_transaction::Column::CreatedAt)
            .all(self.conn)
            .await?)
    }
}

impl<'c, C: ConnectionTrait + StreamTrait + Send> LedgerRepository<'c, C> {
    /// Streams every live transaction through `fold` one row at a time.
    /// Decimal sums stay in Rust so they are exact on every backend.
    pub async fn fold_active<F>(&self, mut fold: F) -> Result<(), ServiceError>
    where
        F: FnMut(&ledger_transaction::Model),
    {
        let stream = LedgerTransaction::find()
            .filter(ledger_transaction::Column::IsDeleted.eq(false))
            .stream(self.conn)
            .await?;
        futures::pin_mut!(stream);

        while let Some(model) = stream.try_next().await? {
            fold(&model);
        }
        Ok(())
    }
}
