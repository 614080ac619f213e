//! Narrow persistence ports, one per aggregate. Every repository borrows any
//! `ConnectionTrait`, so the same code runs against the pool or an open
//! transaction.

use crate::errors::ServiceError;
use sea_orm::{ConnectionTrait, EntityTrait, PaginatorTrait, Select};

pub mod category_repository;
pub mod invoice_repository;
pub mod ledger_repository;

pub use category_repository::CategoryRepository;
pub use invoice_repository::InvoiceRepository;
pub use ledger_repository::LedgerRepository;

/// One page of rows plus the total across all pages
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}

/// Fetches a 1-based page of `select`.
pub(crate) async fn fetch_page<'db, C, E>(
    conn: &'db C,
    select: Select<E>,
    page: u64,
    per_page: u64,
) -> Result<Page<E::Model>, ServiceError>
where
    C: ConnectionTrait,
    E: EntityTrait,
    E::Model: Send + Sync + 'db,
{
    let paginator = select.paginate(conn, per_page.max(1));
    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(page.max(1) - 1).await?;
    Ok(Page { items, total })
}
