pub mod categories;
pub mod common;
pub mod invoices;
pub mod payments;
pub mod transactions;

use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{
    categories::CategoryService, invoicing::InvoiceService, ledger::LedgerService,
    payments::PaymentService, SharedClock, UnitOfWorkSettings,
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub categories: Arc<CategoryService>,
    pub ledger: Arc<LedgerService>,
    pub payments: Arc<PaymentService>,
    pub invoices: Arc<InvoiceService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        clock: SharedClock,
        settings: UnitOfWorkSettings,
    ) -> Self {
        let categories = Arc::new(CategoryService::new(
            db_pool.clone(),
            clock.clone(),
            settings,
        ));
        let ledger = Arc::new(LedgerService::new(
            db_pool.clone(),
            categories.clone(),
            clock.clone(),
            Some(event_sender.clone()),
            settings,
        ));
        let payments = Arc::new(PaymentService::new(
            db_pool.clone(),
            ledger.clone(),
            clock.clone(),
            Some(event_sender.clone()),
            settings,
        ));
        let invoices = Arc::new(InvoiceService::new(
            db_pool,
            payments.clone(),
            clock,
            Some(event_sender),
            settings,
        ));

        Self {
            categories,
            ledger,
            payments,
            invoices,
        }
    }
}
