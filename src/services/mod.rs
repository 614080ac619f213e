use crate::config::AppConfig;
use crate::entities::{fits_money_scale, MONEY_SCALE};
use crate::errors::ServiceError;
use rust_decimal::Decimal;
use std::time::Duration;

pub mod categories;
pub mod clock;
pub mod invoicing;
pub mod ledger;
pub mod payments;

pub use clock::{Clock, FixedClock, SharedClock, SystemClock};

/// Limits applied to every unit of work a service opens
#[derive(Debug, Clone, Copy)]
pub struct UnitOfWorkSettings {
    pub store_timeout: Duration,
    /// Attempts for optimistic-concurrency retries, first try included
    pub max_attempts: u32,
}

impl Default for UnitOfWorkSettings {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(10),
            max_attempts: 5,
        }
    }
}

impl From<&AppConfig> for UnitOfWorkSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            store_timeout: cfg.store_timeout(),
            max_attempts: cfg.payment_max_attempts.max(1),
        }
    }
}

/// Rejects an amount a money column would have to round.
pub(crate) fn ensure_money_scale(field: &str, value: Decimal) -> Result<(), ServiceError> {
    if fits_money_scale(value) {
        return Ok(());
    }
    Err(ServiceError::ValidationError(format!(
        "{} must have at most {} decimal places",
        field, MONEY_SCALE
    )))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::db::{connect_in_memory, DbPool};
    use crate::events::{self, Event};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    /// Fully wired services over a fresh in-memory database
    pub struct Harness {
        pub db: Arc<DbPool>,
        pub categories: Arc<categories::CategoryService>,
        pub ledger: Arc<ledger::LedgerService>,
        pub payments: Arc<payments::PaymentService>,
        pub invoices: Arc<invoicing::InvoiceService>,
        pub events: mpsc::Receiver<Event>,
    }

    pub fn fixed_clock() -> SharedClock {
        Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().unwrap_or_default(),
        ))
    }

    pub async fn harness() -> Harness {
        let db = Arc::new(connect_in_memory().await.unwrap());
        let (sender, rx) = events::channel(256);
        let sender = Arc::new(sender);
        let clock = fixed_clock();
        let settings = UnitOfWorkSettings::default();

        let categories = Arc::new(categories::CategoryService::new(
            db.clone(),
            clock.clone(),
            settings,
        ));
        let ledger = Arc::new(ledger::LedgerService::new(
            db.clone(),
            categories.clone(),
            clock.clone(),
            Some(sender.clone()),
            settings,
        ));
        let payments = Arc::new(payments::PaymentService::new(
            db.clone(),
            ledger.clone(),
            clock.clone(),
            Some(sender.clone()),
            settings,
        ));
        let invoices = Arc::new(invoicing::InvoiceService::new(
            db.clone(),
            payments.clone(),
            clock,
            Some(sender),
            settings,
        ));

        Harness {
            db,
            categories,
            ledger,
            payments,
            invoices,
            events: rx,
        }
    }
}
