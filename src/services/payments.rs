use crate::{
    db::{with_retry, with_store_timeout, ConflictRetryPolicy, DbPool, RetryConfig},
    entities::category,
    entities::invoice::{self, PaymentStatus},
    entities::ledger_transaction::{self, SourceType, TransactionType},
    entities::payment::{self, PaymentMethod},
    entities::{Audited, Lifecycle},
    errors::ServiceError,
    events::{Event, EventSender},
    repositories::InvoiceRepository,
    services::{
        categories::INVOICE_CATEGORY,
        ensure_money_scale,
        ledger::{LedgerService, Posting},
        SharedClock, UnitOfWorkSettings,
    },
};
use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RecordPaymentRequest {
    pub amount: Decimal,
    /// Defaults to now
    pub paid_at: Option<DateTime<Utc>>,
    pub method: PaymentMethod,
    #[validate(length(max = 128))]
    pub reference: Option<String>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub paid_at: DateTime<Utc>,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
    #[serde(flatten)]
    pub lifecycle: Lifecycle,
}

impl From<payment::Model> for PaymentResponse {
    fn from(model: payment::Model) -> Self {
        let lifecycle = model.lifecycle();
        Self {
            id: model.id,
            invoice_id: model.invoice_id,
            amount: model.amount,
            paid_at: model.paid_at,
            method: model.method,
            reference: model.reference,
            notes: model.notes,
            lifecycle,
        }
    }
}

/// Invoice totals plus its payments ordered by `paid_at`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PaymentDetailsResponse {
    pub invoice_id: Uuid,
    pub reference: String,
    pub sub_total: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub paid_amount: Decimal,
    pub balance_due: Decimal,
    pub payment_status: PaymentStatus,
    pub is_paid: bool,
    pub payments: Vec<PaymentResponse>,
}

/// How much a payment attempt should settle
#[derive(Debug, Clone, Copy)]
enum Settlement {
    Exact(Decimal),
    /// Whatever is still outstanding when the unit of work runs
    Outstanding,
}

struct Recorded {
    payment: payment::Model,
    transaction: ledger_transaction::Model,
    status: PaymentStatus,
}

/// Records payments against invoices and keeps the invoice aggregate and ledger in step.
pub struct PaymentService {
    db: Arc<DbPool>,
    ledger: Arc<LedgerService>,
    clock: SharedClock,
    event_sender: Option<Arc<EventSender>>,
    settings: UnitOfWorkSettings,
}

impl PaymentService {
    pub fn new(
        db: Arc<DbPool>,
        ledger: Arc<LedgerService>,
        clock: SharedClock,
        event_sender: Option<Arc<EventSender>>,
        settings: UnitOfWorkSettings,
    ) -> Self {
        Self {
            db,
            ledger,
            clock,
            event_sender,
            settings,
        }
    }

    /// Records a payment. The payment row, the invoice's paid amount and status,
    /// and the credit posting commit together or not at all.
    #[instrument(skip(self, request), fields(invoice_id = %invoice_id, amount = %request.amount))]
    pub async fn record_payment(
        &self,
        invoice_id: Uuid,
        request: RecordPaymentRequest,
        actor: Option<Uuid>,
    ) -> Result<PaymentResponse, ServiceError> {
        if request.amount <= Decimal::ZERO {
            counter!("invoice_ledger_payments.rejected", 1);
            return Err(ServiceError::ValidationError(
                "Payment amount must be greater than zero".to_string(),
            ));
        }
        if let Err(e) = ensure_money_scale("Payment amount", request.amount) {
            counter!("invoice_ledger_payments.rejected", 1);
            return Err(e);
        }
        request.validate()?;

        let recorded = self
            .settle(
                invoice_id,
                Settlement::Exact(request.amount),
                request.method,
                request.paid_at,
                request.reference,
                request.notes,
                actor,
            )
            .await?
            .ok_or_else(|| {
                ServiceError::InternalError("exact settlement produced no payment".into())
            })?;

        Ok(recorded.payment.into())
    }

    /// Pays off the outstanding balance with an administrative settlement.
    /// Returns `None` when nothing was outstanding.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn settle_outstanding(
        &self,
        invoice_id: Uuid,
        actor: Option<Uuid>,
    ) -> Result<Option<PaymentResponse>, ServiceError> {
        let recorded = self
            .settle(
                invoice_id,
                Settlement::Outstanding,
                PaymentMethod::AdministrativeSettlement,
                None,
                None,
                Some("Marked as paid".to_string()),
                actor,
            )
            .await?;
        Ok(recorded.map(|r| r.payment.into()))
    }

    #[allow(clippy::too_many_arguments)]
    async fn settle(
        &self,
        invoice_id: Uuid,
        settlement: Settlement,
        method: PaymentMethod,
        paid_at: Option<DateTime<Utc>>,
        reference: Option<String>,
        notes: Option<String>,
        actor: Option<Uuid>,
    ) -> Result<Option<Recorded>, ServiceError> {
        // Fail fast on unknown invoices before touching reference data
        InvoiceRepository::new(&*self.db)
            .find_active(invoice_id)
            .await?
            .ok_or_else(|| invoice_not_found(invoice_id))?;

        // Categories are reference data; resolve outside the payment transaction
        let category = self
            .ledger
            .resolve_category(INVOICE_CATEGORY, TransactionType::Credit, true, actor)
            .await?;

        let paid_at = paid_at.unwrap_or_else(|| self.clock.now());
        let retry = RetryConfig::with_max_attempts(self.settings.max_attempts);

        let outcome = with_store_timeout(
            self.settings.store_timeout,
            "record_payment",
            with_retry(&retry, ConflictRetryPolicy, || {
                self.attempt(
                    invoice_id,
                    settlement,
                    method,
                    paid_at,
                    reference.clone(),
                    notes.clone(),
                    &category,
                    actor,
                )
            }),
        )
        .await;

        let recorded = match outcome {
            Ok(recorded) => recorded,
            Err(e) => {
                counter!("invoice_ledger_payments.rejected", 1);
                if e.is_client_error() {
                    warn!(%invoice_id, error = %e, "payment rejected");
                } else {
                    error!(%invoice_id, error = %e, "payment failed");
                }
                return Err(e);
            }
        };

        if let Some(recorded) = &recorded {
            counter!("invoice_ledger_payments.recorded", 1);
            info!(
                %invoice_id,
                payment_id = %recorded.payment.id,
                amount = %recorded.payment.amount,
                status = %recorded.status,
                "payment recorded"
            );
            self.announce(recorded).await;
        }

        Ok(recorded)
    }

    /// One unit of work. Any error drops the transaction, which rolls it back.
    #[allow(clippy::too_many_arguments)]
    async fn attempt(
        &self,
        invoice_id: Uuid,
        settlement: Settlement,
        method: PaymentMethod,
        paid_at: DateTime<Utc>,
        reference: Option<String>,
        notes: Option<String>,
        category: &category::Model,
        actor: Option<Uuid>,
    ) -> Result<Option<Recorded>, ServiceError> {
        let txn = self.db.begin().await?;
        let repo = InvoiceRepository::new(&txn);

        let invoice = repo
            .find_active(invoice_id)
            .await?
            .ok_or_else(|| invoice_not_found(invoice_id))?;

        let paid_before: Decimal = repo
            .payments_for(invoice_id)
            .await?
            .iter()
            .map(|p| p.amount)
            .sum();

        let amount = match settlement {
            Settlement::Exact(amount) => amount,
            Settlement::Outstanding => {
                let outstanding = invoice.total - paid_before;
                if outstanding <= Decimal::ZERO {
                    return Ok(None);
                }
                outstanding
            }
        };

        let paid_after = paid_before + amount;
        if paid_after > invoice.total {
            return Err(ServiceError::ValidationError(format!(
                "Payment of {} exceeds the outstanding balance of {} on invoice {}",
                amount,
                invoice.total - paid_before,
                invoice.reference
            )));
        }

        let now = self.clock.now();
        let payment = repo
            .insert_payment(payment::ActiveModel {
                id: Set(Uuid::new_v4()),
                invoice_id: Set(invoice_id),
                amount: Set(amount),
                paid_at: Set(paid_at),
                method: Set(method),
                reference: Set(reference),
                notes: Set(notes),
                created_at: Set(now),
                created_by: Set(actor),
                updated_at: Set(now),
                updated_by: Set(actor),
                deleted_at: Set(None),
                deleted_by: Set(None),
                is_deleted: Set(false),
            })
            .await?;

        let status = PaymentStatus::derive(paid_after, invoice.total);
        let patch = invoice::ActiveModel {
            paid_amount: Set(paid_after),
            payment_status: Set(status),
            is_paid: Set(status.is_paid()),
            version: Set(invoice.version + 1),
            updated_at: Set(now),
            updated_by: Set(actor),
            ..Default::default()
        };
        if !repo
            .update_if_version(invoice_id, invoice.version, patch)
            .await?
        {
            return Err(ServiceError::ConcurrentModification(invoice_id));
        }

        let transaction = self
            .ledger
            .post_within(
                &txn,
                category,
                Posting {
                    source_type: SourceType::Invoice,
                    source_id: Some(invoice_id),
                    transaction_type: TransactionType::Credit,
                    amount,
                    description: format!("Payment received for invoice {}", invoice.reference),
                    reference: Some(invoice.reference.clone()),
                    company_id: invoice.company_id,
                    transaction_date: paid_at,
                },
                actor,
            )
            .await?;

        txn.commit().await?;

        Ok(Some(Recorded {
            payment,
            transaction,
            status,
        }))
    }

    async fn announce(&self, recorded: &Recorded) {
        self.ledger.announce(&recorded.transaction).await;
        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::PaymentRecorded {
                    invoice_id: recorded.payment.invoice_id,
                    payment_id: recorded.payment.id,
                    amount: recorded.payment.amount,
                })
                .await;
            if recorded.status.is_paid() {
                sender
                    .send_or_log(Event::InvoicePaid {
                        invoice_id: recorded.payment.invoice_id,
                    })
                    .await;
            }
        }
    }

    /// Invoice totals with payments ordered by `paid_at` ascending
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn get_payment_details(
        &self,
        invoice_id: Uuid,
    ) -> Result<PaymentDetailsResponse, ServiceError> {
        let repo = InvoiceRepository::new(&*self.db);
        let invoice = repo
            .find_active(invoice_id)
            .await?
            .ok_or_else(|| invoice_not_found(invoice_id))?;
        let payments = repo.payments_for(invoice_id).await?;

        Ok(PaymentDetailsResponse {
            invoice_id: invoice.id,
            balance_due: invoice.balance_due(),
            reference: invoice.reference,
            sub_total: invoice.sub_total,
            tax: invoice.tax,
            total: invoice.total,
            paid_amount: invoice.paid_amount,
            payment_status: invoice.payment_status,
            is_paid: invoice.is_paid,
            payments: payments.into_iter().map(Into::into).collect(),
        })
    }

    pub async fn list_for_invoice(
        &self,
        invoice_id: Uuid,
    ) -> Result<Vec<PaymentResponse>, ServiceError> {
        let repo = InvoiceRepository::new(&*self.db);
        repo.find_active(invoice_id)
            .await?
            .ok_or_else(|| invoice_not_found(invoice_id))?;
        Ok(repo
            .payments_for(invoice_id)
            .await?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    pub async fn get_payment(&self, id: Uuid) -> Result<PaymentResponse, ServiceError> {
        InvoiceRepository::new(&*self.db)
            .find_payment(id)
            .await?
            .map(Into::into)
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {} not found", id)))
    }
}

pub(crate) fn invoice_not_found(id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("Invoice {} not found", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::invoicing::{CreateInvoiceRequest, InvoiceLineRequest};
    use crate::services::test_support::{harness, Harness};
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    async fn invoice_of_27_50(h: &Harness) -> Uuid {
        h.invoices
            .create(
                CreateInvoiceRequest {
                    reference: "INV-1001".into(),
                    po_number: None,
                    invoice_date: None,
                    due_date: None,
                    customer_id: None,
                    branch_id: None,
                    price_list_id: None,
                    company_id: None,
                    tax: dec!(2.5),
                    notes: None,
                    items: vec![
                        InvoiceLineRequest::new("Widget", dec!(2), dec!(10)),
                        InvoiceLineRequest::new("Gadget", dec!(1), dec!(5)),
                    ],
                },
                None,
            )
            .await
            .unwrap()
            .invoice
            .id
    }

    fn pay(amount: Decimal) -> RecordPaymentRequest {
        RecordPaymentRequest {
            amount,
            paid_at: None,
            method: PaymentMethod::BankTransfer,
            reference: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn full_payment_marks_invoice_paid_and_posts_one_credit() {
        let h = harness().await;
        let invoice_id = invoice_of_27_50(&h).await;

        let payment = h
            .payments
            .record_payment(invoice_id, pay(dec!(27.5)), None)
            .await
            .unwrap();
        assert_eq!(payment.amount, dec!(27.5));

        let details = h.payments.get_payment_details(invoice_id).await.unwrap();
        assert_eq!(details.paid_amount, dec!(27.5));
        assert_eq!(details.payment_status, PaymentStatus::Paid);
        assert!(details.is_paid);
        assert_eq!(details.balance_due, Decimal::ZERO);

        let postings = h
            .ledger
            .by_source(SourceType::Invoice, Some(invoice_id))
            .await
            .unwrap();
        assert_eq!(postings.len(), 1);
        assert_eq!(postings[0].transaction_type, TransactionType::Credit);
        assert_eq!(postings[0].amount, dec!(27.5));
        assert_eq!(postings[0].category_name, INVOICE_CATEGORY);
        assert_eq!(postings[0].reference.as_deref(), Some("INV-1001"));
    }

    #[tokio::test]
    async fn two_partial_payments_sum_to_paid() {
        let h = harness().await;
        let invoice_id = invoice_of_27_50(&h).await;

        h.payments
            .record_payment(invoice_id, pay(dec!(10)), None)
            .await
            .unwrap();
        let details = h.payments.get_payment_details(invoice_id).await.unwrap();
        assert_eq!(details.payment_status, PaymentStatus::PartiallyPaid);
        assert!(!details.is_paid);

        h.payments
            .record_payment(invoice_id, pay(dec!(17.5)), None)
            .await
            .unwrap();
        let details = h.payments.get_payment_details(invoice_id).await.unwrap();
        assert_eq!(details.paid_amount, dec!(27.5));
        assert_eq!(details.payment_status, PaymentStatus::Paid);
        assert_eq!(details.payments.len(), 2);

        let postings = h
            .ledger
            .by_source(SourceType::Invoice, Some(invoice_id))
            .await
            .unwrap();
        assert_eq!(postings.len(), 2);
    }

    #[tokio::test]
    async fn sub_cent_fractions_beyond_storage_scale_are_rejected() {
        let h = harness().await;
        let invoice_id = invoice_of_27_50(&h).await;

        let err = h
            .payments
            .record_payment(invoice_id, pay(dec!(0.00001)), None)
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(message) if message.contains("decimal places"));
        assert_eq!(h.ledger.list(1, 10).await.unwrap().total, 0);

        let payment = h
            .payments
            .record_payment(invoice_id, pay(dec!(0.0625)), None)
            .await
            .unwrap();
        assert_eq!(payment.amount, dec!(0.0625));
    }

    #[tokio::test]
    async fn non_positive_payment_writes_nothing() {
        let h = harness().await;
        let invoice_id = invoice_of_27_50(&h).await;

        for amount in [dec!(0), dec!(-1)] {
            let err = h
                .payments
                .record_payment(invoice_id, pay(amount), None)
                .await
                .unwrap_err();
            assert_matches!(err, ServiceError::ValidationError(_));
        }

        assert!(h
            .payments
            .list_for_invoice(invoice_id)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(h.ledger.list(1, 10).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn overpayment_is_rejected_and_rolled_back() {
        let h = harness().await;
        let invoice_id = invoice_of_27_50(&h).await;
        h.payments
            .record_payment(invoice_id, pay(dec!(20)), None)
            .await
            .unwrap();

        let err = h
            .payments
            .record_payment(invoice_id, pay(dec!(10)), None)
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(msg) if msg.contains("exceeds"));

        let details = h.payments.get_payment_details(invoice_id).await.unwrap();
        assert_eq!(details.paid_amount, dec!(20));
        assert_eq!(details.payments.len(), 1);
        assert_eq!(
            h.ledger
                .by_source(SourceType::Invoice, Some(invoice_id))
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn concurrent_payments_both_land_when_they_fit() {
        let h = harness().await;
        let invoice_id = invoice_of_27_50(&h).await;

        let a = {
            let payments = h.payments.clone();
            tokio::spawn(async move { payments.record_payment(invoice_id, pay(dec!(10)), None).await })
        };
        let b = {
            let payments = h.payments.clone();
            tokio::spawn(async move { payments.record_payment(invoice_id, pay(dec!(12.5)), None).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let details = h.payments.get_payment_details(invoice_id).await.unwrap();
        assert_eq!(details.paid_amount, dec!(22.5));
        assert_eq!(details.payments.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_payments_reject_the_one_that_would_overpay() {
        let h = harness().await;
        let invoice_id = invoice_of_27_50(&h).await;

        let a = {
            let payments = h.payments.clone();
            tokio::spawn(async move { payments.record_payment(invoice_id, pay(dec!(20)), None).await })
        };
        let b = {
            let payments = h.payments.clone();
            tokio::spawn(async move { payments.record_payment(invoice_id, pay(dec!(15)), None).await })
        };
        let results = [a.await.unwrap(), b.await.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(ServiceError::ValidationError(_)))));

        let details = h.payments.get_payment_details(invoice_id).await.unwrap();
        let paid: Decimal = details.payments.iter().map(|p| p.amount).sum();
        assert_eq!(details.paid_amount, paid);
        assert!(details.paid_amount <= details.total);
    }

    #[tokio::test]
    async fn payment_details_list_payments_by_paid_at() {
        let h = harness().await;
        let invoice_id = invoice_of_27_50(&h).await;
        let later = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();

        let mut first = pay(dec!(5));
        first.paid_at = Some(later);
        let mut second = pay(dec!(7.5));
        second.paid_at = Some(earlier);
        h.payments.record_payment(invoice_id, first, None).await.unwrap();
        h.payments.record_payment(invoice_id, second, None).await.unwrap();

        let details = h.payments.get_payment_details(invoice_id).await.unwrap();
        let dates: Vec<_> = details.payments.iter().map(|p| p.paid_at).collect();
        assert_eq!(dates, vec![earlier, later]);
    }

    #[tokio::test]
    async fn unknown_invoice_is_not_found() {
        let h = harness().await;
        let missing = Uuid::new_v4();
        assert_matches!(
            h.payments.record_payment(missing, pay(dec!(1)), None).await,
            Err(ServiceError::NotFound(_))
        );
        assert_matches!(
            h.payments.get_payment_details(missing).await,
            Err(ServiceError::NotFound(_))
        );
        assert!(h.categories.find_by_name(INVOICE_CATEGORY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invoice_category_is_a_protected_system_category() {
        let h = harness().await;
        let invoice_id = invoice_of_27_50(&h).await;
        h.payments
            .record_payment(invoice_id, pay(dec!(1)), None)
            .await
            .unwrap();

        let category = h
            .categories
            .find_by_name(INVOICE_CATEGORY)
            .await
            .unwrap()
            .unwrap();
        assert!(category.is_system);
        assert_matches!(
            h.categories.delete(category.id, None).await,
            Err(ServiceError::Conflict(_))
        );
    }

    #[tokio::test]
    async fn paid_amount_tracks_payments_over_a_sequence() {
        let h = harness().await;
        let invoice_id = invoice_of_27_50(&h).await;
        for amount in [dec!(1), dec!(2.5), dec!(4), dec!(0.5), dec!(6)] {
            h.payments
                .record_payment(invoice_id, pay(amount), None)
                .await
                .unwrap();
            let details = h.payments.get_payment_details(invoice_id).await.unwrap();
            let sum: Decimal = details.payments.iter().map(|p| p.amount).sum();
            assert_eq!(details.paid_amount, sum);
            assert_eq!(
                details.payment_status,
                PaymentStatus::derive(sum, details.total)
            );
        }
    }

    #[tokio::test]
    async fn get_payment_returns_the_row() {
        let h = harness().await;
        let invoice_id = invoice_of_27_50(&h).await;
        let actor = Some(Uuid::new_v4());
        let recorded = h
            .payments
            .record_payment(invoice_id, pay(dec!(3)), actor)
            .await
            .unwrap();

        let fetched = h.payments.get_payment(recorded.id).await.unwrap();
        assert_eq!(fetched, recorded);
        assert_eq!(fetched.lifecycle.created_by, actor);
        assert_matches!(
            h.payments.get_payment(Uuid::new_v4()).await,
            Err(ServiceError::NotFound(_))
        );
    }
}
