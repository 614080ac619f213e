use crate::{
    db::{with_retry, with_store_timeout, ConflictRetryPolicy, DbPool, RetryConfig},
    entities::invoice::{self, PaymentStatus},
    entities::invoice_item::{self, line_total},
    entities::{fits_money_scale, Audited, Lifecycle, MONEY_SCALE},
    errors::ServiceError,
    events::{Event, EventSender},
    repositories::{InvoiceRepository, Page},
    services::{payments::invoice_not_found, payments::PaymentService, SharedClock, UnitOfWorkSettings},
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct InvoiceLineRequest {
    #[validate(length(min = 1, max = 255, message = "Line description must be 1-255 characters"))]
    pub description: String,
    pub product_id: Option<Uuid>,
    #[validate(custom = "positive_quantity")]
    pub quantity: Decimal,
    #[validate(custom = "non_negative_price")]
    pub unit_price: Decimal,
}

impl InvoiceLineRequest {
    pub fn new(description: impl Into<String>, quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            description: description.into(),
            product_id: None,
            quantity,
            unit_price,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateInvoiceRequest {
    #[validate(length(min = 1, max = 64, message = "Reference must be 1-64 characters"))]
    pub reference: String,
    #[validate(length(max = 64))]
    pub po_number: Option<String>,
    /// Defaults to today
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub customer_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
    pub price_list_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
    #[serde(default)]
    #[validate(custom = "non_negative_tax")]
    pub tax: Decimal,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "An invoice needs at least one line"))]
    #[validate]
    pub items: Vec<InvoiceLineRequest>,
}

/// Full replacement of an invoice's header and lines
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateInvoiceRequest {
    #[validate(length(min = 1, max = 64, message = "Reference must be 1-64 characters"))]
    pub reference: String,
    #[validate(length(max = 64))]
    pub po_number: Option<String>,
    pub invoice_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub customer_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
    pub price_list_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
    #[serde(default)]
    #[validate(custom = "non_negative_tax")]
    pub tax: Decimal,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "An invoice needs at least one line"))]
    #[validate]
    pub items: Vec<InvoiceLineRequest>,
    /// When present the update only applies to this version
    pub version: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct InvoiceItemResponse {
    pub id: Uuid,
    pub line_number: i32,
    pub product_id: Option<Uuid>,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

impl From<invoice_item::Model> for InvoiceItemResponse {
    fn from(model: invoice_item::Model) -> Self {
        Self {
            id: model.id,
            line_number: model.line_number,
            product_id: model.product_id,
            description: model.description,
            quantity: model.quantity,
            unit_price: model.unit_price,
            line_total: model.line_total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct InvoiceSummaryResponse {
    pub id: Uuid,
    pub reference: String,
    pub po_number: Option<String>,
    pub invoice_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub customer_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
    pub price_list_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
    pub sub_total: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub paid_amount: Decimal,
    pub balance_due: Decimal,
    pub is_paid: bool,
    pub payment_status: PaymentStatus,
    pub notes: Option<String>,
    pub version: i32,
    #[serde(flatten)]
    pub lifecycle: Lifecycle,
}

impl From<invoice::Model> for InvoiceSummaryResponse {
    fn from(model: invoice::Model) -> Self {
        let lifecycle = model.lifecycle();
        Self {
            balance_due: model.balance_due(),
            id: model.id,
            reference: model.reference,
            po_number: model.po_number,
            invoice_date: model.invoice_date,
            due_date: model.due_date,
            customer_id: model.customer_id,
            branch_id: model.branch_id,
            price_list_id: model.price_list_id,
            company_id: model.company_id,
            sub_total: model.sub_total,
            tax: model.tax,
            total: model.total,
            paid_amount: model.paid_amount,
            is_paid: model.is_paid,
            payment_status: model.payment_status,
            notes: model.notes,
            version: model.version,
            lifecycle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct InvoiceResponse {
    #[serde(flatten)]
    pub invoice: InvoiceSummaryResponse,
    pub items: Vec<InvoiceItemResponse>,
}

impl InvoiceResponse {
    fn new(invoice: invoice::Model, items: Vec<invoice_item::Model>) -> Self {
        Self {
            invoice: invoice.into(),
            items: items.into_iter().map(Into::into).collect(),
        }
    }
}

/// Subtotal and total derived from invoice lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceTotals {
    pub line_totals: Vec<Decimal>,
    pub sub_total: Decimal,
    pub total: Decimal,
}

pub fn compute_totals(items: &[InvoiceLineRequest], tax: Decimal) -> InvoiceTotals {
    let line_totals: Vec<Decimal> = items
        .iter()
        .map(|item| line_total(item.quantity, item.unit_price))
        .collect();
    let sub_total: Decimal = line_totals.iter().copied().sum();
    InvoiceTotals {
        line_totals,
        sub_total,
        total: sub_total + tax,
    }
}

/// Owns the invoice lifecycle: create, replace, delete and settle.
pub struct InvoiceService {
    db: Arc<DbPool>,
    payments: Arc<PaymentService>,
    clock: SharedClock,
    event_sender: Option<Arc<EventSender>>,
    settings: UnitOfWorkSettings,
}

impl InvoiceService {
    pub fn new(
        db: Arc<DbPool>,
        payments: Arc<PaymentService>,
        clock: SharedClock,
        event_sender: Option<Arc<EventSender>>,
        settings: UnitOfWorkSettings,
    ) -> Self {
        Self {
            db,
            payments,
            clock,
            event_sender,
            settings,
        }
    }

    #[instrument(skip(self, request), fields(reference = %request.reference))]
    pub async fn create(
        &self,
        request: CreateInvoiceRequest,
        actor: Option<Uuid>,
    ) -> Result<InvoiceResponse, ServiceError> {
        request.validate()?;
        let now = self.clock.now();
        let invoice_date = request.invoice_date.unwrap_or_else(|| now.date_naive());
        check_dates(invoice_date, request.due_date)?;
        let totals = compute_totals(&request.items, request.tax);
        check_totals(&totals)?;

        let invoice_id = Uuid::new_v4();
        let (invoice, items) = with_store_timeout(self.settings.store_timeout, "create_invoice", async {
            let txn = self.db.begin().await?;
            let repo = InvoiceRepository::new(&txn);

            let invoice = repo
                .insert(invoice::ActiveModel {
                    id: Set(invoice_id),
                    reference: Set(request.reference.trim().to_string()),
                    po_number: Set(request.po_number.clone()),
                    invoice_date: Set(invoice_date),
                    due_date: Set(request.due_date),
                    customer_id: Set(request.customer_id),
                    branch_id: Set(request.branch_id),
                    price_list_id: Set(request.price_list_id),
                    company_id: Set(request.company_id),
                    sub_total: Set(totals.sub_total),
                    tax: Set(request.tax),
                    total: Set(totals.total),
                    paid_amount: Set(Decimal::ZERO),
                    is_paid: Set(false),
                    payment_status: Set(PaymentStatus::Unpaid),
                    notes: Set(request.notes.clone()),
                    version: Set(1),
                    created_at: Set(now),
                    created_by: Set(actor),
                    updated_at: Set(now),
                    updated_by: Set(actor),
                    deleted_at: Set(None),
                    deleted_by: Set(None),
                    is_deleted: Set(false),
                })
                .await?;

            repo.insert_items(line_models(invoice_id, &request.items, &totals, now, actor))
                .await?;
            let items = repo.items_for(invoice_id).await?;

            txn.commit().await?;
            Ok((invoice, items))
        })
        .await
        .map_err(|e| {
            error!(%invoice_id, error = %e, "failed to create invoice");
            e
        })?;

        info!(%invoice_id, total = %invoice.total, "invoice created");
        self.emit(Event::InvoiceCreated {
            invoice_id,
            total: invoice.total,
        })
        .await;

        Ok(InvoiceResponse::new(invoice, items))
    }

    /// Replaces header fields and lines wholesale. The new total may not drop
    /// below what has already been paid.
    #[instrument(skip(self, request), fields(invoice_id = %id, version = ?request.version))]
    pub async fn update(
        &self,
        id: Uuid,
        request: UpdateInvoiceRequest,
        actor: Option<Uuid>,
    ) -> Result<InvoiceResponse, ServiceError> {
        request.validate()?;
        check_dates(request.invoice_date, request.due_date)?;
        let totals = compute_totals(&request.items, request.tax);
        check_totals(&totals)?;

        // A caller-supplied version must be honoured, not retried past
        let attempts = if request.version.is_some() {
            1
        } else {
            self.settings.max_attempts
        };
        let retry = RetryConfig::with_max_attempts(attempts);

        let (invoice, items) = with_store_timeout(
            self.settings.store_timeout,
            "update_invoice",
            with_retry(&retry, ConflictRetryPolicy, || {
                self.replace(id, &request, &totals, actor)
            }),
        )
        .await?;

        info!(total = %invoice.total, version = invoice.version, "invoice updated");
        self.emit(Event::InvoiceUpdated {
            invoice_id: id,
            total: invoice.total,
            version: invoice.version,
        })
        .await;

        Ok(InvoiceResponse::new(invoice, items))
    }

    async fn replace(
        &self,
        id: Uuid,
        request: &UpdateInvoiceRequest,
        totals: &InvoiceTotals,
        actor: Option<Uuid>,
    ) -> Result<(invoice::Model, Vec<invoice_item::Model>), ServiceError> {
        let txn = self.db.begin().await?;
        let repo = InvoiceRepository::new(&txn);

        let current = repo
            .find_active(id)
            .await?
            .ok_or_else(|| invoice_not_found(id))?;

        if let Some(expected) = request.version {
            if expected != current.version {
                return Err(ServiceError::ConcurrentModification(id));
            }
        }

        if totals.total < current.paid_amount {
            return Err(ServiceError::Conflict(format!(
                "New total {} is below the {} already paid on invoice {}",
                totals.total, current.paid_amount, current.reference
            )));
        }

        let now = self.clock.now();
        let status = PaymentStatus::derive(current.paid_amount, totals.total);
        let patch = invoice::ActiveModel {
            reference: Set(request.reference.trim().to_string()),
            po_number: Set(request.po_number.clone()),
            invoice_date: Set(request.invoice_date),
            due_date: Set(request.due_date),
            customer_id: Set(request.customer_id),
            branch_id: Set(request.branch_id),
            price_list_id: Set(request.price_list_id),
            company_id: Set(request.company_id),
            sub_total: Set(totals.sub_total),
            tax: Set(request.tax),
            total: Set(totals.total),
            payment_status: Set(status),
            is_paid: Set(status.is_paid()),
            notes: Set(request.notes.clone()),
            version: Set(current.version + 1),
            updated_at: Set(now),
            updated_by: Set(actor),
            ..Default::default()
        };
        if !repo.update_if_version(id, current.version, patch).await? {
            return Err(ServiceError::ConcurrentModification(id));
        }

        repo.soft_delete_items(id, now, actor).await?;
        repo.insert_items(line_models(id, &request.items, totals, now, actor))
            .await?;

        let invoice = repo
            .find_active(id)
            .await?
            .ok_or_else(|| invoice_not_found(id))?;
        let items = repo.items_for(id).await?;

        txn.commit().await?;
        Ok((invoice, items))
    }

    /// Soft-deletes the invoice together with its lines and payments.
    /// Ledger transactions already posted stay untouched.
    #[instrument(skip(self), fields(invoice_id = %id))]
    pub async fn delete(&self, id: Uuid, actor: Option<Uuid>) -> Result<(), ServiceError> {
        let retry = RetryConfig::with_max_attempts(self.settings.max_attempts);
        with_store_timeout(
            self.settings.store_timeout,
            "delete_invoice",
            with_retry(&retry, ConflictRetryPolicy, || self.soft_delete(id, actor)),
        )
        .await?;

        info!("invoice deleted");
        self.emit(Event::InvoiceDeleted { invoice_id: id }).await;
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid, actor: Option<Uuid>) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        let repo = InvoiceRepository::new(&txn);

        let current = repo
            .find_active(id)
            .await?
            .ok_or_else(|| invoice_not_found(id))?;

        let now = self.clock.now();
        let patch = invoice::ActiveModel {
            is_deleted: Set(true),
            deleted_at: Set(Some(now)),
            deleted_by: Set(actor),
            updated_at: Set(now),
            updated_by: Set(actor),
            version: Set(current.version + 1),
            ..Default::default()
        };
        if !repo.update_if_version(id, current.version, patch).await? {
            return Err(ServiceError::ConcurrentModification(id));
        }
        repo.soft_delete_items(id, now, actor).await?;
        repo.soft_delete_payments(id, now, actor).await?;

        txn.commit().await?;
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<InvoiceResponse, ServiceError> {
        let repo = InvoiceRepository::new(&*self.db);
        let invoice = repo
            .find_active(id)
            .await?
            .ok_or_else(|| invoice_not_found(id))?;
        let items = repo.items_for(id).await?;
        Ok(InvoiceResponse::new(invoice, items))
    }

    pub async fn list(
        &self,
        status: Option<PaymentStatus>,
        page: u64,
        per_page: u64,
    ) -> Result<Page<InvoiceSummaryResponse>, ServiceError> {
        Ok(InvoiceRepository::new(&*self.db)
            .list(status, page, per_page)
            .await?
            .map(Into::into))
    }

    /// Settles the outstanding balance through the payment recorder so the
    /// payment row and its ledger credit exist like any other payment.
    /// Already-paid invoices are returned unchanged.
    #[instrument(skip(self), fields(invoice_id = %id))]
    pub async fn mark_as_paid(
        &self,
        id: Uuid,
        actor: Option<Uuid>,
    ) -> Result<InvoiceResponse, ServiceError> {
        match self.payments.settle_outstanding(id, actor).await? {
            Some(payment) => info!(payment_id = %payment.id, amount = %payment.amount, "invoice settled"),
            None => info!("invoice already settled"),
        }
        self.get(id).await
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(event).await;
        }
    }
}

fn line_models(
    invoice_id: Uuid,
    items: &[InvoiceLineRequest],
    totals: &InvoiceTotals,
    now: DateTime<Utc>,
    actor: Option<Uuid>,
) -> Vec<invoice_item::ActiveModel> {
    items
        .iter()
        .zip(totals.line_totals.iter())
        .enumerate()
        .map(|(index, (item, total))| invoice_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            invoice_id: Set(invoice_id),
            line_number: Set(index as i32 + 1),
            product_id: Set(item.product_id),
            description: Set(item.description.trim().to_string()),
            quantity: Set(item.quantity),
            unit_price: Set(item.unit_price),
            line_total: Set(*total),
            created_at: Set(now),
            created_by: Set(actor),
            updated_at: Set(now),
            updated_by: Set(actor),
            deleted_at: Set(None),
            deleted_by: Set(None),
            is_deleted: Set(false),
        })
        .collect()
}

fn check_dates(invoice_date: NaiveDate, due_date: Option<NaiveDate>) -> Result<(), ServiceError> {
    match due_date {
        Some(due) if due < invoice_date => Err(ServiceError::ValidationError(
            "Due date must not precede the invoice date".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Total must be positive and every line total must be storable as computed.
fn check_totals(totals: &InvoiceTotals) -> Result<(), ServiceError> {
    if totals.total <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Invoice total must be greater than zero".to_string(),
        ));
    }
    if let Some(position) = totals
        .line_totals
        .iter()
        .position(|line| !fits_money_scale(*line))
    {
        return Err(ServiceError::ValidationError(format!(
            "Line {} total must have at most {} decimal places",
            position + 1,
            MONEY_SCALE
        )));
    }
    Ok(())
}

fn invalid(code: &'static str, message: String) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

fn positive_quantity(quantity: &Decimal) -> Result<(), ValidationError> {
    if *quantity <= Decimal::ZERO {
        return Err(invalid("quantity", "Quantity must be greater than zero".into()));
    }
    if !fits_money_scale(*quantity) {
        return Err(invalid(
            "quantity",
            format!("Quantity must have at most {} decimal places", MONEY_SCALE),
        ));
    }
    Ok(())
}

fn non_negative_price(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(invalid("unit_price", "Unit price must not be negative".into()));
    }
    if !fits_money_scale(*price) {
        return Err(invalid(
            "unit_price",
            format!("Unit price must have at most {} decimal places", MONEY_SCALE),
        ));
    }
    Ok(())
}

fn non_negative_tax(tax: &Decimal) -> Result<(), ValidationError> {
    if *tax < Decimal::ZERO {
        return Err(invalid("tax", "Tax must not be negative".into()));
    }
    if !fits_money_scale(*tax) {
        return Err(invalid(
            "tax",
            format!("Tax must have at most {} decimal places", MONEY_SCALE),
        ));
    }
    Ok(())
}
