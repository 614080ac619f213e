use crate::{
    db::{with_store_timeout, DbPool},
    entities::category::{self, CategoryKind},
    entities::ledger_transaction::{self, SourceType, TransactionType},
    entities::{Audited, Lifecycle},
    errors::ServiceError,
    events::{Event, EventSender},
    repositories::{CategoryRepository, LedgerRepository, Page},
    services::{
        categories::{is_invoice_category, CategoryService, INVOICE_CATEGORY},
        ensure_money_scale, SharedClock, UnitOfWorkSettings,
    },
};
use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{ConnectionTrait, Set};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// A posting tied to a source document
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct PostTransactionRequest {
    pub source_type: SourceType,
    pub source_id: Option<Uuid>,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    #[validate(length(min = 1, max = 128, message = "Category name must be 1-128 characters"))]
    pub category_name: String,
    #[validate(length(min = 1, max = 255, message = "Description must be 1-255 characters"))]
    pub description: String,
    #[validate(length(max = 128))]
    pub reference: Option<String>,
    pub company_id: Option<Uuid>,
    /// Defaults to now
    pub transaction_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    pub id: Uuid,
    pub transaction_date: DateTime<Utc>,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub category_id: Uuid,
    pub category_name: String,
    pub description: String,
    pub reference: Option<String>,
    pub source_type: SourceType,
    pub source_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
    #[serde(flatten)]
    pub lifecycle: Lifecycle,
}

impl TransactionResponse {
    fn from_model(model: ledger_transaction::Model, category_name: String) -> Self {
        let lifecycle = model.lifecycle();
        Self {
            id: model.id,
            transaction_date: model.transaction_date,
            transaction_type: model.transaction_type,
            amount: model.amount,
            category_id: model.category_id,
            category_name,
            description: model.description,
            reference: model.reference,
            source_type: model.source_type,
            source_id: model.source_id,
            company_id: model.company_id,
            lifecycle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CategoryTotals {
    pub category_id: Uuid,
    pub category_name: String,
    pub kind: Option<CategoryKind>,
    pub total_debits: Decimal,
    pub total_credits: Decimal,
    pub net: Decimal,
    pub transaction_count: u64,
}

/// Aggregate over every live transaction; `net = total_credits - total_debits`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LedgerSummary {
    pub total_debits: Decimal,
    pub total_credits: Decimal,
    pub net: Decimal,
    pub transaction_count: u64,
    pub by_category: Vec<CategoryTotals>,
}

/// One posting ready to be written inside a caller's unit of work
#[derive(Debug, Clone)]
pub struct Posting {
    pub source_type: SourceType,
    pub source_id: Option<Uuid>,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub description: String,
    pub reference: Option<String>,
    pub company_id: Option<Uuid>,
    pub transaction_date: DateTime<Utc>,
}

/// Appends immutable ledger transactions and answers ledger queries.
pub struct LedgerService {
    db: Arc<DbPool>,
    categories: Arc<CategoryService>,
    clock: SharedClock,
    event_sender: Option<Arc<EventSender>>,
    settings: UnitOfWorkSettings,
}

impl LedgerService {
    pub fn new(
        db: Arc<DbPool>,
        categories: Arc<CategoryService>,
        clock: SharedClock,
        event_sender: Option<Arc<EventSender>>,
        settings: UnitOfWorkSettings,
    ) -> Self {
        Self {
            db,
            categories,
            clock,
            event_sender,
            settings,
        }
    }

    /// Resolves (creating on demand) the category a posting of `transaction_type` lands in.
    pub async fn resolve_category(
        &self,
        name: &str,
        transaction_type: TransactionType,
        is_system: bool,
        actor: Option<Uuid>,
    ) -> Result<category::Model, ServiceError> {
        self.categories
            .get_or_create(
                name,
                None,
                is_system,
                transaction_type.category_kind(),
                actor,
            )
            .await
    }

    /// Posts one manual or GRN transaction. No deduplication happens here.
    /// Invoice postings only come from recorded payments, through `post_within`.
    #[instrument(skip(self, request), fields(source_type = %request.source_type, source_id = ?request.source_id, amount = %request.amount))]
    pub async fn create_from_source(
        &self,
        request: PostTransactionRequest,
        actor: Option<Uuid>,
    ) -> Result<TransactionResponse, ServiceError> {
        if request.source_type == SourceType::Invoice {
            return Err(ServiceError::ValidationError(
                "Invoice postings are created by recording a payment".to_string(),
            ));
        }
        ensure_positive(request.amount)?;
        ensure_money_scale("Transaction amount", request.amount)?;
        request.validate()?;

        // The invoice category is reserved: always an income system category
        let category = if is_invoice_category(&request.category_name) {
            self.resolve_category(INVOICE_CATEGORY, TransactionType::Credit, true, actor)
                .await?
        } else {
            self.resolve_category(
                &request.category_name,
                request.transaction_type,
                false,
                actor,
            )
            .await?
        };

        let posting = Posting {
            source_type: request.source_type,
            source_id: request.source_id,
            transaction_type: request.transaction_type,
            amount: request.amount,
            description: request.description.trim().to_string(),
            reference: request.reference,
            company_id: request.company_id,
            transaction_date: request.transaction_date.unwrap_or_else(|| self.clock.now()),
        };

        let model = with_store_timeout(
            self.settings.store_timeout,
            "post_transaction",
            self.post_within(&*self.db, &category, posting, actor),
        )
        .await?;

        self.announce(&model).await;
        Ok(TransactionResponse::from_model(model, category.name))
    }

    /// Writes a posting on `conn`, which may be an open transaction owned by the caller.
    pub async fn post_within<C: ConnectionTrait>(
        &self,
        conn: &C,
        category: &category::Model,
        posting: Posting,
        actor: Option<Uuid>,
    ) -> Result<ledger_transaction::Model, ServiceError> {
        ensure_positive(posting.amount)?;
        ensure_money_scale("Transaction amount", posting.amount)?;
        let now = self.clock.now();
        let model = ledger_transaction::ActiveModel {
            id: Set(Uuid::new_v4()),
            transaction_date: Set(posting.transaction_date),
            transaction_type: Set(posting.transaction_type),
            amount: Set(posting.amount),
            category_id: Set(category.id),
            description: Set(posting.description),
            reference: Set(posting.reference),
            source_type: Set(posting.source_type),
            source_id: Set(posting.source_id),
            company_id: Set(posting.company_id),
            created_at: Set(now),
            created_by: Set(actor),
            updated_at: Set(now),
            updated_by: Set(actor),
            deleted_at: Set(None),
            deleted_by: Set(None),
            is_deleted: Set(false),
        };
        let created = LedgerRepository::new(conn).insert(model).await?;
        counter!("invoice_ledger_transactions.posted", 1);
        info!(
            transaction_id = %created.id,
            transaction_type = %created.transaction_type,
            amount = %created.amount,
            "transaction posted"
        );
        Ok(created)
    }

    /// Emits `TransactionPosted` for a committed row.
    pub async fn announce(&self, model: &ledger_transaction::Model) {
        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::TransactionPosted {
                    transaction_id: model.id,
                    transaction_type: model.transaction_type,
                    source_type: model.source_type,
                    source_id: model.source_id,
                    amount: model.amount,
                })
                .await;
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<TransactionResponse, ServiceError> {
        let model = LedgerRepository::new(&*self.db)
            .find_active(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Transaction {} not found", id)))?;
        let mut responses = self.with_category_names(vec![model]).await?;
        responses
            .pop()
            .ok_or_else(|| ServiceError::InternalError("transaction lookup lost its row".into()))
    }

    pub async fn list(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<Page<TransactionResponse>, ServiceError> {
        let page = LedgerRepository::new(&*self.db).list(page, per_page).await?;
        let items = self.with_category_names(page.items).await?;
        Ok(Page {
            items,
            total: page.total,
        })
    }

    /// Postings for one source document, oldest first
    pub async fn by_source(
        &self,
        source_type: SourceType,
        source_id: Option<Uuid>,
    ) -> Result<Vec<TransactionResponse>, ServiceError> {
        let models = LedgerRepository::new(&*self.db)
            .by_source(source_type, source_id)
            .await?;
        self.with_category_names(models).await
    }

    /// Postings in the live category named `name`; an unknown name yields nothing.
    pub async fn by_category(&self, name: &str) -> Result<Vec<TransactionResponse>, ServiceError> {
        let Some(category) = self.categories.find_by_name(name).await? else {
            return Ok(Vec::new());
        };
        let models = LedgerRepository::new(&*self.db)
            .by_category(category.id)
            .await?;
        Ok(models
            .into_iter()
            .map(|m| TransactionResponse::from_model(m, category.name.clone()))
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn summary(&self) -> Result<LedgerSummary, ServiceError> {
        let mut tallies: HashMap<Uuid, Tally> = HashMap::new();
        LedgerRepository::new(&*self.db)
            .fold_active(|model| tallies.entry(model.category_id).or_default().add(model))
            .await?;

        let categories: HashMap<Uuid, category::Model> = CategoryRepository::new(&*self.db)
            .find_any(tallies.keys().copied().collect())
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();
        Ok(summarize(tallies, &categories))
    }

    async fn with_category_names(
        &self,
        models: Vec<ledger_transaction::Model>,
    ) -> Result<Vec<TransactionResponse>, ServiceError> {
        let ids = unique_category_ids(&models);
        let names: HashMap<Uuid, String> = CategoryRepository::new(&*self.db)
            .find_any(ids)
            .await?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect();
        Ok(models
            .into_iter()
            .map(|m| {
                let name = names.get(&m.category_id).cloned().unwrap_or_default();
                TransactionResponse::from_model(m, name)
            })
            .collect())
    }
}

fn ensure_positive(amount: Decimal) -> Result<(), ServiceError> {
    if amount <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Transaction amount must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn unique_category_ids(models: &[ledger_transaction::Model]) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = models.iter().map(|m| m.category_id).collect();
    ids.sort();
    ids.dedup();
    ids
}

/// Running totals for one category
#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    debits: Decimal,
    credits: Decimal,
    net: Decimal,
    count: u64,
}

impl Tally {
    fn add(&mut self, model: &ledger_transaction::Model) {
        match model.transaction_type {
            TransactionType::Debit => self.debits += model.amount,
            TransactionType::Credit => self.credits += model.amount,
        }
        self.net += model.signed_amount();
        self.count += 1;
    }
}

/// Groups by category, ordered by category name.
fn summarize(
    tallies: HashMap<Uuid, Tally>,
    categories: &HashMap<Uuid, category::Model>,
) -> LedgerSummary {
    let mut groups: BTreeMap<(String, Uuid), CategoryTotals> = BTreeMap::new();
    let mut total = Tally::default();

    for (category_id, tally) in tallies {
        let category = categories.get(&category_id);
        let name = category.map(|c| c.name.clone()).unwrap_or_default();
        total.debits += tally.debits;
        total.credits += tally.credits;
        total.count += tally.count;
        groups.insert(
            (name.to_lowercase(), category_id),
            CategoryTotals {
                category_id,
                category_name: name,
                kind: category.map(|c| c.kind),
                total_debits: tally.debits,
                total_credits: tally.credits,
                net: tally.net,
                transaction_count: tally.count,
            },
        );
    }

    LedgerSummary {
        total_debits: total.debits,
        total_credits: total.credits,
        net: total.credits - total.debits,
        transaction_count: total.count,
        by_category: groups.into_values().collect(),
    }
}
