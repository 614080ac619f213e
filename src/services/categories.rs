use crate::{
    db::{with_store_timeout, DbPool},
    entities::category::{self, name_key, retired_name_key, CategoryKind},
    entities::{Audited, Lifecycle},
    errors::ServiceError,
    repositories::{CategoryRepository, Page},
    services::{SharedClock, UnitOfWorkSettings},
};
use dashmap::DashMap;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Ledger category every invoice payment is credited to
pub const INVOICE_CATEGORY: &str = "Invoice";

/// Whether `name` refers to the reserved invoice category
pub fn is_invoice_category(name: &str) -> bool {
    name_key(name) == name_key(INVOICE_CATEGORY)
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateCategoryRequest {
    #[validate(length(min = 1, max = 128, message = "Category name must be 1-128 characters"))]
    pub name: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    pub kind: CategoryKind,
    #[serde(default)]
    pub is_system: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CategoryResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub kind: CategoryKind,
    pub is_system: bool,
    #[serde(flatten)]
    pub lifecycle: Lifecycle,
}

impl From<category::Model> for CategoryResponse {
    fn from(model: category::Model) -> Self {
        let lifecycle = model.lifecycle();
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            kind: model.kind,
            is_system: model.is_system,
            lifecycle,
        }
    }
}

/// Resolves free-text category names to canonical ledger categories.
pub struct CategoryService {
    db: Arc<DbPool>,
    clock: SharedClock,
    settings: UnitOfWorkSettings,
    /// Serializes first use of a name within this process
    name_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl CategoryService {
    pub fn new(db: Arc<DbPool>, clock: SharedClock, settings: UnitOfWorkSettings) -> Self {
        Self {
            db,
            clock,
            settings,
            name_locks: DashMap::new(),
        }
    }

    /// Returns the live category matching `name` case-insensitively, creating it
    /// with the given attributes when absent. An existing match is never modified.
    #[instrument(skip(self, description), fields(category = %name))]
    pub async fn get_or_create(
        &self,
        name: &str,
        description: Option<String>,
        is_system: bool,
        kind: CategoryKind,
        actor: Option<Uuid>,
    ) -> Result<category::Model, ServiceError> {
        let key = validated_key(name)?;
        with_store_timeout(self.settings.store_timeout, "get_or_create_category", async {
            let repo = CategoryRepository::new(&*self.db);
            if let Some(existing) = repo.find_by_key(&key).await? {
                return Ok(existing);
            }

            let lock = self
                .name_locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();
            let _guard = lock.lock().await;

            // Another task may have created it while we waited
            if let Some(existing) = repo.find_by_key(&key).await? {
                return Ok(existing);
            }

            match repo
                .insert(self.new_model(name, key.clone(), description, kind, is_system, actor))
                .await
            {
                Ok(created) => {
                    info!(category_id = %created.id, kind = %created.kind, "category created");
                    Ok(created)
                }
                Err(err) if err.is_unique_violation() => {
                    // Lost the race to another process; the winner's row is canonical
                    warn!("category insert collided, re-reading");
                    repo.find_by_key(&key).await?.ok_or_else(|| {
                        ServiceError::Conflict(format!("Category '{}' is being modified", name))
                    })
                }
                Err(err) => Err(err),
            }
        })
        .await
    }

    /// Explicit creation; an existing live name is a conflict.
    #[instrument(skip(self, request), fields(category = %request.name))]
    pub async fn create(
        &self,
        request: CreateCategoryRequest,
        actor: Option<Uuid>,
    ) -> Result<CategoryResponse, ServiceError> {
        request.validate()?;
        let key = validated_key(&request.name)?;
        if is_invoice_category(&request.name) {
            return Err(ServiceError::ValidationError(format!(
                "Category '{}' is reserved for invoice payments",
                INVOICE_CATEGORY
            )));
        }
        with_store_timeout(self.settings.store_timeout, "create_category", async {
            let repo = CategoryRepository::new(&*self.db);
            if repo.find_by_key(&key).await?.is_some() {
                return Err(ServiceError::Conflict(format!(
                    "Category '{}' already exists",
                    request.name.trim()
                )));
            }
            let model = self.new_model(
                &request.name,
                key,
                request.description.clone(),
                request.kind,
                request.is_system,
                actor,
            );
            match repo.insert(model).await {
                Ok(created) => Ok(created.into()),
                Err(err) if err.is_unique_violation() => Err(ServiceError::Conflict(format!(
                    "Category '{}' already exists",
                    request.name.trim()
                ))),
                Err(err) => Err(err),
            }
        })
        .await
    }

    pub async fn get(&self, id: Uuid) -> Result<CategoryResponse, ServiceError> {
        CategoryRepository::new(&*self.db)
            .find_active(id)
            .await?
            .map(Into::into)
            .ok_or_else(|| ServiceError::NotFound(format!("Category {} not found", id)))
    }

    /// Live category by name, case-insensitive
    pub async fn find_by_name(&self, name: &str) -> Result<Option<category::Model>, ServiceError> {
        CategoryRepository::new(&*self.db)
            .find_by_key(&name_key(name))
            .await
    }

    pub async fn list(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<Page<CategoryResponse>, ServiceError> {
        Ok(CategoryRepository::new(&*self.db)
            .list(page, per_page)
            .await?
            .map(Into::into))
    }

    /// Soft-deletes a category. System categories are protected.
    #[instrument(skip(self), fields(category_id = %id))]
    pub async fn delete(&self, id: Uuid, actor: Option<Uuid>) -> Result<(), ServiceError> {
        with_store_timeout(self.settings.store_timeout, "delete_category", async {
            let repo = CategoryRepository::new(&*self.db);
            let existing = repo
                .find_active(id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Category {} not found", id)))?;

            if existing.is_system {
                return Err(ServiceError::Conflict(format!(
                    "Category '{}' is a system category and cannot be deleted",
                    existing.name
                )));
            }

            let deleted = repo
                .soft_delete(
                    id,
                    retired_name_key(&existing.name_key, id),
                    self.clock.now(),
                    actor,
                )
                .await?;
            if !deleted {
                return Err(ServiceError::NotFound(format!("Category {} not found", id)));
            }
            info!("category deleted");
            Ok(())
        })
        .await
    }

    fn new_model(
        &self,
        name: &str,
        key: String,
        description: Option<String>,
        kind: CategoryKind,
        is_system: bool,
        actor: Option<Uuid>,
    ) -> category::ActiveModel {
        let now = self.clock.now();
        category::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.trim().to_string()),
            name_key: Set(key),
            description: Set(description),
            kind: Set(kind),
            is_system: Set(is_system),
            created_at: Set(now),
            created_by: Set(actor),
            updated_at: Set(now),
            updated_by: Set(actor),
            deleted_at: Set(None),
            deleted_by: Set(None),
            is_deleted: Set(false),
        }
    }
}

fn validated_key(name: &str) -> Result<String, ServiceError> {
    let key = name_key(name);
    if key.is_empty() {
        return Err(ServiceError::ValidationError(
            "Category name must not be blank".to_string(),
        ));
    }
    if key.chars().count() > 128 {
        return Err(ServiceError::ValidationError(
            "Category name must be at most 128 characters".to_string(),
        ));
    }
    Ok(key)
}
