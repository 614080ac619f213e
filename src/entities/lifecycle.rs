use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Audit trail and soft-delete state carried by every persisted row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Lifecycle {
    pub created_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_by: Option<Uuid>,
    pub is_deleted: bool,
}

impl Lifecycle {
    /// State of a row that was just inserted.
    pub fn created(at: DateTime<Utc>, by: Option<Uuid>) -> Self {
        Self {
            created_at: at,
            created_by: by,
            updated_at: at,
            updated_by: by,
            deleted_at: None,
            deleted_by: None,
            is_deleted: false,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.is_deleted
    }
}

/// Implemented by every entity model so DTOs can expose one audit shape.
pub trait Audited {
    fn lifecycle(&self) -> Lifecycle;

    fn is_active(&self) -> bool {
        self.lifecycle().is_active()
    }
}

/// Implements [`Audited`] for entity models that carry the standard audit columns.
macro_rules! impl_audited {
    ($($model:path),+ $(,)?) => {
        $(
            impl $crate::entities::lifecycle::Audited for $model {
                fn lifecycle(&self) -> $crate::entities::lifecycle::Lifecycle {
                    $crate::entities::lifecycle::Lifecycle {
                        created_at: self.created_at,
                        created_by: self.created_by,
                        updated_at: self.updated_at,
                        updated_by: self.updated_by,
                        deleted_at: self.deleted_at,
                        deleted_by: self.deleted_by,
                        is_deleted: self.is_deleted,
                    }
                }
            }
        )+
    };
}

impl_audited!(
    super::category::Model,
    super::invoice::Model,
    super::invoice_item::Model,
    super::payment::Model,
    super::ledger_transaction::Model,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freshly_created_rows_are_active() {
        let now = Utc::now();
        let user = Some(Uuid::new_v4());
        let lifecycle = Lifecycle::created(now, user);
        assert!(lifecycle.is_active());
        assert_eq!(lifecycle.created_at, lifecycle.updated_at);
        assert_eq!(lifecycle.created_by, user);
        assert!(lifecycle.deleted_at.is_none());
    }
}
