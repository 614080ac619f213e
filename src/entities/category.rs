use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Whether a ledger category collects income or expense postings
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum CategoryKind {
    #[sea_orm(string_value = "Income")]
    Income,
    #[sea_orm(string_value = "Expense")]
    Expense,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "categories")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    /// Lowercased, trimmed name; unique among live categories
    pub name_key: String,
    pub description: Option<String>,
    pub kind: CategoryKind,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<Uuid>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
    pub is_deleted: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::ledger_transaction::Entity")]
    Transactions,
}

impl Related<super::ledger_transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Normalized lookup key used for case-insensitive name matching.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Key written to a soft-deleted row so the name can be reused.
pub fn retired_name_key(key: &str, id: Uuid) -> String {
    format!("{}#{}", key, id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_key_ignores_case_and_padding() {
        assert_eq!(name_key("  Invoice "), "invoice");
        assert_eq!(name_key("INVOICE"), name_key("invoice"));
    }

    #[test]
    fn retired_key_never_collides_with_live_key() {
        let id = Uuid::new_v4();
        assert_ne!(retired_name_key("invoice", id), "invoice");
    }
}
