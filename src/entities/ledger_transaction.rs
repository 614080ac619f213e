use super::category::CategoryKind;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Ledger transaction direction
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
pub enum TransactionType {
    #[sea_orm(string_value = "Debit")]
    Debit,
    #[sea_orm(string_value = "Credit")]
    Credit,
}

impl TransactionType {
    /// Category kind given to a category first created by a posting of this type.
    pub fn category_kind(self) -> CategoryKind {
        match self {
            TransactionType::Credit => CategoryKind::Income,
            TransactionType::Debit => CategoryKind::Expense,
        }
    }
}

/// Kind of document a transaction was derived from
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
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum SourceType {
    #[sea_orm(string_value = "Invoice")]
    Invoice,
    /// Goods-received note
    #[sea_orm(string_value = "GRN")]
    #[serde(rename = "GRN")]
    #[strum(serialize = "GRN")]
    Grn,
    #[sea_orm(string_value = "Manual")]
    Manual,
}

/// Immutable ledger record; never updated after insert.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub transaction_date: DateTime<Utc>,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub category_id: Uuid,
    pub description: String,
    pub reference: Option<String>,
    pub source_type: SourceType,
    pub source_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
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
    #[sea_orm(
        belongs_to = "super::category::Entity",
        from = "Column::CategoryId",
        to = "super::category::Column::Id"
    )]
    Category,
}

impl Related<super::category::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Category.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_credit(&self) -> bool {
        self.transaction_type == TransactionType::Credit
    }

    /// Positive for credits, negative for debits
    pub fn signed_amount(&self) -> Decimal {
        match self.transaction_type {
            TransactionType::Credit => self.amount,
            TransactionType::Debit => -self.amount,
        }
    }
}
