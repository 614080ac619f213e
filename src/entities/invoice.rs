use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Settlement state derived from paid amount versus invoice total
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
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "Unpaid")]
    Unpaid,
    #[sea_orm(string_value = "PartiallyPaid")]
    PartiallyPaid,
    #[sea_orm(string_value = "Paid")]
    Paid,
    #[sea_orm(string_value = "Overpaid")]
    Overpaid,
}

impl PaymentStatus {
    /// Total over every (paid, total) pair.
    pub fn derive(paid: Decimal, total: Decimal) -> Self {
        if paid <= Decimal::ZERO {
            PaymentStatus::Unpaid
        } else if paid < total {
            PaymentStatus::PartiallyPaid
        } else if paid == total {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Overpaid
        }
    }

    pub fn is_paid(self) -> bool {
        self == PaymentStatus::Paid
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "invoices")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
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
    pub is_paid: bool,
    pub payment_status: PaymentStatus,
    pub notes: Option<String>,
    /// Optimistic concurrency token, bumped on every write
    pub version: i32,
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
    #[sea_orm(has_many = "super::invoice_item::Entity")]
    InvoiceItems,
    #[sea_orm(has_many = "super::payment::Entity")]
    Payments,
}

impl Related<super::invoice_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InvoiceItems.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn balance_due(&self) -> Decimal {
        self.total - self.paid_amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(dec!(0), dec!(27.5), PaymentStatus::Unpaid)]
    #[case(dec!(10), dec!(27.5), PaymentStatus::PartiallyPaid)]
    #[case(dec!(27.5), dec!(27.5), PaymentStatus::Paid)]
    #[case(dec!(27.50), dec!(27.5), PaymentStatus::Paid)]
    #[case(dec!(30), dec!(27.5), PaymentStatus::Overpaid)]
    fn status_follows_paid_versus_total(
        #[case] paid: Decimal,
        #[case] total: Decimal,
        #[case] expected: PaymentStatus,
    ) {
        assert_eq!(PaymentStatus::derive(paid, total), expected);
    }

    #[test]
    fn only_paid_counts_as_paid() {
        assert!(PaymentStatus::Paid.is_paid());
        assert!(!PaymentStatus::Overpaid.is_paid());
        assert!(!PaymentStatus::PartiallyPaid.is_paid());
    }

    proptest! {
        #[test]
        fn derivation_is_consistent_with_ordering(paid_cents in 0i64..1_000_000, total_cents in 1i64..1_000_000) {
            let paid = Decimal::new(paid_cents, 2);
            let total = Decimal::new(total_cents, 2);
            let status = PaymentStatus::derive(paid, total);
            match status {
                PaymentStatus::Unpaid => prop_assert_eq!(paid, Decimal::ZERO),
                PaymentStatus::PartiallyPaid => prop_assert!(paid > Decimal::ZERO && paid < total),
                PaymentStatus::Paid => prop_assert_eq!(paid, total),
                PaymentStatus::Overpaid => prop_assert!(paid > total),
            }
            prop_assert_eq!(status.is_paid(), paid == total);
        }
    }
}
