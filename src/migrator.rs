use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260101_000001_create_categories_table::Migration),
            Box::new(m20260101_000002_create_invoices_table::Migration),
            Box::new(m20260101_000003_create_invoice_items_table::Migration),
            Box::new(m20260101_000004_create_payments_table::Migration),
            Box::new(m20260101_000005_create_transactions_table::Migration),
        ]
    }
}

/// Audit and soft-delete columns shared by every table.
#[derive(DeriveIden)]
enum Audit {
    CreatedAt,
    CreatedBy,
    UpdatedAt,
    UpdatedBy,
    DeletedAt,
    DeletedBy,
    IsDeleted,
}

fn with_audit_columns(table: &mut TableCreateStatement) -> &mut TableCreateStatement {
    table
        .col(
            ColumnDef::new(Audit::CreatedAt)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .col(ColumnDef::new(Audit::CreatedBy).uuid().null())
        .col(
            ColumnDef::new(Audit::UpdatedAt)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .col(ColumnDef::new(Audit::UpdatedBy).uuid().null())
        .col(
            ColumnDef::new(Audit::DeletedAt)
                .timestamp_with_time_zone()
                .null(),
        )
        .col(ColumnDef::new(Audit::DeletedBy).uuid().null())
        .col(
            ColumnDef::new(Audit::IsDeleted)
                .boolean()
                .not_null()
                .default(false),
        )
}

/// SQLite rejects decimal precision above 16
const MONEY_PRECISION: u32 = 16;

fn money(col: impl IntoIden) -> ColumnDef {
    ColumnDef::new(col)
        .decimal_len(MONEY_PRECISION, crate::entities::MONEY_SCALE)
        .not_null()
        .default(0)
        .to_owned()
}

mod m20260101_000001_create_categories_table {
    use super::with_audit_columns;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000001_create_categories_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let mut table = Table::create();
            table
                .table(Categories::Table)
                .if_not_exists()
                .col(
                    ColumnDef::new(Categories::Id)
                        .uuid()
                        .primary_key()
                        .not_null(),
                )
                .col(ColumnDef::new(Categories::Name).string_len(128).not_null())
                .col(
                    ColumnDef::new(Categories::NameKey)
                        .string_len(192)
                        .not_null(),
                )
                .col(ColumnDef::new(Categories::Description).text().null())
                .col(ColumnDef::new(Categories::Kind).string_len(16).not_null())
                .col(
                    ColumnDef::new(Categories::IsSystem)
                        .boolean()
                        .not_null()
                        .default(false),
                );
            manager
                .create_table(with_audit_columns(&mut table).to_owned())
                .await?;

            // Concurrent get-or-create relies on this to reject duplicates
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("ux_categories_name_key")
                        .table(Categories::Table)
                        .col(Categories::NameKey)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Categories::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Categories {
        Table,
        Id,
        Name,
        NameKey,
        Description,
        Kind,
        IsSystem,
    }
}

mod m20260101_000002_create_invoices_table {
    use super::{money, with_audit_columns};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000002_create_invoices_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let mut table = Table::create();
            table
                .table(Invoices::Table)
                .if_not_exists()
                .col(ColumnDef::new(Invoices::Id).uuid().primary_key().not_null())
                .col(ColumnDef::new(Invoices::Reference).string_len(64).not_null())
                .col(ColumnDef::new(Invoices::PoNumber).string_len(64).null())
                .col(ColumnDef::new(Invoices::InvoiceDate).date().not_null())
                .col(ColumnDef::new(Invoices::DueDate).date().null())
                .col(ColumnDef::new(Invoices::CustomerId).uuid().null())
                .col(ColumnDef::new(Invoices::BranchId).uuid().null())
                .col(ColumnDef::new(Invoices::PriceListId).uuid().null())
                .col(ColumnDef::new(Invoices::CompanyId).uuid().null())
                .col(money(Invoices::SubTotal))
                .col(money(Invoices::Tax))
                .col(money(Invoices::Total))
                .col(money(Invoices::PaidAmount))
                .col(
                    ColumnDef::new(Invoices::IsPaid)
                        .boolean()
                        .not_null()
                        .default(false),
                )
                .col(
                    ColumnDef::new(Invoices::PaymentStatus)
                        .string_len(32)
                        .not_null(),
                )
                .col(ColumnDef::new(Invoices::Notes).text().null())
                .col(
                    ColumnDef::new(Invoices::Version)
                        .integer()
                        .not_null()
                        .default(1),
                );
            manager
                .create_table(with_audit_columns(&mut table).to_owned())
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_invoices_reference")
                        .table(Invoices::Table)
                        .col(Invoices::Reference)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_invoices_payment_status")
                        .table(Invoices::Table)
                        .col(Invoices::PaymentStatus)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Invoices::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Invoices {
        Table,
        Id,
        Reference,
        PoNumber,
        InvoiceDate,
        DueDate,
        CustomerId,
        BranchId,
        PriceListId,
        CompanyId,
        SubTotal,
        Tax,
        Total,
        PaidAmount,
        IsPaid,
        PaymentStatus,
        Notes,
        Version,
    }
}

mod m20260101_000003_create_invoice_items_table {
    use super::m20260101_000002_create_invoices_table::Invoices;
    use super::{money, with_audit_columns};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000003_create_invoice_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let mut table = Table::create();
            table
                .table(InvoiceItems::Table)
                .if_not_exists()
                .col(
                    ColumnDef::new(InvoiceItems::Id)
                        .uuid()
                        .primary_key()
                        .not_null(),
                )
                .col(ColumnDef::new(InvoiceItems::InvoiceId).uuid().not_null())
                .col(ColumnDef::new(InvoiceItems::LineNumber).integer().not_null())
                .col(ColumnDef::new(InvoiceItems::ProductId).uuid().null())
                .col(
                    ColumnDef::new(InvoiceItems::Description)
                        .string_len(255)
                        .not_null(),
                )
                .col(money(InvoiceItems::Quantity))
                .col(money(InvoiceItems::UnitPrice))
                .col(money(InvoiceItems::LineTotal))
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_invoice_items_invoice_id")
                        .from(InvoiceItems::Table, InvoiceItems::InvoiceId)
                        .to(Invoices::Table, Invoices::Id)
                        .on_delete(ForeignKeyAction::Cascade)
                        .on_update(ForeignKeyAction::Cascade),
                );
            manager
                .create_table(with_audit_columns(&mut table).to_owned())
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_invoice_items_invoice_id")
                        .table(InvoiceItems::Table)
                        .col(InvoiceItems::InvoiceId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InvoiceItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum InvoiceItems {
        Table,
        Id,
        InvoiceId,
        LineNumber,
        ProductId,
        Description,
        Quantity,
        UnitPrice,
        LineTotal,
    }
}

mod m20260101_000004_create_payments_table {
    use super::m20260101_000002_create_invoices_table::Invoices;
    use super::{money, with_audit_columns};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000004_create_payments_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let mut table = Table::create();
            table
                .table(Payments::Table)
                .if_not_exists()
                .col(ColumnDef::new(Payments::Id).uuid().primary_key().not_null())
                .col(ColumnDef::new(Payments::InvoiceId).uuid().not_null())
                .col(money(Payments::Amount))
                .col(
                    ColumnDef::new(Payments::PaidAt)
                        .timestamp_with_time_zone()
                        .not_null(),
                )
                .col(ColumnDef::new(Payments::Method).string_len(32).not_null())
                .col(ColumnDef::new(Payments::Reference).string_len(128).null())
                .col(ColumnDef::new(Payments::Notes).text().null())
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_payments_invoice_id")
                        .from(Payments::Table, Payments::InvoiceId)
                        .to(Invoices::Table, Invoices::Id)
                        .on_delete(ForeignKeyAction::Cascade)
                        .on_update(ForeignKeyAction::Cascade),
                );
            manager
                .create_table(with_audit_columns(&mut table).to_owned())
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payments_invoice_id")
                        .table(Payments::Table)
                        .col(Payments::InvoiceId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Payments::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Payments {
        Table,
        Id,
        InvoiceId,
        Amount,
        PaidAt,
        Method,
        Reference,
        Notes,
    }
}

mod m20260101_000005_create_transactions_table {
    use super::m20260101_000001_create_categories_table::Categories;
    use super::{money, with_audit_columns};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000005_create_transactions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let mut table = Table::create();
            table
                .table(Transactions::Table)
                .if_not_exists()
                .col(
                    ColumnDef::new(Transactions::Id)
                        .uuid()
                        .primary_key()
                        .not_null(),
                )
                .col(
                    ColumnDef::new(Transactions::TransactionDate)
                        .timestamp_with_time_zone()
                        .not_null(),
                )
                .col(
                    ColumnDef::new(Transactions::TransactionType)
                        .string_len(16)
                        .not_null(),
                )
                .col(money(Transactions::Amount))
                .col(ColumnDef::new(Transactions::CategoryId).uuid().not_null())
                .col(
                    ColumnDef::new(Transactions::Description)
                        .string_len(255)
                        .not_null(),
                )
                .col(ColumnDef::new(Transactions::Reference).string_len(128).null())
                .col(
                    ColumnDef::new(Transactions::SourceType)
                        .string_len(16)
                        .not_null(),
                )
                .col(ColumnDef::new(Transactions::SourceId).uuid().null())
                .col(ColumnDef::new(Transactions::CompanyId).uuid().null())
                .foreign_key(
                    ForeignKey::create()
                        .name("fk_transactions_category_id")
                        .from(Transactions::Table, Transactions::CategoryId)
                        .to(Categories::Table, Categories::Id)
                        .on_delete(ForeignKeyAction::Restrict)
                        .on_update(ForeignKeyAction::Cascade),
                );
            manager
                .create_table(with_audit_columns(&mut table).to_owned())
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_transactions_source")
                        .table(Transactions::Table)
                        .col(Transactions::SourceType)
                        .col(Transactions::SourceId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_transactions_category_id")
                        .table(Transactions::Table)
                        .col(Transactions::CategoryId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Transactions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Transactions {
        Table,
        Id,
        TransactionDate,
        TransactionType,
        Amount,
        CategoryId,
        Description,
        Reference,
        SourceType,
        SourceId,
        CompanyId,
    }
}
