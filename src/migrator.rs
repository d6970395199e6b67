use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_products_table::Migration),
            Box::new(m20240101_000002_create_warehouses_table::Migration),
            Box::new(m20240101_000003_create_customers_table::Migration),
            Box::new(m20240101_000004_create_stock_allocations_table::Migration),
            Box::new(m20240101_000005_create_stock_batches_table::Migration),
            Box::new(m20240101_000006_create_stock_transfers_table::Migration),
            Box::new(m20240101_000007_create_orders_table::Migration),
            Box::new(m20240101_000008_create_order_lines_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240101_000001_create_products_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_products_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::BusinessType).string().null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(
                            ColumnDef::new(Products::BasePrice)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::BaseCost)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::DeliveryCharges)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Products::Stock)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Products::PriceTiers).json().not_null())
                        .col(ColumnDef::new(Products::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Products::UpdatedAt).timestamp().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_name")
                        .table(Products::Table)
                        .col(Products::Name)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Products {
        Table,
        Id,
        BusinessType,
        Name,
        BasePrice,
        BaseCost,
        DeliveryCharges,
        Stock,
        PriceTiers,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_warehouses_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_warehouses_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Warehouses::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Warehouses::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Warehouses::Name).string().not_null())
                        .col(ColumnDef::new(Warehouses::Location).string().null())
                        .col(ColumnDef::new(Warehouses::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Warehouses::UpdatedAt).timestamp().null())
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Warehouses::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Warehouses {
        Table,
        Id,
        Name,
        Location,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000003_create_customers_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_customers_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Customers::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Customers::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Customers::Name).string().null())
                        .col(ColumnDef::new(Customers::Phone).string().not_null())
                        .col(ColumnDef::new(Customers::Email).string().null())
                        .col(ColumnDef::new(Customers::Address).string().null())
                        .col(ColumnDef::new(Customers::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Customers::UpdatedAt).timestamp().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_customers_phone")
                        .table(Customers::Table)
                        .col(Customers::Phone)
                        .unique()
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Customers::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Customers {
        Table,
        Id,
        Name,
        Phone,
        Email,
        Address,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000004_create_stock_allocations_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_stock_allocations_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockAllocations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockAllocations::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockAllocations::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockAllocations::WarehouseId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockAllocations::PriceTierId)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(StockAllocations::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Lookup path for every ledger operation
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_allocations_key")
                        .table(StockAllocations::Table)
                        .col(StockAllocations::ProductId)
                        .col(StockAllocations::WarehouseId)
                        .col(StockAllocations::PriceTierId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_allocations_product")
                        .table(StockAllocations::Table)
                        .col(StockAllocations::ProductId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockAllocations::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum StockAllocations {
        Table,
        Id,
        ProductId,
        WarehouseId,
        PriceTierId,
        CreatedAt,
    }
}

mod m20240101_000005_create_stock_batches_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_stock_batches_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockBatches::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockBatches::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockBatches::AllocationId).uuid().not_null())
                        .col(ColumnDef::new(StockBatches::Quantity).integer().not_null())
                        .col(ColumnDef::new(StockBatches::CostPrice).decimal().not_null())
                        .col(ColumnDef::new(StockBatches::AddedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_batches_allocation")
                        .table(StockBatches::Table)
                        .col(StockBatches::AllocationId)
                        .to_owned(),
                )
                .await?;

            // FIFO scan order
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_batches_added_at")
                        .table(StockBatches::Table)
                        .col(StockBatches::AllocationId)
                        .col(StockBatches::AddedAt)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockBatches::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum StockBatches {
        Table,
        Id,
        AllocationId,
        Quantity,
        CostPrice,
        AddedAt,
    }
}

mod m20240101_000006_create_stock_transfers_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000006_create_stock_transfers_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockTransfers::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockTransfers::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockTransfers::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockTransfers::FromWarehouseId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransfers::ToWarehouseId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransfers::PriceTierId)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(StockTransfers::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockTransfers::Note).string().null())
                        .col(ColumnDef::new(StockTransfers::PerformedBy).string().null())
                        .col(
                            ColumnDef::new(StockTransfers::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_transfers_product")
                        .table(StockTransfers::Table)
                        .col(StockTransfers::ProductId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockTransfers::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum StockTransfers {
        Table,
        Id,
        ProductId,
        FromWarehouseId,
        ToWarehouseId,
        PriceTierId,
        Quantity,
        Note,
        PerformedBy,
        CreatedAt,
    }
}

mod m20240101_000007_create_orders_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000007_create_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::OrderNumber).string().not_null())
                        .col(ColumnDef::new(Orders::CustomerId).uuid().null())
                        .col(ColumnDef::new(Orders::Status).string().not_null())
                        .col(ColumnDef::new(Orders::PaymentStatus).string().not_null())
                        .col(
                            ColumnDef::new(Orders::TaxPercent)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::OrderDiscount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::DeliveryCharge)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::DeliveryPaidByCustomer)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Orders::PartialPaidAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::SellingPrice).decimal().null())
                        .col(ColumnDef::new(Orders::CostPrice).decimal().null())
                        .col(ColumnDef::new(Orders::Quantity).integer().null())
                        .col(
                            ColumnDef::new(Orders::FinalAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::Profit)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::PartialRemainingAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::Notes).string().null())
                        .col(ColumnDef::new(Orders::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Orders::UpdatedAt).timestamp().null())
                        .to_owned(),
                )
                .await?;

            // Sole backstop for concurrent order-number generation
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_order_number")
                        .table(Orders::Table)
                        .col(Orders::OrderNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_customer_id")
                        .table(Orders::Table)
                        .col(Orders::CustomerId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_status")
                        .table(Orders::Table)
                        .col(Orders::Status)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Orders {
        Table,
        Id,
        OrderNumber,
        CustomerId,
        Status,
        PaymentStatus,
        TaxPercent,
        OrderDiscount,
        DeliveryCharge,
        DeliveryPaidByCustomer,
        PartialPaidAmount,
        SellingPrice,
        CostPrice,
        Quantity,
        FinalAmount,
        Profit,
        PartialRemainingAmount,
        Notes,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000008_create_order_lines_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000008_create_order_lines_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(OrderLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderLines::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderLines::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderLines::ProductId).uuid().null())
                        .col(ColumnDef::new(OrderLines::ProductName).string().not_null())
                        .col(
                            ColumnDef::new(OrderLines::SellingPrice)
                                .decimal()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderLines::CostPrice).decimal().not_null())
                        .col(ColumnDef::new(OrderLines::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(OrderLines::Discount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_lines_order_id")
                        .table(OrderLines::Table)
                        .col(OrderLines::OrderId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderLines::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum OrderLines {
        Table,
        Id,
        OrderId,
        ProductId,
        ProductName,
        SellingPrice,
        CostPrice,
        Quantity,
        Discount,
    }
}
