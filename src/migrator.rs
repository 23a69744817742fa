use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_reference_tables::Migration),
            Box::new(m20240301_000002_create_users_and_orders::Migration),
            Box::new(m20240301_000003_create_time_entries::Migration),
            Box::new(m20240301_000004_seed_none_stage::Migration),
        ]
    }
}

mod m20240301_000001_create_reference_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_reference_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Areas::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Areas::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Areas::Name)
                                .string_len(100)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Areas::Description).string().null())
                        .col(
                            ColumnDef::new(Areas::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Areas::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Sectors::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Sectors::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Sectors::Name).string_len(100).not_null())
                        .col(ColumnDef::new(Sectors::AreaId).uuid().not_null())
                        .col(ColumnDef::new(Sectors::Description).string().null())
                        .col(
                            ColumnDef::new(Sectors::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Sectors::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_sectors_area_id")
                                .from(Sectors::Table, Sectors::AreaId)
                                .to(Areas::Table, Areas::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            // Sector names repeat across areas but not within one
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_sectors_area_name")
                        .table(Sectors::Table)
                        .col(Sectors::AreaId)
                        .col(Sectors::Name)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Machines::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Machines::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Machines::Code)
                                .string_len(50)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Machines::Name).string_len(100).not_null())
                        .col(ColumnDef::new(Machines::Description).string().null())
                        .col(
                            ColumnDef::new(Machines::Status)
                                .string()
                                .not_null()
                                .default("AVAILABLE"),
                        )
                        .col(
                            ColumnDef::new(Machines::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Machines::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Machines::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(MachineSectors::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(MachineSectors::MachineId).uuid().not_null())
                        .col(ColumnDef::new(MachineSectors::SectorId).uuid().not_null())
                        .primary_key(
                            Index::create()
                                .col(MachineSectors::MachineId)
                                .col(MachineSectors::SectorId),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_machine_sectors_machine_id")
                                .from(MachineSectors::Table, MachineSectors::MachineId)
                                .to(Machines::Table, Machines::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_machine_sectors_sector_id")
                                .from(MachineSectors::Table, MachineSectors::SectorId)
                                .to(Sectors::Table, Sectors::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Stages::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Stages::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Stages::Code)
                                .string_len(20)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Stages::Name).string_len(100).not_null())
                        .col(
                            ColumnDef::new(Stages::Sequence)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Stages::Color).string_len(7).not_null())
                        .col(
                            ColumnDef::new(Stages::ShowOnBoard)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Stages::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Stages::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(reason_table(StoppageReasons::Table))
                .await?;
            manager
                .create_table(reason_table(CancellationReasons::Table))
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Products::Code)
                                .string_len(50)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Products::Description).string().not_null())
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(CancellationReasons::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(StoppageReasons::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Stages::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(MachineSectors::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Machines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Sectors::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Areas::Table).to_owned())
                .await
        }
    }

    /// Stoppage and cancellation reasons share one shape.
    fn reason_table<T: IntoIden + 'static>(table: T) -> TableCreateStatement {
        Table::create()
            .table(table)
            .if_not_exists()
            .col(ColumnDef::new(Reason::Id).uuid().primary_key().not_null())
            .col(
                ColumnDef::new(Reason::Code)
                    .string_len(20)
                    .not_null()
                    .unique_key(),
            )
            .col(ColumnDef::new(Reason::Description).string().not_null())
            .col(
                ColumnDef::new(Reason::Active)
                    .boolean()
                    .not_null()
                    .default(true),
            )
            .col(
                ColumnDef::new(Reason::CreatedAt)
                    .timestamp_with_time_zone()
                    .not_null(),
            )
            .col(
                ColumnDef::new(Reason::UpdatedAt)
                    .timestamp_with_time_zone()
                    .not_null(),
            )
            .to_owned()
    }

    #[derive(DeriveIden)]
    enum Areas {
        Table,
        Id,
        Name,
        Description,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Sectors {
        Table,
        Id,
        Name,
        AreaId,
        Description,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum Machines {
        Table,
        Id,
        Code,
        Name,
        Description,
        Status,
        Active,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum MachineSectors {
        Table,
        MachineId,
        SectorId,
    }

    #[derive(DeriveIden)]
    pub(super) enum Stages {
        Table,
        Id,
        Code,
        Name,
        Sequence,
        Color,
        ShowOnBoard,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum StoppageReasons {
        Table,
    }

    #[derive(DeriveIden)]
    pub(super) enum CancellationReasons {
        Table,
    }

    /// Columns shared by both reason tables.
    #[derive(DeriveIden)]
    pub(super) enum Reason {
        Id,
        Code,
        Description,
        Active,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum Products {
        Table,
        Id,
        Code,
        Description,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000002_create_users_and_orders {
    use super::m20240301_000001_create_reference_tables::{
        CancellationReasons, Machines, Products, Reason, Stages,
    };
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_users_and_orders"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Users::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Users::Matricula)
                                .string_len(30)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Users::Name).string_len(100).not_null())
                        .col(
                            ColumnDef::new(Users::Role)
                                .string()
                                .not_null()
                                .default("OPERATOR"),
                        )
                        .col(ColumnDef::new(Users::PasswordHash).string().null())
                        .col(
                            ColumnDef::new(Users::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Users::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Users::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ProductionOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductionOrders::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductionOrders::Number)
                                .big_integer()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(ProductionOrders::ProductId).uuid().null())
                        .col(ColumnDef::new(ProductionOrders::ProductCode).string().null())
                        .col(ColumnDef::new(ProductionOrders::Description).string().null())
                        .col(
                            ColumnDef::new(ProductionOrders::Status)
                                .string()
                                .not_null()
                                .default("OPEN"),
                        )
                        .col(ColumnDef::new(ProductionOrders::StageId).uuid().null())
                        .col(ColumnDef::new(ProductionOrders::MachineId).uuid().null())
                        .col(
                            ColumnDef::new(ProductionOrders::QuantityProgrammed)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ProductionOrders::QuantityLoaded)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ProductionOrders::QuantityProduced)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ProductionOrders::CancellationReasonId)
                                .uuid()
                                .null(),
                        )
                        .col(ColumnDef::new(ProductionOrders::Source).string().not_null())
                        .col(
                            ColumnDef::new(ProductionOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductionOrders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_production_orders_product_id")
                                .from(ProductionOrders::Table, ProductionOrders::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_production_orders_stage_id")
                                .from(ProductionOrders::Table, ProductionOrders::StageId)
                                .to(Stages::Table, Stages::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_production_orders_machine_id")
                                .from(ProductionOrders::Table, ProductionOrders::MachineId)
                                .to(Machines::Table, Machines::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_production_orders_cancellation_reason_id")
                                .from(
                                    ProductionOrders::Table,
                                    ProductionOrders::CancellationReasonId,
                                )
                                .to(CancellationReasons::Table, Reason::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_production_orders_status")
                        .table(ProductionOrders::Table)
                        .col(ProductionOrders::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ProductionOrders::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Users::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Users {
        Table,
        Id,
        Matricula,
        Name,
        Role,
        PasswordHash,
        Active,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum ProductionOrders {
        Table,
        Id,
        Number,
        ProductId,
        ProductCode,
        Description,
        Status,
        StageId,
        MachineId,
        QuantityProgrammed,
        QuantityLoaded,
        QuantityProduced,
        CancellationReasonId,
        Source,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000003_create_time_entries {
    use super::m20240301_000001_create_reference_tables::{
        Machines, Reason, Stages, StoppageReasons,
    };
    use super::m20240301_000002_create_users_and_orders::{ProductionOrders, Users};
    use sea_orm_migration::prelude::*;
    use sea_orm_migration::sea_orm::ConnectionTrait;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_time_entries"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(TimeEntries::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(TimeEntries::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(TimeEntries::Kind).string().not_null())
                        .col(ColumnDef::new(TimeEntries::Status).string().not_null())
                        .col(ColumnDef::new(TimeEntries::MachineId).uuid().not_null())
                        .col(ColumnDef::new(TimeEntries::OperatorId).uuid().null())
                        .col(ColumnDef::new(TimeEntries::OrderId).uuid().null())
                        .col(ColumnDef::new(TimeEntries::StageId).uuid().null())
                        .col(ColumnDef::new(TimeEntries::StoppageReasonId).uuid().null())
                        .col(ColumnDef::new(TimeEntries::ProductionEntryId).uuid().null())
                        .col(ColumnDef::new(TimeEntries::QuantityProduced).integer().null())
                        .col(ColumnDef::new(TimeEntries::Notes).text().null())
                        .col(
                            ColumnDef::new(TimeEntries::StartedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TimeEntries::EndedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(TimeEntries::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TimeEntries::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_time_entries_machine_id")
                                .from(TimeEntries::Table, TimeEntries::MachineId)
                                .to(Machines::Table, Machines::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_time_entries_operator_id")
                                .from(TimeEntries::Table, TimeEntries::OperatorId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_time_entries_order_id")
                                .from(TimeEntries::Table, TimeEntries::OrderId)
                                .to(ProductionOrders::Table, ProductionOrders::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_time_entries_stage_id")
                                .from(TimeEntries::Table, TimeEntries::StageId)
                                .to(Stages::Table, Stages::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_time_entries_stoppage_reason_id")
                                .from(TimeEntries::Table, TimeEntries::StoppageReasonId)
                                .to(StoppageReasons::Table, Reason::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_time_entries_production_entry_id")
                                .from(TimeEntries::Table, TimeEntries::ProductionEntryId)
                                .to(TimeEntries::Table, TimeEntries::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_time_entries_machine_started")
                        .table(TimeEntries::Table)
                        .col(TimeEntries::MachineId)
                        .col((TimeEntries::StartedAt, IndexOrder::Desc))
                        .to_owned(),
                )
                .await?;

            // At most one open record per machine and kind. sea-query has no
            // portable partial index builder; the statement is valid on both
            // Postgres and SQLite.
            manager
                .get_connection()
                .execute_unprepared(
                    "CREATE UNIQUE INDEX IF NOT EXISTS idx_time_entries_one_open \
                     ON time_entries (machine_id, kind) WHERE ended_at IS NULL",
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(TimeEntries::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum TimeEntries {
        Table,
        Id,
        Kind,
        Status,
        MachineId,
        OperatorId,
        OrderId,
        StageId,
        StoppageReasonId,
        ProductionEntryId,
        QuantityProduced,
        Notes,
        StartedAt,
        EndedAt,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000004_seed_none_stage {
    use super::m20240301_000001_create_reference_tables::Stages;
    use sea_orm_migration::prelude::*;
    use sea_orm_migration::sea_orm::prelude::Uuid;
    use sea_orm_migration::sea_orm::ConnectionTrait;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_seed_none_stage"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let now = chrono::Utc::now();
            let insert = Query::insert()
                .into_table(Stages::Table)
                .columns([
                    Stages::Id,
                    Stages::Code,
                    Stages::Name,
                    Stages::Sequence,
                    Stages::Color,
                    Stages::ShowOnBoard,
                    Stages::CreatedAt,
                    Stages::UpdatedAt,
                ])
                .values([
                    Uuid::new_v4().into(),
                    crate::entities::stage::NONE_STAGE_CODE.into(),
                    "NONE".into(),
                    0.into(),
                    "#9E9E9E".into(),
                    false.into(),
                    now.into(),
                    now.into(),
                ])
                .map_err(|e| DbErr::Migration(e.to_string()))?
                .on_conflict(OnConflict::column(Stages::Code).do_nothing().to_owned())
                .to_owned();

            let backend = manager.get_database_backend();
            manager
                .get_connection()
                .execute(backend.build(&insert))
                .await?;
            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let delete = Query::delete()
                .from_table(Stages::Table)
                .and_where(Expr::col(Stages::Code).eq(crate::entities::stage::NONE_STAGE_CODE))
                .to_owned();

            let backend = manager.get_database_backend();
            manager
                .get_connection()
                .execute(backend.build(&delete))
                .await?;
            Ok(())
        }
    }
}
