use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QuerySelect};
use serde::Serialize;
use tracing::instrument;
use utoipa::ToSchema;

use crate::{
    db::DbPool,
    entities::{
        machine::{self, MachineStatus},
        production_order::{self, OrderStatus},
        time_entry::{self, EntryKind},
        user::{self, UserRole},
    },
    errors::ServiceError,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct MachineCounts {
    pub total: u64,
    pub available: u64,
    pub in_process: u64,
    pub stopped: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct DashboardSummary {
    pub machines: MachineCounts,
    /// Active users with the OPERATOR role
    pub active_operators: u64,
    pub open_orders: u64,
    pub in_progress_orders: u64,
    pub running_production: u64,
    pub open_stoppages: u64,
    pub generated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct DashboardService {
    db: Arc<DbPool>,
}

impl DashboardService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn summary(&self) -> Result<DashboardSummary, ServiceError> {
        let db = &*self.db;

        let per_status: Vec<(MachineStatus, i64)> = machine::Entity::find()
            .select_only()
            .column(machine::Column::Status)
            .column_as(Expr::col(machine::Column::Id).count(), "count")
            .filter(machine::Column::Active.eq(true))
            .group_by(machine::Column::Status)
            .into_tuple()
            .all(db)
            .await?;

        let mut machines = MachineCounts::default();
        for (status, count) in per_status {
            let count = count.max(0) as u64;
            machines.total += count;
            match status {
                MachineStatus::Available => machines.available = count,
                MachineStatus::InProcess => machines.in_process = count,
                MachineStatus::Stopped => machines.stopped = count,
            }
        }

        let active_operators = user::Entity::find()
            .filter(user::Column::Active.eq(true))
            .filter(user::Column::Role.eq(UserRole::Operator))
            .count(db)
            .await?;
        let open_orders = production_order::Entity::find()
            .filter(production_order::Column::Status.eq(OrderStatus::Open))
            .count(db)
            .await?;
        let in_progress_orders = production_order::Entity::find()
            .filter(production_order::Column::Status.eq(OrderStatus::InProgress))
            .count(db)
            .await?;
        let running_production = open_entries(db, EntryKind::Production).await?;
        let open_stoppages = open_entries(db, EntryKind::Stoppage).await?;

        Ok(DashboardSummary {
            machines,
            active_operators,
            open_orders,
            in_progress_orders,
            running_production,
            open_stoppages,
            generated_at: Utc::now(),
        })
    }
}

async fn open_entries(db: &DbPool, kind: EntryKind) -> Result<u64, ServiceError> {
    Ok(time_entry::Entity::find()
        .filter(time_entry::Column::Kind.eq(kind))
        .filter(time_entry::Column::EndedAt.is_null())
        .count(db)
        .await?)
}
