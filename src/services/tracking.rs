//! Production runs and stoppages.
//!
//! Every operation here runs in one transaction: the machine row is locked
//! first, its next status comes from [`transition`], and the time entry,
//! machine and order writes commit together. The partial unique index on
//! open `(machine_id, kind)` pairs backs the status check up; a violation
//! surfaces as `Conflict`.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseBackend, DatabaseTransaction,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::{fetch_page, normalize_optional};
use crate::{
    db::DbPool,
    entities::{
        machine::{self, MachineStatus},
        production_order::{self, OrderStatus},
        stage, stoppage_reason,
        time_entry::{self, EntryKind, EntryStatus},
        user,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    models::{transition, MachineEvent},
    PaginatedResponse,
};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct StartProductionRequest {
    pub machine_id: Uuid,
    pub order_id: Uuid,
    pub stage_id: Uuid,
    /// Defaults to the user holding the session
    pub operator_id: Option<Uuid>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct StartStoppageRequest {
    pub reason_id: Uuid,
    /// Defaults to the order of the interrupted production run
    pub order_id: Option<Uuid>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

/// Closes a stoppage or a production run; the quantity and `finish_order`
/// only apply to production runs.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct FinishEntryRequest {
    #[validate(range(min = 0))]
    pub quantity_produced: Option<i32>,
    #[serde(default)]
    pub finish_order: bool,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EntryFilter {
    pub machine_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub operator_id: Option<Uuid>,
    pub kind: Option<EntryKind>,
    pub status: Option<EntryStatus>,
}

/// The written entry and the machine as it stands after the transition.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TrackingResult {
    pub entry: time_entry::Model,
    pub machine: machine::Model,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OpenEntries {
    pub machine: machine::Model,
    pub production: Option<time_entry::Model>,
    pub stoppage: Option<time_entry::Model>,
}

/// What changed inside a committed transition, published afterwards.
struct Applied {
    result: TrackingResult,
    event: MachineEvent,
    from: MachineStatus,
    order_change: Option<(Uuid, OrderStatus, OrderStatus)>,
}

#[derive(Clone)]
pub struct TrackingService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl TrackingService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, request), fields(machine_id = %request.machine_id, order_id = %request.order_id))]
    pub async fn start_production(
        &self,
        request: StartProductionRequest,
        acting_user: Uuid,
    ) -> Result<TrackingResult, ServiceError> {
        let txn = self.db.begin().await?;

        let machine = lock_machine(&txn, request.machine_id).await?;
        if !machine.active {
            return Err(ServiceError::Conflict(format!(
                "Machine {} is inactive",
                machine.code
            )));
        }
        let from = machine.status;
        let to = transition(from, MachineEvent::StartProduction)?;

        let order = production_order::Entity::find_by_id(request.order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", request.order_id))?;
        if order.status.is_terminal() {
            return Err(ServiceError::Conflict(format!(
                "Order {} is {}",
                order.number, order.status
            )));
        }
        let stage = stage::Entity::find_by_id(request.stage_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Stage", request.stage_id))?;
        let operator_id = active_operator(&txn, request.operator_id.unwrap_or(acting_user)).await?;

        let entry = time_entry::ActiveModel {
            kind: Set(EntryKind::Production),
            status: Set(EntryStatus::InProgress),
            machine_id: Set(machine.id),
            operator_id: Set(Some(operator_id)),
            order_id: Set(Some(order.id)),
            stage_id: Set(Some(stage.id)),
            stoppage_reason_id: Set(None),
            production_entry_id: Set(None),
            quantity_produced: Set(None),
            notes: Set(normalize_optional(request.notes)),
            started_at: Set(Utc::now()),
            ended_at: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            ServiceError::from_db_conflict(
                e,
                format!("Machine {} already has an open production run", machine.code),
            )
        })?;

        let machine = set_machine_status(&txn, machine, to).await?;

        let old_order_status = order.status;
        let mut order_update: production_order::ActiveModel = order.into();
        order_update.status = Set(OrderStatus::InProgress);
        order_update.machine_id = Set(Some(machine.id));
        order_update.stage_id = Set(Some(stage.id));
        let order = order_update.update(&txn).await?;

        txn.commit().await?;

        let order_change = (old_order_status != order.status)
            .then_some((order.id, old_order_status, order.status));
        self.publish(Applied {
            result: TrackingResult { entry, machine },
            event: MachineEvent::StartProduction,
            from,
            order_change,
        })
        .await
    }

    /// Stops the machine of a running production run. The run stays open.
    #[instrument(skip(self, request), fields(production_entry_id = %production_entry_id))]
    pub async fn start_stoppage_from_entry(
        &self,
        production_entry_id: Uuid,
        request: StartStoppageRequest,
        acting_user: Uuid,
    ) -> Result<TrackingResult, ServiceError> {
        let machine_id = self.get_entry(production_entry_id).await?.machine_id;

        let txn = self.db.begin().await?;
        let machine = lock_machine(&txn, machine_id).await?;
        // re-read under the machine lock
        let production = time_entry::Entity::find_by_id(production_entry_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Time entry", production_entry_id))?;
        if production.kind != EntryKind::Production || !production.is_open() {
            return Err(ServiceError::Conflict(format!(
                "Time entry {production_entry_id} is not an open production run"
            )));
        }

        let applied = open_stoppage(&txn, machine, Some(production), request, acting_user).await?;
        txn.commit().await?;
        self.publish(applied).await
    }

    /// Stops a machine directly. When a production run is open on it, the
    /// stoppage is linked to that run; an idle machine only takes stoppages
    /// without an order.
    #[instrument(skip(self, request), fields(machine_id = %machine_id))]
    pub async fn start_machine_stoppage(
        &self,
        machine_id: Uuid,
        request: StartStoppageRequest,
        acting_user: Uuid,
    ) -> Result<TrackingResult, ServiceError> {
        let txn = self.db.begin().await?;
        let machine = lock_machine(&txn, machine_id).await?;
        if !machine.active {
            return Err(ServiceError::Conflict(format!(
                "Machine {} is inactive",
                machine.code
            )));
        }
        let production = open_entry(&txn, machine.id, EntryKind::Production).await?;
        // an order-linked stoppage resumes production, so it needs a run to resume
        if let (None, Some(order_id)) = (&production, request.order_id) {
            return Err(ServiceError::BadRequest(format!(
                "Machine {} has no production run to attach order {order_id} to",
                machine.code
            )));
        }

        let applied = open_stoppage(&txn, machine, production, request, acting_user).await?;
        txn.commit().await?;
        self.publish(applied).await
    }

    /// Finishes a stoppage or a production run, depending on the entry kind.
    #[instrument(skip(self, request), fields(entry_id = %entry_id))]
    pub async fn finish_entry(
        &self,
        entry_id: Uuid,
        request: FinishEntryRequest,
    ) -> Result<TrackingResult, ServiceError> {
        let machine_id = self.get_entry(entry_id).await?.machine_id;

        let txn = self.db.begin().await?;
        let machine = lock_machine(&txn, machine_id).await?;
        let entry = time_entry::Entity::find_by_id(entry_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Time entry", entry_id))?;
        if !entry.is_open() {
            return Err(ServiceError::Conflict(format!(
                "Time entry {entry_id} is already finished"
            )));
        }

        let applied = match entry.kind {
            EntryKind::Stoppage => close_stoppage(&txn, machine, entry, request).await?,
            EntryKind::Production => close_production(&txn, machine, entry, request).await?,
        };
        txn.commit().await?;
        self.publish(applied).await
    }

    #[instrument(skip(self))]
    pub async fn list_entries(
        &self,
        filter: EntryFilter,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<time_entry::Model>, ServiceError> {
        let mut query = time_entry::Entity::find().order_by_desc(time_entry::Column::StartedAt);
        if let Some(machine_id) = filter.machine_id {
            query = query.filter(time_entry::Column::MachineId.eq(machine_id));
        }
        if let Some(order_id) = filter.order_id {
            query = query.filter(time_entry::Column::OrderId.eq(order_id));
        }
        if let Some(operator_id) = filter.operator_id {
            query = query.filter(time_entry::Column::OperatorId.eq(operator_id));
        }
        if let Some(kind) = filter.kind {
            query = query.filter(time_entry::Column::Kind.eq(kind));
        }
        if let Some(status) = filter.status {
            query = query.filter(time_entry::Column::Status.eq(status));
        }
        fetch_page(query, &self.db, page, limit).await
    }

    #[instrument(skip(self))]
    pub async fn get_entry(&self, id: Uuid) -> Result<time_entry::Model, ServiceError> {
        time_entry::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Time entry", id))
    }

    /// The open production run and open stoppage of a machine, if any.
    #[instrument(skip(self))]
    pub async fn open_entries(&self, machine_id: Uuid) -> Result<OpenEntries, ServiceError> {
        let machine = machine::Entity::find_by_id(machine_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Machine", machine_id))?;
        let production = open_entry(&*self.db, machine_id, EntryKind::Production).await?;
        let stoppage = open_entry(&*self.db, machine_id, EntryKind::Stoppage).await?;
        Ok(OpenEntries {
            machine,
            production,
            stoppage,
        })
    }

    async fn publish(&self, applied: Applied) -> Result<TrackingResult, ServiceError> {
        let Applied {
            result,
            event,
            from,
            order_change,
        } = applied;
        let to = result.machine.status;

        counter!("shopfloor.machine.transitions", 1, "event" => event.to_string());
        info!(
            machine_id = %result.machine.id,
            entry_id = %result.entry.id,
            %event,
            %from,
            %to,
            "machine transition applied"
        );

        self.event_sender
            .send_or_log(Event::MachineStatusChanged {
                machine_id: result.machine.id,
                from,
                to,
            })
            .await;
        let entry_event = if result.entry.is_open() {
            Event::TimeEntryOpened {
                entry_id: result.entry.id,
                machine_id: result.machine.id,
                kind: result.entry.kind,
            }
        } else {
            Event::TimeEntryClosed {
                entry_id: result.entry.id,
                machine_id: result.machine.id,
                kind: result.entry.kind,
            }
        };
        self.event_sender.send_or_log(entry_event).await;
        if let Some((order_id, old_status, new_status)) = order_change {
            self.event_sender
                .send_or_log(Event::OrderStatusChanged {
                    order_id,
                    old_status,
                    new_status,
                })
                .await;
        }
        Ok(result)
    }
}

/// Loads the machine row, holding a row lock on backends that support one.
async fn lock_machine(
    txn: &DatabaseTransaction,
    machine_id: Uuid,
) -> Result<machine::Model, ServiceError> {
    let mut query = machine::Entity::find_by_id(machine_id);
    if txn.get_database_backend() == DatabaseBackend::Postgres {
        query = query.lock_exclusive();
    }
    query
        .one(txn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Machine", machine_id))
}

async fn set_machine_status(
    txn: &DatabaseTransaction,
    machine: machine::Model,
    status: MachineStatus,
) -> Result<machine::Model, ServiceError> {
    let mut active: machine::ActiveModel = machine.into();
    active.status = Set(status);
    Ok(active.update(txn).await?)
}

async fn open_entry<C>(
    conn: &C,
    machine_id: Uuid,
    kind: EntryKind,
) -> Result<Option<time_entry::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    Ok(time_entry::Entity::find()
        .filter(time_entry::Column::MachineId.eq(machine_id))
        .filter(time_entry::Column::Kind.eq(kind))
        .filter(time_entry::Column::EndedAt.is_null())
        .one(conn)
        .await?)
}

async fn active_operator(txn: &DatabaseTransaction, id: Uuid) -> Result<Uuid, ServiceError> {
    let operator = user::Entity::find_by_id(id)
        .one(txn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Operator", id))?;
    if !operator.active {
        return Err(ServiceError::BadRequest(format!(
            "Operator {} is inactive",
            operator.matricula
        )));
    }
    Ok(operator.id)
}

async fn open_stoppage(
    txn: &DatabaseTransaction,
    machine: machine::Model,
    production: Option<time_entry::Model>,
    request: StartStoppageRequest,
    acting_user: Uuid,
) -> Result<Applied, ServiceError> {
    let from = machine.status;
    let to = transition(from, MachineEvent::StartStoppage)?;

    let reason = stoppage_reason::Entity::find_by_id(request.reason_id)
        .one(txn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Stoppage reason", request.reason_id))?;
    if !reason.active {
        return Err(ServiceError::BadRequest(format!(
            "Stoppage reason {} is inactive",
            reason.code
        )));
    }

    let order_id = request
        .order_id
        .or_else(|| production.as_ref().and_then(|p| p.order_id));
    if let Some(order_id) = order_id {
        let order = production_order::Entity::find_by_id(order_id)
            .one(txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", order_id))?;
        if order.status.is_terminal() {
            return Err(ServiceError::Conflict(format!(
                "Order {} is {}",
                order.number, order.status
            )));
        }
    }
    let operator_id = active_operator(txn, acting_user).await?;

    let entry = time_entry::ActiveModel {
        kind: Set(EntryKind::Stoppage),
        status: Set(EntryStatus::InProgress),
        machine_id: Set(machine.id),
        operator_id: Set(Some(operator_id)),
        order_id: Set(order_id),
        stage_id: Set(production.as_ref().and_then(|p| p.stage_id)),
        stoppage_reason_id: Set(Some(reason.id)),
        production_entry_id: Set(production.as_ref().map(|p| p.id)),
        quantity_produced: Set(None),
        notes: Set(normalize_optional(request.notes)),
        started_at: Set(Utc::now()),
        ended_at: Set(None),
        ..Default::default()
    }
    .insert(txn)
    .await
    .map_err(|e| {
        ServiceError::from_db_conflict(
            e,
            format!("Machine {} already has an open stoppage", machine.code),
        )
    })?;

    let machine = set_machine_status(txn, machine, to).await?;
    Ok(Applied {
        result: TrackingResult { entry, machine },
        event: MachineEvent::StartStoppage,
        from,
        order_change: None,
    })
}

async fn close_stoppage(
    txn: &DatabaseTransaction,
    machine: machine::Model,
    entry: time_entry::Model,
    request: FinishEntryRequest,
) -> Result<Applied, ServiceError> {
    let event = MachineEvent::FinishStoppage {
        linked_to_order: entry.order_id.is_some(),
    };
    let from = machine.status;
    let to = transition(from, event)?;

    let ended_at = Utc::now().max(entry.started_at);
    let notes = normalize_optional(request.notes).or_else(|| entry.notes.clone());
    let mut active: time_entry::ActiveModel = entry.into();
    active.status = Set(EntryStatus::Finished);
    active.ended_at = Set(Some(ended_at));
    active.notes = Set(notes);
    let entry = active.update(txn).await?;

    let machine = set_machine_status(txn, machine, to).await?;
    Ok(Applied {
        result: TrackingResult { entry, machine },
        event,
        from,
        order_change: None,
    })
}

async fn close_production(
    txn: &DatabaseTransaction,
    machine: machine::Model,
    entry: time_entry::Model,
    request: FinishEntryRequest,
) -> Result<Applied, ServiceError> {
    if open_entry(txn, machine.id, EntryKind::Stoppage)
        .await?
        .is_some()
    {
        return Err(ServiceError::Conflict(format!(
            "Machine {} has an open stoppage; finish it first",
            machine.code
        )));
    }
    let from = machine.status;
    let to = transition(from, MachineEvent::FinishProduction)?;

    let quantity = request.quantity_produced.unwrap_or(0);
    let ended_at = Utc::now().max(entry.started_at);
    let order_id = entry.order_id;
    let notes = normalize_optional(request.notes).or_else(|| entry.notes.clone());
    let mut active: time_entry::ActiveModel = entry.into();
    active.status = Set(EntryStatus::Finished);
    active.ended_at = Set(Some(ended_at));
    active.quantity_produced = Set(Some(quantity));
    active.notes = Set(notes);
    let entry = active.update(txn).await?;

    let machine = set_machine_status(txn, machine, to).await?;

    let mut order_change = None;
    if let Some(order_id) = order_id {
        if let Some(order) = production_order::Entity::find_by_id(order_id)
            .one(txn)
            .await?
        {
            let produced = order.quantity_produced.checked_add(quantity).ok_or_else(|| {
                ServiceError::BadRequest(format!(
                    "Produced quantity overflows for order {}",
                    order.number
                ))
            })?;
            let old_status = order.status;
            let mut order_update: production_order::ActiveModel = order.into();
            order_update.quantity_produced = Set(produced);
            if request.finish_order {
                order_update.status = Set(OrderStatus::Finished);
                order_update.machine_id = Set(None);
                order_change = Some((order_id, old_status, OrderStatus::Finished));
            }
            order_update.update(txn).await?;
        }
    }

    Ok(Applied {
        result: TrackingResult { entry, machine },
        event: MachineEvent::FinishProduction,
        from,
        order_change,
    })
}
