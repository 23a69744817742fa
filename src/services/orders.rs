use std::sync::Arc;

use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::{fetch_page, normalize_optional};
use crate::{
    db::DbPool,
    entities::{
        cancellation_reason, product,
        production_order::{self, OrderSource, OrderStatus},
        stage, time_entry,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    PaginatedResponse,
};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    #[validate(range(min = 1, message = "order number must be positive"))]
    pub number: i64,
    pub product_id: Option<Uuid>,
    /// Used when `product_id` is absent; resolved against the product table
    #[validate(length(min = 1, max = 50))]
    pub product_code: Option<String>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    /// Defaults to the `00` stage
    pub stage_id: Option<Uuid>,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub quantity_programmed: i32,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub quantity_loaded: i32,
}

/// Fields left out keep their stored value.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateOrderRequest {
    pub product_id: Option<Uuid>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    pub stage_id: Option<Uuid>,
    #[validate(range(min = 0))]
    pub quantity_programmed: Option<i32>,
    #[validate(range(min = 0))]
    pub quantity_loaded: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CancelOrderRequest {
    pub reason_id: Uuid,
}

#[derive(Debug, Default, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub stage_id: Option<Uuid>,
    pub machine_id: Option<Uuid>,
    pub source: Option<OrderSource>,
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Newest order numbers first. `search` matches the product code,
    /// the description or the exact number.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        filter: OrderFilter,
        search: Option<String>,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<production_order::Model>, ServiceError> {
        let mut query =
            production_order::Entity::find().order_by_desc(production_order::Column::Number);
        if let Some(status) = filter.status {
            query = query.filter(production_order::Column::Status.eq(status));
        }
        if let Some(stage_id) = filter.stage_id {
            query = query.filter(production_order::Column::StageId.eq(stage_id));
        }
        if let Some(machine_id) = filter.machine_id {
            query = query.filter(production_order::Column::MachineId.eq(machine_id));
        }
        if let Some(source) = filter.source {
            query = query.filter(production_order::Column::Source.eq(source));
        }
        if let Some(term) = normalize_optional(search) {
            let mut any = Condition::any()
                .add(production_order::Column::ProductCode.contains(term.clone()))
                .add(production_order::Column::Description.contains(term.clone()));
            if let Ok(number) = term.parse::<i64>() {
                any = any.add(production_order::Column::Number.eq(number));
            }
            query = query.filter(any);
        }
        fetch_page(query, &self.db, page, limit).await
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, id: Uuid) -> Result<production_order::Model, ServiceError> {
        production_order::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", id))
    }

    #[instrument(skip(self))]
    pub async fn get_order_by_number(
        &self,
        number: i64,
    ) -> Result<production_order::Model, ServiceError> {
        production_order::Entity::find()
            .filter(production_order::Column::Number.eq(number))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order number {number}")))
    }

    /// Manual order entry. The ERP import has its own path.
    #[instrument(skip(self, request), fields(number = request.number))]
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<production_order::Model, ServiceError> {
        let (product_id, product_code) = match (request.product_id, request.product_code) {
            (Some(id), _) => {
                let found = self.product(id).await?;
                (Some(found.id), Some(found.code))
            }
            (None, Some(code)) => {
                let code = code.trim().to_string();
                let found = product::Entity::find()
                    .filter(product::Column::Code.eq(code.as_str()))
                    .one(&*self.db)
                    .await?;
                (found.map(|p| p.id), Some(code))
            }
            (None, None) => (None, None),
        };
        let stage_id = match request.stage_id {
            Some(id) => self.stage(id).await?.id,
            None => self.none_stage_id().await?,
        };

        let number = request.number;
        let created = production_order::ActiveModel {
            number: Set(number),
            product_id: Set(product_id),
            product_code: Set(product_code),
            description: Set(normalize_optional(request.description)),
            status: Set(OrderStatus::Open),
            stage_id: Set(Some(stage_id)),
            machine_id: Set(None),
            quantity_programmed: Set(request.quantity_programmed),
            quantity_loaded: Set(request.quantity_loaded),
            quantity_produced: Set(0),
            cancellation_reason_id: Set(None),
            source: Set(OrderSource::Manual),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|e| ServiceError::from_db_conflict(e, format!("Order {number} already exists")))?;

        counter!("shopfloor.orders.created", 1, "source" => "manual");
        info!(order_id = %created.id, "order created");
        self.event_sender
            .send_or_log(Event::OrderCreated(created.id))
            .await;
        Ok(created)
    }

    #[instrument(skip(self, request))]
    pub async fn update_order(
        &self,
        id: Uuid,
        request: UpdateOrderRequest,
    ) -> Result<production_order::Model, ServiceError> {
        let current = self.get_order(id).await?;
        if current.status.is_terminal() {
            return Err(ServiceError::Conflict(format!(
                "Order {} is {} and can no longer change",
                current.number, current.status
            )));
        }

        let mut active: production_order::ActiveModel = current.into();
        if let Some(product_id) = request.product_id {
            let found = self.product(product_id).await?;
            active.product_id = Set(Some(found.id));
            active.product_code = Set(Some(found.code));
        }
        if request.description.is_some() {
            active.description = Set(normalize_optional(request.description));
        }
        if let Some(stage_id) = request.stage_id {
            active.stage_id = Set(Some(self.stage(stage_id).await?.id));
        }
        if let Some(quantity) = request.quantity_programmed {
            active.quantity_programmed = Set(quantity);
        }
        if let Some(quantity) = request.quantity_loaded {
            active.quantity_loaded = Set(quantity);
        }
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::OrderUpdated(updated.id))
            .await;
        Ok(updated)
    }

    /// Cancels an order that is not running on any machine.
    #[instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        id: Uuid,
        reason_id: Uuid,
    ) -> Result<production_order::Model, ServiceError> {
        let reason = cancellation_reason::Entity::find_by_id(reason_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Cancellation reason", reason_id))?;
        if !reason.active {
            return Err(ServiceError::BadRequest(format!(
                "Cancellation reason {} is inactive",
                reason.code
            )));
        }

        let txn = self.db.begin().await?;
        let order = production_order::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", id))?;
        if order.status.is_terminal() {
            return Err(ServiceError::Conflict(format!(
                "Order {} is already {}",
                order.number, order.status
            )));
        }
        let open_entries = time_entry::Entity::find()
            .filter(time_entry::Column::OrderId.eq(id))
            .filter(time_entry::Column::EndedAt.is_null())
            .count(&txn)
            .await?;
        if open_entries > 0 {
            return Err(ServiceError::Conflict(format!(
                "Order {} has open time entries; finish them first",
                order.number
            )));
        }

        let old_status = order.status;
        let mut active: production_order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Cancelled);
        active.cancellation_reason_id = Set(Some(reason.id));
        active.machine_id = Set(None);
        let cancelled = active.update(&txn).await?;
        txn.commit().await?;

        counter!("shopfloor.orders.cancelled", 1);
        warn!(order_id = %id, reason = %reason.code, "order cancelled");
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id: id,
                old_status,
                new_status: OrderStatus::Cancelled,
            })
            .await;
        Ok(cancelled)
    }

    /// Orders with tracking history are kept; cancel them instead.
    #[instrument(skip(self))]
    pub async fn delete_order(&self, id: Uuid) -> Result<(), ServiceError> {
        let order = self.get_order(id).await?;
        let history = time_entry::Entity::find()
            .filter(time_entry::Column::OrderId.eq(id))
            .count(&*self.db)
            .await?;
        if history > 0 {
            return Err(ServiceError::Conflict(format!(
                "Order {} has tracking history; cancel it instead",
                order.number
            )));
        }
        production_order::Entity::delete_by_id(id)
            .exec(&*self.db)
            .await?;
        info!(order_id = %id, number = order.number, "order deleted");
        Ok(())
    }

    async fn product(&self, id: Uuid) -> Result<product::Model, ServiceError> {
        product::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", id))
    }

    async fn stage(&self, id: Uuid) -> Result<stage::Model, ServiceError> {
        stage::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Stage", id))
    }

    async fn none_stage_id(&self) -> Result<Uuid, ServiceError> {
        none_stage_id(&*self.db).await
    }
}

/// Id of the seeded `00` stage.
pub(crate) async fn none_stage_id<C>(conn: &C) -> Result<Uuid, ServiceError>
where
    C: sea_orm::ConnectionTrait,
{
    stage::Entity::find()
        .filter(stage::Column::Code.eq(stage::NONE_STAGE_CODE))
        .one(conn)
        .await?
        .map(|s| s.id)
        .ok_or_else(|| ServiceError::InternalError("default stage 00 is missing".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_quantities_fail_validation() {
        let request = CreateOrderRequest {
            number: 8209,
            product_id: None,
            product_code: Some("REF-1".into()),
            description: None,
            stage_id: None,
            quantity_programmed: -1,
            quantity_loaded: 0,
        };
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("quantity_programmed"));
    }

    #[test]
    fn order_number_must_be_positive() {
        let request = CreateOrderRequest {
            number: 0,
            product_id: None,
            product_code: None,
            description: None,
            stage_id: None,
            quantity_programmed: 0,
            quantity_loaded: 0,
        };
        assert!(request.validate().is_err());
    }
}
