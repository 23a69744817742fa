use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::{fetch_page, normalize_optional, not_blank};
use crate::{
    db::DbPool,
    entities::{cancellation_reason, product, stage, stoppage_reason},
    errors::ServiceError,
    PaginatedResponse,
};

static HEX_COLOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").unwrap());

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct StageRequest {
    #[validate(length(min = 1, max = 20), custom = "not_blank")]
    pub code: String,
    #[validate(length(min = 1, max = 100), custom = "not_blank")]
    pub name: String,
    #[validate(range(min = 0, max = 9999))]
    pub sequence: i32,
    #[validate(regex(path = "HEX_COLOR", message = "color must be #RRGGBB"))]
    #[schema(example = "#1E88E5")]
    pub color: String,
    #[serde(default = "default_true")]
    pub show_on_board: bool,
}

/// Shared body for stoppage and cancellation reasons.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ReasonRequest {
    #[validate(length(min = 1, max = 20), custom = "not_blank")]
    pub code: String,
    #[validate(length(min = 1, max = 200), custom = "not_blank")]
    pub description: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ProductRequest {
    #[validate(length(min = 1, max = 50), custom = "not_blank")]
    pub code: String,
    #[validate(length(min = 1, max = 200), custom = "not_blank")]
    pub description: String,
}

fn default_true() -> bool {
    true
}

/// Lookup tables operators pick from: stages, stoppage and cancellation
/// reasons, products.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DbPool>,
}

impl CatalogService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    // ----- stages -----

    /// Stages in board order.
    #[instrument(skip(self))]
    pub async fn list_stages(
        &self,
        board_only: bool,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<stage::Model>, ServiceError> {
        let mut query = stage::Entity::find()
            .order_by_asc(stage::Column::Sequence)
            .order_by_asc(stage::Column::Code);
        if board_only {
            query = query.filter(stage::Column::ShowOnBoard.eq(true));
        }
        fetch_page(query, &self.db, page, limit).await
    }

    #[instrument(skip(self))]
    pub async fn get_stage(&self, id: Uuid) -> Result<stage::Model, ServiceError> {
        stage::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Stage", id))
    }

    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn create_stage(&self, request: StageRequest) -> Result<stage::Model, ServiceError> {
        let code = request.code.trim().to_string();
        let created = stage::ActiveModel {
            code: Set(code.clone()),
            name: Set(request.name.trim().to_string()),
            sequence: Set(request.sequence),
            color: Set(request.color.to_uppercase()),
            show_on_board: Set(request.show_on_board),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|e| ServiceError::from_db_conflict(e, format!("Stage '{code}' already exists")))?;

        info!(stage_id = %created.id, "stage created");
        Ok(created)
    }

    #[instrument(skip(self, request))]
    pub async fn update_stage(
        &self,
        id: Uuid,
        request: StageRequest,
    ) -> Result<stage::Model, ServiceError> {
        let current = self.get_stage(id).await?;
        let code = request.code.trim().to_string();
        if current.code == stage::NONE_STAGE_CODE && code != stage::NONE_STAGE_CODE {
            return Err(ServiceError::Conflict(
                "The default stage code cannot change".into(),
            ));
        }
        let mut active: stage::ActiveModel = current.into();
        active.code = Set(code.clone());
        active.name = Set(request.name.trim().to_string());
        active.sequence = Set(request.sequence);
        active.color = Set(request.color.to_uppercase());
        active.show_on_board = Set(request.show_on_board);
        active
            .update(&*self.db)
            .await
            .map_err(|e| ServiceError::from_db_conflict(e, format!("Stage '{code}' already exists")))
    }

    #[instrument(skip(self))]
    pub async fn delete_stage(&self, id: Uuid) -> Result<(), ServiceError> {
        let current = self.get_stage(id).await?;
        if current.code == stage::NONE_STAGE_CODE {
            return Err(ServiceError::Conflict(
                "The default stage cannot be deleted".into(),
            ));
        }
        stage::Entity::delete_by_id(id).exec(&*self.db).await?;
        info!(stage_id = %id, "stage deleted");
        Ok(())
    }

    // ----- stoppage reasons -----

    #[instrument(skip(self))]
    pub async fn list_stoppage_reasons(
        &self,
        active_only: bool,
        search: Option<String>,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<stoppage_reason::Model>, ServiceError> {
        let mut query = stoppage_reason::Entity::find().order_by_asc(stoppage_reason::Column::Code);
        if active_only {
            query = query.filter(stoppage_reason::Column::Active.eq(true));
        }
        if let Some(term) = normalize_optional(search) {
            query = query.filter(
                Condition::any()
                    .add(stoppage_reason::Column::Code.contains(term.clone()))
                    .add(stoppage_reason::Column::Description.contains(term)),
            );
        }
        fetch_page(query, &self.db, page, limit).await
    }

    #[instrument(skip(self))]
    pub async fn get_stoppage_reason(
        &self,
        id: Uuid,
    ) -> Result<stoppage_reason::Model, ServiceError> {
        stoppage_reason::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Stoppage reason", id))
    }

    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn create_stoppage_reason(
        &self,
        request: ReasonRequest,
    ) -> Result<stoppage_reason::Model, ServiceError> {
        let code = request.code.trim().to_string();
        stoppage_reason::ActiveModel {
            code: Set(code.clone()),
            description: Set(request.description.trim().to_string()),
            active: Set(request.active),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|e| {
            ServiceError::from_db_conflict(e, format!("Stoppage reason '{code}' already exists"))
        })
    }

    #[instrument(skip(self, request))]
    pub async fn update_stoppage_reason(
        &self,
        id: Uuid,
        request: ReasonRequest,
    ) -> Result<stoppage_reason::Model, ServiceError> {
        let mut active: stoppage_reason::ActiveModel =
            self.get_stoppage_reason(id).await?.into();
        let code = request.code.trim().to_string();
        active.code = Set(code.clone());
        active.description = Set(request.description.trim().to_string());
        active.active = Set(request.active);
        active.update(&*self.db).await.map_err(|e| {
            ServiceError::from_db_conflict(e, format!("Stoppage reason '{code}' already exists"))
        })
    }

    #[instrument(skip(self))]
    pub async fn delete_stoppage_reason(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = stoppage_reason::Entity::delete_by_id(id)
            .exec(&*self.db)
            .await
            .map_err(|e| {
                ServiceError::from_db_conflict(e, "Stoppage reason is in use; deactivate it instead")
            })?;
        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("Stoppage reason", id));
        }
        Ok(())
    }

    // ----- cancellation reasons -----

    #[instrument(skip(self))]
    pub async fn list_cancellation_reasons(
        &self,
        active_only: bool,
        search: Option<String>,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<cancellation_reason::Model>, ServiceError> {
        let mut query =
            cancellation_reason::Entity::find().order_by_asc(cancellation_reason::Column::Code);
        if active_only {
            query = query.filter(cancellation_reason::Column::Active.eq(true));
        }
        if let Some(term) = normalize_optional(search) {
            query = query.filter(
                Condition::any()
                    .add(cancellation_reason::Column::Code.contains(term.clone()))
                    .add(cancellation_reason::Column::Description.contains(term)),
            );
        }
        fetch_page(query, &self.db, page, limit).await
    }

    #[instrument(skip(self))]
    pub async fn get_cancellation_reason(
        &self,
        id: Uuid,
    ) -> Result<cancellation_reason::Model, ServiceError> {
        cancellation_reason::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Cancellation reason", id))
    }

    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn create_cancellation_reason(
        &self,
        request: ReasonRequest,
    ) -> Result<cancellation_reason::Model, ServiceError> {
        let code = request.code.trim().to_string();
        cancellation_reason::ActiveModel {
            code: Set(code.clone()),
            description: Set(request.description.trim().to_string()),
            active: Set(request.active),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|e| {
            ServiceError::from_db_conflict(e, format!("Cancellation reason '{code}' already exists"))
        })
    }

    #[instrument(skip(self, request))]
    pub async fn update_cancellation_reason(
        &self,
        id: Uuid,
        request: ReasonRequest,
    ) -> Result<cancellation_reason::Model, ServiceError> {
        let mut active: cancellation_reason::ActiveModel =
            self.get_cancellation_reason(id).await?.into();
        let code = request.code.trim().to_string();
        active.code = Set(code.clone());
        active.description = Set(request.description.trim().to_string());
        active.active = Set(request.active);
        active.update(&*self.db).await.map_err(|e| {
            ServiceError::from_db_conflict(e, format!("Cancellation reason '{code}' already exists"))
        })
    }

    #[instrument(skip(self))]
    pub async fn delete_cancellation_reason(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = cancellation_reason::Entity::delete_by_id(id)
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("Cancellation reason", id));
        }
        Ok(())
    }

    // ----- products -----

    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        search: Option<String>,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<product::Model>, ServiceError> {
        let mut query = product::Entity::find().order_by_asc(product::Column::Code);
        if let Some(term) = normalize_optional(search) {
            query = query.filter(
                Condition::any()
                    .add(product::Column::Code.contains(term.clone()))
                    .add(product::Column::Description.contains(term)),
            );
        }
        fetch_page(query, &self.db, page, limit).await
    }

    #[instrument(skip(self))]
    pub async fn get_product(&self, id: Uuid) -> Result<product::Model, ServiceError> {
        product::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", id))
    }

    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn create_product(
        &self,
        request: ProductRequest,
    ) -> Result<product::Model, ServiceError> {
        let code = request.code.trim().to_string();
        product::ActiveModel {
            code: Set(code.clone()),
            description: Set(request.description.trim().to_string()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|e| ServiceError::from_db_conflict(e, format!("Product '{code}' already exists")))
    }

    #[instrument(skip(self, request))]
    pub async fn update_product(
        &self,
        id: Uuid,
        request: ProductRequest,
    ) -> Result<product::Model, ServiceError> {
        let mut active: product::ActiveModel = self.get_product(id).await?.into();
        let code = request.code.trim().to_string();
        active.code = Set(code.clone());
        active.description = Set(request.description.trim().to_string());
        active
            .update(&*self.db)
            .await
            .map_err(|e| ServiceError::from_db_conflict(e, format!("Product '{code}' already exists")))
    }

    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = product::Entity::delete_by_id(id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("Product", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(color: &str) -> StageRequest {
        StageRequest {
            code: "10".into(),
            name: "Tecelagem".into(),
            sequence: 10,
            color: color.into(),
            show_on_board: true,
        }
    }

    #[test]
    fn stage_color_must_be_hex() {
        assert!(stage("#1e88e5").validate().is_ok());
        for bad in ["1E88E5", "#1E88E", "#GGGGGG", "#1E88E5FF", ""] {
            let errors = stage(bad).validate().unwrap_err();
            assert!(errors.field_errors().contains_key("color"), "{bad} accepted");
        }
    }

    #[test]
    fn reason_requires_description() {
        let request = ReasonRequest {
            code: "P01".into(),
            description: " ".into(),
            active: true,
        };
        assert!(request.validate().is_err());
    }
}
