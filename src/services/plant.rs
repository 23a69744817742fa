use std::collections::BTreeSet;
use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::{fetch_page, normalize_optional, not_blank};
use crate::{
    db::DbPool,
    entities::{
        area,
        machine::{self, MachineStatus},
        machine_sector, sector,
    },
    errors::ServiceError,
    PaginatedResponse,
};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AreaRequest {
    #[validate(length(min = 1, max = 100), custom = "not_blank")]
    pub name: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SectorRequest {
    #[validate(length(min = 1, max = 100), custom = "not_blank")]
    pub name: String,
    pub area_id: Uuid,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct MachineRequest {
    #[validate(length(min = 1, max = 50), custom = "not_blank")]
    pub code: String,
    #[validate(length(min = 1, max = 100), custom = "not_blank")]
    pub name: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    /// Defaults to `true` on create and keeps the stored value on update
    pub active: Option<bool>,
    /// Sectors the machine serves; replaces the current membership on update
    #[serde(default)]
    pub sector_ids: Vec<Uuid>,
}

#[derive(Debug, Default, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MachineFilter {
    pub sector_id: Option<Uuid>,
    pub status: Option<MachineStatus>,
    pub active: Option<bool>,
}

/// Machine with the sectors it belongs to.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MachineDetail {
    #[serde(flatten)]
    #[schema(inline)]
    pub machine: machine::Model,
    pub sector_ids: Vec<Uuid>,
}

/// Areas, sectors and machines: the physical layout of the plant.
#[derive(Clone)]
pub struct PlantService {
    db: Arc<DbPool>,
}

impl PlantService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    // ----- areas -----

    #[instrument(skip(self))]
    pub async fn list_areas(
        &self,
        search: Option<String>,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<area::Model>, ServiceError> {
        let mut query = area::Entity::find().order_by_asc(area::Column::Name);
        if let Some(term) = normalize_optional(search) {
            query = query.filter(area::Column::Name.contains(term));
        }
        fetch_page(query, &self.db, page, limit).await
    }

    #[instrument(skip(self))]
    pub async fn get_area(&self, id: Uuid) -> Result<area::Model, ServiceError> {
        area::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Area", id))
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_area(&self, request: AreaRequest) -> Result<area::Model, ServiceError> {
        let name = request.name.trim().to_string();
        let created = area::ActiveModel {
            name: Set(name.clone()),
            description: Set(normalize_optional(request.description)),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|e| ServiceError::from_db_conflict(e, format!("Area '{name}' already exists")))?;

        info!(area_id = %created.id, "area created");
        Ok(created)
    }

    #[instrument(skip(self, request))]
    pub async fn update_area(
        &self,
        id: Uuid,
        request: AreaRequest,
    ) -> Result<area::Model, ServiceError> {
        let mut active: area::ActiveModel = self.get_area(id).await?.into();
        let name = request.name.trim().to_string();
        active.name = Set(name.clone());
        active.description = Set(normalize_optional(request.description));
        active
            .update(&*self.db)
            .await
            .map_err(|e| ServiceError::from_db_conflict(e, format!("Area '{name}' already exists")))
    }

    #[instrument(skip(self))]
    pub async fn delete_area(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = area::Entity::delete_by_id(id)
            .exec(&*self.db)
            .await
            .map_err(|e| ServiceError::from_db_conflict(e, "Area still has sectors"))?;
        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("Area", id));
        }
        info!(area_id = %id, "area deleted");
        Ok(())
    }

    // ----- sectors -----

    #[instrument(skip(self))]
    pub async fn list_sectors(
        &self,
        area_id: Option<Uuid>,
        search: Option<String>,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<sector::Model>, ServiceError> {
        let mut query = sector::Entity::find().order_by_asc(sector::Column::Name);
        if let Some(area_id) = area_id {
            query = query.filter(sector::Column::AreaId.eq(area_id));
        }
        if let Some(term) = normalize_optional(search) {
            query = query.filter(sector::Column::Name.contains(term));
        }
        fetch_page(query, &self.db, page, limit).await
    }

    #[instrument(skip(self))]
    pub async fn get_sector(&self, id: Uuid) -> Result<sector::Model, ServiceError> {
        sector::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Sector", id))
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_sector(
        &self,
        request: SectorRequest,
    ) -> Result<sector::Model, ServiceError> {
        self.get_area(request.area_id).await?;
        let name = request.name.trim().to_string();
        let created = sector::ActiveModel {
            name: Set(name.clone()),
            area_id: Set(request.area_id),
            description: Set(normalize_optional(request.description)),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|e| {
            ServiceError::from_db_conflict(e, format!("Sector '{name}' already exists in this area"))
        })?;

        info!(sector_id = %created.id, "sector created");
        Ok(created)
    }

    #[instrument(skip(self, request))]
    pub async fn update_sector(
        &self,
        id: Uuid,
        request: SectorRequest,
    ) -> Result<sector::Model, ServiceError> {
        let mut active: sector::ActiveModel = self.get_sector(id).await?.into();
        self.get_area(request.area_id).await?;
        let name = request.name.trim().to_string();
        active.name = Set(name.clone());
        active.area_id = Set(request.area_id);
        active.description = Set(normalize_optional(request.description));
        active.update(&*self.db).await.map_err(|e| {
            ServiceError::from_db_conflict(e, format!("Sector '{name}' already exists in this area"))
        })
    }

    #[instrument(skip(self))]
    pub async fn delete_sector(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = sector::Entity::delete_by_id(id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("Sector", id));
        }
        info!(sector_id = %id, "sector deleted");
        Ok(())
    }

    // ----- machines -----

    #[instrument(skip(self))]
    pub async fn list_machines(
        &self,
        filter: MachineFilter,
        search: Option<String>,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<machine::Model>, ServiceError> {
        let mut query = machine::Entity::find().order_by_asc(machine::Column::Code);
        if let Some(sector_id) = filter.sector_id {
            query = query
                .inner_join(machine_sector::Entity)
                .filter(machine_sector::Column::SectorId.eq(sector_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(machine::Column::Status.eq(status));
        }
        if let Some(active) = filter.active {
            query = query.filter(machine::Column::Active.eq(active));
        }
        if let Some(term) = normalize_optional(search) {
            query = query.filter(
                Condition::any()
                    .add(machine::Column::Code.contains(term.clone()))
                    .add(machine::Column::Name.contains(term)),
            );
        }
        fetch_page(query, &self.db, page, limit).await
    }

    #[instrument(skip(self))]
    pub async fn get_machine(&self, id: Uuid) -> Result<MachineDetail, ServiceError> {
        let machine = machine::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Machine", id))?;
        let sector_ids = self.sector_ids_of(id).await?;
        Ok(MachineDetail {
            machine,
            sector_ids,
        })
    }

    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn create_machine(
        &self,
        request: MachineRequest,
    ) -> Result<MachineDetail, ServiceError> {
        let sector_ids = self.existing_sectors(&request.sector_ids).await?;
        let code = request.code.trim().to_string();

        let txn = self.db.begin().await?;
        let machine = machine::ActiveModel {
            code: Set(code.clone()),
            name: Set(request.name.trim().to_string()),
            description: Set(normalize_optional(request.description)),
            active: Set(request.active.unwrap_or(true)),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| ServiceError::from_db_conflict(e, format!("Machine '{code}' already exists")))?;
        replace_membership(&txn, machine.id, &sector_ids).await?;
        txn.commit().await?;

        info!(machine_id = %machine.id, "machine created");
        Ok(MachineDetail {
            machine,
            sector_ids,
        })
    }

    /// Updates the descriptive fields and sector membership. Status is owned
    /// by the tracking service and never changes here.
    #[instrument(skip(self, request))]
    pub async fn update_machine(
        &self,
        id: Uuid,
        request: MachineRequest,
    ) -> Result<MachineDetail, ServiceError> {
        let sector_ids = self.existing_sectors(&request.sector_ids).await?;
        let current = machine::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Machine", id))?;
        let code = request.code.trim().to_string();

        let txn = self.db.begin().await?;
        let mut active: machine::ActiveModel = current.into();
        active.code = Set(code.clone());
        active.name = Set(request.name.trim().to_string());
        active.description = Set(normalize_optional(request.description));
        if let Some(flag) = request.active {
            active.active = Set(flag);
        }
        let machine = active
            .update(&txn)
            .await
            .map_err(|e| ServiceError::from_db_conflict(e, format!("Machine '{code}' already exists")))?;
        replace_membership(&txn, id, &sector_ids).await?;
        txn.commit().await?;

        Ok(MachineDetail {
            machine,
            sector_ids,
        })
    }

    #[instrument(skip(self))]
    pub async fn delete_machine(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = machine::Entity::delete_by_id(id)
            .exec(&*self.db)
            .await
            .map_err(|e| {
                ServiceError::from_db_conflict(
                    e,
                    "Machine has tracking history; deactivate it instead",
                )
            })?;
        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("Machine", id));
        }
        info!(machine_id = %id, "machine deleted");
        Ok(())
    }

    async fn sector_ids_of(&self, machine_id: Uuid) -> Result<Vec<Uuid>, ServiceError> {
        let ids = machine_sector::Entity::find()
            .select_only()
            .column(machine_sector::Column::SectorId)
            .filter(machine_sector::Column::MachineId.eq(machine_id))
            .into_tuple::<Uuid>()
            .all(&*self.db)
            .await?;
        Ok(ids)
    }

    /// Deduplicates `ids` and checks every sector exists.
    async fn existing_sectors(&self, ids: &[Uuid]) -> Result<Vec<Uuid>, ServiceError> {
        let unique: Vec<Uuid> = ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        if unique.is_empty() {
            return Ok(unique);
        }
        let found = sector::Entity::find()
            .filter(sector::Column::Id.is_in(unique.clone()))
            .count(&*self.db)
            .await?;
        if found != unique.len() as u64 {
            return Err(ServiceError::NotFound(
                "One or more sectors do not exist".to_string(),
            ));
        }
        Ok(unique)
    }
}

async fn replace_membership<C>(
    conn: &C,
    machine_id: Uuid,
    sector_ids: &[Uuid],
) -> Result<(), ServiceError>
where
    C: sea_orm::ConnectionTrait,
{
    machine_sector::Entity::delete_many()
        .filter(machine_sector::Column::MachineId.eq(machine_id))
        .exec(conn)
        .await?;
    if sector_ids.is_empty() {
        return Ok(());
    }
    let rows = sector_ids.iter().map(|sector_id| machine_sector::ActiveModel {
        machine_id: Set(machine_id),
        sector_id: Set(*sector_id),
    });
    machine_sector::Entity::insert_many(rows).exec(conn).await?;
    Ok(())
}
