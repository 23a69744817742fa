use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::{fetch_page, normalize_optional, not_blank};
use crate::{
    auth::password::hash_password,
    db::DbPool,
    entities::user::{self, UserRole},
    errors::ServiceError,
    PaginatedResponse,
};

/// Badge numbers end up in `/operator/{matricula}` deep links, so they stay
/// within URL-safe characters.
pub(crate) static MATRICULA: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[validate(
        length(min = 1, max = 20),
        regex(path = "MATRICULA", message = "matricula may only contain letters, digits, '-' and '_'")
    )]
    pub matricula: String,
    #[validate(length(min = 1, max = 100), custom = "not_blank")]
    pub name: String,
    pub role: UserRole,
    /// Required for administrators
    #[validate(length(min = 8, max = 128))]
    pub password: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 100), custom = "not_blank")]
    pub name: String,
    pub role: UserRole,
    /// Replaces the stored password when present
    #[validate(length(min = 8, max = 128))]
    pub password: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserFilter {
    pub role: Option<UserRole>,
    pub active: Option<bool>,
}

#[derive(Clone)]
pub struct UserService {
    db: Arc<DbPool>,
}

impl UserService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn list_users(
        &self,
        filter: UserFilter,
        search: Option<String>,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<user::Model>, ServiceError> {
        let mut query = user::Entity::find().order_by_asc(user::Column::Name);
        if let Some(role) = filter.role {
            query = query.filter(user::Column::Role.eq(role));
        }
        if let Some(active) = filter.active {
            query = query.filter(user::Column::Active.eq(active));
        }
        if let Some(term) = normalize_optional(search) {
            query = query.filter(
                Condition::any()
                    .add(user::Column::Matricula.contains(term.clone()))
                    .add(user::Column::Name.contains(term)),
            );
        }
        fetch_page(query, &self.db, page, limit).await
    }

    #[instrument(skip(self))]
    pub async fn get_user(&self, id: Uuid) -> Result<user::Model, ServiceError> {
        user::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", id))
    }

    #[instrument(skip(self))]
    pub async fn find_by_matricula(
        &self,
        matricula: &str,
    ) -> Result<Option<user::Model>, ServiceError> {
        Ok(user::Entity::find()
            .filter(user::Column::Matricula.eq(matricula.trim()))
            .one(&*self.db)
            .await?)
    }

    #[instrument(skip(self, request), fields(matricula = %request.matricula, role = %request.role))]
    pub async fn create_user(&self, request: CreateUserRequest) -> Result<user::Model, ServiceError> {
        let password_hash = match request.password.as_deref() {
            Some(password) => Some(hash_password(password)?),
            None if request.role.requires_password() => {
                return Err(ServiceError::ValidationError(
                    "Administrators must have a password".into(),
                ))
            }
            None => None,
        };

        let matricula = request.matricula.trim().to_string();
        let created = user::ActiveModel {
            matricula: Set(matricula.clone()),
            name: Set(request.name.trim().to_string()),
            role: Set(request.role),
            password_hash: Set(password_hash),
            active: Set(request.active.unwrap_or(true)),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|e| {
            ServiceError::from_db_conflict(e, format!("Matricula '{matricula}' is already registered"))
        })?;

        info!(user_id = %created.id, "user created");
        Ok(created)
    }

    #[instrument(skip(self, request))]
    pub async fn update_user(
        &self,
        id: Uuid,
        request: UpdateUserRequest,
    ) -> Result<user::Model, ServiceError> {
        let current = self.get_user(id).await?;
        let password_hash = match request.password.as_deref() {
            Some(password) => Some(hash_password(password)?),
            None => current.password_hash.clone(),
        };
        if request.role.requires_password() && password_hash.is_none() {
            return Err(ServiceError::ValidationError(
                "Administrators must have a password".into(),
            ));
        }

        let mut active: user::ActiveModel = current.into();
        active.name = Set(request.name.trim().to_string());
        active.role = Set(request.role);
        active.password_hash = Set(password_hash);
        if let Some(flag) = request.active {
            active.active = Set(flag);
        }
        Ok(active.update(&*self.db).await?)
    }

    /// Time entries recorded by the user stay, with the operator cleared.
    #[instrument(skip(self))]
    pub async fn delete_user(&self, id: Uuid, acting_user: Uuid) -> Result<(), ServiceError> {
        if id == acting_user {
            return Err(ServiceError::Conflict(
                "You cannot delete your own account".into(),
            ));
        }
        let result = user::Entity::delete_by_id(id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("User", id));
        }
        info!(user_id = %id, "user deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_passwords_are_rejected() {
        let request = CreateUserRequest {
            matricula: "1042".into(),
            name: "Ana".into(),
            role: UserRole::Admin,
            password: Some("short".into()),
            active: None,
        };
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("password"));
    }

    #[test]
    fn matricula_must_be_url_safe() {
        let request = |matricula: &str| CreateUserRequest {
            matricula: matricula.into(),
            name: "Ana".into(),
            role: UserRole::Operator,
            password: None,
            active: None,
        };
        for bad in ["10 42", "a/b", "jo\u{e3}o", "   ", ""] {
            let errors = request(bad).validate().unwrap_err();
            assert!(errors.field_errors().contains_key("matricula"), "{bad:?}");
        }
        for good in ["1042", "OP_1042-b"] {
            assert!(request(good).validate().is_ok(), "{good:?}");
        }
    }
}
