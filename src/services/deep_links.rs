//! QR deep links printed on machines, order travellers and badges.
//!
//! Paths are `/m/{machine_uuid}`, `/op/{order_number}` and
//! `/operator/{matricula}`; the absolute form prefixes the public base URL.

use std::str::FromStr;
use std::sync::Arc;

use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::instrument;
use url::Url;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{machine, production_order, user},
    errors::ServiceError,
    services::users::MATRICULA,
};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeepLinkKind {
    Machine,
    Order,
    Operator,
}

/// A parsed deep-link path, before any database lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeepLinkTarget {
    Machine(Uuid),
    Order(i64),
    Operator(String),
}

impl DeepLinkTarget {
    pub fn kind(&self) -> DeepLinkKind {
        match self {
            DeepLinkTarget::Machine(_) => DeepLinkKind::Machine,
            DeepLinkTarget::Order(_) => DeepLinkKind::Order,
            DeepLinkTarget::Operator(_) => DeepLinkKind::Operator,
        }
    }

    pub fn path(&self) -> String {
        match self {
            DeepLinkTarget::Machine(id) => format!("/m/{id}"),
            DeepLinkTarget::Order(number) => format!("/op/{number}"),
            DeepLinkTarget::Operator(matricula) => format!("/operator/{matricula}"),
        }
    }

    /// Accepts a bare path or an absolute URL; only the path is read.
    pub fn parse(input: &str) -> Result<Self, ServiceError> {
        let input = input.trim();
        let path = match Url::parse(input) {
            Ok(url) => url.path().to_string(),
            Err(_) => input.to_string(),
        };
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let invalid = || ServiceError::BadRequest(format!("Unrecognised deep link '{input}'"));
        match segments.as_slice() {
            ["m", id] => Uuid::parse_str(id)
                .map(DeepLinkTarget::Machine)
                .map_err(|_| invalid()),
            ["op", number] => number
                .parse::<i64>()
                .ok()
                .filter(|n| *n > 0)
                .map(DeepLinkTarget::Order)
                .ok_or_else(invalid),
            ["operator", matricula] if MATRICULA.is_match(matricula) => {
                Ok(DeepLinkTarget::Operator((*matricula).to_string()))
            }
            _ => Err(invalid()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct DeepLink {
    pub kind: DeepLinkKind,
    /// Id of the linked record
    pub id: Uuid,
    pub path: String,
    pub url: String,
}

#[derive(Clone)]
pub struct DeepLinkService {
    db: Arc<DbPool>,
    public_base_url: String,
}

impl DeepLinkService {
    pub fn new(db: Arc<DbPool>, public_base_url: impl Into<String>) -> Self {
        Self {
            db,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Builds the link for a machine, order or operator id.
    #[instrument(skip(self))]
    pub async fn build(&self, kind: &str, id: Uuid) -> Result<DeepLink, ServiceError> {
        let kind = DeepLinkKind::from_str(kind)
            .map_err(|_| ServiceError::BadRequest(format!("Unknown deep link kind '{kind}'")))?;
        let target = match kind {
            DeepLinkKind::Machine => {
                machine::Entity::find_by_id(id)
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("Machine", id))?;
                DeepLinkTarget::Machine(id)
            }
            DeepLinkKind::Order => {
                let order = production_order::Entity::find_by_id(id)
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("Order", id))?;
                DeepLinkTarget::Order(order.number)
            }
            DeepLinkKind::Operator => {
                let operator = user::Entity::find_by_id(id)
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("Operator", id))?;
                DeepLinkTarget::Operator(operator.matricula)
            }
        };
        Ok(self.link(&target, id))
    }

    /// Resolves a scanned path or URL back to the record it names.
    #[instrument(skip(self))]
    pub async fn resolve(&self, path: &str) -> Result<DeepLink, ServiceError> {
        let target = DeepLinkTarget::parse(path)?;
        let id = match &target {
            DeepLinkTarget::Machine(id) => {
                machine::Entity::find_by_id(*id)
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("Machine", id))?
                    .id
            }
            DeepLinkTarget::Order(number) => {
                production_order::Entity::find()
                    .filter(production_order::Column::Number.eq(*number))
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("Order number {number}")))?
                    .id
            }
            DeepLinkTarget::Operator(matricula) => {
                user::Entity::find()
                    .filter(user::Column::Matricula.eq(matricula.as_str()))
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("Operator {matricula}")))?
                    .id
            }
        };
        Ok(self.link(&target, id))
    }

    fn link(&self, target: &DeepLinkTarget, id: Uuid) -> DeepLink {
        let path = target.path();
        DeepLink {
            kind: target.kind(),
            id,
            url: format!("{}{}", self.public_base_url, path),
            path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn paths_parse_back_to_their_target() {
        let machine = Uuid::new_v4();
        for target in [
            DeepLinkTarget::Machine(machine),
            DeepLinkTarget::Order(8209),
            DeepLinkTarget::Operator("1042".into()),
        ] {
            assert_eq!(DeepLinkTarget::parse(&target.path()).unwrap(), target);
        }
    }

    #[test]
    fn absolute_urls_are_accepted() {
        assert_eq!(
            DeepLinkTarget::parse("https://chao.example.com/op/8209").unwrap(),
            DeepLinkTarget::Order(8209)
        );
    }

    #[test]
    fn operator_links_survive_an_absolute_url() {
        let target = DeepLinkTarget::Operator("OP_1042-b".into());
        let url = format!("https://chao.example.com{}", target.path());
        assert_eq!(DeepLinkTarget::parse(&url).unwrap(), target);
    }

    #[test]
    fn malformed_links_are_bad_requests() {
        for input in [
            "/m/not-a-uuid",
            "/op/-3",
            "/op/abc",
            "/x/1",
            "/",
            "/m/1/2",
            "/operator/10%2042",
            "https://chao.example.com/operator/jo%C3%A3o",
        ] {
            assert_matches!(DeepLinkTarget::parse(input), Err(ServiceError::BadRequest(_)));
        }
    }

    #[test]
    fn kind_names_are_lowercase() {
        assert_eq!(DeepLinkKind::Operator.to_string(), "operator");
        assert_eq!(DeepLinkKind::from_str("order").unwrap(), DeepLinkKind::Order);
    }
}
