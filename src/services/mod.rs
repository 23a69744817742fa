use sea_orm::{EntityTrait, FromQueryResult, PaginatorTrait, Select};
use validator::ValidationError;

use crate::{db::DbPool, errors::ServiceError, PaginatedResponse};

// Reference data
pub mod catalog;
pub mod plant;
pub mod users;

// Orders and ERP ingestion
pub mod order_import;
pub mod orders;

// Shop-floor tracking
pub mod tracking;

// Read models
pub mod dashboard;
pub mod deep_links;

/// Runs `select` as one page of `limit` rows. `page` is 1-based.
pub(crate) async fn fetch_page<E>(
    select: Select<E>,
    db: &DbPool,
    page: u64,
    limit: u64,
) -> Result<PaginatedResponse<E::Model>, ServiceError>
where
    E: EntityTrait,
    E::Model: FromQueryResult + Sized + Send + Sync,
{
    let paginator = select.paginate(db, limit);
    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(page.saturating_sub(1)).await?;
    Ok(PaginatedResponse::new(items, total, page, limit))
}

/// Rejects strings made only of whitespace.
pub(crate) fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must not be blank".into());
        return Err(err);
    }
    Ok(())
}

/// Trims an optional free-text field, mapping empty input to `None`.
pub(crate) fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_strings_are_rejected() {
        assert!(not_blank("Tecelagem").is_ok());
        assert!(not_blank("   ").is_err());
        assert!(not_blank("").is_err());
    }

    #[test]
    fn optional_text_is_trimmed() {
        assert_eq!(normalize_optional(Some("  x ".into())), Some("x".into()));
        assert_eq!(normalize_optional(Some("   ".into())), None);
        assert_eq!(normalize_optional(None), None);
    }
}
