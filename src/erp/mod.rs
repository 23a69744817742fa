/*!
 * # ERP Integration
 *
 * Production orders are released in the ERP and pulled into the tracking
 * database. Access uses the OAuth2 client-credentials grant: the
 * [`TokenProvider`] fetches and caches a bearer token, and the
 * [`ErpClient`] calls the order listing endpoint with it.
 *
 * The import service only sees the [`OrderFeed`] trait, so tests can swap
 * the HTTP client for a fixed list of records.
 */

pub mod client;
pub mod token_provider;

use async_trait::async_trait;
use thiserror::Error;

use crate::errors::ServiceError;

pub use client::{ErpClient, ErpOrder};
pub use token_provider::TokenProvider;

#[derive(Error, Debug)]
pub enum ErpError {
    #[error("ERP integration is not configured")]
    NotConfigured,

    #[error("ERP token request failed: {0}")]
    Token(String),

    #[error("ERP request failed: {0}")]
    Request(String),

    #[error("ERP returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("ERP response could not be decoded: {0}")]
    Decode(String),
}

impl From<ErpError> for ServiceError {
    fn from(err: ErpError) -> Self {
        ServiceError::ExternalServiceError(err.to_string())
    }
}

/// Source of released production orders.
#[async_trait]
pub trait OrderFeed: Send + Sync {
    async fn fetch_orders(&self) -> Result<Vec<ErpOrder>, ErpError>;
}

/// Trims a response body for error messages.
pub(crate) fn truncate_body(body: &str) -> String {
    const LIMIT: usize = 300;
    match body.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn erp_failures_are_bad_gateway() {
        let err: ServiceError = ErpError::Status {
            status: 500,
            body: "boom".into(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(1000);
        assert_eq!(truncate_body(&body).len(), 303);
        assert_eq!(truncate_body("short"), "short");
    }
}
