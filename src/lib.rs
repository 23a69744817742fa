//! Shop-floor production tracking API
//!
//! Records production orders, machine states and operator time entries,
//! keeps the plant's reference data and imports released orders from the ERP.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod erp;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod models;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    extract::{DefaultBodyLimit, Extension},
    http::HeaderValue,
    routing::{delete, get, post, put},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};
use utoipa::{IntoParams, ToSchema};

use crate::auth::consts as perm;
use crate::auth::{AuthRouterExt, AuthService};
use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: Arc<AppConfig>,
    pub event_sender: Arc<EventSender>,
    pub services: handlers::AppServices,
    pub auth: Arc<AuthService>,
}

impl AppState {
    /// Wires every service from a pool and configuration.
    pub fn new(db: Arc<DbPool>, config: AppConfig, event_sender: Arc<EventSender>) -> Self {
        let services = handlers::AppServices::new(db.clone(), event_sender.clone(), &config);
        Self::with_services(db, config, event_sender, services)
    }

    /// Same as [`AppState::new`] with services built by the caller.
    pub fn with_services(
        db: Arc<DbPool>,
        config: AppConfig,
        event_sender: Arc<EventSender>,
        services: handlers::AppServices,
    ) -> Self {
        let auth = Arc::new(AuthService::new(
            auth::AuthConfig::from_app_config(&config),
            db.clone(),
        ));
        Self {
            db,
            config: Arc::new(config),
            event_sender,
            services,
            auth,
        }
    }

    /// `(page, limit)` for a list request, clamped to the configured maximum.
    pub fn page_params(&self, query: &ListQuery) -> (u64, u64) {
        handlers::common::clamp_page(
            query.page.unwrap_or(1),
            query.limit.unwrap_or(self.config.api_default_page_size),
            self.config.api_max_page_size,
        )
    }
}

// Common query parameters for list endpoints
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// Page number, starting at 1
    pub page: Option<u64>,
    /// Items per page
    pub limit: Option<u64>,
    /// Free-text filter
    pub search: Option<String>,
}

// Common response wrappers
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, limit: u64) -> Self {
        let total_pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        Self {
            items,
            total,
            page,
            limit,
            total_pages,
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<axum::Json<ApiResponse<T>>, errors::ServiceError>;

pub fn api_v1_routes() -> Router<AppState> {
    use handlers::{
        areas, cancellation_reasons, dashboard, deep_links, machines, orders, products, sectors,
        stages, stoppage_reasons, time_entries, users,
    };

    let reference_read = Router::new()
        .route("/areas", get(areas::list_areas))
        .route("/areas/:id", get(areas::get_area))
        .route("/sectors", get(sectors::list_sectors))
        .route("/sectors/:id", get(sectors::get_sector))
        .route("/machines", get(machines::list_machines))
        .route("/machines/:id", get(machines::get_machine))
        .route("/stages", get(stages::list_stages))
        .route("/stages/:id", get(stages::get_stage))
        .route("/stoppage-reasons", get(stoppage_reasons::list_stoppage_reasons))
        .route("/stoppage-reasons/:id", get(stoppage_reasons::get_stoppage_reason))
        .route(
            "/cancellation-reasons",
            get(cancellation_reasons::list_cancellation_reasons),
        )
        .route(
            "/cancellation-reasons/:id",
            get(cancellation_reasons::get_cancellation_reason),
        )
        .route("/products", get(products::list_products))
        .route("/products/:id", get(products::get_product))
        .with_permission(perm::REFERENCE_READ);

    let reference_write = Router::new()
        .route("/areas", post(areas::create_area))
        .route("/areas/:id", put(areas::update_area).delete(areas::delete_area))
        .route("/sectors", post(sectors::create_sector))
        .route(
            "/sectors/:id",
            put(sectors::update_sector).delete(sectors::delete_sector),
        )
        .route("/machines", post(machines::create_machine))
        .route(
            "/machines/:id",
            put(machines::update_machine).delete(machines::delete_machine),
        )
        .route("/stages", post(stages::create_stage))
        .route("/stages/:id", put(stages::update_stage).delete(stages::delete_stage))
        .route(
            "/stoppage-reasons",
            post(stoppage_reasons::create_stoppage_reason),
        )
        .route(
            "/stoppage-reasons/:id",
            put(stoppage_reasons::update_stoppage_reason)
                .delete(stoppage_reasons::delete_stoppage_reason),
        )
        .route(
            "/cancellation-reasons",
            post(cancellation_reasons::create_cancellation_reason),
        )
        .route(
            "/cancellation-reasons/:id",
            put(cancellation_reasons::update_cancellation_reason)
                .delete(cancellation_reasons::delete_cancellation_reason),
        )
        .route("/products", post(products::create_product))
        .route(
            "/products/:id",
            put(products::update_product).delete(products::delete_product),
        )
        .with_permission(perm::REFERENCE_WRITE);

    let users_admin = Router::new()
        .route("/users", get(users::list_users).post(users::create_user))
        .route(
            "/users/:id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .with_permission(perm::USERS_MANAGE);

    let orders_read = Router::new()
        .route("/orders", get(orders::list_orders))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/by-number/:number", get(orders::get_order_by_number))
        .with_permission(perm::ORDERS_READ);

    let orders_write = Router::new()
        .route("/orders", post(orders::create_order))
        .route("/orders/:id", put(orders::update_order))
        .route("/orders/:id", delete(orders::delete_order))
        .route("/orders/:id/cancel", post(orders::cancel_order))
        .with_permission(perm::ORDERS_WRITE);

    let orders_import = Router::new()
        .route("/orders/import", post(orders::import_orders))
        .with_permission(perm::ORDERS_IMPORT);

    let tracking_read = Router::new()
        .route("/time-entries", get(time_entries::list_entries))
        .route("/time-entries/:id", get(time_entries::get_entry))
        .route("/machines/:id/open-entries", get(time_entries::open_entries))
        .with_permission(perm::TRACKING_READ);

    let tracking_write = Router::new()
        .route(
            "/time-entries/production",
            post(time_entries::start_production),
        )
        .route(
            "/time-entries/:id/stoppages",
            post(time_entries::start_stoppage_from_entry),
        )
        .route(
            "/machines/:id/stoppages",
            post(time_entries::start_machine_stoppage),
        )
        .route("/time-entries/:id/finish", post(time_entries::finish_entry))
        .with_permission(perm::TRACKING_WRITE);

    let dashboard = Router::new()
        .route("/dashboard/summary", get(dashboard::summary))
        .with_permission(perm::DASHBOARD_READ);

    let deep_links = Router::new()
        .route("/deep-links/resolve", get(deep_links::resolve_link))
        .route("/deep-links/:kind/:id", get(deep_links::build_link))
        .with_auth();

    Router::new()
        .merge(handlers::health::health_routes())
        .route("/cron/import-orders", post(handlers::cron::import_orders))
        .merge(reference_read)
        .merge(reference_write)
        .merge(users_admin)
        .merge(orders_read)
        .merge(orders_write)
        .merge(orders_import)
        .merge(tracking_read)
        .merge(tracking_write)
        .merge(dashboard)
        .merge(deep_links)
}

/// Builds the CORS layer from configuration.
pub fn cors_layer(cfg: &AppConfig) -> Result<CorsLayer, String> {
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .filter_map(|origin| HeaderValue::from_str(origin).ok())
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    if let Some(origins) = configured_origins {
        let layer = CorsLayer::new().allow_origin(origins);
        // credentials cannot be combined with wildcard methods/headers
        return Ok(if cfg.cors_allow_credentials {
            layer
                .allow_methods(tower_http::cors::AllowMethods::mirror_request())
                .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
                .allow_credentials(true)
        } else {
            layer.allow_methods(Any).allow_headers(Any)
        });
    }
    if cfg.should_allow_permissive_cors() {
        ::tracing::info!(
            "Using permissive CORS because explicit origins were not configured ({})",
            if cfg.is_development() {
                "development environment"
            } else {
                "explicit override enabled"
            }
        );
        return Ok(CorsLayer::permissive());
    }
    Err("Missing CORS configuration: set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true".into())
}

/// The complete HTTP application: `/api/v1`, auth, Swagger UI and the
/// shared middleware stack.
pub fn app(state: AppState, cors: CorsLayer) -> Router {
    let auth_service = state.auth.clone();
    let request_timeout = state.config.request_timeout();

    Router::new()
        .route("/", get(|| async { "shopfloor-api up" }))
        .nest(
            "/api/v1/auth",
            auth::auth_routes().with_state(auth_service.clone()),
        )
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_ui())
        .fallback(|| async { errors::ServiceError::NotFound("route".into()) })
        .layer(DefaultBodyLimit::max(1024 * 1024))
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(cors)
        // auth middleware reads the service from request extensions
        .layer(Extension(auth_service))
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[tokio::test]
    async fn error_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-err"), async {
                ApiResponse::<()>::error("oops".into())
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-err"));
        assert!(!response.success);
    }

    #[test]
    fn total_pages_rounds_up() {
        let page = PaginatedResponse::new(vec![1, 2], 41, 1, 20);
        assert_eq!(page.total_pages, 3);
        assert_eq!(PaginatedResponse::<u8>::new(vec![], 0, 1, 20).total_pages, 0);
    }
}
