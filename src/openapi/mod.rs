use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Shopfloor API",
        version = "1.0.0",
        description = r#"
# Shopfloor production tracking API

Tracks production orders through the plant: which machine runs which order,
for how long, and why machines stop.

## Authentication

Sign in at `/api/v1/auth/login` with a matricula (operators) or matricula and
password (administrators). Send the returned token as

```
Authorization: Bearer <token>
```

or rely on the session cookie set by the login response.

## Pagination

List endpoints accept `page` (default 1), `limit` (clamped to the configured
maximum) and `search`.
        "#
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "auth", description = "Sessions"),
        (name = "plant", description = "Areas, sectors and machines"),
        (name = "catalog", description = "Stages, products and reasons"),
        (name = "users", description = "Operators and administrators"),
        (name = "orders", description = "Production orders and ERP import"),
        (name = "tracking", description = "Production and stoppage time entries"),
        (name = "dashboard", description = "Plant counters"),
        (name = "deep-links", description = "Scannable links to machines, orders and operators")
    ),
    paths(
        crate::auth::login_handler,
        crate::auth::logout_handler,
        crate::auth::me_handler,

        crate::handlers::areas::list_areas,
        crate::handlers::areas::get_area,
        crate::handlers::areas::create_area,
        crate::handlers::areas::update_area,
        crate::handlers::areas::delete_area,
        crate::handlers::sectors::list_sectors,
        crate::handlers::sectors::get_sector,
        crate::handlers::sectors::create_sector,
        crate::handlers::sectors::update_sector,
        crate::handlers::sectors::delete_sector,
        crate::handlers::machines::list_machines,
        crate::handlers::machines::get_machine,
        crate::handlers::machines::create_machine,
        crate::handlers::machines::update_machine,
        crate::handlers::machines::delete_machine,

        crate::handlers::stages::list_stages,
        crate::handlers::stages::get_stage,
        crate::handlers::stages::create_stage,
        crate::handlers::stages::update_stage,
        crate::handlers::stages::delete_stage,
        crate::handlers::stoppage_reasons::list_stoppage_reasons,
        crate::handlers::stoppage_reasons::get_stoppage_reason,
        crate::handlers::stoppage_reasons::create_stoppage_reason,
        crate::handlers::stoppage_reasons::update_stoppage_reason,
        crate::handlers::stoppage_reasons::delete_stoppage_reason,
        crate::handlers::cancellation_reasons::list_cancellation_reasons,
        crate::handlers::cancellation_reasons::get_cancellation_reason,
        crate::handlers::cancellation_reasons::create_cancellation_reason,
        crate::handlers::cancellation_reasons::update_cancellation_reason,
        crate::handlers::cancellation_reasons::delete_cancellation_reason,
        crate::handlers::products::list_products,
        crate::handlers::products::get_product,
        crate::handlers::products::create_product,
        crate::handlers::products::update_product,
        crate::handlers::products::delete_product,

        crate::handlers::users::list_users,
        crate::handlers::users::get_user,
        crate::handlers::users::create_user,
        crate::handlers::users::update_user,
        crate::handlers::users::delete_user,

        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::get_order_by_number,
        crate::handlers::orders::create_order,
        crate::handlers::orders::update_order,
        crate::handlers::orders::delete_order,
        crate::handlers::orders::cancel_order,
        crate::handlers::orders::import_orders,
        crate::handlers::cron::import_orders,

        crate::handlers::time_entries::list_entries,
        crate::handlers::time_entries::get_entry,
        crate::handlers::time_entries::open_entries,
        crate::handlers::time_entries::start_production,
        crate::handlers::time_entries::start_stoppage_from_entry,
        crate::handlers::time_entries::start_machine_stoppage,
        crate::handlers::time_entries::finish_entry,

        crate::handlers::dashboard::summary,
        crate::handlers::deep_links::build_link,
        crate::handlers::deep_links::resolve_link,
    ),
    components(
        schemas(
            crate::errors::ErrorResponse,
            crate::auth::LoginRequest,
            crate::auth::Session,
            crate::auth::AuthUser,

            crate::entities::area::Model,
            crate::entities::sector::Model,
            crate::entities::machine::Model,
            crate::entities::machine::MachineStatus,
            crate::entities::stage::Model,
            crate::entities::stoppage_reason::Model,
            crate::entities::cancellation_reason::Model,
            crate::entities::product::Model,
            crate::entities::user::Model,
            crate::auth::rbac::Role,
            crate::entities::production_order::Model,
            crate::entities::production_order::OrderStatus,
            crate::entities::production_order::OrderSource,
            crate::entities::time_entry::Model,
            crate::entities::time_entry::EntryKind,
            crate::entities::time_entry::EntryStatus,

            crate::services::plant::AreaRequest,
            crate::services::plant::SectorRequest,
            crate::services::plant::MachineRequest,
            crate::services::plant::MachineDetail,
            crate::services::catalog::StageRequest,
            crate::services::catalog::ReasonRequest,
            crate::services::catalog::ProductRequest,
            crate::services::users::CreateUserRequest,
            crate::services::users::UpdateUserRequest,
            crate::services::orders::CreateOrderRequest,
            crate::services::orders::UpdateOrderRequest,
            crate::services::orders::CancelOrderRequest,
            crate::services::order_import::ImportSummary,
            crate::services::tracking::StartProductionRequest,
            crate::services::tracking::StartStoppageRequest,
            crate::services::tracking::FinishEntryRequest,
            crate::services::tracking::TrackingResult,
            crate::services::tracking::OpenEntries,
            crate::services::dashboard::DashboardSummary,
            crate::services::dashboard::MachineCounts,
            crate::services::deep_links::DeepLink,
            crate::services::deep_links::DeepLinkKind,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

/// Registers the `Bearer` scheme referenced by the protected paths
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "Bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
