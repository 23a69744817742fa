pub mod areas;
pub mod cancellation_reasons;
pub mod common;
pub mod cron;
pub mod dashboard;
pub mod deep_links;
pub mod health;
pub mod machines;
pub mod orders;
pub mod products;
pub mod sectors;
pub mod stages;
pub mod stoppage_reasons;
pub mod time_entries;
pub mod users;

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::erp::{ErpClient, OrderFeed};
use crate::events::EventSender;
use crate::services::{
    catalog::CatalogService, dashboard::DashboardService, deep_links::DeepLinkService,
    order_import::OrderImportService, orders::OrderService, plant::PlantService,
    tracking::TrackingService, users::UserService,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub plant: Arc<PlantService>,
    pub catalog: Arc<CatalogService>,
    pub users: Arc<UserService>,
    pub orders: Arc<OrderService>,
    pub order_import: Arc<OrderImportService>,
    pub tracking: Arc<TrackingService>,
    pub dashboard: Arc<DashboardService>,
    pub deep_links: Arc<DeepLinkService>,
}

impl AppServices {
    /// Builds every service. The ERP feed is left out when the ERP settings
    /// are incomplete; imports then answer 502.
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, config: &AppConfig) -> Self {
        let feed: Option<Arc<dyn OrderFeed>> = if config.erp.is_configured() {
            match ErpClient::from_config(&config.erp) {
                Ok(client) => {
                    info!("ERP order import enabled");
                    Some(Arc::new(client))
                }
                Err(e) => {
                    warn!(error = %e, "ERP client could not be built; order import disabled");
                    None
                }
            }
        } else {
            info!("ERP not configured; order import disabled");
            None
        };
        Self::with_order_feed(db_pool, event_sender, config, feed)
    }

    /// Same as [`AppServices::new`] with an explicit order feed.
    pub fn with_order_feed(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        config: &AppConfig,
        feed: Option<Arc<dyn OrderFeed>>,
    ) -> Self {
        Self {
            plant: Arc::new(PlantService::new(db_pool.clone())),
            catalog: Arc::new(CatalogService::new(db_pool.clone())),
            users: Arc::new(UserService::new(db_pool.clone())),
            orders: Arc::new(OrderService::new(db_pool.clone(), event_sender.clone())),
            order_import: Arc::new(OrderImportService::new(
                db_pool.clone(),
                feed,
                event_sender.clone(),
            )),
            tracking: Arc::new(TrackingService::new(db_pool.clone(), event_sender)),
            dashboard: Arc::new(DashboardService::new(db_pool.clone())),
            deep_links: Arc::new(DeepLinkService::new(
                db_pool,
                config.public_base_url.clone(),
            )),
        }
    }
}
