use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set, SqlErr};
use serde::Serialize;
use strum::Display;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{normalize_optional, orders::none_stage_id};
use crate::{
    db::DbPool,
    entities::{
        product,
        production_order::{self, OrderSource, OrderStatus},
    },
    erp::{ErpOrder, OrderFeed},
    errors::ServiceError,
    events::{Event, EventSender},
    tracing::with_timing,
};

/// Outcome of one import run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ImportSummary {
    pub fetched: u64,
    pub inserted: u64,
    pub skipped_existing: u64,
    pub failed: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Who asked for the import; only used for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ImportTrigger {
    Manual,
    Cron,
    Cli,
}

#[derive(Debug, PartialEq, Eq)]
enum RecordOutcome {
    Inserted(Uuid),
    SkippedExisting,
    Failed,
}

/// Pulls released orders from the ERP and inserts the ones not yet known.
#[derive(Clone)]
pub struct OrderImportService {
    db: Arc<DbPool>,
    feed: Option<Arc<dyn OrderFeed>>,
    event_sender: Arc<EventSender>,
    running: Arc<Mutex<()>>,
}

impl OrderImportService {
    /// `feed` is `None` when the ERP is not configured; runs then fail with 502.
    pub fn new(
        db: Arc<DbPool>,
        feed: Option<Arc<dyn OrderFeed>>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            feed,
            event_sender,
            running: Arc::new(Mutex::new(())),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.feed.is_some()
    }

    /// Runs one import. A second call while one is in flight gets 409.
    #[instrument(skip(self))]
    pub async fn run(&self, trigger: ImportTrigger) -> Result<ImportSummary, ServiceError> {
        let _guard = self.running.try_lock().map_err(|_| {
            counter!("shopfloor.orders.import_rejected", 1);
            ServiceError::Conflict("An order import is already running".into())
        })?;
        let feed = self.feed.as_ref().ok_or_else(|| {
            ServiceError::ExternalServiceError("ERP integration is not configured".into())
        })?;

        let started_at = Utc::now();
        info!(%trigger, "order import started");

        let records = with_timing("erp.fetch_orders", || feed.fetch_orders()).await?;
        let stage_id = none_stage_id(&*self.db).await?;

        let mut summary = ImportSummary {
            fetched: u64::try_from(records.len()).unwrap_or(u64::MAX),
            inserted: 0,
            skipped_existing: 0,
            failed: 0,
            started_at,
            finished_at: started_at,
        };
        for record in &records {
            match self.import_one(record, stage_id).await {
                RecordOutcome::Inserted(id) => {
                    summary.inserted += 1;
                    self.event_sender.send_or_log(Event::OrderCreated(id)).await;
                }
                RecordOutcome::SkippedExisting => summary.skipped_existing += 1,
                RecordOutcome::Failed => summary.failed += 1,
            }
        }
        summary.finished_at = Utc::now();

        counter!("shopfloor.orders.imported", summary.inserted, "trigger" => trigger.to_string());
        counter!("shopfloor.orders.created", summary.inserted, "source" => "erp");
        if summary.failed > 0 {
            counter!("shopfloor.orders.import_failed", summary.failed);
        }
        info!(
            %trigger,
            fetched = summary.fetched,
            inserted = summary.inserted,
            skipped_existing = summary.skipped_existing,
            failed = summary.failed,
            "order import finished"
        );
        self.event_sender
            .send_or_log(Event::OrdersImported {
                inserted: summary.inserted,
                skipped_existing: summary.skipped_existing,
                failed: summary.failed,
            })
            .await;
        Ok(summary)
    }

    async fn import_one(&self, record: &ErpOrder, stage_id: Uuid) -> RecordOutcome {
        let number = record.number;
        if let Err(reason) = check_record(record) {
            warn!(number, reason, "ERP order rejected");
            return RecordOutcome::Failed;
        }

        let existing = production_order::Entity::find()
            .filter(production_order::Column::Number.eq(number))
            .count(&*self.db)
            .await;
        match existing {
            Ok(0) => {}
            Ok(_) => return RecordOutcome::SkippedExisting,
            Err(e) => {
                warn!(number, error = %e, "order lookup failed");
                return RecordOutcome::Failed;
            }
        }

        let product_code = record.product_code.trim().to_string();
        let product_id = match product::Entity::find()
            .filter(product::Column::Code.eq(product_code.as_str()))
            .one(&*self.db)
            .await
        {
            Ok(found) => found.map(|p| p.id),
            Err(e) => {
                warn!(number, error = %e, "product lookup failed");
                return RecordOutcome::Failed;
            }
        };
        if product_id.is_none() {
            debug!(number, product_code = %product_code, "product not registered, keeping code only");
        }

        let inserted = production_order::ActiveModel {
            number: Set(number),
            product_id: Set(product_id),
            product_code: Set(Some(product_code)),
            description: Set(normalize_optional(record.description.clone())),
            status: Set(OrderStatus::Open),
            stage_id: Set(Some(stage_id)),
            machine_id: Set(None),
            quantity_programmed: Set(record.quantity_programmed.unwrap_or(0)),
            quantity_loaded: Set(record.quantity_loaded.unwrap_or(0)),
            quantity_produced: Set(0),
            cancellation_reason_id: Set(None),
            source: Set(OrderSource::Erp),
            ..Default::default()
        }
        .insert(&*self.db)
        .await;

        match inserted {
            Ok(order) => RecordOutcome::Inserted(order.id),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                debug!(number, "order inserted concurrently");
                RecordOutcome::SkippedExisting
            }
            Err(e) => {
                warn!(number, error = %e, "order insert failed");
                RecordOutcome::Failed
            }
        }
    }
}

fn check_record(record: &ErpOrder) -> Result<(), &'static str> {
    if record.number <= 0 {
        return Err("order number must be positive");
    }
    let code = record.product_code.trim();
    if code.is_empty() {
        return Err("product reference is empty");
    }
    if code.chars().count() > 50 {
        return Err("product reference is too long");
    }
    if record.quantity_programmed.is_some_and(|q| q < 0)
        || record.quantity_loaded.is_some_and(|q| q < 0)
    {
        return Err("negative quantity");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{establish_connection_with_config, run_migrations, DbConfig};
    use crate::erp::ErpError;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use tokio::sync::{mpsc, Notify};

    struct FixedFeed(Vec<ErpOrder>);

    #[async_trait]
    impl OrderFeed for FixedFeed {
        async fn fetch_orders(&self) -> Result<Vec<ErpOrder>, ErpError> {
            Ok(self.0.clone())
        }
    }

    struct FailingFeed;

    #[async_trait]
    impl OrderFeed for FailingFeed {
        async fn fetch_orders(&self) -> Result<Vec<ErpOrder>, ErpError> {
            Err(ErpError::Token("HTTP 401: invalid_client".into()))
        }
    }

    /// Blocks until released, so a second run can overlap the first.
    struct GatedFeed {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl OrderFeed for GatedFeed {
        async fn fetch_orders(&self) -> Result<Vec<ErpOrder>, ErpError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(Vec::new())
        }
    }

    fn erp_order(number: i64, code: &str) -> ErpOrder {
        ErpOrder {
            number,
            product_code: code.into(),
            description: Some("Malha jersey".into()),
            quantity_programmed: Some(1200),
            quantity_loaded: None,
        }
    }

    async fn service(feed: Option<Arc<dyn OrderFeed>>) -> (OrderImportService, Arc<DbPool>) {
        let db = establish_connection_with_config(&DbConfig::sqlite_in_memory())
            .await
            .unwrap();
        run_migrations(&db).await.unwrap();
        let db = Arc::new(db);
        let (tx, _rx) = mpsc::channel(64);
        let events = Arc::new(EventSender::new(tx));
        (OrderImportService::new(db.clone(), feed, events), db)
    }

    #[test]
    fn malformed_records_are_refused() {
        assert!(check_record(&erp_order(8209, "REF-77")).is_ok());
        assert!(check_record(&erp_order(0, "REF-77")).is_err());
        assert!(check_record(&erp_order(8209, "  ")).is_err());
        let mut negative = erp_order(8209, "REF-77");
        negative.quantity_loaded = Some(-1);
        assert!(check_record(&negative).is_err());
    }

    #[tokio::test]
    async fn importing_twice_keeps_one_row_per_number() {
        let feed: Arc<dyn OrderFeed> = Arc::new(FixedFeed(vec![
            erp_order(8209, "REF-77"),
            erp_order(8210, "REF-78"),
            erp_order(-1, "BAD"),
        ]));
        let (imports, db) = service(Some(feed)).await;

        let first = imports.run(ImportTrigger::Manual).await.unwrap();
        assert_eq!(first.fetched, 3);
        assert_eq!(first.inserted, 2);
        assert_eq!(first.failed, 1);

        let second = imports.run(ImportTrigger::Cron).await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped_existing, 2);

        let rows = production_order::Entity::find()
            .filter(production_order::Column::Number.eq(8209))
            .all(&*db)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, OrderStatus::Open);
        assert_eq!(rows[0].source, OrderSource::Erp);
        assert_eq!(rows[0].product_id, None);
        assert_eq!(rows[0].product_code.as_deref(), Some("REF-77"));
        assert_eq!(rows[0].quantity_programmed, 1200);
        assert_eq!(rows[0].stage_id, Some(none_stage_id(&*db).await.unwrap()));
    }

    #[tokio::test]
    async fn known_products_are_linked() {
        let feed: Arc<dyn OrderFeed> = Arc::new(FixedFeed(vec![erp_order(500, "REF-77")]));
        let (imports, db) = service(Some(feed)).await;
        let registered = product::ActiveModel {
            code: Set("REF-77".into()),
            description: Set("Malha".into()),
            ..Default::default()
        }
        .insert(&*db)
        .await
        .unwrap();

        imports.run(ImportTrigger::Cli).await.unwrap();
        let order = production_order::Entity::find()
            .filter(production_order::Column::Number.eq(500))
            .one(&*db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.product_id, Some(registered.id));
    }

    #[tokio::test]
    async fn feed_failure_aborts_with_bad_gateway() {
        let (imports, _db) = service(Some(Arc::new(FailingFeed))).await;
        assert_matches!(
            imports.run(ImportTrigger::Manual).await,
            Err(ServiceError::ExternalServiceError(_))
        );
    }

    #[tokio::test]
    async fn unconfigured_feed_is_bad_gateway() {
        let (imports, _db) = service(None).await;
        assert!(!imports.is_configured());
        assert_matches!(
            imports.run(ImportTrigger::Manual).await,
            Err(ServiceError::ExternalServiceError(_))
        );
    }

    #[tokio::test]
    async fn overlapping_runs_conflict() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let feed: Arc<dyn OrderFeed> = Arc::new(GatedFeed {
            entered: entered.clone(),
            release: release.clone(),
        });
        let (imports, _db) = service(Some(feed)).await;

        let background = imports.clone();
        let first = tokio::spawn(async move { background.run(ImportTrigger::Cron).await });
        entered.notified().await;

        assert_matches!(
            imports.run(ImportTrigger::Manual).await,
            Err(ServiceError::Conflict(_))
        );

        release.notify_one();
        assert!(first.await.unwrap().is_ok());
    }
}
