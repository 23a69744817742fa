#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use shopfloor_api::{
    config::AppConfig,
    db::{self, DbConfig},
    entities::user::UserRole,
    erp::OrderFeed,
    events::{self, EventSender},
    handlers::AppServices,
    services::users::CreateUserRequest,
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

pub const JWT_SECRET: &str =
    "q8W2zLr7Tn4Yk1Vb9Xc3Hs6Jd0Mf5Gp2Ae8Ru7Iy4Ot1Kl6Zx3Cv9Bn0Mq5Wd2Es7Rf4Tg1Yh8Uj";
pub const CRON_SECRET: &str = "cron-test-secret";
pub const ADMIN_MATRICULA: &str = "9001";
pub const ADMIN_PASSWORD: &str = "admin-pass-123";
pub const OPERATOR_MATRICULA: &str = "1042";

/// The full application on a private in-memory SQLite database, with one
/// administrator and one operator already signed in.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub admin_id: Uuid,
    pub operator_id: Uuid,
    admin_token: String,
    operator_token: String,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::build(|_| {}, None).await
    }

    /// Imports read from the given feed instead of a real ERP.
    pub async fn with_feed(feed: Arc<dyn OrderFeed>) -> Self {
        Self::build(|_| {}, Some(feed)).await
    }

    /// Lets a test adjust configuration, e.g. point the ERP at a mock server.
    pub async fn with_config(configure: impl FnOnce(&mut AppConfig)) -> Self {
        Self::build(configure, None).await
    }

    async fn build(
        configure: impl FnOnce(&mut AppConfig),
        feed: Option<Arc<dyn OrderFeed>>,
    ) -> Self {
        let pool = db::establish_connection_with_config(&DbConfig::sqlite_in_memory())
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db = Arc::new(pool);

        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            JWT_SECRET.to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.cron_secret = Some(CRON_SECRET.to_string());
        configure(&mut cfg);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = match feed {
            Some(feed) => {
                AppServices::with_order_feed(db.clone(), event_sender.clone(), &cfg, Some(feed))
            }
            None => AppServices::new(db.clone(), event_sender.clone(), &cfg),
        };
        let state = AppState::with_services(db, cfg, event_sender, services);

        let admin = state
            .services
            .users
            .create_user(CreateUserRequest {
                matricula: ADMIN_MATRICULA.into(),
                name: "Supervisor".into(),
                role: UserRole::Admin,
                password: Some(ADMIN_PASSWORD.into()),
                active: None,
            })
            .await
            .expect("seed admin");
        let operator = state
            .services
            .users
            .create_user(CreateUserRequest {
                matricula: OPERATOR_MATRICULA.into(),
                name: "Operator".into(),
                role: UserRole::Operator,
                password: None,
                active: None,
            })
            .await
            .expect("seed operator");

        let router = shopfloor_api::app(state.clone(), CorsLayer::permissive());

        let mut app = Self {
            router,
            state,
            admin_id: admin.id,
            operator_id: operator.id,
            admin_token: String::new(),
            operator_token: String::new(),
            _event_task: event_task,
        };
        app.admin_token = app.login(ADMIN_MATRICULA, Some(ADMIN_PASSWORD)).await;
        app.operator_token = app.login(OPERATOR_MATRICULA, None).await;
        app
    }

    /// Signs in through the HTTP API and returns the bearer token.
    pub async fn login(&self, matricula: &str, password: Option<&str>) -> String {
        let response = self
            .request(
                Method::POST,
                "/api/v1/auth/login",
                Some(json!({ "matricula": matricula, "password": password })),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK, "login failed for {matricula}");
        let body = body_json(response).await;
        body["data"]["access_token"]
            .as_str()
            .expect("access token in login response")
            .to_string()
    }

    pub fn admin_token(&self) -> &str {
        &self.admin_token
    }

    pub fn operator_token(&self) -> &str {
        &self.operator_token
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn as_admin(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        self.request(method, uri, body, Some(self.admin_token())).await
    }

    pub async fn as_operator(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        self.request(method, uri, body, Some(self.operator_token()))
            .await
    }

    /// Admin request that must answer `expected`; returns the `data` field.
    pub async fn admin_expect(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        expected: StatusCode,
    ) -> Value {
        let response = self.as_admin(method.clone(), uri, body).await;
        let status = response.status();
        let body = body_json(response).await;
        assert_eq!(status, expected, "{method} {uri} answered {body}");
        body["data"].clone()
    }

    pub async fn create_machine(&self, code: &str) -> Value {
        self.admin_expect(
            Method::POST,
            "/api/v1/machines",
            Some(json!({ "code": code, "name": format!("Machine {code}") })),
            StatusCode::CREATED,
        )
        .await
    }

    pub async fn create_stoppage_reason(&self, code: &str) -> Value {
        self.admin_expect(
            Method::POST,
            "/api/v1/stoppage-reasons",
            Some(json!({ "code": code, "description": format!("Reason {code}") })),
            StatusCode::CREATED,
        )
        .await
    }

    pub async fn create_order(&self, number: i64) -> Value {
        self.admin_expect(
            Method::POST,
            "/api/v1/orders",
            Some(json!({ "number": number, "product_code": "PRD-1", "quantity_programmed": 100 })),
            StatusCode::CREATED,
        )
        .await
    }

    pub async fn create_stage(&self, code: &str, sequence: i32) -> Value {
        self.admin_expect(
            Method::POST,
            "/api/v1/stages",
            Some(json!({
                "code": code,
                "name": format!("Stage {code}"),
                "sequence": sequence,
                "color": "#1E88E5"
            })),
            StatusCode::CREATED,
        )
        .await
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).expect("response body is JSON")
}

pub fn id_of(value: &Value) -> String {
    value["id"].as_str().expect("id field").to_string()
}
