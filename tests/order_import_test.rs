mod common;

use axum::http::{Method, StatusCode};
use common::{body_json, TestApp, CRON_SECRET};
use serde_json::json;
use shopfloor_api::config::ErpConfig;
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

async fn app_against(server: &MockServer) -> TestApp {
    let base_url = server.uri();
    TestApp::with_config(move |cfg| {
        cfg.erp = ErpConfig {
            base_url: Some(base_url),
            client_id: Some("shopfloor".into()),
            client_secret: Some("erp-secret".into()),
            ..ErpConfig::default()
        };
    })
    .await
}

async fn mount_token(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "erp-token",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn listing() -> serde_json::Value {
    json!([
        { "ordem_producao": 8209, "referencia": "CX-200", "descricao": "Caixa 200", "qtde_programada": 500 },
        { "ordem_producao": 8210, "referencia": "CX-300", "qtde_programada": 250, "qtde_carregada": 40 }
    ])
}

#[tokio::test]
async fn importing_twice_keeps_one_row_per_order() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/api/producao/ordens"))
        .and(header("authorization", "Bearer erp-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing()))
        .expect(2)
        .mount(&server)
        .await;
    let app = app_against(&server).await;

    let first = app
        .admin_expect(Method::POST, "/api/v1/orders/import", None, StatusCode::OK)
        .await;
    assert_eq!(first["fetched"], 2);
    assert_eq!(first["inserted"], 2);
    assert_eq!(first["skipped_existing"], 0);

    let second = app
        .admin_expect(Method::POST, "/api/v1/orders/import", None, StatusCode::OK)
        .await;
    assert_eq!(second["inserted"], 0);
    assert_eq!(second["skipped_existing"], 2);

    let orders = app
        .admin_expect(Method::GET, "/api/v1/orders", None, StatusCode::OK)
        .await;
    assert_eq!(orders["total"], 2);

    let order = app
        .admin_expect(
            Method::GET,
            "/api/v1/orders/by-number/8210",
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(order["product_code"], "CX-300");
    assert_eq!(order["quantity_programmed"], 250);
    assert_eq!(order["quantity_loaded"], 40);
    assert_eq!(order["status"], "OPEN");
}

#[tokio::test]
async fn cron_trigger_needs_the_shared_secret() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/api/producao/ordens"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing()))
        .expect(1)
        .mount(&server)
        .await;
    let app = app_against(&server).await;

    let missing = app
        .request(Method::POST, "/api/v1/cron/import-orders", None, None)
        .await;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let wrong = app
        .request(
            Method::POST,
            "/api/v1/cron/import-orders",
            None,
            Some("not-the-secret"),
        )
        .await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    // a user session is not the cron secret
    let session = app
        .request(
            Method::POST,
            "/api/v1/cron/import-orders",
            None,
            Some(app.admin_token()),
        )
        .await;
    assert_eq!(session.status(), StatusCode::UNAUTHORIZED);

    let ok = app
        .request(
            Method::POST,
            "/api/v1/cron/import-orders",
            None,
            Some(CRON_SECRET),
        )
        .await;
    assert_eq!(ok.status(), StatusCode::OK);
    assert_eq!(body_json(ok).await["data"]["inserted"], 2);
}

#[tokio::test]
async fn erp_failure_is_a_bad_gateway() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/api/producao/ordens"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;
    let app = app_against(&server).await;

    let response = app
        .as_admin(Method::POST, "/api/v1/orders/import", None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let orders = app
        .admin_expect(Method::GET, "/api/v1/orders", None, StatusCode::OK)
        .await;
    assert_eq!(orders["total"], 0);
}

#[tokio::test]
async fn unconfigured_erp_is_a_bad_gateway() {
    let app = TestApp::new().await;
    let response = app
        .as_admin(Method::POST, "/api/v1/orders/import", None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn operators_cannot_trigger_imports() {
    let app = TestApp::new().await;
    let response = app
        .as_operator(Method::POST, "/api/v1/orders/import", None)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
