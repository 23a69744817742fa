mod common;

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use chrono::{DateTime, Utc};
use common::{body_json, id_of, TestApp};
use serde_json::{json, Value};
use shopfloor_api::erp::{ErpError, ErpOrder, OrderFeed};

struct FixedFeed(Vec<ErpOrder>);

#[async_trait]
impl OrderFeed for FixedFeed {
    async fn fetch_orders(&self) -> Result<Vec<ErpOrder>, ErpError> {
        Ok(self.0.clone())
    }
}

fn timestamp(value: &Value) -> DateTime<Utc> {
    value
        .as_str()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|at| at.with_timezone(&Utc))
        .unwrap_or_else(|| panic!("not an RFC 3339 timestamp: {value}"))
}

fn erp_order(number: i64) -> ErpOrder {
    serde_json::from_value(json!({
        "ordem_producao": number,
        "referencia": "CX-200",
        "descricao": "Caixa 200",
        "qtde_programada": 500
    }))
    .expect("valid ERP record")
}

async fn start_production(app: &TestApp, machine: &Value, order: &Value) -> Value {
    let response = app
        .as_operator(
            Method::POST,
            "/api/v1/time-entries/production",
            Some(json!({
                "machine_id": id_of(machine),
                "order_id": id_of(order),
                "stage_id": order["stage_id"],
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["data"].clone()
}

#[tokio::test]
async fn imported_order_runs_stops_and_resumes() {
    let app = TestApp::with_feed(Arc::new(FixedFeed(vec![erp_order(8209)]))).await;
    let machine = app.create_machine("M-01").await;
    let reason = app.create_stoppage_reason("SETUP").await;

    let summary = app
        .admin_expect(Method::POST, "/api/v1/orders/import", None, StatusCode::OK)
        .await;
    assert_eq!(summary["inserted"], 1);

    let order = app
        .admin_expect(
            Method::GET,
            "/api/v1/orders/by-number/8209",
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(order["status"], "OPEN");
    assert_eq!(order["source"], "ERP");

    let started = start_production(&app, &machine, &order).await;
    assert_eq!(started["machine"]["status"], "IN_PROCESS");
    assert_eq!(started["entry"]["operator_id"], app.operator_id.to_string());
    let production_id = id_of(&started["entry"]);

    let stopped = app
        .as_operator(
            Method::POST,
            &format!("/api/v1/time-entries/{production_id}/stoppages"),
            Some(json!({ "reason_id": id_of(&reason) })),
        )
        .await;
    assert_eq!(stopped.status(), StatusCode::CREATED);
    let stopped = body_json(stopped).await["data"].clone();
    assert_eq!(stopped["machine"]["status"], "STOPPED");
    assert_eq!(stopped["entry"]["order_id"], order["id"]);
    assert_eq!(stopped["entry"]["production_entry_id"], production_id.as_str());
    let stoppage_id = id_of(&stopped["entry"]);

    let open = app
        .admin_expect(
            Method::GET,
            &format!("/api/v1/machines/{}/open-entries", id_of(&machine)),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(open["production"]["id"], production_id.as_str());
    assert_eq!(open["stoppage"]["id"], stoppage_id.as_str());

    let resumed = app
        .as_operator(
            Method::POST,
            &format!("/api/v1/time-entries/{stoppage_id}/finish"),
            Some(json!({})),
        )
        .await;
    assert_eq!(resumed.status(), StatusCode::OK);
    let resumed = body_json(resumed).await["data"].clone();
    assert_eq!(resumed["machine"]["status"], "IN_PROCESS");
    assert_eq!(resumed["entry"]["status"], "FINISHED");
    assert!(timestamp(&resumed["entry"]["ended_at"]) >= timestamp(&resumed["entry"]["started_at"]));

    let open = app
        .admin_expect(
            Method::GET,
            &format!("/api/v1/machines/{}/open-entries", id_of(&machine)),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(open["production"]["id"], production_id.as_str());
    assert!(open["stoppage"].is_null());
}

#[tokio::test]
async fn finishing_production_frees_the_machine() {
    let app = TestApp::new().await;
    let machine = app.create_machine("M-02").await;
    let order = app.create_order(5001).await;

    let started = start_production(&app, &machine, &order).await;
    let entry_id = id_of(&started["entry"]);

    let finished = app
        .as_operator(
            Method::POST,
            &format!("/api/v1/time-entries/{entry_id}/finish"),
            Some(json!({ "quantity_produced": 120 })),
        )
        .await;
    assert_eq!(finished.status(), StatusCode::OK);
    let finished = body_json(finished).await["data"].clone();
    assert_eq!(finished["machine"]["status"], "AVAILABLE");
    assert_eq!(finished["entry"]["quantity_produced"], 120);

    let order = app
        .admin_expect(
            Method::GET,
            &format!("/api/v1/orders/{}", id_of(&order)),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(order["quantity_produced"], 120);
}

#[tokio::test]
async fn busy_machine_rejects_second_production_run() {
    let app = TestApp::new().await;
    let machine = app.create_machine("M-03").await;
    let first = app.create_order(6001).await;
    let second = app.create_order(6002).await;

    start_production(&app, &machine, &first).await;

    let response = app
        .as_operator(
            Method::POST,
            "/api/v1/time-entries/production",
            Some(json!({
                "machine_id": id_of(&machine),
                "order_id": id_of(&second),
                "stage_id": second["stage_id"],
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn second_open_stoppage_is_rejected() {
    let app = TestApp::new().await;
    let machine = app.create_machine("M-04").await;
    let reason = app.create_stoppage_reason("MAINT").await;
    let uri = format!("/api/v1/machines/{}/stoppages", id_of(&machine));

    let first = app
        .as_operator(
            Method::POST,
            &uri,
            Some(json!({ "reason_id": id_of(&reason) })),
        )
        .await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let first = body_json(first).await["data"].clone();
    assert_eq!(first["machine"]["status"], "STOPPED");
    assert!(first["entry"]["order_id"].is_null());

    let second = app
        .as_operator(
            Method::POST,
            &uri,
            Some(json!({ "reason_id": id_of(&reason) })),
        )
        .await;
    assert_eq!(second.status(), StatusCode::CONFLICT);

    // a stoppage without an order returns the machine to AVAILABLE
    let finished = app
        .as_operator(
            Method::POST,
            &format!("/api/v1/time-entries/{}/finish", id_of(&first["entry"])),
            Some(json!({})),
        )
        .await;
    assert_eq!(finished.status(), StatusCode::OK);
    assert_eq!(
        body_json(finished).await["data"]["machine"]["status"],
        "AVAILABLE"
    );
}

#[tokio::test]
async fn production_cannot_finish_while_stopped() {
    let app = TestApp::new().await;
    let machine = app.create_machine("M-05").await;
    let reason = app.create_stoppage_reason("JAM").await;
    let order = app.create_order(7001).await;

    let started = start_production(&app, &machine, &order).await;
    let production_id = id_of(&started["entry"]);

    let stopped = app
        .as_operator(
            Method::POST,
            &format!("/api/v1/machines/{}/stoppages", id_of(&machine)),
            Some(json!({ "reason_id": id_of(&reason) })),
        )
        .await;
    assert_eq!(stopped.status(), StatusCode::CREATED);
    let stopped = body_json(stopped).await["data"].clone();
    // a direct stoppage attaches to the running production run
    assert_eq!(stopped["entry"]["production_entry_id"], production_id.as_str());

    let response = app
        .as_operator(
            Method::POST,
            &format!("/api/v1/time-entries/{production_id}/finish"),
            Some(json!({ "quantity_produced": 10 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn finished_entry_cannot_be_finished_again() {
    let app = TestApp::new().await;
    let machine = app.create_machine("M-06").await;
    let order = app.create_order(7101).await;
    let started = start_production(&app, &machine, &order).await;
    let uri = format!("/api/v1/time-entries/{}/finish", id_of(&started["entry"]));

    let first = app.as_operator(Method::POST, &uri, Some(json!({}))).await;
    assert_eq!(first.status(), StatusCode::OK);
    let second = app.as_operator(Method::POST, &uri, Some(json!({}))).await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn running_order_cannot_be_cancelled() {
    let app = TestApp::new().await;
    let machine = app.create_machine("M-07").await;
    let order = app.create_order(7201).await;
    let reason = app
        .admin_expect(
            Method::POST,
            "/api/v1/cancellation-reasons",
            Some(json!({ "code": "CLIENT", "description": "Client cancelled" })),
            StatusCode::CREATED,
        )
        .await;

    start_production(&app, &machine, &order).await;

    let response = app
        .as_admin(
            Method::POST,
            &format!("/api/v1/orders/{}/cancel", id_of(&order)),
            Some(json!({ "reason_id": id_of(&reason) })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn dashboard_counts_machine_states() {
    let app = TestApp::new().await;
    let busy = app.create_machine("M-10").await;
    app.create_machine("M-11").await;
    let order = app.create_order(7301).await;
    start_production(&app, &busy, &order).await;

    let summary = app
        .admin_expect(
            Method::GET,
            "/api/v1/dashboard/summary",
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(summary["machines"]["total"], 2);
    assert_eq!(summary["machines"]["in_process"], 1);
    assert_eq!(summary["machines"]["available"], 1);
    assert_eq!(summary["running_production"], 1);
    assert_eq!(summary["in_progress_orders"], 1);
    assert_eq!(summary["active_operators"], 1);
}

#[tokio::test]
async fn idle_machine_stoppage_cannot_carry_an_order() {
    let app = TestApp::new().await;
    let machine = app.create_machine("M-08").await;
    let reason = app.create_stoppage_reason("SETUP").await;
    let order = app.create_order(7401).await;

    let response = app
        .as_operator(
            Method::POST,
            &format!("/api/v1/machines/{}/stoppages", id_of(&machine)),
            Some(json!({ "reason_id": id_of(&reason), "order_id": id_of(&order) })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let open = app
        .admin_expect(
            Method::GET,
            &format!("/api/v1/machines/{}/open-entries", id_of(&machine)),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(open["machine"]["status"], "AVAILABLE");
    assert!(open["stoppage"].is_null());
}

#[tokio::test]
async fn direct_stoppage_on_a_running_machine_resumes_production() {
    let app = TestApp::new().await;
    let machine = app.create_machine("M-09").await;
    let reason = app.create_stoppage_reason("JAM").await;
    let order = app.create_order(7501).await;
    start_production(&app, &machine, &order).await;

    let stopped = app
        .as_operator(
            Method::POST,
            &format!("/api/v1/machines/{}/stoppages", id_of(&machine)),
            Some(json!({ "reason_id": id_of(&reason), "order_id": id_of(&order) })),
        )
        .await;
    assert_eq!(stopped.status(), StatusCode::CREATED);
    let stopped = body_json(stopped).await["data"].clone();
    assert_eq!(stopped["entry"]["order_id"], order["id"]);

    let finished = app
        .as_operator(
            Method::POST,
            &format!("/api/v1/time-entries/{}/finish", id_of(&stopped["entry"])),
            Some(json!({})),
        )
        .await;
    assert_eq!(finished.status(), StatusCode::OK);
    let finished = body_json(finished).await["data"].clone();
    assert_eq!(finished["machine"]["status"], "IN_PROCESS");
    assert!(timestamp(&finished["entry"]["ended_at"]) >= timestamp(&finished["entry"]["started_at"]));
}

#[tokio::test]
async fn finishing_the_order_releases_its_machine() {
    let app = TestApp::new().await;
    let machine = app.create_machine("M-12").await;
    let order = app.create_order(7601).await;
    let started = start_production(&app, &machine, &order).await;

    let running = app
        .admin_expect(
            Method::GET,
            &format!("/api/v1/orders/{}", id_of(&order)),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(running["status"], "IN_PROGRESS");
    assert_eq!(running["machine_id"], machine["id"]);

    let finished = app
        .as_operator(
            Method::POST,
            &format!("/api/v1/time-entries/{}/finish", id_of(&started["entry"])),
            Some(json!({ "quantity_produced": 100, "finish_order": true })),
        )
        .await;
    assert_eq!(finished.status(), StatusCode::OK);
    assert_eq!(
        body_json(finished).await["data"]["machine"]["status"],
        "AVAILABLE"
    );

    let order = app
        .admin_expect(
            Method::GET,
            &format!("/api/v1/orders/{}", id_of(&order)),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(order["status"], "FINISHED");
    assert!(order["machine_id"].is_null());
    assert_eq!(order["quantity_produced"], 100);
}
