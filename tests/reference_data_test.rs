mod common;

use axum::http::{Method, StatusCode};
use common::{body_json, id_of, TestApp};
use serde_json::json;

#[tokio::test]
async fn blank_area_name_is_rejected_without_writing() {
    let app = TestApp::new().await;

    let response = app
        .as_admin(Method::POST, "/api/v1/areas", Some(json!({ "name": "   " })))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let page = app
        .admin_expect(Method::GET, "/api/v1/areas", None, StatusCode::OK)
        .await;
    assert_eq!(page["total"], 0);
}

#[tokio::test]
async fn bad_stage_color_is_rejected_without_writing() {
    let app = TestApp::new().await;

    let response = app
        .as_admin(
            Method::POST,
            "/api/v1/stages",
            Some(json!({ "code": "10", "name": "Corte", "sequence": 10, "color": "blue" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["details"]
        .as_array()
        .is_some_and(|fields| fields.iter().any(|f| f["field"] == "color")));

    // only the default stage seeded by the migrations
    let page = app
        .admin_expect(Method::GET, "/api/v1/stages", None, StatusCode::OK)
        .await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["code"], "00");
}

#[tokio::test]
async fn invalid_update_leaves_row_untouched() {
    let app = TestApp::new().await;
    let stage = app.create_stage("20", 20).await;
    let uri = format!("/api/v1/stages/{}", id_of(&stage));

    let response = app
        .as_admin(
            Method::PUT,
            &uri,
            Some(json!({ "code": "20", "name": "", "sequence": 20, "color": "#00FF00" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let current = app
        .admin_expect(Method::GET, &uri, None, StatusCode::OK)
        .await;
    assert_eq!(current["name"], "Stage 20");
    assert_eq!(current["color"], "#1E88E5");
}

#[tokio::test]
async fn default_stage_cannot_be_deleted() {
    let app = TestApp::new().await;
    let page = app
        .admin_expect(Method::GET, "/api/v1/stages", None, StatusCode::OK)
        .await;
    let none_stage = &page["items"][0];

    let response = app
        .as_admin(
            Method::DELETE,
            &format!("/api/v1/stages/{}", id_of(none_stage)),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn duplicate_codes_conflict() {
    let app = TestApp::new().await;
    app.create_machine("PRENSA-1").await;

    let response = app
        .as_admin(
            Method::POST,
            "/api/v1/machines",
            Some(json!({ "code": "PRENSA-1", "name": "Another press" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    app.create_stoppage_reason("SETUP").await;
    let response = app
        .as_admin(
            Method::POST,
            "/api/v1/stoppage-reasons",
            Some(json!({ "code": "SETUP", "description": "Again" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn machines_join_sectors() {
    let app = TestApp::new().await;
    let area = app
        .admin_expect(
            Method::POST,
            "/api/v1/areas",
            Some(json!({ "name": "Fabrica 1" })),
            StatusCode::CREATED,
        )
        .await;
    let sector = app
        .admin_expect(
            Method::POST,
            "/api/v1/sectors",
            Some(json!({ "name": "Estamparia", "area_id": id_of(&area) })),
            StatusCode::CREATED,
        )
        .await;

    let machine = app
        .admin_expect(
            Method::POST,
            "/api/v1/machines",
            Some(json!({
                "code": "EST-01",
                "name": "Estampadora",
                "sector_ids": [id_of(&sector)]
            })),
            StatusCode::CREATED,
        )
        .await;
    assert_eq!(machine["status"], "AVAILABLE");
    assert_eq!(machine["sector_ids"][0], id_of(&sector).as_str());

    let listed = app
        .admin_expect(
            Method::GET,
            &format!("/api/v1/machines?sector_id={}", id_of(&sector)),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(listed["total"], 1);
    assert_eq!(listed["items"][0]["code"], "EST-01");
}

#[tokio::test]
async fn inactive_reasons_are_hidden_from_floor_lists() {
    let app = TestApp::new().await;
    app.create_stoppage_reason("SETUP").await;
    app.admin_expect(
        Method::POST,
        "/api/v1/stoppage-reasons",
        Some(json!({ "code": "OLD", "description": "Retired", "active": false })),
        StatusCode::CREATED,
    )
    .await;

    let all = app
        .admin_expect(Method::GET, "/api/v1/stoppage-reasons", None, StatusCode::OK)
        .await;
    assert_eq!(all["total"], 2);

    let response = app
        .as_operator(Method::GET, "/api/v1/stoppage-reasons?active_only=true", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let active = body_json(response).await["data"].clone();
    assert_eq!(active["total"], 1);
    assert_eq!(active["items"][0]["code"], "SETUP");
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let app = TestApp::new().await;
    let response = app.as_admin(Method::GET, "/api/v1/nowhere", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
