#![cfg(feature = "inmem-store")]

use actix_web::{test, App};
use repocleanup::github::GithubClient;
use repocleanup::repo::inmem::InMemRepo;
use repocleanup::{config, AppState};
use serde_json::json;
use serial_test::serial;
use std::sync::Arc;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn setup_env() -> tempfile::TempDir {
    let tmp = tempfile::tempdir().unwrap();
    std::env::set_var("REPOCLEANUP_DATA_DIR", tmp.path().to_str().unwrap());
    tmp
}

fn state(mock: &MockServer) -> AppState {
    AppState {
        repo: Arc::new(InMemRepo::new()),
        github: GithubClient::new(mock.uri(), mock.uri()),
    }
}

fn issue_json(number: i64, labels: &[&str], state: &str) -> serde_json::Value {
    json!({
        "number": number,
        "id": number * 10,
        "title": format!("issue {number}"),
        "body": "text",
        "user": {"login": "mallory"},
        "labels": labels.iter().map(|n| json!({"name": n, "color": "ededed"})).collect::<Vec<_>>(),
        "state": state,
        "created_at": "2024-05-01T12:00:00Z"
    })
}

#[actix_web::test]
#[serial]
async fn anonymous_issue_listing_uses_small_pages() {
    let _tmp = setup_env();
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/widgets/issues"))
        .and(query_param("state", "open"))
        .and(query_param("per_page", "10"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([issue_json(1, &[], "open")])))
        .mount(&mock)
        .await;

    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state(&mock)))
            .configure(config),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/github/octo/widgets/issues").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let issues: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(issues.as_array().unwrap().len(), 1);
}

#[actix_web::test]
#[serial]
async fn authenticated_issue_listing_uses_full_pages() {
    let _tmp = setup_env();
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/widgets/issues"))
        .and(query_param("per_page", "30"))
        .and(query_param("page", "2"))
        .and(header("Authorization", "token gho_abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            issue_json(31, &["bug"], "open"),
            issue_json(32, &[], "open"),
        ])))
        .mount(&mock)
        .await;

    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state(&mock)))
            .configure(config),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/api/github/octo/widgets/issues?page=2")
        .insert_header(("Authorization", "Bearer gho_abc"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let issues: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(issues.as_array().unwrap().len(), 2);
    assert_eq!(issues[0]["number"], 31);
}

#[actix_web::test]
#[serial]
async fn metadata_404_passes_through() {
    let _tmp = setup_env();
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/ghost"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock)
        .await;

    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state(&mock)))
            .configure(config),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/github/octo/ghost/metadata").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
#[serial]
async fn existing_label_is_success_not_422() {
    let _tmp = setup_env();
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/octo/widgets/labels"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "message": "Validation Failed",
            "errors": [{"code": "already_exists"}]
        })))
        .mount(&mock)
        .await;

    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state(&mock)))
            .configure(config),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/github/octo/widgets/labels")
        .insert_header(("Authorization", "Bearer gho_abc"))
        .set_json(&json!({"name": "spam", "color": "f5222d", "description": "spam issues"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["message"], "Label already exists");
}

#[actix_web::test]
#[serial]
async fn new_label_is_created() {
    let _tmp = setup_env();
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/octo/widgets/labels"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"name": "spam"})))
        .mount(&mock)
        .await;

    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state(&mock)))
            .configure(config),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/github/octo/widgets/labels")
        .insert_header(("Authorization", "Bearer gho_abc"))
        .set_json(&json!({"name": "spam"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
}

#[actix_web::test]
#[serial]
async fn mutating_calls_require_a_token() {
    let _tmp = setup_env();
    let mock = MockServer::start().await;
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state(&mock)))
            .configure(config),
    )
    .await;

    let req = test::TestRequest::put()
        .uri("/api/github/octo/widgets/issues/5/lock")
        .set_json(&json!({"lock_reason": "spam"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    // nothing reached upstream
    assert!(mock.received_requests().await.unwrap().is_empty());
}

#[actix_web::test]
#[serial]
async fn issues_by_numbers_requires_the_query_param() {
    let _tmp = setup_env();
    let mock = MockServer::start().await;
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state(&mock)))
            .configure(config),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/api/github/octo/widgets/issues/numbers")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
#[serial]
async fn issues_by_numbers_returns_input_order() {
    let _tmp = setup_env();
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/widgets/issues/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(issue_json(7, &["spam"], "closed")))
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/widgets/issues/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(issue_json(3, &[], "open")))
        .mount(&mock)
        .await;

    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state(&mock)))
            .configure(config),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/api/github/octo/widgets/issues/numbers?numbers=7,3")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let issues: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(issues[0]["number"], 7);
    assert_eq!(issues[1]["number"], 3);
}

#[actix_web::test]
#[serial]
async fn block_and_unblock_org_user() {
    let _tmp = setup_env();
    let mock = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/orgs/octo/blocks/mallory"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/orgs/octo/blocks/mallory"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock)
        .await;

    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state(&mock)))
            .configure(config),
    )
    .await;

    let req = test::TestRequest::put()
        .uri("/api/github/octo/block/mallory")
        .insert_header(("Authorization", "Bearer gho_abc"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 204);

    let req = test::TestRequest::delete()
        .uri("/api/github/octo/block/mallory")
        .insert_header(("Authorization", "Bearer gho_abc"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 204);
}

#[actix_web::test]
#[serial]
async fn oauth_callback_exchanges_code_and_upserts_user() {
    let _tmp = setup_env();
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "gho_xyz",
            "token_type": "bearer"
        })))
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .and(header("Authorization", "token gho_xyz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 42,
            "login": "alice",
            "email": "alice@example.com"
        })))
        .mount(&mock)
        .await;

    let state = AppState {
        repo: Arc::new(InMemRepo::new()),
        github: GithubClient::new(mock.uri(), mock.uri())
            .with_app_credentials("client-id", "client-secret"),
    };
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state))
            .configure(config),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/github/callback")
        .set_json(&json!({"code": "abc123"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["access_token"], "gho_xyz");
    assert_eq!(body["user"]["username"], "alice");
}
