#![cfg(feature = "inmem-store")]

use actix_web::{test, App};
use repocleanup::github::GithubClient;
use repocleanup::repo::inmem::InMemRepo;
use repocleanup::{config, AppState, SecurityHeaders};
use serial_test::serial;
use std::sync::Arc;

fn setup_env() -> tempfile::TempDir {
    let tmp = tempfile::tempdir().unwrap();
    std::env::set_var("REPOCLEANUP_DATA_DIR", tmp.path().to_str().unwrap());
    tmp
}

fn state() -> AppState {
    AppState {
        repo: Arc::new(InMemRepo::new()),
        // report endpoints never talk to the upstream tracker
        github: GithubClient::new("http://127.0.0.1:1", "http://127.0.0.1:1"),
    }
}

#[actix_web::test]
#[serial]
async fn report_create_fetch_update_delete_flow() {
    let _tmp = setup_env();
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::from_env())
            .app_data(actix_web::web::Data::new(state()))
            .configure(config),
    )
    .await;

    // create
    let req = test::TestRequest::post()
        .uri("/api/reports")
        .set_json(&serde_json::json!({
            "creatorID": "42",
            "repoID": "100",
            "repoOwnerID": "7",
            "flaggedissues": [
                {"number": 1, "username": "bob", "label": "spam", "state": "open"}
            ]
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let report_id = body["reportID"].as_i64().unwrap();

    // open report for the pair
    let req = test::TestRequest::get().uri("/api/reports/open/42/100").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let open: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(open["reportid"].as_i64().unwrap(), report_id);
    assert_eq!(open["isopen"], true);
    assert_eq!(open["flaggedissues"][0]["number"], 1);

    // fetch by id
    let req = test::TestRequest::get()
        .uri(&format!("/api/reports/{report_id}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    // update: close it
    let req = test::TestRequest::put()
        .uri(&format!("/api/reports/{report_id}"))
        .set_json(&serde_json::json!({ "flaggedissues": null, "isopen": false }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let updated: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(updated["isopen"], false);

    // no open report left → 204
    let req = test::TestRequest::get().uri("/api/reports/open/42/100").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 204);
}

#[actix_web::test]
#[serial]
async fn create_twice_keeps_one_open_row() {
    let _tmp = setup_env();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state()))
            .configure(config),
    )
    .await;

    let payload = |numbers: &[i64]| {
        serde_json::json!({
            "creatorID": "42",
            "repoID": "100",
            "repoOwnerID": "7",
            "flaggedissues": numbers.iter().map(|n| serde_json::json!({
                "number": n, "username": "bob", "label": "spam", "state": "open"
            })).collect::<Vec<_>>()
        })
    };

    let req = test::TestRequest::post().uri("/api/reports").set_json(&payload(&[1])).to_request();
    let resp = test::call_service(&app, req).await;
    let first: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();

    let req = test::TestRequest::post().uri("/api/reports").set_json(&payload(&[2, 3])).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let second: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(first["reportID"], second["reportID"]);

    let req = test::TestRequest::get().uri("/api/reports/open/42/100").to_request();
    let resp = test::call_service(&app, req).await;
    let open: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(open["flaggedissues"].as_array().unwrap().len(), 2);
}

#[actix_web::test]
#[serial]
async fn delete_absent_open_report_is_204() {
    let _tmp = setup_env();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state()))
            .configure(config),
    )
    .await;

    let req = test::TestRequest::delete().uri("/api/reports/77/200").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 204);
    let body = test::read_body(resp).await;
    assert!(body.is_empty());
}

#[actix_web::test]
#[serial]
async fn report_validation_errors() {
    let _tmp = setup_env();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state()))
            .configure(config),
    )
    .await;

    // non-numeric id
    let req = test::TestRequest::get().uri("/api/reports/abc").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    // unknown id
    let req = test::TestRequest::get().uri("/api/reports/999").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    // missing required fields
    let req = test::TestRequest::post()
        .uri("/api/reports")
        .set_json(&serde_json::json!({ "creatorID": "42" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
#[serial]
async fn user_upsert_endpoint() {
    let _tmp = setup_env();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state()))
            .configure(config),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/users")
        .set_json(&serde_json::json!({
            "ID": "42", "username": "bob", "email": "bob@example.com"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let user: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(user["username"], "bob");
}
