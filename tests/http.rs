//! Request-level behavior that is decided before any query runs.

#[macro_use]
mod common;

use actix_web::http::{header, StatusCode};
use actix_web::test;
use autibloom::errors::NON_FIELD_ERRORS;
use common::offline_state;
use serde_json::{json, Value};

#[actix_web::test]
async fn health_reports_ok() {
    let (pool, config) = offline_state();
    let app = test_app!(pool, config);

    let res = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["status"], "ok");
}

#[actix_web::test]
async fn protected_pages_require_a_session() {
    let (pool, config) = offline_state();
    let app = test_app!(pool, config);

    for uri in ["/dashboard", "/symptoms", "/symptoms/1", "/admin/users"] {
        let res = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "GET {}", uri);
        let body: Value = test::read_body_json(res).await;
        assert_eq!(body["status"], "error");
    }

    let req = test::TestRequest::post()
        .uri("/symptoms/create")
        .set_json(common::log_body(4))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = test::call_service(&app, test::TestRequest::post().uri("/logout").to_request()).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn forged_bearer_token_is_rejected() {
    let (pool, config) = offline_state();
    let app = test_app!(pool, config);

    let req = test::TestRequest::get()
        .uri("/dashboard")
        .insert_header((header::AUTHORIZATION, "Bearer not.a.token"))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn root_sends_anonymous_visitors_to_login() {
    let (pool, config) = offline_state();
    let app = test_app!(pool, config);

    let res = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(res.headers().get(header::LOCATION).unwrap(), "/login");
}

#[actix_web::test]
async fn registration_password_mismatch_is_a_form_error() {
    let (pool, config) = offline_state();
    let app = test_app!(pool, config);

    let req = test::TestRequest::post()
        .uri("/register")
        .set_json(json!({
            "username": "maria",
            "email": "maria@example.org",
            "password": "Calm-Harbor-2024",
            "password_confirm": "Calm-Harbor-2025"
        }))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["errors"][NON_FIELD_ERRORS][0], "The two password fields didn't match.");
    assert!(body["errors"].get("password").is_none());
}

#[actix_web::test]
async fn registration_form_reports_field_errors() {
    let (pool, config) = offline_state();
    let app = test_app!(pool, config);

    let req = test::TestRequest::post()
        .uri("/register")
        .insert_header((header::CONTENT_TYPE, "application/x-www-form-urlencoded"))
        .set_payload("username=&email=not-an-email&password1=12345678&password2=12345678")
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["errors"]["username"][0], "This field is required.");
    assert!(body["errors"]["email"].is_array());
    assert!(body["errors"]["password"].is_array());
}

#[actix_web::test]
async fn login_requires_both_fields() {
    let (pool, config) = offline_state();
    let app = test_app!(pool, config);

    let res = test::call_service(&app, common::login_request("", "").to_request()).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(res).await;
    assert!(body["errors"]["identifier"].is_array());
    assert!(body["errors"]["password"].is_array());
}

#[actix_web::test]
async fn malformed_json_gets_the_error_envelope() {
    let (pool, config) = offline_state();
    let app = test_app!(pool, config);

    let req = test::TestRequest::post()
        .uri("/login")
        .insert_header((header::CONTENT_TYPE, "application/json"))
        .set_payload("{\"identifier\": ")
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["errors"][NON_FIELD_ERRORS][0], "The request body could not be parsed.");
}
