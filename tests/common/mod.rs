#![allow(dead_code)]

use actix_web::cookie::Cookie;
use actix_web::dev::ServiceResponse;
use actix_web::test::TestRequest;
use autibloom::db::{build_pool, init_schema, DbPool};
use autibloom::logger::setup_test_logger;
use autibloom::models::{Role, UserAccount};
use autibloom::services::UserService;
use autibloom::validation::ValidRegistration;
use autibloom::AppConfig;
use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use serde_json::{json, Value};
use std::sync::Once;
use uuid::Uuid;

pub const PASSWORD: &str = "Calm-Harbor-2024";

static SCHEMA: Once = Once::new();

/// Builds an application with the crate's routes and the given state.
macro_rules! test_app {
    ($pool:expr, $config:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new($pool.clone()))
                .app_data(actix_web::web::Data::new($config.clone()))
                .configure(autibloom::configure),
        )
        .await
    };
}

/// State for tests that never reach the database: the pool is never connected.
pub fn offline_state() -> (DbPool, AppConfig) {
    setup_test_logger();
    let url = "postgres://nobody@127.0.0.1:1/unreachable";
    let pool = Pool::builder()
        .max_size(1)
        .connection_timeout(std::time::Duration::from_millis(200))
        .build_unchecked(ConnectionManager::<PgConnection>::new(url));
    (pool, AppConfig::for_tests(url))
}

/// State backed by `TEST_DATABASE_URL`; panics when it is not set.
pub fn database_state() -> (DbPool, AppConfig) {
    let url = std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must point at a scratch Postgres database");
    setup_test_logger();

    let config = AppConfig::for_tests(&url);
    let pool = build_pool(&url, 8).expect("test database pool");
    SCHEMA.call_once(|| init_schema(&pool).expect("test schema"));
    (pool, config)
}

pub fn unique(prefix: &str) -> String {
    format!("{}_{}", prefix, &Uuid::new_v4().simple().to_string()[..12])
}

pub async fn create_user(pool: &DbPool, role: Role) -> UserAccount {
    let username = unique(role.as_str());
    let account = ValidRegistration {
        email: format!("{}@example.org", username),
        username,
        password: PASSWORD.to_string(),
    };
    UserService::create_account(&account, role, pool).await.expect("create test user")
}

pub fn login_request(identifier: &str, password: &str) -> TestRequest {
    TestRequest::post()
        .uri("/login")
        .set_json(json!({ "identifier": identifier, "password": password }))
}

pub fn session_from<B>(res: &ServiceResponse<B>, config: &AppConfig) -> Cookie<'static> {
    res.response()
        .cookies()
        .find(|c| c.name() == config.session_cookie_name)
        .map(|c| c.into_owned())
        .expect("session cookie")
}

pub fn log_body(severity: i32) -> Value {
    json!({
        "severity": severity,
        "communication_rating": 3,
        "social_interaction_rating": 2,
        "repetitive_behavior_rating": 4,
        "sensory_sensitivity_rating": 3,
        "mood_rating": 4,
        "description": "Quiet morning, loud classroom was hard",
        "behaviors_checklist": { "hand_flapping": true, "eye_contact": false }
    })
}
