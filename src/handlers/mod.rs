//! HTTP handlers and route table.
//!
//! Request bodies may be JSON or urlencoded forms. JSON callers get a
//! `{status, message, data}` envelope back; form submissions are answered
//! with a redirect, like the HTML front end expects.

pub mod accounts;
pub mod admin;
pub mod symptoms;

use crate::errors::{ApiError, FieldErrors};
use actix_web::error::{InternalError, JsonPayloadError, UrlencodedError};
use actix_web::http::{header, StatusCode};
use actix_web::{web, Either, HttpRequest, HttpResponse, HttpResponseBuilder, ResponseError};
use log::debug;
use serde::Serialize;
use serde_json::json;

/// Body accepted by every mutating endpoint.
pub type Payload<T> = Either<web::Json<T>, web::Form<T>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Json,
    Form,
}

impl Transport {
    /// Transport for requests without a body: urlencoded or HTML-accepting
    /// callers are treated as form submissions.
    pub fn of(req: &HttpRequest) -> Self {
        let header_str = |name: header::HeaderName| req.headers().get(name).and_then(|v| v.to_str().ok()).unwrap_or("");
        let content_type = header_str(header::CONTENT_TYPE);
        let accept = header_str(header::ACCEPT);

        if content_type.starts_with("application/x-www-form-urlencoded")
            || (accept.contains("text/html") && !accept.contains("application/json"))
        {
            Transport::Form
        } else {
            Transport::Json
        }
    }
}

pub fn unpack<T>(payload: Payload<T>) -> (T, Transport) {
    match payload {
        Either::Left(json) => (json.into_inner(), Transport::Json),
        Either::Right(form) => (form.into_inner(), Transport::Form),
    }
}

/// Success response: JSON envelope or a redirect to `location`.
pub fn respond<D: Serialize>(
    transport: Transport,
    status: StatusCode,
    message: &str,
    data: Option<D>,
    location: &str,
) -> HttpResponse {
    respond_with(HttpResponse::build(status), transport, message, data, location)
}

/// Like [`respond`], continuing from a builder that may already carry cookies.
pub fn respond_with<D: Serialize>(
    mut builder: HttpResponseBuilder,
    transport: Transport,
    message: &str,
    data: Option<D>,
    location: &str,
) -> HttpResponse {
    match transport {
        Transport::Json => {
            let mut body = json!({ "status": "success", "message": message });
            if let Some(data) = data {
                body["data"] = json!(data);
            }
            builder.json(body)
        }
        Transport::Form => builder
            .status(StatusCode::FOUND)
            .insert_header((header::LOCATION, location))
            .finish(),
    }
}

fn malformed_body(detail: String) -> ApiError {
    debug!("Malformed request body: {}", detail);
    ApiError::Validation({
        let mut errors = FieldErrors::new();
        errors.add_non_field("The request body could not be parsed.");
        errors
    })
}

fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let api_error = malformed_body(err.to_string());
    let response = api_error.error_response();
    InternalError::from_response(err, response).into()
}

fn form_error_handler(err: UrlencodedError, _req: &HttpRequest) -> actix_web::Error {
    let api_error = malformed_body(err.to_string());
    let response = api_error.error_response();
    InternalError::from_response(err, response).into()
}

pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Registers every route. Callers provide `web::Data<DbPool>` and `web::Data<AppConfig>`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().limit(64 * 1024).error_handler(json_error_handler))
        .app_data(web::FormConfig::default().limit(64 * 1024).error_handler(form_error_handler))
        .route("/", web::get().to(accounts::root_redirect))
        .route("/health", web::get().to(health_check))
        .route("/register", web::post().to(accounts::register))
        .route("/login", web::post().to(accounts::login))
        .route("/logout", web::post().to(accounts::logout))
        .route("/dashboard", web::get().to(accounts::dashboard))
        .service(
            web::resource("/symptoms")
                .route(web::get().to(symptoms::list))
                .route(web::post().to(symptoms::create)),
        )
        .service(
            web::resource(["/symptoms/create", "/symptoms/daily-log"])
                .route(web::post().to(symptoms::create)),
        )
        .service(
            web::resource("/symptoms/{log_id}")
                .route(web::get().to(symptoms::detail))
                .route(web::put().to(symptoms::update))
                .route(web::delete().to(symptoms::delete)),
        )
        .route("/symptoms/{log_id}/edit", web::post().to(symptoms::update))
        .route("/symptoms/{log_id}/delete", web::post().to(symptoms::delete))
        .service(
            web::scope("/admin")
                .service(
                    web::resource("/users")
                        .route(web::get().to(admin::list_users))
                        .route(web::post().to(admin::create_staff)),
                )
                .route("/users/{user_id}/role", web::post().to(admin::set_role))
                .route("/users/{user_id}/activate", web::post().to(admin::activate))
                .route("/users/{user_id}/deactivate", web::post().to(admin::deactivate)),
        );
}
