use super::{respond, respond_with, unpack, Payload, Transport};
use crate::config::AppConfig;
use crate::db::DbPool;
use crate::errors::ApiError;
use crate::models::{LoginRequest, RegisterRequest, Role, UserView};
use crate::services::{AuthService, SymptomService, UserService};
use crate::session::{client_info, removal_cookie, session_cookie, SessionUser};
use crate::validation::{validate_login, validate_registration};
use actix_web::http::{header, StatusCode};
use actix_web::{web, HttpRequest, HttpResponse};
use log::{debug, info};
use serde_json::json;

pub async fn root_redirect(session: Option<SessionUser>) -> HttpResponse {
    let location = if session.is_some() { "/dashboard" } else { "/login" };
    HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .finish()
}

pub async fn register(
    pool: web::Data<DbPool>,
    payload: Payload<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    let (request, transport) = unpack(payload);
    debug!("Registration attempt for username: {}", request.username.trim());

    let account = validate_registration(&request)?;
    let user = UserService::register(&account, &pool).await?;

    info!("Caregiver {} registered successfully", user.user_id);
    Ok(respond(
        transport,
        StatusCode::CREATED,
        "Registration successful. Please log in.",
        Some(UserView::new(&user, Some(Role::Caregiver))),
        "/login",
    ))
}

pub async fn login(
    req: HttpRequest,
    pool: web::Data<DbPool>,
    config: web::Data<AppConfig>,
    payload: Payload<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let (request, transport) = unpack(payload);
    validate_login(&request)?;

    let session = AuthService::login(
        &request.identifier,
        &request.password,
        client_info(&req),
        &config,
        &pool,
    )
    .await?;

    let mut builder = HttpResponse::Ok();
    builder.cookie(session_cookie(&config, session.token.clone()));

    Ok(respond_with(
        builder,
        transport,
        "Login successful.",
        Some(json!({
            "user": UserView::new(&session.user, session.role),
            "token": session.token,
            "expires_at": session.expires_at,
        })),
        "/dashboard",
    ))
}

pub async fn logout(
    req: HttpRequest,
    session: SessionUser,
    pool: web::Data<DbPool>,
    config: web::Data<AppConfig>,
) -> Result<HttpResponse, ApiError> {
    AuthService::revoke_session(session.session_id, &pool).await?;
    info!("User {} logged out", session.user.user_id);

    let mut builder = HttpResponse::Ok();
    builder.cookie(removal_cookie(&config));

    Ok(respond_with::<()>(builder, Transport::of(&req), "Logged out.", None, "/login"))
}

pub async fn dashboard(session: SessionUser, pool: web::Data<DbPool>) -> Result<HttpResponse, ApiError> {
    let view = SymptomService::dashboard(session.actor(), session.view(), &pool).await?;
    Ok(respond(Transport::Json, StatusCode::OK, "Dashboard", Some(view), "/dashboard"))
}
