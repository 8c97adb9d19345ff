use super::{respond, unpack, Payload, Transport};
use crate::db::DbPool;
use crate::errors::ApiError;
use crate::models::SymptomLogRequest;
use crate::permissions::{self, Action};
use crate::services::SymptomService;
use crate::session::SessionUser;
use crate::validation::validate_symptom_log;
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use log::debug;

pub async fn list(session: SessionUser, pool: web::Data<DbPool>) -> Result<HttpResponse, ApiError> {
    let logs = SymptomService::list(session.actor(), &pool).await?;
    Ok(respond(Transport::Json, StatusCode::OK, "Symptom logs", Some(logs), "/symptoms"))
}

pub async fn detail(
    session: SessionUser,
    pool: web::Data<DbPool>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let log = SymptomService::get(session.actor(), path.into_inner(), &pool).await?;
    Ok(respond(Transport::Json, StatusCode::OK, "Symptom log", Some(log), "/symptoms"))
}

pub async fn create(
    session: SessionUser,
    pool: web::Data<DbPool>,
    payload: Payload<SymptomLogRequest>,
) -> Result<HttpResponse, ApiError> {
    let (request, transport) = unpack(payload);
    debug!("Symptom log submission from user {}", session.user.user_id);

    permissions::require(session.role, Action::CreateLog)?;
    let form = validate_symptom_log(&request, Utc::now().date_naive())?;
    let log = SymptomService::create(session.actor(), form, &pool).await?;

    Ok(respond(transport, StatusCode::CREATED, "Symptom log saved.", Some(log), "/dashboard"))
}

pub async fn update(
    session: SessionUser,
    pool: web::Data<DbPool>,
    path: web::Path<i32>,
    payload: Payload<SymptomLogRequest>,
) -> Result<HttpResponse, ApiError> {
    let log_id = path.into_inner();
    let (mut request, transport) = unpack(payload);

    permissions::require(session.role, Action::UpdateLog)?;
    // The date of an existing log is fixed.
    request.log_date = None;
    let form = validate_symptom_log(&request, Utc::now().date_naive())?;
    let log = SymptomService::update(session.actor(), log_id, form, &pool).await?;

    Ok(respond(transport, StatusCode::OK, "Symptom log updated.", Some(log), "/symptoms"))
}

pub async fn delete(
    req: HttpRequest,
    session: SessionUser,
    pool: web::Data<DbPool>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    SymptomService::delete(session.actor(), path.into_inner(), &pool).await?;
    Ok(respond::<()>(Transport::of(&req), StatusCode::OK, "Symptom log deleted.", None, "/symptoms"))
}
