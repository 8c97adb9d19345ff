use super::{respond, unpack, Payload, Transport};
use crate::db::DbPool;
use crate::errors::{ApiError, FieldErrors};
use crate::models::{CreateStaffRequest, SetRoleRequest, UserView};
use crate::permissions::{self, Action};
use crate::services::UserService;
use crate::session::SessionUser;
use crate::validation::{validate_email, validate_password_policy, validate_username, ValidRegistration, REQUIRED};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use log::info;

fn require_admin(session: &SessionUser) -> Result<(), ApiError> {
    permissions::require(session.role, Action::ManageUsers).map(|_| ())
}

pub async fn list_users(session: SessionUser, pool: web::Data<DbPool>) -> Result<HttpResponse, ApiError> {
    require_admin(&session)?;
    let users = UserService::list_users(&pool).await?;
    Ok(respond(Transport::Json, StatusCode::OK, "Users", Some(users), "/admin/users"))
}

/// Creates a clinician or administrator account; self-registration only ever makes caregivers.
pub async fn create_staff(
    session: SessionUser,
    pool: web::Data<DbPool>,
    payload: Payload<CreateStaffRequest>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&session)?;
    let (request, transport) = unpack(payload);

    let username = request.username.trim();
    let email = request.email.trim();
    let mut errors = FieldErrors::new();
    validate_username(username, &mut errors);
    validate_email(email, &mut errors);
    if request.password.is_empty() {
        errors.add("password", REQUIRED);
    } else {
        validate_password_policy(&request.password, username, email, "password", &mut errors);
    }
    errors.into_result()?;

    let account = ValidRegistration {
        username: username.to_string(),
        email: email.to_string(),
        password: request.password.clone(),
    };
    let user = UserService::create_account(&account, request.role, &pool).await?;

    info!("Admin {} created {} account {}", session.user.user_id, request.role, user.user_id);
    Ok(respond(
        transport,
        StatusCode::CREATED,
        "Account created.",
        Some(UserView::new(&user, Some(request.role))),
        "/admin/users",
    ))
}

pub async fn set_role(
    session: SessionUser,
    pool: web::Data<DbPool>,
    path: web::Path<i32>,
    payload: Payload<SetRoleRequest>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&session)?;
    let user_id = path.into_inner();
    let (request, transport) = unpack(payload);

    if user_id == session.user.user_id {
        return Err(ApiError::Forbidden("Administrators cannot change their own role.".to_string()));
    }

    let view = UserService::set_role(user_id, request.role, &pool).await?;
    Ok(respond(transport, StatusCode::OK, "Role updated.", Some(view), "/admin/users"))
}

async fn set_active(
    req: HttpRequest,
    session: SessionUser,
    pool: web::Data<DbPool>,
    user_id: i32,
    active: bool,
) -> Result<HttpResponse, ApiError> {
    require_admin(&session)?;

    if user_id == session.user.user_id && !active {
        return Err(ApiError::Forbidden("Administrators cannot deactivate themselves.".to_string()));
    }

    let view = UserService::set_active(user_id, active, &pool).await?;
    let message = if active { "Account activated." } else { "Account deactivated." };
    Ok(respond(Transport::of(&req), StatusCode::OK, message, Some(view), "/admin/users"))
}

pub async fn activate(
    req: HttpRequest,
    session: SessionUser,
    pool: web::Data<DbPool>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    set_active(req, session, pool, path.into_inner(), true).await
}

pub async fn deactivate(
    req: HttpRequest,
    session: SessionUser,
    pool: web::Data<DbPool>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    set_active(req, session, pool, path.into_inner(), false).await
}
