//! Cookie-backed sessions.
//!
//! A session is a `user_session` row plus a signed token carrying its id.
//! The token travels in an `HttpOnly` cookie, or as a bearer token for
//! API clients.

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::errors::ApiError;
use crate::models::{Role, UserAccount, UserView};
use crate::services::{Actor, AuthService, ClientInfo, UserService};
use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::dev::Payload;
use actix_web::http::header;
use actix_web::{web, FromRequest, HttpRequest};
use log::{debug, error, warn};
use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

/// The authenticated user behind a request.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub user: UserAccount,
    pub role: Option<Role>,
    pub session_id: Uuid,
}

impl SessionUser {
    pub fn actor(&self) -> Actor {
        Actor { user_id: self.user.user_id, role: self.role }
    }

    pub fn view(&self) -> UserView {
        UserView::new(&self.user, self.role)
    }
}

impl FromRequest for SessionUser {
    type Error = ApiError;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move { authenticate(&req).await })
    }
}

fn app_state(req: &HttpRequest) -> Result<(web::Data<AppConfig>, web::Data<DbPool>), ApiError> {
    let config = req.app_data::<web::Data<AppConfig>>().cloned();
    let pool = req.app_data::<web::Data<DbPool>>().cloned();
    match (config, pool) {
        (Some(config), Some(pool)) => Ok((config, pool)),
        _ => {
            error!("AppConfig or DbPool missing from application data");
            Err(ApiError::Internal("application state not configured".to_string()))
        }
    }
}

/// Session token from the cookie, falling back to an `Authorization: Bearer` header.
pub fn extract_token(req: &HttpRequest, cookie_name: &str) -> Option<String> {
    if let Some(cookie) = req.cookie(cookie_name) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

async fn authenticate(req: &HttpRequest) -> Result<SessionUser, ApiError> {
    let (config, pool) = app_state(req)?;

    let token = extract_token(req, &config.session_cookie_name).ok_or_else(ApiError::unauthenticated)?;
    let (user_id, session_id) = AuthService::decode_token(&token, &config)?;

    if AuthService::find_active_session(session_id, user_id, &pool).await?.is_none() {
        debug!("Session {} is revoked, expired or unknown", session_id);
        return Err(ApiError::unauthenticated());
    }

    let (user, role) = UserService::get_user_with_role(user_id, &pool)
        .await?
        .ok_or_else(ApiError::unauthenticated)?;

    if !user.is_active {
        warn!("Inactive user {} presented a live session", user.user_id);
        return Err(ApiError::Inactive);
    }

    Ok(SessionUser { user, role, session_id })
}

pub fn client_info(req: &HttpRequest) -> ClientInfo {
    ClientInfo {
        ip_address: req.connection_info().realip_remote_addr().map(|s| s.to_owned()),
        user_agent: req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_owned()),
    }
}

pub fn session_cookie(config: &AppConfig, token: String) -> Cookie<'static> {
    Cookie::build(config.session_cookie_name.clone(), token)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.session_cookie_secure)
        .max_age(CookieDuration::hours(config.session_ttl_hours))
        .finish()
}

pub fn removal_cookie(config: &AppConfig) -> Cookie<'static> {
    let mut cookie = Cookie::build(config.session_cookie_name.clone(), "")
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .finish();
    cookie.make_removal();
    cookie
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn config() -> AppConfig {
        AppConfig::for_tests("postgres://localhost/unused")
    }

    #[test]
    fn token_is_read_from_cookie_first() {
        let config = config();
        let req = TestRequest::default()
            .cookie(Cookie::new(config.session_cookie_name.clone(), "from-cookie"))
            .insert_header((header::AUTHORIZATION, "Bearer from-header"))
            .to_http_request();
        assert_eq!(extract_token(&req, &config.session_cookie_name).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn bearer_header_is_accepted() {
        let config = config();
        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Bearer abc.def.ghi"))
            .to_http_request();
        assert_eq!(extract_token(&req, &config.session_cookie_name).as_deref(), Some("abc.def.ghi"));

        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Basic dXNlcjpwdw=="))
            .to_http_request();
        assert_eq!(extract_token(&req, &config.session_cookie_name), None);
    }

    #[test]
    fn session_cookie_is_http_only() {
        let config = config();
        let cookie = session_cookie(&config, "token".to_string());
        assert_eq!(cookie.name(), "autibloom_session");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
    }

    #[test]
    fn removal_cookie_expires_immediately() {
        let cookie = removal_cookie(&config());
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(CookieDuration::ZERO));
    }

    #[test]
    fn tokens_round_trip_and_reject_tampering() {
        let config = config();
        let sid = Uuid::new_v4();
        let expires = (chrono::Utc::now() + chrono::Duration::hours(1)).naive_utc();
        let token = AuthService::generate_token(7, sid, expires, &config).unwrap();

        assert_eq!(AuthService::decode_token(&token, &config).unwrap(), (7, sid));

        let other = AppConfig::for_tests("postgres://localhost/unused");
        assert!(matches!(AuthService::decode_token(&token, &other), Err(ApiError::Auth(_))));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let config = config();
        let expired = (chrono::Utc::now() - chrono::Duration::hours(2)).naive_utc();
        let token = AuthService::generate_token(7, Uuid::new_v4(), expired, &config).unwrap();
        assert!(matches!(AuthService::decode_token(&token, &config), Err(ApiError::Auth(_))));
    }
}
