use actix_web::http::StatusCode;
use actix_web::{error::ResponseError, HttpResponse};
use log::{debug, error, warn};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use thiserror::Error;

/// Key under which form-level (non-field) messages are reported.
pub const NON_FIELD_ERRORS: &str = "__all__";

const GENERIC_INTERNAL_MESSAGE: &str = "An unexpected error occurred.";

/// Validation messages keyed by field name.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn add_non_field(&mut self, message: impl Into<String>) {
        self.add(NON_FIELD_ERRORS, message);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Returns `Err(ApiError::Validation)` if any message was recorded.
    pub fn into_result(self) -> Result<(), ApiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self))
        }
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }
}

// Custom error handling
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation error: {0:?}")]
    Validation(FieldErrors),
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error("Account is inactive")]
    Inactive,
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn invalid_credentials() -> Self {
        ApiError::Auth("Invalid credentials.".to_string())
    }

    pub fn unauthenticated() -> Self {
        ApiError::Auth("Authentication required.".to_string())
    }

    /// Message that is safe to show to the client.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Validation(errors) => match errors.get(NON_FIELD_ERRORS) {
                Some([first, ..]) => first.clone(),
                _ => "Please correct the errors below.".to_string(),
            },
            ApiError::Auth(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg) => msg.clone(),
            ApiError::Inactive => "This account is inactive.".to_string(),
            ApiError::Database(_) | ApiError::Internal(_) => GENERIC_INTERNAL_MESSAGE.to_string(),
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        match self {
            ApiError::Database(detail) => error!("\x1B[1;31mDATABASE ERROR:\x1B[0m {}", detail),
            ApiError::Internal(detail) => error!("\x1B[1;31mINTERNAL SERVER ERROR:\x1B[0m {}", detail),
            ApiError::Validation(errors) => debug!("\x1B[1;36mVALIDATION ERROR:\x1B[0m {:?}", errors),
            ApiError::NotFound(msg) => debug!("\x1B[1;36mNOT FOUND ERROR:\x1B[0m {}", msg),
            other => warn!("\x1B[1;33mREQUEST REJECTED:\x1B[0m {}", other),
        }

        let mut body = json!({
            "status": "error",
            "message": self.public_message(),
        });
        if let ApiError::Validation(errors) = self {
            body["errors"] = json!(errors);
        }

        HttpResponse::build(self.status_code()).json(body)
    }

    fn status_code(&self) -> StatusCode {
        match *self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::Inactive | ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    async fn body_json(error: ApiError) -> serde_json::Value {
        let response = error.error_response();
        let bytes = to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn status_codes_follow_error_taxonomy() {
        assert_eq!(ApiError::Validation(FieldErrors::new()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::invalid_credentials().status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Inactive.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::Forbidden("no".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound("gone".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Conflict("dup".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(ApiError::Database("x".into()).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[actix_web::test]
    async fn internal_details_are_not_echoed() {
        let body = body_json(ApiError::Database("relation \"user_account\" does not exist".into())).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], GENERIC_INTERNAL_MESSAGE);
        assert!(!body.to_string().contains("user_account"));
    }

    #[actix_web::test]
    async fn validation_errors_are_field_scoped() {
        let mut errors = FieldErrors::new();
        errors.add("severity", "Ensure this value is less than or equal to 10.");
        errors.add_non_field("The two password fields didn't match.");

        let body = body_json(ApiError::Validation(errors)).await;
        assert_eq!(body["message"], "The two password fields didn't match.");
        assert_eq!(body["errors"]["severity"][0], "Ensure this value is less than or equal to 10.");
        assert_eq!(body["errors"][NON_FIELD_ERRORS][0], "The two password fields didn't match.");
    }

    #[test]
    fn empty_field_errors_are_ok() {
        assert!(FieldErrors::new().into_result().is_ok());
        assert!(FieldErrors::single("email", "required").into_result().is_err());
    }
}
