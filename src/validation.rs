//! Form validation for registration, login and symptom logs.
//!
//! Every validator collects all problems into [`FieldErrors`] instead of
//! stopping at the first one, so clients can show them next to each field.

use crate::errors::{ApiError, FieldErrors};
use crate::models::{LoginRequest, RegisterRequest, SymptomLogRequest};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

pub const REQUIRED: &str = "This field is required.";
pub const PASSWORD_MISMATCH: &str = "The two password fields didn't match.";

pub const SEVERITY_RANGE: (i32, i32) = (1, 10);
pub const RATING_RANGE: (i32, i32) = (1, 5);

const USERNAME_MAX: usize = 150;
const EMAIL_MAX: usize = 254;
const PASSWORD_MIN: usize = 8;
const DESCRIPTION_MAX: usize = 2000;
const NOTES_MAX: usize = 5000;
const CHECKLIST_MAX_KEYS: usize = 50;

static USERNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w.@+-]+$").expect("valid regex"));
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$")
        .expect("valid regex")
});

// Lowercase; a subset of the usual leaked-password lists.
const COMMON_PASSWORDS: &[&str] = &[
    "password", "password1", "password123", "12345678", "123456789", "1234567890",
    "qwerty123", "qwertyuiop", "iloveyou", "letmein1", "welcome1", "admin123",
    "football", "baseball", "sunshine", "princess", "trustno1", "abc12345",
    "passw0rd", "superman", "whatever", "starwars", "11111111", "00000000",
];

/// Registration data that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidRegistration {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Symptom log data that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidSymptomLog {
    pub log_date: NaiveDate,
    pub severity: i32,
    pub communication_rating: i32,
    pub social_interaction_rating: i32,
    pub repetitive_behavior_rating: i32,
    pub sensory_sensitivity_rating: i32,
    pub mood_rating: i32,
    pub description: String,
    pub notes: Option<String>,
    pub behaviors_checklist: Value,
}

pub fn validate_username(username: &str, errors: &mut FieldErrors) {
    if username.is_empty() {
        errors.add("username", REQUIRED);
    } else if username.chars().count() > USERNAME_MAX {
        errors.add("username", format!("Ensure this value has at most {} characters.", USERNAME_MAX));
    } else if !USERNAME_RE.is_match(username) {
        errors.add(
            "username",
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        );
    }
}

pub fn validate_email(email: &str, errors: &mut FieldErrors) {
    if email.is_empty() {
        errors.add("email", REQUIRED);
    } else if email.len() > EMAIL_MAX || !EMAIL_RE.is_match(email) {
        errors.add("email", "Enter a valid email address.");
    }
}

/// Password strength rules; messages go under `field`.
pub fn validate_password_policy(password: &str, username: &str, email: &str, field: &str, errors: &mut FieldErrors) {
    if password.chars().count() < PASSWORD_MIN {
        errors.add(
            field,
            format!("This password is too short. It must contain at least {} characters.", PASSWORD_MIN),
        );
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        errors.add(field, "This password is entirely numeric.");
    }
    let lowered = password.to_lowercase();
    if COMMON_PASSWORDS.contains(&lowered.as_str()) {
        errors.add(field, "This password is too common.");
    }
    let email_local = email.split('@').next().unwrap_or("");
    if is_too_similar(&lowered, username) || is_too_similar(&lowered, email_local) {
        errors.add(field, "The password is too similar to the personal information.");
    }
}

fn is_too_similar(password: &str, attribute: &str) -> bool {
    let attribute = attribute.to_lowercase();
    if attribute.len() < 3 || password.is_empty() {
        return false;
    }
    password.contains(&attribute) || attribute.contains(password)
}

pub fn validate_registration(req: &RegisterRequest) -> Result<ValidRegistration, ApiError> {
    let mut errors = FieldErrors::new();
    let username = req.username.trim();
    let email = req.email.trim();

    validate_username(username, &mut errors);
    validate_email(email, &mut errors);

    if req.password.is_empty() {
        errors.add("password", REQUIRED);
    }
    if req.password_confirm.is_empty() {
        errors.add("password_confirm", REQUIRED);
    }

    if !req.password.is_empty() && !req.password_confirm.is_empty() {
        if req.password != req.password_confirm {
            errors.add_non_field(PASSWORD_MISMATCH);
        } else {
            validate_password_policy(&req.password, username, email, "password", &mut errors);
        }
    }

    errors.into_result()?;
    Ok(ValidRegistration {
        username: username.to_string(),
        email: email.to_string(),
        password: req.password.clone(),
    })
}

pub fn validate_login(req: &LoginRequest) -> Result<(), ApiError> {
    let mut errors = FieldErrors::new();
    if req.identifier.trim().is_empty() {
        errors.add("identifier", REQUIRED);
    }
    if req.password.is_empty() {
        errors.add("password", REQUIRED);
    }
    errors.into_result()
}

fn required_in_range(value: Option<i32>, field: &str, (min, max): (i32, i32), errors: &mut FieldErrors) -> i32 {
    match value {
        None => {
            errors.add(field, REQUIRED);
            0
        }
        Some(v) if v < min => {
            errors.add(field, format!("Ensure this value is greater than or equal to {}.", min));
            v
        }
        Some(v) if v > max => {
            errors.add(field, format!("Ensure this value is less than or equal to {}.", max));
            v
        }
        Some(v) => v,
    }
}

/// Accepts a JSON object of boolean flags, or its string encoding (form posts).
fn validate_checklist(value: Option<&Value>, errors: &mut FieldErrors) -> Value {
    const FIELD: &str = "behaviors_checklist";
    let parsed = match value {
        None | Some(Value::Null) => return Value::Object(Map::new()),
        Some(Value::String(raw)) if raw.trim().is_empty() => return Value::Object(Map::new()),
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
            Ok(v) => v,
            Err(_) => {
                errors.add(FIELD, "Enter a valid JSON object.");
                return Value::Null;
            }
        },
        Some(other) => other.clone(),
    };

    match &parsed {
        Value::Object(map) => {
            if map.len() > CHECKLIST_MAX_KEYS {
                errors.add(FIELD, format!("At most {} behaviors may be recorded.", CHECKLIST_MAX_KEYS));
            }
            if map.values().any(|v| !v.is_boolean()) {
                errors.add(FIELD, "Each behavior must be checked (true) or unchecked (false).");
            }
        }
        _ => errors.add(FIELD, "Enter a valid JSON object."),
    }
    parsed
}

/// Validates a symptom log form. `today` is the server date; `log_date`
/// defaults to it and may not lie after it.
pub fn validate_symptom_log(req: &SymptomLogRequest, today: NaiveDate) -> Result<ValidSymptomLog, ApiError> {
    let mut errors = FieldErrors::new();

    let log_date = req.log_date.unwrap_or(today);
    if log_date > today {
        errors.add("log_date", "The date cannot be in the future.");
    }

    let severity = required_in_range(req.severity, "severity", SEVERITY_RANGE, &mut errors);
    let communication_rating =
        required_in_range(req.communication_rating, "communication_rating", RATING_RANGE, &mut errors);
    let social_interaction_rating =
        required_in_range(req.social_interaction_rating, "social_interaction_rating", RATING_RANGE, &mut errors);
    let repetitive_behavior_rating =
        required_in_range(req.repetitive_behavior_rating, "repetitive_behavior_rating", RATING_RANGE, &mut errors);
    let sensory_sensitivity_rating =
        required_in_range(req.sensory_sensitivity_rating, "sensory_sensitivity_rating", RATING_RANGE, &mut errors);
    let mood_rating = required_in_range(req.mood_rating, "mood_rating", RATING_RANGE, &mut errors);

    let description = req.description.as_deref().unwrap_or("").trim().to_string();
    if description.is_empty() {
        errors.add("description", REQUIRED);
    } else if description.chars().count() > DESCRIPTION_MAX {
        errors.add("description", format!("Ensure this value has at most {} characters.", DESCRIPTION_MAX));
    }

    let notes = req
        .notes
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);
    if notes.as_ref().is_some_and(|n| n.chars().count() > NOTES_MAX) {
        errors.add("notes", format!("Ensure this value has at most {} characters.", NOTES_MAX));
    }

    let behaviors_checklist = validate_checklist(req.behaviors_checklist.as_ref(), &mut errors);

    errors.into_result()?;
    Ok(ValidSymptomLog {
        log_date,
        severity,
        communication_rating,
        social_interaction_rating,
        repetitive_behavior_rating,
        sensory_sensitivity_rating,
        mood_rating,
        description,
        notes,
        behaviors_checklist,
    })
}
