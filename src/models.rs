use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Account role. Stored lowercase in `profile.role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Caregiver,
    #[serde(alias = "doctor")]
    Clinician,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Caregiver => "caregiver",
            Role::Clinician => "clinician",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "caregiver" => Ok(Role::Caregiver),
            "clinician" | "doctor" => Ok(Role::Clinician),
            "admin" => Ok(Role::Admin),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

#[derive(Queryable, Selectable, Serialize, Debug, Clone)]
#[diesel(table_name = crate::schema::user_account)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserAccount {
    pub user_id: i32,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub date_joined: NaiveDateTime,
    pub last_login: Option<NaiveDateTime>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::user_account)]
pub struct NewUserAccount {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Queryable, Selectable, Serialize, Debug, Clone)]
#[diesel(table_name = crate::schema::profile)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Profile {
    pub user_id: i32,
    pub role: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Profile {
    /// Parsed role; an unrecognised value counts as no role.
    pub fn role(&self) -> Option<Role> {
        self.role.parse().ok()
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::profile)]
pub struct NewProfile<'a> {
    pub user_id: i32,
    pub role: &'a str,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::user_session)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserSession {
    pub session_id: Uuid,
    pub user_id: i32,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub expires_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
    pub revoked_at: Option<NaiveDateTime>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::user_session)]
pub struct NewUserSession {
    pub session_id: Uuid,
    pub user_id: i32,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub expires_at: NaiveDateTime,
}

#[derive(Queryable, Selectable, Serialize, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::symptom_log)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SymptomLog {
    pub log_id: i32,
    pub caregiver_id: i32,
    pub log_date: NaiveDate,
    pub severity: i32,
    pub communication_rating: i32,
    pub social_interaction_rating: i32,
    pub repetitive_behavior_rating: i32,
    pub sensory_sensitivity_rating: i32,
    pub mood_rating: i32,
    pub description: String,
    pub notes: Option<String>,
    pub behaviors_checklist: serde_json::Value,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::symptom_log)]
pub struct NewSymptomLog {
    pub caregiver_id: i32,
    pub log_date: NaiveDate,
    pub severity: i32,
    pub communication_rating: i32,
    pub social_interaction_rating: i32,
    pub repetitive_behavior_rating: i32,
    pub sensory_sensitivity_rating: i32,
    pub mood_rating: i32,
    pub description: String,
    pub notes: Option<String>,
    pub behaviors_checklist: serde_json::Value,
}

/// Client-editable columns of a symptom log.
#[derive(AsChangeset, Debug, Clone)]
#[diesel(table_name = crate::schema::symptom_log)]
#[diesel(treat_none_as_null = true)]
pub struct SymptomLogChanges {
    pub severity: i32,
    pub communication_rating: i32,
    pub social_interaction_rating: i32,
    pub repetitive_behavior_rating: i32,
    pub sensory_sensitivity_rating: i32,
    pub mood_rating: i32,
    pub description: String,
    pub notes: Option<String>,
    pub behaviors_checklist: serde_json::Value,
    pub updated_at: NaiveDateTime,
}

/// Label derived from the latest severity; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SupportStatus {
    #[serde(rename = "doing well")]
    DoingWell,
    #[serde(rename = "needs extra support")]
    NeedsExtraSupport,
    #[serde(rename = "support recommended")]
    SupportRecommended,
}

impl SupportStatus {
    pub fn from_severity(severity: i32) -> Self {
        match severity {
            i32::MIN..=3 => SupportStatus::DoingWell,
            4..=6 => SupportStatus::NeedsExtraSupport,
            _ => SupportStatus::SupportRecommended,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SupportStatus::DoingWell => "doing well",
            SupportStatus::NeedsExtraSupport => "needs extra support",
            SupportStatus::SupportRecommended => "support recommended",
        }
    }
}

// DTOs
#[derive(Deserialize, Debug, Default)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, alias = "password1")]
    pub password: String,
    #[serde(default, alias = "password2")]
    pub password_confirm: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct LoginRequest {
    #[serde(default, alias = "username", alias = "email")]
    pub identifier: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct SymptomLogRequest {
    #[serde(default, deserialize_with = "blank_as_none")]
    pub log_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub severity: Option<i32>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub communication_rating: Option<i32>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub social_interaction_rating: Option<i32>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub repetitive_behavior_rating: Option<i32>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub sensory_sensitivity_rating: Option<i32>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub mood_rating: Option<i32>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub behaviors_checklist: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose<T> {
    Typed(T),
    Text(String),
}

/// Typed value from JSON, or parsed from form text; an empty input is `None`.
fn blank_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: fmt::Display,
{
    match Option::<Loose<T>>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Loose::Typed(value)) => Ok(Some(value)),
        Some(Loose::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(Loose::Text(text)) => text.trim().parse().map(Some).map_err(de::Error::custom),
    }
}

#[derive(Deserialize, Debug)]
pub struct CreateStaffRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub role: Role,
}

#[derive(Deserialize, Debug)]
pub struct SetRoleRequest {
    pub role: Role,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Claims {
    pub sub: String,      // Subject (user_id)
    pub exp: usize,       // Expiration time
    pub iat: usize,       // Issued at
    pub user_id: i32,
    pub sid: String,      // Session id
}

/// Public view of an account.
#[derive(Serialize, Debug, Clone)]
pub struct UserView {
    pub user_id: i32,
    pub username: String,
    pub email: String,
    pub role: Option<Role>,
    pub is_active: bool,
    pub date_joined: NaiveDateTime,
    pub last_login: Option<NaiveDateTime>,
}

impl UserView {
    pub fn new(user: &UserAccount, role: Option<Role>) -> Self {
        Self {
            user_id: user.user_id,
            username: user.username.clone(),
            email: user.email.clone(),
            role,
            is_active: user.is_active,
            date_joined: user.date_joined,
            last_login: user.last_login,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct DashboardView {
    pub user: UserView,
    pub records: Vec<SymptomLog>,
    pub latest: Option<SymptomLog>,
    pub support_status: Option<SupportStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn support_status_bands() {
        assert_eq!(SupportStatus::from_severity(1), SupportStatus::DoingWell);
        assert_eq!(SupportStatus::from_severity(3), SupportStatus::DoingWell);
        assert_eq!(SupportStatus::from_severity(4), SupportStatus::NeedsExtraSupport);
        assert_eq!(SupportStatus::from_severity(5), SupportStatus::NeedsExtraSupport);
        assert_eq!(SupportStatus::from_severity(6), SupportStatus::NeedsExtraSupport);
        assert_eq!(SupportStatus::from_severity(7), SupportStatus::SupportRecommended);
        assert_eq!(SupportStatus::from_severity(9), SupportStatus::SupportRecommended);
    }

    #[test]
    fn support_status_serializes_as_label() {
        let json = serde_json::to_string(&SupportStatus::NeedsExtraSupport).unwrap();
        assert_eq!(json, "\"needs extra support\"");
        assert_eq!(SupportStatus::from_severity(9).label(), "support recommended");
    }

    #[test]
    fn role_parsing_accepts_doctor_alias() {
        assert_eq!("doctor".parse::<Role>().unwrap(), Role::Clinician);
        assert_eq!("Clinician".parse::<Role>().unwrap(), Role::Clinician);
        assert_eq!("caregiver".parse::<Role>().unwrap(), Role::Caregiver);
        assert!("superuser".parse::<Role>().is_err());

        let role: Role = serde_json::from_str("\"doctor\"").unwrap();
        assert_eq!(role, Role::Clinician);
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
    }

    #[test]
    fn login_request_accepts_username_alias() {
        let req: LoginRequest =
            serde_json::from_str(r#"{"username": "sam", "password": "pw"}"#).unwrap();
        assert_eq!(req.identifier, "sam");
    }

    #[test]
    fn register_request_accepts_password1_password2() {
        let req: RegisterRequest = serde_json::from_str(
            r#"{"username": "sam", "email": "s@x.org", "password1": "a", "password2": "b"}"#,
        )
        .unwrap();
        assert_eq!(req.password, "a");
        assert_eq!(req.password_confirm, "b");
    }

    #[actix_web::test]
    async fn blank_form_inputs_deserialize_as_missing() {
        use actix_web::{test::TestRequest, web, FromRequest};

        let (req, mut payload) = TestRequest::default()
            .insert_header(("content-type", "application/x-www-form-urlencoded"))
            .set_payload("log_date=&severity=&communication_rating=3&mood_rating=+4+&description=calm")
            .to_http_parts();
        let form = web::Form::<SymptomLogRequest>::from_request(&req, &mut payload)
            .await
            .unwrap()
            .into_inner();

        assert_eq!(form.log_date, None);
        assert_eq!(form.severity, None);
        assert_eq!(form.communication_rating, Some(3));
        assert_eq!(form.mood_rating, Some(4));
        assert_eq!(form.social_interaction_rating, None);
    }

    #[test]
    fn symptom_request_keeps_typed_json_values() {
        let req: SymptomLogRequest =
            serde_json::from_str(r#"{"log_date": "2024-03-01", "severity": 7, "mood_rating": null}"#).unwrap();
        assert_eq!(req.log_date, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(req.severity, Some(7));
        assert_eq!(req.mood_rating, None);

        let req: SymptomLogRequest = serde_json::from_str(r#"{"severity": "8"}"#).unwrap();
        assert_eq!(req.severity, Some(8));
        assert!(serde_json::from_str::<SymptomLogRequest>(r#"{"severity": "high"}"#).is_err());
    }
}
