use crate::config::{AppConfig, BootstrapAdmin};
use crate::db::{self, db_error, unique_violation, DbPool};
use crate::errors::{ApiError, FieldErrors};
use crate::models::*;
use crate::permissions::{self, Action, Scope};
use crate::validation::{
    validate_email, validate_password_policy, validate_username, ValidRegistration, ValidSymptomLog,
};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, NaiveDateTime, Utc};
use diesel::prelude::*;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, error, info, warn};
use once_cell::sync::Lazy;
use tokio::task::spawn_blocking;
use uuid::Uuid;

diesel::define_sql_function!(fn lower(x: diesel::sql_types::Text) -> diesel::sql_types::Text);

const DUPLICATE_ACCOUNT: &str = "A user with that username or email already exists.";
const DUPLICATE_DAILY_LOG: &str = "A symptom log already exists for this date.";
const LOG_NOT_FOUND: &str = "Symptom log not found.";

// Verified against when the identifier matches nobody, so both failure
// paths cost one bcrypt verification.
static DUMMY_HASH: Lazy<Option<String>> = Lazy::new(|| hash("autibloom-timing-guard", DEFAULT_COST).ok());

/// The authenticated user a service call acts on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: i32,
    pub role: Option<Role>,
}

/// Request metadata recorded on a new session.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// A freshly issued session: signed token plus the authenticated account.
#[derive(Debug)]
pub struct IssuedSession {
    pub token: String,
    pub session_id: Uuid,
    pub expires_at: NaiveDateTime,
    pub user: UserAccount,
    pub role: Option<Role>,
}

pub struct AuthService;

impl AuthService {
    /// Hashes on the blocking pool; bcrypt at `DEFAULT_COST` takes a few hundred ms.
    pub async fn hash_password(password: &str) -> Result<String, ApiError> {
        let password = password.to_owned();
        spawn_blocking(move || hash(password, DEFAULT_COST))
            .await
            .map_err(|e| {
                error!("Password hashing task failed: {}", e);
                ApiError::Internal("Failed to hash password".to_string())
            })?
            .map_err(|e| {
                error!("Failed to hash password: {}", e);
                ApiError::Internal("Failed to hash password".to_string())
            })
    }

    pub async fn verify_password(password: &str, hashed: &str) -> Result<bool, ApiError> {
        let (password, hashed) = (password.to_owned(), hashed.to_owned());
        spawn_blocking(move || verify(password, &hashed))
            .await
            .map_err(|e| {
                error!("Password verification task failed: {}", e);
                ApiError::Internal("Failed to verify password".to_string())
            })?
            .map_err(|e| {
                error!("Failed to verify password: {}", e);
                ApiError::Internal("Failed to verify password".to_string())
            })
    }

    pub fn generate_token(user_id: i32, session_id: Uuid, expires_at: NaiveDateTime, config: &AppConfig) -> Result<String, ApiError> {
        let claims = Claims {
            sub: user_id.to_string(),
            exp: expires_at.and_utc().timestamp() as usize,
            iat: Utc::now().timestamp() as usize,
            user_id,
            sid: session_id.to_string(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret.as_bytes())
        )
        .map_err(|e| {
            error!("Failed to generate token: {}", e);
            ApiError::Internal("Failed to generate token".to_string())
        })
    }

    /// Decodes and verifies a session token. Any failure is reported as unauthenticated.
    pub fn decode_token(token: &str, config: &AppConfig) -> Result<(i32, Uuid), ApiError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| {
            debug!("Rejected session token: {}", e);
            ApiError::unauthenticated()
        })?;

        let session_id = Uuid::parse_str(&data.claims.sid).map_err(|_| ApiError::unauthenticated())?;
        Ok((data.claims.user_id, session_id))
    }

    /// Verifies credentials and opens a session.
    ///
    /// Unknown identifiers and wrong passwords yield the same error; an
    /// inactive account is only reported after its password checked out.
    pub async fn login(
        identifier: &str,
        password: &str,
        client: ClientInfo,
        config: &AppConfig,
        pool: &DbPool,
    ) -> Result<IssuedSession, ApiError> {
        let user = match UserService::find_by_identifier(identifier, pool).await? {
            Some(user) => user,
            None => {
                let password = password.to_owned();
                let _ = spawn_blocking(move || DUMMY_HASH.as_deref().map(|dummy| verify(password, dummy))).await;
                debug!("Login failed: no account matches identifier");
                return Err(ApiError::invalid_credentials());
            }
        };

        if !Self::verify_password(password, &user.password_hash).await? {
            debug!("Login failed: invalid password for user {}", user.user_id);
            return Err(ApiError::invalid_credentials());
        }

        if !user.is_active {
            warn!("Login refused for inactive user {}", user.user_id);
            return Err(ApiError::Inactive);
        }

        let (session_id, expires_at) = Self::create_session(user.user_id, client, config, pool).await?;
        let token = Self::generate_token(user.user_id, session_id, expires_at, config)?;
        Self::update_last_login(user.user_id, pool).await?;
        let role = UserService::get_role(user.user_id, pool).await?;

        info!("User {} logged in successfully", user.user_id);
        Ok(IssuedSession { token, session_id, expires_at, user, role })
    }

    pub async fn create_session(
        user_id: i32,
        client: ClientInfo,
        config: &AppConfig,
        pool: &DbPool,
    ) -> Result<(Uuid, NaiveDateTime), ApiError> {
        let expires_at = (Utc::now() + Duration::hours(config.session_ttl_hours)).naive_utc();
        let new_session = NewUserSession {
            session_id: Uuid::new_v4(),
            user_id,
            ip_address: client.ip_address.map(|ip| ip.chars().take(64).collect()),
            user_agent: client.user_agent.map(|ua| ua.chars().take(255).collect()),
            expires_at,
        };
        let session_id = new_session.session_id;

        db::run(pool, move |conn| {
            use crate::schema::user_session::dsl::*;
            diesel::insert_into(user_session)
                .values(&new_session)
                .execute(conn)
        })
        .await?
        .map_err(|e| db_error("Failed to store session", e))?;

        Ok((session_id, expires_at))
    }

    /// Returns the session if it belongs to `owner`, is not revoked and has not expired.
    pub async fn find_active_session(sid: Uuid, owner: i32, pool: &DbPool) -> Result<Option<UserSession>, ApiError> {
        db::run(pool, move |conn| {
            use crate::schema::user_session::dsl::*;
            user_session
                .find(sid)
                .filter(user_id.eq(owner))
                .filter(revoked_at.is_null())
                .filter(expires_at.gt(Utc::now().naive_utc()))
                .select(UserSession::as_select())
                .first::<UserSession>(conn)
                .optional()
        })
        .await?
        .map_err(|e| db_error("Failed to load session", e))
    }

    pub async fn revoke_session(sid: Uuid, pool: &DbPool) -> Result<(), ApiError> {
        db::run(pool, move |conn| {
            use crate::schema::user_session::dsl::*;
            diesel::update(user_session.find(sid))
                .set(revoked_at.eq(Some(Utc::now().naive_utc())))
                .execute(conn)
        })
        .await?
        .map_err(|e| db_error("Failed to revoke session", e))?;

        debug!("Session {} revoked", sid);
        Ok(())
    }

    pub async fn update_last_login(user_id_param: i32, pool: &DbPool) -> Result<(), ApiError> {
        db::run(pool, move |conn| {
            use crate::schema::user_account::dsl::*;
            diesel::update(user_account.find(user_id_param))
                .set(last_login.eq(Some(Utc::now().naive_utc())))
                .execute(conn)
        })
        .await?
        .map_err(|e| db_error("Failed to update last login", e))?;

        Ok(())
    }
}

fn revoke_all_sessions(conn: &mut PgConnection, owner: i32) -> QueryResult<usize> {
    use crate::schema::user_session::dsl::*;
    diesel::update(user_session.filter(user_id.eq(owner)).filter(revoked_at.is_null()))
        .set(revoked_at.eq(Some(Utc::now().naive_utc())))
        .execute(conn)
}

pub struct UserService;

impl UserService {
    /// Creates a user and its profile in one transaction.
    pub async fn create_account(account: &ValidRegistration, role: Role, pool: &DbPool) -> Result<UserAccount, ApiError> {
        let new_user = NewUserAccount {
            username: account.username.clone(),
            email: account.email.clone(),
            password_hash: AuthService::hash_password(&account.password).await?,
        };

        let user = db::run(pool, move |conn| {
            conn.transaction(|conn| {
                use crate::schema::{profile, user_account};

                let user = diesel::insert_into(user_account::table)
                    .values(&new_user)
                    .returning(UserAccount::as_returning())
                    .get_result(conn)?;

                diesel::insert_into(profile::table)
                    .values(&NewProfile { user_id: user.user_id, role: role.as_str() })
                    .execute(conn)?;

                Ok(user)
            })
        })
        .await?
        .map_err(|e| {
            if unique_violation(&e).is_some() {
                debug!("Attempted to create an account with an existing username or email");
                ApiError::Conflict(DUPLICATE_ACCOUNT.to_string())
            } else {
                db_error("Failed to create user", e)
            }
        })?;

        info!("Created new {} account with ID: {}", role, user.user_id);
        Ok(user)
    }

    /// Self-registration; always a caregiver.
    pub async fn register(account: &ValidRegistration, pool: &DbPool) -> Result<UserAccount, ApiError> {
        Self::create_account(account, Role::Caregiver, pool).await
    }

    /// Username match first, then case-insensitive email match.
    pub async fn find_by_identifier(identifier: &str, pool: &DbPool) -> Result<Option<UserAccount>, ApiError> {
        let ident = identifier.trim().to_string();

        db::run(pool, move |conn| {
            use crate::schema::user_account::dsl::*;
            let by_username = user_account
                .filter(username.eq(ident.as_str()))
                .select(UserAccount::as_select())
                .first::<UserAccount>(conn)
                .optional()?;
            if by_username.is_some() {
                return Ok(by_username);
            }
            user_account
                .filter(lower(email).eq(ident.to_lowercase()))
                .select(UserAccount::as_select())
                .first::<UserAccount>(conn)
                .optional()
        })
        .await?
        .map_err(|e| db_error("Error finding user by identifier", e))
    }

    pub async fn get_user_by_id(id: i32, pool: &DbPool) -> Result<UserAccount, ApiError> {
        db::run(pool, move |conn| {
            use crate::schema::user_account::dsl::*;
            user_account.find(id).select(UserAccount::as_select()).first::<UserAccount>(conn).optional()
        })
        .await?
        .map_err(|e| db_error("Error loading user", e))?
        .ok_or_else(|| {
            debug!("User not found with ID {}", id);
            ApiError::NotFound("User not found".to_string())
        })
    }

    /// Loads a user together with the role from its profile.
    pub async fn get_user_with_role(id: i32, pool: &DbPool) -> Result<Option<(UserAccount, Option<Role>)>, ApiError> {
        let row = db::run(pool, move |conn| {
            use crate::schema::{profile, user_account};
            user_account::table
                .left_join(profile::table)
                .filter(user_account::user_id.eq(id))
                .select((UserAccount::as_select(), profile::role.nullable()))
                .first::<(UserAccount, Option<String>)>(conn)
                .optional()
        })
        .await?
        .map_err(|e| db_error("Error loading user with role", e))?;

        Ok(row.map(|(user, role)| (user, role.and_then(|r| r.parse().ok()))))
    }

    /// Role from the user's profile; `None` when the profile is missing.
    pub async fn get_role(id: i32, pool: &DbPool) -> Result<Option<Role>, ApiError> {
        let profile = db::run(pool, move |conn| {
            use crate::schema::profile::dsl::*;
            profile.find(id).select(Profile::as_select()).first::<Profile>(conn).optional()
        })
        .await?
        .map_err(|e| db_error("Error loading profile", e))?;

        Ok(profile.and_then(|p| p.role()))
    }

    pub async fn list_users(pool: &DbPool) -> Result<Vec<UserView>, ApiError> {
        let rows = db::run(pool, move |conn| {
            use crate::schema::{profile, user_account};
            user_account::table
                .left_join(profile::table)
                .order(user_account::user_id.asc())
                .select((UserAccount::as_select(), profile::role.nullable()))
                .load::<(UserAccount, Option<String>)>(conn)
        })
        .await?
        .map_err(|e| db_error("Failed to list users", e))?;

        debug!("Listed {} users", rows.len());
        Ok(rows
            .iter()
            .map(|(user, role)| UserView::new(user, role.as_deref().and_then(|r| r.parse().ok())))
            .collect())
    }

    pub async fn set_role(user_id_param: i32, new_role: Role, pool: &DbPool) -> Result<UserView, ApiError> {
        let user = Self::get_user_by_id(user_id_param, pool).await?;

        db::run(pool, move |conn| {
            use crate::schema::profile::dsl::*;
            let now = Utc::now().naive_utc();
            diesel::insert_into(profile)
                .values(&NewProfile { user_id: user_id_param, role: new_role.as_str() })
                .on_conflict(user_id)
                .do_update()
                .set((role.eq(new_role.as_str()), updated_at.eq(now)))
                .execute(conn)
        })
        .await?
        .map_err(|e| db_error("Failed to set role", e))?;

        info!("Role of user {} set to {}", user_id_param, new_role);
        Ok(UserView::new(&user, Some(new_role)))
    }

    /// Activates or deactivates an account. Deactivation also revokes every
    /// open session in the same transaction.
    pub async fn set_active(id: i32, active: bool, pool: &DbPool) -> Result<UserView, ApiError> {
        let updated = db::run(pool, move |conn| {
            conn.transaction(|conn| {
                use crate::schema::user_account::dsl::*;
                let user = diesel::update(user_account.find(id))
                    .set(is_active.eq(active))
                    .returning(UserAccount::as_returning())
                    .get_result(conn)
                    .optional()?;
                if user.is_some() && !active {
                    revoke_all_sessions(conn, id)?;
                }
                Ok(user)
            })
        })
        .await?
        .map_err(|e| db_error("Failed to update account status", e))?;

        let user = updated.ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
        let role = Self::get_role(id, pool).await?;
        info!("User {} is now {}", id, if active { "active" } else { "inactive" });
        Ok(UserView::new(&user, role))
    }

    /// Creates the configured administrator unless that username already exists.
    /// The credentials go through the same checks as a registration form.
    pub async fn ensure_bootstrap_admin(admin: &BootstrapAdmin, pool: &DbPool) -> Result<(), ApiError> {
        let username = admin.username.trim();
        let email = admin.email.trim();
        let mut errors = FieldErrors::new();
        validate_username(username, &mut errors);
        validate_email(email, &mut errors);
        validate_password_policy(&admin.password, username, email, "password", &mut errors);
        if !errors.is_empty() {
            warn!("Bootstrap administrator settings rejected: {:?}", errors);
            return Err(ApiError::Validation(errors));
        }

        if Self::find_by_identifier(username, pool).await?.is_some() {
            debug!("Bootstrap administrator {} already exists", username);
            return Ok(());
        }

        let account = ValidRegistration {
            username: username.to_string(),
            email: email.to_string(),
            password: admin.password.clone(),
        };
        Self::create_account(&account, Role::Admin, pool).await?;
        info!("Bootstrap administrator {} created", username);
        Ok(())
    }
}

pub struct SymptomService;

impl SymptomService {
    pub async fn list(actor: Actor, pool: &DbPool) -> Result<Vec<SymptomLog>, ApiError> {
        let scope = permissions::require(actor.role, Action::ListLogs)?;

        let logs = db::run(pool, move |conn| {
            use crate::schema::symptom_log::dsl::*;
            let mut query = symptom_log.select(SymptomLog::as_select()).into_boxed();
            if scope == Scope::Own {
                query = query.filter(caregiver_id.eq(actor.user_id));
            }
            query.order((log_date.desc(), log_id.desc())).load::<SymptomLog>(conn)
        })
        .await?
        .map_err(|e| db_error("Failed to list symptom logs", e))?;

        debug!("Listed {} symptom logs for user {}", logs.len(), actor.user_id);
        Ok(logs)
    }

    pub async fn get(actor: Actor, id: i32, pool: &DbPool) -> Result<SymptomLog, ApiError> {
        let scope = permissions::require(actor.role, Action::ViewLog)?;

        db::run(pool, move |conn| {
            use crate::schema::symptom_log::dsl::*;
            let mut query = symptom_log.filter(log_id.eq(id)).select(SymptomLog::as_select()).into_boxed();
            if scope == Scope::Own {
                query = query.filter(caregiver_id.eq(actor.user_id));
            }
            query.first::<SymptomLog>(conn).optional()
        })
        .await?
        .map_err(|e| db_error("Failed to load symptom log", e))?
        .ok_or_else(|| ApiError::NotFound(LOG_NOT_FOUND.to_string()))
    }

    /// Inserts a log owned by the actor. The `(caregiver_id, log_date)`
    /// unique constraint rejects a second log for the same day.
    pub async fn create(actor: Actor, form: ValidSymptomLog, pool: &DbPool) -> Result<SymptomLog, ApiError> {
        permissions::require(actor.role, Action::CreateLog)?;

        let new_log = NewSymptomLog {
            caregiver_id: actor.user_id,
            log_date: form.log_date,
            severity: form.severity,
            communication_rating: form.communication_rating,
            social_interaction_rating: form.social_interaction_rating,
            repetitive_behavior_rating: form.repetitive_behavior_rating,
            sensory_sensitivity_rating: form.sensory_sensitivity_rating,
            mood_rating: form.mood_rating,
            description: form.description,
            notes: form.notes,
            behaviors_checklist: form.behaviors_checklist,
        };

        let log = db::run(pool, move |conn| {
            use crate::schema::symptom_log::dsl::*;
            diesel::insert_into(symptom_log)
                .values(&new_log)
                .returning(SymptomLog::as_returning())
                .get_result(conn)
        })
        .await?
        .map_err(|e| {
            if unique_violation(&e) == Some(db::UNIQUE_DAILY_LOG) {
                debug!("Duplicate daily log rejected for user {}", actor.user_id);
                ApiError::Conflict(DUPLICATE_DAILY_LOG.to_string())
            } else {
                db_error("Failed to create symptom log", e)
            }
        })?;

        info!("Symptom log {} created by user {}", log.log_id, actor.user_id);
        Ok(log)
    }

    /// Replaces the editable fields. The owner check is part of the UPDATE itself.
    pub async fn update(actor: Actor, id: i32, form: ValidSymptomLog, pool: &DbPool) -> Result<SymptomLog, ApiError> {
        let scope = permissions::require(actor.role, Action::UpdateLog)?;

        let changes = SymptomLogChanges {
            severity: form.severity,
            communication_rating: form.communication_rating,
            social_interaction_rating: form.social_interaction_rating,
            repetitive_behavior_rating: form.repetitive_behavior_rating,
            sensory_sensitivity_rating: form.sensory_sensitivity_rating,
            mood_rating: form.mood_rating,
            description: form.description,
            notes: form.notes,
            behaviors_checklist: form.behaviors_checklist,
            updated_at: Utc::now().naive_utc(),
        };

        let updated = db::run(pool, move |conn| {
            use crate::schema::symptom_log::dsl::*;
            match scope {
                Scope::Own => diesel::update(symptom_log.filter(log_id.eq(id)).filter(caregiver_id.eq(actor.user_id)))
                    .set(&changes)
                    .returning(SymptomLog::as_returning())
                    .get_result(conn)
                    .optional(),
                Scope::All => diesel::update(symptom_log.filter(log_id.eq(id)))
                    .set(&changes)
                    .returning(SymptomLog::as_returning())
                    .get_result(conn)
                    .optional(),
            }
        })
        .await?
        .map_err(|e| db_error("Failed to update symptom log", e))?
        .ok_or_else(|| ApiError::NotFound(LOG_NOT_FOUND.to_string()))?;

        info!("Symptom log {} updated by user {}", id, actor.user_id);
        Ok(updated)
    }

    pub async fn delete(actor: Actor, id: i32, pool: &DbPool) -> Result<(), ApiError> {
        let scope = permissions::require(actor.role, Action::DeleteLog)?;

        let deleted = db::run(pool, move |conn| {
            use crate::schema::symptom_log::dsl::*;
            match scope {
                Scope::Own => diesel::delete(symptom_log.filter(log_id.eq(id)).filter(caregiver_id.eq(actor.user_id)))
                    .execute(conn),
                Scope::All => diesel::delete(symptom_log.filter(log_id.eq(id))).execute(conn),
            }
        })
        .await?
        .map_err(|e| db_error("Failed to delete symptom log", e))?;

        if deleted == 0 {
            return Err(ApiError::NotFound(LOG_NOT_FOUND.to_string()));
        }
        info!("Symptom log {} deleted by user {}", id, actor.user_id);
        Ok(())
    }

    /// Dashboard data for a caregiver: own records, the latest one and its support status.
    pub async fn dashboard(actor: Actor, user: UserView, pool: &DbPool) -> Result<DashboardView, ApiError> {
        permissions::require(actor.role, Action::ViewDashboard)?;

        let records = Self::list(actor, pool).await?;
        let latest = records.first().cloned();
        let support_status = latest.as_ref().map(|log| SupportStatus::from_severity(log.severity));

        Ok(DashboardView { user, records, latest, support_status })
    }
}
