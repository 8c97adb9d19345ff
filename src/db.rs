use crate::errors::ApiError;
use actix_web::web;
use diesel::connection::SimpleConnection;
use diesel::pg::PgConnection;
use diesel::r2d2::{self, ConnectionManager, PooledConnection};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use log::{error, info};

// Type aliases
pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;
pub type DbConn = PooledConnection<ConnectionManager<PgConnection>>;

pub const UNIQUE_USERNAME: &str = "user_account_username_key";
pub const UNIQUE_EMAIL: &str = "user_account_email_lower_key";
pub const UNIQUE_DAILY_LOG: &str = "unique_daily_log_per_caregiver_date";

// Database initialization SQL
pub const DB_INIT_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS user_account (
    user_id SERIAL PRIMARY KEY,
    username VARCHAR(150) NOT NULL,
    email VARCHAR(254) NOT NULL,
    password_hash VARCHAR(255) NOT NULL,
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    date_joined TIMESTAMP NOT NULL DEFAULT NOW(),
    last_login TIMESTAMP,
    CONSTRAINT user_account_username_key UNIQUE (username)
);

CREATE UNIQUE INDEX IF NOT EXISTS user_account_email_lower_key
    ON user_account (LOWER(email));

CREATE TABLE IF NOT EXISTS profile (
    user_id INTEGER PRIMARY KEY REFERENCES user_account(user_id) ON DELETE CASCADE,
    role VARCHAR(20) NOT NULL CHECK (role IN ('caregiver', 'clinician', 'admin')),
    created_at TIMESTAMP NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMP NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS user_session (
    session_id UUID PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES user_account(user_id) ON DELETE CASCADE,
    ip_address VARCHAR(64),
    user_agent VARCHAR(255),
    expires_at TIMESTAMP NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT NOW(),
    revoked_at TIMESTAMP
);

CREATE INDEX IF NOT EXISTS user_session_user_id_idx ON user_session (user_id);

CREATE TABLE IF NOT EXISTS symptom_log (
    log_id SERIAL PRIMARY KEY,
    caregiver_id INTEGER NOT NULL REFERENCES user_account(user_id) ON DELETE CASCADE,
    log_date DATE NOT NULL DEFAULT CURRENT_DATE,
    severity INTEGER NOT NULL CHECK (severity BETWEEN 1 AND 10),
    communication_rating INTEGER NOT NULL CHECK (communication_rating BETWEEN 1 AND 5),
    social_interaction_rating INTEGER NOT NULL CHECK (social_interaction_rating BETWEEN 1 AND 5),
    repetitive_behavior_rating INTEGER NOT NULL CHECK (repetitive_behavior_rating BETWEEN 1 AND 5),
    sensory_sensitivity_rating INTEGER NOT NULL CHECK (sensory_sensitivity_rating BETWEEN 1 AND 5),
    mood_rating INTEGER NOT NULL CHECK (mood_rating BETWEEN 1 AND 5),
    description TEXT NOT NULL,
    notes TEXT,
    behaviors_checklist JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at TIMESTAMP NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMP NOT NULL DEFAULT NOW(),
    CONSTRAINT unique_daily_log_per_caregiver_date UNIQUE (caregiver_id, log_date)
);
"#;

pub fn build_pool(database_url: &str, max_size: u32) -> Result<DbPool, ApiError> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    r2d2::Pool::builder()
        .max_size(max_size)
        .build(manager)
        .map_err(|e| {
            error!("Failed to create database connection pool: {}", e);
            ApiError::Database(e.to_string())
        })
}

pub fn init_schema(pool: &DbPool) -> Result<(), ApiError> {
    let mut conn = pool.get().map_err(|e| {
        error!("Failed to get database connection: {}", e);
        ApiError::Database(e.to_string())
    })?;
    conn.batch_execute(DB_INIT_SQL).map_err(|e| {
        error!("Failed to execute database initialization script: {}", e);
        ApiError::Database(e.to_string())
    })?;
    info!("Database initialization complete.");
    Ok(())
}

/// Runs `op` on a pooled connection inside the blocking thread pool.
///
/// Diesel errors are handed to `op`'s caller untouched so that constraint
/// violations can be translated into domain errors.
pub async fn run<F, T>(pool: &DbPool, op: F) -> Result<Result<T, DieselError>, ApiError>
where
    F: FnOnce(&mut DbConn) -> Result<T, DieselError> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    web::block(move || {
        let mut conn = pool.get().map_err(|e| {
            error!("Failed to get database connection: {}", e);
            ApiError::Database(e.to_string())
        })?;
        Ok::<_, ApiError>(op(&mut conn))
    })
    .await
    .map_err(|e| {
        error!("Database operation error: {}", e);
        ApiError::Internal(e.to_string())
    })?
}

/// Name of the unique constraint a diesel error violated, if any.
pub fn unique_violation(err: &DieselError) -> Option<&str> {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            Some(info.constraint_name().unwrap_or(""))
        }
        _ => None,
    }
}

/// Maps an unexpected diesel error, logging the detail with `context`.
pub fn db_error(context: &str, err: DieselError) -> ApiError {
    error!("{}: {}", context, err);
    ApiError::Database(err.to_string())
}
