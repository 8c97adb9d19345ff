use log::warn;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use std::env;
use std::str::FromStr;

const MIN_SECRET_LEN: usize = 32;

/// Credentials for the administrator created at start-up.
#[derive(Clone, Debug)]
pub struct BootstrapAdmin {
    pub username: String,
    pub email: String,
    pub password: String,
}

// Config
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub db_pool_size: u32,
    pub jwt_secret: String,
    pub session_ttl_hours: i64,
    pub session_cookie_name: String,
    pub session_cookie_secure: bool,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse::<T>().unwrap_or_else(|_| {
            warn!("Ignoring unparsable value for {}: {:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL must be set".to_string())?;

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(val) => val,
            Err(e) => {
                warn!("Failed to load JWT_SECRET: {}", e);
                warn!("Using a random per-process secret; sessions will not survive a restart");
                Self::generate_secure_secret()
            }
        };

        let bootstrap_admin = match (
            env::var("ADMIN_USERNAME"),
            env::var("ADMIN_EMAIL"),
            env::var("ADMIN_PASSWORD"),
        ) {
            (Ok(username), Ok(email), Ok(password)) => Some(BootstrapAdmin { username, email, password }),
            _ => None,
        };

        Ok(Self {
            database_url,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("PORT", 8080),
            workers: env_or("WORKERS", 2),
            db_pool_size: env_or("DB_POOL_SIZE", 10),
            jwt_secret,
            session_ttl_hours: env_or("SESSION_TTL_HOURS", 24),
            session_cookie_name: env::var("SESSION_COOKIE_NAME")
                .unwrap_or_else(|_| "autibloom_session".to_string()),
            session_cookie_secure: env_or("SESSION_COOKIE_SECURE", false),
            bootstrap_admin,
        })
    }

    /// Configuration used by tests; points at `database_url` and uses a fresh secret.
    pub fn for_tests(database_url: &str) -> Self {
        Self {
            database_url: database_url.to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            workers: 1,
            db_pool_size: 4,
            jwt_secret: Self::generate_secure_secret(),
            session_ttl_hours: 1,
            session_cookie_name: "autibloom_session".to_string(),
            session_cookie_secure: false,
            bootstrap_admin: None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.jwt_secret.len() < MIN_SECRET_LEN {
            return Err(format!("JWT_SECRET must be at least {} bytes", MIN_SECRET_LEN));
        }

        if self.session_ttl_hours <= 0 {
            return Err("SESSION_TTL_HOURS must be positive".to_string());
        }

        if self.db_pool_size == 0 {
            return Err("DB_POOL_SIZE must be positive".to_string());
        }

        if self.workers == 0 {
            return Err("WORKERS must be positive".to_string());
        }

        if self.session_cookie_name.is_empty() {
            return Err("SESSION_COOKIE_NAME must not be empty".to_string());
        }

        if !self.session_cookie_secure {
            warn!("Session cookie is not marked Secure; enable SESSION_COOKIE_SECURE behind TLS");
        }

        Ok(())
    }

    pub fn generate_secure_secret() -> String {
        thread_rng()
            .sample_iter(&Alphanumeric)
            .take(48)
            .map(char::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_is_valid() {
        let config = AppConfig::for_tests("postgres://localhost/test");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn short_secret_is_rejected() {
        let mut config = AppConfig::for_tests("postgres://localhost/test");
        config.jwt_secret = "tooshort".to_string();
        assert!(config.validate().unwrap_err().contains("JWT_SECRET"));
    }

    #[test]
    fn non_positive_ttl_is_rejected() {
        let mut config = AppConfig::for_tests("postgres://localhost/test");
        config.session_ttl_hours = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn generated_secrets_differ() {
        let a = AppConfig::generate_secure_secret();
        let b = AppConfig::generate_secure_secret();
        assert_eq!(a.len(), 48);
        assert_ne!(a, b);
    }
}
