// Library root; the binary in main.rs and the integration tests build on it.

pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod logger;
pub mod middleware;
pub mod models;
pub mod permissions;
pub mod schema;
pub mod services;
pub mod session;
pub mod validation;

// Re-export common types
pub use crate::config::AppConfig;
pub use crate::db::DbPool;
pub use crate::errors::ApiError;
pub use crate::handlers::configure;
pub use crate::models::{Role, SupportStatus, UserAccount};
