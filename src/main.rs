use actix_web::{web, App, HttpServer};
use log::{error, info, warn};
use std::time::Duration;

use autibloom::db::{build_pool, init_schema};
use autibloom::logger::setup_logger;
use autibloom::middleware::RequestLogger;
use autibloom::services::UserService;
use autibloom::{configure, AppConfig};

fn fail(message: String) -> std::io::Error {
    error!("{}", message);
    std::io::Error::new(std::io::ErrorKind::Other, message)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables and initialize logger
    dotenvy::dotenv().ok();
    setup_logger();

    let config = AppConfig::from_env().map_err(fail)?;
    config
        .validate()
        .map_err(|e| fail(format!("Invalid configuration: {}", e)))?;

    info!("Connecting to database");
    let pool = build_pool(&config.database_url, config.db_pool_size)
        .map_err(|e| fail(format!("Failed to create database connection pool: {}", e)))?;
    init_schema(&pool).map_err(|e| fail(format!("Failed to initialize database schema: {}", e)))?;

    match &config.bootstrap_admin {
        Some(admin) => {
            if let Err(e) = UserService::ensure_bootstrap_admin(admin, &pool).await {
                warn!("Could not create bootstrap administrator: {}", e);
            }
        }
        None => info!("No bootstrap administrator configured"),
    }

    let bind = (config.host.clone(), config.port);
    let workers = config.workers;
    info!("Starting HTTP server at http://{}:{}", bind.0, bind.1);

    let pool_data = web::Data::new(pool);
    let config_data = web::Data::new(config);

    HttpServer::new(move || {
        App::new()
            .wrap(RequestLogger)
            .app_data(pool_data.clone())
            .app_data(config_data.clone())
            .configure(configure)
    })
    .workers(workers)
    .keep_alive(Duration::from_secs(75))
    .shutdown_timeout(30)
    .bind(bind)?
    .run()
    .await
}
