use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use tracing::info;

mod handlers;

use handlers::{health, odds, races};
use keiba::config::{init_tracing, Config};
use keiba::service::DataService;

/// Application state shared across handlers
pub struct AppState {
    pub service: DataService,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(&config.log_level, config.log_format);

    let addr = config.bind_addr();
    info!(
        "Environment: {} ({:?} mode)",
        config.environment,
        config.run_mode()
    );

    let service = DataService::from_config(&config).context("Failed to start data service")?;
    let app_state = Arc::new(AppState { service });

    info!("Starting Keiba odds API server at http://{}", addr);

    let server_state = app_state.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(server_state.clone()))
            .wrap(middleware::Logger::default())
            .route("/health", web::get().to(health::health_check))
            .route("/api/status", web::get().to(health::service_status))
            .route("/api/races/{date}", web::get().to(races::list_races))
            .route("/api/race/{race_id}", web::get().to(races::race_detail))
            .route("/api/odds/{race_id}", web::get().to(odds::get_odds))
    })
    .bind(&addr)
    .with_context(|| format!("Failed to bind {}", addr))?
    .run()
    .await?;

    app_state.service.close();
    Ok(())
}
