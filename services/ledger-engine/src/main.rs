use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use ledger_engine::{
    config::Config,
    coordinator::{LedgerCoordinator, LedgerLimits},
    database::PgLedgerStore,
    handlers::{self, HealthProbe},
    telemetry,
};
use std::sync::Arc;
use tracing::info;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    telemetry::init(&config.logging);

    info!("Starting Ledger Engine on port {}", config.server.port);

    let store = Arc::new(
        PgLedgerStore::connect(&config.database)
            .await
            .context("Failed to connect to database")?,
    );

    if config.database.run_migrations {
        store.migrate().await.context("Failed to run migrations")?;
        info!("Database migrations applied");
    }

    let ledger = Arc::new(LedgerCoordinator::new(
        store.clone(),
        LedgerLimits::from(&config.ledger),
    ));
    let probe: Arc<dyn HealthProbe> = store;

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::NormalizePath::trim())
            .app_data(web::Data::new(ledger.clone()))
            .app_data(web::Data::new(probe.clone()))
            .configure(handlers::configure_routes::<PgLedgerStore>)
    })
    .workers(config.server.workers)
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await?;

    Ok(())
}
