use actix_web::{web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ad_distribution_service::config::{Config, StoreBackend};
use ad_distribution_service::db::{create_pool, DistributionStore};
use ad_distribution_service::handlers::{self, AdHandlerState};
use ad_distribution_service::jobs::start_fairness_refresh;
use ad_distribution_service::{AdDistribution, InMemoryDistributionStore, PgDistributionStore};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(true),
        )
        .init();

    let config = Config::from_env().context("failed to load configuration")?;

    info!(
        "Starting ad-distribution-service v{}",
        env!("CARGO_PKG_VERSION")
    );
    info!("Environment: {}", config.app.env);

    let store: Arc<dyn DistributionStore> = match config.database.backend {
        StoreBackend::Postgres => {
            let pool = create_pool(&config.database)
                .await
                .context("failed to create database pool")?;
            Arc::new(PgDistributionStore::new(pool))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory distribution store; data is lost on restart");
            Arc::new(InMemoryDistributionStore::new())
        }
    };

    let ads = AdDistribution::new(
        store.clone(),
        config.ranking.clone(),
        config.fairness.clone(),
    );

    if config.fairness.refresh_interval_secs > 0 {
        tokio::spawn(start_fairness_refresh(
            ads.tracker.clone(),
            Duration::from_secs(config.fairness.refresh_interval_secs),
        ));
    } else {
        info!("Fairness refresh job disabled");
    }

    let state = web::Data::new(AdHandlerState::new(ads, store));
    let bind_addr = (config.app.host.clone(), config.app.port);

    info!("HTTP server listening on {}:{}", bind_addr.0, bind_addr.1);

    HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(state.clone())
            .configure(handlers::configure)
    })
    .bind(bind_addr)
    .context("failed to bind HTTP listener")?
    .run()
    .await
    .context("HTTP server error")?;

    Ok(())
}
