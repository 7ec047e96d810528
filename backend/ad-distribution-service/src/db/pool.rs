use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::DatabaseConfig;

/// Build the PostgreSQL pool and verify it with a round trip
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    debug!(
        max = config.max_connections,
        min = config.min_connections,
        acquire_timeout_secs = config.acquire_timeout_secs,
        "Creating database pool"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .test_before_acquire(true)
        .connect(&config.url)
        .await?;

    match sqlx::query("SELECT 1").execute(&pool).await {
        Ok(_) => {
            info!("Database pool created and verified successfully");
            Ok(pool)
        }
        Err(e) => {
            error!(error = %e, "Database connection verification failed");
            Err(e)
        }
    }
}
