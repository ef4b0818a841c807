//! Postgres connection helpers

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Webhook traffic is low-volume; a handful of connections is plenty.
const MAX_CONNECTIONS: u32 = 5;

/// Create a connection pool for regular queries
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(300))
        .connect(database_url)
        .await?;

    tracing::debug!(max_connections = MAX_CONNECTIONS, "Postgres pool created");
    Ok(pool)
}

/// Apply the billing migrations shipped with the workspace
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await
}
