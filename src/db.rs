// src/db.rs
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use tracing::info;

use crate::store::StoreError;

pub async fn create_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<Pool<Postgres>, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    info!(max_connections, "Connected to Postgres");
    Ok(pool)
}

/// Brings the schema up to date with `migrations/`.
pub async fn migrate(pool: &Pool<Postgres>) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;

    info!("Database schema is up to date");
    Ok(())
}
