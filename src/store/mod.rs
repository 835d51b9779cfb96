//! C4 — Store Adapter.
//!
//! A thin wrapper over a `sqlx::PgPool`: [`schema`] owns table DDL and the
//! legacy-schema evolution pass, [`queries`] owns every typed operation.

pub mod queries;
pub mod schema;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Connect and run the schema-evolution pass. Call once at startup.
pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    schema::initialize(&pool).await?;
    Ok(pool)
}
