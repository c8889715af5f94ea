//! Database migration management.
//!
//! Validates and applies SQLx migrations before the API starts serving
//! requests, so the schema is always current when the reconciler runs.

use rocket_db_pools::sqlx::{self, PgPool, migrate::Migrator};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Run database migrations.
///
/// Idempotent: already-applied migrations are skipped via SQLx's tracking
/// table, and checksums guard against drift.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    log::info!("checking database migration state");
    MIGRATOR.run(pool).await?;
    log::info!("database migrations up to date");
    Ok(())
}
