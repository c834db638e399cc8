//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! tb-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `DATABASE_URL` - `PostgreSQL` connection string
//!
//! # Migration Files
//!
//! Migrations live in `crates/shop/migrations/` and are embedded in the
//! shop crate at build time.

use thirtybees_shop::db;

/// Errors that can occur while migrating.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error(transparent)]
    Command(#[from] super::CommandError),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Apply pending migrations.
pub async fn run() -> Result<(), MigrationError> {
    let pool = super::connect().await?;

    tracing::info!("Running shop migrations...");
    db::run_migrations(&pool).await?;

    tracing::info!("Shop migrations complete!");
    Ok(())
}
