//! Database operations for the shop `PostgreSQL` database.
//!
//! # Tables
//!
//! - `shop_group`, `shop`, `lang` - Shop tree and installed languages
//! - `configuration` - Key/value settings, `id_shop = 0` for global values
//! - `product*`, `attribute*`, `image`, `stock_available`, `specific_price` - Catalog
//! - `group*`, `category_group`, `customer*` - Customer groups and members
//! - `guest`, `operating_system`, `web_browser`, `connections` - Visitor tracking
//!
//! # Migrations
//!
//! Migrations are stored in `crates/shop/migrations/` and run via:
//! ```bash
//! cargo run -p thirtybees-cli -- migrate
//! ```

pub mod catalog;
pub mod combinations;
pub mod configuration;
pub mod groups;
pub mod guests;
pub mod object_model;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use thirtybees_core::{ModelError, ValidationErrors};

pub use catalog::CatalogRepository;
pub use combinations::CombinationRepository;
pub use configuration::ConfigurationRepository;
pub use groups::GroupRepository;
pub use guests::GuestRepository;
pub use object_model::ObjectModelMapper;

/// Embedded schema migrations.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate name).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// Entity values failed validation before being written.
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
}

impl From<ModelError> for RepositoryError {
    fn from(err: ModelError) -> Self {
        Self::DataCorruption(err.to_string())
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Apply pending schema migrations.
///
/// # Errors
///
/// Returns `sqlx::migrate::MigrateError` if a migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}
