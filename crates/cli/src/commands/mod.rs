//! CLI command implementations.

pub mod config;
pub mod install;
pub mod migrate;

use secrecy::SecretString;
use sqlx::PgPool;

/// Errors shared by the commands.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),
}

/// `DATABASE_URL` from the environment or `.env`.
pub fn database_url() -> Result<SecretString, CommandError> {
    dotenvy::dotenv().ok();
    std::env::var("DATABASE_URL")
        .map(SecretString::from)
        .map_err(|_| CommandError::MissingEnvVar("DATABASE_URL"))
}

/// Connect to the shop database.
pub async fn connect() -> Result<PgPool, CommandError> {
    let url = database_url()?;
    tracing::info!("Connecting to shop database...");
    Ok(thirtybees_shop::db::create_pool(&url).await?)
}
