//! Configuration commands.

use thirtybees_core::ShopId;
use thirtybees_shop::db::{ConfigurationRepository, RepositoryError};

/// Errors that can occur while reading or writing configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigCommandError {
    #[error(transparent)]
    Command(#[from] super::CommandError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("No value for {0}")]
    NotSet(String),
}

/// Print a configuration value, falling back to the global one.
pub async fn get(key: &str, shop: Option<i32>) -> Result<(), ConfigCommandError> {
    let pool = super::connect().await?;
    let repo = ConfigurationRepository::new(&pool);

    let value = match shop {
        Some(shop) => repo.get(key, ShopId::new(shop)).await?,
        None => repo.get_global(key).await?,
    };
    let value = value.ok_or_else(|| ConfigCommandError::NotSet(key.to_owned()))?;

    #[allow(clippy::print_stdout)]
    {
        println!("{value}");
    }
    Ok(())
}

/// Write a global configuration value.
pub async fn set(key: &str, value: &str) -> Result<(), ConfigCommandError> {
    let pool = super::connect().await?;
    ConfigurationRepository::new(&pool)
        .update_global_value(key, value)
        .await?;

    tracing::info!(key, "Configuration updated");
    Ok(())
}
