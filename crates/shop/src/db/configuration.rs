//! Configuration key/value store.
//!
//! Values live in the `configuration` table, one row per key and shop.
//! `id_shop = 0` holds the global value used when a shop has no override.

use sqlx::PgPool;
use tracing::instrument;

use thirtybees_core::{LangId, ShopId};

use super::RepositoryError;

/// Well-known configuration keys.
pub mod keys {
    pub const COMBINATION_FEATURE_ACTIVE: &str = "PS_COMBINATION_FEATURE_ACTIVE";
    pub const GROUP_FEATURE_ACTIVE: &str = "PS_GROUP_FEATURE_ACTIVE";
    pub const UNIDENTIFIED_GROUP: &str = "PS_UNIDENTIFIED_GROUP";
    pub const GUEST_GROUP: &str = "PS_GUEST_GROUP";
    pub const CUSTOMER_GROUP: &str = "PS_CUSTOMER_GROUP";
    pub const LANG_DEFAULT: &str = "PS_LANG_DEFAULT";
    pub const SHOP_DEFAULT: &str = "PS_SHOP_DEFAULT";
    pub const SHOP_NAME: &str = "PS_SHOP_NAME";
    pub const SHOP_EMAIL: &str = "PS_SHOP_EMAIL";
    pub const TIMEZONE: &str = "PS_TIMEZONE";
    pub const VERSION_DB: &str = "PS_VERSION_DB";
    pub const INSTALL_VERSION: &str = "PS_INSTALL_VERSION";
}

/// Interpret a stored value as a flag. Anything but a non-zero integer or
/// `true` is off.
#[must_use]
pub fn parse_bool(value: &str) -> bool {
    let value = value.trim();
    value.eq_ignore_ascii_case("true") || value.parse::<i64>().is_ok_and(|v| v != 0)
}

/// Repository for configuration values.
pub struct ConfigurationRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ConfigurationRepository<'a> {
    /// Create a new configuration repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Value of `key` for `shop`, falling back to the global value.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, key: &str, shop: ShopId) -> Result<Option<String>, RepositoryError> {
        let value: Option<Option<String>> = sqlx::query_scalar(
            r"
            SELECT value FROM configuration
            WHERE name = $1 AND id_shop IN ($2, 0)
            ORDER BY id_shop DESC
            LIMIT 1
            ",
        )
        .bind(key)
        .bind(shop)
        .fetch_optional(self.pool)
        .await?;

        Ok(value.flatten())
    }

    /// Global value of `key`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_global(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        let value: Option<Option<String>> =
            sqlx::query_scalar("SELECT value FROM configuration WHERE name = $1 AND id_shop = 0")
                .bind(key)
                .fetch_optional(self.pool)
                .await?;

        Ok(value.flatten())
    }

    /// Flag value of `key` for `shop`; unset keys are off.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_bool(&self, key: &str, shop: ShopId) -> Result<bool, RepositoryError> {
        Ok(self.get(key, shop).await?.is_some_and(|v| parse_bool(&v)))
    }

    /// Integer value of `key` for `shop`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the value is not an integer.
    pub async fn get_int(&self, key: &str, shop: ShopId) -> Result<Option<i32>, RepositoryError> {
        self.get(key, shop)
            .await?
            .filter(|v| !v.trim().is_empty())
            .map(|v| {
                v.trim().parse::<i32>().map_err(|e| {
                    RepositoryError::DataCorruption(format!("configuration {key} = {v:?}: {e}"))
                })
            })
            .transpose()
    }

    /// Default language of `shop`: `PS_LANG_DEFAULT`, else language 1.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the value is not an integer.
    pub async fn default_lang(&self, shop: ShopId) -> Result<LangId, RepositoryError> {
        let lang = self.get_int(keys::LANG_DEFAULT, shop).await?;
        Ok(LangId::new(lang.filter(|id| *id > 0).unwrap_or(1)))
    }

    /// Set the global value of `key`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the statement fails.
    #[instrument(skip(self, value))]
    pub async fn update_global_value(&self, key: &str, value: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO configuration (name, value, id_shop)
            VALUES ($1, $2, 0)
            ON CONFLICT (name, id_shop) DO UPDATE SET value = $2, date_upd = NOW()
            ",
        )
        .bind(key)
        .bind(value)
        .execute(self.pool)
        .await?;

        tracing::debug!("Configuration updated");
        Ok(())
    }
}
