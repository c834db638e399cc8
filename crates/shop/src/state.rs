//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use thirtybees_core::{LangId, ShopContext};

use crate::config::ShopConfig;
use crate::db::ConfigurationRepository;
use crate::db::RepositoryError;
use crate::services::ReferenceCache;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ShopConfig,
    pool: PgPool,
    shops: ShopContext,
    references: ReferenceCache,
}

impl AppState {
    /// Build the state for the shop named in `config`.
    #[must_use]
    pub fn new(config: ShopConfig, pool: PgPool) -> Self {
        let shops = ShopContext::single(config.shop_id);
        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                shops,
                references: ReferenceCache::new(),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ShopConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Shops requests operate on.
    #[must_use]
    pub fn shops(&self) -> &ShopContext {
        &self.inner.shops
    }

    /// Operating system and browser id cache.
    #[must_use]
    pub fn references(&self) -> &ReferenceCache {
        &self.inner.references
    }

    /// Language used when a request names none: `PS_LANG_DEFAULT`, else 1.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the configuration cannot be read.
    pub async fn default_lang(&self) -> Result<LangId, RepositoryError> {
        ConfigurationRepository::new(self.pool())
            .default_lang(self.shops().shop_id())
            .await
    }
}
