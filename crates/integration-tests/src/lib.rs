//! Integration tests for the thirty bees back office.
//!
//! # Running Tests
//!
//! ```bash
//! # Router and data file tests
//! cargo test -p thirtybees-integration-tests
//!
//! # Database tests, against an empty database
//! TEST_DATABASE_URL=postgres://localhost/tb_test \
//!     cargo test -p thirtybees-integration-tests -- --ignored
//! ```

use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use secrecy::SecretString;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

use thirtybees_core::ShopId;
use thirtybees_shop::config::{InstallConfig, ShopConfig};
use thirtybees_shop::state::AppState;

/// API token used by test configurations.
pub const TEST_TOKEN: &str = "aB3xY9mK2nL5pQ7rT0uW4zC6dE8fG1hJ";

/// Configuration for tests; nothing is read from the environment but the
/// installer directories.
#[must_use]
pub fn test_config(database_url: &str) -> ShopConfig {
    ShopConfig {
        database_url: SecretString::from(database_url),
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        api_token: SecretString::from(TEST_TOKEN),
        shop_id: ShopId::new(1),
        install: InstallConfig::from_env(),
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 0.0,
        sentry_traces_sample_rate: 0.0,
    }
}

/// State over a pool that never connects, for requests that fail before
/// touching the database.
///
/// # Panics
///
/// Panics if the URL cannot be parsed.
#[must_use]
pub fn offline_state() -> AppState {
    let url = "postgres://offline@127.0.0.1:1/offline";
    #[allow(clippy::expect_used)]
    let pool = PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_millis(200))
        .connect_lazy(url)
        .expect("valid database URL");
    AppState::new(test_config(url), pool)
}

/// `TEST_DATABASE_URL`, when database tests can run.
#[must_use]
pub fn test_database_url() -> Option<String> {
    std::env::var("TEST_DATABASE_URL").ok()
}

/// Connect to the test database with `schema` reset to empty and first on
/// the search path, so tests running side by side never share tables.
///
/// # Errors
///
/// Returns `sqlx::Error` if the database is unreachable.
pub async fn fresh_database(url: &str, schema: &str) -> Result<PgPool, sqlx::Error> {
    let admin = PgPoolOptions::new().max_connections(1).connect(url).await?;
    sqlx::query(&format!("DROP SCHEMA IF EXISTS \"{schema}\" CASCADE"))
        .execute(&admin)
        .await?;
    sqlx::query(&format!("CREATE SCHEMA \"{schema}\""))
        .execute(&admin)
        .await?;
    admin.close().await;

    let options = PgConnectOptions::from_str(url)?.options([("search_path", schema)]);
    PgPoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
}
