//! Shop installer.
//!
//! Installation runs as a fixed sequence of steps. Steps never run
//! concurrently; the first failing step stops the run and is reported
//! together with its error. Every step and error is logged, and
//! [`install_log_writer`] adds a daily log file for the run.

pub mod loader;
pub mod settings_file;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use secrecy::SecretString;
use serde::Deserialize;
use sqlx::PgPool;
use sqlx::migrate::MigrateError;
use tracing::{error, info, instrument, warn};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};

use thirtybees_core::LangId;

use crate::db::configuration::{ConfigurationRepository, keys};
use crate::db::{MIGRATOR, RepositoryError};
use loader::{DataLoader, IdMap, LoadMode};
use settings_file::Settings;

/// Version recorded by a fresh installation.
pub const INSTALL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Errors raised by the installer.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("{} file is not writable (check permissions)", .0.display())]
    SettingsFileNotWritable(PathBuf),

    #[error("{} folder is not writable (check permissions)", .0.display())]
    SettingsDirNotWritable(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid data file {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("no data file for entity {entity} in {}", dir.display())]
    DataFileNotFound { dir: PathBuf, entity: String },

    #[error("{entity} row {row}: unresolved reference {reference}")]
    UnresolvedReference {
        entity: String,
        row: String,
        reference: String,
    },

    #[error("{entity}: unknown column {column}")]
    UnknownColumn { entity: String, column: String },

    #[error("{entity}.{column}: {reason}")]
    InvalidValue {
        entity: String,
        column: String,
        reason: String,
    },

    #[error("data files refer to each other: {0}")]
    DependencyCycle(String),

    #[error("unknown language iso code {0:?}")]
    InvalidLanguage(String),

    #[error("data loader error: {0}")]
    Loader(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] MigrateError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("step {step} failed: {source}")]
    StepFailed {
        step: InstallStep,
        #[source]
        source: Box<InstallError>,
    },
}

/// Steps of an installation, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStep {
    GenerateSettingsFile,
    InstallDatabase,
    InstallDefaultData,
    PopulateDatabase,
    ConfigureShop,
    InstallFixtures,
}

impl InstallStep {
    pub const ALL: [Self; 6] = [
        Self::GenerateSettingsFile,
        Self::InstallDatabase,
        Self::InstallDefaultData,
        Self::PopulateDatabase,
        Self::ConfigureShop,
        Self::InstallFixtures,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::GenerateSettingsFile => "generate_settings_file",
            Self::InstallDatabase => "install_database",
            Self::InstallDefaultData => "install_default_data",
            Self::PopulateDatabase => "populate_database",
            Self::ConfigureShop => "configure_shop",
            Self::InstallFixtures => "install_fixtures",
        }
    }
}

impl std::fmt::Display for InstallStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Languages
// =============================================================================

/// A language the installer can set up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Language {
    pub iso_code: &'static str,
    pub name: &'static str,
    pub language_code: &'static str,
    pub is_rtl: bool,
}

const LANGUAGES: &[Language] = &[
    Language { iso_code: "en", name: "English (English)", language_code: "en-us", is_rtl: false },
    Language { iso_code: "fr", name: "Français (French)", language_code: "fr-fr", is_rtl: false },
    Language { iso_code: "de", name: "Deutsch (German)", language_code: "de-de", is_rtl: false },
    Language { iso_code: "es", name: "Español (Spanish)", language_code: "es-es", is_rtl: false },
    Language { iso_code: "it", name: "Italiano (Italian)", language_code: "it-it", is_rtl: false },
    Language { iso_code: "nl", name: "Nederlands (Dutch)", language_code: "nl-nl", is_rtl: false },
    Language { iso_code: "pl", name: "Polski (Polish)", language_code: "pl-pl", is_rtl: false },
    Language { iso_code: "pt", name: "Português (Portuguese)", language_code: "pt-pt", is_rtl: false },
    Language { iso_code: "cs", name: "Čeština (Czech)", language_code: "cs-cz", is_rtl: false },
    Language { iso_code: "ru", name: "Русский (Russian)", language_code: "ru-ru", is_rtl: false },
    Language { iso_code: "ar", name: "العربية (Arabic)", language_code: "ar-sa", is_rtl: true },
];

/// Installable language with the given iso code.
#[must_use]
pub fn language(iso_code: &str) -> Option<&'static Language> {
    LANGUAGES.iter().find(|l| l.iso_code.eq_ignore_ascii_case(iso_code))
}

/// Resolve iso codes to languages, dropping repeats.
///
/// # Errors
///
/// Returns `InstallError::InvalidLanguage` for an unknown iso code.
pub fn resolve_languages(iso_codes: &[String]) -> Result<Vec<&'static Language>, InstallError> {
    let mut languages: Vec<&'static Language> = Vec::new();
    for iso in iso_codes {
        let language = language(iso).ok_or_else(|| InstallError::InvalidLanguage(iso.clone()))?;
        if !languages.contains(&language) {
            languages.push(language);
        }
    }
    Ok(languages)
}

// =============================================================================
// Installer
// =============================================================================

/// Shop settings applied by [`Installer::configure_shop`].
#[derive(Debug, Clone, Deserialize)]
pub struct ShopSettings {
    pub shop_name: String,
    pub shop_email: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Extra configuration values, written last.
    #[serde(default)]
    pub configuration: BTreeMap<String, String>,
}

fn default_timezone() -> String {
    "US/Eastern".to_owned()
}

impl Default for ShopSettings {
    fn default() -> Self {
        Self {
            shop_name: "My Shop".to_owned(),
            shop_email: String::new(),
            timezone: default_timezone(),
            configuration: BTreeMap::new(),
        }
    }
}

/// Everything a full installation run needs.
#[derive(Debug)]
pub struct InstallPlan {
    pub settings_path: PathBuf,
    pub database_url: SecretString,
    pub clear_database: bool,
    /// Iso codes; the first one becomes the default language.
    pub languages: Vec<String>,
    pub shop: ShopSettings,
    /// Entities to populate; all data files when `None`.
    pub entities: Option<Vec<String>>,
    /// Fixture entities to load; all fixtures when `None`.
    pub fixtures: Option<Vec<String>>,
    pub skip_fixtures: bool,
}

/// Runs installation steps against one database.
pub struct Installer {
    pool: PgPool,
    data_dir: PathBuf,
    fixtures_dir: PathBuf,
    ids: Option<IdMap>,
}

impl Installer {
    #[must_use]
    pub fn new(pool: PgPool, data_dir: impl Into<PathBuf>, fixtures_dir: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            data_dir: data_dir.into(),
            fixtures_dir: fixtures_dir.into(),
            ids: None,
        }
    }

    /// Symbolic ids resolved by the data and fixture steps so far.
    #[must_use]
    pub const fn ids(&self) -> Option<&IdMap> {
        self.ids.as_ref()
    }

    /// Run every step of `plan` in order.
    ///
    /// # Errors
    ///
    /// Returns `InstallError::StepFailed` naming the first step that failed.
    #[instrument(skip(self, plan))]
    pub async fn run(&mut self, plan: &InstallPlan) -> Result<(), InstallError> {
        for step in InstallStep::ALL {
            if step == InstallStep::InstallFixtures && plan.skip_fixtures {
                info!(%step, "Step skipped");
                continue;
            }

            info!(%step, "Step started");
            let result = match step {
                InstallStep::GenerateSettingsFile => self
                    .generate_settings_file(&plan.settings_path, plan.database_url.clone())
                    .map(|_| ()),
                InstallStep::InstallDatabase => self.install_database(plan.clear_database).await,
                InstallStep::InstallDefaultData => self
                    .install_default_data(&plan.shop.shop_name, &plan.languages)
                    .await
                    .map(|_| ()),
                InstallStep::PopulateDatabase => {
                    self.populate_database(plan.entities.as_deref()).await.map(|_| ())
                }
                InstallStep::ConfigureShop => self.configure_shop(&plan.shop).await,
                InstallStep::InstallFixtures => {
                    self.install_fixtures(plan.fixtures.as_deref()).await.map(|_| ())
                }
            };

            if let Err(e) = result {
                error!(%step, error = %e, "Installation step failed");
                return Err(InstallError::StepFailed {
                    step,
                    source: Box::new(e),
                });
            }
            info!(%step, "Step finished");
        }

        info!("Installation complete");
        Ok(())
    }

    /// Write the settings file with fresh secrets.
    ///
    /// # Errors
    ///
    /// Returns an `InstallError` if the file or its directory is not writable.
    pub fn generate_settings_file(
        &self,
        path: &Path,
        database_url: SecretString,
    ) -> Result<Settings, InstallError> {
        let settings = Settings::generate(database_url, Utc::now().date_naive(), INSTALL_VERSION);
        settings_file::write(path, &settings)?;
        Ok(settings)
    }

    /// Apply the schema migrations, optionally dropping every table first.
    ///
    /// # Errors
    ///
    /// Returns `InstallError::Database` or `InstallError::Migration` on failure.
    #[instrument(skip(self))]
    pub async fn install_database(&self, clear: bool) -> Result<(), InstallError> {
        if clear {
            self.clear_database().await?;
        }
        MIGRATOR.run(&self.pool).await?;
        info!("Database schema installed");
        Ok(())
    }

    /// Drop every table of the current schema, migration history included.
    ///
    /// # Errors
    ///
    /// Returns `InstallError::Database` if a statement fails.
    pub async fn clear_database(&self) -> Result<(), InstallError> {
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT tablename::TEXT FROM pg_tables WHERE schemaname = current_schema()",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut tx = self.pool.begin().await?;
        for table in &tables {
            sqlx::query(&format!(
                "DROP TABLE IF EXISTS {} CASCADE",
                crate::db::object_model::sql::quote_ident(table)
            ))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        warn!(count = tables.len(), "Existing tables dropped");
        Ok(())
    }

    /// Create the default shop and install languages.
    ///
    /// Returns the installed languages by iso code.
    ///
    /// # Errors
    ///
    /// Returns `InstallError::InvalidLanguage` for an unknown iso code.
    /// Returns `InstallError::Database` if a statement fails.
    #[instrument(skip(self))]
    pub async fn install_default_data(
        &self,
        shop_name: &str,
        iso_codes: &[String],
    ) -> Result<BTreeMap<String, LangId>, InstallError> {
        let mut languages = resolve_languages(iso_codes)?;
        if languages.is_empty() {
            languages = LANGUAGES.iter().take(1).collect();
        }

        let mut tx = self.pool.begin().await?;
        let shop_group: i32 = sqlx::query_scalar(
            "INSERT INTO shop_group (name, active) VALUES ('Default', TRUE) RETURNING id_shop_group",
        )
        .fetch_one(&mut *tx)
        .await?;
        let shop: i32 = sqlx::query_scalar(
            r"
            INSERT INTO shop (id_shop_group, name, id_category, id_theme, active)
            VALUES ($1, $2, 2, 1, TRUE)
            RETURNING id_shop
            ",
        )
        .bind(shop_group)
        .bind(shop_name)
        .fetch_one(&mut *tx)
        .await?;

        let mut installed = BTreeMap::new();
        for language in &languages {
            let id: i32 = sqlx::query_scalar(
                r"
                INSERT INTO lang (name, iso_code, language_code, active, is_rtl)
                VALUES ($1, $2, $3, TRUE, $4)
                ON CONFLICT (iso_code) DO UPDATE SET active = TRUE
                RETURNING id_lang
                ",
            )
            .bind(language.name)
            .bind(language.iso_code)
            .bind(language.language_code)
            .bind(language.is_rtl)
            .fetch_one(&mut *tx)
            .await?;
            installed.insert(language.iso_code.to_owned(), LangId::new(id));
        }
        tx.commit().await?;

        let default_lang = languages
            .first()
            .and_then(|l| installed.get(l.iso_code))
            .map_or(1, LangId::as_i32);

        let config = ConfigurationRepository::new(&self.pool);
        config
            .update_global_value(keys::LANG_DEFAULT, &default_lang.to_string())
            .await?;
        config
            .update_global_value(keys::SHOP_DEFAULT, &shop.to_string())
            .await?;
        config.update_global_value(keys::VERSION_DB, INSTALL_VERSION).await?;
        config
            .update_global_value(keys::INSTALL_VERSION, INSTALL_VERSION)
            .await?;

        info!(shop_id = shop, languages = installed.len(), "Default data installed");
        Ok(installed)
    }

    /// Installed languages by iso code.
    ///
    /// # Errors
    ///
    /// Returns `InstallError::Database` if the query fails.
    pub async fn languages(&self) -> Result<BTreeMap<String, LangId>, InstallError> {
        let rows: Vec<(String, i32)> =
            sqlx::query_as("SELECT TRIM(iso_code), id_lang FROM lang ORDER BY id_lang")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(iso, id)| (iso, LangId::new(id)))
            .collect())
    }

    /// Load the data files, all of them or only the named entities.
    ///
    /// The resolved ids are kept for [`Installer::install_fixtures`].
    ///
    /// # Errors
    ///
    /// Returns an `InstallError` on the first file that fails.
    #[instrument(skip(self))]
    pub async fn populate_database(
        &mut self,
        entities: Option<&[String]>,
    ) -> Result<usize, InstallError> {
        let languages = self.languages().await?;
        let mut loader = DataLoader::new(&self.pool, &self.data_dir, languages);
        if let Some(ids) = self.ids.take() {
            loader = loader.with_ids(ids);
        }

        let count = match entities {
            Some(entities) => loader.populate_entities(entities, LoadMode::Insert).await?,
            None => loader.populate_all(LoadMode::Insert).await?,
        };

        self.ids = Some(loader.into_ids());
        info!(count, "Database populated");
        Ok(count)
    }

    /// Apply the shop settings and point the default groups at the first
    /// three groups.
    ///
    /// # Errors
    ///
    /// Returns `InstallError::Repository` if a value cannot be written.
    #[instrument(skip(self, settings), fields(shop_name = %settings.shop_name))]
    pub async fn configure_shop(&self, settings: &ShopSettings) -> Result<(), InstallError> {
        let config = ConfigurationRepository::new(&self.pool);
        config
            .update_global_value(keys::INSTALL_VERSION, INSTALL_VERSION)
            .await?;
        config
            .update_global_value(keys::SHOP_NAME, &settings.shop_name)
            .await?;
        config
            .update_global_value(keys::SHOP_EMAIL, &settings.shop_email)
            .await?;
        config.update_global_value(keys::TIMEZONE, &settings.timezone).await?;

        let groups: Vec<i32> =
            sqlx::query_scalar(r#"SELECT id_group FROM "group" ORDER BY id_group LIMIT 3"#)
                .fetch_all(&self.pool)
                .await?;
        for (key, group) in default_group_keys().into_iter().zip(groups) {
            config.update_global_value(key, &group.to_string()).await?;
        }

        for (key, value) in &settings.configuration {
            config.update_global_value(key, value).await?;
        }

        info!("Shop configured");
        Ok(())
    }

    /// Load the fixture files on top of the data files.
    ///
    /// References into the data files resolve through the ids of
    /// [`Installer::populate_database`]; when that step did not run in this
    /// process the ids are rebuilt by looking the data rows up.
    ///
    /// # Errors
    ///
    /// Returns an `InstallError` on the first file that fails.
    #[instrument(skip(self))]
    pub async fn install_fixtures(
        &mut self,
        entities: Option<&[String]>,
    ) -> Result<usize, InstallError> {
        let languages = self.languages().await?;

        let ids = match self.ids.take() {
            Some(ids) if !ids.is_empty() => ids,
            _ => {
                let mut rebuild = DataLoader::new(&self.pool, &self.data_dir, languages.clone());
                rebuild.populate_all(LoadMode::Lookup).await?;
                info!(ids = rebuild.ids().len(), "Data ids rebuilt");
                rebuild.into_ids()
            }
        };

        let mut loader = DataLoader::new(&self.pool, &self.fixtures_dir, languages).with_ids(ids);
        let count = match entities {
            Some(entities) => loader.populate_entities(entities, LoadMode::Insert).await?,
            None => loader.populate_all(LoadMode::Insert).await?,
        };

        self.ids = Some(loader.into_ids());
        info!(count, "Fixtures installed");
        Ok(count)
    }
}

/// Default group keys, in the order the default groups are created.
#[must_use]
pub const fn default_group_keys() -> [&'static str; 3] {
    [keys::UNIDENTIFIED_GROUP, keys::GUEST_GROUP, keys::CUSTOMER_GROUP]
}

/// Writer for a daily rotated `install.log` in `dir`.
///
/// Keep the guard alive for the whole run so buffered lines get flushed.
#[must_use]
pub fn install_log_writer(dir: &Path) -> (NonBlocking, WorkerGuard) {
    let appender = RollingFileAppender::new(Rotation::DAILY, dir, "install.log");
    tracing_appender::non_blocking(appender)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_run_in_install_order() {
        let names: Vec<&str> = InstallStep::ALL.iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            [
                "generate_settings_file",
                "install_database",
                "install_default_data",
                "populate_database",
                "configure_shop",
                "install_fixtures",
            ]
        );
    }

    #[test]
    fn test_resolve_languages_drops_repeats() {
        let languages =
            resolve_languages(&["fr".to_owned(), "EN".to_owned(), "fr".to_owned()]).unwrap();
        let isos: Vec<&str> = languages.iter().map(|l| l.iso_code).collect();
        assert_eq!(isos, ["fr", "en"]);
    }

    #[test]
    fn test_resolve_languages_rejects_unknown() {
        assert!(matches!(
            resolve_languages(&["xx".to_owned()]),
            Err(InstallError::InvalidLanguage(iso)) if iso == "xx"
        ));
    }

    #[test]
    fn test_step_failure_names_step() {
        let error = InstallError::StepFailed {
            step: InstallStep::PopulateDatabase,
            source: Box::new(InstallError::DependencyCycle("a, b".to_owned())),
        };
        assert_eq!(
            error.to_string(),
            "step populate_database failed: data files refer to each other: a, b"
        );
    }

    #[test]
    fn test_default_group_order() {
        assert_eq!(
            default_group_keys(),
            ["PS_UNIDENTIFIED_GROUP", "PS_GUEST_GROUP", "PS_CUSTOMER_GROUP"]
        );
    }

    #[test]
    fn test_install_log_writer_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let (writer, guard) = install_log_writer(dir.path());
        drop(writer);
        drop(guard);
        let created = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .any(|e| e.file_name().to_string_lossy().starts_with("install.log"));
        assert!(created);
    }
}
