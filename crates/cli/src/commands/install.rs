//! Install command.
//!
//! Runs the installer steps in order against `DATABASE_URL` and writes a
//! daily log file next to the console output.
//!
//! # Environment Variables
//!
//! - `DATABASE_URL` - `PostgreSQL` connection string
//! - `INSTALL_DATA_DIR`, `INSTALL_FIXTURES_DIR` - Data and fixture files
//! - `INSTALL_LOG_DIR` - Directory of `install.log.<date>`

use std::collections::BTreeMap;
use std::path::PathBuf;

use secrecy::SecretString;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use thirtybees_shop::config::InstallConfig;
use thirtybees_shop::services::installer::{
    InstallError, InstallPlan, Installer, ShopSettings, install_log_writer,
};

/// Options of `tb-cli install`.
#[derive(Debug, clap::Args)]
pub struct InstallArgs {
    /// Settings file to generate
    #[arg(long, default_value = ".env")]
    pub settings_file: PathBuf,

    /// Drop every existing table first
    #[arg(long)]
    pub clear: bool,

    /// Language iso codes; the first one becomes the default
    #[arg(short, long = "language", default_value = "en")]
    pub languages: Vec<String>,

    #[arg(long, default_value = "My Shop")]
    pub shop_name: String,

    #[arg(long)]
    pub shop_email: String,

    #[arg(long, default_value = "US/Eastern")]
    pub timezone: String,

    /// Only load these data entities (comma separated)
    #[arg(long = "entity", value_delimiter = ',')]
    pub entities: Vec<String>,

    /// Only load these fixture entities (comma separated)
    #[arg(long = "fixture", value_delimiter = ',')]
    pub fixtures: Vec<String>,

    /// Skip demo products and customers
    #[arg(long)]
    pub skip_fixtures: bool,

    /// Extra configuration values as `KEY=VALUE`
    #[arg(long = "set", value_parser = parse_key_value)]
    pub configuration: Vec<(String, String)>,
}

fn parse_key_value(value: &str) -> Result<(String, String), String> {
    let (key, value) = value
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {value:?}"))?;
    if key.is_empty() {
        return Err("configuration key is empty".to_owned());
    }
    Ok((key.to_owned(), value.to_owned()))
}

impl InstallArgs {
    fn into_plan(self, database_url: SecretString) -> InstallPlan {
        let subset = |names: Vec<String>| (!names.is_empty()).then_some(names);
        InstallPlan {
            settings_path: self.settings_file,
            database_url,
            clear_database: self.clear,
            languages: self.languages,
            shop: ShopSettings {
                shop_name: self.shop_name,
                shop_email: self.shop_email,
                timezone: self.timezone,
                configuration: self.configuration.into_iter().collect::<BTreeMap<_, _>>(),
            },
            entities: subset(self.entities),
            fixtures: subset(self.fixtures),
            skip_fixtures: self.skip_fixtures,
        }
    }
}

/// Errors that can occur while installing.
#[derive(Debug, thiserror::Error)]
pub enum InstallCommandError {
    #[error(transparent)]
    Command(#[from] super::CommandError),

    #[error("Cannot create log directory {}: {source}", path.display())]
    LogDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Install(#[from] InstallError),
}

/// Run every installation step.
pub async fn run(args: InstallArgs) -> Result<(), InstallCommandError> {
    let dirs = InstallConfig::from_env();
    std::fs::create_dir_all(&dirs.log_dir).map_err(|source| InstallCommandError::LogDir {
        path: dirs.log_dir.clone(),
        source,
    })?;

    let (writer, _guard) = install_log_writer(&dirs.log_dir);
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "thirtybees_shop=info,tb_cli=info".into()),
        )
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .init();

    let database_url = super::database_url()?;
    let pool = super::connect().await?;

    let plan = args.into_plan(database_url);
    let mut installer = Installer::new(pool, dirs.data_dir, dirs.fixtures_dir);
    installer.run(&plan).await?;

    tracing::info!(settings = %plan.settings_path.display(), "Shop installed");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        args: InstallArgs,
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("PS_CURRENCY_DEFAULT=1").unwrap(),
            ("PS_CURRENCY_DEFAULT".to_owned(), "1".to_owned())
        );
        assert_eq!(
            parse_key_value("PS_SHOP_PHONE=").unwrap(),
            ("PS_SHOP_PHONE".to_owned(), String::new())
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=1").is_err());
    }

    #[test]
    fn test_plan_defaults() {
        let cli = Cli::parse_from(["tb-cli", "--shop-email", "admin@example.com"]);
        let plan = cli.args.into_plan(SecretString::from("postgres://localhost/shop"));

        assert_eq!(plan.languages, ["en"]);
        assert_eq!(plan.shop.shop_name, "My Shop");
        assert_eq!(plan.shop.timezone, "US/Eastern");
        assert!(plan.entities.is_none());
        assert!(!plan.skip_fixtures);
    }

    #[test]
    fn test_plan_subsets_and_config() {
        let cli = Cli::parse_from([
            "tb-cli",
            "--shop-email",
            "admin@example.com",
            "-l",
            "fr",
            "-l",
            "en",
            "--entity",
            "group,category",
            "--set",
            "PS_SHOP_PHONE=0102030405",
        ]);
        let plan = cli.args.into_plan(SecretString::from("postgres://localhost/shop"));

        assert_eq!(plan.languages, ["fr", "en"]);
        assert_eq!(plan.entities.unwrap(), ["group", "category"]);
        assert_eq!(plan.shop.configuration["PS_SHOP_PHONE"], "0102030405");
    }
}
