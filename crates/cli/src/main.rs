//! thirty bees CLI - Database migrations, installation and configuration.
//!
//! # Usage
//!
//! ```bash
//! # Apply schema migrations
//! tb-cli migrate
//!
//! # Install a shop with English and French
//! tb-cli install --shop-name "My Shop" --shop-email admin@example.com -l en -l fr
//!
//! # Reinstall from scratch without demo products
//! tb-cli install --clear --skip-fixtures --shop-email admin@example.com
//!
//! # Read and write configuration values
//! tb-cli config get PS_SHOP_NAME
//! tb-cli config set PS_TIMEZONE Europe/Paris
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `install` - Run the installation steps
//! - `config` - Read or write configuration values

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

use commands::install::InstallArgs;

#[derive(Parser)]
#[command(name = "tb-cli")]
#[command(author, version, about = "thirty bees CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Install the shop
    Install(Box<InstallArgs>),
    /// Read or write configuration values
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print a value
    Get {
        /// Configuration key, e.g. `PS_SHOP_NAME`
        key: String,

        /// Shop id; the global value when omitted
        #[arg(short, long)]
        shop: Option<i32>,
    },
    /// Write a global value
    Set {
        /// Configuration key
        key: String,

        /// New value
        value: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // The install command sets up its own subscriber with a log file
    if !matches!(cli.command, Commands::Install(_)) {
        tracing_subscriber::fmt::init();
    }

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Install(args) => commands::install::run(*args).await?,
        Commands::Config { action } => match action {
            ConfigAction::Get { key, shop } => commands::config::get(&key, shop).await?,
            ConfigAction::Set { key, value } => commands::config::set(&key, &value).await?,
        },
    }
    Ok(())
}
