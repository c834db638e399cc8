//! Settings file written at install time.
//!
//! The file is a dotenv file the server reads on start-up: database URL,
//! cookie secrets, an encryption key and the install metadata.

use std::fs;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::NaiveDate;
use rand::Rng;
use rand::distr::Alphanumeric;
use secrecy::{ExposeSecret, SecretString};

use super::InstallError;

pub const COOKIE_KEY_LEN: usize = 56;
pub const COOKIE_IV_LEN: usize = 32;
const ENCRYPTION_KEY_BYTES: usize = 32;

/// Random alphanumeric string of `len` characters.
#[must_use]
pub fn password_gen(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Base64 of 32 random bytes.
#[must_use]
pub fn encryption_key() -> String {
    let mut bytes = [0u8; ENCRYPTION_KEY_BYTES];
    rand::rng().fill(&mut bytes);
    STANDARD.encode(bytes)
}

/// Values written to the settings file.
pub struct Settings {
    pub database_url: SecretString,
    pub cookie_key: SecretString,
    pub cookie_iv: SecretString,
    pub encryption_key: SecretString,
    pub creation_date: NaiveDate,
    pub version: String,
}

impl Settings {
    /// Fresh secrets for a new installation.
    #[must_use]
    pub fn generate(database_url: SecretString, creation_date: NaiveDate, version: &str) -> Self {
        Self {
            database_url,
            cookie_key: SecretString::from(password_gen(COOKIE_KEY_LEN)),
            cookie_iv: SecretString::from(password_gen(COOKIE_IV_LEN)),
            encryption_key: SecretString::from(encryption_key()),
            creation_date,
            version: version.to_owned(),
        }
    }

    /// Render as dotenv.
    #[must_use]
    pub fn render(&self) -> String {
        let creation_date = self.creation_date.format("%Y-%m-%d").to_string();
        let entries: [(&str, &str); 6] = [
            ("DATABASE_URL", self.database_url.expose_secret()),
            ("COOKIE_KEY", self.cookie_key.expose_secret()),
            ("COOKIE_IV", self.cookie_iv.expose_secret()),
            ("ENCRYPTION_KEY", self.encryption_key.expose_secret()),
            ("CREATION_DATE", creation_date.as_str()),
            ("TB_VERSION", self.version.as_str()),
        ];

        let mut content = String::from("# Generated by the installer\n");
        for (key, value) in entries {
            content.push_str(&format!("{key}=\"{}\"\n", escape(value)));
        }
        content
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("database_url", &"[REDACTED]")
            .field("cookie_key", &"[REDACTED]")
            .field("cookie_iv", &"[REDACTED]")
            .field("encryption_key", &"[REDACTED]")
            .field("creation_date", &self.creation_date)
            .field("version", &self.version)
            .finish()
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Check that `path` can be written before anything else runs.
///
/// # Errors
///
/// Returns `InstallError::SettingsFileNotWritable` if the file exists and is
/// read-only, `InstallError::SettingsDirNotWritable` if it does not exist and
/// its directory is missing or read-only.
pub fn check_writable(path: &Path) -> Result<(), InstallError> {
    match fs::metadata(path) {
        Ok(meta) if meta.permissions().readonly() => {
            Err(InstallError::SettingsFileNotWritable(path.to_path_buf()))
        }
        Ok(_) => Ok(()),
        Err(_) => {
            let dir = match path.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => dir,
                _ => Path::new("."),
            };
            match fs::metadata(dir) {
                Ok(meta) if meta.is_dir() && !meta.permissions().readonly() => Ok(()),
                _ => Err(InstallError::SettingsDirNotWritable(dir.to_path_buf())),
            }
        }
    }
}

/// Write `settings` to `path`.
///
/// # Errors
///
/// Returns an `InstallError` if the file or its directory is not writable.
pub fn write(path: &Path, settings: &Settings) -> Result<(), InstallError> {
    check_writable(path)?;
    fs::write(path, settings.render()).map_err(|source| InstallError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), "Settings file written");
    Ok(())
}
