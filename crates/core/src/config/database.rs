//! Database connection settings
//!
//! The connection string is resolved once at startup and handed to the migration
//! engine; nothing below the CLI reads the environment.

use url::Url;

use super::sources::ConfigSource;
use crate::errors::{CoreError, CoreResult};

pub const DATABASE_URL_VAR: &str = "DATABASE_URL";

const DEFAULT_DB_USER: &str = "dev";
const DEFAULT_DB_PASSWORD: &str = "devpass";
const DEFAULT_DB_NAME: &str = "myapp_dev";
const DEFAULT_DB_HOST: &str = "localhost:5432";

/// Resolved database connection settings
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub source: ConfigSource,
}

impl DatabaseConfig {
    /// Build from an explicit connection string
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            source: ConfigSource::Programmatic,
        }
    }

    /// Load `.env` from the working directory, if any, then resolve from the process
    /// environment. Variables already set in the environment win over `.env`.
    ///
    /// Parent directories are not searched.
    pub fn from_env() -> CoreResult<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| CoreError::environment(format!("cannot read working directory: {}", e)))?;
        let path = cwd.join(".env");

        match dotenvy::from_path(&path) {
            Ok(()) => tracing::debug!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(CoreError::environment(format!("cannot load .env: {}", e))),
        }

        Ok(Self::resolve(|key| std::env::var(key).ok()))
    }

    /// Resolve the connection string through `lookup`.
    ///
    /// `DATABASE_URL` is used as-is when set. Otherwise the URL is assembled from
    /// `DB_USER`, `DB_PASSWORD` and `DB_NAME` against `localhost:5432`, each falling
    /// back to its development default. Blank values count as unset.
    pub fn resolve<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = get(DATABASE_URL_VAR) {
            return Self {
                url: url.trim().to_string(),
                source: ConfigSource::EnvVar(DATABASE_URL_VAR.to_string()),
            };
        }

        let mut sources = Vec::with_capacity(3);
        let mut part = |key: &str, default: &str| match get(key) {
            Some(value) => {
                sources.push(ConfigSource::EnvVar(key.to_string()));
                value
            }
            None => {
                sources.push(ConfigSource::Default(default.to_string()));
                default.to_string()
            }
        };

        let user = part("DB_USER", DEFAULT_DB_USER);
        let password = part("DB_PASSWORD", DEFAULT_DB_PASSWORD);
        let name = part("DB_NAME", DEFAULT_DB_NAME);

        Self {
            url: format!(
                "postgresql://{}:{}@{}/{}",
                user, password, DEFAULT_DB_HOST, name
            ),
            source: ConfigSource::Composed(sources),
        }
    }

    /// Check that the URL parses and points at PostgreSQL
    pub fn validate(&self) -> CoreResult<()> {
        let parsed = Url::parse(&self.url).map_err(|e| {
            CoreError::invalid_value(
                DATABASE_URL_VAR,
                mask_database_url(&self.url),
                format!("a valid connection URL ({})", e),
            )
        })?;

        match parsed.scheme() {
            "postgres" | "postgresql" => Ok(()),
            _ => Err(CoreError::invalid_value(
                DATABASE_URL_VAR,
                mask_database_url(&self.url),
                "a postgres:// or postgresql:// URL",
            )),
        }
    }

    /// Connection string safe to print
    pub fn masked_url(&self) -> String {
        mask_database_url(&self.url)
    }
}

/// Replace the password in a connection URL with `****`
pub fn mask_database_url(url_str: &str) -> String {
    match Url::parse(url_str) {
        Ok(mut url) => {
            if url.password().is_some() && url.set_password(Some("****")).is_err() {
                return "<unprintable database url>".to_string();
            }
            url.to_string()
        }
        // Not a URL, so there is no password component to find
        Err(_) => url_str.to_string(),
    }
}
