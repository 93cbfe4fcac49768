use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("KITABEE_JWT_SECRET is unset or still a placeholder")]
    MissingSecret,

    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub books_api_url: String,
    pub books_api_key: Option<String>,
    pub books_timeout: Duration,
    pub cleanup_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let jwt_secret = get("KITABEE_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            return Err(ConfigError::MissingSecret);
        }

        let parsed = |name: &'static str, default: u64| -> Result<u64, ConfigError> {
            match get(name) {
                Some(value) => value
                    .parse()
                    .map_err(|_| ConfigError::Invalid { name, value }),
                None => Ok(default),
            }
        };

        let port = parsed("KITABEE_PORT", 3000)?;
        let port = u16::try_from(port).map_err(|_| ConfigError::Invalid {
            name: "KITABEE_PORT",
            value: port.to_string(),
        })?;

        let cleanup_secs = parsed("KITABEE_CLEANUP_INTERVAL_SECS", 3600)?;
        if cleanup_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "KITABEE_CLEANUP_INTERVAL_SECS",
                value: "0".into(),
            });
        }

        Ok(Self {
            host: get("KITABEE_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: get("KITABEE_DB_PATH").unwrap_or_else(|| "kitabee.db".into()).into(),
            jwt_secret,
            books_api_url: get("KITABEE_BOOKS_API_URL")
                .unwrap_or_else(|| "https://www.googleapis.com/books/v1".into()),
            books_api_key: get("KITABEE_BOOKS_API_KEY").filter(|k| !k.is_empty()),
            books_timeout: Duration::from_secs(parsed("KITABEE_BOOKS_TIMEOUT_SECS", 8)?),
            cleanup_interval: Duration::from_secs(cleanup_secs),
        })
    }
}
