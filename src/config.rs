use std::fmt;

use thiserror::Error;

pub const DEFAULT_PORT: u16 = 3333;
pub const DEFAULT_TIMEZONE: &str = "America/Los_Angeles";

// Checked in this order; the first one missing is reported.
const REQUIRED_VARS: [&str; 5] = [
    "EMAIL_FROM",
    "EMAIL_PASSWORD",
    "EMAIL_TO",
    "SMTP_HOST",
    "SMTP_PORT",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),
    #[error("environment variable {name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Process-wide settings, loaded once at startup and read-only afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub email_from: String,
    pub email_password: String,
    pub email_to: Vec<String>,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub timezone: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Empty values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());

        for name in REQUIRED_VARS {
            if get(name).is_none() {
                return Err(ConfigError::Missing(name));
            }
        }

        let required = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let port = match get("PORT") {
            Some(value) => parse_port("PORT", value)?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            port,
            email_from: required("EMAIL_FROM")?,
            email_password: required("EMAIL_PASSWORD")?,
            email_to: split_recipients(&required("EMAIL_TO")?),
            smtp_host: required("SMTP_HOST")?,
            smtp_port: parse_port("SMTP_PORT", required("SMTP_PORT")?)?,
            timezone: get("MAIL_TIMEZONE").unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
        })
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("email_from", &self.email_from)
            .field("email_password", &"<redacted>")
            .field("email_to", &self.email_to)
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("timezone", &self.timezone)
            .finish()
    }
}

fn parse_port(name: &'static str, value: String) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid { name, value })
}

/// Splits a comma-separated recipient list, trimming each entry. Order and
/// duplicates are kept as given.
pub fn split_recipients(raw: &str) -> Vec<String> {
    raw.split(',').map(|entry| entry.trim().to_string()).collect()
}
