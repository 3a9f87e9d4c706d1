use std::path::PathBuf;

use anyhow::Context;
use tokdoc_engine::Limits;

/// Placeholder server keys that MUST NOT be used.
pub const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

#[derive(Clone, Debug)]
pub struct Config {
    pub server_key: String,
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub storage_dir: PathBuf,
    pub limits: Limits,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset optional keys take their defaults;
    /// set but unparsable numbers are an error.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Limits::default();

        Ok(Self {
            server_key: lookup("TOKDOC_SERVER_KEY").unwrap_or_default(),
            host: lookup("TOKDOC_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&lookup, "TOKDOC_PORT", 3000)?,
            db_path: lookup("TOKDOC_DB_PATH")
                .unwrap_or_else(|| "tokdoc.db".into())
                .into(),
            storage_dir: lookup("TOKDOC_STORAGE_DIR")
                .unwrap_or_else(|| "./storage".into())
                .into(),
            limits: Limits {
                max_message_bytes: parse_or(
                    &lookup,
                    "TOKDOC_MAX_MESSAGE_BYTES",
                    defaults.max_message_bytes,
                )?,
                max_upload_bytes: parse_or(
                    &lookup,
                    "TOKDOC_MAX_UPLOAD_BYTES",
                    defaults.max_upload_bytes,
                )?,
            },
        })
    }

    /// Unset, empty, or one of the well-known placeholders.
    pub fn server_key_is_placeholder(&self) -> bool {
        self.server_key.is_empty() || PLACEHOLDER_SECRETS.contains(&self.server_key.as_str())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a number, got {value:?}")),
        None => Ok(default),
    }
}
