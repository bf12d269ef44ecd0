// Runtime configuration, read from the environment (and `.env` via dotenv).

use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::core::audit::MAX_RETENTION_DAYS;
use crate::core::moderation::ClassifierPolicy;
use crate::infra::classifier::deepseek_client::{DEFAULT_BASE_URL, DEFAULT_MODEL};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/moderation.db";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: '{value}' ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Connection details for the DeepSeek classifier. Present only when an API
/// key is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub policy: ClassifierPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_url: String,
    pub classifier: Option<ClassifierConfig>,
    pub cleanup_interval: Duration,
    pub audit_retention_days: u32,
    pub moderator_ids: Vec<i64>,
    pub allow_direct_publish: bool,
    pub seed_builtin_words: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the config from any name -> value lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let defaults = ClassifierPolicy::default();
        let policy = ClassifierPolicy {
            timeout: Duration::from_secs(parse_or(
                &get,
                "CLASSIFIER_TIMEOUT_SECS",
                defaults.timeout.as_secs(),
            )?),
            max_attempts: parse_or(&get, "CLASSIFIER_MAX_ATTEMPTS", defaults.max_attempts)?,
            base_backoff: Duration::from_millis(parse_or(
                &get,
                "CLASSIFIER_BACKOFF_MS",
                defaults.base_backoff.as_millis() as u64,
            )?),
        };
        if policy.max_attempts == 0 {
            return Err(invalid("CLASSIFIER_MAX_ATTEMPTS", "0", "must be at least 1"));
        }

        let classifier = get("DEEPSEEK_API_KEY").map(|api_key| ClassifierConfig {
            api_key,
            base_url: get("DEEPSEEK_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: get("DEEPSEEK_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            policy,
        });

        let cleanup_interval_secs: u64 = parse_or(&get, "CLEANUP_INTERVAL_SECS", 86_400)?;
        if cleanup_interval_secs == 0 {
            return Err(invalid("CLEANUP_INTERVAL_SECS", "0", "must be positive"));
        }

        let audit_retention_days: u32 = parse_or(&get, "AUDIT_RETENTION_DAYS", 90)?;
        if audit_retention_days == 0 || audit_retention_days > MAX_RETENTION_DAYS {
            return Err(invalid(
                "AUDIT_RETENTION_DAYS",
                &audit_retention_days.to_string(),
                &format!("must be between 1 and {}", MAX_RETENTION_DAYS),
            ));
        }

        let moderator_ids = match get("MODERATOR_IDS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<i64>()
                        .map_err(|e| invalid("MODERATOR_IDS", s, &e.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        Ok(Self {
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            classifier,
            cleanup_interval: Duration::from_secs(cleanup_interval_secs),
            audit_retention_days,
            moderator_ids,
            allow_direct_publish: parse_or(&get, "ALLOW_DIRECT_PUBLISH", false)?,
            seed_builtin_words: parse_or(&get, "SEED_BUILTIN_WORDS", true)?,
        })
    }
}

fn invalid(name: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_or<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(name, &raw, &e.to_string())),
        None => Ok(default),
    }
}
