use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Duration;
use tempo_window::{DailyCadence, FixedCadence, FlashCadence, Tz};

use crate::collaborators::{
    http_client, ContentGenerator, HttpContentGenerator, HttpSignalSource, LogNotifier, Notifier,
    SignalSource, StaticSignalSource, TemplateGenerator, WebhookNotifier,
};
use crate::db::DbConfig;
use crate::jobs::{JobSchedule, JobSettings, Trigger};
use crate::locks::default_holder_id;
use crate::rotation::RotationSettings;

/// Where locks and polls live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    /// Process-local; for development and tests only.
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown storage backend: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    pub dev_mode: bool,
    pub storage: StorageBackend,
    pub database: DbConfig,
    pub instance_id: String,
    pub rotation: RotationSettings,
    pub jobs: JobSettings,
    pub schedule: JobSchedule,
    pub collaborators: CollaboratorConfig,
}

/// Endpoints of the external collaborators. Unset ones fall back to the
/// local implementations.
#[derive(Debug, Clone)]
pub struct CollaboratorConfig {
    pub generator_url: Option<String>,
    pub signals_url: Option<String>,
    pub notify_webhook_url: Option<String>,
    pub timeout: std::time::Duration,
}

/// The wired collaborator set.
pub struct Collaborators {
    pub signals: Arc<dyn SignalSource>,
    pub generator: Arc<dyn ContentGenerator>,
    pub notifier: Arc<dyn Notifier>,
}

impl CollaboratorConfig {
    pub fn build(&self, categories: &[String]) -> Result<Collaborators> {
        let client = http_client(self.timeout)?;

        let signals: Arc<dyn SignalSource> = match &self.signals_url {
            Some(url) => Arc::new(HttpSignalSource::new(client.clone(), url.clone())),
            None => Arc::new(StaticSignalSource::default()),
        };
        let generator: Arc<dyn ContentGenerator> = match &self.generator_url {
            Some(url) => Arc::new(HttpContentGenerator::new(client.clone(), url.clone())),
            None => Arc::new(TemplateGenerator::new(categories.to_vec())),
        };
        let notifier: Arc<dyn Notifier> = match &self.notify_webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(client, url.clone())),
            None => Arc::new(LogNotifier),
        };

        Ok(Collaborators {
            signals,
            generator,
            notifier,
        })
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let listen_addr = std::env::var("TEMPO_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .context("TEMPO_LISTEN_ADDR")?;

        let log_level = std::env::var("TEMPO_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let dev_mode = std::env::var("TEMPO_DEV")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        let storage = env_or("TEMPO_STORAGE", StorageBackend::Postgres)?;
        let database = DbConfig::from_env();

        let instance_id = std::env::var("TEMPO_INSTANCE_ID")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(default_holder_id);

        let rotation = rotation_from_env()?;
        let jobs = JobSettings {
            rotation_lock_ttl: env_duration("TEMPO_ROTATION_LOCK_TTL_SECS", 300, Duration::try_seconds)?,
            top_up_lock_ttl: env_duration("TEMPO_TOP_UP_LOCK_TTL_SECS", 600, Duration::try_seconds)?,
            sweep_lock_ttl: env_duration("TEMPO_SWEEP_LOCK_TTL_SECS", 60, Duration::try_seconds)?,
            min_upcoming: env_or("TEMPO_MIN_UPCOMING_POLLS", 2)?,
        };
        for (name, ttl) in [
            ("TEMPO_ROTATION_LOCK_TTL_SECS", jobs.rotation_lock_ttl),
            ("TEMPO_TOP_UP_LOCK_TTL_SECS", jobs.top_up_lock_ttl),
            ("TEMPO_SWEEP_LOCK_TTL_SECS", jobs.sweep_lock_ttl),
        ] {
            if ttl <= Duration::zero() {
                bail!("{name} must be positive");
            }
        }

        let schedule = JobSchedule {
            rotation: Trigger::cron(
                &std::env::var("TEMPO_ROTATION_CRON").unwrap_or_else(|_| "5 0 * * * *".to_string()),
            )?,
            top_up: Trigger::every(std::time::Duration::from_secs(env_or(
                "TEMPO_TOP_UP_INTERVAL_SECS",
                1800,
            )?))?,
            lock_sweep: Trigger::every(std::time::Duration::from_secs(env_or(
                "TEMPO_LOCK_SWEEP_INTERVAL_SECS",
                300,
            )?))?,
        };

        let collaborators = CollaboratorConfig {
            generator_url: optional_env("TEMPO_GENERATOR_URL"),
            signals_url: optional_env("TEMPO_SIGNALS_URL"),
            notify_webhook_url: optional_env("TEMPO_NOTIFY_WEBHOOK_URL"),
            timeout: std::time::Duration::from_secs(env_or("TEMPO_COLLABORATOR_TIMEOUT_SECS", 30)?),
        };

        Ok(Self {
            listen_addr,
            log_level,
            dev_mode,
            storage,
            database,
            instance_id,
            rotation,
            jobs,
            schedule,
            collaborators,
        })
    }
}

fn rotation_from_env() -> Result<RotationSettings> {
    let defaults = RotationSettings::default();

    let rotation = FixedCadence::new(env_duration(
        "TEMPO_ROTATION_WINDOW_MINUTES",
        60,
        Duration::try_minutes,
    )?)
    .context("TEMPO_ROTATION_WINDOW_MINUTES")?;

    let tz: Tz = match std::env::var("TEMPO_DAILY_TZ") {
        Ok(raw) => raw
            .trim()
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("TEMPO_DAILY_TZ: {e}"))?,
        Err(_) => tempo_window::DEFAULT_DAILY_TZ,
    };
    let daily = DailyCadence::new(
        tz,
        env_or("TEMPO_DAILY_OPEN_HOUR", tempo_window::DEFAULT_DAILY_OPEN_HOUR)?,
        env_or("TEMPO_DAILY_CLOSE_HOUR", tempo_window::DEFAULT_DAILY_CLOSE_HOUR)?,
    )
    .context("daily cadence")?;

    let flash = FlashCadence::new(
        env_duration(
            "TEMPO_FLASH_INTERVAL_HOURS",
            tempo_window::DEFAULT_FLASH_INTERVAL_HOURS,
            Duration::try_hours,
        )?,
        env_duration(
            "TEMPO_FLASH_DURATION_MINUTES",
            tempo_window::DEFAULT_FLASH_DURATION_MINUTES,
            Duration::try_minutes,
        )?,
    )
    .context("flash cadence")?;

    let categories = match std::env::var("TEMPO_CATEGORIES") {
        Ok(raw) => parse_categories(&raw),
        Err(_) => defaults.categories,
    };
    if categories.is_empty() {
        bail!("TEMPO_CATEGORIES must name at least one category");
    }

    let similarity_threshold: f64 = env_or(
        "TEMPO_TITLE_SIMILARITY_THRESHOLD",
        defaults.similarity_threshold,
    )?;
    if !(0.0..=1.0).contains(&similarity_threshold) {
        bail!("TEMPO_TITLE_SIMILARITY_THRESHOLD must be within [0, 1]");
    }

    Ok(RotationSettings {
        rotation,
        daily,
        flash,
        categories,
        category_lookback: env_duration("TEMPO_CATEGORY_LOOKBACK_HOURS", 24, Duration::try_hours)?,
        title_lookback: env_duration("TEMPO_TITLE_LOOKBACK_HOURS", 72, Duration::try_hours)?,
        similarity_threshold,
        signal_limit: env_or("TEMPO_SIGNAL_LIMIT", defaults.signal_limit)?,
    })
}

/// Comma separated, trimmed, lower-cased, empties and duplicates dropped.
fn parse_categories(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for category in raw.split(',').map(|c| c.trim().to_lowercase()) {
        if !category.is_empty() && !out.contains(&category) {
            out.push(category);
        }
    }
    out
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {name}={raw:?}: {e}")),
        Err(_) => Ok(default),
    }
}

/// Reads an integer setting and converts it with `unit`, rejecting values
/// that do not fit in a `Duration`.
fn env_duration(name: &str, default: i64, unit: fn(i64) -> Option<Duration>) -> Result<Duration> {
    let value = env_or(name, default)?;
    unit(value).with_context(|| format!("{name}={value} is out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_categories_normalizes() {
        assert_eq!(
            parse_categories(" Tech, science,,tech ,World"),
            vec!["tech", "science", "world"]
        );
    }

    #[test]
    fn test_storage_backend_parse() {
        assert_eq!("memory".parse::<StorageBackend>(), Ok(StorageBackend::Memory));
        assert_eq!(" Postgres ".parse::<StorageBackend>(), Ok(StorageBackend::Postgres));
        assert!("sqlite".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_env_or_uses_default_when_unset() {
        let value: u64 = env_or("TEMPO_TEST_SURELY_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_env_duration_rejects_overflow() {
        std::env::set_var("TEMPO_TEST_ENV_DURATION_HUGE", i64::MAX.to_string());
        let err = env_duration("TEMPO_TEST_ENV_DURATION_HUGE", 1, Duration::try_hours).unwrap_err();
        assert!(err.to_string().contains("out of range"));

        std::env::set_var("TEMPO_TEST_ENV_DURATION_OK", "90");
        let value = env_duration("TEMPO_TEST_ENV_DURATION_OK", 1, Duration::try_minutes).unwrap();
        assert_eq!(value, Duration::minutes(90));
    }

    #[test]
    fn test_local_collaborators_without_urls() {
        let config = CollaboratorConfig {
            generator_url: None,
            signals_url: None,
            notify_webhook_url: None,
            timeout: std::time::Duration::from_secs(1),
        };
        assert!(config.build(&["science".to_string()]).is_ok());
    }
}
