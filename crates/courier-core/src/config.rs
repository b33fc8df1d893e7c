//! Runtime configuration, deserializable from TOML.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::DEFAULT_WORKER_GROUP;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub dispatcher: DispatcherConfig,
    pub poll: PollConfig,
    pub buffer: BufferConfig,
    pub workers: Vec<WorkerConfig>,
}

/// Producer-side settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Group used when a single-message dispatch names none.
    pub default_group: String,
}

/// Worker-side poll settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub max_batch_size: usize,
    pub interval_ms: u64,
    /// Only messages younger than this are eligible. Unset means no limit.
    pub max_message_age_secs: Option<u64>,
}

/// Outbound (status report) buffer settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Total envelope weight at which the buffer is flushed early.
    pub max_weight: u32,
}

/// A worker known to the assigner, and the groups it serves.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub id: String,
    pub groups: Vec<String>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_group: DEFAULT_WORKER_GROUP.to_string(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            interval_ms: 200,
            max_message_age_secs: None,
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self { max_weight: 500 }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Age threshold passed to `poll` for a poll issued at `now`.
    ///
    /// An age reaching past the representable time range means no limit.
    pub fn created_since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.max_message_age_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(chrono::Duration::try_seconds)
            .and_then(|age| now.checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl CourierConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[test]
    fn default_config_values() {
        let config = CourierConfig::default();
        assert_eq!(config.dispatcher.default_group, DEFAULT_WORKER_GROUP);
        assert_eq!(config.poll.max_batch_size, 100);
        assert_eq!(config.poll.interval_ms, 200);
        assert_eq!(config.poll.max_message_age_secs, None);
        assert_eq!(config.buffer.max_weight, 500);
        assert!(config.workers.is_empty());
    }

    #[test]
    fn toml_parsing_with_overrides() {
        let config = CourierConfig::from_toml_str(
            r#"
            [dispatcher]
            default_group = "ops"

            [poll]
            max_batch_size = 10
            interval_ms = 50
            max_message_age_secs = 600

            [buffer]
            max_weight = 20

            [[workers]]
            id = "w1"
            groups = ["ops", "reports"]

            [[workers]]
            id = "w2"
            "#,
        )
        .unwrap();

        assert_eq!(config.dispatcher.default_group, "ops");
        assert_eq!(config.poll.max_batch_size, 10);
        assert_eq!(config.poll.interval(), Duration::from_millis(50));
        assert_eq!(config.poll.max_message_age_secs, Some(600));
        assert_eq!(config.buffer.max_weight, 20);
        assert_eq!(config.workers.len(), 2);
        assert_eq!(config.workers[0].groups, vec!["ops", "reports"]);
        assert!(config.workers[1].groups.is_empty());
    }

    #[test]
    fn toml_parsing_empty_uses_defaults() {
        let config = CourierConfig::from_toml_str("").unwrap();
        assert_eq!(config.poll.max_batch_size, 100);
        assert_eq!(config.buffer.max_weight, 500);
    }

    #[test]
    fn toml_parsing_rejects_wrong_types() {
        let err = CourierConfig::from_toml_str("[poll]\nmax_batch_size = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn created_since_follows_age_threshold() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let unlimited = PollConfig::default();
        assert_eq!(unlimited.created_since(now), DateTime::<Utc>::MIN_UTC);

        let bounded = PollConfig {
            max_message_age_secs: Some(60),
            ..PollConfig::default()
        };
        assert_eq!(bounded.created_since(now), now - chrono::Duration::seconds(60));
    }

    #[rstest]
    #[case(10_000_000_000_000)]
    #[case(i64::MAX as u64)]
    #[case(u64::MAX)]
    fn created_since_with_huge_age_is_unlimited(#[case] secs: u64) {
        let poll = PollConfig {
            max_message_age_secs: Some(secs),
            ..PollConfig::default()
        };
        assert_eq!(poll.created_since(Utc::now()), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn huge_age_from_toml_is_unlimited() {
        let config = CourierConfig::from_toml_str("[poll]\nmax_message_age_secs = 10000000000000")
            .unwrap();
        assert_eq!(
            config.poll.created_since(Utc::now()),
            DateTime::<Utc>::MIN_UTC
        );
    }

    #[test]
    fn load_reports_missing_file() {
        let err = CourierConfig::load("/nonexistent/courier.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
