//! Explicit logging configuration
//!
//! Components receive a [`LogConfig`] at construction instead of consulting a
//! process-wide toggle. Events are still emitted through `tracing`; the config
//! only decides whether a component emits them at all.

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing::level_filters::LevelFilter;

/// Per-component log verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Most verbose level a component may emit
    #[serde(with = "level_filter_serde")]
    pub max_level: LevelFilter,
}

impl LogConfig {
    /// A config that silences every event
    pub const OFF: Self = Self { max_level: LevelFilter::OFF };

    /// Creates a config emitting events up to `max_level`
    pub fn new(max_level: LevelFilter) -> Self {
        Self { max_level }
    }

    /// Returns true if events at `level` should be emitted
    pub fn enabled(&self, level: Level) -> bool {
        level <= self.max_level
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { max_level: LevelFilter::WARN }
    }
}

mod level_filter_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use tracing::level_filters::LevelFilter;

    pub fn serialize<S: Serializer>(level: &LevelFilter, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&level.to_string().to_lowercase())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<LevelFilter, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enabled_respects_max_level() {
        let config = LogConfig::new(LevelFilter::INFO);
        assert!(config.enabled(Level::ERROR));
        assert!(config.enabled(Level::INFO));
        assert!(!config.enabled(Level::DEBUG));

        assert!(!LogConfig::OFF.enabled(Level::ERROR));
    }

    #[test]
    fn test_serde_uses_level_names() {
        let json = serde_json::to_string(&LogConfig::new(LevelFilter::DEBUG)).unwrap();
        assert_eq!(json, r#"{"max_level":"debug"}"#);
        let config: LogConfig = serde_json::from_str(r#"{"max_level":"trace"}"#).unwrap();
        assert_eq!(config.max_level, LevelFilter::TRACE);
    }
}
