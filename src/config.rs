use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::model::Coordinate;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accuracy {
    Lowest,
    Low,
    #[default]
    Balanced,
    High,
    Highest,
}

/// Passed through to the provider for one-shot fixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionOptions {
    pub accuracy: Accuracy,
    pub max_age_ms: u64,
    pub timeout_ms: u64,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            accuracy: Accuracy::Balanced,
            max_age_ms: 10_000,
            timeout_ms: 15_000,
        }
    }
}

/// A fix is pushed after `interval_ms` or `distance_m` of movement,
/// whichever comes first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    pub accuracy: Accuracy,
    pub interval_ms: u64,
    pub distance_m: f64,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            accuracy: Accuracy::Balanced,
            interval_ms: 10_000,
            distance_m: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub debounce_ms: u64,
    pub max_candidates: usize,
    pub max_recent: usize,
}

impl SearchConfig {
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            max_candidates: 5,
            max_recent: 5,
        }
    }
}

/// Everything tunable about the location flow. The shell may hand over a
/// JSON document; missing fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub position: PositionOptions,
    pub watch: WatchOptions,
    pub search: SearchConfig,
    /// Map centre when nothing is cached yet.
    pub default_region: Coordinate,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            position: PositionOptions::default(),
            watch: WatchOptions::default(),
            search: SearchConfig::default(),
            default_region: Coordinate::new(28.6139, 77.2090),
        }
    }
}

impl LocationConfig {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let config: Self = serde_json::from_str(raw)?;
        Ok(config.sanitized())
    }

    /// Zero caps would make search and history useless; clamp them to one.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        self.search.max_candidates = self.search.max_candidates.max(1);
        self.search.max_recent = self.search.max_recent.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LocationConfig::default();
        assert_eq!(config.position.accuracy, Accuracy::Balanced);
        assert_eq!(config.position.max_age_ms, 10_000);
        assert_eq!(config.position.timeout_ms, 15_000);
        assert_eq!(config.watch.interval_ms, 10_000);
        assert!((config.watch.distance_m - 100.0).abs() < f64::EPSILON);
        assert_eq!(config.search.debounce(), Duration::from_millis(500));
        assert_eq!(config.search.max_candidates, 5);
        assert_eq!(config.search.max_recent, 5);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let raw = r#"{"search":{"debounce_ms":300},"position":{"accuracy":"high"}}"#;
        let config = LocationConfig::from_json(raw).unwrap();
        assert_eq!(config.search.debounce_ms, 300);
        assert_eq!(config.search.max_recent, 5);
        assert_eq!(config.position.accuracy, Accuracy::High);
        assert_eq!(config.position.timeout_ms, 15_000);
    }

    #[test]
    fn test_zero_caps_are_clamped() {
        let config = LocationConfig::from_json(r#"{"search":{"max_recent":0,"max_candidates":0}}"#)
            .unwrap();
        assert_eq!(config.search.max_recent, 1);
        assert_eq!(config.search.max_candidates, 1);
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(LocationConfig::from_json("{").is_err());
    }
}
