//! Configuration for storage nodes and the scatter-gather coordinator.
use serde::de::Error;
use std::time::Duration;

use crate::geohash::MAX_PRECISION;

const SECS_PER_HOUR: u64 = 3600;

/// Node and coordinator configuration
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Geohash precision of the spatial segment in block paths and of the
    /// cells a query polygon is expanded into
    #[serde(default = "Config::default_spatial_precision")]
    pub spatial_precision: usize,

    /// Width of the temporal segment in block paths
    #[serde(default = "Config::default_temporal_precision_hours")]
    pub temporal_precision_hours: u64,

    #[serde(default)]
    pub scatter: ScatterConfig,
}

/// Scatter-gather timing
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScatterConfig {
    /// Deadline window added to "now" at open and on every reply that still
    /// leaves replies outstanding
    #[serde(default = "ScatterConfig::default_window_ms")]
    pub window_ms: u64,
}

impl ScatterConfig {
    const fn default_window_ms() -> u64 {
        10 * 60 * 1000
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

impl Default for ScatterConfig {
    fn default() -> Self {
        Self {
            window_ms: Self::default_window_ms(),
        }
    }
}

impl Config {
    const fn default_spatial_precision() -> usize {
        4
    }

    const fn default_temporal_precision_hours() -> u64 {
        24
    }

    pub fn with_spatial_precision(mut self, precision: usize) -> Self {
        assert!(
            (1..=MAX_PRECISION).contains(&precision),
            "Spatial precision must be between 1 and {MAX_PRECISION}"
        );
        if precision > 12 {
            log::warn!(
                "Spatial precision {} produces very small cells; polygon expansion \
                may visit a large number of cells",
                precision
            );
        }
        self.spatial_precision = precision;
        self
    }

    pub fn with_temporal_precision_hours(mut self, hours: u64) -> Self {
        assert!(hours > 0, "Temporal precision must be greater than zero");
        assert!(
            hours.checked_mul(SECS_PER_HOUR).is_some(),
            "Temporal precision of {hours} hours does not fit in seconds"
        );
        self.temporal_precision_hours = hours;
        self
    }

    pub fn with_scatter(mut self, scatter: ScatterConfig) -> Self {
        self.scatter = scatter;
        self
    }

    /// Width of one temporal bucket in seconds.
    pub fn temporal_bucket_secs(&self) -> u64 {
        self.temporal_precision_hours.saturating_mul(SECS_PER_HOUR)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(1..=MAX_PRECISION).contains(&self.spatial_precision) {
            return Err(format!(
                "Spatial precision must be between 1 and {MAX_PRECISION}, got {}",
                self.spatial_precision
            ));
        }

        if self.temporal_precision_hours == 0 {
            return Err("Temporal precision must be greater than zero".to_string());
        }

        if self.temporal_precision_hours.checked_mul(SECS_PER_HOUR).is_none() {
            return Err(format!(
                "Temporal precision of {} hours does not fit in seconds",
                self.temporal_precision_hours
            ));
        }

        if self.scatter.window_ms == 0 {
            return Err("Scatter window must be greater than zero".to_string());
        }

        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: Config = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(Error::custom(e));
        }
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        let config: Config = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            spatial_precision: Self::default_spatial_precision(),
            temporal_precision_hours: Self::default_temporal_precision_hours(),
            scatter: ScatterConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.spatial_precision, 4);
        assert_eq!(config.temporal_precision_hours, 24);
        assert_eq!(config.scatter.window(), Duration::from_secs(600));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default()
            .with_spatial_precision(6)
            .with_temporal_precision_hours(1)
            .with_scatter(ScatterConfig::default().with_window(Duration::from_secs(30)));

        let json = config.to_json().unwrap();
        let deserialized = Config::from_json(&json).unwrap();
        assert_eq!(deserialized, config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = Config::from_json(r#"{"spatial_precision": 5}"#).unwrap();
        assert_eq!(config.spatial_precision, 5);
        assert_eq!(config.temporal_precision_hours, 24);
    }

    #[test]
    fn test_config_validation() {
        assert!(Config::default().validate().is_ok());
        assert!(Config::from_json(r#"{"spatial_precision": 0}"#).is_err());
        assert!(Config::from_json(r#"{"spatial_precision": 25}"#).is_err());
        assert!(Config::from_json(r#"{"scatter": {"window_ms": 0}}"#).is_err());
        assert!(Config::from_json(r#"{"unknown": true}"#).is_err());
    }

    #[test]
    fn test_oversized_temporal_precision_rejected() {
        let max_hours = u64::MAX / SECS_PER_HOUR;
        let json = format!(r#"{{"temporal_precision_hours": {}}}"#, max_hours + 1);
        assert!(Config::from_json(&json).is_err());

        let json = format!(r#"{{"temporal_precision_hours": {max_hours}}}"#);
        let config = Config::from_json(&json).unwrap();
        assert_eq!(config.temporal_bucket_secs(), max_hours * SECS_PER_HOUR);
    }

    #[test]
    fn test_window_saturates_instead_of_truncating() {
        let scatter = ScatterConfig::default().with_window(Duration::MAX);
        assert_eq!(scatter.window_ms, u64::MAX);
        let scatter = ScatterConfig::default().with_window(Duration::from_millis(1500));
        assert_eq!(scatter.window_ms, 1500);
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_config_toml() {
        let config = Config::default().with_spatial_precision(3);
        let text = config.to_toml().unwrap();
        assert_eq!(Config::from_toml(&text).unwrap(), config);
    }
}
