use serde::{Deserialize, Serialize};

use super::ConfigError;

/// `[observability]`: log output and the Prometheus recorder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl ObservabilityConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.metrics.validate()
    }
}

/// `[observability.logging]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default level for every target not named in `filter`.
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default = "default_timestamps")]
    pub timestamps: bool,

    /// Emit source file and line with each event.
    #[serde(default)]
    pub file_line: bool,

    /// Extra `EnvFilter` directives appended after `level`,
    /// e.g. `"casgate::cas=debug,sqlx=warn"`. Ignored when `RUST_LOG` is set.
    #[serde(default)]
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            timestamps: default_timestamps(),
            file_line: false,
            filter: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive form understood by `EnvFilter`.
    pub fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Multi-line, for a terminal.
    Pretty,
    #[default]
    Compact,
    /// One JSON object per line, for log shippers.
    Json,
}

/// `[observability.metrics]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Install the Prometheus recorder and mount `/metrics`.
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,

    /// Bucket bounds, in milliseconds, for `cas_validation_duration_seconds`.
    #[serde(default = "default_cas_latency_buckets")]
    pub latency_buckets_ms: Vec<f64>,
}

impl MetricsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        if self.latency_buckets_ms.is_empty() {
            return Err(ConfigError::Validation(
                "observability.metrics.latency_buckets_ms cannot be empty".into(),
            ));
        }
        let ascending = self
            .latency_buckets_ms
            .windows(2)
            .all(|pair| pair[0] < pair[1]);
        if !ascending || self.latency_buckets_ms.iter().any(|b| !b.is_finite() || *b <= 0.0) {
            return Err(ConfigError::Validation(
                "observability.metrics.latency_buckets_ms must be positive and strictly increasing"
                    .into(),
            ));
        }
        Ok(())
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            latency_buckets_ms: default_cas_latency_buckets(),
        }
    }
}

fn default_timestamps() -> bool {
    true
}

fn default_metrics_enabled() -> bool {
    true
}

// CAS round trips sit well under a second; the tail covers the 10s client timeout.
fn default_cas_latency_buckets() -> Vec<f64> {
    vec![
        10.0, 25.0, 50.0, 100.0, 200.0, 400.0, 800.0, 1500.0, 3000.0, 6000.0, 10000.0,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_buckets_are_valid() {
        assert!(MetricsConfig::default().validate().is_ok());
    }

    #[test]
    fn test_unsorted_buckets_rejected() {
        let config = MetricsConfig {
            enabled: true,
            latency_buckets_ms: vec![100.0, 50.0],
        };
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_buckets_ignored_when_disabled() {
        let config = MetricsConfig {
            enabled: false,
            latency_buckets_ms: vec![],
        };
        assert!(config.validate().is_ok());
    }
}
