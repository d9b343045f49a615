//! Ticket retention configuration.
//!
//! Configures the background worker that purges uncorrelated PGT IOUs and
//! expired local sessions.
//!
//! # Example
//!
//! ```toml
//! [retention]
//! enabled = true
//! interval_minutes = 60
//! ```

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Ticket retention configuration.
///
/// PGT IOUs that never got correlated are deleted once they are older than
/// two days. The window is fixed; only the sweep frequency is configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Whether the retention worker runs.
    /// Default: true
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// How often to run the retention worker (in minutes).
    /// Default: 60
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,

    /// Also drop expired local sessions (and their single sign-out
    /// mappings) on each run.
    /// Default: true
    #[serde(default = "default_true")]
    pub purge_sessions: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: default_interval_minutes(),
            purge_sessions: true,
        }
    }
}

impl RetentionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.interval_minutes == 0 {
            return Err(ConfigError::Validation(
                "retention.interval_minutes must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_minutes * 60)
    }
}

fn default_true() -> bool {
    true
}

fn default_interval_minutes() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RetentionConfig::default();
        assert!(config.enabled);
        assert_eq!(config.interval(), std::time::Duration::from_secs(3600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = RetentionConfig {
            interval_minutes: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let disabled = RetentionConfig {
            enabled: false,
            interval_minutes: 0,
            ..Default::default()
        };
        assert!(disabled.validate().is_ok());
    }
}
