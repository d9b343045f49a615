use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// `[session]`: the cookie that carries a local session after CAS login.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Lifetime of a local session, independent of the CAS SSO session.
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,

    /// Only send the cookie over HTTPS. Turn off for plain-HTTP development.
    #[serde(default = "secure_by_default")]
    pub secure: bool,

    #[serde(default)]
    pub same_site: SameSite,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            duration_secs: default_duration_secs(),
            secure: secure_by_default(),
            same_site: SameSite::Lax,
        }
    }
}

impl SessionConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cookie_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "session.cookie_name cannot be empty".into(),
            ));
        }
        if self.duration_secs == 0 {
            return Err(ConfigError::Validation(
                "session.duration_secs must be at least 1".into(),
            ));
        }
        // Browsers drop SameSite=None cookies that are not Secure.
        if self.same_site == SameSite::None && !self.secure {
            return Err(ConfigError::Validation(
                "session.same_site = \"none\" requires session.secure = true".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SameSite {
    /// Sent on the top-level redirect back from the CAS server.
    #[default]
    Lax,
    /// Not sent on that redirect, so an existing session is not seen on
    /// return from CAS and the user is validated again.
    Strict,
    None,
}

impl From<SameSite> for tower_cookies::cookie::SameSite {
    fn from(value: SameSite) -> Self {
        match value {
            SameSite::Lax => Self::Lax,
            SameSite::Strict => Self::Strict,
            SameSite::None => Self::None,
        }
    }
}

fn default_cookie_name() -> String {
    "__cas_session".to_string()
}

fn default_duration_secs() -> u64 {
    8 * 60 * 60
}

fn secure_by_default() -> bool {
    true
}
