//! Process-wide mail settings and per-call server sources.
//!
//! [`MailSettings`] is loaded once and then shared read-only (usually behind an
//! `Arc`). Nothing in the pipeline mutates it; per-call attributes are merged
//! on top of it when a message is resolved.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use config::ConfigError;

/// Prefix for environment overrides, e.g. `COURIER_SPOOL_ENABLE=true`.
pub const ENV_PREFIX: &str = "COURIER";

pub trait EnvConfig: Sized {
    fn from_env() -> Result<Self, ConfigError>;
    fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError>;

    /// `file`, when given, overlaid with `<PREFIX>_*` variables. A double
    /// underscore reaches into nested tables: `<PREFIX>_SIGNING__KEYSTORE`.
    fn from_file_with_prefix(file: Option<&Path>, prefix: &str) -> Result<Self, ConfigError>;
}

impl<D> EnvConfig for D
where
    D: DeserializeOwned,
{
    fn from_env() -> Result<Self, ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()?
            .try_deserialize()
    }

    fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_file_with_prefix(None, prefix)
    }

    fn from_file_with_prefix(file: Option<&Path>, prefix: &str) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder
            .add_source(
                config::Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

/// One configured SMTP server.
///
/// The host may be given under `smtp`, `host` or `server`; the first one
/// present in that order wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub smtp: Option<String>,
    pub host: Option<String>,
    pub server: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Connection timeout in seconds.
    pub timeout: Option<u64>,
    pub ssl: Option<bool>,
    pub tls: Option<bool>,
}

impl ServerSettings {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            ..Default::default()
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn hostname(&self) -> Option<&str> {
        self.smtp
            .as_deref()
            .or(self.host.as_deref())
            .or(self.server.as_deref())
    }
}

/// Default signing credentials applied when a call does not say whether to sign.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningSettings {
    pub sign_message: bool,
    pub keystore: Option<PathBuf>,
    pub keystore_password: Option<String>,
    pub key_alias: Option<String>,
    pub key_password: Option<String>,
}

/// Process-wide defaults for the mail pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailSettings {
    pub default_encoding: String,
    pub spool_enable: bool,
    /// Minutes between spool cycles.
    pub spool_interval: f64,
    pub spool_directory: PathBuf,
    pub bounce_directory: PathBuf,
    /// Default connection timeout in seconds.
    pub connection_timeout: u64,
    pub log_enabled: bool,
    pub mail_servers: Vec<ServerSettings>,
    pub signing: SigningSettings,
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            default_encoding: "utf-8".to_string(),
            spool_enable: false,
            spool_interval: 0.5,
            spool_directory: PathBuf::from("mail/unsent"),
            bounce_directory: PathBuf::from("mail/bounced"),
            connection_timeout: 60,
            log_enabled: false,
            mail_servers: Vec::new(),
            signing: SigningSettings::default(),
        }
    }
}

impl MailSettings {
    /// Load settings from defaults, an optional TOML file, then `COURIER_*`
    /// environment variables (a `.env` file is honoured).
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_file_with_prefix(file, ENV_PREFIX)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout)
    }

    /// Interval between spool cycles, never shorter than one second.
    pub fn spool_interval(&self) -> Duration {
        let secs = self.spool_interval * 60.0;
        if secs.is_finite() && secs >= 1.0 {
            Duration::from_secs_f64(secs)
        } else {
            Duration::from_secs(1)
        }
    }
}

/// Server lists that belong to the host rather than to this module.
///
/// Consulted only when neither the call nor [`MailSettings::mail_servers`]
/// names a server: first the process-wide host configuration, then the
/// request-scoped settings.
#[derive(Debug, Clone, Default)]
pub struct MailContext {
    pub config_servers: Vec<ServerSettings>,
    pub request_servers: Vec<ServerSettings>,
}

impl MailContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_servers(mut self, servers: Vec<ServerSettings>) -> Self {
        self.config_servers = servers;
        self
    }

    pub fn with_request_servers(mut self, servers: Vec<ServerSettings>) -> Self {
        self.request_servers = servers;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_module_settings() {
        let settings = MailSettings::default();
        assert_eq!(settings.default_encoding, "utf-8");
        assert!(!settings.spool_enable);
        assert_eq!(settings.spool_interval(), Duration::from_secs(30));
        assert_eq!(settings.connection_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn spool_interval_has_a_floor() {
        let settings = MailSettings {
            spool_interval: 0.0,
            ..Default::default()
        };
        assert_eq!(settings.spool_interval(), Duration::from_secs(1));
    }

    #[test]
    fn hostname_prefers_smtp_then_host_then_server() {
        let server = ServerSettings {
            host: Some("host.example.com".into()),
            server: Some("server.example.com".into()),
            ..Default::default()
        };
        assert_eq!(server.hostname(), Some("host.example.com"));

        let server = ServerSettings {
            smtp: Some("smtp.example.com".into()),
            ..server
        };
        assert_eq!(server.hostname(), Some("smtp.example.com"));
    }
}
