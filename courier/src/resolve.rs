//! Server resolution from the layered configuration sources.
//!
//! Precedence, first non-empty source wins:
//!
//! 1. the server named on the call (`smtp` or `server`)
//! 2. [`MailSettings::mail_servers`]
//! 3. [`MailContext::config_servers`]
//! 4. [`MailContext::request_servers`]

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{MailContext, MailSettings, ServerSettings};
use crate::error::MailError;
use crate::mail::{host_to_ascii, IdnaVariant, MailRequest};

pub const DEFAULT_PORT: u16 = 25;

/// A fully resolved SMTP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// ASCII (IDNA encoded) host name.
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Implicit TLS on connect.
    pub ssl: bool,
    /// STARTTLS after connect.
    pub tls: bool,
    pub timeout: Duration,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            ssl: false,
            tls: false,
            timeout: Duration::from_secs(60),
        }
    }

    /// Username and password, when both are set.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) => Some((user, pass)),
            _ => None,
        }
    }

    fn check_credentials(&self) -> Result<(), MailError> {
        if self.username.is_some() && self.password.is_none() {
            return Err(MailError::configuration(format!(
                "server {} has a username but no password",
                self.host
            )));
        }
        Ok(())
    }
}

/// Resolve the ordered server candidate list for one call.
///
/// The first entry is the active server; its credentials are checked here.
pub fn resolve_servers(
    request: &MailRequest,
    settings: &MailSettings,
    ctx: &MailContext,
) -> Result<Vec<ServerConfig>, MailError> {
    let variant = IdnaVariant::from_version(request.idna_version);

    let servers = match request.explicit_server() {
        Some(host) => vec![explicit_server(host, request, settings, variant)?],
        None => {
            let configured = [
                ("mail settings", &settings.mail_servers),
                ("host configuration", &ctx.config_servers),
                ("request settings", &ctx.request_servers),
            ]
            .into_iter()
            .find(|(_, list)| !list.is_empty());

            let Some((source, list)) = configured else {
                return Err(MailError::configuration(
                    "no mail servers have been defined",
                ));
            };
            tracing::debug!(source, count = list.len(), "using configured mail servers");

            list.iter()
                .map(|server| configured_server(server, request, settings, variant))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    if let Some(active) = servers.first() {
        active.check_credentials()?;
    }
    Ok(servers)
}

fn explicit_server(
    host: &str,
    request: &MailRequest,
    settings: &MailSettings,
    variant: IdnaVariant,
) -> Result<ServerConfig, MailError> {
    Ok(ServerConfig {
        host: host_to_ascii(host, variant)?,
        port: request.port.unwrap_or(DEFAULT_PORT),
        username: non_empty(request.username.as_deref()),
        password: non_empty(request.password.as_deref()),
        ssl: request.use_ssl.unwrap_or(false),
        tls: request.use_tls.unwrap_or(false),
        timeout: request
            .timeout
            .map(Duration::from_secs)
            .unwrap_or_else(|| settings.connection_timeout()),
    })
}

fn configured_server(
    server: &ServerSettings,
    request: &MailRequest,
    settings: &MailSettings,
    variant: IdnaVariant,
) -> Result<ServerConfig, MailError> {
    let host = server
        .hostname()
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| MailError::configuration("configured mail server has no host"))?;

    let timeout = request
        .timeout
        .or(server.timeout)
        .map(Duration::from_secs)
        .unwrap_or_else(|| settings.connection_timeout());

    Ok(ServerConfig {
        host: host_to_ascii(host, variant)?,
        port: server.port.unwrap_or(DEFAULT_PORT),
        username: non_empty(server.username.as_deref()),
        password: non_empty(server.password.as_deref()),
        ssl: request.use_ssl.or(server.ssl).unwrap_or(false),
        tls: request.use_tls.or(server.tls).unwrap_or(false),
        timeout,
    })
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> MailRequest {
        MailRequest::default()
    }

    #[test]
    fn explicit_server_wins_over_everything() {
        let settings = MailSettings {
            mail_servers: vec![ServerSettings::new("settings.example.com")],
            ..Default::default()
        };
        let ctx = MailContext::new().with_config_servers(vec![ServerSettings::new("config.example.com")]);
        let request = MailRequest {
            server: Some("call.example.com".into()),
            port: Some(2525),
            ..request()
        };

        let servers = resolve_servers(&request, &settings, &ctx).unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].host, "call.example.com");
        assert_eq!(servers[0].port, 2525);
        assert_eq!(servers[0].timeout, Duration::from_secs(60));
    }

    #[test]
    fn falls_through_the_tiers_in_order() {
        let settings = MailSettings::default();
        let ctx = MailContext::new()
            .with_request_servers(vec![ServerSettings::new("request.example.com")]);
        let servers = resolve_servers(&request(), &settings, &ctx).unwrap();
        assert_eq!(servers[0].host, "request.example.com");

        let ctx = ctx.with_config_servers(vec![
            ServerSettings::new("config-a.example.com"),
            ServerSettings::new("config-b.example.com"),
        ]);
        let servers = resolve_servers(&request(), &settings, &ctx).unwrap();
        let hosts: Vec<_> = servers.iter().map(|s| s.host.as_str()).collect();
        assert_eq!(hosts, ["config-a.example.com", "config-b.example.com"]);

        let settings = MailSettings {
            mail_servers: vec![ServerSettings::new("settings.example.com").port(587)],
            ..Default::default()
        };
        let servers = resolve_servers(&request(), &settings, &ctx).unwrap();
        assert_eq!(servers[0].host, "settings.example.com");
        assert_eq!(servers[0].port, 587);
    }

    #[test]
    fn no_servers_is_a_configuration_error() {
        let err = resolve_servers(&request(), &MailSettings::default(), &MailContext::new()).unwrap_err();
        assert!(matches!(err, MailError::Configuration(_)));
    }

    #[test]
    fn hosts_are_idna_encoded() {
        let request = MailRequest {
            server: Some("mail.bücher.example".into()),
            ..request()
        };
        let servers = resolve_servers(&request, &MailSettings::default(), &MailContext::new()).unwrap();
        assert_eq!(servers[0].host, "mail.xn--bcher-kva.example");
    }

    #[test]
    fn explicit_idna_version_applies_strict_rules() {
        let lenient = MailRequest {
            server: Some("bad_host.example.com".into()),
            ..request()
        };
        assert!(resolve_servers(&lenient, &MailSettings::default(), &MailContext::new()).is_ok());

        let strict = MailRequest {
            idna_version: Some(2003),
            ..lenient
        };
        let err = resolve_servers(&strict, &MailSettings::default(), &MailContext::new()).unwrap_err();
        assert!(matches!(err, MailError::Configuration(_)));
    }

    #[test]
    fn timeout_precedence() {
        let settings = MailSettings {
            connection_timeout: 45,
            mail_servers: vec![ServerSettings {
                timeout: Some(10),
                ..ServerSettings::new("smtp.example.com")
            }],
            ..Default::default()
        };
        let ctx = MailContext::new();

        let servers = resolve_servers(&request(), &settings, &ctx).unwrap();
        assert_eq!(servers[0].timeout, Duration::from_secs(10));

        let call = MailRequest {
            timeout: Some(5),
            ..request()
        };
        let servers = resolve_servers(&call, &settings, &ctx).unwrap();
        assert_eq!(servers[0].timeout, Duration::from_secs(5));
    }

    #[test]
    fn call_flags_override_server_flags() {
        let settings = MailSettings {
            mail_servers: vec![ServerSettings {
                ssl: Some(true),
                ..ServerSettings::new("smtp.example.com")
            }],
            ..Default::default()
        };
        let call = MailRequest {
            use_ssl: Some(false),
            use_tls: Some(true),
            ..request()
        };
        let servers = resolve_servers(&call, &settings, &MailContext::new()).unwrap();
        assert!(!servers[0].ssl);
        assert!(servers[0].tls);
    }

    #[test]
    fn username_without_password_is_rejected() {
        let call = MailRequest {
            server: Some("smtp.example.com".into()),
            username: Some("mailer".into()),
            ..request()
        };
        let err = resolve_servers(&call, &MailSettings::default(), &MailContext::new()).unwrap_err();
        assert!(matches!(err, MailError::Configuration(_)));
    }
}
