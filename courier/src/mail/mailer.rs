//! Delivery transports: the `Mailer` trait, SMTP over lettre, and an
//! in-memory recorder.

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lettre::address::Envelope;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor};

use super::message::OutgoingMessage;
use crate::error::MailError;
use crate::resolve::ServerConfig;

/// One delivery attempt of a finished message against a resolved server.
///
/// Implement this trait to provide alternative backends.
#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    /// Send the message. Returns the identifier of the delivered message.
    async fn send(&self, message: &OutgoingMessage, server: &ServerConfig) -> Result<String, MailError>;
}

/// SMTP mailer using lettre. A transport is built per call from the server
/// the message resolved to.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmtpMailer;

impl SmtpMailer {
    pub fn new() -> Self {
        Self
    }

    fn transport(server: &ServerConfig) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailError> {
        let mut builder = if server.ssl {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&server.host)
                .map_err(|e| MailError::Delivery(e.to_string()))?
        } else if server.tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&server.host)
                .map_err(|e| MailError::Delivery(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&server.host)
        };

        builder = builder.port(server.port).timeout(Some(server.timeout));

        if let Some((username, password)) = server.credentials() {
            builder = builder.credentials(Credentials::new(username.to_string(), password.to_string()));
        }

        Ok(builder.build())
    }
}

fn envelope(message: &OutgoingMessage) -> Result<Envelope, MailError> {
    let parse = |addr: &str| {
        Address::from_str(addr).map_err(|e| MailError::Delivery(format!("invalid address {addr}: {e}")))
    };
    let from = parse(&message.envelope_from)?;
    let recipients = message
        .recipients
        .iter()
        .map(|r| parse(r))
        .collect::<Result<Vec<_>, _>>()?;
    Envelope::new(Some(from), recipients).map_err(|e| MailError::Delivery(e.to_string()))
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: &OutgoingMessage, server: &ServerConfig) -> Result<String, MailError> {
        let envelope = envelope(message)?;
        let transport = Self::transport(server)?;

        let response = transport
            .send_raw(&envelope, &message.raw)
            .await
            .map_err(|e| MailError::Delivery(e.to_string()))?;

        tracing::debug!(
            message_id = %message.message_id,
            host = %server.host,
            code = %response.code(),
            "smtp accepted message"
        );
        Ok(message.message_id.clone())
    }
}

/// Records messages instead of sending them. Optionally fails every send.
#[derive(Debug, Clone, Default)]
pub struct MemoryMailer {
    sent: Arc<Mutex<Vec<(OutgoingMessage, ServerConfig)>>>,
    failure: Option<String>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer whose every send fails with a delivery error.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.deliveries().into_iter().map(|(message, _)| message).collect()
    }

    pub fn deliveries(&self) -> Vec<(OutgoingMessage, ServerConfig)> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().map(|sent| sent.len()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, message: &OutgoingMessage, server: &ServerConfig) -> Result<String, MailError> {
        if let Some(reason) = &self.failure {
            return Err(MailError::Delivery(reason.clone()));
        }
        envelope(message)?;
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((message.clone(), server.clone()));
        }
        Ok(message.message_id.clone())
    }
}
