//! Mail composition and delivery.
//!
//! `courier` turns a declarative mail description into a MIME message,
//! optionally signs and encrypts it with S/MIME, and delivers it over SMTP
//! either immediately or through a spool drained by a background cycle.
//!
//! - [`config`]: process-wide [`MailSettings`] and per-call [`MailContext`].
//! - [`resolve`]: which SMTP server a call uses.
//! - [`mail`]: request attributes, composition, MIME rendering, transports.
//! - [`security`]: S/MIME signing and encryption.
//! - [`spool`]: deferred delivery and bounces.
//! - [`service`]: the pipeline tying them together.

pub mod config;
pub mod error;
pub mod mail;
pub mod resolve;
pub mod security;
pub mod service;
pub mod spool;

pub use config::{EnvConfig, MailContext, MailSettings, ServerSettings, SigningSettings};
pub use error::{MailError, MailResult, SecurityError, SpoolError};
pub use resolve::{resolve_servers, ServerConfig};
pub use service::{Delivery, Dispatch, MailService};
