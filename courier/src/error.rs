//! Error types for the composition-and-delivery pipeline.
//!
//! Every stage of the pipeline reports through [`MailError`]. Each variant is
//! terminal for the call that raised it; the spool is the only place that
//! continues after a failure, and it does so by moving the entry to the bounce
//! store rather than by retrying.

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum MailError {
    /// A required attribute (`from`, `to`, `subject`) is missing or blank.
    #[error("missing required attribute: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("composition error: {0}")]
    Composition(String),

    #[error("security error: {0}")]
    Security(#[from] SecurityError),

    #[error("delivery error: {0}")]
    Delivery(String),

    #[error("spool error: {0}")]
    Spool(#[from] SpoolError),
}

impl MailError {
    pub(crate) fn composition(message: impl Into<String>) -> Self {
        MailError::Composition(message.into())
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        MailError::Configuration(message.into())
    }
}

/// Failure while loading key material or running a signing/encryption step.
#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("unable to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("keystore error: {0}")]
    Keystore(String),

    #[error("openssl error: {0}")]
    Crypto(#[from] openssl::error::ErrorStack),

    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

/// Storage failure in a spool or bounce store.
#[derive(Debug, Error)]
pub enum SpoolError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored entry could not be decoded. It has been removed from its
    /// store; `raw` holds the bytes that were read.
    #[error("unreadable entry {id}: {source}")]
    Unreadable {
        id: Uuid,
        raw: Vec<u8>,
        #[source]
        source: serde_json::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("scheduler error: {0}")]
    Schedule(#[from] tokio_cron_scheduler::JobSchedulerError),
}

pub type MailResult<T> = Result<T, MailError>;
