use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::mail::OutgoingMessage;
use crate::resolve::ServerConfig;

/// Options resolved at enqueue time that are still needed to finish delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpoolOptions {
    /// Files to delete once the message has been delivered.
    pub remove_after_send: Vec<PathBuf>,
}

/// A message waiting for the next spool cycle.
///
/// This is the unit stored in the unsent store, keyed by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpoolEntry {
    pub id: Uuid,
    pub message: OutgoingMessage,
    pub server: ServerConfig,
    /// Carried as given; the cycle does not order by it.
    pub priority: Option<String>,
    pub options: SpoolOptions,
    pub created_at: OffsetDateTime,
}

impl SpoolEntry {
    pub fn new(message: OutgoingMessage, server: ServerConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            message,
            server,
            priority: None,
            options: SpoolOptions::default(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn priority(mut self, priority: Option<String>) -> Self {
        self.priority = priority;
        self
    }

    pub fn options(mut self, options: SpoolOptions) -> Self {
        self.options = options;
        self
    }
}

/// A spooled message whose delivery attempt failed. Shares the spool id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BounceEntry {
    pub id: Uuid,
    pub entry: SpoolEntry,
    pub diagnostic: String,
    pub failed_at: OffsetDateTime,
}

impl BounceEntry {
    pub fn new(entry: SpoolEntry, diagnostic: impl Into<String>) -> Self {
        Self {
            id: entry.id,
            entry,
            diagnostic: diagnostic.into(),
            failed_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Outcome of one spool cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub processed: usize,
    pub failures: usize,
    pub diagnostics: Vec<String>,
}

impl std::fmt::Display for CycleSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "processed {}, failed {}", self.processed, self.failures)
    }
}
