use std::path::PathBuf;
use std::sync::Arc;

use tracing::Instrument;
use uuid::Uuid;

use super::entry::{BounceEntry, CycleSummary, SpoolEntry};
use super::traits::EntryStore;
use crate::error::SpoolError;
use crate::mail::Mailer;

/// Owns the unsent and bounced stores and runs delivery cycles over them.
///
/// A cycle snapshots the unsent keys and handles each entry in turn, one at a
/// time. Every entry it takes is gone from the unsent store afterwards: on
/// success it is dropped, on failure it moves to the bounce store under the
/// same id. Nothing is retried.
///
/// ```ignore
/// let manager = SpoolManager::new(spool, bounces, Arc::new(SmtpMailer::new()));
/// let id = manager.enqueue(SpoolEntry::new(message, server)).await?;
/// let summary = manager.run_cycle().await?;
/// ```
pub struct SpoolManager<S, B>
where
    S: EntryStore<SpoolEntry>,
    B: EntryStore<BounceEntry>,
{
    spool: S,
    bounces: B,
    mailer: Arc<dyn Mailer>,
    log_enabled: bool,
}

impl<S, B> SpoolManager<S, B>
where
    S: EntryStore<SpoolEntry>,
    B: EntryStore<BounceEntry>,
{
    pub fn new(spool: S, bounces: B, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            spool,
            bounces,
            mailer,
            log_enabled: false,
        }
    }

    /// Log each delivered entry at `info` (default: off).
    pub fn log_enabled(mut self, enabled: bool) -> Self {
        self.log_enabled = enabled;
        self
    }

    pub fn spool(&self) -> &S {
        &self.spool
    }

    pub fn bounces(&self) -> &B {
        &self.bounces
    }

    /// Persist `entry` for the next cycle. Returns its id.
    pub async fn enqueue(&self, entry: SpoolEntry) -> Result<Uuid, SpoolError> {
        let id = entry.id;
        self.spool.put(id, &entry).await?;
        tracing::debug!(%id, message_id = %entry.message.message_id, "message spooled");
        Ok(id)
    }

    /// Run one delivery cycle over the entries currently spooled.
    pub async fn run_cycle(&self) -> Result<CycleSummary, SpoolError> {
        let keys = self.spool.keys().await?;
        let mut summary = CycleSummary::default();

        for id in keys {
            let entry = match self.spool.take(id).await {
                Ok(Some(entry)) => entry,
                // Another cycle or process may have consumed it since the snapshot.
                Ok(None) => continue,
                Err(SpoolError::Unreadable { raw, source, .. }) => {
                    summary.failures += 1;
                    let diagnostic = format!("{id}: unreadable spool entry: {source}");
                    tracing::warn!(%id, error = %source, "unreadable spool entry bounced");
                    match self.bounces.put_unreadable(id, &raw).await {
                        Ok(()) => summary.diagnostics.push(diagnostic),
                        Err(store_err) => {
                            tracing::error!(%id, error = %store_err, "failed to keep unreadable entry");
                            summary
                                .diagnostics
                                .push(format!("{diagnostic} (entry not kept: {store_err})"));
                        }
                    }
                    continue;
                }
                Err(e) => {
                    summary.failures += 1;
                    tracing::error!(%id, error = %e, "unable to take spool entry");
                    summary.diagnostics.push(format!("{id}: {e}"));
                    continue;
                }
            };

            let span = tracing::info_span!("spool_entry", %id, host = %entry.server.host);
            let result = self
                .mailer
                .send(&entry.message, &entry.server)
                .instrument(span)
                .await;

            match result {
                Ok(message_id) => {
                    summary.processed += 1;
                    if self.log_enabled {
                        tracing::info!(%id, %message_id, subject = %entry.message.subject, "spooled message delivered");
                    }
                    remove_files(&entry.options.remove_after_send).await;
                }
                Err(e) => {
                    summary.failures += 1;
                    let diagnostic = format!("{id}: {e}");
                    tracing::warn!(%id, error = %e, "spooled message bounced");
                    if let Err(store_err) = self.bounces.put(id, &BounceEntry::new(entry, e.to_string())).await {
                        tracing::error!(%id, error = %store_err, "failed to record bounce");
                        summary
                            .diagnostics
                            .push(format!("{diagnostic} (bounce not recorded: {store_err})"));
                        continue;
                    }
                    summary.diagnostics.push(diagnostic);
                }
            }
        }

        Ok(summary)
    }
}

/// Delete one-shot attachment files. Failures are logged, not raised: the
/// message has already been delivered.
pub(crate) async fn remove_files(paths: &[PathBuf]) {
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => tracing::debug!(path = %path.display(), "removed attachment after delivery"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "unable to remove attachment"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::{MemoryMailer, OutgoingMessage};
    use crate::resolve::ServerConfig;
    use crate::spool::MemoryStore;

    fn entry() -> SpoolEntry {
        SpoolEntry::new(
            OutgoingMessage {
                message_id: format!("<{}@example.com>", Uuid::new_v4().simple()),
                envelope_from: "sender@example.com".into(),
                recipients: vec!["user@example.com".into()],
                subject: "Spooled".into(),
                raw: b"Subject: Spooled\r\n\r\nHello".to_vec(),
            },
            ServerConfig::new("localhost"),
        )
    }

    fn manager(mailer: MemoryMailer) -> SpoolManager<MemoryStore<SpoolEntry>, MemoryStore<BounceEntry>> {
        SpoolManager::new(MemoryStore::new(), MemoryStore::new(), Arc::new(mailer))
    }

    #[tokio::test]
    async fn empty_cycle_does_nothing() {
        let manager = manager(MemoryMailer::new());
        assert_eq!(manager.run_cycle().await.unwrap(), CycleSummary::default());
    }

    #[tokio::test]
    async fn delivered_entries_leave_the_spool() {
        let mailer = MemoryMailer::new();
        let manager = manager(mailer.clone());
        manager.enqueue(entry()).await.unwrap();
        manager.enqueue(entry()).await.unwrap();

        let summary = manager.run_cycle().await.unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.failures, 0);
        assert_eq!(mailer.count(), 2);
        assert!(manager.spool().is_empty().await.unwrap());
        assert!(manager.bounces().is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn failures_are_bounced_not_retried() {
        let manager = manager(MemoryMailer::failing("550 mailbox unavailable"));
        let id = manager.enqueue(entry()).await.unwrap();

        let summary = manager.run_cycle().await.unwrap();
        assert_eq!(summary.failures, 1);
        assert!(summary.diagnostics[0].contains("550 mailbox unavailable"));
        assert!(manager.spool().is_empty().await.unwrap());

        let bounce = manager.bounces().get(id).await.unwrap().unwrap();
        assert_eq!(bounce.id, id);
        assert!(bounce.diagnostic.contains("550"));

        let again = manager.run_cycle().await.unwrap();
        assert_eq!(again, CycleSummary::default());
    }

    #[tokio::test]
    async fn one_shot_attachments_are_removed_after_delivery() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("invoice.pdf");
        std::fs::write(&file, b"%PDF").unwrap();

        let manager = manager(MemoryMailer::new());
        let mut spooled = entry();
        spooled.options.remove_after_send.push(file.clone());
        manager.enqueue(spooled).await.unwrap();

        manager.run_cycle().await.unwrap();
        assert!(!file.exists());
    }
}
