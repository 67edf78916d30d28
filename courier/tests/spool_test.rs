use std::sync::Arc;

use courier::mail::{MailBuilder, Mailer, MemoryMailer};
use courier::spool::{BounceEntry, EntryStore, FileStore, SpoolEntry, SpoolManager};
use courier::{MailContext, MailService, MailSettings, ServerSettings};
use tempfile::TempDir;
use uuid::Uuid;

type FileSpool = SpoolManager<FileStore<SpoolEntry>, FileStore<BounceEntry>>;

async fn file_spool(dir: &TempDir, mailer: &MemoryMailer) -> Arc<FileSpool> {
    let spool = FileStore::open(dir.path().join("unsent")).await.unwrap();
    let bounces = FileStore::open(dir.path().join("bounced")).await.unwrap();
    Arc::new(SpoolManager::new(spool, bounces, Arc::new(mailer.clone())).log_enabled(true))
}

fn service(mailer: &MemoryMailer, spool: Arc<FileSpool>) -> MailService<FileStore<SpoolEntry>, FileStore<BounceEntry>> {
    let mailer: Arc<dyn Mailer> = Arc::new(mailer.clone());
    MailService::new(Arc::new(MailSettings::default()), mailer, spool)
}

fn ctx() -> MailContext {
    MailContext::new().with_config_servers(vec![ServerSettings::new("smtp.example.com").port(2525)])
}

fn spooled(subject: &str) -> MailBuilder {
    MailBuilder::new()
        .from("sender@example.com")
        .to("user@example.com")
        .subject(subject)
        .body("queued for later")
        .spool(true)
}

#[tokio::test]
async fn spooled_entries_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mailer = MemoryMailer::new();

    let id = {
        let spool = file_spool(&dir, &mailer).await;
        service(&mailer, spool)
            .send(&spooled("Persisted"), &ctx())
            .await
            .unwrap()
            .spool_id()
            .unwrap()
    };
    assert!(dir.path().join("unsent").join(format!("{id}.json")).exists());
    assert_eq!(mailer.count(), 0);

    let reopened = file_spool(&dir, &mailer).await;
    let entries = reopened.spool().list().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, id);
    assert_eq!(entries[0].server.port, 2525);
    assert_eq!(entries[0].message.subject, "Persisted");

    let summary = reopened.run_cycle().await.unwrap();
    assert_eq!(summary.processed, 1);
    assert!(reopened.spool().is_empty().await.unwrap());

    let (message, server) = &mailer.deliveries()[0];
    assert_eq!(server.host, "smtp.example.com");
    assert!(message.raw_str().contains("Subject: Persisted\r\n"));
}

#[tokio::test]
async fn bounced_entry_moves_to_the_bounce_directory() {
    let dir = tempfile::tempdir().unwrap();
    let failing = MemoryMailer::failing("421 service not available");
    let spool = file_spool(&dir, &failing).await;

    let id = service(&failing, spool.clone())
        .send(&spooled("Bounced"), &ctx())
        .await
        .unwrap()
        .spool_id()
        .unwrap();

    let summary = spool.run_cycle().await.unwrap();
    assert_eq!(summary.failures, 1);
    assert!(summary.diagnostics[0].starts_with(&id.to_string()));

    assert!(!dir.path().join("unsent").join(format!("{id}.json")).exists());
    assert!(dir.path().join("bounced").join(format!("{id}.json")).exists());

    let bounce = spool.bounces().get(id).await.unwrap().unwrap();
    assert_eq!(bounce.entry.message.subject, "Bounced");
    assert!(bounce.diagnostic.contains("421"));
}

#[tokio::test]
async fn spooled_attachment_is_removed_only_after_delivery() {
    let dir = tempfile::tempdir().unwrap();
    let upload = dir.path().join("upload.txt");
    std::fs::write(&upload, b"one-shot").unwrap();

    let mailer = MemoryMailer::new();
    let spool = file_spool(&dir, &mailer).await;

    let mut mail = spooled("With attachment");
    mail.request.mime_attach = Some(upload.clone());
    mail.request.remove = true;
    service(&mailer, spool.clone()).send(&mail, &ctx()).await.unwrap();

    assert!(upload.exists());
    spool.run_cycle().await.unwrap();
    assert!(!upload.exists());
}

#[tokio::test]
async fn concurrent_cycles_deliver_each_entry_once() {
    let dir = tempfile::tempdir().unwrap();
    let mailer = MemoryMailer::new();
    let spool = file_spool(&dir, &mailer).await;
    let service = service(&mailer, spool.clone());

    for n in 0..5 {
        service.send(&spooled(&format!("Message {n}")), &ctx()).await.unwrap();
    }

    let (a, b) = tokio::join!(spool.run_cycle(), spool.run_cycle());
    let delivered = a.unwrap().processed + b.unwrap().processed;

    assert_eq!(delivered, 5);
    assert_eq!(mailer.count(), 5);
    assert!(spool.spool().is_empty().await.unwrap());
}

#[tokio::test]
async fn unreadable_entry_is_bounced_without_stopping_the_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let mailer = MemoryMailer::new();
    let spool = file_spool(&dir, &mailer).await;
    let service = service(&mailer, spool.clone());

    for n in 0..5 {
        service.send(&spooled(&format!("Message {n}")), &ctx()).await.unwrap();
    }
    let broken = Uuid::new_v4();
    std::fs::write(dir.path().join("unsent").join(format!("{broken}.json")), b"{ not json").unwrap();

    let summary = spool.run_cycle().await.unwrap();

    assert_eq!(summary.processed, 5);
    assert_eq!(summary.failures, 1);
    assert!(summary.diagnostics[0].starts_with(&broken.to_string()));
    assert_eq!(mailer.count(), 5);
    assert!(spool.spool().is_empty().await.unwrap());
    assert_eq!(std::fs::read_dir(dir.path().join("unsent")).unwrap().count(), 0);
    assert_eq!(
        std::fs::read(dir.path().join("bounced").join(format!("{broken}.unreadable"))).unwrap(),
        b"{ not json"
    );

    let again = spool.run_cycle().await.unwrap();
    assert_eq!(again.failures, 0);
}
