//! The composition-and-delivery pipeline.
//!
//! [`MailService::send`] runs, in order: attribute validation, security option
//! resolution, server resolution, composition, the S/MIME envelope, and then
//! either an immediate send or an enqueue on the spool.

use std::sync::Arc;

use uuid::Uuid;

use crate::config::{MailContext, MailSettings};
use crate::error::{MailError, MailResult};
use crate::mail::{
    ComposedMessage, ContentTypeDetector, ExtensionDetector, MailBuilder, Mailer, MessageComposer,
};
use crate::resolve::{resolve_servers, ServerConfig};
use crate::security::{seal, SecurityOptions};
use crate::spool::{remove_files, BounceEntry, EntryStore, SpoolEntry, SpoolManager, SpoolOptions};

/// How a message left the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Delivered now; carries the transport's message identifier.
    Sent { message_id: String },
    /// Stored for the next spool cycle under this id.
    Spooled { id: Uuid },
}

/// Result of one call: the message as built and where it went.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub composed: ComposedMessage,
    pub server: ServerConfig,
    /// Every resolved candidate; only the first is used.
    pub candidates: Vec<ServerConfig>,
    pub delivery: Delivery,
}

impl Dispatch {
    /// The transport identifier, for immediate sends.
    pub fn message_id(&self) -> Option<&str> {
        match &self.delivery {
            Delivery::Sent { message_id } => Some(message_id),
            Delivery::Spooled { .. } => None,
        }
    }

    pub fn spool_id(&self) -> Option<Uuid> {
        match self.delivery {
            Delivery::Spooled { id } => Some(id),
            Delivery::Sent { .. } => None,
        }
    }
}

pub struct MailService<S, B>
where
    S: EntryStore<SpoolEntry>,
    B: EntryStore<BounceEntry>,
{
    settings: Arc<MailSettings>,
    mailer: Arc<dyn Mailer>,
    detector: Arc<dyn ContentTypeDetector>,
    spool: Arc<SpoolManager<S, B>>,
}

impl<S, B> MailService<S, B>
where
    S: EntryStore<SpoolEntry>,
    B: EntryStore<BounceEntry>,
{
    pub fn new(settings: Arc<MailSettings>, mailer: Arc<dyn Mailer>, spool: Arc<SpoolManager<S, B>>) -> Self {
        Self {
            settings,
            mailer,
            detector: Arc::new(ExtensionDetector),
            spool,
        }
    }

    pub fn with_detector(mut self, detector: Arc<dyn ContentTypeDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn settings(&self) -> &MailSettings {
        &self.settings
    }

    pub fn spool(&self) -> &Arc<SpoolManager<S, B>> {
        &self.spool
    }

    /// Compose `mail` and deliver or spool it.
    pub async fn send(&self, mail: &MailBuilder, ctx: &MailContext) -> MailResult<Dispatch> {
        let request = &mail.request;
        request.validate()?;

        let security = SecurityOptions::resolve(request, &self.settings)?;
        let candidates = resolve_servers(request, &self.settings, ctx)?;
        let server = candidates
            .first()
            .cloned()
            .ok_or_else(|| MailError::configuration("no mail servers have been defined"))?;

        let mut composed = MessageComposer::new(&self.settings, self.detector.as_ref())
            .compose(mail, security.is_active())?;
        if security.is_active() {
            composed.body = seal(composed.body, &security)?;
        }

        let outgoing = composed.to_outgoing()?;
        let remove_after_send: Vec<_> = composed
            .message
            .attachments
            .iter()
            .filter(|a| a.remove_after_send)
            .map(|a| a.path.clone())
            .collect();

        let spool_enabled = request.spool_enable.unwrap_or(self.settings.spool_enable);
        let delivery = if spool_enabled {
            let entry = SpoolEntry::new(outgoing, server.clone())
                .priority(request.priority.clone())
                .options(SpoolOptions { remove_after_send });
            let id = self.spool.enqueue(entry).await?;
            tracing::info!(%id, message_id = %composed.message_id, "message spooled for delivery");
            Delivery::Spooled { id }
        } else {
            let message_id = self.mailer.send(&outgoing, &server).await?;
            tracing::info!(%message_id, host = %server.host, "message sent");
            remove_files(&remove_after_send).await;
            Delivery::Sent { message_id }
        };

        Ok(Dispatch {
            composed,
            server,
            candidates,
            delivery,
        })
    }
}
