//! Message composition and delivery.
//!
//! A call is described by a [`MailBuilder`]: the [`MailRequest`] attributes
//! plus any nested [`PartSpec`] sections and [`ParamSpec`] headers or
//! attachments. The [`MessageComposer`] turns it into a [`MailMessage`] and a
//! [`MimeNode`] tree; a [`Mailer`] delivers the serialised result.
//!
//! ```ignore
//! let mail = MailBuilder::new()
//!     .from("sender@example.com")
//!     .to("user@example.com")
//!     .subject("Welcome!")
//!     .part(PartSpec::new("text", "Thanks for joining."))
//!     .part(PartSpec::new("html", "<p>Thanks for joining.</p>"));
//!
//! let composed = MessageComposer::new(&settings, &ExtensionDetector).compose(&mail, false)?;
//! SmtpMailer::new().send(&composed.to_outgoing()?, &server).await?;
//! ```

mod address;
mod compose;
mod detect;
mod mailer;
mod message;
mod mime;
mod request;
mod wrap;

pub use address::{host_to_ascii, parse_list, IdnaVariant, Mailbox};
pub use compose::{ComposedMessage, MessageComposer};
pub use detect::{ContentTypeDetector, ExtensionDetector};
pub use mailer::{Mailer, MemoryMailer, SmtpMailer};
pub use message::{Attachment, Disposition, MailMessage, MessageBody, MimeSection, OutgoingMessage};
pub use mime::{content_type, ContentDescription, Leaf, MimeNode, Multipart};
pub use request::{MailBuilder, MailRequest, ParamSpec, PartSpec};
pub use wrap::wrap_text;
