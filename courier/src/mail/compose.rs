//! Builds a [`MailMessage`] and its MIME tree from a [`MailBuilder`].

use std::path::Path;
use std::time::SystemTime;

use lettre::address::Envelope;
use lettre::message::header::{ContentDisposition, ContentId, HeaderName, HeaderValue};
use lettre::message::SinglePart;
use lettre::Message;
use time::OffsetDateTime;
use uuid::Uuid;

use super::address::{parse_list, IdnaVariant, Mailbox};
use super::detect::ContentTypeDetector;
use super::message::{Attachment, Disposition, MailMessage, MessageBody, MimeSection, OutgoingMessage};
use super::mime::{content_type, ContentDescription, Leaf, MimeNode, Multipart};
use super::request::{MailBuilder, ParamSpec, PartSpec};
use super::wrap::wrap_text;
use crate::config::MailSettings;
use crate::error::{MailError, MailResult};

/// A composed message: the structural model, the MIME tree that will be sent,
/// and the generated identity headers.
#[derive(Debug, Clone)]
pub struct ComposedMessage {
    pub message_id: String,
    pub date: OffsetDateTime,
    pub message: MailMessage,
    pub body: MimeNode,
}

impl ComposedMessage {
    /// Serialise the message with its top-level headers for the transport.
    pub fn to_outgoing(&self) -> MailResult<OutgoingMessage> {
        let message = &self.message;

        let mut builder = Message::builder()
            .message_id(Some(self.message_id.clone()))
            .date(SystemTime::from(self.date))
            .from(message.from.to_lettre()?);
        for mailbox in &message.to {
            builder = builder.to(mailbox.to_lettre()?);
        }
        for mailbox in &message.cc {
            builder = builder.cc(mailbox.to_lettre()?);
        }
        for mailbox in &message.reply_to {
            builder = builder.reply_to(mailbox.to_lettre()?);
        }
        builder = builder.subject(message.subject.clone());
        for (name, value) in &message.headers {
            let name = HeaderName::new_from_ascii(name.clone())
                .map_err(|_| MailError::composition(format!("invalid header name '{name}'")))?;
            builder = builder.raw_header(HeaderValue::new(name, value.clone()));
        }

        let recipients = message
            .recipients()
            .map(|m| m.to_lettre().map(|mailbox| mailbox.email))
            .collect::<MailResult<Vec<_>>>()?;
        let envelope = Envelope::new(Some(message.bounce_address.to_lettre()?.email), recipients)
            .map_err(|e| MailError::composition(format!("invalid envelope: {e}")))?;
        builder = builder.envelope(envelope);

        let email = match &self.body {
            MimeNode::Leaf(leaf) => builder.singlepart(leaf.part().clone()),
            MimeNode::Multipart(multipart) => builder.multipart(multipart.to_part()),
        }
        .map_err(|e| MailError::composition(format!("unable to build message: {e}")))?;

        Ok(OutgoingMessage {
            message_id: self.message_id.clone(),
            envelope_from: message.bounce_address.address.clone(),
            recipients: message.recipients().map(|m| m.address.clone()).collect(),
            subject: message.subject.clone(),
            raw: email.formatted(),
        })
    }
}

/// Turns call attributes into a message structure.
pub struct MessageComposer<'a> {
    settings: &'a MailSettings,
    detector: &'a dyn ContentTypeDetector,
}

impl<'a> MessageComposer<'a> {
    pub fn new(settings: &'a MailSettings, detector: &'a dyn ContentTypeDetector) -> Self {
        Self { settings, detector }
    }

    /// Compose `mail`. `secured` forces a multi-part structure, as signing and
    /// encryption always wrap a multi-part entity.
    pub fn compose(&self, mail: &MailBuilder, secured: bool) -> MailResult<ComposedMessage> {
        let request = &mail.request;
        request.validate()?;

        let variant = IdnaVariant::from_version(request.idna_version);
        let charset = canonical_charset(
            request
                .charset
                .as_deref()
                .unwrap_or(&self.settings.default_encoding),
        )?;

        let from = Mailbox::parse(request.from.as_deref().unwrap_or_default(), "from", variant)?;
        let to = parse_list(request.to.as_deref().unwrap_or_default(), "to", variant)?;
        if to.is_empty() {
            return Err(MailError::Validation("to".to_string()));
        }
        let cc = optional_list(request.cc.as_deref(), "cc", variant)?;
        let bcc = optional_list(request.bcc.as_deref(), "bcc", variant)?;
        let reply_to = optional_list(request.reply_to.as_deref(), "replyTo", variant)?;
        let bounce_address = match request.fail_to.as_deref().map(str::trim) {
            Some(fail_to) if !fail_to.is_empty() => Mailbox::parse(fail_to, "failTo", variant)?,
            _ => from.clone(),
        };

        let mut headers = Vec::new();
        if let Some(mailer_id) = request.mailer_id.as_deref().filter(|id| !id.is_empty()) {
            headers.push(("X-Mailer".to_string(), mailer_id.to_string()));
        }
        let mut attachments = Vec::new();
        for param in &mail.params {
            match (&param.file, &param.name) {
                (Some(file), _) => attachments.push(self.attachment(param, file)?),
                (None, Some(name)) => headers.push(custom_header(name, param.value.as_deref())?),
                (None, None) => tracing::debug!("ignoring parameter with neither name nor file"),
            }
        }
        if let Some(path) = &request.mime_attach {
            let mut attachment = self.attachment(&ParamSpec::file(path.clone()), path)?;
            attachment.remove_after_send = request.remove;
            attachments.push(attachment);
        }

        let multipart = secured || !mail.parts.is_empty() || !attachments.is_empty();
        let declared_type = request.content_type.as_deref().and_then(message_type);
        let (content_type, body) = if multipart {
            let sections = if mail.parts.is_empty() {
                vec![MimeSection {
                    content_type: declared_type.unwrap_or_else(|| "text/plain".to_string()),
                    charset: charset.to_string(),
                    disposition: None,
                    content: wrapped(&request.body, request.wrap_text),
                    file_name: None,
                }]
            } else {
                mail.parts
                    .iter()
                    .map(|part| section(part, charset, request.wrap_text))
                    .collect::<MailResult<Vec<_>>>()?
            };
            ("multipart/mixed".to_string(), MessageBody::Sections(sections))
        } else {
            let content = wrapped(&request.body, request.wrap_text);
            (
                declared_type.unwrap_or_else(|| "text/html".to_string()),
                MessageBody::Simple { content },
            )
        };

        let message = MailMessage {
            from,
            to,
            cc,
            bcc,
            reply_to,
            bounce_address,
            subject: request.subject.clone().unwrap_or_default(),
            charset: charset.to_string(),
            content_type,
            body,
            attachments,
            headers,
        };

        let body = render(&message)?;
        let domain = message
            .from
            .address
            .rsplit_once('@')
            .map(|(_, domain)| domain)
            .unwrap_or("localhost");

        Ok(ComposedMessage {
            message_id: format!("<{}@{}>", Uuid::new_v4().simple(), domain),
            date: OffsetDateTime::now_utc(),
            message,
            body,
        })
    }

    fn attachment(&self, param: &ParamSpec, path: &Path) -> MailResult<Attachment> {
        let readable = std::fs::metadata(path)
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if !readable {
            return Err(MailError::composition(format!(
                "attachment {} is not a readable file",
                path.display()
            )));
        }

        let content_type = match param.content_type.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(explicit) => explicit.trim().to_ascii_lowercase(),
            None => self.detector.detect(path).ok_or_else(|| {
                MailError::composition(format!(
                    "unable to detect the content type of {}",
                    path.display()
                ))
            })?,
        };

        let disposition = match param.disposition.as_deref() {
            Some(value) => value.parse()?,
            None => Disposition::default(),
        };

        Ok(Attachment {
            path: path.to_path_buf(),
            file_name: param.file_name.clone().filter(|name| !name.is_empty()),
            disposition,
            description: param.description.clone(),
            content_id: param.content_id.clone(),
            content_type,
            remove_after_send: param.remove,
        })
    }
}

fn optional_list(list: Option<&str>, field: &str, variant: IdnaVariant) -> MailResult<Vec<Mailbox>> {
    match list {
        Some(list) => parse_list(list, field, variant),
        None => Ok(Vec::new()),
    }
}

fn custom_header(name: &str, value: Option<&str>) -> MailResult<(String, String)> {
    let name = name.trim();
    if name.is_empty() || name.contains(|c: char| c == ':' || c.is_whitespace() || c.is_control()) {
        return Err(MailError::composition(format!("invalid header name '{name}'")));
    }
    let value = value.unwrap_or_default();
    if value.contains(['\r', '\n']) {
        return Err(MailError::composition(format!(
            "header '{name}' contains a line break"
        )));
    }
    Ok((name.to_string(), value.to_string()))
}

fn section(part: &PartSpec, charset: &str, message_wrap: Option<usize>) -> MailResult<MimeSection> {
    let declared = part
        .content_type
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| MailError::composition("content part requires a type"))?;

    let charset = match part.charset.as_deref() {
        Some(own) => canonical_charset(own)?,
        None => charset,
    };

    Ok(MimeSection {
        content_type: section_type(declared),
        charset: charset.to_string(),
        disposition: None,
        content: wrapped(&part.body, part.wrap_text.or(message_wrap)),
        file_name: None,
    })
}

fn wrapped(text: &str, width: Option<usize>) -> String {
    match width {
        Some(width) => wrap_text(text, width),
        None => text.to_string(),
    }
}

/// Message-level `type`: `html` and `text`/`plain` shorthands, else as given.
fn message_type(declared: &str) -> Option<String> {
    let declared = declared.trim().to_ascii_lowercase();
    match declared.as_str() {
        "" => None,
        "html" => Some("text/html".to_string()),
        "text" | "plain" => Some("text/plain".to_string()),
        _ => Some(declared),
    }
}

fn section_type(declared: &str) -> String {
    let declared = declared.to_ascii_lowercase();
    if declared.contains("html") {
        "text/html".to_string()
    } else if declared.contains("text") {
        "text/plain".to_string()
    } else {
        declared
    }
}

pub(crate) fn canonical_charset(name: &str) -> MailResult<&'static str> {
    match name.trim().to_ascii_lowercase().as_str() {
        "utf-8" | "utf8" => Ok("utf-8"),
        "us-ascii" | "ascii" => Ok("us-ascii"),
        "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" => Ok("iso-8859-1"),
        other => Err(MailError::composition(format!("unsupported charset '{other}'"))),
    }
}

fn section_leaf(section: &MimeSection) -> MailResult<Leaf> {
    let builder = match (section.disposition, section.file_name.as_deref()) {
        (None, _) => SinglePart::builder(),
        (Some(Disposition::Inline), None) => SinglePart::builder().header(ContentDisposition::inline()),
        (Some(disposition), name) => {
            SinglePart::builder().header(disposition_header(disposition, name.unwrap_or_default()))
        }
    };
    Leaf::text_with(builder, &section.content_type, &section.charset, &section.content)
}

fn disposition_header(disposition: Disposition, file_name: &str) -> ContentDisposition {
    match disposition {
        Disposition::Attachment => ContentDisposition::attachment(file_name),
        Disposition::Inline => ContentDisposition::inline_with_name(file_name),
    }
}

fn attachment_leaf(attachment: &Attachment) -> MailResult<Leaf> {
    let data = std::fs::read(&attachment.path).map_err(|e| {
        MailError::composition(format!(
            "unable to read attachment {}: {e}",
            attachment.path.display()
        ))
    })?;
    let file_name = attachment.file_name();
    let mut builder = SinglePart::builder().header(disposition_header(attachment.disposition, &file_name));
    if let Some(id) = &attachment.content_id {
        builder = builder.header(ContentId::from(format!("<{}>", id.trim_matches(['<', '>']))));
    }
    if let Some(description) = &attachment.description {
        builder = builder.header(ContentDescription::new(description.as_str()));
    }
    Ok(Leaf::binary(builder, content_type(&attachment.content_type)?, data))
}

fn render(message: &MailMessage) -> MailResult<MimeNode> {
    match &message.body {
        MessageBody::Simple { content } => {
            Ok(Leaf::text(&message.content_type, &message.charset, content)?.into())
        }
        MessageBody::Sections(sections) => {
            let mut root = Multipart::mixed();
            match sections.as_slice() {
                [single] => root.push(section_leaf(single)?),
                many => {
                    let mut alternative = Multipart::alternative();
                    for section in many {
                        alternative.push(section_leaf(section)?);
                    }
                    root.push(alternative);
                }
            }
            for attachment in &message.attachments {
                root.push(attachment_leaf(attachment)?);
            }
            Ok(root.into())
        }
    }
}
