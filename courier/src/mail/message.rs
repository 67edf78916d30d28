//! Composed message types.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::address::Mailbox;
use crate::error::MailError;

/// How a part should be presented by the receiving client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    #[default]
    Attachment,
    Inline,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Attachment => "attachment",
            Disposition::Inline => "inline",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Disposition {
    type Err = MailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "attachment" => Ok(Disposition::Attachment),
            "inline" => Ok(Disposition::Inline),
            other => Err(MailError::composition(format!("unknown disposition '{other}'"))),
        }
    }
}

/// One declared content part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MimeSection {
    pub content_type: String,
    pub charset: String,
    pub disposition: Option<Disposition>,
    pub content: String,
    pub file_name: Option<String>,
}

/// A file attached to a multi-part message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub path: PathBuf,
    pub file_name: Option<String>,
    pub disposition: Disposition,
    pub description: Option<String>,
    pub content_id: Option<String>,
    pub content_type: String,
    /// Delete the source file once the message has been delivered.
    pub remove_after_send: bool,
}

impl Attachment {
    /// The override file name if set, otherwise the source file's base name.
    pub fn file_name(&self) -> String {
        self.file_name.clone().unwrap_or_else(|| base_name(&self.path))
    }
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Either a single content blob or an ordered, non-empty list of sections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageBody {
    Simple { content: String },
    Sections(Vec<MimeSection>),
}

impl MessageBody {
    pub fn is_simple(&self) -> bool {
        matches!(self, MessageBody::Simple { .. })
    }

    pub fn sections(&self) -> &[MimeSection] {
        match self {
            MessageBody::Simple { .. } => &[],
            MessageBody::Sections(sections) => sections,
        }
    }
}

/// The structural model of a composed message, before MIME rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    pub from: Mailbox,
    pub to: Vec<Mailbox>,
    pub cc: Vec<Mailbox>,
    pub bcc: Vec<Mailbox>,
    pub reply_to: Vec<Mailbox>,
    /// Envelope sender that receives delivery failure notices.
    pub bounce_address: Mailbox,
    pub subject: String,
    pub charset: String,
    pub content_type: String,
    pub body: MessageBody,
    pub attachments: Vec<Attachment>,
    /// Custom headers in insertion order.
    pub headers: Vec<(String, String)>,
}

impl MailMessage {
    pub fn is_multipart(&self) -> bool {
        !self.body.is_simple()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All envelope recipients: to, cc and bcc.
    pub fn recipients(&self) -> impl Iterator<Item = &Mailbox> {
        self.to.iter().chain(&self.cc).chain(&self.bcc)
    }
}

/// A finished message ready for the transport, and the form kept in the spool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub message_id: String,
    pub envelope_from: String,
    pub recipients: Vec<String>,
    pub subject: String,
    #[serde(with = "raw_base64")]
    pub raw: Vec<u8>,
}

impl OutgoingMessage {
    pub fn raw_str(&self) -> String {
        String::from_utf8_lossy(&self.raw).into_owned()
    }
}

mod raw_base64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(raw: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(raw))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_parses_case_insensitively() {
        assert_eq!("INLINE".parse::<Disposition>().unwrap(), Disposition::Inline);
        assert_eq!(" attachment ".parse::<Disposition>().unwrap(), Disposition::Attachment);
        assert!("sideways".parse::<Disposition>().is_err());
    }

    #[test]
    fn attachment_name_prefers_override() {
        let mut attachment = Attachment {
            path: PathBuf::from("/tmp/upload-1234.bin"),
            file_name: None,
            disposition: Disposition::default(),
            description: None,
            content_id: None,
            content_type: "application/octet-stream".into(),
            remove_after_send: false,
        };
        assert_eq!(attachment.file_name(), "upload-1234.bin");

        attachment.file_name = Some("report.pdf".into());
        assert_eq!(attachment.file_name(), "report.pdf");
    }

    #[test]
    fn outgoing_message_survives_json() {
        let message = OutgoingMessage {
            message_id: "<1@example.com>".into(),
            envelope_from: "a@example.com".into(),
            recipients: vec!["b@example.com".into()],
            subject: "Hi".into(),
            raw: b"Subject: Hi\r\n\r\nbinary \x00\xff".to_vec(),
        };
        let json = serde_json::to_string(&message).unwrap();
        let back: OutgoingMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, message);
    }
}
