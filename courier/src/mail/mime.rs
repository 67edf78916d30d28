//! In-memory MIME entity tree rendered through lettre's builder parts.
//!
//! Leaves are [`SinglePart`]s built with typed headers, so header values are
//! folded and RFC 2047 / RFC 2231 encoded by lettre. Multiparts keep their
//! children inspectable and only become a [`MultiPart`] when rendered. The
//! boundary is fixed when a node is created, so a node renders to the same
//! bytes every time; a signed entity relies on that to embed content whose
//! signature was computed earlier.

use std::error::Error as StdError;

use lettre::message::header::{ContentTransferEncoding, ContentType, Header, HeaderName, HeaderValue};
use lettre::message::{Body, MultiPart, MultiPartKind, SinglePart, SinglePartBuilder};
use uuid::Uuid;

use crate::error::{MailError, MailResult};

/// `Content-Description` (RFC 2045 section 8).
#[derive(Debug, Clone, PartialEq)]
pub struct ContentDescription(String);

impl ContentDescription {
    pub fn new(description: impl Into<String>) -> Self {
        Self(description.into())
    }
}

impl Header for ContentDescription {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("Content-Description")
    }

    fn parse(s: &str) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        Ok(Self(s.into()))
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), self.0.clone())
    }
}

/// Parse a `Content-Type` value.
pub fn content_type(value: &str) -> MailResult<ContentType> {
    ContentType::parse(value)
        .map_err(|e| MailError::composition(format!("invalid content type '{value}': {e}")))
}

/// A single (non-multipart) entity. `content` keeps the decoded bytes.
#[derive(Debug, Clone)]
pub struct Leaf {
    part: SinglePart,
    content: Vec<u8>,
}

impl Leaf {
    /// A text entity in `charset`. Line endings become CRLF and the transfer
    /// encoding is the lightest one that keeps the body 7-bit clean.
    pub fn text(mime_type: &str, charset: &str, text: &str) -> MailResult<Self> {
        Self::text_with(SinglePart::builder(), mime_type, charset, text)
    }

    /// Like [`Leaf::text`], on top of a builder that already carries headers.
    pub fn text_with(
        builder: SinglePartBuilder,
        mime_type: &str,
        charset: &str,
        text: &str,
    ) -> MailResult<Self> {
        let content_type = content_type(&format!("{mime_type}; charset={charset}"))?;
        let content = encode_charset(text, charset)?;
        let body = match String::from_utf8(content.clone()) {
            Ok(text) => Body::new(text),
            Err(_) => Body::new(crlf(&content)),
        };
        Ok(Self {
            part: builder.content_type(content_type).body(body),
            content,
        })
    }

    /// A base64 entity holding `data` as is.
    pub fn binary(builder: SinglePartBuilder, content_type: ContentType, data: Vec<u8>) -> Self {
        let body = Body::new_with_encoding(data.clone(), ContentTransferEncoding::Base64)
            .unwrap_or_else(Body::new);
        Self {
            part: builder.content_type(content_type).body(body),
            content: data,
        }
    }

    pub fn part(&self) -> &SinglePart {
        &self.part
    }

    /// Full `Content-Type` value, including parameters.
    pub fn content_type(&self) -> &str {
        self.header("Content-Type").unwrap_or_default()
    }

    /// The `type/subtype` part of the content type, lower-cased.
    pub fn mime_type(&self) -> String {
        essence(self.content_type())
    }

    pub fn charset(&self) -> Option<String> {
        param(self.content_type(), "charset")
    }

    /// Unencoded value of the header `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.part.headers().get_raw(name)
    }

    pub fn encoding(&self) -> Option<ContentTransferEncoding> {
        self.part.headers().get::<ContentTransferEncoding>()
    }

    pub fn body(&self) -> &[u8] {
        &self.content
    }

    /// Body as text with CRLF folded back to LF, if it is valid UTF-8.
    pub fn text_body(&self) -> Option<String> {
        std::str::from_utf8(&self.content)
            .ok()
            .map(|s| s.replace("\r\n", "\n"))
    }
}

/// A `multipart/*` entity.
#[derive(Debug, Clone)]
pub struct Multipart {
    kind: MultiPartKind,
    boundary: String,
    parts: Vec<MimeNode>,
}

impl Multipart {
    pub fn new(kind: MultiPartKind) -> Self {
        Self {
            kind,
            boundary: Uuid::new_v4().simple().to_string(),
            parts: Vec::new(),
        }
    }

    pub fn mixed() -> Self {
        Self::new(MultiPartKind::Mixed)
    }

    pub fn alternative() -> Self {
        Self::new(MultiPartKind::Alternative)
    }

    pub fn signed(protocol: &str, micalg: &str) -> Self {
        Self::new(MultiPartKind::Signed {
            protocol: protocol.to_string(),
            micalg: micalg.to_string(),
        })
    }

    pub fn with_part(mut self, part: impl Into<MimeNode>) -> Self {
        self.parts.push(part.into());
        self
    }

    pub fn push(&mut self, part: impl Into<MimeNode>) {
        self.parts.push(part.into());
    }

    pub fn subtype(&self) -> &str {
        match self.kind {
            MultiPartKind::Mixed => "mixed",
            MultiPartKind::Alternative => "alternative",
            MultiPartKind::Related => "related",
            MultiPartKind::Encrypted { .. } => "encrypted",
            MultiPartKind::Signed { .. } => "signed",
        }
    }

    pub fn mime_type(&self) -> String {
        format!("multipart/{}", self.subtype())
    }

    /// A `Content-Type` parameter other than the boundary.
    pub fn param(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        match (&self.kind, name.as_str()) {
            (MultiPartKind::Signed { protocol, .. }, "protocol")
            | (MultiPartKind::Encrypted { protocol }, "protocol") => Some(protocol.as_str()),
            (MultiPartKind::Signed { micalg, .. }, "micalg") => Some(micalg.as_str()),
            _ => None,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn parts(&self) -> &[MimeNode] {
        &self.parts
    }

    /// The lettre form of this entity and its children.
    pub fn to_part(&self) -> MultiPart {
        let empty = MultiPart::builder()
            .kind(self.kind.clone())
            .boundary(self.boundary.as_str())
            .build();
        self.parts.iter().fold(empty, |multipart, node| match node {
            MimeNode::Leaf(leaf) => multipart.singlepart(leaf.part.clone()),
            MimeNode::Multipart(inner) => multipart.multipart(inner.to_part()),
        })
    }
}

#[derive(Debug, Clone)]
pub enum MimeNode {
    Leaf(Leaf),
    Multipart(Multipart),
}

impl MimeNode {
    /// Render the entity: its own headers, a blank line, then the body.
    pub fn render(&self) -> Vec<u8> {
        match self {
            MimeNode::Leaf(leaf) => leaf.part.formatted(),
            MimeNode::Multipart(multipart) => multipart.to_part().formatted(),
        }
    }

    pub fn mime_type(&self) -> String {
        match self {
            MimeNode::Leaf(leaf) => leaf.mime_type(),
            MimeNode::Multipart(multipart) => multipart.mime_type(),
        }
    }

    pub fn as_leaf(&self) -> Option<&Leaf> {
        match self {
            MimeNode::Leaf(leaf) => Some(leaf),
            _ => None,
        }
    }

    pub fn as_multipart(&self) -> Option<&Multipart> {
        match self {
            MimeNode::Multipart(multipart) => Some(multipart),
            _ => None,
        }
    }
}

impl From<Leaf> for MimeNode {
    fn from(leaf: Leaf) -> Self {
        MimeNode::Leaf(leaf)
    }
}

impl From<Multipart> for MimeNode {
    fn from(multipart: Multipart) -> Self {
        MimeNode::Multipart(multipart)
    }
}

/// Text as bytes in one of the supported charsets.
fn encode_charset(text: &str, charset: &str) -> MailResult<Vec<u8>> {
    match charset {
        "us-ascii" if !text.is_ascii() => Err(MailError::composition(
            "text contains characters outside us-ascii",
        )),
        "iso-8859-1" => text
            .chars()
            .map(|c| u8::try_from(u32::from(c)))
            .collect::<Result<Vec<u8>, _>>()
            .map_err(|_| MailError::composition("text contains characters outside iso-8859-1")),
        _ => Ok(text.as_bytes().to_vec()),
    }
}

// lettre only converts line endings of `String` bodies
fn crlf(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + bytes.len() / 40);
    let mut prev = 0u8;
    for &b in bytes {
        if b == b'\n' && prev != b'\r' {
            out.push(b'\r');
        }
        out.push(b);
        prev = b;
    }
    out
}

fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn param(content_type: &str, name: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|p| {
        let (key, value) = p.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim().trim_matches('"').to_string())
    })
}
