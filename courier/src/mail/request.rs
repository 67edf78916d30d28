//! Per-call attributes and the builder that collects nested parts and params.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::MailError;

/// Attributes of a single mail call.
///
/// Every field is optional at this level; [`MailRequest::validate`] enforces
/// the required ones. Unset fields fall back to [`MailSettings`](crate::MailSettings).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MailRequest {
    pub from: Option<String>,
    pub to: Option<String>,
    pub subject: Option<String>,
    pub cc: Option<String>,
    pub bcc: Option<String>,
    pub reply_to: Option<String>,
    #[serde(alias = "bounceAddress")]
    pub fail_to: Option<String>,
    pub charset: Option<String>,
    #[serde(rename = "type", alias = "contentType")]
    pub content_type: Option<String>,

    pub server: Option<String>,
    /// Legacy spelling of `server`; wins when both are given.
    pub smtp: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(rename = "useSSL")]
    pub use_ssl: Option<bool>,
    #[serde(rename = "useTLS")]
    pub use_tls: Option<bool>,
    /// Connection timeout in seconds.
    pub timeout: Option<u64>,
    pub idna_version: Option<u16>,

    pub mailer_id: Option<String>,
    pub spool_enable: Option<bool>,
    pub priority: Option<String>,
    pub wrap_text: Option<usize>,
    pub remove: bool,
    pub mime_attach: Option<PathBuf>,

    pub sign: Option<bool>,
    pub encrypt: bool,
    pub keystore: Option<PathBuf>,
    pub keystore_password: Option<String>,
    pub key_alias: Option<String>,
    pub key_password: Option<String>,
    pub recipient_cert: Option<PathBuf>,
    pub encryption_algorithm: Option<String>,

    /// The call's own body content.
    pub body: String,
}

impl MailRequest {
    /// Check that `from`, `to` and `subject` are present and not blank.
    pub fn validate(&self) -> Result<(), MailError> {
        for (name, value) in [
            ("from", &self.from),
            ("to", &self.to),
            ("subject", &self.subject),
        ] {
            if value.as_deref().map_or(true, |v| v.trim().is_empty()) {
                return Err(MailError::Validation(name.to_string()));
            }
        }
        Ok(())
    }

    /// `smtp` if given, otherwise `server`.
    pub fn explicit_server(&self) -> Option<&str> {
        self.smtp
            .as_deref()
            .or(self.server.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// A nested content-part declaration. Contributes one section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PartSpec {
    #[serde(rename = "type")]
    pub content_type: Option<String>,
    pub charset: Option<String>,
    pub wrap_text: Option<usize>,
    pub body: String,
}

impl PartSpec {
    pub fn new(content_type: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            content_type: Some(content_type.into()),
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    pub fn wrap_text(mut self, width: usize) -> Self {
        self.wrap_text = Some(width);
        self
    }
}

/// A nested parameter declaration: either a custom header (`name` + `value`)
/// or an attachment descriptor (`file` and friends).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ParamSpec {
    pub name: Option<String>,
    pub value: Option<String>,
    pub file: Option<PathBuf>,
    pub file_name: Option<String>,
    pub disposition: Option<String>,
    #[serde(rename = "contentID", alias = "contentId")]
    pub content_id: Option<String>,
    #[serde(rename = "type")]
    pub content_type: Option<String>,
    pub description: Option<String>,
    pub remove: bool,
}

impl ParamSpec {
    pub fn header(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            value: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            file: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn disposition(mut self, disposition: impl Into<String>) -> Self {
        self.disposition = Some(disposition.into());
        self
    }

    pub fn content_id(mut self, id: impl Into<String>) -> Self {
        self.content_id = Some(id.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Collects the call attributes plus the parts and params declared inside it.
///
/// Nested declarations receive `&mut MailBuilder` and push into it; nothing is
/// looked up by name.
///
/// ```ignore
/// let mut mail = MailBuilder::new()
///     .from("sender@example.com")
///     .to("user@example.com")
///     .subject("Report");
/// mail.add_part(PartSpec::new("text", "See attached."));
/// mail.add_param(ParamSpec::file("report.pdf").disposition("inline"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailBuilder {
    #[serde(flatten)]
    pub request: MailRequest,
    pub parts: Vec<PartSpec>,
    pub params: Vec<ParamSpec>,
}

impl MailBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request(request: MailRequest) -> Self {
        Self {
            request,
            ..Default::default()
        }
    }

    pub fn from(mut self, address: impl Into<String>) -> Self {
        self.request.from = Some(address.into());
        self
    }

    pub fn to(mut self, addresses: impl Into<String>) -> Self {
        self.request.to = Some(addresses.into());
        self
    }

    pub fn cc(mut self, addresses: impl Into<String>) -> Self {
        self.request.cc = Some(addresses.into());
        self
    }

    pub fn bcc(mut self, addresses: impl Into<String>) -> Self {
        self.request.bcc = Some(addresses.into());
        self
    }

    pub fn reply_to(mut self, addresses: impl Into<String>) -> Self {
        self.request.reply_to = Some(addresses.into());
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.request.subject = Some(subject.into());
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.request.body = body.into();
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.request.content_type = Some(content_type.into());
        self
    }

    pub fn server(mut self, host: impl Into<String>) -> Self {
        self.request.server = Some(host.into());
        self
    }

    pub fn spool(mut self, enable: bool) -> Self {
        self.request.spool_enable = Some(enable);
        self
    }

    pub fn part(mut self, part: PartSpec) -> Self {
        self.parts.push(part);
        self
    }

    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    /// Record a nested content part.
    pub fn add_part(&mut self, part: PartSpec) -> &mut Self {
        self.parts.push(part);
        self
    }

    /// Record a nested parameter.
    pub fn add_param(&mut self, param: ParamSpec) -> &mut Self {
        self.params.push(param);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn complete() -> MailBuilder {
        MailBuilder::new()
            .from("sender@example.com")
            .to("user@example.com")
            .subject("Hello")
    }

    #[test]
    fn complete_request_validates() {
        assert!(complete().request.validate().is_ok());
    }

    #[rstest]
    #[case("from")]
    #[case("to")]
    #[case("subject")]
    fn missing_required_attribute_is_rejected(#[case] field: &str) {
        let mut mail = complete();
        match field {
            "from" => mail.request.from = None,
            "to" => mail.request.to = Some("   ".into()),
            _ => mail.request.subject = None,
        }
        match mail.request.validate() {
            Err(MailError::Validation(name)) => assert_eq!(name, field),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn smtp_attribute_wins_over_server() {
        let request = MailRequest {
            server: Some("server.example.com".into()),
            smtp: Some("smtp.example.com".into()),
            ..Default::default()
        };
        assert_eq!(request.explicit_server(), Some("smtp.example.com"));
    }

    #[test]
    fn nested_declarations_push_in_order() {
        let mut mail = complete();
        mail.add_part(PartSpec::new("text", "plain"))
            .add_part(PartSpec::new("html", "<p>rich</p>"));
        mail.add_param(ParamSpec::header("X-Campaign", "spring"));
        assert_eq!(mail.parts.len(), 2);
        assert_eq!(mail.parts[0].content_type.as_deref(), Some("text"));
        assert_eq!(mail.params[0].name.as_deref(), Some("X-Campaign"));
    }

    #[test]
    fn description_deserializes_from_json() {
        let json = r#"{
            "from": "a@example.com",
            "to": "b@example.com",
            "subject": "Hi",
            "failTo": "bounces@example.com",
            "useTLS": true,
            "parts": [{ "type": "text", "body": "hello" }],
            "params": [{ "file": "notes.txt", "disposition": "inline" }]
        }"#;
        let mail: MailBuilder = serde_json::from_str(json).unwrap();
        assert_eq!(mail.request.fail_to.as_deref(), Some("bounces@example.com"));
        assert_eq!(mail.request.use_tls, Some(true));
        assert_eq!(mail.parts.len(), 1);
        assert_eq!(mail.params[0].disposition.as_deref(), Some("inline"));
    }
}
