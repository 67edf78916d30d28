//! Address list parsing and IDNA normalisation.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MailError;

/// Which IDNA processing applies to domain parts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdnaVariant {
    /// UTS #46 non-strict processing (the default).
    #[default]
    Lenient,
    /// Strict STD3 processing, selected by any explicit `idna_version`.
    Strict,
}

impl IdnaVariant {
    pub fn from_version(version: Option<u16>) -> Self {
        match version {
            Some(_) => IdnaVariant::Strict,
            None => IdnaVariant::Lenient,
        }
    }
}

/// Convert a host name to its ASCII form.
pub fn host_to_ascii(host: &str, variant: IdnaVariant) -> Result<String, MailError> {
    idna_domain(host, variant)
        .map_err(|e| MailError::configuration(format!("invalid host name '{host}': {e}")))
}

/// A mailbox: optional display name plus an ASCII `local@domain` address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mailbox {
    pub name: Option<String>,
    pub address: String,
}

impl Mailbox {
    /// Parse `local@domain` or `Name <local@domain>`, converting the domain to
    /// ASCII. `field` names the attribute for error messages.
    pub fn parse(input: &str, field: &str, variant: IdnaVariant) -> Result<Self, MailError> {
        let input = input.trim();
        let (name, addr) = match (input.rfind('<'), input.ends_with('>')) {
            (Some(start), true) => {
                let name = input[..start].trim().trim_matches('"').trim();
                let name = (!name.is_empty()).then(|| name.to_string());
                (name, &input[start + 1..input.len() - 1])
            }
            _ => (None, input),
        };

        let addr = addr.trim();
        let (local, domain) = addr
            .rsplit_once('@')
            .ok_or_else(|| MailError::composition(format!("invalid {field} address '{input}'")))?;
        let domain = idna_domain(domain, variant)
            .map_err(|e| MailError::composition(format!("invalid {field} address '{input}': {e}")))?;
        let address = format!("{local}@{domain}");

        lettre::Address::from_str(&address)
            .map_err(|e| MailError::composition(format!("invalid {field} address '{input}': {e}")))?;

        Ok(Self { name, address })
    }

    /// The lettre mailbox; the display name is encoded when the header is
    /// written.
    pub fn to_lettre(&self) -> Result<lettre::message::Mailbox, MailError> {
        let address = lettre::Address::from_str(&self.address)
            .map_err(|e| MailError::composition(format!("invalid address '{}': {e}", self.address)))?;
        Ok(lettre::message::Mailbox::new(self.name.clone(), address))
    }
}

fn idna_domain(domain: &str, variant: IdnaVariant) -> Result<String, String> {
    let converted = match variant {
        IdnaVariant::Lenient => idna::domain_to_ascii(domain),
        IdnaVariant::Strict => idna::domain_to_ascii_strict(domain),
    };
    converted.map_err(|e| e.to_string())
}

/// Parse a comma separated address list. Blank entries are skipped.
pub fn parse_list(list: &str, field: &str, variant: IdnaVariant) -> Result<Vec<Mailbox>, MailError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Mailbox::parse(s, field, variant))
        .collect()
}
