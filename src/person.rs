//! Provenance agents.
//!
//! A `Person` records who created a dataset or file. Instances are built from
//! git authorship, free-text `"Name <email>"` strings, or structured parts,
//! and are immutable afterwards except for identifier repair on records that
//! were serialized without one.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A person appearing as creator of a dataset or dataset file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<String>,
    /// Derived identifier: `mailto:<email>` when an email is known, else a
    /// normalized name token.
    #[serde(default)]
    pub id: String,
    /// Display label, defaults to the name.
    #[serde(default)]
    pub label: String,
}

impl Person {
    /// Create a person from explicit parts.
    pub fn new(
        name: impl Into<String>,
        email: Option<String>,
        affiliation: Option<String>,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::Parameter("Name cannot be empty.".into()));
        }

        if let Some(email) = &email {
            if !is_valid_email(email) {
                return Err(Error::Parameter(format!("Email address is invalid: {email}")));
            }
        }

        let mut person = Self {
            name,
            email,
            affiliation,
            id: String::new(),
            label: String::new(),
        };
        person.ensure_derived();
        Ok(person)
    }

    /// Create a person from a git signature.
    pub fn from_signature(signature: &git2::Signature<'_>) -> Result<Self> {
        let name = signature.name().unwrap_or_default().to_string();
        let email = signature.email().map(str::to_string).filter(|e| !e.is_empty());
        Self::new(name, email, None)
    }

    /// Create a person from the repository's configured git identity.
    pub fn from_repository(repo: &git2::Repository) -> Result<Self> {
        let config = repo.config()?.snapshot()?;
        let name = config.get_string("user.name").map_err(|_| {
            Error::Parameter(
                "The user name and email are not configured. \
                 Use \"git config\" to configure them."
                    .into(),
            )
        })?;
        let email = config.get_string("user.email").ok().filter(|e| !e.is_empty());
        Self::new(name, email, None)
    }

    /// Create a person from a `"Name <email>"` string.
    ///
    /// The email part is optional: `"Jane Doe"` is accepted as a name-only
    /// creator.
    pub fn from_string(input: &str) -> Result<Self> {
        let input = input.trim();

        if let Some(open) = input.find('<') {
            let name = input[..open].trim();
            let rest = &input[open + 1..];
            let close = rest.find('>').ok_or_else(|| {
                Error::Parameter(format!(
                    "Invalid creator '{input}': a valid format is \"Name <email>\""
                ))
            })?;
            let email = rest[..close].trim();

            if name.is_empty() {
                return Err(Error::Parameter(format!(
                    "Invalid creator '{input}': a valid format is \"Name <email>\""
                )));
            }
            if email.is_empty() {
                return Err(Error::Parameter(format!(
                    "Invalid creator '{input}': a valid format is \"Name <email>\""
                )));
            }

            return Self::new(name, Some(email.to_string()), None);
        }

        Self::new(input, None, None)
    }

    /// The full name in short form: initials plus last name.
    pub fn short_name(&self) -> String {
        let names: Vec<&str> = self.name.split_whitespace().collect();
        if names.len() <= 1 {
            return self.name.clone();
        }

        let last_name = names[names.len() - 1];
        let initials: Vec<String> = names[..names.len() - 1]
            .iter()
            .filter_map(|n| n.chars().next())
            .map(|c| c.to_string())
            .collect();

        format!("{}.{}", initials.join("."), last_name)
    }

    /// Recompute the derived identifier and label when missing or stale.
    ///
    /// Older metadata may carry an empty or placeholder identifier; loading
    /// a record runs this repair before the record is used.
    pub fn ensure_derived(&mut self) {
        if self.id.is_empty() || self.id == "mailto:" || self.id == "mailto:None" {
            self.id = self.derive_id();
        }
        if self.label.is_empty() {
            self.label = self.name.clone();
        }
    }

    fn derive_id(&self) -> String {
        if let Some(email) = &self.email {
            return format!("mailto:{email}");
        }

        let token: String = self
            .name
            .chars()
            .filter(|c| c.is_alphanumeric() || c.is_whitespace())
            .collect::<String>()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("");
        format!("_:{token}")
    }
}

/// Validate an email address: `local@domain.tld` with a dot in the domain.
pub fn is_valid_email(email: &str) -> bool {
    let mut parts = email.split('@');
    let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => (local, domain),
        _ => return false,
    };

    if local.is_empty() || domain.is_empty() {
        return false;
    }

    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}
