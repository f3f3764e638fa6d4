//! Provider resolution layer.
//!
//! Maps identifiers (DOIs, URLs) onto external dataset providers and
//! normalizes their heterogeneous records into one generic shape. The set of
//! providers is closed: a fixed-priority list of variants behind one
//! capability surface (`supports` / `find_record` / `exporter`). DOIs are
//! resolved to their registrar landing URL first, then matched like any other
//! URL.

pub mod dataverse;
pub mod doi;
pub mod zenodo;

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::person::Person;
use crate::urls::extract_doi;

use dataverse::{DataverseExporter, DataverseProvider};
use zenodo::{ZenodoExporter, ZenodoProvider};

/// A provider-agnostic dataset record.
#[derive(Debug, Clone)]
pub struct ProviderRecord {
    pub name: String,
    pub description: String,
    pub version: Option<String>,
    pub creators: Vec<Person>,
    pub files: Vec<RecordFile>,
    /// URL the record was resolved from.
    pub url: String,
    /// Link to the latest version, when the provider reports one.
    pub latest_url: Option<String>,
    pub is_last_version: bool,
}

/// One file listed by a provider record.
#[derive(Debug, Clone)]
pub struct RecordFile {
    pub url: String,
    pub id: Option<String>,
    pub name: String,
    pub size: Option<u64>,
    pub file_type: Option<String>,
}

/// The closed set of providers, in registry priority order.
#[derive(Debug, Clone)]
pub enum Provider {
    Dataverse(DataverseProvider),
    Zenodo(ZenodoProvider),
}

/// Export managers, one per export-capable provider.
#[derive(Debug)]
pub enum Exporter {
    Dataverse(DataverseExporter),
    Zenodo(ZenodoExporter),
}

impl Provider {
    /// All providers in fixed priority order.
    ///
    /// Zenodo first: its predicate is a pure URL check, while Dataverse has
    /// to probe the host over the network.
    pub fn registry(config: &ProviderConfig) -> Vec<Provider> {
        vec![
            Provider::Zenodo(ZenodoProvider::new(&config.zenodo_url)),
            Provider::Dataverse(DataverseProvider::new(&config.dataverse_url)),
        ]
    }

    /// Look a provider up by its id (for exports).
    pub fn from_id(id: &str, config: &ProviderConfig) -> Result<Provider> {
        Self::registry(config)
            .into_iter()
            .find(|provider| provider.id() == id)
            .ok_or_else(|| Error::Usage(format!("Unknown provider '{id}'.")))
    }

    pub fn id(&self) -> &'static str {
        match self {
            Provider::Dataverse(_) => "dataverse",
            Provider::Zenodo(_) => "zenodo",
        }
    }

    /// Whether this provider claims the given URI.
    pub fn supports(&self, uri: &str) -> bool {
        match self {
            Provider::Dataverse(p) => p.supports(uri),
            Provider::Zenodo(p) => p.supports(uri),
        }
    }

    /// Retrieve and normalize the record behind a URI.
    pub fn find_record(&self, uri: &str) -> Result<ProviderRecord> {
        match self {
            Provider::Dataverse(p) => p.find_record(uri),
            Provider::Zenodo(p) => p.find_record(uri),
        }
    }

    /// Create the export manager for a dataset.
    pub fn exporter(&self, dataset: Dataset, access_token: Option<String>) -> Exporter {
        match self {
            Provider::Dataverse(p) => Exporter::Dataverse(p.exporter(dataset, access_token)),
            Provider::Zenodo(p) => Exporter::Zenodo(p.exporter(dataset, access_token)),
        }
    }
}

impl Exporter {
    /// Where the user can create an access token for this provider.
    pub fn access_token_url(&self) -> String {
        match self {
            Exporter::Dataverse(e) => e.access_token_url(),
            Exporter::Zenodo(e) => e.access_token_url(),
        }
    }

    pub fn set_access_token(&mut self, token: String) {
        match self {
            Exporter::Dataverse(e) => e.set_access_token(token),
            Exporter::Zenodo(e) => e.set_access_token(token),
        }
    }

    /// Run the deposit-create / upload / publish sequence.
    ///
    /// Returns the destination identifier reported by the provider.
    pub fn export(&self, repo_root: &std::path::Path, publish: bool) -> Result<String> {
        match self {
            Exporter::Dataverse(e) => e.export(repo_root, publish),
            Exporter::Zenodo(e) => e.export(repo_root, publish),
        }
    }
}

/// Resolve a URI to the provider that claims it.
///
/// DOIs are first resolved to their landing URL; failure to resolve is a
/// "URI not found" error, distinct from "no provider recognizes this".
pub fn resolve_uri(uri: &str, config: &ProviderConfig) -> Result<(Provider, String)> {
    let resolved = match extract_doi(uri) {
        Some(doi) => doi::resolve(&doi)?,
        None => uri.to_string(),
    };

    for provider in Provider::registry(config) {
        if provider.supports(&resolved) {
            debug!(provider = provider.id(), uri = %resolved, "provider claimed uri");
            return Ok((provider, resolved));
        }
    }

    Err(Error::Parameter(format!(
        "Could not process '{uri}': no provider recognizes this identifier."
    )))
}

// =============================================================================
// Shared HTTP plumbing
// =============================================================================

/// A blocking HTTP client with sane defaults.
pub(crate) fn http_client() -> Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(60))
        .user_agent(concat!("datum/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Map an HTTP status onto the provider error taxonomy.
pub(crate) fn error_for_status(status: StatusCode, context: &str, body: String) -> Error {
    match status {
        StatusCode::NOT_FOUND => Error::RecordNotFound(context.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::InvalidAccessToken,
        _ => Error::Operation {
            status: status.as_u16(),
            message: if body.is_empty() {
                context.to_string()
            } else {
                body
            },
        },
    }
}

// =============================================================================
// Record field normalization
// =============================================================================

/// Normalize a record key: strip the `@` prefix and convert camelCase to
/// snake_case.
pub fn normalize_key(key: &str) -> String {
    let key = key.trim_start_matches('@');
    let chars: Vec<char> = key.chars().collect();

    let mut normalized = String::with_capacity(key.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev = if i > 0 { Some(chars[i - 1]) } else { None };
            let next = chars.get(i + 1);
            let boundary = match prev {
                Some(p) if p.is_ascii_lowercase() || p.is_ascii_digit() => true,
                // An acronym run ends where the next lowercase letter starts.
                Some(p) if p.is_ascii_uppercase() => {
                    next.map(|n| n.is_ascii_lowercase()).unwrap_or(false)
                }
                _ => false,
            };
            if boundary {
                normalized.push('_');
            }
            normalized.push(c.to_ascii_lowercase());
        } else {
            normalized.push(c);
        }
    }
    normalized
}

/// Normalize the top-level keys of a JSON object.
pub fn normalize_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (normalize_key(key), value.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Extract creators from a normalized record: a list of objects with `name`
/// and optional `email`/`affiliation`.
pub(crate) fn creators_from_json(values: Option<&Value>) -> Vec<Person> {
    let Some(Value::Array(entries)) = values else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let entry = normalize_keys(entry);
            let name = entry.get("name").and_then(Value::as_str)?;
            let email = entry
                .get("email")
                .and_then(Value::as_str)
                .map(str::to_string);
            let affiliation = entry
                .get("affiliation")
                .and_then(Value::as_str)
                .map(str::to_string);
            // Providers hand out unvalidated addresses; drop the email rather
            // than rejecting the whole record.
            Person::new(name, email, affiliation.clone())
                .or_else(|_| Person::new(name, None, affiliation))
                .ok()
        })
        .collect()
}
