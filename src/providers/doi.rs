//! DOI resolution.
//!
//! A DOI is not a provider of its own: it resolves to a landing URL at the
//! registrar, and that URL is what the provider registry matches against.

use crate::error::{Error, Result};
use crate::urls::doi_url;

use super::http_client;

/// Resolve a DOI to its landing URL by following registrar redirects.
pub fn resolve(doi: &str) -> Result<String> {
    let client = http_client()?;
    let response = client.get(doi_url(doi)).send()?;

    if !response.status().is_success() {
        return Err(Error::RecordNotFound(format!("URI not found: doi:{doi}")));
    }

    Ok(response.url().to_string())
}
