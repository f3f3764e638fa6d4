//! Zenodo provider.
//!
//! Records come from the public records API; exports go through the deposit
//! API (create deposition, upload files, publish) with bearer-token
//! authentication.

use std::path::Path;

use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use crate::dataset::Dataset;
use crate::error::{Error, Result};

use super::{
    creators_from_json, error_for_status, http_client, normalize_keys, ProviderRecord, RecordFile,
};

/// Zenodo API provider.
#[derive(Debug, Clone)]
pub struct ZenodoProvider {
    base_url: String,
}

impl ZenodoProvider {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Whether the URI points at a Zenodo record.
    pub fn supports(&self, uri: &str) -> bool {
        let Ok(url) = Url::parse(uri) else {
            return false;
        };
        let is_zenodo_host = matches!(
            url.host_str(),
            Some("zenodo.org") | Some("www.zenodo.org") | Some("sandbox.zenodo.org")
        );
        is_zenodo_host && record_id_from_url(&url).is_some()
    }

    /// Retrieve a record from the records API.
    pub fn find_record(&self, uri: &str) -> Result<ProviderRecord> {
        let url = Url::parse(uri)
            .map_err(|_| Error::Parameter(format!("Could not process '{uri}': not a valid URL.")))?;
        let record_id = record_id_from_url(&url).ok_or_else(|| {
            Error::Parameter(format!("Could not process '{uri}': no record id found."))
        })?;

        let api_url = format!("{}/api/records/{record_id}", self.base_url);
        debug!(%api_url, "fetching zenodo record");

        let client = http_client()?;
        let response = client
            .get(&api_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(error_for_status(status, uri, body));
        }

        let document: Value = response.json()?;
        record_from_json(&document, uri, &record_id)
    }

    pub fn exporter(&self, dataset: Dataset, access_token: Option<String>) -> ZenodoExporter {
        ZenodoExporter {
            base_url: self.base_url.clone(),
            dataset,
            access_token,
        }
    }
}

/// Extract the numeric record id from `/record/<id>` or `/records/<id>` URLs.
fn record_id_from_url(url: &Url) -> Option<String> {
    let mut segments = url.path_segments()?;
    loop {
        match segments.next()? {
            "record" | "records" => break,
            _ => continue,
        }
    }
    let id = segments.next()?;
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
        Some(id.to_string())
    } else {
        None
    }
}

/// Convert a records-API document into the generic record shape.
fn record_from_json(document: &Value, uri: &str, record_id: &str) -> Result<ProviderRecord> {
    let metadata = document
        .get("metadata")
        .ok_or_else(|| Error::MalformedRecord("record has no 'metadata' object".into()))?;

    let name = metadata
        .get("title")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::MalformedRecord("record has no 'title' field".into()))?
        .to_string();
    let description = metadata
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let version = metadata
        .get("version")
        .and_then(Value::as_str)
        .map(str::to_string);
    let creators = creators_from_json(metadata.get("creators"));

    let entries = document
        .get("files")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::MalformedRecord("record has no 'files' list".into()))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = normalize_keys(entry);
        let name = entry
            .get("key")
            .or_else(|| entry.get("filename"))
            .and_then(Value::as_str)
            .ok_or_else(|| Error::MalformedRecord("file entry has no name".into()))?
            .to_string();
        let url = entry
            .pointer("/links/self")
            .or_else(|| entry.pointer("/links/download"))
            .and_then(Value::as_str)
            .ok_or_else(|| Error::MalformedRecord(format!("file '{name}' has no download link")))?
            .to_string();

        files.push(RecordFile {
            url,
            id: entry
                .get("checksum")
                .and_then(Value::as_str)
                .map(str::to_string),
            name,
            size: entry
                .get("size")
                .or_else(|| entry.get("filesize"))
                .and_then(Value::as_u64),
            file_type: None,
        });
    }

    let latest_url = document
        .pointer("/links/latest_html")
        .and_then(Value::as_str)
        .map(str::to_string);
    let is_last_version = match document.pointer("/links/latest").and_then(Value::as_str) {
        Some(latest) => latest.trim_end_matches('/').ends_with(record_id),
        None => true,
    };

    Ok(ProviderRecord {
        name,
        description,
        version,
        creators,
        files,
        url: uri.to_string(),
        latest_url,
        is_last_version,
    })
}

/// Zenodo export manager: create deposition, upload files, publish.
#[derive(Debug)]
pub struct ZenodoExporter {
    base_url: String,
    dataset: Dataset,
    access_token: Option<String>,
}

impl ZenodoExporter {
    pub fn access_token_url(&self) -> String {
        format!("{}/account/settings/applications/tokens/new/", self.base_url)
    }

    pub fn set_access_token(&mut self, token: String) {
        self.access_token = Some(token);
    }

    /// Run the deposit sequence and return the deposition's public URL.
    pub fn export(&self, repo_root: &Path, publish: bool) -> Result<String> {
        let token = self
            .access_token
            .as_deref()
            .ok_or(Error::InvalidAccessToken)?;
        let client = http_client()?;
        let authorization = format!("Bearer {token}");

        // Create an empty deposition.
        let depositions_url = format!("{}/api/deposit/depositions", self.base_url);
        let response = client
            .post(&depositions_url)
            .header(reqwest::header::AUTHORIZATION, &authorization)
            .json(&json!({}))
            .send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(error_for_status(status, "cannot create deposition", body));
        }
        let body: Value = response.json()?;
        let deposition_id = body
            .get("id")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::MalformedRecord("deposition response has no id".into()))?;
        debug!(deposition_id, "zenodo deposition created");

        // Attach dataset metadata.
        let metadata = json!({
            "metadata": {
                "title": self.dataset.name,
                "upload_type": "dataset",
                "description": if self.dataset.description.is_empty() {
                    self.dataset.name.clone()
                } else {
                    self.dataset.description.clone()
                },
                "creators": self
                    .dataset
                    .creators
                    .iter()
                    .map(|creator| {
                        json!({
                            "name": creator.name,
                            "affiliation": creator.affiliation.clone().unwrap_or_default(),
                        })
                    })
                    .collect::<Vec<Value>>(),
            }
        });
        let response = client
            .put(format!("{depositions_url}/{deposition_id}"))
            .header(reqwest::header::AUTHORIZATION, &authorization)
            .json(&metadata)
            .send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(error_for_status(status, "cannot set deposition metadata", body));
        }

        // Upload every file.
        for file in &self.dataset.files {
            let name = file
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let form = reqwest::blocking::multipart::Form::new()
                .text("name", name)
                .file("file", repo_root.join(&file.path))?;

            let response = client
                .post(format!("{depositions_url}/{deposition_id}/files"))
                .header(reqwest::header::AUTHORIZATION, &authorization)
                .multipart(form)
                .send()?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().unwrap_or_default();
                return Err(error_for_status(status, "cannot upload file", body));
            }
        }

        if publish {
            let response = client
                .post(format!("{depositions_url}/{deposition_id}/actions/publish"))
                .header(reqwest::header::AUTHORIZATION, &authorization)
                .send()?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().unwrap_or_default();
                return Err(error_for_status(status, "cannot publish deposition", body));
            }
        }

        Ok(format!("{}/deposit/{deposition_id}", self.base_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_record_ids() {
        for uri in [
            "https://zenodo.org/record/123456",
            "https://zenodo.org/records/123456",
            "https://zenodo.org/record/123456#.X",
        ] {
            let url = Url::parse(uri).unwrap();
            assert_eq!(record_id_from_url(&url).as_deref(), Some("123456"), "{uri}");
        }

        let url = Url::parse("https://zenodo.org/communities/foo").unwrap();
        assert!(record_id_from_url(&url).is_none());
    }

    #[test]
    fn supports_only_zenodo_record_urls() {
        let provider = ZenodoProvider::new("https://zenodo.org");
        assert!(provider.supports("https://zenodo.org/record/123456"));
        assert!(provider.supports("https://sandbox.zenodo.org/records/42"));
        assert!(!provider.supports("https://example.com/record/123456"));
        assert!(!provider.supports("not a url"));
    }

    #[test]
    fn record_conversion_maps_files_and_versions() {
        let document = json!({
            "id": 123456,
            "links": {
                "latest": "https://zenodo.org/api/records/123457",
                "latest_html": "https://zenodo.org/record/123457"
            },
            "metadata": {
                "title": "Sample Data",
                "description": "desc",
                "version": "1.1",
                "creators": [{"name": "Jane Doe", "affiliation": "EPFL"}]
            },
            "files": [
                {
                    "key": "a.csv",
                    "checksum": "md5:abcd",
                    "size": 10,
                    "links": {"self": "https://zenodo.org/api/files/bucket/a.csv"}
                }
            ]
        });

        let record =
            record_from_json(&document, "https://zenodo.org/record/123456", "123456").unwrap();
        assert_eq!(record.name, "Sample Data");
        assert_eq!(record.version.as_deref(), Some("1.1"));
        assert_eq!(record.files.len(), 1);
        assert_eq!(record.files[0].id.as_deref(), Some("md5:abcd"));
        assert!(!record.is_last_version);
        assert_eq!(
            record.latest_url.as_deref(),
            Some("https://zenodo.org/record/123457")
        );
    }

    #[test]
    fn latest_version_when_links_point_back() {
        let document = json!({
            "links": {"latest": "https://zenodo.org/api/records/123456"},
            "metadata": {"title": "Sample"},
            "files": []
        });
        let record =
            record_from_json(&document, "https://zenodo.org/record/123456", "123456").unwrap();
        assert!(record.is_last_version);
    }

    #[test]
    fn missing_metadata_is_malformed() {
        let document = json!({"files": []});
        assert!(matches!(
            record_from_json(&document, "https://zenodo.org/record/1", "1"),
            Err(Error::MalformedRecord(_))
        ));
    }
}
