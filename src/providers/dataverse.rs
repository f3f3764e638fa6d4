//! Dataverse provider.
//!
//! Import matches any Dataverse installation by probing its version endpoint;
//! records come through the schema.org exporter. Export deposits into the
//! instance configured in `.datum.toml`.

use std::path::Path;

use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::urls::extract_doi;

use super::{
    creators_from_json, error_for_status, http_client, normalize_keys, ProviderRecord, RecordFile,
};

const API_PATH: &str = "api/v1";
const VERSION_API: &str = "info/version";
const METADATA_API: &str = "datasets/export";
const FILE_API: &str = "access/datafile/:persistentId/";
const EXPORTER: &str = "schema.org";

/// Dataverse API provider.
#[derive(Debug, Clone)]
pub struct DataverseProvider {
    base_url: String,
}

impl DataverseProvider {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Whether the URI points into a Dataverse installation.
    ///
    /// Probes `<host>/api/v1/info/version` and validates the response shape.
    pub fn supports(&self, uri: &str) -> bool {
        let Some(probe) = version_probe_url(uri) else {
            return false;
        };

        let Ok(client) = http_client() else {
            return false;
        };
        let Ok(response) = client.get(probe).send() else {
            return false;
        };
        if !response.status().is_success() {
            return false;
        }
        let Ok(body) = response.json::<Value>() else {
            return false;
        };

        body.get("status").is_some()
            && body
                .get("data")
                .map(|data| data.get("version").is_some() && data.get("build").is_some())
                .unwrap_or(false)
    }

    /// Retrieve a record through the schema.org metadata exporter.
    pub fn find_record(&self, uri: &str) -> Result<ProviderRecord> {
        let record_id = record_id(uri)?;
        let export_url = make_records_url(uri, &record_id)?;
        debug!(%export_url, "fetching dataverse record");

        let client = http_client()?;
        let response = client
            .get(export_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(error_for_status(status, uri, body));
        }

        let document: Value = response.json()?;
        record_from_schema_org(&document, uri)
    }

    pub fn exporter(&self, dataset: Dataset, access_token: Option<String>) -> DataverseExporter {
        DataverseExporter {
            base_url: self.base_url.clone(),
            collection: "root".to_string(),
            dataset,
            access_token,
        }
    }
}

/// Extract the `persistentId` query parameter from a record URL.
fn record_id(uri: &str) -> Result<String> {
    let url = Url::parse(uri)
        .map_err(|_| Error::Parameter(format!("Could not process '{uri}': not a valid URL.")))?;
    url.query_pairs()
        .find(|(key, _)| key == "persistentId")
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| {
            Error::MalformedRecord(format!("'{uri}' carries no persistentId parameter"))
        })
}

/// Rewrite a record URL into its version-probe URL.
fn version_probe_url(uri: &str) -> Option<String> {
    let mut url = Url::parse(uri).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_path(&format!("{API_PATH}/{VERSION_API}"));
    url.set_query(None);
    url.set_fragment(None);
    Some(url.to_string())
}

/// URL of the schema.org metadata export for a record.
fn make_records_url(uri: &str, record_id: &str) -> Result<String> {
    let mut url = Url::parse(uri)
        .map_err(|_| Error::Parameter(format!("Could not process '{uri}': not a valid URL.")))?;
    url.set_path(&format!("{API_PATH}/{METADATA_API}"));
    url.query_pairs_mut()
        .clear()
        .append_pair("exporter", EXPORTER)
        .append_pair("persistentId", record_id);
    Ok(url.to_string())
}

/// URL for downloading a file by its persistent identifier.
fn make_file_url(base: &str, file_id: &str) -> Result<String> {
    let mut url = Url::parse(base)
        .map_err(|_| Error::Parameter(format!("Could not process '{base}': not a valid URL.")))?;
    url.set_path(&format!("{API_PATH}/{FILE_API}"));
    url.query_pairs_mut()
        .clear()
        .append_pair("persistentId", file_id);
    Ok(url.to_string())
}

/// Convert a schema.org export into the generic record shape.
fn record_from_schema_org(document: &Value, uri: &str) -> Result<ProviderRecord> {
    let name = document
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::MalformedRecord("record has no 'name' field".into()))?
        .to_string();

    let description = document
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let version = document
        .get("version")
        .and_then(Value::as_str)
        .map(str::to_string);
    let creators = creators_from_json(
        document
            .get("creator")
            .or_else(|| document.get("author")),
    );

    let mut files = Vec::new();
    let distribution = document
        .get("distribution")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::MalformedRecord("record has no 'distribution' list".into()))?;
    for entry in distribution {
        let entry = normalize_keys(entry);
        let name = entry
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::MalformedRecord("distribution entry has no name".into()))?
            .to_string();

        let id = entry
            .get("identifier")
            .or_else(|| entry.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let url = match entry.get("content_url").and_then(Value::as_str) {
            Some(content_url) => content_url.to_string(),
            None => {
                // Without a direct link the file is addressed by its DOI.
                let doi = id
                    .as_deref()
                    .and_then(extract_doi)
                    .ok_or_else(|| {
                        Error::MalformedRecord(format!("file '{name}' has no usable URL"))
                    })?;
                make_file_url(uri, &format!("doi:{doi}"))?
            }
        };

        files.push(RecordFile {
            url,
            id,
            name,
            size: entry.get("content_size").and_then(Value::as_u64),
            file_type: entry
                .get("file_format")
                .and_then(Value::as_str)
                .map(str::to_string),
        });
    }

    Ok(ProviderRecord {
        name,
        description,
        version,
        creators,
        files,
        url: uri.to_string(),
        latest_url: None,
        // The schema.org export always reflects the latest published version.
        is_last_version: true,
    })
}

/// Dataverse export manager: deposit-create, file-upload, publish.
#[derive(Debug)]
pub struct DataverseExporter {
    base_url: String,
    collection: String,
    dataset: Dataset,
    access_token: Option<String>,
}

impl DataverseExporter {
    pub fn access_token_url(&self) -> String {
        format!("{}/dataverseuser.xhtml?selectTab=apiTokenTab", self.base_url)
    }

    pub fn set_access_token(&mut self, token: String) {
        self.access_token = Some(token);
    }

    /// Run the deposit sequence and return the new persistent id.
    pub fn export(&self, repo_root: &Path, publish: bool) -> Result<String> {
        let token = self
            .access_token
            .as_deref()
            .ok_or(Error::InvalidAccessToken)?;
        let client = http_client()?;

        // Create the deposit.
        let create_url = format!(
            "{}/{}/dataverses/{}/datasets",
            self.base_url, API_PATH, self.collection
        );
        let response = client
            .post(&create_url)
            .header("X-Dataverse-key", token)
            .json(&self.deposit_metadata())
            .send()?;
        let status = response.status();
        if status.as_u16() != 201 {
            let body = response.text().unwrap_or_default();
            return Err(error_for_status(status, "cannot create dataset deposit", body));
        }
        let body: Value = response.json()?;
        let persistent_id = body
            .pointer("/data/persistentId")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::MalformedRecord("deposit response has no persistentId".into()))?
            .to_string();
        debug!(%persistent_id, "dataverse deposit created");

        // Upload every file.
        for file in &self.dataset.files {
            let upload_url = format!(
                "{}/{}/datasets/:persistentId/add?persistentId={}",
                self.base_url, API_PATH, persistent_id
            );
            let directory = file
                .path
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();
            let form = reqwest::blocking::multipart::Form::new()
                .text(
                    "jsonData",
                    json!({ "directoryLabel": directory }).to_string(),
                )
                .file("file", repo_root.join(&file.path))?;

            let response = client
                .post(&upload_url)
                .header("X-Dataverse-key", token)
                .multipart(form)
                .send()?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().unwrap_or_default();
                return Err(error_for_status(status, "cannot upload file", body));
            }
        }

        if publish {
            let publish_url = format!(
                "{}/{}/datasets/:persistentId/actions/:publish?persistentId={}&type=major",
                self.base_url, API_PATH, persistent_id
            );
            let response = client
                .post(&publish_url)
                .header("X-Dataverse-key", token)
                .send()?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().unwrap_or_default();
                return Err(error_for_status(status, "cannot publish dataset", body));
            }
        }

        Ok(persistent_id)
    }

    /// The templated citation metadata payload for deposit creation.
    fn deposit_metadata(&self) -> Value {
        let authors: Vec<Value> = self
            .dataset
            .creators
            .iter()
            .map(|creator| {
                json!({
                    "authorName": {
                        "value": creator.name,
                        "typeClass": "primitive",
                        "multiple": false,
                        "typeName": "authorName"
                    },
                    "authorAffiliation": {
                        "value": creator.affiliation.clone().unwrap_or_default(),
                        "typeClass": "primitive",
                        "multiple": false,
                        "typeName": "authorAffiliation"
                    }
                })
            })
            .collect();

        let contacts: Vec<Value> = self
            .dataset
            .creators
            .iter()
            .filter_map(|creator| {
                let email = creator.email.clone()?;
                Some(json!({
                    "datasetContactEmail": {
                        "value": email,
                        "typeClass": "primitive",
                        "multiple": false,
                        "typeName": "datasetContactEmail"
                    },
                    "datasetContactName": {
                        "value": creator.name,
                        "typeClass": "primitive",
                        "multiple": false,
                        "typeName": "datasetContactName"
                    }
                }))
            })
            .collect();

        json!({
            "datasetVersion": {
                "metadataBlocks": {
                    "citation": {
                        "displayName": "Citation Metadata",
                        "fields": [
                            {
                                "value": self.dataset.name,
                                "typeClass": "primitive",
                                "multiple": false,
                                "typeName": "title"
                            },
                            {
                                "value": authors,
                                "typeClass": "compound",
                                "multiple": true,
                                "typeName": "author"
                            },
                            {
                                "value": contacts,
                                "typeClass": "compound",
                                "multiple": true,
                                "typeName": "datasetContact"
                            },
                            {
                                "value": [
                                    {
                                        "dsDescriptionValue": {
                                            "value": self.dataset.description,
                                            "multiple": false,
                                            "typeClass": "primitive",
                                            "typeName": "dsDescriptionValue"
                                        }
                                    }
                                ],
                                "typeClass": "compound",
                                "multiple": true,
                                "typeName": "dsDescription"
                            },
                            {
                                "value": [],
                                "typeClass": "controlledVocabulary",
                                "multiple": true,
                                "typeName": "subject"
                            }
                        ]
                    }
                }
            }
        })
    }
}
