//! Dataset metadata model.
//!
//! Datasets, their files, tags, and upstream lineage are one entity graph,
//! persisted as a single JSON document per dataset. Every mutation loads the
//! full record, edits it in memory, and rewrites it wholesale; there are no
//! partial patches.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::person::Person;

/// Maximum length of a short name derived from a dataset name.
pub const SHORT_NAME_MAX_LEN: usize = 24;

/// A named, versioned collection of files with provenance metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Stable identifier (UUID), independent of the user-facing name.
    pub identifier: String,
    pub name: String,
    pub short_name: String,
    #[serde(default)]
    pub description: String,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub creators: Vec<Person>,
    #[serde(default)]
    pub files: Vec<DatasetFile>,
    #[serde(default)]
    pub tags: Vec<DatasetTag>,
    /// Upstream URL for imported datasets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Upstream version string for imported datasets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Original identifier when the record was migrated away from one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_as: Option<String>,
}

/// A single file tracked by a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetFile {
    /// Path relative to the repository root.
    pub path: PathBuf,
    /// Source URL, credentials stripped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Checksum or provider-assigned identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub added: DateTime<Utc>,
    #[serde(default)]
    pub creators: Vec<Person>,
    /// Lineage pointer when the file came from another git repository.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub based_on: Option<UpstreamReference>,
}

/// Snapshot of an upstream repository file at fetch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamReference {
    /// URL of the upstream repository, credentials stripped.
    pub url: String,
    /// Path of the file inside the upstream repository.
    pub path: PathBuf,
    /// Commit the file was taken from.
    pub reference: String,
    /// Stable identifier of this snapshot.
    pub id: String,
    /// Human-readable label.
    pub label: String,
}

impl UpstreamReference {
    pub fn new(url: impl Into<String>, path: impl Into<PathBuf>, commit: impl Into<String>) -> Self {
        let url = url.into();
        let path = path.into();
        let commit = commit.into();
        let id = format!("{}/blob/{}/{}", url.trim_end_matches('/'), commit, path.display());
        let label = format!("{}@{}", path.display(), commit);
        Self {
            url,
            path,
            reference: commit,
            id,
            label,
        }
    }

    /// Re-point the snapshot at a new upstream commit.
    pub fn update_to(&mut self, commit: &str) {
        *self = UpstreamReference::new(self.url.clone(), self.path.clone(), commit);
    }
}

/// A named snapshot of a dataset bound to a VCS commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetTag {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created: DateTime<Utc>,
    /// Hex OID of the commit the tag refers to.
    pub commit: String,
}

impl Dataset {
    /// Create a new dataset with a fresh identifier.
    pub fn new(
        name: impl Into<String>,
        short_name: Option<String>,
        description: Option<String>,
        creators: Vec<Person>,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::Parameter("Dataset name cannot be empty.".into()));
        }

        let short_name = match short_name {
            Some(short_name) => {
                if !is_short_name_valid(&short_name) {
                    return Err(Error::Parameter(format!(
                        "Invalid short name '{short_name}': only letters, digits, '.', '_' and '-' are allowed."
                    )));
                }
                short_name
            }
            None => {
                let derived = generate_default_short_name(&name, None);
                if derived.is_empty() {
                    return Err(Error::Parameter(format!(
                        "Cannot derive a short name from '{name}'; pass one explicitly."
                    )));
                }
                derived
            }
        };

        Ok(Self {
            identifier: Uuid::new_v4().to_string(),
            name,
            short_name,
            description: description.unwrap_or_default(),
            created: Utc::now(),
            creators,
            files: Vec::new(),
            tags: Vec::new(),
            url: None,
            version: None,
            same_as: None,
        })
    }

    /// Find a tracked file by its repository-relative path.
    pub fn find_file(&self, path: &Path) -> Option<&DatasetFile> {
        self.files.iter().find(|f| f.path == path)
    }

    pub fn find_file_mut(&mut self, path: &Path) -> Option<&mut DatasetFile> {
        self.files.iter_mut().find(|f| f.path == path)
    }

    /// Add or replace a tracked file.
    pub fn track_file(&mut self, file: DatasetFile) {
        match self.files.iter().position(|f| f.path == file.path) {
            Some(index) => self.files[index] = file,
            None => self.files.push(file),
        }
    }

    /// Remove a tracked file, returning its record.
    pub fn unlink_file(&mut self, path: &Path) -> Result<DatasetFile> {
        let index = self
            .files
            .iter()
            .position(|f| f.path == path)
            .ok_or_else(|| {
                Error::Parameter(format!("File not found in dataset: {}", path.display()))
            })?;
        Ok(self.files.remove(index))
    }

    /// Files ordered by the time they were added.
    pub fn files_by_added(&self) -> Vec<&DatasetFile> {
        let mut files: Vec<&DatasetFile> = self.files.iter().collect();
        files.sort_by_key(|f| f.added);
        files
    }

    /// Tags ordered by creation time.
    pub fn tags_by_created(&self) -> Vec<&DatasetTag> {
        let mut tags: Vec<&DatasetTag> = self.tags.iter().collect();
        tags.sort_by_key(|t| t.created);
        tags
    }

    /// Add a tag bound to a commit. Duplicate names require `force`.
    pub fn add_tag(
        &mut self,
        name: &str,
        description: &str,
        commit: &str,
        force: bool,
    ) -> Result<&DatasetTag> {
        if !is_tag_name_valid(name) {
            return Err(Error::Parameter(format!(
                "Invalid tag name '{name}': only letters, digits, '.', '_' and '-' are allowed."
            )));
        }

        if let Some(index) = self.tags.iter().position(|t| t.name == name) {
            if !force {
                return Err(Error::Parameter(format!(
                    "Tag '{name}' already exists; use force to overwrite it."
                )));
            }
            self.tags.remove(index);
        }

        self.tags.push(DatasetTag {
            name: name.to_string(),
            description: description.to_string(),
            created: Utc::now(),
            commit: commit.to_string(),
        });
        Ok(self.tags.last().expect("tag was just pushed"))
    }

    /// Remove a tag by name, returning its record.
    pub fn remove_tag(&mut self, name: &str) -> Result<DatasetTag> {
        let index = self
            .tags
            .iter()
            .position(|t| t.name == name)
            .ok_or_else(|| Error::Parameter(format!("Tag '{name}' not found.")))?;
        Ok(self.tags.remove(index))
    }

    /// Repair derived fields on creators after deserialization.
    pub fn ensure_derived(&mut self) {
        for creator in &mut self.creators {
            creator.ensure_derived();
        }
        for file in &mut self.files {
            for creator in &mut file.creators {
                creator.ensure_derived();
            }
        }
    }
}

/// Check a short name against the allowed character set.
pub fn is_short_name_valid(short_name: &str) -> bool {
    !short_name.is_empty()
        && short_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Check a tag name against the allowed character set.
pub fn is_tag_name_valid(name: &str) -> bool {
    // Tags share the short-name alphabet.
    is_short_name_valid(name)
}

/// Derive a default short name from a dataset name and optional version.
///
/// The name is lowercased, clipped to [`SHORT_NAME_MAX_LEN`] characters, and
/// its words joined with underscores; characters outside the allowed set are
/// dropped. Deriving from an already-derived slug yields the slug itself.
pub fn generate_default_short_name(name: &str, version: Option<&str>) -> String {
    fn normalize(input: &str) -> String {
        input
            .to_lowercase()
            .split_whitespace()
            .map(|word| {
                word.chars()
                    .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
                    .collect::<String>()
            })
            .filter(|word| !word.is_empty())
            .collect::<Vec<_>>()
            .join("_")
    }

    let clipped: String = name.chars().take(SHORT_NAME_MAX_LEN).collect();
    let short_name = normalize(&clipped);

    match version {
        Some(version) if !version.is_empty() => {
            let version = normalize(version);
            format!("{short_name}_{version}")
        }
        _ => short_name,
    }
}

/// Normalize a version string into a valid tag name.
pub fn normalize_tag_name(version: &str) -> String {
    version
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_derivation_is_idempotent() {
        let long_name = "x".repeat(60);
        for name in ["My Dataset", "weather data 2019", "A!B@C#D", long_name.as_str()] {
            let once = generate_default_short_name(name, None);
            let twice = generate_default_short_name(&once, None);
            assert_eq!(once, twice, "derivation not idempotent for {name:?}");
            assert!(is_short_name_valid(&once), "invalid slug for {name:?}");
            assert!(once.len() <= SHORT_NAME_MAX_LEN);
        }
    }

    #[test]
    fn short_name_joins_words_with_underscores() {
        assert_eq!(generate_default_short_name("My Dataset", None), "my_dataset");
        assert_eq!(
            generate_default_short_name("Weather Data", Some("v2.0")),
            "weather_data_v2.0"
        );
    }

    #[test]
    fn short_name_charset() {
        assert!(is_short_name_valid("my-dataset_1.0"));
        assert!(!is_short_name_valid("my dataset"));
        assert!(!is_short_name_valid("data/set"));
        assert!(!is_short_name_valid(""));
    }

    #[test]
    fn tag_name_normalization() {
        assert_eq!(normalize_tag_name("1.0"), "1.0");
        assert_eq!(normalize_tag_name("v1.0 beta"), "v1.0_beta");
        assert_eq!(normalize_tag_name("a/b:c"), "a_b_c");
    }

    #[test]
    fn duplicate_tag_requires_force() {
        let mut dataset = Dataset::new("demo", None, None, Vec::new()).unwrap();
        dataset.add_tag("1.0", "", "aaaa", false).unwrap();

        let err = dataset.add_tag("1.0", "", "bbbb", false).unwrap_err();
        assert!(err.to_string().contains("already exists"));

        dataset.add_tag("1.0", "updated", "bbbb", true).unwrap();
        assert_eq!(dataset.tags.len(), 1);
        assert_eq!(dataset.tags[0].commit, "bbbb");
    }

    #[test]
    fn removing_unknown_tag_fails() {
        let mut dataset = Dataset::new("demo", None, None, Vec::new()).unwrap();
        let err = dataset.remove_tag("1.0").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn rejects_invalid_tag_names() {
        let mut dataset = Dataset::new("demo", None, None, Vec::new()).unwrap();
        assert!(dataset.add_tag("v 1", "", "aaaa", false).is_err());
        assert!(dataset.add_tag("v/1", "", "aaaa", false).is_err());
    }

    #[test]
    fn upstream_reference_tracks_commit() {
        let mut reference =
            UpstreamReference::new("https://example.com/repo", "data/a.csv", "abc123");
        assert_eq!(reference.id, "https://example.com/repo/blob/abc123/data/a.csv");
        assert_eq!(reference.label, "data/a.csv@abc123");

        reference.update_to("def456");
        assert_eq!(reference.reference, "def456");
        assert_eq!(reference.label, "data/a.csv@def456");
    }

    #[test]
    fn round_trip_preserves_files_creators_and_tags() {
        let creator = Person::new("Jane Doe", Some("jane@example.com".into()), None).unwrap();
        let mut dataset = Dataset::new(
            "demo",
            None,
            Some("a test dataset".into()),
            vec![creator.clone()],
        )
        .unwrap();

        dataset.track_file(DatasetFile {
            path: PathBuf::from("data/demo/a.csv"),
            url: Some("https://example.com/a.csv".into()),
            id: Some("sha1:aaaa".into()),
            added: Utc::now(),
            creators: vec![creator],
            based_on: None,
        });
        dataset.add_tag("1.0", "first release", "abc123", false).unwrap();

        let json = serde_json::to_string_pretty(&dataset).unwrap();
        let mut loaded: Dataset = serde_json::from_str(&json).unwrap();
        loaded.ensure_derived();

        assert_eq!(loaded, dataset);
        assert_eq!(
            loaded.files_by_added().len(),
            dataset.files_by_added().len()
        );
    }
}
