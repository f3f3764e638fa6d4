//! Dataset metadata migrations.
//!
//! Records written by old releases come in three outdated shapes: an
//! `authors` key where `creators` now lives, absolute file paths, and
//! DOI-shaped identifiers. Detection is a pure read-only scan; operations
//! that touch datasets call [`ensure_current`] before mutating anything and
//! fail with `MigrationRequired` until [`migrate`] has been run.

use std::path::{Path, PathBuf};

use serde_json::Value;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::project::Project;
use crate::urls::extract_doi;

/// Whether a raw dataset document is in an outdated shape.
pub fn needs_migration(document: &Value) -> bool {
    has_legacy_creators(document) || has_absolute_paths(document) || has_legacy_identifier(document)
}

fn has_legacy_creators(document: &Value) -> bool {
    if document.get("authors").is_some() {
        return true;
    }
    files_of(document)
        .iter()
        .any(|file| file.get("authors").is_some())
}

fn has_absolute_paths(document: &Value) -> bool {
    files_of(document).iter().any(|file| {
        file.get("path")
            .and_then(Value::as_str)
            .map(|path| Path::new(path).is_absolute())
            .unwrap_or(false)
    })
}

fn has_legacy_identifier(document: &Value) -> bool {
    match document.get("identifier").and_then(Value::as_str) {
        Some(identifier) => Uuid::parse_str(identifier).is_err(),
        None => true,
    }
}

fn files_of(document: &Value) -> Vec<&Value> {
    match document.get("files") {
        Some(Value::Array(files)) => files.iter().collect(),
        // The oldest layout kept files as a map keyed by path.
        Some(Value::Object(files)) => files.values().collect(),
        _ => Vec::new(),
    }
}

/// Apply the full upgrade chain to a raw document.
pub fn migrate_document(mut document: Value, repo_root: &Path) -> Value {
    migrate_creators(&mut document);
    migrate_paths(&mut document, repo_root);
    migrate_identifier(&mut document);
    document
}

/// `authors` → `creators`, on the dataset and on every file.
fn migrate_creators(document: &mut Value) {
    if let Some(object) = document.as_object_mut() {
        if let Some(authors) = object.remove("authors") {
            object.insert("creators".to_string(), authors);
        }
    }

    for file in files_of_mut(document) {
        if let Some(object) = file.as_object_mut() {
            if let Some(authors) = object.remove("authors") {
                object.insert("creators".to_string(), authors);
            }
        }
    }
}

/// Absolute file paths → repository-relative.
fn migrate_paths(document: &mut Value, repo_root: &Path) {
    for file in files_of_mut(document) {
        let Some(path) = file.get("path").and_then(Value::as_str) else {
            continue;
        };
        let path = Path::new(path);
        if !path.is_absolute() {
            continue;
        }

        if let Ok(relative) = path.strip_prefix(repo_root) {
            file["path"] = Value::String(relative.to_string_lossy().into_owned());
        }
    }

    // The file map layout becomes a list on the way through.
    if let Some(Value::Object(map)) = document.get("files") {
        let list: Vec<Value> = map.values().cloned().collect();
        document["files"] = Value::Array(list);
    }
}

/// Non-UUID identifiers → fresh UUIDs, preserving DOIs as `same_as`.
fn migrate_identifier(document: &mut Value) {
    let identifier = document
        .get("identifier")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if Uuid::parse_str(&identifier).is_ok() {
        return;
    }

    if extract_doi(&identifier).is_some() {
        document["same_as"] = Value::String(identifier);
    }
    document["identifier"] = Value::String(Uuid::new_v4().to_string());
}

fn files_of_mut(document: &mut Value) -> Vec<&mut Value> {
    match document.get_mut("files") {
        Some(Value::Array(files)) => files.iter_mut().collect(),
        Some(Value::Object(files)) => files.values_mut().collect(),
        _ => Vec::new(),
    }
}

/// Read-only scan: record paths that need migration.
pub fn scan(project: &Project) -> Result<Vec<PathBuf>> {
    let datasets_dir = project.datasets_dir();
    if !datasets_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut outdated = Vec::new();
    for entry in std::fs::read_dir(&datasets_dir)? {
        let record = entry?.path().join("metadata.json");
        if !record.is_file() {
            continue;
        }
        let document: Value = project.read_json(&record)?;
        if needs_migration(&document) {
            outdated.push(record);
        }
    }
    outdated.sort();
    Ok(outdated)
}

/// Fail with `MigrationRequired` when any record is outdated.
pub fn ensure_current(project: &Project) -> Result<()> {
    let outdated = scan(project)?;
    if outdated.is_empty() {
        return Ok(());
    }
    Err(Error::MigrationRequired(format!(
        "{} dataset record(s) are in an outdated format",
        outdated.len()
    )))
}

/// Upgrade every outdated record in place; returns how many were rewritten.
pub fn migrate(project: &Project) -> Result<usize> {
    let outdated = scan(project)?;
    for record in &outdated {
        let document: Value = project.read_json(record)?;
        let upgraded = migrate_document(document, project.root());
        project.write_json(record, &upgraded)?;
    }
    Ok(outdated.len())
}
