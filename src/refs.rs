//! Named references to dataset records.
//!
//! A `LinkReference` is a stable, human-usable pointer: a file under
//! `.datum/refs/` whose content is the record's path relative to `.datum/`.
//! Datasets are addressed as `datasets/<short-name>` while their canonical
//! storage path stays identifier-based.

use std::fs;
use std::path::{Path, PathBuf};

use crate::dataset::is_short_name_valid;
use crate::error::{Error, Result};
use crate::project::Project;

/// A named pointer under the refs directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkReference {
    name: String,
}

impl LinkReference {
    /// Create a reference handle, validating each path segment.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let valid = !name.is_empty()
            && name
                .split('/')
                .all(|segment| is_short_name_valid(segment) && segment != "." && segment != "..");
        if !valid {
            return Err(Error::Parameter(format!("Invalid reference name: '{name}'")));
        }
        Ok(Self { name })
    }

    /// The reference for a dataset short name.
    pub fn for_dataset(short_name: &str) -> Result<Self> {
        Self::new(format!("datasets/{short_name}"))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the reference file itself.
    pub fn path(&self, project: &Project) -> PathBuf {
        project.refs_dir().join(&self.name)
    }

    pub fn exists(&self, project: &Project) -> bool {
        self.path(project).is_file()
    }

    /// Point the reference at a target path relative to `.datum/`.
    pub fn set(&self, project: &Project, target: &Path, force: bool) -> Result<()> {
        let path = self.path(project);
        if path.exists() && !force {
            return Err(Error::Parameter(format!(
                "Reference '{}' already exists.",
                self.name
            )));
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, format!("{}\n", target.display()))?;
        Ok(())
    }

    /// Resolve the reference to the absolute path of its target.
    pub fn resolve(&self, project: &Project) -> Result<PathBuf> {
        let path = self.path(project);
        let content = fs::read_to_string(&path)
            .map_err(|_| Error::Parameter(format!("Reference '{}' not found.", self.name)))?;
        let target = content.trim();
        if target.is_empty() {
            return Err(Error::Parameter(format!("Reference '{}' is empty.", self.name)));
        }
        Ok(project.metadata_dir().join(target))
    }

    /// Delete the reference file. Deleting an absent reference is a no-op.
    pub fn delete(&self, project: &Project) -> Result<()> {
        let path = self.path(project);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// List references under a common prefix (e.g. `datasets`).
    pub fn list(project: &Project, common_path: &str) -> Result<Vec<LinkReference>> {
        let dir = project.refs_dir().join(common_path);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut references = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let file_name = entry.file_name().to_string_lossy().into_owned();
                references.push(LinkReference::new(format!("{common_path}/{file_name}"))?);
            }
        }
        references.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(references)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::TempDir;

    fn init_project() -> (TempDir, Project) {
        let temp = TempDir::new().unwrap();
        Command::new("git")
            .args(["init"])
            .current_dir(temp.path())
            .output()
            .unwrap();
        let project = Project::open(temp.path()).unwrap();
        project.init_metadata_dirs().unwrap();
        (temp, project)
    }

    #[test]
    fn set_resolve_delete() {
        let (_temp, project) = init_project();

        let reference = LinkReference::for_dataset("my-dataset").unwrap();
        reference
            .set(&project, Path::new("datasets/abc123/metadata.json"), false)
            .unwrap();

        let resolved = reference.resolve(&project).unwrap();
        assert_eq!(
            resolved,
            project.metadata_dir().join("datasets/abc123/metadata.json")
        );

        reference.delete(&project).unwrap();
        assert!(reference.resolve(&project).is_err());

        // Deleting again is a no-op.
        reference.delete(&project).unwrap();
    }

    #[test]
    fn duplicate_set_requires_force() {
        let (_temp, project) = init_project();

        let reference = LinkReference::for_dataset("demo").unwrap();
        reference
            .set(&project, Path::new("datasets/one/metadata.json"), false)
            .unwrap();

        assert!(reference
            .set(&project, Path::new("datasets/two/metadata.json"), false)
            .is_err());

        reference
            .set(&project, Path::new("datasets/two/metadata.json"), true)
            .unwrap();
        assert_eq!(
            reference.resolve(&project).unwrap(),
            project.metadata_dir().join("datasets/two/metadata.json")
        );
    }

    #[test]
    fn list_returns_sorted_references() {
        let (_temp, project) = init_project();

        for name in ["zeta", "alpha"] {
            LinkReference::for_dataset(name)
                .unwrap()
                .set(&project, Path::new("datasets/x/metadata.json"), false)
                .unwrap();
        }

        let names: Vec<String> = LinkReference::list(&project, "datasets")
            .unwrap()
            .into_iter()
            .map(|r| r.name().to_string())
            .collect();
        assert_eq!(names, vec!["datasets/alpha", "datasets/zeta"]);
    }

    #[test]
    fn rejects_invalid_names() {
        assert!(LinkReference::new("datasets/../escape").is_err());
        assert!(LinkReference::new("").is_err());
        assert!(LinkReference::new("datasets/with space").is_err());
    }
}
