//! Project layout and persistent metadata storage.
//!
//! A [`Project`] is an immutable view of one repository checkout: its root,
//! its git repository, and the paths where dataset metadata lives. Running a
//! command against a different checkout (a worktree, a temporary path) derives
//! a new value with [`Project::with_root`]; nothing is ever re-pointed in
//! place.
//!
//! # Directory structure
//!
//! ```text
//! <root>/
//!   .datum.toml                    # project configuration (optional)
//!   .datum/
//!     datasets/<id>/metadata.json  # one record per dataset
//!     refs/datasets/<short-name>   # named pointers
//!     cache/<key>/                 # clones of upstream repositories
//! ```

use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};

use git2::Repository;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::git;

/// Name of the metadata directory at the repository root.
pub const METADATA_DIR: &str = ".datum";

/// Subdirectory of [`METADATA_DIR`] holding dataset records.
pub const DATASETS_DIR: &str = "datasets";

/// Subdirectory of [`METADATA_DIR`] holding named references.
pub const REFS_DIR: &str = "refs";

/// A repository checkout with datum metadata.
pub struct Project {
    root: PathBuf,
    repo: Repository,
    config: Config,
    transaction_depth: Cell<u32>,
}

impl Project {
    /// Discover the enclosing repository from a starting path.
    pub fn discover(start: Option<&Path>) -> Result<Self> {
        let repo = git::open_repo(start)?;
        Self::from_repo(repo)
    }

    /// Open the repository at an explicit root.
    pub fn open(root: &Path) -> Result<Self> {
        let repo = git::open_repo(Some(root))?;
        Self::from_repo(repo)
    }

    fn from_repo(repo: Repository) -> Result<Self> {
        let root = git::workdir(&repo)?;
        let config = Config::load_from_repo(&root)?;
        Ok(Self {
            root,
            repo,
            config,
            transaction_depth: Cell::new(0),
        })
    }

    /// Derive a project rooted at another checkout of the same history.
    ///
    /// Used when switching into an isolated worktree; the original value is
    /// left untouched and the derived one starts outside any transaction.
    pub fn with_root(&self, root: &Path) -> Result<Self> {
        Self::open(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Path accessors
    // =========================================================================

    /// Path to the `.datum/` metadata directory.
    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join(METADATA_DIR)
    }

    /// Path to the dataset records directory.
    pub fn datasets_dir(&self) -> PathBuf {
        self.metadata_dir().join(DATASETS_DIR)
    }

    /// Path to one dataset's directory.
    pub fn dataset_dir(&self, identifier: &str) -> PathBuf {
        self.datasets_dir().join(identifier)
    }

    /// Path to one dataset's metadata record.
    pub fn dataset_metadata_file(&self, identifier: &str) -> PathBuf {
        self.dataset_dir(identifier).join("metadata.json")
    }

    /// Path to the named-references directory.
    pub fn refs_dir(&self) -> PathBuf {
        self.metadata_dir().join(REFS_DIR)
    }

    /// Path to the upstream-repository cache.
    pub fn cache_dir(&self) -> PathBuf {
        self.metadata_dir().join("cache")
    }

    /// Default data directory for a dataset's files, relative to the root.
    pub fn dataset_data_dir(&self, short_name: &str) -> PathBuf {
        PathBuf::from(&self.config.data_dir).join(short_name)
    }

    /// The repository-relative paths that hold dataset metadata.
    ///
    /// Metadata-only operations commit exactly these paths.
    pub fn metadata_paths(&self) -> Vec<PathBuf> {
        vec![
            PathBuf::from(METADATA_DIR).join(DATASETS_DIR),
            PathBuf::from(METADATA_DIR).join(REFS_DIR),
        ]
    }

    /// Make an absolute path relative to the repository root.
    pub fn relativize(&self, path: &Path) -> Result<PathBuf> {
        if path.is_relative() {
            return Ok(path.to_path_buf());
        }
        path.strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .map_err(|_| {
                Error::Parameter(format!(
                    "Path is outside the repository: {}",
                    path.display()
                ))
            })
    }

    // =========================================================================
    // Initialization and record IO
    // =========================================================================

    /// Create the metadata directory structure.
    pub fn init_metadata_dirs(&self) -> Result<()> {
        fs::create_dir_all(self.datasets_dir())?;
        fs::create_dir_all(self.refs_dir().join(DATASETS_DIR))?;
        Ok(())
    }

    /// Whether the metadata directory exists.
    pub fn is_initialized(&self) -> bool {
        self.metadata_dir().is_dir()
    }

    /// Read a JSON record.
    pub fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write a JSON record, creating parent directories as needed.
    ///
    /// Records are always rewritten wholesale.
    pub fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut content = serde_json::to_string_pretty(value)?;
        content.push('\n');
        fs::write(path, content)?;
        Ok(())
    }

    // =========================================================================
    // Transaction nesting
    // =========================================================================

    /// Enter a transactional scope; returns the new nesting depth.
    pub(crate) fn enter_transaction(&self) -> u32 {
        let depth = self.transaction_depth.get() + 1;
        self.transaction_depth.set(depth);
        depth
    }

    /// Leave a transactional scope.
    pub(crate) fn exit_transaction(&self) {
        let depth = self.transaction_depth.get();
        debug_assert!(depth > 0, "unbalanced transaction exit");
        self.transaction_depth.set(depth.saturating_sub(1));
    }
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("root", &self.root)
            .field("transaction_depth", &self.transaction_depth.get())
            .finish()
    }
}
