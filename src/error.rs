//! Error types for datum
//!
//! Exit codes:
//! - 0: Success
//! - 1: Usage or repository-state error (dirty tree, failed merge, ...)
//! - 2: Parameter error (unknown dataset, invalid values, no matches)

use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the datum CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USAGE_ERROR: i32 = 1;
    pub const PARAMETER_ERROR: i32 = 2;
}

/// Main error type for datum operations
#[derive(Error, Debug)]
pub enum Error {
    // Usage and repository-state errors (exit code 1)
    #[error("Invalid usage: {0}")]
    Usage(String),

    #[error("Repository not found from {}", .0.display())]
    RepoNotFound(PathBuf),

    #[error("The repository is dirty: {}\nCommit or stash your changes and retry.", .0.display())]
    DirtyRepository(PathBuf),

    #[error("The metadata directory has uncommitted changes: {}", .0.display())]
    DirtyMetadataDirectory(PathBuf),

    #[error("There is nothing to commit.")]
    NothingToCommit,

    #[error("Invalid commit message: message cannot be empty.")]
    CommitMessageEmpty,

    #[error(
        "Merge of branch '{}' failed in {} (git merge {})\nThe worktree is left in place for inspection.",
        .branch,
        .repo.display(),
        .merge_args.join(" ")
    )]
    FailedMerge {
        repo: PathBuf,
        branch: String,
        merge_args: Vec<String>,
    },

    #[error("Project metadata is outdated: {0}\nRun a migration before retrying this command.")]
    MigrationRequired(String),

    #[error("Invalid or missing access token.")]
    InvalidAccessToken,

    #[error("Provider operation failed (HTTP {status}): {message}")]
    Operation { status: u16, message: String },

    // Parameter errors (exit code 2)
    #[error("Invalid parameter: {0}")]
    Parameter(String),

    #[error("{0}")]
    DatasetNotFound(String),

    #[error("Dataset with short name '{0}' already exists.")]
    DatasetExists(String),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Malformed provider record: {0}")]
    MalformedRecord(String),

    // Wrapped lower-level failures (exit code 1)
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Parameter(_)
            | Error::DatasetNotFound(_)
            | Error::DatasetExists(_)
            | Error::RecordNotFound(_)
            | Error::MalformedRecord(_) => exit_codes::PARAMETER_ERROR,

            _ => exit_codes::USAGE_ERROR,
        }
    }

    /// Whether this error is a parameter-class error.
    pub fn is_parameter_error(&self) -> bool {
        self.exit_code() == exit_codes::PARAMETER_ERROR
    }
}

/// Result type alias for datum operations
pub type Result<T> = std::result::Result<T, Error>;
