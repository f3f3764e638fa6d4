//! Command-line interface for datum
//!
//! This module defines the CLI structure using clap derive macros. The CLI is
//! a thin adapter: flags translate 1:1 onto dataset-engine calls, and every
//! command runs inside the transactional commit discipline it needs.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::error::Result;

mod dataset;
mod init;

/// datum - dataset provenance and versioning for git repositories
///
/// Tracks datasets, their files, and their lineage inside a git repository,
/// committing metadata alongside the tracked files.
#[derive(Parser, Debug)]
#[command(name = "datum")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the repository (defaults to the current directory)
    #[arg(long, global = true, env = "DATUM_REPO")]
    pub repo: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize datum in a repository
    Init {
        /// Reinitialize through an isolated worktree, preferring the fresh
        /// state on conflicts
        #[arg(long)]
        force: bool,
    },

    /// Dataset management
    #[command(subcommand)]
    Dataset(DatasetCommands),

    /// Upgrade outdated dataset metadata
    Migrate,
}

/// Dataset subcommands
#[derive(Subcommand, Debug)]
pub enum DatasetCommands {
    /// List datasets
    Ls,

    /// Create an empty dataset
    Create {
        /// Dataset name
        name: String,

        /// Short name (derived from the name when omitted)
        #[arg(long)]
        short_name: Option<String>,

        /// Dataset description
        #[arg(short, long)]
        description: Option<String>,

        /// Creator as "Name <email>" (repeatable)
        #[arg(short, long = "creator")]
        creators: Vec<String>,
    },

    /// Add files from paths, URLs, or git repositories
    Add {
        /// Dataset short name
        name: String,

        /// Paths or URLs to add
        #[arg(required = true)]
        urls: Vec<String>,

        /// Paths within a repository source (repeatable)
        #[arg(short, long = "source")]
        sources: Vec<String>,

        /// Destination directory or file name
        #[arg(short, long)]
        destination: Option<String>,

        /// Reference (branch, tag, commit) within a repository source
        #[arg(long = "ref")]
        reference: Option<String>,

        /// Create the dataset if it does not exist
        #[arg(long)]
        create: bool,

        /// Overwrite existing destination files
        #[arg(long)]
        force: bool,
    },

    /// List dataset files
    LsFiles {
        /// Dataset short names to include (all when empty)
        names: Vec<String>,

        /// Filter by creator names (comma separated)
        #[arg(long)]
        creators: Option<String>,

        /// Include files matching the pattern (repeatable)
        #[arg(short = 'I', long = "include")]
        include: Vec<String>,

        /// Exclude files matching the pattern (repeatable)
        #[arg(short = 'X', long = "exclude")]
        exclude: Vec<String>,
    },

    /// Remove matching files from a dataset
    Unlink {
        /// Dataset short name
        name: String,

        /// Include files matching the pattern (repeatable)
        #[arg(short = 'I', long = "include")]
        include: Vec<String>,

        /// Exclude files matching the pattern (repeatable)
        #[arg(short = 'X', long = "exclude")]
        exclude: Vec<String>,

        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Delete datasets
    Rm {
        /// Dataset short names
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Edit dataset metadata from a JSON document
    Edit {
        /// Dataset short name
        name: String,

        /// File with the edited metadata document
        #[arg(short = 'F', long)]
        file: PathBuf,
    },

    /// Export a dataset to a provider
    Export {
        /// Dataset short name
        name: String,

        /// Provider id (dataverse, zenodo)
        provider: String,

        /// Publish the deposit after upload
        #[arg(long)]
        publish: bool,

        /// Dataset tag to export
        #[arg(short, long)]
        tag: Option<String>,
    },

    /// Import a dataset from a provider
    Import {
        /// DOI or URL of the record
        uri: String,

        /// Short name for the imported dataset
        #[arg(long)]
        short_name: Option<String>,

        /// Skip confirmation prompts
        #[arg(short, long)]
        yes: bool,
    },

    /// Update dataset files from their upstream repositories
    Update {
        /// Dataset short names to include (all when empty)
        names: Vec<String>,

        /// Filter by creator names (comma separated)
        #[arg(long)]
        creators: Option<String>,

        /// Include files matching the pattern (repeatable)
        #[arg(short = 'I', long = "include")]
        include: Vec<String>,

        /// Exclude files matching the pattern (repeatable)
        #[arg(short = 'X', long = "exclude")]
        exclude: Vec<String>,

        /// Reference to update to (single upstream repository only)
        #[arg(long = "ref")]
        reference: Option<String>,

        /// Delete local files that were deleted upstream
        #[arg(long)]
        delete: bool,
    },

    /// Tag the current state of a dataset
    Tag {
        /// Dataset short name
        name: String,

        /// Tag name
        tag: String,

        /// Tag description
        #[arg(short, long, default_value = "")]
        description: String,

        /// Allow overwriting an existing tag
        #[arg(long)]
        force: bool,
    },

    /// List dataset tags
    LsTags {
        /// Dataset short name
        name: String,
    },

    /// Remove dataset tags
    RmTags {
        /// Dataset short name
        name: String,

        /// Tag names
        #[arg(required = true)]
        tags: Vec<String>,
    },
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let context = CommandContext {
            repo: self.repo,
            json: self.json,
            quiet: self.quiet,
        };

        match self.command {
            Commands::Init { force } => init::run(context, force),
            Commands::Migrate => init::run_migrate(context),
            Commands::Dataset(command) => dataset::run(context, command),
        }
    }
}

/// Global flags handed down to every command.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub repo: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

impl CommandContext {
    pub fn output_options(&self) -> crate::output::OutputOptions {
        crate::output::OutputOptions {
            json: self.json,
            quiet: self.quiet,
        }
    }
}

/// Ask a yes/no question on the terminal.
pub(crate) fn confirm(message: &str) -> Result<bool> {
    eprint!("{message} [y/N]: ");
    std::io::stderr().flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    let answer = answer.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}

/// Read a secret value from the terminal.
pub(crate) fn prompt_line(message: &str) -> Result<String> {
    eprint!("{message}: ");
    std::io::stderr().flush()?;

    let mut value = String::new();
    std::io::stdin().lock().read_line(&mut value)?;
    Ok(value.trim().to_string())
}
