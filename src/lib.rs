//! datum - Dataset Provenance & Versioning Library
//!
//! This library provides the core functionality for the datum CLI tool:
//! tracking datasets, their files, and their lineage inside a git repository,
//! with metadata committed alongside the tracked files.
//!
//! # Core Concepts
//!
//! - **Datasets**: named collections of files with provenance metadata,
//!   persisted as one JSON record per dataset under `.datum/`
//! - **Transactions**: every mutating operation ends in exactly one commit
//!   scoped to what the operation changed
//! - **Worktree isolation**: risky operations run against a separate,
//!   mergeable checkout
//! - **Lineage**: files fetched from other git repositories remember where
//!   they came from and can be updated in place
//! - **Providers**: datasets can be imported from and exported to external
//!   archives (Dataverse, Zenodo) behind one resolution layer
//!
//! # Module Organization
//!
//! - `cli`: command-line interface using clap
//! - `config`: configuration loading from `.datum.toml` and the credentials
//!   store
//! - `dataset`: the dataset/file/tag metadata model
//! - `datasets`: the dataset operations engine
//! - `error`: error types and result aliases
//! - `git`: git operations wrapper using libgit2
//! - `migrations`: versioned metadata upgrades
//! - `person`: provenance agents
//! - `project`: repository layout and record storage
//! - `providers`: external provider resolution and records
//! - `refs`: named references to dataset records
//! - `streams`: redirected standard-stream handling
//! - `transaction`: the transactional commit engine
//! - `urls`: URL and DOI helpers
//! - `worktree`: worktree isolation manager

pub mod cli;
pub mod config;
pub mod dataset;
pub mod datasets;
pub mod error;
pub mod git;
pub mod migrations;
pub mod output;
pub mod person;
pub mod project;
pub mod providers;
pub mod refs;
pub mod streams;
pub mod transaction;
pub mod urls;
pub mod worktree;

pub use error::{Error, Result};
