//! `datum init` and `datum migrate` command implementations.
//!
//! Init creates the metadata directory structure and a default configuration
//! file, committed in one metadata-scoped transaction. A forced
//! reinitialization runs inside an isolated worktree and merges back
//! preferring the fresh state, so a broken checkout is never made worse.

use std::fs;
use std::path::PathBuf;

use crate::cli::CommandContext;
use crate::config::CONFIG_FILE;
use crate::error::{Error, Result};
use crate::migrations;
use crate::output;
use crate::project::{Project, METADATA_DIR};
use crate::transaction::{CommitScope, Transaction, TransactionOptions};
use crate::worktree::{Isolation, IsolationOptions, MergeStrategy};

pub fn run(context: CommandContext, force: bool) -> Result<()> {
    let project = Project::discover(context.repo.as_deref())?;

    if project.is_initialized() && !force {
        return Err(Error::Usage(
            "datum is already initialized; use --force to reinitialize.".into(),
        ));
    }

    if force {
        Isolation::run(
            &project,
            IsolationOptions {
                merge: MergeStrategy::PreferIncoming,
                ..IsolationOptions::default()
            },
            |isolated| initialize(isolated),
        )?;
    } else {
        initialize(&project)?;
    }

    output::emit_success(
        context.output_options(),
        "init",
        &serde_json::json!({ "initialized": true, "force": force }),
        &["Initialized datum project.".to_string()],
    )
}

fn initialize(project: &Project) -> Result<()> {
    let options = TransactionOptions {
        scope: CommitScope::Paths(vec![
            PathBuf::from(METADATA_DIR),
            PathBuf::from(CONFIG_FILE),
        ]),
        commit_message: Some("datum init".to_string()),
        ..TransactionOptions::default()
    };

    Transaction::run(project, options, |project| {
        project.init_metadata_dirs()?;

        let config_path = project.root().join(CONFIG_FILE);
        if !config_path.exists() {
            fs::write(
                &config_path,
                "# datum project configuration\ndata_dir = \"data\"\n",
            )?;
        }

        // Empty directories are invisible to git; keep them trackable.
        for dir in [project.datasets_dir(), project.refs_dir().join("datasets")] {
            let keep = dir.join(".gitkeep");
            if !keep.exists() {
                fs::write(keep, "")?;
            }
        }

        Ok(())
    })
}

pub fn run_migrate(context: CommandContext) -> Result<()> {
    let project = Project::discover(context.repo.as_deref())?;

    let migrated = Transaction::run(
        &project,
        TransactionOptions {
            commit_message: Some("datum migrate".to_string()),
            ..TransactionOptions::metadata_only(&project)
        },
        |project| migrations::migrate(project),
    )?;

    output::emit_success(
        context.output_options(),
        "migrate",
        &serde_json::json!({ "migrated": migrated }),
        &[format!("Migrated {migrated} dataset record(s).")],
    )
}
