//! Worktree isolation manager.
//!
//! Some operations must not disturb the current checkout until they succeed
//! (forced reinitialization, conflict-resolving imports). They run against an
//! independent worktree on a dedicated branch; on success the branch is merged
//! back into the original checkout and the temporary tree is removed. A failed
//! merge leaves both trees in place for manual reconciliation.

use std::path::PathBuf;

use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::git;
use crate::project::Project;
use crate::streams;

/// Where the isolated branch starts.
#[derive(Debug, Clone, Default)]
pub enum StartPoint {
    /// Branch from the current HEAD.
    #[default]
    Head,
    /// Branch from an explicit commit-ish.
    Commit(String),
    /// Start on an orphan branch with an empty tree.
    Orphan,
}

/// How the isolated branch is merged back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Only fast-forward; anything else fails.
    #[default]
    FastForwardOnly,
    /// Take the isolated branch's side of every conflict. Used for forced
    /// reinitialization, where the isolated tree is the source of truth.
    PreferIncoming,
}

impl MergeStrategy {
    /// Arguments passed to `git merge`.
    pub fn merge_args(&self) -> Vec<String> {
        match self {
            MergeStrategy::FastForwardOnly => vec!["--ff-only".to_string()],
            MergeStrategy::PreferIncoming => vec![
                "--no-ff".to_string(),
                "-s".to_string(),
                "recursive".to_string(),
                "-X".to_string(),
                "theirs".to_string(),
                "--allow-unrelated-histories".to_string(),
            ],
        }
    }
}

/// Options for one isolated run.
#[derive(Debug, Clone, Default)]
pub struct IsolationOptions {
    /// Worktree path; a temporary directory when absent, removed after a
    /// successful merge. An explicit path persists.
    pub path: Option<PathBuf>,
    /// Branch name; generated when absent.
    pub branch: Option<String>,
    pub start: StartPoint,
    pub merge: MergeStrategy,
}

/// The isolation scope object.
pub struct Isolation;

impl Isolation {
    /// Run `operation` inside an isolated worktree and merge the result back.
    pub fn run<T>(
        project: &Project,
        options: IsolationOptions,
        operation: impl FnOnce(&Project) -> Result<T>,
    ) -> Result<T> {
        let temporary = options.path.is_none();
        let path = match options.path {
            Some(path) => path,
            None => tempfile::Builder::new()
                .prefix("datum-isolation-")
                .tempdir()?
                .keep(),
        };
        let branch = options
            .branch
            .unwrap_or_else(|| format!("datum/isolation/{}", Uuid::new_v4().simple()));

        debug!(path = %path.display(), branch, "creating isolated worktree");
        match &options.start {
            StartPoint::Head => git::create_worktree(project.root(), &branch, &path, None)?,
            StartPoint::Commit(spec) => {
                git::create_worktree(project.root(), &branch, &path, Some(spec))?
            }
            StartPoint::Orphan => git::create_orphan_worktree(project.root(), &branch, &path)?,
        }

        let isolated = project.with_root(&path)?;

        // Reroute redirected stream files into the isolated tree and clean
        // them from the original one; the guard restores the process streams
        // on every exit path.
        let candidates = stream_candidates(project)?;
        let mapped = streams::mapped_std_streams(&candidates);
        let targets = mapped
            .iter()
            .filter_map(|(stream, file)| {
                streams::equivalent_path(project.root(), &path, file)
                    .map(|target| (*stream, target))
            })
            .collect();
        streams::clean_streams(project.repo(), &mapped);
        let guard = streams::RedirectGuard::new(&targets)?;

        let result = operation(&isolated)?;
        drop(guard);

        git::merge_branch(project.root(), &branch, &options.merge.merge_args())?;

        if temporary {
            git::remove_worktree(project.root(), &path)?;
            git::delete_branch(project.repo(), &branch)?;
        }

        Ok(result)
    }
}

/// Paths a redirected stream could point at: index entries plus untracked
/// files of the original checkout.
fn stream_candidates(project: &Project) -> Result<Vec<PathBuf>> {
    let repo = project.repo();
    let root = project.root();

    let mut candidates: Vec<PathBuf> = repo
        .index()?
        .iter()
        .map(|entry| root.join(String::from_utf8_lossy(&entry.path).into_owned()))
        .collect();
    for path in git::untracked_files(repo)? {
        candidates.push(root.join(path));
    }
    Ok(candidates)
}
