//! Transactional commit engine.
//!
//! Every mutating operation runs inside a transaction scope: on success the
//! repository ends up with exactly one commit summarizing the changes the
//! operation made; on failure no partial commit exists. Scopes nest — an
//! operation that wraps sub-operations in the same discipline commits once,
//! at the outermost scope.
//!
//! The `Diff` commit scope snapshots the set of untracked/modified paths
//! right before the operation runs and commits only what changed during it.
//! Untracked files younger than one second at snapshot time are not counted
//! as pre-existing, so files created by pipes feeding the command are still
//! committed. This one-second window is a timing heuristic and a known
//! source of nondeterminism under slow filesystems; it is preserved as-is.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use git2::Signature;
use tracing::debug;

use crate::error::{Error, Result};
use crate::git;
use crate::project::Project;
use crate::streams;
use crate::urls::remove_credentials;

/// Age threshold for treating an untracked file as pre-existing.
const FRESHNESS_WINDOW_MS: i64 = 1_000;

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// What the transaction commits when the operation succeeds.
#[derive(Debug, Clone, Default)]
pub enum CommitScope {
    /// Everything currently different from HEAD.
    #[default]
    All,
    /// Only the listed repository-relative paths, each of which must be
    /// untouched before the operation starts.
    Paths(Vec<PathBuf>),
    /// Only paths that changed while the operation ran.
    Diff,
}

/// Options controlling one transaction scope.
#[derive(Debug, Clone)]
pub struct TransactionOptions {
    /// Require a clean working tree before running.
    pub clean: bool,
    /// With `clean`, tolerate dirt confined to redirected stream files.
    pub ignore_std_streams: bool,
    /// Reserved remote-sync pre-condition; accepted, not implemented.
    pub up_to_date: bool,
    /// Whether to commit at all.
    pub commit: bool,
    /// Allow a commit with no changes.
    pub commit_empty: bool,
    /// With `commit_empty` off, fail instead of silently skipping the commit.
    pub raise_if_empty: bool,
    /// Commit message; derived from the command line when absent.
    pub commit_message: Option<String>,
    pub scope: CommitScope,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            clean: false,
            ignore_std_streams: false,
            up_to_date: false,
            commit: true,
            commit_empty: true,
            raise_if_empty: false,
            commit_message: None,
            scope: CommitScope::All,
        }
    }
}

impl TransactionOptions {
    /// Metadata-only scope: commit exactly the dataset metadata paths.
    pub fn metadata_only(project: &Project) -> Self {
        Self {
            scope: CommitScope::Paths(project.metadata_paths()),
            ..Self::default()
        }
    }

    /// Diff scope: commit what the operation itself changed.
    pub fn diff() -> Self {
        Self {
            scope: CommitScope::Diff,
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.commit_message = message;
        self
    }
}

/// The transactional scope object.
pub struct Transaction;

/// Decrements the nesting depth on every exit path.
struct DepthGuard<'a>(&'a Project);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.exit_transaction();
    }
}

impl Transaction {
    /// Run `operation` inside a transaction scope.
    pub fn run<T>(
        project: &Project,
        options: TransactionOptions,
        operation: impl FnOnce(&Project) -> Result<T>,
    ) -> Result<T> {
        let depth = project.enter_transaction();
        let _guard = DepthGuard(project);

        if depth > 1 {
            // Nested scope: the outermost transaction owns the commit and the
            // diff bookkeeping.
            debug!(depth, "entering nested transaction scope");
            return operation(project);
        }

        if options.clean {
            ensure_clean(project, options.ignore_std_streams)?;
        }

        if !options.commit {
            return operation(project);
        }

        // Snapshot state the commit scope needs before the operation runs.
        let diff_before = match &options.scope {
            CommitScope::Diff => {
                let staged = git::staged_paths(project.repo())?;
                let modified = git::modified_paths(project.repo())?;
                if !staged.is_empty() || !modified.is_empty() {
                    git::reset_index(project.repo())?;
                }
                Some(pre_existing_untracked(project)?)
            }
            CommitScope::Paths(paths) => {
                for path in paths {
                    ensure_untracked(project, path)?;
                    ensure_unstaged(project, path)?;
                }
                None
            }
            CommitScope::All => None,
        };

        let result = operation(project)?;

        let commit_paths: Option<Vec<PathBuf>> = match &options.scope {
            CommitScope::All => None,
            CommitScope::Paths(paths) => Some(paths.clone()),
            CommitScope::Diff => {
                let before = diff_before.unwrap_or_default();
                let mut after: BTreeSet<PathBuf> = BTreeSet::new();
                after.extend(git::untracked_files(project.repo())?);
                after.extend(git::staged_paths(project.repo())?);
                after.extend(git::modified_paths(project.repo())?);
                Some(after.into_iter().filter(|p| !before.contains(p)).collect())
            }
        };

        match commit_paths {
            Some(paths) => git::stage_paths(project.repo(), &paths)?,
            None => git::stage_all(project.repo())?,
        }

        if !options.commit_empty && git::staged_diff_is_empty(project.repo())? {
            if options.raise_if_empty {
                return Err(Error::NothingToCommit);
            }
            debug!("nothing to commit; skipping");
            return Ok(result);
        }

        let message = commit_message(options.commit_message)?;
        let signature = tool_signature()?;
        let oid = git::create_commit(project.repo(), &message, &signature)?;
        debug!(commit = %oid, "transaction committed");

        Ok(result)
    }
}

/// The synthetic commit identity of the tool itself.
pub fn tool_signature() -> Result<Signature<'static>> {
    let name = format!("datum {}", env!("CARGO_PKG_VERSION"));
    Ok(Signature::now(&name, env!("CARGO_PKG_REPOSITORY"))?)
}

/// Resolve the commit message: caller-supplied or derived from the command
/// line with credentials stripped from every argument.
fn commit_message(message: Option<String>) -> Result<String> {
    if let Some(message) = message {
        if message.trim().is_empty() {
            return Err(Error::CommitMessageEmpty);
        }
        return Ok(message);
    }

    let mut parts: Vec<String> = Vec::new();
    let mut args = std::env::args();
    if let Some(program) = args.next() {
        let name = PathBuf::from(program)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "datum".to_string());
        parts.push(name);
    }
    parts.extend(args.map(|arg| remove_credentials(&arg)));

    Ok(parts.join(" "))
}

/// Untracked files that existed before the operation started.
///
/// Files younger than the freshness window at snapshot time are excluded so
/// files created by pipes feeding this invocation still count as produced by
/// the operation. For a CLI run the snapshot happens within milliseconds of
/// process start.
fn pre_existing_untracked(project: &Project) -> Result<BTreeSet<PathBuf>> {
    let started = now_ms();
    let mut before = BTreeSet::new();

    for path in git::untracked_files(project.repo())? {
        let absolute = project.root().join(&path);
        let Ok(metadata) = std::fs::metadata(&absolute) else {
            continue;
        };
        let created_ms = file_ctime_ms(&metadata);
        if started - created_ms >= FRESHNESS_WINDOW_MS {
            before.insert(path);
        }
    }

    Ok(before)
}

#[cfg(unix)]
fn file_ctime_ms(metadata: &std::fs::Metadata) -> i64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ctime() * 1_000 + metadata.ctime_nsec() / 1_000_000
}

#[cfg(not(unix))]
fn file_ctime_ms(metadata: &std::fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Fail with `DirtyRepository` unless the working tree is clean.
///
/// With `ignore_std_streams`, dirt confined to redirected stream files is
/// tolerated; the stream files themselves are cleaned up (best effort) before
/// an error is raised.
fn ensure_clean(project: &Project, ignore_std_streams: bool) -> Result<()> {
    let repo = project.repo();
    let root = project.root();

    let mut dirty: Vec<PathBuf> = git::untracked_files(repo)?
        .into_iter()
        .chain(git::modified_paths(repo)?)
        .map(|p| root.join(p))
        .collect();
    dirty.sort();
    dirty.dedup();

    let mapped = streams::mapped_std_streams(&dirty);

    if ignore_std_streams {
        let stream_files: BTreeSet<&PathBuf> = mapped.values().collect();
        if dirty.iter().any(|p| !stream_files.contains(p)) {
            streams::clean_streams(repo, &mapped);
            return Err(Error::DirtyRepository(root.to_path_buf()));
        }
        return Ok(());
    }

    if git::is_dirty(repo, true)? {
        streams::clean_streams(repo, &mapped);
        return Err(Error::DirtyRepository(root.to_path_buf()));
    }

    Ok(())
}

/// Fail if `path` (or anything under it) is an untracked pending file.
fn ensure_untracked(project: &Project, path: &std::path::Path) -> Result<()> {
    for untracked in git::untracked_files(project.repo())? {
        if untracked == path || untracked.starts_with(path) {
            return Err(Error::DirtyMetadataDirectory(untracked));
        }
    }
    Ok(())
}

/// Fail if `path` (or anything under it) is already staged.
fn ensure_unstaged(project: &Project, path: &std::path::Path) -> Result<()> {
    for staged in git::staged_paths(project.repo())? {
        if staged == path || staged.starts_with(path) {
            return Err(Error::DirtyMetadataDirectory(staged));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::process::Command;
    use tempfile::TempDir;

    fn init_project() -> (TempDir, Project) {
        let temp = TempDir::new().unwrap();
        for args in [
            vec!["init"],
            vec!["config", "user.email", "test@test.com"],
            vec!["config", "user.name", "Test"],
        ] {
            Command::new("git")
                .args(&args)
                .current_dir(temp.path())
                .output()
                .unwrap();
        }
        fs::write(temp.path().join("README.md"), "# Test\n").unwrap();
        Command::new("git")
            .args(["add", "."])
            .current_dir(temp.path())
            .output()
            .unwrap();
        Command::new("git")
            .args(["commit", "-m", "Initial commit"])
            .current_dir(temp.path())
            .output()
            .unwrap();

        let project = Project::open(temp.path()).unwrap();
        (temp, project)
    }

    fn head_message(project: &Project) -> String {
        let head = project.repo().head().unwrap().peel_to_commit().unwrap();
        head.message().unwrap().to_string()
    }

    fn commit_count(project: &Project) -> usize {
        let mut revwalk = project.repo().revwalk().unwrap();
        revwalk.push_head().unwrap();
        revwalk.count()
    }

    #[test]
    fn commits_all_changes_with_message() {
        let (temp, project) = init_project();

        fs::write(temp.path().join("new.txt"), "content").unwrap();
        Transaction::run(
            &project,
            TransactionOptions::default().with_message(Some("add new file".into())),
            |_| Ok(()),
        )
        .unwrap();

        assert_eq!(head_message(&project), "add new file");
        assert!(git::staged_diff_is_empty(project.repo()).unwrap());
        assert!(!git::is_dirty(project.repo(), true).unwrap());
    }

    #[test]
    fn commit_carries_tool_identity() {
        let (temp, project) = init_project();
        fs::write(temp.path().join("new.txt"), "content").unwrap();

        Transaction::run(
            &project,
            TransactionOptions::default().with_message(Some("tool identity".into())),
            |_| Ok(()),
        )
        .unwrap();

        let head = project.repo().head().unwrap().peel_to_commit().unwrap();
        assert!(head.committer().name().unwrap().starts_with("datum "));
    }

    #[test]
    fn clean_precondition_rejects_dirty_tree() {
        let (temp, project) = init_project();
        fs::write(temp.path().join("dirty.txt"), "x").unwrap();

        let options = TransactionOptions {
            clean: true,
            ..TransactionOptions::default()
        };
        let err = Transaction::run(&project, options, |_| Ok(())).unwrap_err();
        assert!(matches!(err, Error::DirtyRepository(_)));
    }

    #[test]
    fn empty_commit_policy() {
        let (_temp, project) = init_project();
        let before = commit_count(&project);

        // Silent skip.
        let options = TransactionOptions {
            commit_empty: false,
            commit_message: Some("noop".into()),
            ..TransactionOptions::default()
        };
        Transaction::run(&project, options, |_| Ok(())).unwrap();
        assert_eq!(commit_count(&project), before);

        // Raising skip.
        let options = TransactionOptions {
            commit_empty: false,
            raise_if_empty: true,
            commit_message: Some("noop".into()),
            ..TransactionOptions::default()
        };
        let err = Transaction::run(&project, options, |_| Ok(())).unwrap_err();
        assert!(matches!(err, Error::NothingToCommit));
    }

    #[test]
    fn empty_message_is_rejected() {
        let (temp, project) = init_project();
        fs::write(temp.path().join("new.txt"), "content").unwrap();

        let err = Transaction::run(
            &project,
            TransactionOptions::default().with_message(Some("   ".into())),
            |_| Ok(()),
        )
        .unwrap_err();
        assert!(matches!(err, Error::CommitMessageEmpty));
    }

    #[test]
    fn failed_operation_commits_nothing() {
        let (temp, project) = init_project();
        let before = commit_count(&project);

        let result: Result<()> = Transaction::run(
            &project,
            TransactionOptions::default().with_message(Some("never".into())),
            |_| {
                fs::write(temp.path().join("partial.txt"), "x").unwrap();
                Err(Error::Parameter("boom".into()))
            },
        );
        assert!(result.is_err());
        assert_eq!(commit_count(&project), before);
    }

    #[test]
    fn paths_scope_commits_only_allowed_paths() {
        let (temp, project) = init_project();

        fs::write(temp.path().join("unrelated.txt"), "left alone").unwrap();

        let options = TransactionOptions {
            scope: CommitScope::Paths(vec![PathBuf::from("tracked")]),
            commit_message: Some("metadata".into()),
            ..TransactionOptions::default()
        };
        Transaction::run(&project, options, |project| {
            fs::create_dir_all(project.root().join("tracked")).unwrap();
            fs::write(project.root().join("tracked/record.json"), "{}").unwrap();
            Ok(())
        })
        .unwrap();

        assert_eq!(head_message(&project), "metadata");
        // The unrelated file stays untracked.
        let untracked = git::untracked_files(project.repo()).unwrap();
        assert_eq!(untracked, vec![PathBuf::from("unrelated.txt")]);
    }

    #[test]
    fn paths_scope_rejects_pre_staged_paths() {
        let (temp, project) = init_project();

        fs::create_dir_all(temp.path().join("tracked")).unwrap();
        fs::write(temp.path().join("tracked/record.json"), "{}").unwrap();

        let options = TransactionOptions {
            scope: CommitScope::Paths(vec![PathBuf::from("tracked")]),
            commit_message: Some("metadata".into()),
            ..TransactionOptions::default()
        };
        let err = Transaction::run(&project, options, |_| Ok(())).unwrap_err();
        assert!(matches!(err, Error::DirtyMetadataDirectory(_)));
    }

    #[test]
    fn diff_scope_excludes_pre_existing_untracked_files() {
        let (temp, project) = init_project();

        // Age a pre-existing file past the freshness window.
        fs::write(temp.path().join("pre_existing.txt"), "before").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1_200));

        // Re-derive the project so a fresh engine run sees the file as old.
        let project = Project::open(temp.path()).unwrap();
        let options = TransactionOptions {
            scope: CommitScope::Diff,
            commit_message: Some("diff commit".into()),
            ..TransactionOptions::default()
        };
        Transaction::run(&project, options, |project| {
            fs::write(project.root().join("produced.txt"), "during").unwrap();
            Ok(())
        })
        .unwrap();

        let head = project.repo().head().unwrap().peel_to_commit().unwrap();
        let tree = head.tree().unwrap();
        assert!(tree.get_path(std::path::Path::new("produced.txt")).is_ok());
        assert!(tree
            .get_path(std::path::Path::new("pre_existing.txt"))
            .is_err());

        // And the pre-existing file survives untracked.
        assert!(temp.path().join("pre_existing.txt").exists());
    }

    #[test]
    fn nested_transactions_commit_once() {
        let (temp, project) = init_project();
        let before = commit_count(&project);

        Transaction::run(
            &project,
            TransactionOptions::default().with_message(Some("outer".into())),
            |project| {
                fs::write(project.root().join("outer.txt"), "x").unwrap();
                Transaction::run(
                    project,
                    TransactionOptions::default().with_message(Some("inner".into())),
                    |project| {
                        fs::write(project.root().join("inner.txt"), "y").unwrap();
                        Ok(())
                    },
                )
            },
        )
        .unwrap();

        assert_eq!(commit_count(&project), before + 1);
        assert_eq!(head_message(&project), "outer");
        let _ = temp;
    }
}
