//! Git repository discovery, status queries, staging, and commits.
//!
//! This module wraps libgit2 operations used across datum, including:
//! - Repository discovery and validation
//! - Working-tree state (untracked, modified, staged paths)
//! - Staging and commit creation
//! - Worktree creation and removal, branch merges (via the git CLI, which is
//!   more reliable than libgit2 for these)
//! - Lookups in upstream repository clones

use std::path::{Path, PathBuf};
use std::process::Command;

use git2::{BranchType, ErrorCode, Oid, Repository, Signature, StatusOptions};

use crate::error::{Error, Result};

/// Basic information about the current HEAD.
#[derive(Debug, Clone)]
pub struct HeadInfo {
    /// Commit pointed to by HEAD.
    pub oid: Oid,
    /// Shorthand name (e.g., "main") when available.
    pub shorthand: Option<String>,
    /// Whether HEAD is detached.
    pub is_detached: bool,
}

/// Discover a git repository from a starting path.
pub fn discover_repo(start: Option<&Path>) -> Result<Repository> {
    let start_path = match start {
        Some(path) => path.to_path_buf(),
        None => std::env::current_dir()?,
    };

    Repository::discover(&start_path).map_err(|err| {
        if err.code() == ErrorCode::NotFound {
            Error::RepoNotFound(start_path)
        } else {
            Error::Git(err)
        }
    })
}

/// Open a repository and validate it is a non-bare checkout.
pub fn open_repo(start: Option<&Path>) -> Result<Repository> {
    let repo = discover_repo(start)?;
    if repo.is_bare() {
        return Err(Error::Usage("bare repositories are not supported".to_string()));
    }
    Ok(repo)
}

/// Return the repository workdir (root of the working tree).
pub fn workdir(repo: &Repository) -> Result<PathBuf> {
    repo.workdir()
        .map(|path| path.to_path_buf())
        .ok_or_else(|| Error::Usage("repository has no working directory".to_string()))
}

/// Return information about HEAD.
pub fn head_info(repo: &Repository) -> Result<HeadInfo> {
    let head = repo.head()?;
    let oid = head
        .target()
        .ok_or_else(|| Error::Usage("HEAD has no target commit".to_string()))?;

    Ok(HeadInfo {
        oid,
        shorthand: head.shorthand().map(|name| name.to_string()),
        is_detached: !head.is_branch(),
    })
}

/// Hex OID of the current HEAD commit.
pub fn head_commit_id(repo: &Repository) -> Result<String> {
    Ok(head_info(repo)?.oid.to_string())
}

// =============================================================================
// Working-tree state
// =============================================================================

/// Repository-relative paths of untracked files.
pub fn untracked_files(repo: &Repository) -> Result<Vec<PathBuf>> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(true)
        .exclude_submodules(true);

    let statuses = repo.statuses(Some(&mut opts))?;
    let mut paths = Vec::new();
    for entry in statuses.iter() {
        if entry.status().is_wt_new() {
            if let Some(path) = entry.path() {
                paths.push(PathBuf::from(path));
            }
        }
    }
    Ok(paths)
}

/// Repository-relative paths with unstaged modifications (workdir vs index).
pub fn modified_paths(repo: &Repository) -> Result<Vec<PathBuf>> {
    let diff = repo.diff_index_to_workdir(None, None)?;
    Ok(delta_paths(&diff))
}

/// Repository-relative paths staged in the index (index vs HEAD).
///
/// With an unborn HEAD every index entry counts as staged.
pub fn staged_paths(repo: &Repository) -> Result<Vec<PathBuf>> {
    match repo.head() {
        Ok(head) => {
            let tree = head.peel_to_tree()?;
            let diff = repo.diff_tree_to_index(Some(&tree), Some(&repo.index()?), None)?;
            Ok(delta_paths(&diff))
        }
        Err(e) if e.code() == ErrorCode::UnbornBranch => {
            let index = repo.index()?;
            Ok(index
                .iter()
                .map(|entry| PathBuf::from(String::from_utf8_lossy(&entry.path).into_owned()))
                .collect())
        }
        Err(e) => Err(Error::Git(e)),
    }
}

fn delta_paths(diff: &git2::Diff) -> Vec<PathBuf> {
    diff.deltas()
        .filter_map(|delta| delta.new_file().path().or_else(|| delta.old_file().path()))
        .map(PathBuf::from)
        .collect()
}

/// Check whether the working tree has any uncommitted changes.
pub fn is_dirty(repo: &Repository, include_untracked: bool) -> Result<bool> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(include_untracked)
        .recurse_untracked_dirs(include_untracked)
        .exclude_submodules(true);

    let statuses = repo.statuses(Some(&mut opts))?;
    for entry in statuses.iter() {
        let status = entry.status();
        if !status.is_ignored() && !status.is_empty() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Resolve which of the given paths are ignored by `.gitignore` rules.
///
/// Shells out to `git check-ignore`; a failing check command is treated as
/// "no ignored paths".
pub fn ignored_paths(repo_root: &Path, paths: &[PathBuf]) -> Vec<PathBuf> {
    if paths.is_empty() {
        return Vec::new();
    }

    let mut command = Command::new("git");
    command.arg("-C").arg(repo_root).arg("check-ignore");
    for path in paths {
        command.arg(path);
    }

    match command.output() {
        Ok(output) => String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .collect(),
        Err(_) => Vec::new(),
    }
}

// =============================================================================
// Staging and commits
// =============================================================================

/// Unstage everything: reset the index to HEAD without touching the workdir.
pub fn reset_index(repo: &Repository) -> Result<()> {
    match repo.head() {
        Ok(head) => {
            let obj = head.peel(git2::ObjectType::Commit)?;
            repo.reset(&obj, git2::ResetType::Mixed, None)?;
        }
        Err(e) if e.code() == ErrorCode::UnbornBranch => {
            let mut index = repo.index()?;
            index.clear()?;
            index.write()?;
        }
        Err(e) => return Err(Error::Git(e)),
    }
    Ok(())
}

/// Stage the given repository-relative paths, recording deletions too.
pub fn stage_paths(repo: &Repository, paths: &[PathBuf]) -> Result<()> {
    let root = workdir(repo)?;
    let mut index = repo.index()?;

    for path in paths {
        let absolute = root.join(path);
        if absolute.is_dir() {
            // Stage additions and deletions under the directory alike.
            index.add_all(
                [path.as_path()].iter(),
                git2::IndexAddOption::DEFAULT,
                None,
            )?;
            index.update_all([path.as_path()].iter(), None)?;
        } else if absolute.exists() {
            index.add_path(path)?;
        } else {
            // Records a deletion; ignore paths git never knew about.
            match index.remove_path(path) {
                Ok(()) => {}
                Err(e) if e.code() == ErrorCode::NotFound => {}
                Err(e) => return Err(Error::Git(e)),
            }
        }
    }

    index.write()?;
    Ok(())
}

/// Stage every change in the working tree, including deletions.
pub fn stage_all(repo: &Repository) -> Result<()> {
    let mut index = repo.index()?;
    index.add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)?;
    index.update_all(["*"].iter(), None)?;
    index.write()?;
    Ok(())
}

/// Check whether the index differs from HEAD.
pub fn staged_diff_is_empty(repo: &Repository) -> Result<bool> {
    match repo.head() {
        Ok(head) => {
            let tree = head.peel_to_tree()?;
            let diff = repo.diff_tree_to_index(Some(&tree), Some(&repo.index()?), None)?;
            Ok(diff.deltas().count() == 0)
        }
        Err(e) if e.code() == ErrorCode::UnbornBranch => Ok(repo.index()?.is_empty()),
        Err(e) => Err(Error::Git(e)),
    }
}

/// Create a commit from the current index with the given identity.
///
/// Commits are created through libgit2 and therefore do not run client-side
/// hooks.
pub fn create_commit(repo: &Repository, message: &str, signature: &Signature<'_>) -> Result<Oid> {
    let mut index = repo.index()?;
    let tree_oid = index.write_tree()?;
    let tree = repo.find_tree(tree_oid)?;

    let parents = match repo.head() {
        Ok(head) => vec![head.peel_to_commit()?],
        Err(e) if e.code() == ErrorCode::UnbornBranch => vec![],
        Err(e) => return Err(Error::Git(e)),
    };
    let parent_refs: Vec<&git2::Commit> = parents.iter().collect();

    let oid = repo.commit(Some("HEAD"), signature, signature, message, &tree, &parent_refs)?;
    Ok(oid)
}

/// Resolve a revision spec to a commit OID.
pub fn resolve_commit(repo: &Repository, spec: &str) -> Result<Oid> {
    let obj = repo.revparse_single(spec)?;
    Ok(obj.peel_to_commit()?.id())
}

/// Read the blob content of `path` as of the given commit, if the file exists
/// there.
pub fn file_blob_at(repo: &Repository, commit: Oid, path: &Path) -> Result<Option<Vec<u8>>> {
    let commit = repo.find_commit(commit)?;
    let tree = commit.tree()?;
    match tree.get_path(path) {
        Ok(entry) => {
            let blob = repo.find_blob(entry.id())?;
            Ok(Some(blob.content().to_vec()))
        }
        Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
        Err(e) => Err(Error::Git(e)),
    }
}

/// Blob OID of `path` as of the given commit, if present.
pub fn file_blob_id_at(repo: &Repository, commit: Oid, path: &Path) -> Result<Option<Oid>> {
    let commit = repo.find_commit(commit)?;
    let tree = commit.tree()?;
    match tree.get_path(path) {
        Ok(entry) => Ok(Some(entry.id())),
        Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
        Err(e) => Err(Error::Git(e)),
    }
}

/// Find the most recent commit reachable from `start` that changed `path`.
pub fn last_commit_touching(repo: &Repository, start: Oid, path: &Path) -> Result<Option<Oid>> {
    let mut revwalk = repo.revwalk()?;
    revwalk.push(start)?;
    revwalk.set_sorting(git2::Sort::TOPOLOGICAL | git2::Sort::TIME)?;

    for oid in revwalk {
        let oid = oid?;
        let commit = repo.find_commit(oid)?;
        let current = commit.tree()?.get_path(path).ok().map(|e| e.id());
        if current.is_none() {
            continue;
        }

        let mut changed_vs_all_parents = true;
        for parent in commit.parents() {
            let previous = parent.tree()?.get_path(path).ok().map(|e| e.id());
            if previous == current {
                changed_vs_all_parents = false;
                break;
            }
        }
        if changed_vs_all_parents || commit.parent_count() == 0 {
            return Ok(Some(oid));
        }
    }

    Ok(None)
}

/// Read the blob content of an index entry, if the path is tracked.
pub fn index_blob(repo: &Repository, path: &Path) -> Result<Option<Vec<u8>>> {
    let index = repo.index()?;
    match index.get_path(path, 0) {
        Some(entry) => {
            let blob = repo.find_blob(entry.id)?;
            Ok(Some(blob.content().to_vec()))
        }
        None => Ok(None),
    }
}

// =============================================================================
// Worktree and merge operations (git CLI)
// =============================================================================

/// Run a git command in a directory, turning failures into errors.
fn run_git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git").arg("-C").arg(dir).args(args).output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Usage(format!(
            "git {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Create a worktree on a new branch.
///
/// Branches from `base` when given, otherwise from HEAD. Uses the git CLI;
/// libgit2's worktree API is limited.
pub fn create_worktree(
    repo_root: &Path,
    branch: &str,
    path: &Path,
    base: Option<&str>,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let path_str = path.to_string_lossy().into_owned();
    let mut args = vec!["worktree", "add", "-b", branch, path_str.as_str()];
    if let Some(base) = base {
        args.push(base);
    }
    run_git(repo_root, &args)?;
    Ok(())
}

/// Create a detached worktree and switch it onto a fresh orphan branch with an
/// emptied working tree.
pub fn create_orphan_worktree(repo_root: &Path, branch: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let path_str = path.to_string_lossy().into_owned();
    run_git(repo_root, &["worktree", "add", "--detach", path_str.as_str()])?;
    run_git(path, &["checkout", "--orphan", branch])?;
    // A fresh repository has nothing staged; `git rm` fails on empty trees.
    let _ = run_git(path, &["rm", "-rf", "--ignore-unmatch", "."]);
    Ok(())
}

/// Remove a worktree and prune its administrative files.
pub fn remove_worktree(repo_root: &Path, path: &Path) -> Result<()> {
    let path_str = path.to_string_lossy().into_owned();
    run_git(
        repo_root,
        &["worktree", "remove", "--force", path_str.as_str()],
    )?;
    Ok(())
}

/// Delete a local branch.
pub fn delete_branch(repo: &Repository, name: &str) -> Result<()> {
    let mut branch = repo.find_branch(name, BranchType::Local)?;
    branch.delete()?;
    Ok(())
}

/// Merge a branch into the current branch with explicit merge arguments.
///
/// Failure surfaces as [`Error::FailedMerge`] naming the repository, branch,
/// and arguments; the caller decides what to do with the worktree.
pub fn merge_branch(repo_root: &Path, branch: &str, merge_args: &[String]) -> Result<()> {
    let mut args: Vec<&str> = vec!["merge"];
    for arg in merge_args {
        args.push(arg);
    }
    args.push(branch);

    run_git(repo_root, &args).map_err(|_| Error::FailedMerge {
        repo: repo_root.to_path_buf(),
        branch: branch.to_string(),
        merge_args: merge_args.to_vec(),
    })?;
    Ok(())
}

// =============================================================================
// Upstream repository clones
// =============================================================================

/// Clone an upstream repository into `dest`, or refresh an existing clone.
pub fn clone_or_fetch(url: &str, dest: &Path) -> Result<Repository> {
    if dest.join(".git").exists() || dest.join("HEAD").exists() {
        let repo = Repository::open(dest)?;
        {
            let mut remote = repo.find_remote("origin")?;
            remote.fetch(
                &["+refs/heads/*:refs/remotes/origin/*"],
                None,
                None,
            )?;
        }
        return Ok(repo);
    }

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Repository::clone(url, dest)?)
}

/// Resolve a reference in an upstream clone: an explicit ref (local or
/// remote-tracking) or the remote HEAD when none is given.
pub fn resolve_upstream_ref(repo: &Repository, reference: Option<&str>) -> Result<Oid> {
    match reference {
        // Remote-tracking refs first: the local branch of a cached clone can
        // lag behind what the fetch just brought in.
        Some(reference) => resolve_commit(repo, &format!("origin/{reference}"))
            .or_else(|_| resolve_commit(repo, reference))
            .map_err(|_| {
                Error::Parameter(format!("Cannot resolve reference '{reference}' in upstream repository."))
            }),
        // No explicit ref: the upstream default branch. origin/HEAD is not
        // guaranteed to exist in every clone, so fall back through the common
        // default-branch names before settling for the local HEAD.
        None => ["origin/HEAD", "origin/main", "origin/master", "HEAD"]
            .iter()
            .find_map(|spec| resolve_commit(repo, spec).ok())
            .ok_or_else(|| {
                Error::Parameter("Cannot resolve the upstream repository's HEAD.".into())
            }),
    }
}
