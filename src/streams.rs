//! Redirected standard-stream files.
//!
//! When a command runs with its standard streams redirected into files inside
//! the repository (`datum ... > out.txt 2> err.txt`), those files show up as
//! dirty working-tree entries even though the user never edited anything. This
//! module detects such files by device/inode identity, cleans them up before
//! dirty-repository errors are raised, and reroutes the process streams into
//! an isolated worktree when one is entered.
//!
//! Detection and rerouting are Unix-only; on other platforms every function
//! degrades to a no-op, which only widens the dirty-repository check.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use git2::Repository;

use crate::error::Result;
use crate::git;

/// A standard stream of the current process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StdStream {
    Stdin,
    Stdout,
    Stderr,
}

impl StdStream {
    fn fd(self) -> i32 {
        match self {
            StdStream::Stdin => 0,
            StdStream::Stdout => 1,
            StdStream::Stderr => 2,
        }
    }

    const ALL: [StdStream; 3] = [StdStream::Stdin, StdStream::Stdout, StdStream::Stderr];
}

/// Map standard streams to the candidate paths they are redirected into.
///
/// A candidate matches a stream when both resolve to the same device and
/// inode. Streams pointing at terminals or pipes never match regular files.
#[cfg(unix)]
pub fn mapped_std_streams(candidates: &[PathBuf]) -> BTreeMap<StdStream, PathBuf> {
    use std::os::unix::fs::MetadataExt;

    let mut stream_identity = BTreeMap::new();
    for stream in StdStream::ALL {
        let fd_path = format!("/dev/fd/{}", stream.fd());
        if let Ok(meta) = fs::metadata(&fd_path) {
            if meta.is_file() {
                stream_identity.insert((meta.dev(), meta.ino()), stream);
            }
        }
    }

    if stream_identity.is_empty() {
        return BTreeMap::new();
    }

    let mut mapped = BTreeMap::new();
    for path in candidates {
        if let Ok(meta) = fs::metadata(path) {
            if let Some(stream) = stream_identity.get(&(meta.dev(), meta.ino())) {
                mapped.insert(*stream, path.clone());
            }
        }
    }

    mapped
}

#[cfg(not(unix))]
pub fn mapped_std_streams(_candidates: &[PathBuf]) -> BTreeMap<StdStream, PathBuf> {
    BTreeMap::new()
}

/// Clean redirected stdout/stderr files from the working tree, best effort.
///
/// An untracked stream file is removed; a tracked one is restored to its
/// index content so the redirection alone never leaves the tree dirty.
pub fn clean_streams(repo: &Repository, mapped: &BTreeMap<StdStream, PathBuf>) {
    let root = match git::workdir(repo) {
        Ok(root) => root,
        Err(_) => return,
    };

    for stream in [StdStream::Stdout, StdStream::Stderr] {
        let Some(path) = mapped.get(&stream) else {
            continue;
        };
        let relative = match path.strip_prefix(&root) {
            Ok(relative) => relative,
            Err(_) => continue,
        };

        match git::index_blob(repo, relative) {
            Ok(Some(content)) => {
                let _ = fs::write(path, content);
            }
            Ok(None) => {
                let _ = fs::remove_file(path);
            }
            Err(_) => {}
        }
    }
}

/// Reroute process streams into equivalent files, restoring them on drop.
///
/// The restore runs on every exit path, including unwinding out of a failed
/// isolated operation.
pub struct RedirectGuard {
    #[cfg(unix)]
    saved: Vec<(i32, i32)>,
}

impl RedirectGuard {
    /// Redirect each mapped stream into the given target path, creating the
    /// file and its parents.
    #[cfg(unix)]
    pub fn new(targets: &BTreeMap<StdStream, PathBuf>) -> Result<Self> {
        use std::os::unix::io::IntoRawFd;

        let mut saved = Vec::new();
        for (stream, target) in targets {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }

            let file = match stream {
                StdStream::Stdin => fs::OpenOptions::new()
                    .read(true)
                    .create(true)
                    .write(true)
                    .open(target)?,
                _ => fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(target)?,
            };

            let fd = stream.fd();
            let target_fd = file.into_raw_fd();
            let backup = unsafe { libc::dup(fd) };
            if backup < 0 || unsafe { libc::dup2(target_fd, fd) } < 0 {
                unsafe { libc::close(target_fd) };
                return Err(std::io::Error::last_os_error().into());
            }
            unsafe { libc::close(target_fd) };
            saved.push((fd, backup));
        }

        Ok(Self { saved })
    }

    #[cfg(not(unix))]
    pub fn new(_targets: &BTreeMap<StdStream, PathBuf>) -> Result<Self> {
        Ok(Self {})
    }
}

impl Drop for RedirectGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        for (fd, backup) in self.saved.drain(..) {
            unsafe {
                libc::dup2(backup, fd);
                libc::close(backup);
            }
        }
    }
}

/// Equivalent path for a stream file inside another checkout root.
pub fn equivalent_path(original_root: &Path, new_root: &Path, stream_file: &Path) -> Option<PathBuf> {
    stream_file
        .strip_prefix(original_root)
        .ok()
        .map(|relative| new_root.join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_streams_match_regular_candidates_under_test_harness() {
        // The test harness captures output in pipes, so no candidate file can
        // share identity with a standard stream.
        let dir = tempfile::tempdir().unwrap();
        let candidate = dir.path().join("out.txt");
        fs::write(&candidate, "x").unwrap();

        let mapped = mapped_std_streams(&[candidate]);
        assert!(mapped.is_empty());
    }

    #[test]
    fn equivalent_path_rebases_into_new_root() {
        let mapped = equivalent_path(
            Path::new("/repo"),
            Path::new("/tmp/worktree"),
            Path::new("/repo/logs/out.txt"),
        );
        assert_eq!(mapped, Some(PathBuf::from("/tmp/worktree/logs/out.txt")));

        let outside = equivalent_path(
            Path::new("/repo"),
            Path::new("/tmp/worktree"),
            Path::new("/elsewhere/out.txt"),
        );
        assert!(outside.is_none());
    }
}
