#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use datum::project::Project;
use git2::{IndexAddOption, Oid, Repository, Signature};
use tempfile::TempDir;

pub struct TestRepo {
    dir: TempDir,
    repo: Repository,
}

impl TestRepo {
    pub fn init() -> Result<Self, git2::Error> {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let repo = Repository::init(dir.path())?;
        set_identity(&repo)?;
        Ok(Self { dir, repo })
    }

    /// A repository with one initial commit, ready for dataset work.
    pub fn with_initial_commit() -> Self {
        let test_repo = Self::init().expect("failed to init repo");
        test_repo
            .commit_file("README.md", "# Test\n", "Initial commit")
            .expect("failed to create initial commit");
        test_repo
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn project(&self) -> Project {
        Project::open(self.dir.path()).expect("failed to open project")
    }

    pub fn write_file(&self, rel_path: &str, contents: &str) -> std::io::Result<PathBuf> {
        let path = self.dir.path().join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn remove_file(&self, rel_path: &str) -> std::io::Result<()> {
        fs::remove_file(self.dir.path().join(rel_path))
    }

    pub fn commit_all(&self, message: &str) -> Result<Oid, git2::Error> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;

        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;
        let sig = Signature::now("datum-test", "datum-test@example.com")?;

        let parent = self
            .repo
            .head()
            .ok()
            .and_then(|head| head.target())
            .and_then(|oid| self.repo.find_commit(oid).ok());

        let oid = match parent {
            Some(parent) => self
                .repo
                .commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])?,
            None => self
                .repo
                .commit(Some("HEAD"), &sig, &sig, message, &tree, &[])?,
        };

        Ok(oid)
    }

    pub fn commit_file(
        &self,
        rel_path: &str,
        contents: &str,
        message: &str,
    ) -> Result<Oid, Box<dyn std::error::Error>> {
        self.write_file(rel_path, contents)?;
        Ok(self.commit_all(message)?)
    }

    pub fn head_commit(&self) -> Oid {
        self.repo.head().unwrap().target().unwrap()
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }
}

fn set_identity(repo: &Repository) -> Result<(), git2::Error> {
    let mut cfg = repo.config()?;
    cfg.set_str("user.name", "datum-test")?;
    cfg.set_str("user.email", "datum-test@example.com")?;
    Ok(())
}
