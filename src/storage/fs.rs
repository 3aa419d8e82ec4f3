//! Filesystem repository storage
//!
//! Each repository is a bare-repository skeleton at
//! `<root>/<owner>/<name>.git`. Object contents are never written here.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{RepoId, RepoStorage};
use crate::error::{Error, Result};

const REPO_SUFFIX: &str = ".git";
const DEFAULT_HEAD: &str = "ref: refs/heads/main\n";

/// Directory-backed storage
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Create a storage rooted at `root`, creating the directory if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// On-disk location of a repository
    pub fn repo_path(&self, repo: &RepoId) -> PathBuf {
        self.root
            .join(repo.owner())
            .join(format!("{}{}", repo.name(), REPO_SUFFIX))
    }
}

async fn is_dir(path: &Path) -> Result<bool> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(meta.is_dir()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[async_trait::async_trait]
impl RepoStorage for FsStorage {
    async fn exists(&self, repo: &RepoId) -> Result<bool> {
        is_dir(&self.repo_path(repo)).await
    }

    async fn create(&self, repo: &RepoId) -> Result<()> {
        let path = self.repo_path(repo);
        if let Some(owner_dir) = path.parent() {
            tokio::fs::create_dir_all(owner_dir).await?;
        }

        // Exactly one concurrent creator wins create_dir
        match tokio::fs::create_dir(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::RepoAlreadyExists(repo.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        tokio::fs::create_dir_all(path.join("refs").join("heads")).await?;
        tokio::fs::create_dir_all(path.join("refs").join("tags")).await?;
        tokio::fs::create_dir_all(path.join("objects")).await?;
        tokio::fs::write(path.join("HEAD"), DEFAULT_HEAD).await?;

        tracing::debug!("Created repository {} at {}", repo, path.display());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<RepoId>> {
        let mut repos = Vec::new();
        let mut owners = tokio::fs::read_dir(&self.root).await?;

        while let Some(owner) = owners.next_entry().await? {
            if !owner.file_type().await?.is_dir() {
                continue;
            }
            let owner_name = owner.file_name().to_string_lossy().into_owned();

            let mut entries = tokio::fs::read_dir(owner.path()).await?;
            while let Some(entry) = entries.next_entry().await? {
                if !entry.file_type().await?.is_dir() {
                    continue;
                }
                let file_name = entry.file_name().to_string_lossy().into_owned();
                let Some(name) = file_name.strip_suffix(REPO_SUFFIX) else {
                    continue;
                };
                match RepoId::parse(&format!("{}/{}", owner_name, name)) {
                    Ok(repo) => repos.push(repo),
                    Err(_) => tracing::debug!("Skipping unexpected entry {}", entry.path().display()),
                }
            }
        }

        repos.sort();
        Ok(repos)
    }
}
