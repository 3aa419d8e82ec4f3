//! Repository Storage Module
//!
//! The narrow storage capability the replication core consumes: check,
//! create and list repositories identified by `owner/name`.

mod fs;
mod memory;

pub use fs::FsStorage;
pub use memory::MemoryStorage;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Repository identifier in `owner/name` form
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoId {
    owner: String,
    name: String,
}

impl RepoId {
    /// Parse an `owner/name` string
    pub fn parse(value: &str) -> Result<Self> {
        let mut parts = value.split('/');
        let (owner, name) = match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) => (owner, name),
            _ => return Err(Error::InvalidRepoId(value.to_string())),
        };

        if !valid_segment(owner) || !valid_segment(name) {
            return Err(Error::InvalidRepoId(value.to_string()));
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.chars().any(|c| c == '\\' || c == '\0' || c.is_whitespace())
}

impl std::fmt::Display for RepoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl std::str::FromStr for RepoId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Storage capability for hosted repositories
#[async_trait::async_trait]
pub trait RepoStorage: Send + Sync {
    /// Check whether a repository exists
    async fn exists(&self, repo: &RepoId) -> Result<bool>;

    /// Create a repository; fails with `Error::RepoAlreadyExists` if present
    async fn create(&self, repo: &RepoId) -> Result<()>;

    /// List all repositories, sorted
    async fn list(&self) -> Result<Vec<RepoId>>;

    /// Create the repository unless it already exists.
    ///
    /// Returns `true` if this call performed the creation. Losing a
    /// creation race to a concurrent caller is not an error.
    async fn create_if_absent(&self, repo: &RepoId) -> Result<bool> {
        if self.exists(repo).await? {
            return Ok(false);
        }

        match self.create(repo).await {
            Ok(()) => Ok(true),
            Err(Error::RepoAlreadyExists(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repo_id() {
        let repo = RepoId::parse("alice/proj").unwrap();
        assert_eq!(repo.owner(), "alice");
        assert_eq!(repo.name(), "proj");
        assert_eq!(repo.to_string(), "alice/proj");
    }

    #[test]
    fn test_reject_malformed_repo_ids() {
        for bad in ["", "alice", "alice/", "/proj", "a/b/c", "../proj", "alice/..", "al ice/proj"] {
            assert!(
                matches!(RepoId::parse(bad), Err(Error::InvalidRepoId(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_create_if_absent_only_creates_once() {
        let storage = MemoryStorage::new();
        let repo = RepoId::parse("alice/proj").unwrap();

        assert!(storage.create_if_absent(&repo).await.unwrap());
        assert!(!storage.create_if_absent(&repo).await.unwrap());
        assert_eq!(storage.creates(), 1);
    }
}
