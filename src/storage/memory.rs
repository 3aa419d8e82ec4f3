//! In-memory repository storage

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use super::{RepoId, RepoStorage};
use crate::error::{Error, Result};

/// Volatile storage backend, used for tests and ephemeral nodes
#[derive(Default)]
pub struct MemoryStorage {
    repos: RwLock<BTreeSet<RepoId>>,
    creates: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful create mutations performed
    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RepoStorage for MemoryStorage {
    async fn exists(&self, repo: &RepoId) -> Result<bool> {
        Ok(self.repos.read().await.contains(repo))
    }

    async fn create(&self, repo: &RepoId) -> Result<()> {
        let mut repos = self.repos.write().await;
        if !repos.insert(repo.clone()) {
            return Err(Error::RepoAlreadyExists(repo.to_string()));
        }
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<RepoId>> {
        Ok(self.repos.read().await.iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_twice_fails() {
        let storage = MemoryStorage::new();
        let repo = RepoId::parse("bob/tools").unwrap();

        storage.create(&repo).await.unwrap();
        assert!(storage.exists(&repo).await.unwrap());
        assert!(matches!(
            storage.create(&repo).await,
            Err(Error::RepoAlreadyExists(_))
        ));
        assert_eq!(storage.creates(), 1);
    }
}
