//! Manifest metadata storage.

use std::collections::BTreeMap;
use std::fmt;

use tokio::sync::RwLock;

use crate::error::BoxError;
use crate::oci::Digest;

/// Reference to stored blob bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRef {
    pub digest: Digest,
    pub size: i64,
}

/// Metadata record for a stored manifest. The manifest bytes themselves live
/// in the blob store under `blob.digest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRecord {
    pub content_type: String,
    pub blob: BlobRef,
}

/// Error raised by a [`ManifestStore`].
#[derive(Debug, thiserror::Error)]
pub enum ManifestStoreError {
    #[error("repository not known")]
    NameUnknown,

    #[error("manifest not known")]
    ManifestUnknown,

    #[error("quota exceeded")]
    QuotaExceeded,

    #[error(transparent)]
    Other(#[from] BoxError),
}

/// The authoritative `(repository, reference) -> manifest` mapping.
#[async_trait::async_trait]
pub trait ManifestStore: fmt::Debug + Send + Sync {
    /// Resolve a tag or digest reference to its manifest record.
    async fn get(&self, repo: &str, reference: &str) -> Result<ManifestRecord, ManifestStoreError>;

    /// Record `record` under every reference in `references`, together with
    /// the blobs the manifest depends on.
    ///
    /// All references must be recorded atomically: concurrent readers
    /// observe either none or all of them.
    async fn put(
        &self,
        repo: &str,
        references: &[&str],
        record: &ManifestRecord,
        deps: &[BlobRef],
    ) -> Result<(), ManifestStoreError>;

    /// Tags of `repo` in a deterministic order, resuming after `last` and
    /// returning at most `n` entries.
    async fn list_tags(
        &self,
        repo: &str,
        n: i64,
        last: &str,
    ) -> Result<Vec<String>, ManifestStoreError>;

    /// Every manifest digest recorded in `repo`.
    async fn list_digests(&self, repo: &str) -> Result<Vec<Digest>, ManifestStoreError>;

    /// Repository names, at most `n` of them.
    async fn list_repositories(&self, n: i64) -> Result<Vec<String>, ManifestStoreError>;
}

#[derive(Debug, Clone)]
struct StoredManifest {
    record: ManifestRecord,
    deps: Vec<BlobRef>,
}

/// In-process manifest store.
///
/// References are kept ordered, so tag pagination is deterministic. An
/// optional per-repository manifest quota exercises the quota path without a
/// real database behind it.
#[derive(Debug, Default)]
pub struct MemoryManifestStore {
    repos: RwLock<BTreeMap<String, BTreeMap<String, StoredManifest>>>,
    manifest_limit: Option<usize>,
}

impl MemoryManifestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the number of distinct manifests each repository may hold.
    pub fn with_manifest_limit(limit: usize) -> Self {
        Self {
            manifest_limit: Some(limit),
            ..Self::default()
        }
    }

    /// Blob dependencies recorded with a manifest, if it exists.
    pub async fn dependencies(&self, repo: &str, reference: &str) -> Option<Vec<BlobRef>> {
        let repos = self.repos.read().await;
        Some(repos.get(repo)?.get(reference)?.deps.clone())
    }
}

fn is_digest(reference: &str) -> bool {
    reference.parse::<Digest>().is_ok()
}

#[async_trait::async_trait]
impl ManifestStore for MemoryManifestStore {
    async fn get(&self, repo: &str, reference: &str) -> Result<ManifestRecord, ManifestStoreError> {
        let repos = self.repos.read().await;
        let records = repos.get(repo).ok_or(ManifestStoreError::NameUnknown)?;
        let stored = records
            .get(reference)
            .ok_or(ManifestStoreError::ManifestUnknown)?;
        Ok(stored.record.clone())
    }

    async fn put(
        &self,
        repo: &str,
        references: &[&str],
        record: &ManifestRecord,
        deps: &[BlobRef],
    ) -> Result<(), ManifestStoreError> {
        let mut repos = self.repos.write().await;
        let records = repos.entry(repo.to_string()).or_default();

        if let Some(limit) = self.manifest_limit {
            let stored = records.keys().filter(|key| is_digest(key)).count();
            let is_new = !records.contains_key(&record.blob.digest.to_string());
            if is_new && stored >= limit {
                return Err(ManifestStoreError::QuotaExceeded);
            }
        }

        for reference in references {
            records.insert(
                reference.to_string(),
                StoredManifest {
                    record: record.clone(),
                    deps: deps.to_vec(),
                },
            );
        }
        Ok(())
    }

    async fn list_tags(
        &self,
        repo: &str,
        n: i64,
        last: &str,
    ) -> Result<Vec<String>, ManifestStoreError> {
        let repos = self.repos.read().await;
        let records = repos.get(repo).ok_or(ManifestStoreError::NameUnknown)?;
        let n = usize::try_from(n).unwrap_or(0);

        Ok(records
            .keys()
            .filter(|reference| !is_digest(reference))
            .filter(|tag| last.is_empty() || tag.as_str() > last)
            .take(n)
            .cloned()
            .collect())
    }

    async fn list_digests(&self, repo: &str) -> Result<Vec<Digest>, ManifestStoreError> {
        let repos = self.repos.read().await;
        let records = repos.get(repo).ok_or(ManifestStoreError::NameUnknown)?;
        Ok(records
            .keys()
            .filter_map(|reference| reference.parse().ok())
            .collect())
    }

    async fn list_repositories(&self, n: i64) -> Result<Vec<String>, ManifestStoreError> {
        let repos = self.repos.read().await;
        let n = usize::try_from(n).unwrap_or(0);
        Ok(repos.keys().take(n).cloned().collect())
    }
}
