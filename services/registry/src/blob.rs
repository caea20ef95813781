//! Content-addressed blob access for the registry.

use std::fmt;

use axum::http::StatusCode;
use bytes::Bytes;
use camino::Utf8PathBuf;
use storage::{Storage, StorageError};
use tokio::io::AsyncRead;

use crate::error::BoxError;
use crate::oci::Digest;

/// Reader over blob contents.
pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

/// Instruction to satisfy a read by sending the client elsewhere, typically
/// to a pre-signed backend URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectDirective {
    pub location: String,
    pub code: StatusCode,
}

/// Outcome of a blob read: either the bytes themselves or a redirect the
/// handler must relay. Pull auditing happens on both branches.
pub enum BlobContent {
    Reader(BlobReader),
    Redirect(RedirectDirective),
}

impl std::fmt::Debug for BlobContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlobContent::Reader(_) => f.debug_tuple("Reader").field(&"<reader>").finish(),
            BlobContent::Redirect(r) => f.debug_tuple("Redirect").field(r).finish(),
        }
    }
}

/// Error raised by a [`BlobStore`].
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob {0} not found")]
    NotFound(Digest),

    #[error(transparent)]
    Other(#[from] BoxError),
}

/// Byte storage addressed by content digest.
///
/// Fetching is the only required capability. Stat and put support are probed
/// per request; route selection implies them at deploy time, so a missing
/// capability on a required operation is an internal error.
#[async_trait::async_trait]
pub trait BlobStore: fmt::Debug + Send + Sync {
    /// Fetch blob contents. With `allow_redirect`, the store may answer with
    /// a [`RedirectDirective`] instead of bytes.
    async fn get(
        &self,
        repo: &str,
        digest: &Digest,
        allow_redirect: bool,
    ) -> Result<BlobContent, BlobError>;

    /// Stat capability, if this store can report sizes without reading.
    fn as_stat(&self) -> Option<&dyn StatBlobStore> {
        None
    }

    /// Put capability, if this store accepts writes.
    fn as_put(&self) -> Option<&dyn PutBlobStore> {
        None
    }
}

/// Optional [`BlobStore`] capability: size lookup without reading contents.
#[async_trait::async_trait]
pub trait StatBlobStore: Send + Sync {
    /// Size in bytes of the stored blob.
    async fn stat(&self, repo: &str, digest: &Digest) -> Result<u64, BlobError>;
}

/// Optional [`BlobStore`] capability: accepting writes.
#[async_trait::async_trait]
pub trait PutBlobStore: Send + Sync {
    /// Store `data` under `digest`.
    async fn put(
        &self,
        repo: &str,
        digest: &Digest,
        content_type: &str,
        data: Bytes,
    ) -> Result<(), BlobError>;
}

/// Blob store over a [`storage::Storage`] backend.
///
/// Blobs are keyed per repository, so tenants never share physical blob
/// content.
#[derive(Debug, Clone)]
pub struct StorageBlobStore {
    storage: Storage,
    bucket: String,
}

impl StorageBlobStore {
    pub fn new(storage: Storage, bucket: impl Into<String>) -> Self {
        Self {
            storage,
            bucket: bucket.into(),
        }
    }

    fn blob_path(repo: &str, digest: &Digest) -> Utf8PathBuf {
        Utf8PathBuf::from(format!(
            "{}/blobs/{}/{}",
            repo,
            digest.algorithm(),
            digest.hex()
        ))
    }

    fn blob_error(digest: &Digest, err: StorageError) -> BlobError {
        if err.is_not_found() {
            BlobError::NotFound(digest.clone())
        } else {
            BlobError::Other(err.into())
        }
    }
}

#[async_trait::async_trait]
impl BlobStore for StorageBlobStore {
    async fn get(
        &self,
        repo: &str,
        digest: &Digest,
        _allow_redirect: bool,
    ) -> Result<BlobContent, BlobError> {
        let path = Self::blob_path(repo, digest);
        let mut data = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut data);

        self.storage
            .download(&self.bucket, &path, &mut cursor)
            .await
            .map_err(|err| Self::blob_error(digest, err))?;

        Ok(BlobContent::Reader(Box::new(std::io::Cursor::new(data))))
    }

    fn as_stat(&self) -> Option<&dyn StatBlobStore> {
        Some(self)
    }

    fn as_put(&self) -> Option<&dyn PutBlobStore> {
        Some(self)
    }
}

#[async_trait::async_trait]
impl StatBlobStore for StorageBlobStore {
    async fn stat(&self, repo: &str, digest: &Digest) -> Result<u64, BlobError> {
        let path = Self::blob_path(repo, digest);
        let metadata = self
            .storage
            .metadata(&self.bucket, &path)
            .await
            .map_err(|err| Self::blob_error(digest, err))?;
        Ok(metadata.size)
    }
}

#[async_trait::async_trait]
impl PutBlobStore for StorageBlobStore {
    async fn put(
        &self,
        repo: &str,
        digest: &Digest,
        _content_type: &str,
        data: Bytes,
    ) -> Result<(), BlobError> {
        let path = Self::blob_path(repo, digest);
        let mut reader: &[u8] = data.as_ref();
        self.storage
            .upload(&self.bucket, &path, &mut reader)
            .await
            .map_err(|err| Self::blob_error(digest, err))?;
        Ok(())
    }
}
