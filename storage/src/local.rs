use camino::{Utf8Path, Utf8PathBuf};
use tokio::io::AsyncWriteExt;

use storage_driver::{Driver, Metadata, Reader, StorageError, StorageErrorKind, Writer};

/// Storage driver backed by a local directory tree.
#[derive(Debug)]
pub struct LocalDriver {
    root: Utf8PathBuf,
}

impl LocalDriver {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, bucket: &str, remote: &Utf8Path) -> Utf8PathBuf {
        self.root.join(bucket).join(remote)
    }
}

#[async_trait::async_trait]
impl Driver for LocalDriver {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn metadata(&self, bucket: &str, remote: &Utf8Path) -> Result<Metadata, StorageError> {
        let local = self.path(bucket, remote);
        let metadata = tokio::fs::metadata(&local)
            .await
            .map_err(|err| StorageError::io(self.name(), err).path(remote.as_str()))?;

        // Birth time is not available on every filesystem.
        let created = metadata
            .created()
            .or_else(|_| metadata.modified())
            .map_err(|err| StorageError::io(self.name(), err).path(remote.as_str()))?;

        Ok(Metadata {
            size: metadata.len(),
            created: created.into(),
        })
    }

    async fn upload(
        &self,
        bucket: &str,
        remote: &Utf8Path,
        local: &mut Reader<'_>,
    ) -> Result<(), StorageError> {
        let remote_path = self.path(bucket, remote);

        if let Some(parent) = remote_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| StorageError::io(self.name(), err).path(remote.as_str()))?;
        }

        let mut writer = tokio::io::BufWriter::new(
            tokio::fs::File::create(&remote_path)
                .await
                .map_err(|err| StorageError::io(self.name(), err).path(remote.as_str()))?,
        );

        tokio::io::copy(local, &mut writer)
            .await
            .map_err(|err| StorageError::io(self.name(), err).path(remote.as_str()))?;

        writer
            .shutdown()
            .await
            .map_err(|err| StorageError::io(self.name(), err).path(remote.as_str()))?;
        Ok(())
    }

    async fn download(
        &self,
        bucket: &str,
        remote: &Utf8Path,
        local: &mut Writer<'_>,
    ) -> Result<(), StorageError> {
        let remote_path = self.path(bucket, remote);

        let mut reader = tokio::io::BufReader::new(
            tokio::fs::File::open(&remote_path)
                .await
                .map_err(|err| StorageError::io(self.name(), err).path(remote.as_str()))?,
        );

        tokio::io::copy(&mut reader, local)
            .await
            .map_err(|err| StorageError::io(self.name(), err).path(remote.as_str()))?;

        local
            .flush()
            .await
            .map_err(|err| StorageError::io(self.name(), err).path(remote.as_str()))?;

        Ok(())
    }
}
