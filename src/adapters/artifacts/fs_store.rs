//! Filesystem artifact store.
//!
//! Layout: `{root}/{schedule_id}/{run_id}/{filename}`. Files are written to a
//! hidden temp file in the same directory and renamed into place.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ArtifactRef, RenderedArtifact};
use crate::domain::ports::ArtifactStore;

#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a storage key under the root, refusing anything that escapes it.
    fn resolve(&self, key: &str) -> Option<PathBuf> {
        let relative = Path::new(key);
        let contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        (contained && !key.is_empty()).then(|| self.root.join(relative))
    }
}

fn storage_error(context: &str, err: std::io::Error) -> DomainError {
    DomainError::ArtifactStorage(format!("{context}: {err}"))
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(
        &self,
        schedule_id: Uuid,
        run_id: Uuid,
        artifact: &RenderedArtifact,
    ) -> DomainResult<ArtifactRef> {
        let key = format!("{schedule_id}/{run_id}/{}", artifact.filename);
        let Some(path) = self.resolve(&key) else {
            return Err(DomainError::ArtifactStorage(format!(
                "invalid artifact filename '{}'",
                artifact.filename
            )));
        };
        let dir = path
            .parent()
            .ok_or_else(|| DomainError::ArtifactStorage(format!("no parent directory for {key}")))?;

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| storage_error("create artifact directory", e))?;

        let tmp = dir.join(format!(".{}.tmp-{}", artifact.filename, Uuid::new_v4()));
        let written = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(&artifact.bytes).await?;
            file.sync_all().await?;
            tokio::fs::rename(&tmp, &path).await
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(storage_error("write artifact", e));
        }

        tracing::debug!(%schedule_id, %run_id, key = %key, bytes = artifact.bytes.len(), "Stored artifact");

        Ok(ArtifactRef {
            key,
            mime_type: artifact.mime_type.clone(),
            filename: artifact.filename.clone(),
        })
    }

    async fn get(&self, run_id: Uuid, artifact: &ArtifactRef) -> DomainResult<Vec<u8>> {
        let path = self
            .resolve(&artifact.key)
            .ok_or(DomainError::ArtifactNotFound(run_id))?;

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(DomainError::ArtifactNotFound(run_id)),
            Err(e) => Err(storage_error("read artifact", e)),
        }
    }
}
