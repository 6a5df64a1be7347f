//! Artifact storage port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ArtifactRef, RenderedArtifact};

/// Append-only storage for rendered report files, one slot per run.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist an artifact so that readers never observe a partial file.
    async fn put(
        &self,
        schedule_id: Uuid,
        run_id: Uuid,
        artifact: &RenderedArtifact,
    ) -> DomainResult<ArtifactRef>;

    /// Read an artifact back. `ArtifactNotFound` if it is gone.
    async fn get(&self, run_id: Uuid, artifact: &ArtifactRef) -> DomainResult<Vec<u8>>;
}
