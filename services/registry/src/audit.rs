//! Pull auditing.

use std::fmt;

use crate::error::BoxError;

/// Records successful pulls.
///
/// Audit failures are logged by callers and never surfaced to the client.
#[async_trait::async_trait]
pub trait ArtifactAuditor: fmt::Debug + Send + Sync {
    /// Record that `reference` was pulled from `repo`.
    async fn audit_pull(&self, repo: &str, reference: &str) -> Result<(), BoxError>;
}

/// Auditor that records pulls to the structured log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAuditor;

#[async_trait::async_trait]
impl ArtifactAuditor for LogAuditor {
    async fn audit_pull(&self, repo: &str, reference: &str) -> Result<(), BoxError> {
        tracing::info!(repo, reference, "artifact pulled");
        Ok(())
    }
}
