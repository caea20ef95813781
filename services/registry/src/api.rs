//! Service builder and request dispatch.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde_json::json;
use storage::Storage;

use crate::audit::{ArtifactAuditor, LogAuditor};
use crate::authz::{Authorizer, OpenAuthorizer};
use crate::blob::{BlobStore, StorageBlobStore};
use crate::routes::{self, Route};
use crate::store::ManifestStore;
use crate::{catalog, manifest, referrers, tags};

/// Shared handler state: the collaborators every request works against.
#[derive(Debug, Clone)]
pub(crate) struct RegistryState {
    pub(crate) blobs: Arc<dyn BlobStore>,
    pub(crate) manifests: Arc<dyn ManifestStore>,
    pub(crate) authz: Arc<dyn Authorizer>,
    pub(crate) audit: Arc<dyn ArtifactAuditor>,
}

/// Registry builder for configuring and creating the registry service.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    blobs: Option<Arc<dyn BlobStore>>,
    manifests: Option<Arc<dyn ManifestStore>>,
    authz: Option<Arc<dyn Authorizer>>,
    audit: Option<Arc<dyn ArtifactAuditor>>,
}

impl RegistryBuilder {
    /// Create a new registry builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve blobs from `storage`, scoped to `bucket`.
    pub fn storage(self, storage: Storage, bucket: impl Into<String>) -> Self {
        self.blobs(StorageBlobStore::new(storage, bucket))
    }

    /// Set the blob store backend.
    pub fn blobs(mut self, blobs: impl BlobStore + 'static) -> Self {
        self.blobs = Some(Arc::new(blobs));
        self
    }

    /// Set the manifest store backend.
    pub fn manifests(mut self, manifests: impl ManifestStore + 'static) -> Self {
        self.manifests = Some(Arc::new(manifests));
        self
    }

    /// Set the authorizer. Defaults to [`OpenAuthorizer`].
    pub fn authorizer(mut self, authz: impl Authorizer + 'static) -> Self {
        self.authz = Some(Arc::new(authz));
        self
    }

    /// Set the pull auditor. Defaults to [`LogAuditor`].
    pub fn auditor(mut self, audit: impl ArtifactAuditor + 'static) -> Self {
        self.audit = Some(Arc::new(audit));
        self
    }

    /// Build the registry service.
    ///
    /// Returns a Router that can be served with any tower-compatible server.
    pub fn build(self) -> Router {
        let state = RegistryState {
            blobs: self.blobs.expect("blob store must be configured"),
            manifests: self.manifests.expect("manifest store must be configured"),
            authz: self
                .authz
                .unwrap_or_else(|| Arc::new(OpenAuthorizer)),
            audit: self.audit.unwrap_or_else(|| Arc::new(LogAuditor)),
        };

        Router::new()
            .route("/v2/", get(api_version_check))
            .fallback(dispatch)
            .with_state(state)
    }
}

/// API version check endpoint.
///
/// Returns 200 OK to indicate the registry is available.
async fn api_version_check() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(json!({})))
}

/// Routes a request by path shape. Repository names span multiple segments,
/// so this cannot be a static route table.
async fn dispatch(State(state): State<RegistryState>, req: Request) -> Response {
    let result = match routes::classify(req.uri().path()) {
        Some(Route::Manifest { repo, target }) => manifest::handle(&state, req, repo, target).await,
        Some(Route::Tags { repo }) => tags::handle(&state, req, repo).await,
        Some(Route::Catalog) => catalog::handle(&state, req).await,
        Some(Route::Referrers { repo, target }) => {
            referrers::handle(&state, req, repo, target).await
        }
        // Blob endpoints are served elsewhere; nothing else lives under /v2/.
        None => return StatusCode::NOT_FOUND.into_response(),
    };

    result.unwrap_or_else(IntoResponse::into_response)
}
