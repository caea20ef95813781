//! Manifest pull and push.

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderName, Method, StatusCode};
use axum::response::Response;
use tokio::io::AsyncReadExt;

use crate::api::RegistryState;
use crate::authz::Action;
use crate::blob::BlobContent;
use crate::error::{RegistryError, RegistryResult};
use crate::oci::{media_type, Digest, ImageManifest, IndexManifest};
use crate::store::{BlobRef, ManifestRecord};

/// Manifest bodies are buffered whole; anything larger than this is not a
/// manifest.
const MANIFEST_SIZE_LIMIT: usize = 4 * 1024 * 1024;

const DOCKER_CONTENT_DIGEST: HeaderName = HeaderName::from_static("docker-content-digest");
const OCI_SUBJECT: HeaderName = HeaderName::from_static("oci-subject");

/// Entry point for `…/manifests/<reference>`, dispatching on method.
///
/// Manifest deletion is deliberately not served.
pub(crate) async fn handle(
    state: &RegistryState,
    req: Request,
    repo: String,
    target: String,
) -> RegistryResult<Response> {
    let method = req.method().clone();

    if method == Method::GET {
        state
            .authz
            .authorize_reference(&repo, &target, Action::Read)
            .await?;
        handle_get(state, &repo, &target).await
    } else if method == Method::HEAD {
        state
            .authz
            .authorize_reference(&repo, &target, Action::Stat)
            .await?;
        handle_head(state, &repo, &target).await
    } else if method == Method::PUT {
        state
            .authz
            .authorize_reference(&repo, &target, Action::Write)
            .await?;
        handle_put(state, req, &repo, &target).await
    } else {
        Err(RegistryError::MethodUnknown)
    }
}

async fn handle_get(state: &RegistryState, repo: &str, target: &str) -> RegistryResult<Response> {
    let manifest = state.manifests.get(repo, target).await?;

    let content = state
        .blobs
        .get(repo, &manifest.blob.digest, true)
        .await
        // TODO: distinguish backend failures from missing blobs
        .map_err(|_| RegistryError::ManifestUnknown)?;

    match content {
        BlobContent::Redirect(redirect) => {
            audit_pull(state, repo, target).await;
            Response::builder()
                .status(redirect.code)
                .header(header::LOCATION, redirect.location)
                .body(Body::empty())
                .map_err(RegistryError::internal)
        }
        BlobContent::Reader(mut reader) => {
            let mut buf = Vec::new();
            reader
                .read_to_end(&mut buf)
                .await
                .map_err(RegistryError::internal)?;

            let response = Response::builder()
                .status(StatusCode::OK)
                .header(DOCKER_CONTENT_DIGEST, manifest.blob.digest.to_string())
                .header(header::CONTENT_TYPE, manifest.content_type.as_str())
                .header(header::CONTENT_LENGTH, buf.len().to_string())
                .body(Body::from(buf))
                .map_err(RegistryError::internal)?;

            audit_pull(state, repo, target).await;
            Ok(response)
        }
    }
}

async fn handle_head(state: &RegistryState, repo: &str, target: &str) -> RegistryResult<Response> {
    let manifest = state.manifests.get(repo, target).await?;

    let stat = state
        .blobs
        .as_stat()
        .ok_or_else(|| RegistryError::Internal("blob store cannot stat".to_string()))?;
    let size = stat
        .stat(repo, &manifest.blob.digest)
        .await
        .map_err(|_| RegistryError::ManifestUnknown)?;

    audit_pull(state, repo, target).await;

    Response::builder()
        .status(StatusCode::OK)
        .header(DOCKER_CONTENT_DIGEST, manifest.blob.digest.to_string())
        .header(header::CONTENT_TYPE, manifest.content_type.as_str())
        .header(header::CONTENT_LENGTH, size.to_string())
        .body(Body::empty())
        .map_err(RegistryError::internal)
}

async fn handle_put(
    state: &RegistryState,
    req: Request,
    repo: &str,
    target: &str,
) -> RegistryResult<Response> {
    let (parts, body) = req.into_parts();

    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let body = axum::body::to_bytes(body, MANIFEST_SIZE_LIMIT)
        .await
        .map_err(|err| RegistryError::ManifestInvalid(err.to_string()))?;

    let manifest_digest = Digest::sha256(&body);
    let record = ManifestRecord {
        content_type: content_type.clone(),
        blob: BlobRef {
            digest: manifest_digest.clone(),
            size: body.len() as i64,
        },
    };

    let deps = collect_dependencies(state, repo, &content_type, &body).await?;
    check_incompatible_manifest(&body)?;

    let put = state
        .blobs
        .as_put()
        .ok_or_else(|| RegistryError::Internal("blob store does not accept writes".to_string()))?;
    put.put(repo, &manifest_digest, &content_type, body.clone())
        .await
        .map_err(RegistryError::internal)?;

    // Future pulls may use the target (tag) or the immutable digest; both
    // are recorded in one transaction.
    let digest_reference = manifest_digest.to_string();
    state
        .manifests
        .put(repo, &[digest_reference.as_str(), target], &record, &deps)
        .await?;

    Response::builder()
        .status(StatusCode::CREATED)
        .header(DOCKER_CONTENT_DIGEST, digest_reference.as_str())
        .header(OCI_SUBJECT, digest_reference.as_str())
        .header(
            header::LOCATION,
            join_path(parts.uri.path(), &digest_reference),
        )
        .body(Body::empty())
        .map_err(RegistryError::internal)
}

/// Dependencies a manifest carries, collected for the manifest record.
///
/// An index may only be pushed once its constituent manifests are present.
/// The distribution spec does not strictly require this, but several
/// registries enforce it and clients rely on it.
async fn collect_dependencies(
    state: &RegistryState,
    repo: &str,
    content_type: &str,
    body: &[u8],
) -> RegistryResult<Vec<BlobRef>> {
    let mut deps = Vec::new();

    if media_type::is_index(content_type) {
        let index: IndexManifest = serde_json::from_slice(body)
            .map_err(|err| RegistryError::ManifestInvalid(err.to_string()))?;

        for descriptor in &index.manifests {
            if !media_type::is_distributable(&descriptor.media_type) {
                continue;
            }
            if media_type::is_index(&descriptor.media_type)
                || media_type::is_image(&descriptor.media_type)
            {
                let reference = descriptor.digest.to_string();
                if state.manifests.get(repo, &reference).await.is_err() {
                    return Err(RegistryError::SubManifestUnknown(descriptor.digest.clone()));
                }
                deps.push(BlobRef {
                    digest: descriptor.digest.clone(),
                    size: descriptor.size,
                });
            } else {
                // TODO: existence check for plain blob descriptors
                tracing::warn!(
                    digest = %descriptor.digest,
                    media_type = %descriptor.media_type,
                    "skipping existence check for non-manifest descriptor"
                );
            }
        }
    } else if media_type::is_image(content_type) {
        let manifest: ImageManifest = serde_json::from_slice(body)
            .map_err(|err| RegistryError::ManifestInvalid(err.to_string()))?;

        if let Some(config) = manifest.config {
            deps.push(BlobRef {
                digest: config.digest,
                size: config.size,
            });
        }
        if let Some(subject) = manifest.subject {
            deps.push(BlobRef {
                digest: subject.digest,
                size: subject.size,
            });
        }
        for layer in manifest.layers {
            if media_type::is_distributable(&layer.media_type) {
                deps.push(BlobRef {
                    digest: layer.digest,
                    size: layer.size,
                });
            }
        }
    }

    Ok(deps)
}

#[derive(serde::Deserialize)]
struct CompatibilityProbe {
    #[serde(default)]
    blobs: Option<Vec<serde_json::Value>>,
}

/// Rejects bodies carrying a top-level `blobs` array, which marks a
/// non-compliant artifact manifest.
fn check_incompatible_manifest(body: &[u8]) -> RegistryResult<()> {
    let probe: CompatibilityProbe = serde_json::from_slice(body)
        .map_err(|err| RegistryError::ManifestInvalid(err.to_string()))?;
    if probe.blobs.is_some_and(|blobs| !blobs.is_empty()) {
        return Err(RegistryError::ManifestInvalid(
            "non-compliant manifest with blobs entry detected".to_string(),
        ));
    }
    Ok(())
}

async fn audit_pull(state: &RegistryState, repo: &str, target: &str) {
    if let Err(err) = state.audit.audit_pull(repo, target).await {
        tracing::warn!(error = %err, repo, target, "failed to audit-log pull");
    }
}

fn join_path(base: &str, segment: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), segment)
}
