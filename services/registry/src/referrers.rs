//! The referrers index: manifests whose `subject` points at a digest.

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, Method, StatusCode};
use axum::response::Response;
use serde::Deserialize;
use tokio::io::AsyncReadExt;

use crate::api::RegistryState;
use crate::authz::Action;
use crate::blob::BlobContent;
use crate::error::{RegistryError, RegistryResult};
use crate::oci::{media_type, Descriptor, Digest, IndexManifest};

/// Tolerant probe for the top-level `subject` field of a stored manifest.
#[derive(Deserialize)]
struct SubjectProbe {
    subject: Option<Descriptor>,
}

/// Tolerant probe for `config.mediaType`, which doubles as the artifact
/// type of a referrer.
#[derive(Default, Deserialize)]
struct ArtifactTypeProbe {
    #[serde(default)]
    config: ArtifactTypeConfig,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactTypeConfig {
    media_type: Option<String>,
}

/// The referrers relation is implicit: every manifest in the repository is
/// scanned for a `subject` naming the requested digest.
// TODO: honor the artifactType query-string filter
pub(crate) async fn handle(
    state: &RegistryState,
    req: Request,
    repo: String,
    target: String,
) -> RegistryResult<Response> {
    if req.method() != Method::GET {
        return Err(RegistryError::MethodUnknown);
    }

    state
        .authz
        .authorize_reference(&repo, &target, Action::Read)
        .await?;

    let target: Digest = target
        .parse()
        .map_err(|_| RegistryError::Unsupported("target must be a valid digest".to_string()))?;

    let digests = state.manifests.list_digests(&repo).await?;

    let mut index = IndexManifest {
        schema_version: 2,
        media_type: media_type::OCI_INDEX.to_string(),
        manifests: Vec::new(),
    };

    for digest in digests {
        let record = state
            .manifests
            .get(&repo, &digest.to_string())
            .await
            .map_err(RegistryError::internal)?;

        let content = state
            .blobs
            .get(&repo, &record.blob.digest, false)
            .await
            .map_err(|err| RegistryError::BlobUnavailable(err.to_string()))?;
        let BlobContent::Reader(mut reader) = content else {
            return Err(RegistryError::internal(
                "blob store redirected a non-redirectable read",
            ));
        };
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .await
            .map_err(RegistryError::internal)?;

        let subject = serde_json::from_slice::<SubjectProbe>(&buf)
            .ok()
            .and_then(|probe| probe.subject);
        let Some(subject) = subject else {
            continue;
        };
        if subject.digest != target {
            continue;
        }

        let artifact_type = serde_json::from_slice::<ArtifactTypeProbe>(&buf)
            .unwrap_or_default()
            .config
            .media_type;

        index.manifests.push(Descriptor {
            media_type: record.content_type,
            digest,
            size: buf.len() as i64,
            artifact_type,
        });
    }

    let body = serde_json::to_vec(&index).map_err(RegistryError::internal)?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, media_type::OCI_INDEX)
        .header(header::CONTENT_LENGTH, body.len().to_string())
        .body(Body::from(body))
        .map_err(RegistryError::internal)
}
