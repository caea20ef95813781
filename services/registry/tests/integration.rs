//! Integration tests for the OCI registry core.

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use bytes::Bytes;
use registry::oci::{media_type, Digest};
use registry::{
    ArtifactAuditor, BlobContent, BlobError, BlobStore, BoxError, MemoryManifestStore, OrgRole,
    PutBlobStore, RedirectDirective, RegistryBuilder, StatBlobStore, StaticAuthorizer,
    StorageBlobStore,
};
use serde_json::{json, Value};
use sha2::{Digest as _, Sha256};
use storage::MemoryStorage;
use tower::ServiceExt;

/// Helper to create a test registry
fn test_registry() -> Router {
    let storage = MemoryStorage::with_buckets(&["test-registry"]);
    RegistryBuilder::new()
        .storage(storage.into(), "test-registry")
        .manifests(MemoryManifestStore::new())
        .build()
}

fn digest_of(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}

/// A small but fully valid image manifest, unique per seed.
fn image_manifest(seed: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "schemaVersion": 2,
        "mediaType": media_type::OCI_MANIFEST,
        "config": {
            "mediaType": "application/vnd.oci.image.config.v1+json",
            "size": 7023,
            "digest": digest_of(format!("config-{seed}").as_bytes()),
        },
        "layers": [{
            "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip",
            "size": 32654,
            "digest": digest_of(format!("layer-{seed}").as_bytes()),
        }],
    }))
    .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

async fn get(app: &Router, uri: &str) -> Response {
    send(
        app,
        Request::builder().uri(uri).body(Body::empty()).unwrap(),
    )
    .await
}

async fn put_manifest(
    app: &Router,
    repo: &str,
    reference: &str,
    content_type: &str,
    body: Vec<u8>,
) -> Response {
    send(
        app,
        Request::builder()
            .method("PUT")
            .uri(format!("/v2/{repo}/manifests/{reference}"))
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap(),
    )
    .await
}

async fn body_bytes(response: Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn header_str<'r>(response: &'r Response, name: &str) -> &'r str {
    response
        .headers()
        .get(name)
        .unwrap_or_else(|| panic!("missing header {name}"))
        .to_str()
        .unwrap()
}

fn error_code(body: &Value) -> &str {
    body["errors"][0]["code"].as_str().unwrap()
}

#[tokio::test]
async fn test_api_version_check() {
    let app = test_registry();
    let response = get(&app, "/v2/").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unmatched_paths_are_not_found() {
    let app = test_registry();
    let response = get(&app, "/v2/acme/app/blobs/sha256:abc").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_push_then_pull_by_tag_and_digest() {
    let app = test_registry();
    let manifest = image_manifest("v1");
    let digest = digest_of(&manifest);

    let response = put_manifest(
        &app,
        "acme/app",
        "v1",
        media_type::OCI_MANIFEST,
        manifest.clone(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(header_str(&response, "docker-content-digest"), digest);
    assert_eq!(header_str(&response, "oci-subject"), digest);
    assert_eq!(
        header_str(&response, "location"),
        format!("/v2/acme/app/manifests/v1/{digest}")
    );

    for reference in ["v1", digest.as_str()] {
        let response = get(&app, &format!("/v2/acme/app/manifests/{reference}")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, "docker-content-digest"), digest);
        assert_eq!(
            header_str(&response, "content-type"),
            media_type::OCI_MANIFEST
        );
        assert_eq!(
            header_str(&response, "content-length"),
            manifest.len().to_string()
        );
        assert_eq!(&body_bytes(response).await[..], &manifest[..]);
    }
}

#[tokio::test]
async fn test_head_matches_get() {
    let app = test_registry();
    let manifest = image_manifest("head");
    let digest = digest_of(&manifest);
    put_manifest(
        &app,
        "acme/app",
        "v1",
        media_type::OCI_MANIFEST,
        manifest.clone(),
    )
    .await;

    let response = send(
        &app,
        Request::builder()
            .method("HEAD")
            .uri("/v2/acme/app/manifests/v1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "docker-content-digest"), digest);
    assert_eq!(
        header_str(&response, "content-type"),
        media_type::OCI_MANIFEST
    );
    assert_eq!(
        header_str(&response, "content-length"),
        manifest.len().to_string()
    );
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_pull_unknown_manifest() {
    let app = test_registry();
    put_manifest(
        &app,
        "acme/app",
        "v1",
        media_type::OCI_MANIFEST,
        image_manifest("v1"),
    )
    .await;

    let response = get(&app, "/v2/acme/app/manifests/does-not-exist").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body_json(response).await), "MANIFEST_UNKNOWN");
}

#[tokio::test]
async fn test_pull_unknown_repository() {
    let app = test_registry();
    let response = get(&app, "/v2/acme/ghost/manifests/v1").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body_json(response).await), "NAME_UNKNOWN");
}

#[tokio::test]
async fn test_tag_repoint_keeps_old_digest_addressable() {
    let app = test_registry();
    let first = image_manifest("first");
    let second = image_manifest("second");
    let first_digest = digest_of(&first);

    put_manifest(
        &app,
        "acme/app",
        "latest",
        media_type::OCI_MANIFEST,
        first.clone(),
    )
    .await;
    put_manifest(
        &app,
        "acme/app",
        "latest",
        media_type::OCI_MANIFEST,
        second.clone(),
    )
    .await;

    let response = get(&app, "/v2/acme/app/manifests/latest").await;
    assert_eq!(&body_bytes(response).await[..], &second[..]);

    let response = get(&app, &format!("/v2/acme/app/manifests/{first_digest}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(&body_bytes(response).await[..], &first[..]);
}

#[tokio::test]
async fn test_index_with_missing_child_is_rejected() {
    let app = test_registry();
    let missing = format!("sha256:{}", "a".repeat(64));
    let index = serde_json::to_vec(&json!({
        "schemaVersion": 2,
        "mediaType": media_type::OCI_INDEX,
        "manifests": [{
            "mediaType": media_type::OCI_MANIFEST,
            "size": 1234,
            "digest": missing,
        }],
    }))
    .unwrap();
    let index_digest = digest_of(&index);

    let response = put_manifest(&app, "acme/app", "multi", media_type::OCI_INDEX, index).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(error_code(&body), "MANIFEST_UNKNOWN");
    assert!(body["errors"][0]["message"]
        .as_str()
        .unwrap()
        .contains(&missing));

    // No partial state: the repository was never created.
    let response = get(&app, &format!("/v2/acme/app/manifests/{index_digest}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body_json(response).await), "NAME_UNKNOWN");
}

#[tokio::test]
async fn test_index_accepted_once_children_exist() {
    let app = test_registry();
    let child = image_manifest("child");
    let child_digest = digest_of(&child);
    put_manifest(&app, "acme/app", "child", media_type::OCI_MANIFEST, child).await;

    let index = serde_json::to_vec(&json!({
        "schemaVersion": 2,
        "mediaType": media_type::OCI_INDEX,
        "manifests": [{
            "mediaType": media_type::OCI_MANIFEST,
            "size": 1234,
            "digest": child_digest,
        }],
    }))
    .unwrap();

    let response = put_manifest(
        &app,
        "acme/app",
        "multi",
        media_type::OCI_INDEX,
        index.clone(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = get(&app, "/v2/acme/app/manifests/multi").await;
    assert_eq!(&body_bytes(response).await[..], &index[..]);
}

#[tokio::test]
async fn test_rejects_manifest_with_blobs_entry() {
    let app = test_registry();
    let body = serde_json::to_vec(&json!({
        "schemaVersion": 2,
        "blobs": [{
            "mediaType": "application/octet-stream",
            "size": 3,
            "digest": digest_of(b"payload"),
        }],
    }))
    .unwrap();

    for content_type in [media_type::OCI_MANIFEST, "application/vnd.example.artifact"] {
        let response = put_manifest(&app, "acme/app", "bad", content_type, body.clone()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_code(&body_json(response).await), "MANIFEST_INVALID");
    }
}

#[tokio::test]
async fn test_list_tags_with_pagination() {
    let app = test_registry();
    for tag in ["v1", "v2", "v3", "v4"] {
        put_manifest(
            &app,
            "acme/app",
            tag,
            media_type::OCI_MANIFEST,
            image_manifest(tag),
        )
        .await;
    }

    let response = get(&app, "/v2/acme/app/tags/list?n=2").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["name"], "acme/app");
    assert_eq!(body["tags"], json!(["v1", "v2"]));

    let response = get(&app, "/v2/acme/app/tags/list?n=2&last=v2").await;
    let body = body_json(response).await;
    assert_eq!(body["tags"], json!(["v3", "v4"]));

    let response = get(&app, "/v2/acme/app/tags/list").await;
    let body = body_json(response).await;
    assert_eq!(body["tags"], json!(["v1", "v2", "v3", "v4"]));
}

#[tokio::test]
async fn test_list_tags_rejects_malformed_n() {
    let app = test_registry();
    put_manifest(
        &app,
        "acme/app",
        "v1",
        media_type::OCI_MANIFEST,
        image_manifest("v1"),
    )
    .await;

    let response = get(&app, "/v2/acme/app/tags/list?n=bogus").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body_json(response).await), "BAD_REQUEST");
}

#[tokio::test]
async fn test_list_tags_unknown_repository() {
    let app = test_registry();
    let response = get(&app, "/v2/acme/ghost/tags/list").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body_json(response).await), "NAME_UNKNOWN");
}

#[tokio::test]
async fn test_catalog() {
    let app = test_registry();
    put_manifest(
        &app,
        "acme/app",
        "v1",
        media_type::OCI_MANIFEST,
        image_manifest("app"),
    )
    .await;
    put_manifest(
        &app,
        "acme/lib",
        "v1",
        media_type::OCI_MANIFEST,
        image_manifest("lib"),
    )
    .await;

    let response = get(&app, "/v2/_catalog").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["repositories"], json!(["acme/app", "acme/lib"]));

    let response = get(&app, "/v2/_catalog?n=1").await;
    let body = body_json(response).await;
    assert_eq!(body["repositories"], json!(["acme/app"]));

    // A malformed n silently degrades to an empty page.
    let response = get(&app, "/v2/_catalog?n=bogus").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["repositories"], json!([]));
}

#[tokio::test]
async fn test_referrers() {
    let app = test_registry();
    let parent_digest = digest_of(b"parent-manifest");

    let referrer = serde_json::to_vec(&json!({
        "schemaVersion": 2,
        "mediaType": media_type::OCI_MANIFEST,
        "config": {
            "mediaType": "application/vnd.example.sbom",
            "size": 123,
            "digest": digest_of(b"sbom-config"),
        },
        "layers": [],
        "subject": {
            "mediaType": media_type::OCI_MANIFEST,
            "size": 7,
            "digest": parent_digest,
        },
    }))
    .unwrap();
    let referrer_digest = digest_of(&referrer);

    put_manifest(
        &app,
        "acme/app",
        "sbom",
        media_type::OCI_MANIFEST,
        referrer.clone(),
    )
    .await;
    // A manifest without a subject must not show up in the index.
    put_manifest(
        &app,
        "acme/app",
        "plain",
        media_type::OCI_MANIFEST,
        image_manifest("plain"),
    )
    .await;

    let response = get(&app, &format!("/v2/acme/app/referrers/{parent_digest}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header_str(&response, "content-type"),
        media_type::OCI_INDEX
    );

    let body = body_json(response).await;
    assert_eq!(body["schemaVersion"], 2);
    assert_eq!(body["mediaType"], media_type::OCI_INDEX);

    let manifests = body["manifests"].as_array().unwrap();
    assert_eq!(manifests.len(), 1);
    assert_eq!(manifests[0]["digest"], referrer_digest);
    assert_eq!(manifests[0]["mediaType"], media_type::OCI_MANIFEST);
    assert_eq!(manifests[0]["size"], referrer.len());
    assert_eq!(manifests[0]["artifactType"], "application/vnd.example.sbom");
}

#[tokio::test]
async fn test_referrers_empty_for_unreferenced_digest() {
    let app = test_registry();
    put_manifest(
        &app,
        "acme/app",
        "v1",
        media_type::OCI_MANIFEST,
        image_manifest("v1"),
    )
    .await;

    let unreferenced = digest_of(b"nobody points here");
    let response = get(&app, &format!("/v2/acme/app/referrers/{unreferenced}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["manifests"], json!([]));
}

#[tokio::test]
async fn test_referrers_rejects_invalid_digest() {
    let app = test_registry();
    put_manifest(
        &app,
        "acme/app",
        "v1",
        media_type::OCI_MANIFEST,
        image_manifest("v1"),
    )
    .await;

    let response = get(&app, "/v2/acme/app/referrers/not-a-digest").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body_json(response).await), "UNSUPPORTED");
}

#[tokio::test]
async fn test_method_gating() {
    let app = test_registry();
    put_manifest(
        &app,
        "acme/app",
        "v1",
        media_type::OCI_MANIFEST,
        image_manifest("v1"),
    )
    .await;

    let cases = [
        ("DELETE", "/v2/acme/app/manifests/v1"),
        ("POST", "/v2/acme/app/manifests/v1"),
        ("POST", "/v2/acme/app/tags/list"),
        ("PUT", "/v2/_catalog"),
        (
            "POST",
            "/v2/acme/app/referrers/sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        ),
    ];

    for (method, uri) in cases {
        let response = send(
            &app,
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(
            response.status(),
            StatusCode::METHOD_NOT_ALLOWED,
            "{method} {uri}"
        );
        assert_eq!(error_code(&body_json(response).await), "METHOD_UNKNOWN");
    }
}

fn authorized_registry(authorizer: StaticAuthorizer) -> Router {
    let storage = MemoryStorage::with_buckets(&["test-registry"]);
    RegistryBuilder::new()
        .storage(storage.into(), "test-registry")
        .manifests(MemoryManifestStore::new())
        .authorizer(authorizer)
        .build()
}

#[tokio::test]
async fn test_denied_without_membership() {
    let app = authorized_registry(StaticAuthorizer::new().grant("acme", OrgRole::Reader));

    let response = get(&app, "/v2/globex/app/manifests/v1").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body_json(response).await), "DENIED");
}

#[tokio::test]
async fn test_reader_cannot_push() {
    let app = authorized_registry(StaticAuthorizer::new().grant("acme", OrgRole::Reader));

    let response = put_manifest(
        &app,
        "acme/app",
        "v1",
        media_type::OCI_MANIFEST,
        image_manifest("v1"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body_json(response).await), "DENIED");
}

#[tokio::test]
async fn test_writer_can_push_and_pull() {
    let app = authorized_registry(StaticAuthorizer::new().grant("acme", OrgRole::Writer));

    let manifest = image_manifest("v1");
    let response = put_manifest(
        &app,
        "acme/app",
        "v1",
        media_type::OCI_MANIFEST,
        manifest.clone(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = get(&app, "/v2/acme/app/manifests/v1").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(&body_bytes(response).await[..], &manifest[..]);
}

#[tokio::test]
async fn test_malformed_artifact_name_is_rejected() {
    let app = test_registry();

    let response = get(&app, "/v2/ACME/app/manifests/v1").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body_json(response).await), "NAME_INVALID");

    // A bare name without an organization slug is invalid too.
    let response = get(&app, "/v2/app/manifests/v1").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body_json(response).await), "NAME_INVALID");
}

#[tokio::test]
async fn test_quota_exceeded_maps_to_denied() {
    let storage = MemoryStorage::with_buckets(&["test-registry"]);
    let app = RegistryBuilder::new()
        .storage(storage.into(), "test-registry")
        .manifests(MemoryManifestStore::with_manifest_limit(1))
        .build();

    let response = put_manifest(
        &app,
        "acme/app",
        "v1",
        media_type::OCI_MANIFEST,
        image_manifest("one"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = put_manifest(
        &app,
        "acme/app",
        "v2",
        media_type::OCI_MANIFEST,
        image_manifest("two"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(error_code(&body), "DENIED");
    assert!(body["errors"][0]["message"]
        .as_str()
        .unwrap()
        .contains("quota"));
}

/// Auditor that remembers every pull it was asked to record.
#[derive(Debug, Default, Clone)]
struct RecordingAuditor {
    pulls: Arc<Mutex<Vec<(String, String)>>>,
}

#[async_trait::async_trait]
impl ArtifactAuditor for RecordingAuditor {
    async fn audit_pull(&self, repo: &str, reference: &str) -> Result<(), BoxError> {
        self.pulls
            .lock()
            .unwrap()
            .push((repo.to_string(), reference.to_string()));
        Ok(())
    }
}

#[tokio::test]
async fn test_pulls_are_audited() {
    let auditor = RecordingAuditor::default();
    let storage = MemoryStorage::with_buckets(&["test-registry"]);
    let app = RegistryBuilder::new()
        .storage(storage.into(), "test-registry")
        .manifests(MemoryManifestStore::new())
        .auditor(auditor.clone())
        .build();

    put_manifest(
        &app,
        "acme/app",
        "v1",
        media_type::OCI_MANIFEST,
        image_manifest("v1"),
    )
    .await;
    assert!(auditor.pulls.lock().unwrap().is_empty());

    get(&app, "/v2/acme/app/manifests/v1").await;
    assert_eq!(
        auditor.pulls.lock().unwrap().as_slice(),
        &[("acme/app".to_string(), "v1".to_string())]
    );
}

/// Blob store that hands out redirects for reads, as a pre-signed-URL
/// backend would.
#[derive(Debug)]
struct RedirectingBlobStore {
    inner: StorageBlobStore,
}

#[async_trait::async_trait]
impl BlobStore for RedirectingBlobStore {
    async fn get(
        &self,
        repo: &str,
        digest: &Digest,
        allow_redirect: bool,
    ) -> Result<BlobContent, BlobError> {
        if allow_redirect {
            Ok(BlobContent::Redirect(RedirectDirective {
                location: format!("https://cdn.example.test/{digest}"),
                code: StatusCode::TEMPORARY_REDIRECT,
            }))
        } else {
            self.inner.get(repo, digest, allow_redirect).await
        }
    }

    fn as_stat(&self) -> Option<&dyn StatBlobStore> {
        self.inner.as_stat()
    }

    fn as_put(&self) -> Option<&dyn PutBlobStore> {
        self.inner.as_put()
    }
}

#[tokio::test]
async fn test_redirecting_blob_store_still_audits() {
    let auditor = RecordingAuditor::default();
    let storage = MemoryStorage::with_buckets(&["test-registry"]);
    let app = RegistryBuilder::new()
        .blobs(RedirectingBlobStore {
            inner: StorageBlobStore::new(storage.into(), "test-registry"),
        })
        .manifests(MemoryManifestStore::new())
        .auditor(auditor.clone())
        .build();

    let manifest = image_manifest("v1");
    let digest = digest_of(&manifest);
    put_manifest(&app, "acme/app", "v1", media_type::OCI_MANIFEST, manifest).await;

    let response = get(&app, "/v2/acme/app/manifests/v1").await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        header_str(&response, "location"),
        format!("https://cdn.example.test/{digest}")
    );
    assert_eq!(
        auditor.pulls.lock().unwrap().as_slice(),
        &[("acme/app".to_string(), "v1".to_string())]
    );
}
