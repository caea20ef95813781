//! # OCI Distribution Registry core
//!
//! This crate implements the core of an OCI-compliant registry server
//! following the [OCI Distribution Specification](https://github.com/opencontainers/distribution-spec):
//! manifest push and pull, tag listing, the repository catalog, and the
//! referrers index.
//!
//! ## Features
//!
//! - Manifest operations (push, pull, stat) by tag or digest
//! - Index dependency checking on push
//! - Referrers index computed from stored `subject` descriptors
//! - Per-organization authorization derived from the repository name
//! - Pull auditing
//! - Pluggable blob storage via the `storage` crate
//! - Builder pattern for configuration
//!
//! ## Example
//!
//! ```no_run
//! use registry::{MemoryManifestStore, RegistryBuilder};
//! use storage::MemoryStorage;
//!
//! # fn example() {
//! let storage = MemoryStorage::with_buckets(&["registry"]);
//! let app = RegistryBuilder::new()
//!     .storage(storage.into(), "registry")
//!     .manifests(MemoryManifestStore::new())
//!     .build();
//!
//! // Serve `app` with axum or any tower-compatible server.
//! # }
//! ```
//!
//! Manifest deletion and blob endpoints are out of scope for this crate;
//! the router answers 404 for blob paths so a blob service can be mounted
//! alongside it.

mod api;
mod audit;
mod authz;
mod blob;
mod catalog;
mod error;
mod manifest;
pub mod oci;
mod referrers;
mod routes;
mod store;
mod tags;

pub use api::RegistryBuilder;
pub use audit::{ArtifactAuditor, LogAuditor};
pub use authz::{
    Action, ArtifactName, Authorizer, AuthzError, OpenAuthorizer, OrgRole, StaticAuthorizer,
    parse_artifact_name,
};
pub use blob::{
    BlobContent, BlobError, BlobReader, BlobStore, PutBlobStore, RedirectDirective, StatBlobStore,
    StorageBlobStore,
};
pub use error::{BoxError, RegistryError, RegistryResult};
pub use store::{
    BlobRef, ManifestRecord, ManifestStore, ManifestStoreError, MemoryManifestStore,
};
