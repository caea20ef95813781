//! Error types for the registry and the OCI error envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::authz::AuthzError;
use crate::oci::Digest;
use crate::store::ManifestStoreError;

/// Boxed error for collaborator seams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Error raised while serving a registry request, mapped onto the OCI
/// distribution error vocabulary on the wire.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The caller may not act on this repository.
    #[error("requested access to the resource is denied")]
    Denied,

    /// The write would push the owning organization past its quota.
    #[error("requested access to the resource is denied: quota exceeded")]
    QuotaExceeded,

    /// The artifact name does not follow the `<organization>/<name>` grammar.
    #[error("invalid artifact name")]
    NameInvalid,

    /// Repository not known to the registry.
    #[error("repository name not known to registry")]
    NameUnknown,

    /// Manifest not known to the registry.
    #[error("manifest unknown to registry")]
    ManifestUnknown,

    /// An index referenced a manifest that has not been pushed yet.
    #[error("sub-manifest {0} not found")]
    SubManifestUnknown(Digest),

    /// The manifest body could not be accepted.
    #[error("manifest invalid: {0}")]
    ManifestInvalid(String),

    /// The request shape is outside what the registry supports.
    #[error("{0}")]
    Unsupported(String),

    /// Unsupported HTTP method for this endpoint.
    #[error("method not supported for this endpoint")]
    MethodUnknown,

    /// A malformed request parameter.
    #[error("{0}")]
    BadRequest(String),

    /// A manifest's backing blob could not be read during a referrers scan.
    #[error("{0}")]
    BlobUnavailable(String),

    /// Anything the client cannot repair.
    #[error("{0}")]
    Internal(String),
}

impl RegistryError {
    /// Wraps an unexpected failure, keeping only its message for the wire.
    pub fn internal(err: impl std::fmt::Display) -> Self {
        RegistryError::Internal(err.to_string())
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            RegistryError::Denied | RegistryError::QuotaExceeded => StatusCode::FORBIDDEN,
            RegistryError::NameInvalid
            | RegistryError::ManifestInvalid(_)
            | RegistryError::Unsupported(_)
            | RegistryError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RegistryError::NameUnknown
            | RegistryError::ManifestUnknown
            | RegistryError::SubManifestUnknown(_)
            | RegistryError::BlobUnavailable(_) => StatusCode::NOT_FOUND,
            RegistryError::MethodUnknown => StatusCode::METHOD_NOT_ALLOWED,
            RegistryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the wire code for OCI error responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            RegistryError::Denied | RegistryError::QuotaExceeded => "DENIED",
            RegistryError::NameInvalid => "NAME_INVALID",
            RegistryError::NameUnknown => "NAME_UNKNOWN",
            RegistryError::ManifestUnknown | RegistryError::SubManifestUnknown(_) => {
                "MANIFEST_UNKNOWN"
            }
            RegistryError::ManifestInvalid(_) => "MANIFEST_INVALID",
            RegistryError::Unsupported(_) => "UNSUPPORTED",
            RegistryError::MethodUnknown => "METHOD_UNKNOWN",
            RegistryError::BadRequest(_) | RegistryError::BlobUnavailable(_) => "BAD_REQUEST",
            RegistryError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<AuthzError> for RegistryError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::AccessDenied => RegistryError::Denied,
            AuthzError::InvalidArtifactName => RegistryError::NameInvalid,
            AuthzError::Other(err) => RegistryError::internal(err),
        }
    }
}

impl From<ManifestStoreError> for RegistryError {
    fn from(err: ManifestStoreError) -> Self {
        match err {
            ManifestStoreError::NameUnknown => RegistryError::NameUnknown,
            ManifestStoreError::ManifestUnknown => RegistryError::ManifestUnknown,
            ManifestStoreError::QuotaExceeded => RegistryError::QuotaExceeded,
            ManifestStoreError::Other(err) => RegistryError::internal(err),
        }
    }
}

/// OCI error response format.
#[derive(Debug, serde::Serialize)]
struct ErrorResponse {
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, serde::Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        if let RegistryError::Internal(message) = &self {
            tracing::error!(%message, "internal error while serving registry request");
        }

        let status = self.status_code();
        let body = ErrorResponse {
            errors: vec![ErrorDetail {
                code: self.error_code(),
                message: self.to_string(),
            }],
        };

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_mapping() {
        let cases = [
            (RegistryError::Denied, StatusCode::FORBIDDEN, "DENIED"),
            (
                RegistryError::QuotaExceeded,
                StatusCode::FORBIDDEN,
                "DENIED",
            ),
            (
                RegistryError::NameInvalid,
                StatusCode::BAD_REQUEST,
                "NAME_INVALID",
            ),
            (
                RegistryError::NameUnknown,
                StatusCode::NOT_FOUND,
                "NAME_UNKNOWN",
            ),
            (
                RegistryError::ManifestUnknown,
                StatusCode::NOT_FOUND,
                "MANIFEST_UNKNOWN",
            ),
            (
                RegistryError::MethodUnknown,
                StatusCode::METHOD_NOT_ALLOWED,
                "METHOD_UNKNOWN",
            ),
            (
                RegistryError::Internal("boom".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
            ),
        ];

        for (err, status, code) in cases {
            assert_eq!(err.status_code(), status, "{err}");
            assert_eq!(err.error_code(), code, "{err}");
        }
    }

    #[test]
    fn quota_message_mentions_quota() {
        assert!(RegistryError::QuotaExceeded.to_string().contains("quota"));
    }

    #[test]
    fn envelope_shape() {
        let body = ErrorResponse {
            errors: vec![ErrorDetail {
                code: "MANIFEST_UNKNOWN",
                message: "manifest unknown to registry".to_string(),
            }],
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["errors"][0]["code"], "MANIFEST_UNKNOWN");
        assert!(value["errors"][0]["message"].is_string());
    }
}
