//! Repository enumeration.

use axum::extract::{Query, Request};
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::api::RegistryState;
use crate::error::{RegistryError, RegistryResult};
use crate::tags::{DEFAULT_PAGE_SIZE, Pagination};

/// Catalog response.
#[derive(Debug, Serialize)]
struct Catalog {
    repositories: Vec<String>,
}

/// Repository listing is scoped by the store to what the caller may see, so
/// there is no per-repository authorization here.
pub(crate) async fn handle(state: &RegistryState, req: Request) -> RegistryResult<Response> {
    if req.method() != Method::GET {
        return Err(RegistryError::MethodUnknown);
    }

    let query: Pagination = Query::try_from_uri(req.uri())
        .map(|Query(query)| query)
        .unwrap_or_default();

    // A malformed n falls back to zero here where the tag lister rejects it.
    // Kept as is for wire compatibility.
    let n = match query.n.as_deref() {
        None | Some("") => DEFAULT_PAGE_SIZE,
        Some(raw) => raw.parse().unwrap_or(0),
    };

    let repositories = state.manifests.list_repositories(n).await?;

    Ok(axum::Json(Catalog { repositories }).into_response())
}
