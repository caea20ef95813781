//! Tag enumeration for a repository.

use axum::extract::{Query, Request};
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::api::RegistryState;
use crate::authz::Action;
use crate::error::{RegistryError, RegistryResult};

/// Page size when the client does not ask for one.
pub(crate) const DEFAULT_PAGE_SIZE: i64 = 10_000;

/// `n`/`last` query parameters, kept raw so each endpoint applies its own
/// parsing rules.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct Pagination {
    #[serde(default)]
    pub(crate) n: Option<String>,
    #[serde(default)]
    pub(crate) last: Option<String>,
}

/// Tag list response.
#[derive(Debug, Serialize)]
struct TagList {
    name: String,
    tags: Vec<String>,
}

pub(crate) async fn handle(
    state: &RegistryState,
    req: Request,
    repo: String,
) -> RegistryResult<Response> {
    if req.method() != Method::GET {
        return Err(RegistryError::MethodUnknown);
    }

    state.authz.authorize(&repo, Action::Read).await?;

    let query: Pagination = Query::try_from_uri(req.uri())
        .map(|Query(query)| query)
        .map_err(|err| RegistryError::BadRequest(err.to_string()))?;

    let n = match query.n.as_deref() {
        None | Some("") => DEFAULT_PAGE_SIZE,
        Some(raw) => raw
            .parse()
            .map_err(|err| RegistryError::BadRequest(format!("parsing n: {err}")))?,
    };
    let last = query.last.unwrap_or_default();

    let tags = state.manifests.list_tags(&repo, n, &last).await?;

    Ok(axum::Json(TagList { name: repo, tags }).into_response())
}
