//! Classification of the `/v2/` URL space.
//!
//! Repository names span an arbitrary number of path segments, so the
//! distribution API's shapes cannot be expressed as a static route table;
//! the dispatcher matches on path shape instead.

/// The handler family a request path belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Route {
    Manifest { repo: String, target: String },
    Tags { repo: String },
    Catalog,
    Referrers { repo: String, target: String },
}

/// Picks the handler for `path`, purely syntactically.
///
/// Returns `None` for paths this core does not serve, blob endpoints among
/// them. Whether the repository exists is not checked here.
pub(crate) fn classify(path: &str) -> Option<Route> {
    let elems: Vec<&str> = path.split('/').skip(1).collect();
    let len = elems.len();

    if len >= 4 && elems[len - 2] == "manifests" {
        return Some(Route::Manifest {
            repo: elems[1..len - 2].join("/"),
            target: elems[len - 1].to_string(),
        });
    }

    if len >= 4 && elems[len - 2] == "tags" {
        return Some(Route::Tags {
            repo: elems[1..len - 2].join("/"),
        });
    }

    if len >= 2 && elems[len - 1] == "_catalog" {
        return Some(Route::Catalog);
    }

    if len >= 4 && elems[len - 2] == "referrers" {
        return Some(Route::Referrers {
            repo: elems[1..len - 2].join("/"),
            target: elems[len - 1].to_string(),
        });
    }

    None
}
