//! Authorization of repository access.
//!
//! Repository names are rooted in an organization slug: the first path
//! segment under the API root identifies the owning tenant, the remaining
//! segments form the artifact name. Malformed names are rejected here,
//! before any I/O happens on their behalf.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::BoxError;

/// The verb a request needs on a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Stat,
    Write,
}

/// Error raised by an [`Authorizer`].
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// The principal may not perform this action.
    #[error("access denied")]
    AccessDenied,

    /// The repository name is not a valid artifact name.
    #[error("invalid artifact name")]
    InvalidArtifactName,

    /// The authorizer itself failed.
    #[error(transparent)]
    Other(#[from] BoxError),
}

/// Decides whether the current principal may act on a repository.
#[async_trait::async_trait]
pub trait Authorizer: fmt::Debug + Send + Sync {
    /// Authorize `action` against the repository as a whole.
    async fn authorize(&self, repo: &str, action: Action) -> Result<(), AuthzError>;

    /// Authorize `action` against a single reference within the repository.
    ///
    /// The default implementation ignores the reference and defers to
    /// [`Authorizer::authorize`].
    async fn authorize_reference(
        &self,
        repo: &str,
        reference: &str,
        action: Action,
    ) -> Result<(), AuthzError> {
        let _ = reference;
        self.authorize(repo, action).await
    }
}

static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+(?:[._-][a-z0-9]+)*(?:/[a-z0-9]+(?:[._-][a-z0-9]+)*)+$")
        .expect("artifact name pattern")
});

/// A repository name split into its owning organization and artifact name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactName<'a> {
    pub organization: &'a str,
    pub name: &'a str,
}

/// Splits `repo` into an organization slug and an artifact name.
///
/// A valid repository name is at least two slash-joined lowercase segments,
/// each of alphanumerics optionally separated by `.`, `_` or `-`.
pub fn parse_artifact_name(repo: &str) -> Result<ArtifactName<'_>, AuthzError> {
    let Some((organization, name)) = repo.split_once('/') else {
        return Err(AuthzError::InvalidArtifactName);
    };
    if !NAME_PATTERN.is_match(repo) {
        return Err(AuthzError::InvalidArtifactName);
    }
    Ok(ArtifactName { organization, name })
}

/// Authorizer that admits any action on any well-formed artifact name.
///
/// Suitable for single-tenant deployments and tests; multi-tenant
/// deployments provide an [`Authorizer`] wired to their account system.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenAuthorizer;

#[async_trait::async_trait]
impl Authorizer for OpenAuthorizer {
    async fn authorize(&self, repo: &str, _action: Action) -> Result<(), AuthzError> {
        parse_artifact_name(repo).map(|_| ())
    }
}

/// Role a principal holds within an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrgRole {
    /// May pull artifacts.
    Reader,
    /// May pull and push artifacts.
    Writer,
}

impl OrgRole {
    fn allows(self, action: Action) -> bool {
        match action {
            Action::Read | Action::Stat => true,
            Action::Write => self == OrgRole::Writer,
        }
    }
}

/// Authorizer backed by a fixed organization-to-role table, typically built
/// from the authenticated principal's memberships.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthorizer {
    grants: HashMap<String, OrgRole>,
}

impl StaticAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `role` on every repository owned by `organization`.
    pub fn grant(mut self, organization: impl Into<String>, role: OrgRole) -> Self {
        self.grants.insert(organization.into(), role);
        self
    }
}

#[async_trait::async_trait]
impl Authorizer for StaticAuthorizer {
    async fn authorize(&self, repo: &str, action: Action) -> Result<(), AuthzError> {
        let name = parse_artifact_name(repo)?;
        match self.grants.get(name.organization) {
            Some(role) if role.allows(action) => Ok(()),
            _ => Err(AuthzError::AccessDenied),
        }
    }
}
