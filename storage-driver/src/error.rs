use std::error::Error as StdError;
use std::fmt;

/// Categorizes storage errors by their semantic meaning, independent of
/// the underlying storage backend implementation.
///
/// This enum helps callers understand what went wrong and how to respond,
/// without needing to inspect error messages or know backend-specific details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// The requested resource (file, object, bucket) was not found.
    NotFound,

    /// The caller lacks permission to perform the requested operation.
    PermissionDenied,

    /// The operation failed due to I/O errors (network, disk, etc.).
    Io,

    /// The request was invalid (bad parameters, malformed data, etc.).
    InvalidRequest,

    /// An unexpected or uncategorized error occurred.
    Other,
}

impl fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageErrorKind::NotFound => write!(f, "not found"),
            StorageErrorKind::PermissionDenied => write!(f, "permission denied"),
            StorageErrorKind::Io => write!(f, "I/O error"),
            StorageErrorKind::InvalidRequest => write!(f, "invalid request"),
            StorageErrorKind::Other => write!(f, "other error"),
        }
    }
}

/// Storage error with semantic categorization and operation context.
///
/// Carries the [`StorageErrorKind`], the name of the engine that produced the
/// error, the bucket and path involved where known, and the underlying error
/// chain.
#[derive(Debug)]
pub struct StorageError {
    kind: StorageErrorKind,
    engine: &'static str,
    bucket: Option<String>,
    path: Option<String>,
    source: Box<dyn StdError + Send + Sync + 'static>,
}

impl StorageError {
    /// Create a new storage error with the minimum required information.
    pub fn new<E>(engine: &'static str, kind: StorageErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        Self {
            kind,
            engine,
            bucket: None,
            path: None,
            source: error.into(),
        }
    }

    /// Wrap an I/O error, mapping well-known [`std::io::ErrorKind`]s onto
    /// their storage equivalents.
    pub fn io(engine: &'static str, err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => StorageErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => StorageErrorKind::PermissionDenied,
            _ => StorageErrorKind::Io,
        };
        Self::new(engine, kind, err)
    }

    /// Adapter for `map_err` when only the engine name is known.
    pub fn with<E>(engine: &'static str) -> impl FnOnce(E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        move |error| Self::new(engine, StorageErrorKind::Other, error)
    }

    /// Attach the bucket this error occurred in.
    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Attach the path this error occurred on.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// The semantic category of this error.
    pub fn kind(&self) -> StorageErrorKind {
        self.kind
    }

    /// Whether this error means the object or bucket does not exist.
    pub fn is_not_found(&self) -> bool {
        self.kind == StorageErrorKind::NotFound
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "storage error ({}, {})", self.engine, self.kind)?;
        if let Some(bucket) = &self.bucket {
            write!(f, " in bucket {bucket:?}")?;
        }
        if let Some(path) = &self.path {
            write!(f, " at {path:?}")?;
        }
        write!(f, ": {}", self.source)
    }
}

impl StdError for StorageError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.source.as_ref())
    }
}
