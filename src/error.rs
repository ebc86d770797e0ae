//! Error taxonomy shared by resolvers, pipelines and storage engines
//!
//! Every failure maps onto one [`ErrorKind`]. The transport layer turns the
//! kind into a status code; that mapping lives outside this crate.

use std::fmt;

/// Stable error category exposed to the transport layer
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    Validation,
    Conflict,
    Transform,
    Storage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Transform => "transform",
            ErrorKind::Storage => "storage",
        };
        write!(f, "{}", name)
    }
}

/// Errors produced while resolving, mutating or paginating entities
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Target or related entity absent, or the relation link between them absent
    #[error("{schema} not found: {id}")]
    NotFound { schema: &'static str, id: String },

    /// Missing actor, wrong actor type, or a middleware hook rejection
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Input payload failed to decode or validate
    #[error("validation failed: {0}")]
    Validation(String),

    /// Constraint violation surfaced by the storage engine
    #[error("conflict: {0}")]
    Conflict(String),

    /// Output construction hit a broken invariant
    #[error("transform failed: {0}")]
    Transform(String),

    /// Opaque storage backend failure
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl Error {
    pub fn not_found(schema: &'static str, id: impl fmt::Display) -> Self {
        Error::NotFound {
            schema,
            id: id.to_string(),
        }
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Error::Unauthorized(reason.into())
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        Error::Validation(reason.into())
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        Error::Conflict(reason.into())
    }

    pub fn transform(reason: impl Into<String>) -> Self {
        Error::Transform(reason.into())
    }

    /// Stable category for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Unauthorized(_) => ErrorKind::Unauthorized,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Transform(_) => ErrorKind::Transform,
            Error::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Storage(anyhow::Error::new(err).context("row (de)serialization failed"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
