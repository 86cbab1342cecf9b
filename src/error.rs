use thiserror::Error;

use crate::postgres::BootstrapState;

/// Coarse classification of a [`StoreError`].
///
/// Callers branch on this instead of matching message text, e.g. to treat a
/// missing record differently from a failing database:
/// ```rust
/// use botkit_storage_postgres::prelude::*;
///
/// let err = StoreError::NotFound { table: "botkit_users", id: "U1".into() };
/// assert_eq!(err.kind(), ErrorKind::NotFound);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bootstrap or initial connection failed; every later operation fails too.
    Initialization,
    /// A statement failed during a normal operation.
    Query,
    /// `get` matched no row.
    NotFound,
    /// The document handed to `save` is not storable.
    InvalidDocument,
    /// A stored payload could not be encoded or decoded.
    Codec,
    /// Configuration could not be resolved.
    Config,
    /// The storage was already closed.
    Closed,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage initialization failed while {phase}: {message}")]
    Initialization {
        phase: BootstrapState,
        message: String,
    },

    #[error("Could not execute '{statement}'. Error: {source}")]
    Query {
        statement: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("Could not execute '{statement}'. Error: could not check out a pooled connection: {source}")]
    Checkout {
        statement: String,
        #[source]
        source: bb8::RunError<tokio_postgres::Error>,
    },

    #[error("no document with id '{id}' in {table}")]
    NotFound { table: &'static str, id: String },

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("JSON error while {context}: {source}")]
    Codec {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("table {table} stores json as {found} but storage is configured for {expected}")]
    SchemaMismatch {
        table: &'static str,
        expected: &'static str,
        found: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("storage is closed")]
    Closed,
}

impl StoreError {
    pub(crate) fn query(statement: &str, source: tokio_postgres::Error) -> Self {
        StoreError::Query {
            statement: statement.to_string(),
            source,
        }
    }

    pub(crate) fn checkout(statement: &str, source: bb8::RunError<tokio_postgres::Error>) -> Self {
        StoreError::Checkout {
            statement: statement.to_string(),
            source,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Initialization { .. } | StoreError::SchemaMismatch { .. } => {
                ErrorKind::Initialization
            }
            StoreError::Query { .. } | StoreError::Checkout { .. } => ErrorKind::Query,
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::InvalidDocument(_) => ErrorKind::InvalidDocument,
            StoreError::Codec { .. } => ErrorKind::Codec,
            StoreError::Config(_) => ErrorKind::Config,
            StoreError::Closed => ErrorKind::Closed,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}
