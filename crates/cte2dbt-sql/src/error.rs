//! Decomposition error types

/// Error returned by an injected naming or rendering callback
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while decomposing and rewriting a query
///
/// None of these are recoverable: a decomposition either completes or the
/// caller receives the error, and a provider that failed must not be reused.
#[derive(Debug, thiserror::Error)]
pub enum DecomposeError {
    /// The query tree is missing an expected shape
    #[error("Malformed query: {0}")]
    MalformedInput(String),

    /// A table name with more parts than catalog.database.table
    #[error("Unsupported table name '{0}': expected at most catalog.database.table")]
    UnsupportedTableName(String),

    /// Two CTEs of the same WITH-clause share a name
    #[error("Duplicate CTE name: {0}")]
    DuplicateCte(String),

    /// A reference classified as local has no registered unit id
    #[error("Internal error: local unit '{0}' is not registered")]
    UnknownLocalUnit(String),

    /// A naming or rendering callback failed
    #[error("Callback failed: {0}")]
    Callback(#[source] CallbackError),

    /// The provider already failed once
    #[error("Provider cannot be reused after a failed decomposition")]
    ProviderPoisoned,
}

pub type Result<T, E = DecomposeError> = std::result::Result<T, E>;
