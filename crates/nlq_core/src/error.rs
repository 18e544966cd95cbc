//! Error types for the nlq translation core.
//!
//! Stage functions return `Result<_, NlqError>`. The converter and the query
//! executor are the only places where an error is turned into a failed result
//! object instead of being propagated.

use thiserror::Error;
use uuid::Uuid;

/// Main error type for the translation and execution core.
#[derive(Debug, Error)]
pub enum NlqError {
    /// Caller supplied unusable input (empty question, empty SQL).
    #[error("{message}")]
    Input {
        /// Human-readable error message.
        message: String,
    },

    /// No data source is registered under the requested id.
    #[error("Data source not found: {id}")]
    DataSourceNotFound {
        /// The id that failed to resolve.
        id: String,
    },

    /// Schema metadata could not be loaded for a data source.
    #[error("Schema unavailable: {message}")]
    SchemaUnavailable {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Database connection failed.
    #[error("Connection error: {message}")]
    Connection {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Statement execution error with PostgreSQL-specific details.
    #[error("{message}")]
    Query {
        /// Database error message.
        message: String,
        /// Server hint.
        hint: Option<String>,
        /// SQLSTATE code (e.g., "42P01").
        code: Option<String>,
    },

    /// Query was cancelled.
    #[error("Query cancelled")]
    QueryCancelled {
        /// ID of the cancelled query.
        query_id: Uuid,
    },

    /// Configuration error.
    #[error("Config error: {message}")]
    Config {
        /// Human-readable error message.
        message: String,
    },

    /// Unexpected internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl NlqError {
    // ========== Constructors ==========

    /// Create a new input error.
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input { message: message.into() }
    }

    /// Create a data source lookup error.
    pub fn data_source_not_found(id: impl Into<String>) -> Self {
        Self::DataSourceNotFound { id: id.into() }
    }

    /// Create a schema error.
    pub fn schema_unavailable(message: impl Into<String>) -> Self {
        Self::SchemaUnavailable { message: message.into(), source: None }
    }

    /// Create a schema error with source.
    pub fn schema_unavailable_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::SchemaUnavailable { message: message.into(), source: Some(Box::new(source)) }
    }

    /// Create a new connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Create a new connection error with source.
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Box::new(source)) }
    }

    /// Create a query error with only a message.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query { message: message.into(), hint: None, code: None }
    }

    /// Create a query cancelled error.
    pub fn query_cancelled(query_id: Uuid) -> Self {
        Self::QueryCancelled { query_id }
    }

    /// Create a new config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Create a new internal error with source.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal { message: message.into(), source: Some(Box::new(source)) }
    }

    // ========== Methods ==========

    /// Check if this error represents a cancelled query.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::QueryCancelled { .. })
    }

    /// Get the error category name.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Input { .. } => "Input",
            Self::DataSourceNotFound { .. } => "Resolution",
            Self::SchemaUnavailable { .. } => "Resolution",
            Self::Connection { .. } => "Connection",
            Self::Query { .. } => "Query",
            Self::QueryCancelled { .. } => "Query",
            Self::Config { .. } => "Config",
            Self::Internal { .. } => "Internal",
        }
    }

    /// Get actionable hint for the user.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Input { .. } => None,
            Self::DataSourceNotFound { .. } => Some("Register the data source before querying it"),
            Self::SchemaUnavailable { .. } => Some("Check that the data source is reachable"),
            Self::Connection { .. } => Some("Check that the database server is running"),
            Self::Query { hint, .. } => hint.as_deref(),
            Self::QueryCancelled { .. } => None,
            Self::Config { .. } => Some("Check the configuration file"),
            Self::Internal { .. } => Some("Please report this issue"),
        }
    }

    /// Get the SQLSTATE code (if applicable).
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Query { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

// ========== Error Conversions ==========

/// Convert from tokio_postgres::Error to NlqError.
impl From<tokio_postgres::Error> for NlqError {
    fn from(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let message = db_err.message().to_string();
            let hint = db_err.hint().map(String::from);
            let code_str = db_err.code().code();

            // 57014 is query_canceled; the executor decides whether that was ours
            if code_str.starts_with("08") || code_str.starts_with("28") {
                return NlqError::Connection { message, source: Some(Box::new(err)) };
            }
            return NlqError::Query { message, hint, code: Some(code_str.to_string()) };
        }

        if err.is_closed() {
            return NlqError::Connection {
                message: "Connection closed".to_string(),
                source: Some(Box::new(err)),
            };
        }

        NlqError::Connection { message: err.to_string(), source: Some(Box::new(err)) }
    }
}

/// Convert from deadpool pool errors to NlqError.
impl From<deadpool_postgres::PoolError> for NlqError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        NlqError::connection_with_source(format!("Failed to get connection: {err}"), err)
    }
}

/// Convert from std::io::Error to NlqError.
impl From<std::io::Error> for NlqError {
    fn from(err: std::io::Error) -> Self {
        NlqError::Config { message: format!("I/O error: {err}") }
    }
}

/// Convert from serde_json::Error to NlqError.
impl From<serde_json::Error> for NlqError {
    fn from(err: serde_json::Error) -> Self {
        NlqError::Config { message: format!("JSON error: {err}") }
    }
}

/// Result alias used throughout the crate.
pub type NlqResult<T> = Result<T, NlqError>;
