//! Error types for rowmap.
//!
//! All fallible operations return [`OrmResult`]. Metadata problems surface as
//! [`InitError`], which is cached alongside the metadata it failed to build, so
//! a malformed type keeps failing with the same error on every use.

use thiserror::Error;

/// Metadata initialization failure for a mapped type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Cannot map `{type_name}`{}: {message}", field_suffix(.field))]
pub struct InitError {
    pub type_name: &'static str,
    pub field: Option<&'static str>,
    pub message: String,
}

fn field_suffix(field: &Option<&'static str>) -> String {
    field.map(|f| format!(".{f}")).unwrap_or_default()
}

impl InitError {
    /// Error about the type as a whole.
    pub fn new(type_name: &'static str, message: impl Into<String>) -> Self {
        Self {
            type_name,
            field: None,
            message: message.into(),
        }
    }

    /// Error tagged with the offending field.
    pub fn field(type_name: &'static str, field: &'static str, message: impl Into<String>) -> Self {
        Self {
            type_name,
            field: Some(field),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum OrmError {
    #[error(transparent)]
    Init(#[from] InitError),

    #[error("Binding failed{}: {message}", bind_location(.column, .field))]
    Bind {
        message: String,
        column: Option<String>,
        field: Option<String>,
    },

    #[error("No row in `{table}` matched {context}")]
    NotFound { table: String, context: String },

    #[error("Transaction error: {message}")]
    Transaction {
        message: String,
        #[source]
        source: Option<Box<OrmError>>,
    },

    #[error("Unauthorized: {reason}")]
    Unauthorized { reason: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Database error: {0}")]
    Driver(#[from] sqlx::Error),
}

fn bind_location(column: &Option<String>, field: &Option<String>) -> String {
    match (column, field) {
        (Some(c), Some(f)) => format!(" for column `{c}` (field `{f}`)"),
        (Some(c), None) => format!(" for column `{c}`"),
        (None, Some(f)) => format!(" for field `{f}`"),
        (None, None) => String::new(),
    }
}

impl OrmError {
    /// Create a binding error without column context.
    pub fn bind(message: impl Into<String>) -> Self {
        Self::Bind {
            message: message.into(),
            column: None,
            field: None,
        }
    }

    /// Create a binding error naming the column and field involved.
    pub fn bind_column(
        message: impl Into<String>,
        column: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self::Bind {
            message: message.into(),
            column: Some(column.into()),
            field: Some(field.into()),
        }
    }

    /// Create a not-found error.
    pub fn not_found(table: impl Into<String>, context: impl Into<String>) -> Self {
        Self::NotFound {
            table: table.into(),
            context: context.into(),
        }
    }

    /// Create a transaction error, optionally wrapping the failure that caused it.
    pub fn transaction(message: impl Into<String>, source: Option<OrmError>) -> Self {
        Self::Transaction {
            message: message.into(),
            source: source.map(Box::new),
        }
    }

    /// Create an authorization veto.
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized {
            reason: reason.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// True for the not-found outcome of id-qualified updates and deletes,
    /// including when it caused a transaction to roll back.
    pub fn is_not_found(&self) -> bool {
        matches!(self.root_cause(), Self::NotFound { .. })
    }

    /// Follow wrapped transaction failures down to the original error.
    pub fn root_cause(&self) -> &OrmError {
        let mut current = self;
        while let Self::Transaction {
            source: Some(inner),
            ..
        } = current
        {
            current = inner;
        }
        current
    }

    /// SQLSTATE reported by the database, if any.
    pub fn sql_state(&self) -> Option<String> {
        match self.root_cause() {
            Self::Driver(sqlx::Error::Database(db_err)) => db_err.code().map(|c| c.to_string()),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.root_cause(),
            Self::Driver(sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed)
        )
    }
}

/// Result type alias for ORM operations.
pub type OrmResult<T> = Result<T, OrmError>;
