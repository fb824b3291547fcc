//! Error types for SQLContain operations.

use std::fmt;

/// The primary error type for all SQLContain operations.
#[derive(Debug)]
pub enum Error {
    /// Containment declaration errors (unknown alias, malformed shape)
    Contain(ContainError),
    /// Query execution errors raised by the execution collaborator
    Query(QueryError),
    /// Type conversion errors
    Type(TypeError),
    /// Schema lookup errors
    Schema(SchemaError),
    /// Configuration errors
    Config(ConfigError),
    /// Serialization/deserialization errors
    Serde(String),
    /// Custom error with message
    Custom(String),
}

/// A containment declaration that cannot be resolved.
///
/// Raised during normalization, before any query runs.
#[derive(Debug, Clone)]
pub struct ContainError {
    pub kind: ContainErrorKind,
    /// Alias of the repository the alias was looked up on.
    pub source_alias: String,
    /// The offending association alias (or option path).
    pub alias: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainErrorKind {
    /// The alias is not registered on the parent repository.
    UnknownAssociation,
    /// A nested value has the wrong shape.
    MalformedContainment,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// The collaborator failed to execute or fetch.
    Execution,
    /// A primary row lacked a key column needed by a deferred association.
    MissingKey,
    /// The query was cancelled by the collaborator.
    Cancelled,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct SchemaError {
    pub kind: SchemaErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    /// No repository is registered under the alias
    TableNotFound,
    /// Column not found
    ColumnNotFound,
    /// Invalid repository or association definition
    Invalid,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Build an `UnknownAssociation` error.
    pub fn unknown_association(source_alias: impl Into<String>, alias: impl Into<String>) -> Self {
        let source_alias = source_alias.into();
        let alias = alias.into();
        let message = format!("{} is not associated with {}", alias, source_alias);
        Error::Contain(ContainError {
            kind: ContainErrorKind::UnknownAssociation,
            source_alias,
            alias,
            message,
        })
    }

    /// Build a `MalformedContainment` error.
    pub fn malformed_containment(
        source_alias: impl Into<String>,
        alias: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Contain(ContainError {
            kind: ContainErrorKind::MalformedContainment,
            source_alias: source_alias.into(),
            alias: alias.into(),
            message: message.into(),
        })
    }

    /// Build a collaborator execution error.
    pub fn execution(message: impl Into<String>) -> Self {
        Error::Query(QueryError {
            kind: QueryErrorKind::Execution,
            message: message.into(),
            source: None,
        })
    }

    /// Build a `MissingKey` error for a row lacking a key column.
    pub fn missing_key(column: &str) -> Self {
        Error::Query(QueryError {
            kind: QueryErrorKind::MissingKey,
            message: format!("row has no value for key column '{}'", column),
            source: None,
        })
    }

    /// Build a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            message: message.into(),
            source: None,
        })
    }

    /// Build a `TableNotFound` schema error.
    pub fn table_not_found(alias: &str) -> Self {
        Error::Schema(SchemaError {
            kind: SchemaErrorKind::TableNotFound,
            message: format!("no table is registered under alias '{}'", alias),
            source: None,
        })
    }

    /// Build an `Invalid` schema error.
    pub fn invalid_definition(message: impl Into<String>) -> Self {
        Error::Schema(SchemaError {
            kind: SchemaErrorKind::Invalid,
            message: message.into(),
            source: None,
        })
    }

    /// Check whether this is an `UnknownAssociation` error.
    pub fn is_unknown_association(&self) -> bool {
        matches!(
            self,
            Error::Contain(ContainError {
                kind: ContainErrorKind::UnknownAssociation,
                ..
            })
        )
    }

    /// Check whether this is a `MalformedContainment` error.
    pub fn is_malformed_containment(&self) -> bool {
        matches!(
            self,
            Error::Contain(ContainError {
                kind: ContainErrorKind::MalformedContainment,
                ..
            })
        )
    }

    /// The containment error payload, if any.
    pub fn as_contain(&self) -> Option<&ContainError> {
        match self {
            Error::Contain(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Contain(e) => write!(f, "Containment error: {}", e),
            Error::Query(e) => write!(f, "Query error: {}", e.message),
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Schema(e) => write!(f, "Schema error: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Schema(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for ContainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ContainErrorKind::UnknownAssociation => write!(
                f,
                "unknown association '{}' on '{}': {}",
                self.alias, self.source_alias, self.message
            ),
            ContainErrorKind::MalformedContainment => write!(
                f,
                "malformed containment for '{}' under '{}': {}",
                self.alias, self.source_alias, self.message
            ),
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<ContainError> for Error {
    fn from(err: ContainError) -> Self {
        Error::Contain(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Self {
        Error::Schema(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

/// Result type alias for SQLContain operations.
pub type Result<T> = std::result::Result<T, Error>;
