//! Custom error types for MapPLUTO pipeline operations.
//!
//! Every stage of the pipeline reports failures through [`PlutoError`], whose
//! variants follow the run's error taxonomy: configuration, schema mismatch,
//! join key, backend, shoreline discovery and publishing. All of them are fatal
//! for the run; none are retried.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::schema::StorageType;

/// Main error type for MapPLUTO pipeline operations.
///
/// This is the root error type that encompasses all domain-specific errors.
/// It uses `#[error(transparent)]` to delegate display formatting to the
/// underlying error variants.
#[derive(Debug, Error)]
pub enum PlutoError {
    /// Missing or malformed configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Schema loading, reconciliation and typed append errors
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// No usable join key on the geometry source
    #[error(transparent)]
    JoinKey(#[from] JoinKeyError),

    /// Failures raised by the storage/geometry backend
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Shoreline source discovery errors
    #[error(transparent)]
    Shoreline(#[from] ShorelineError),

    /// Output curation errors
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// I/O errors (file read/write, path issues)
    #[error(transparent)]
    Io(#[from] IoError),
}

/// A position within a raw extract.
///
/// All indices are 1-based to align with what a person sees in a spreadsheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcePosition {
    /// Data record number (header excluded)
    pub record: Option<u64>,
    /// Field index within the record
    pub field: Option<u64>,
}

impl SourcePosition {
    /// Returns true when the position does not contain any location metadata.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.record.is_none() && self.field.is_none()
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();

        if let Some(record) = self.record {
            parts.push(format!("record {record}"));
        }
        if let Some(field) = self.field {
            parts.push(format!("field {field}"));
        }

        if parts.is_empty() {
            write!(f, "unknown position")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Configuration errors.
///
/// These abort the run before any store is touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Failed to read configuration '{path}': {source}")]
    Read {
        /// The configuration path
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML or has the wrong shape
    #[error("Failed to parse configuration '{path}': {message}")]
    Parse {
        /// The configuration path
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// Required key is missing
    #[error("Missing required configuration key: {key}")]
    MissingKey {
        /// The missing key, as `section.key`
        key: String,
    },

    /// Invalid option value
    #[error("Invalid {option} option: {message}")]
    InvalidOption {
        /// The option name
        option: String,
        /// Why it's invalid
        message: String,
    },

    /// A path template still contains a placeholder after substitution
    #[error("Unresolved placeholder '{placeholder}' in {key}")]
    UnresolvedPlaceholder {
        /// The configuration key holding the template
        key: String,
        /// The placeholder left behind
        placeholder: String,
    },
}

/// Schema errors.
///
/// Raised when the field schema cannot be loaded, when it disagrees with the
/// raw extract, or when a value does not parse under its declared storage type.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The schema resource is unreadable or malformed
    #[error("Failed to load schema from {source_name}: {message}")]
    Load {
        /// Where the schema came from (path or "embedded")
        source_name: String,
        /// Description of the problem
        message: String,
    },

    /// A field declares a storage type outside TEXT/SHORT/LONG/DOUBLE
    #[error("Field '{field}' declares unknown storage type '{declared}'")]
    UnknownStorageType {
        /// The logical field name
        field: String,
        /// The declared type keyword
        declared: String,
    },

    /// Two schema entries resolve to the same column name
    #[error("Field name '{field}' is declared more than once")]
    DuplicateField {
        /// The duplicated name
        field: String,
    },

    /// The raw extract header repeats a column
    #[error("Raw extract repeats column '{column}'")]
    DuplicateColumn {
        /// The duplicated column
        column: String,
    },

    /// A field required by the schema is absent from the raw extract
    #[error("Field '{field}' is declared in the schema but missing from the raw extract")]
    MissingField {
        /// The logical field name
        field: String,
    },

    /// A retained column has no schema entry and typed coercion was requested
    #[error("Field '{field}' has no schema entry; its storage type is unknown")]
    UnknownFieldType {
        /// The logical field name
        field: String,
    },

    /// A value does not parse under the destination storage type
    #[error("Value '{value}' in field '{field}' is not a valid {storage_type} at {position}")]
    Coercion {
        /// The destination column
        field: String,
        /// The destination storage type
        storage_type: StorageType,
        /// The offending raw value
        value: String,
        /// Where the value sits in the source rows
        position: SourcePosition,
    },

    /// An exact-mode append found differing schemas
    #[error("Cannot append into '{table}': {message}")]
    AppendMismatch {
        /// The destination table
        table: String,
        /// What differs
        message: String,
    },

    /// A non-nullable field received nulls
    #[error("Field '{field}' is not nullable but {count} row(s) are empty")]
    NullViolation {
        /// The destination column
        field: String,
        /// Number of null rows
        count: usize,
    },
}

/// Join key errors.
#[derive(Debug, Error)]
pub enum JoinKeyError {
    /// Neither a numeric nor a textual key field exists on the geometry source,
    /// or no geometry source could be found at all
    #[error("Nothing containing '{key}' found in '{layer}'")]
    NotFound {
        /// The key substring searched for
        key: String,
        /// The geometry source name
        layer: String,
    },

    /// The textual key could not be promoted to a double-precision key
    #[error("Key value '{value}' in '{field}' of '{layer}' cannot be cast to a double")]
    Uncastable {
        /// The geometry source name
        layer: String,
        /// The source key field
        field: String,
        /// The offending value
        value: String,
    },

    /// The attribute table has no column for the key
    #[error("Table '{table}' has no '{key}' column to join on")]
    MissingTableKey {
        /// The attribute table name
        table: String,
        /// The key column
        key: String,
    },
}

/// Errors raised by a [`GeometryStore`](crate::store::GeometryStore) backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The workspace does not exist
    #[error("Workspace '{path}' does not exist")]
    WorkspaceNotFound {
        /// The workspace path
        path: PathBuf,
    },

    /// No table or feature class with that name exists in the workspace
    #[error("'{name}' not found in workspace '{workspace}'")]
    NotFound {
        /// The workspace path
        workspace: PathBuf,
        /// The object name
        name: String,
    },

    /// An object with that name already exists
    #[error("'{name}' already exists in workspace '{workspace}'")]
    AlreadyExists {
        /// The workspace path
        workspace: PathBuf,
        /// The object name
        name: String,
    },

    /// The object exists but is of the other kind (table vs feature class)
    #[error("'{name}' is not a {expected}")]
    WrongKind {
        /// The object name
        name: String,
        /// The kind the caller asked for
        expected: &'static str,
    },

    /// A field with that name already exists on the object
    #[error("Field '{field}' already exists on '{name}'")]
    FieldExists {
        /// The object name
        name: String,
        /// The field name
        field: String,
    },

    /// A field required by the operation does not exist
    #[error("Field '{field}' does not exist on '{name}'")]
    FieldNotFound {
        /// The object name
        name: String,
        /// The field name
        field: String,
    },

    /// A unique index could not be built
    #[error("Cannot build unique index '{index}' on '{name}.{field}': duplicate value '{value}'")]
    DuplicateKey {
        /// The object name
        name: String,
        /// The indexed field
        field: String,
        /// The index name
        index: String,
        /// The first duplicated value
        value: String,
    },

    /// Underlying file system failure
    #[error("{operation} failed for '{path}': {source}")]
    Io {
        /// What the backend was doing
        operation: String,
        /// The path involved
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },

    /// Stored data could not be decoded
    #[error("Invalid {format} data in '{path}': {message}")]
    Format {
        /// The storage format
        format: String,
        /// The file involved
        path: PathBuf,
        /// Description of the problem
        message: String,
    },

    /// A geometry operation failed
    #[error("Geometry operation failed: {message}")]
    Geometry {
        /// Description of the problem
        message: String,
    },

    /// Reprojection failed
    #[error("Projection failed: {message}")]
    Projection {
        /// Description of the problem
        message: String,
    },

    /// Columnar engine failure
    #[error("Table operation failed: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),
}

/// Shoreline source discovery errors.
#[derive(Debug, Error)]
pub enum ShorelineError {
    /// No dated export workspace was found
    #[error("No dated export workspace found under '{root}'")]
    NoExports {
        /// The directory searched
        root: PathBuf,
    },

    /// The newest export holds no shoreline feature class
    #[error("No feature class containing '{marker}' in '{workspace}'")]
    NoShoreline {
        /// The workspace searched
        workspace: PathBuf,
        /// The name marker
        marker: String,
    },
}

/// Output curation errors.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The run date and variant were already published to this directory
    #[error("Release already published; manifest found at '{manifest}'")]
    AlreadyPublished {
        /// The existing publish manifest
        manifest: PathBuf,
    },
}

/// I/O related errors.
///
/// These errors occur while reading the raw extract or writing the
/// intermediate extract and its column declaration file.
#[derive(Debug, Error)]
pub enum IoError {
    /// Failed to read from a file
    #[error("Failed to read {format} file '{path}': {source}")]
    Read {
        /// The format being read (e.g., "CSV", "JSON")
        format: String,
        /// The file path
        path: PathBuf,
        /// The underlying error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Failed to write to a file
    #[error("Failed to write {format} file '{path}': {source}")]
    Write {
        /// The format being written
        format: String,
        /// The file path
        path: PathBuf,
        /// The underlying error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Type alias for Results using `PlutoError`.
pub type Result<T> = std::result::Result<T, PlutoError>;

impl PlutoError {
    /// Short label of the error family, used in run reports.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "configuration",
            Self::Schema(_) => "schema",
            Self::JoinKey(_) => "join key",
            Self::Backend(_) => "backend",
            Self::Shoreline(_) => "shoreline",
            Self::Publish(_) => "publish",
            Self::Io(_) => "io",
        }
    }

    /// Get a user-friendly error message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(e) => format!("Configuration error: {e}"),
            Self::Schema(e) => format!("Schema error: {e}"),
            Self::JoinKey(e) => format!("Join key error: {e}"),
            Self::Backend(e) => format!("Backend error: {e}"),
            Self::Shoreline(e) => format!("Shoreline error: {e}"),
            Self::Publish(e) => format!("Publish error: {e}"),
            Self::Io(e) => e.user_message(),
        }
    }

    /// Get recovery suggestions if available.
    #[must_use]
    pub fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::Schema(SchemaError::Coercion { field, .. }) => Some(format!(
                "Fix the value in the source extract or change the storage type or length of '{field}'."
            )),
            Self::Schema(SchemaError::UnknownFieldType { .. }) => Some(
                "Add the field to the schema or set unregistered_fields = \"pass-through\"."
                    .to_string(),
            ),
            Self::Publish(PublishError::AlreadyPublished { .. }) => {
                Some("Re-run with --force to rebuild the published workspaces.".to_string())
            },
            Self::Shoreline(ShorelineError::NoExports { .. }) => {
                Some("Check dof_path; export names must embed a YYYYMMDD date.".to_string())
            },
            Self::Config(_) => Some("Check the [paths] and [pipeline] sections.".to_string()),
            _ => None,
        }
    }
}

impl IoError {
    fn user_message(&self) -> String {
        match self {
            Self::Read { format, path, .. } => {
                format!("Failed to read {} file: {}", format, path.display())
            },
            Self::Write { format, path, .. } => {
                format!("Failed to write {} file: {}", format, path.display())
            },
        }
    }
}

impl From<arrow_schema::ArrowError> for PlutoError {
    fn from(err: arrow_schema::ArrowError) -> Self {
        PlutoError::Backend(BackendError::Arrow(err))
    }
}

/// Extension trait for adding I/O context to errors.
///
/// This trait provides convenient methods to wrap errors with file and format
/// context, creating more informative error messages.
pub trait IoErrorExt<T> {
    /// Add read context to an error.
    ///
    /// # Errors
    ///
    /// Returns an [`IoError::Read`] if the underlying operation fails.
    fn with_read_context(self, format: &str, path: impl Into<PathBuf>) -> Result<T>;

    /// Add write context to an error.
    ///
    /// # Errors
    ///
    /// Returns an [`IoError::Write`] if the underlying operation fails.
    fn with_write_context(self, format: &str, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T, E> IoErrorExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn with_read_context(self, format: &str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| {
            PlutoError::Io(IoError::Read {
                format: format.to_string(),
                path: path.into(),
                source: Box::new(e),
            })
        })
    }

    fn with_write_context(self, format: &str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| {
            PlutoError::Io(IoError::Write {
                format: format.to_string(),
                path: path.into(),
                source: Box::new(e),
            })
        })
    }
}

/// Helper to wrap a file system failure inside a backend operation.
#[must_use]
pub fn backend_io(operation: &str, path: impl Into<PathBuf>, source: std::io::Error) -> PlutoError {
    PlutoError::Backend(BackendError::Io {
        operation: operation.to_string(),
        path: path.into(),
        source,
    })
}
