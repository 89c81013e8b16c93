//! Custom error types for `geobq` conversions.
//!
//! This module provides structured error handling using `thiserror`, replacing
//! generic `anyhow::Error` with domain-specific error types that preserve context
//! and enable better error messages and recovery strategies.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for `geobq` operations.
///
/// This is the root error type that encompasses all domain-specific errors.
/// It uses `#[error(transparent)]` to delegate display formatting to the
/// underlying error variants.
#[derive(Debug, Error)]
pub enum GeoBqError {
    /// Column specification errors (malformed JSON, duplicate names, etc.)
    #[error(transparent)]
    Column(#[from] ColumnError),

    /// Normalization adapter errors (reserved options, engine failures)
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    /// Batch planning errors (argument combinations, missing directories)
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// I/O errors (file read/write, feature parsing)
    #[error(transparent)]
    Io(#[from] IoError),

    /// Generic errors from dependencies
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Column specification errors.
///
/// These errors occur when resolving the user-supplied column directive
/// into a concrete column plan.
#[derive(Debug, Error)]
pub enum ColumnError {
    /// The directive was not parseable as JSON
    #[error("Invalid column spec: {message}")]
    InvalidJson {
        /// Description of the parse problem
        message: String,
    },

    /// The directive parsed, but is not an array of names or a name mapping
    #[error("Invalid column spec: expected a JSON array of column names or an object mapping column names, found {found}")]
    UnsupportedShape {
        /// A short description of what was found instead
        found: String,
    },

    /// Two different columns were mapped to the same output name
    #[error("Invalid column spec: output name '{output}' is requested for both '{first}' and '{second}'")]
    DuplicateOutputName {
        /// The contested output name
        output: String,
        /// The column that claimed the name first
        first: String,
        /// The column that tried to claim it again
        second: String,
    },
}

/// Geometry normalization adapter errors.
///
/// These errors occur at the boundary with the external conversion engine.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// A pass-through option tried to override an adapter-owned option
    #[error("Option '{option}' is reserved and cannot be used within the pass-through conversion options")]
    ReservedOption {
        /// The offending option token
        option: String,
    },

    /// The conversion engine binary could not be launched at all
    #[error("Conversion engine '{binary}' could not be launched: {source}")]
    EngineUnavailable {
        /// The engine binary name
        binary: String,
        /// The underlying launch error
        #[source]
        source: std::io::Error,
    },

    /// The conversion engine ran and reported a failure
    #[error("Conversion engine failed for '{path}': {message}")]
    Engine {
        /// The source file being converted
        path: PathBuf,
        /// The engine's diagnostic output
        message: String,
    },
}

/// Batch planning errors.
///
/// Argument-combination errors abort the whole run before any I/O occurs;
/// per-job errors fail that job only while the rest of the batch continues.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The extension filter was supplied for a single-file source
    #[error("The extension filter cannot be used when the source path is a file")]
    ExtensionForFile,

    /// The extension filter was omitted for a directory source
    #[error("An extension filter is required when the source path is a directory")]
    ExtensionRequired,

    /// An explicit output filepath was supplied for a directory source
    #[error("An explicit output filepath cannot be used when the source path is a directory")]
    OutputFileForDirectory,

    /// The source path does not exist
    #[error("Source '{path}' does not exist")]
    MissingSource {
        /// The missing source path
        path: PathBuf,
    },

    /// The target directory for a job's output does not exist
    #[error("Output directory '{path}' does not exist")]
    MissingOutputDirectory {
        /// The missing directory
        path: PathBuf,
    },
}

/// I/O related errors.
///
/// These errors occur while reading feature sequences or writing output
/// records and schema files.
#[derive(Debug, Error)]
pub enum IoError {
    /// Failed to read from a file
    #[error("Failed to read '{path}': {source}")]
    Read {
        /// The file path
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },

    /// Failed to write to a file
    #[error("Failed to write '{path}': {source}")]
    Write {
        /// The file path
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },

    /// A line of the normalized feature sequence did not parse
    #[error("Failed to parse feature at line {line} of '{path}': {message}")]
    Parse {
        /// The feature sequence file
        path: PathBuf,
        /// The 1-based line number
        line: u64,
        /// Description of the parse error
        message: String,
    },
}

/// Type alias for Results using `GeoBqError`.
pub type Result<T> = std::result::Result<T, GeoBqError>;

impl GeoBqError {
    /// Get a user-friendly error message with context.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Column(e) => e.to_string(),
            Self::Normalize(e) => e.to_string(),
            Self::Plan(e) => e.to_string(),
            Self::Io(e) => e.user_message(),
            Self::Other(e) => format!("Error: {e}"),
        }
    }

    /// Get recovery suggestions if available.
    ///
    /// Returns helpful suggestions on how to fix or work around the error.
    #[must_use]
    pub fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::Column(e) => e.recovery_suggestion(),
            Self::Normalize(e) => e.recovery_suggestion(),
            Self::Plan(e) => e.recovery_suggestion(),
            _ => None,
        }
    }

    /// Whether this error invalidates the whole run rather than a single job.
    ///
    /// Argument-combination problems indicate a batch-wide misconfiguration
    /// and are validated once, up front, before any job starts.
    #[must_use]
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            Self::Plan(
                PlanError::ExtensionForFile
                    | PlanError::ExtensionRequired
                    | PlanError::OutputFileForDirectory
                    | PlanError::MissingSource { .. }
            )
        )
    }
}

impl ColumnError {
    fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::InvalidJson { .. } => Some(
                "Make sure the column spec is valid JSON and quotation marks are escaped \
                 with a backslash (\"value\" should be \\\"value\\\")."
                    .to_string(),
            ),
            Self::UnsupportedShape { .. } => Some(
                "Use a JSON array to pick columns, or a JSON object to pick and rename them."
                    .to_string(),
            ),
            Self::DuplicateOutputName { .. } => {
                Some("Give each selected column a distinct output name.".to_string())
            },
        }
    }
}

impl NormalizeError {
    fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::ReservedOption { .. } => Some(
                "The output format and target reference system are owned by the converter; \
                 remove the option from the pass-through string."
                    .to_string(),
            ),
            Self::EngineUnavailable { binary, .. } => {
                Some(format!("Check that '{binary}' is installed and on the PATH."))
            },
            Self::Engine { .. } => None,
        }
    }
}

impl PlanError {
    fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::ExtensionForFile | Self::OutputFileForDirectory => None,
            Self::ExtensionRequired => {
                Some("Pass an extension filter, for example: --extension shp".to_string())
            },
            Self::MissingSource { .. } => {
                Some("Check that the source path is correct and the file exists.".to_string())
            },
            Self::MissingOutputDirectory { .. } => Some(
                "Use the create-parents option to create missing directories and their \
                 parents during execution."
                    .to_string(),
            ),
        }
    }
}

impl IoError {
    fn user_message(&self) -> String {
        match self {
            Self::Read { path, .. } => format!("Failed to read {}", path.display()),
            Self::Write { path, .. } => format!("Failed to write {}", path.display()),
            Self::Parse { .. } => self.to_string(),
        }
    }
}

/// Extension trait for adding I/O context to errors.
///
/// This trait provides convenient methods to wrap errors with file context,
/// creating more informative error messages.
pub trait IoErrorExt<T> {
    /// Add read context to an error.
    ///
    /// # Errors
    ///
    /// Returns an [`IoError::Read`] if the underlying operation fails.
    fn with_read_context(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Add write context to an error.
    ///
    /// # Errors
    ///
    /// Returns an [`IoError::Write`] if the underlying operation fails.
    fn with_write_context(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoErrorExt<T> for std::result::Result<T, std::io::Error> {
    fn with_read_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| {
            GeoBqError::Io(IoError::Read {
                path: path.into(),
                source: e,
            })
        })
    }

    fn with_write_context(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| {
            GeoBqError::Io(IoError::Write {
                path: path.into(),
                source: e,
            })
        })
    }
}
