//! Error types and handling
//!
//! The taxonomy mirrors the two phases of a job: setup failures (configuration,
//! installation, tool commands) are fatal and propagate to the CLI, while the
//! save phase catches everything and downgrades it to a warning. Each domain
//! has its own enum, wrapped by [`CcacheCiError`] for unified handling.

use thiserror::Error;

/// Input and parameter validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Input failed validation
    #[error("Input validation error: {message}")]
    Validation { message: String },

    /// Boolean input outside the accepted spellings
    #[error("'{value}' does not meet YAML 1.2 \"Core Schema\" specification\nSupport boolean input list: `true | True | TRUE | false | False | FALSE`")]
    InvalidBoolean { value: String },

    /// Malformed eviction age parameter
    #[error("Invalid age parameter '{value}': expected '<digits>s', '<digits>d' or 'job'")]
    InvalidAge { value: String },

    /// Unknown tool variant name
    #[error("Unknown ccache variant: {0}")]
    UnknownVariant(String),
}

/// Compiler-cache CLI errors
#[derive(Error, Debug)]
pub enum ToolError {
    /// The tool binary could not be found
    #[error("{tool} is not installed or not accessible")]
    NotInstalled { tool: String },

    /// Spawning the process failed
    #[error("Failed to execute '{command}': {reason}")]
    Spawn { command: String, reason: String },

    /// The command ran but exited unsuccessfully
    #[error("Command '{command}' failed with exit code {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },
}

/// Installation errors, always fatal
#[derive(Error, Debug)]
pub enum InstallError {
    /// No installer exists for the host
    #[error("Unsupported platform: {platform}")]
    UnsupportedPlatform { platform: String },

    /// Download of a release artifact failed
    #[error("Failed to download {url}: {message}")]
    Download { url: String, message: String },

    /// Downloaded archive did not match its published digest
    #[error("Checksum mismatch for {artifact}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        artifact: String,
        expected: String,
        actual: String,
    },

    /// Archive unpacking failed or the binary was missing from it
    #[error("Failed to extract {artifact}: {message}")]
    Extraction { artifact: String, message: String },

    /// Installer I/O error
    #[error("Installer I/O error")]
    Io(#[from] std::io::Error),
}

/// Archive store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// An archive already exists under the key
    #[error("Unable to reserve cache with key {key}, another job may be creating this cache")]
    KeyExists { key: String },

    /// Nothing to archive
    #[error("Path does not exist: {path}")]
    PathNotFound { path: String },

    /// Store index could not be read or written
    #[error("Archive store index error: {message}")]
    Index { message: String },

    /// Archive store I/O error
    #[error("Archive store I/O error")]
    Io(#[from] std::io::Error),
}

/// Cross-phase state errors
#[derive(Error, Debug)]
pub enum StateError {
    /// The state file does not exist, setup never completed
    #[error("Job state not found at {path}")]
    NotFound { path: String },

    /// The state file exists but cannot be decoded
    #[error("Job state at {path} is corrupt: {message}")]
    Corrupt { path: String, message: String },

    /// State file I/O error
    #[error("Failed to access job state file")]
    Io(#[from] std::io::Error),
}

/// Main error enum wrapping all domain-specific errors
#[derive(Error, Debug)]
pub enum CcacheCiError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Compiler-cache CLI errors
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    /// Installation errors
    #[error("Install error: {0}")]
    Install(#[from] InstallError),

    /// Archive store errors
    #[error("Archive store error: {0}")]
    Store(#[from] StoreError),

    /// Persisted state errors
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Runner environment file errors
    #[error("Runner error: {0}")]
    Runner(String),
}

/// Convenience type alias for Results with CcacheCiError
pub type Result<T> = std::result::Result<T, CcacheCiError>;
