//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use imagepipe::cache::CacheError;
use imagepipe::config::ConfigFileError;
use imagepipe::pipeline::BuildError;
use imagepipe::PipelineError;
use std::fmt;
use std::path::PathBuf;
use std::process;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(std::io::Error),
    /// Configuration could not be loaded or saved
    Config(ConfigFileError),
    /// Invalid argument combination
    InvalidArgs(String),
    /// Pipeline could not be built
    Build(BuildError),
    /// A request failed or was cancelled
    Request { uri: String, error: PipelineError },
    /// A request completed without an image
    NotFound { uri: String },
    /// Cache maintenance failed
    Cache(CacheError),
    /// Failed to write output file
    FileWrite { path: PathBuf, message: String },
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::NotFound { .. } => {
                eprintln!();
                eprintln!("The image is not cached at the requested level.");
                eprintln!("Use --level full to allow fetching from the source.");
                process::exit(2)
            }
            CliError::Build(BuildError::Cache(_)) => {
                eprintln!();
                eprintln!("Check that the cache directory in config.ini is writable.");
                process::exit(1)
            }
            _ => process::exit(1),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(e) => write!(f, "Failed to initialize logging: {}", e),
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::InvalidArgs(msg) => write!(f, "{}", msg),
            CliError::Build(e) => write!(f, "Failed to create pipeline: {}", e),
            CliError::Request { uri, error } => {
                write!(f, "Request for '{}' failed: {}", uri, error)
            }
            CliError::NotFound { uri } => write!(f, "No image available for '{}'", uri),
            CliError::Cache(e) => write!(f, "Cache operation failed: {}", e),
            CliError::FileWrite { path, message } => {
                write!(f, "Failed to write file '{}': {}", path.display(), message)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::LoggingInit(e) => Some(e),
            CliError::Config(e) => Some(e),
            CliError::Build(e) => Some(e),
            CliError::Request { error, .. } => Some(error),
            CliError::Cache(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e)
    }
}

impl From<BuildError> for CliError {
    fn from(e: BuildError) -> Self {
        CliError::Build(e)
    }
}

impl From<CacheError> for CliError {
    fn from(e: CacheError) -> Self {
        CliError::Cache(e)
    }
}
