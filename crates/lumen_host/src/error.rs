//! Error types for the toolkit host layer

use std::path::PathBuf;
use thiserror::Error;

/// Result type for toolkit host operations
pub type Result<T> = std::result::Result<T, LumenError>;

/// Errors that can occur in the toolkit host layer
#[derive(Debug, Error)]
pub enum LumenError {
    /// Failed to load the toolkit library
    #[error("Failed to load library '{path}': {message}")]
    LoadError {
        path: PathBuf,
        message: String,
    },

    /// Library does not contain required symbol
    #[error("Symbol '{symbol}' not found in library '{library}'")]
    SymbolNotFound {
        library: String,
        symbol: String,
    },

    /// Visual class not exported by the toolkit
    #[error("Class '{0}' not registered")]
    ClassNotFound(String),

    /// Failed to create a native object
    #[error("Failed to create instance of '{class_name}': {message}")]
    CreationFailed {
        class_name: String,
        message: String,
    },

    /// Native call reported a failure status
    #[error("Native call failed (status {code}): {message}")]
    Native {
        code: i32,
        message: String,
    },

    /// Operation called on a disposed handle
    #[error("Handle has been disposed")]
    Disposed,

    /// Class does not provide the requested operation
    #[error("Operation '{0}' not provided by the native class")]
    Unsupported(&'static str),

    /// Property map transfer failed
    #[error("Property map transfer failed: {0}")]
    Codec(String),

    /// Invalid state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Version mismatch
    #[error("Version mismatch: library version {library_version}, expected {expected_version}")]
    VersionMismatch {
        library_version: String,
        expected_version: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl LumenError {
    /// Create a load error
    pub fn load_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        LumenError::LoadError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a symbol not found error
    pub fn symbol_not_found(library: impl Into<String>, symbol: impl Into<String>) -> Self {
        LumenError::SymbolNotFound {
            library: library.into(),
            symbol: symbol.into(),
        }
    }

    /// Create a creation failed error
    pub fn creation_failed(class_name: impl Into<String>, message: impl Into<String>) -> Self {
        LumenError::CreationFailed {
            class_name: class_name.into(),
            message: message.into(),
        }
    }

    /// Create a native failure error
    pub fn native(code: i32, message: impl Into<String>) -> Self {
        LumenError::Native {
            code,
            message: message.into(),
        }
    }
}

impl From<bincode::Error> for LumenError {
    fn from(e: bincode::Error) -> Self {
        LumenError::Codec(e.to_string())
    }
}
