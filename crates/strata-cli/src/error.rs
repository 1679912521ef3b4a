//! Error types for the CLI

use std::path::PathBuf;

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Strata(#[from] strata_common::Error),

    #[error("invalid inventory {path}: {message}")]
    InvalidInventory { path: PathBuf, message: String },

    #[error("validation error: {message}")]
    Validation { message: String },
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    pub fn invalid_inventory(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::InvalidInventory {
            path: path.into(),
            message: message.into(),
        }
    }
}
