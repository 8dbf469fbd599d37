//! Error types for option validation and the cipher pipeline.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T, E = CipherError> = std::result::Result<T, E>;

/// A rejected option. Always names exactly one field.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("options must be an object.")]
    NotAnObject,

    #[error("\"{0}\" is required.")]
    Required(&'static str),

    #[error("\"{0}\" must be a string.")]
    NotString(&'static str),

    #[error("\"password\" must not be empty.")]
    EmptyPassword,

    #[error("\"salt\" must be a string or buffer.")]
    InvalidSalt,

    #[error("\"{0}\" must be an integer.")]
    NotInteger(&'static str),

    #[error("\"{0}\" must be a positive integer.")]
    NotPositive(&'static str),

    #[error("\"{0}\" must not exceed {1}.")]
    TooLarge(&'static str, u32),

    #[error("\"{0}\" is not a valid digest.")]
    UnknownDigest(String),

    #[error("\"{0}\" is not a valid cipher algorithm.")]
    UnknownAlgorithm(String),

    #[error("\"{0}\" must be a boolean.")]
    NotBoolean(&'static str),

    #[error("\"output\" must not refer to the same file as \"input\".")]
    SamePath,
}

impl ValidationError {
    /// The option this error is attributed to.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::NotAnObject => "options",
            ValidationError::Required(f)
            | ValidationError::NotString(f)
            | ValidationError::NotInteger(f)
            | ValidationError::NotPositive(f)
            | ValidationError::TooLarge(f, _)
            | ValidationError::NotBoolean(f) => f,
            ValidationError::EmptyPassword => "password",
            ValidationError::InvalidSalt => "salt",
            ValidationError::UnknownDigest(_) => "digest",
            ValidationError::UnknownAlgorithm(_) => "algorithm",
            ValidationError::SamePath => "output",
        }
    }
}

#[derive(Debug, Error)]
pub enum CipherError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("key derivation failed: {0}")]
    Derivation(String),

    #[error("bad decrypt: {0}")]
    Transform(String),

    #[error("background task failed: {0}")]
    Task(String),
}

impl CipherError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        CipherError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, CipherError::Validation(_))
    }

    pub fn is_io(&self) -> bool {
        matches!(self, CipherError::Io { .. })
    }

    pub fn is_transform(&self) -> bool {
        matches!(self, CipherError::Transform(_))
    }
}
