//! Volume error types.

use thiserror::Error;

use finder_types::ErrorKind;

use crate::hash::HashError;

/// Errors reported by a volume backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VolumeError {
    /// Node not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Name already taken in the destination directory.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Permission denied (locked node, read-only attribute, root).
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Expected a file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Name rejected by the backend.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// The backend does not implement this operation.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    /// Hash could not be decoded by this volume.
    #[error(transparent)]
    Hash(#[from] HashError),

    /// Backend I/O failure.
    #[error("I/O error: {0}")]
    Io(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl VolumeError {
    /// Create a NotFound error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(name: impl Into<String>) -> Self {
        Self::AlreadyExists(name.into())
    }

    /// Create a PermissionDenied error.
    pub fn permission_denied(what: impl Into<String>) -> Self {
        Self::PermissionDenied(what.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(what: impl Into<String>) -> Self {
        Self::NotADirectory(what.into())
    }

    /// Create an IsADirectory error.
    pub fn is_a_directory(what: impl Into<String>) -> Self {
        Self::IsADirectory(what.into())
    }

    /// Create an InvalidName error.
    pub fn invalid_name(name: impl Into<String>) -> Self {
        Self::InvalidName(name.into())
    }

    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// The client error kind closest to this failure, if it has a more
    /// specific one than the command's own kind.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            VolumeError::NotFound(_) | VolumeError::Hash(_) => Some(ErrorKind::FileNotFound),
            VolumeError::PermissionDenied(_) => Some(ErrorKind::PermDenied),
            VolumeError::NotADirectory(_) => Some(ErrorKind::DirNotFound),
            VolumeError::Unsupported(_) => Some(ErrorKind::CmdNoSupport),
            _ => None,
        }
    }
}

/// Volume result type.
pub type VolumeResult<T> = Result<T, VolumeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(VolumeError::not_found("x").kind(), Some(ErrorKind::FileNotFound));
        assert_eq!(
            VolumeError::permission_denied("x").kind(),
            Some(ErrorKind::PermDenied)
        );
        assert_eq!(
            VolumeError::Unsupported("archive").kind(),
            Some(ErrorKind::CmdNoSupport)
        );
        assert_eq!(VolumeError::already_exists("a").kind(), None);
    }

    #[test]
    fn test_hash_errors_convert() {
        let err: VolumeError = HashError::Malformed("m1_!".into()).into();
        assert_eq!(err.to_string(), "malformed hash: m1_!");
    }
}
