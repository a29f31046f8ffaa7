use thiserror::Error;

/// Why a single tagged operation failed.
///
/// None of these abort a batch: the executor turns each into a failed
/// `ExecutionResult` and moves on to the next operation.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("missing {0} attribute")]
    MissingAttribute(&'static str),

    #[error("illegal path (path traversal detected): {0}")]
    PathTraversal(String),

    #[error("file not found")]
    FileNotFound,

    #[error("directory not found: {0}")]
    DirectoryNotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("{action} failed: {source}")]
    Io {
        action: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
}

impl OperationError {
    /// Wraps an I/O error, mapping `NotFound` to [`OperationError::FileNotFound`].
    pub fn io(action: &'static str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::FileNotFound
        } else {
            Self::Io { action, source }
        }
    }

    /// True for the "something isn't there" family.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::FileNotFound | Self::DirectoryNotFound(_) | Self::NotADirectory(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            OperationError::MissingAttribute("path").to_string(),
            "missing path attribute"
        );
        assert_eq!(OperationError::FileNotFound.to_string(), "file not found");
        assert_eq!(
            OperationError::PathTraversal("../x".into()).to_string(),
            "illegal path (path traversal detected): ../x"
        );
        assert_eq!(
            OperationError::UnsupportedOperation("MOVE_FILE".into()).to_string(),
            "unsupported operation: MOVE_FILE"
        );
    }

    #[test]
    fn test_io_not_found_maps_to_file_not_found() {
        let err = OperationError::io(
            "read",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, OperationError::FileNotFound));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_io_other_kinds_are_wrapped() {
        let err = OperationError::io(
            "write",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(matches!(err, OperationError::Io { action: "write", .. }));
        assert!(!err.is_not_found());
        assert!(err.to_string().starts_with("write failed:"));
    }
}
