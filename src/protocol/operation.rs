use super::error::OperationError;
use super::parser::{OperationKind, OperationRecord};

/// Reason reported by `<again />` when the model gives none.
pub const DEFAULT_AGAIN_REASON: &str = "no reason given";

/// A validated operation, carrying only the fields its kind uses.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    CreateFile { path: String, content: String },
    ReadFile { path: String },
    UpdateFile { path: String, content: String },
    DeleteFile { path: String },
    ListFiles { filter: Option<String> },
    ListDir { path: String, filter: Option<String> },
    Again { reason: String },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::CreateFile { .. } => OperationKind::CreateFile,
            Self::ReadFile { .. } => OperationKind::ReadFile,
            Self::UpdateFile { .. } => OperationKind::UpdateFile,
            Self::DeleteFile { .. } => OperationKind::DeleteFile,
            Self::ListFiles { .. } => OperationKind::ListFiles,
            Self::ListDir { .. } => OperationKind::ListDir,
            Self::Again { .. } => OperationKind::Again,
        }
    }

    /// The path attribute, for operations that have one.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::CreateFile { path, .. }
            | Self::ReadFile { path }
            | Self::UpdateFile { path, .. }
            | Self::DeleteFile { path }
            | Self::ListDir { path, .. } => Some(path),
            Self::ListFiles { .. } | Self::Again { .. } => None,
        }
    }
}

impl TryFrom<&OperationRecord> for Operation {
    type Error = OperationError;

    fn try_from(record: &OperationRecord) -> Result<Self, Self::Error> {
        let path = || {
            record
                .attr("path")
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .ok_or(OperationError::MissingAttribute("path"))
        };
        let content = || record.content.clone().unwrap_or_default();
        let filter = || record.attr("filter").map(str::to_string);

        Ok(match &record.kind {
            OperationKind::CreateFile => Self::CreateFile {
                path: path()?,
                content: content(),
            },
            OperationKind::ReadFile => Self::ReadFile { path: path()? },
            OperationKind::UpdateFile => Self::UpdateFile {
                path: path()?,
                content: content(),
            },
            OperationKind::DeleteFile => Self::DeleteFile { path: path()? },
            OperationKind::ListFiles => Self::ListFiles { filter: filter() },
            OperationKind::ListDir => Self::ListDir {
                path: path()?,
                filter: filter(),
            },
            OperationKind::Again => Self::Again {
                reason: record
                    .attr("reason")
                    .unwrap_or(DEFAULT_AGAIN_REASON)
                    .to_string(),
            },
            OperationKind::Unknown(name) => {
                return Err(OperationError::UnsupportedOperation(name.clone()))
            }
        })
    }
}
