use std::path::PathBuf;

use serde::{Serialize, Serializer};

use crate::protocol::OperationError;

/// Outcome of one operation. Only the fields relevant to the operation are
/// set; the rest stay `None` and are omitted from JSON.
#[derive(Debug, Default, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    /// Upper-case operation name, e.g. `"READ_FILE"`.
    pub operation: String,
    #[serde(
        serialize_with = "serialize_error",
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<OperationError>,
    /// Path attribute as given by the model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Resolved absolute path inside the sandbox.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    /// Characters written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recursive: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub requires_follow_up: bool,
}

impl ExecutionResult {
    pub(crate) fn ok(operation: impl Into<String>) -> Self {
        Self {
            success: true,
            operation: operation.into(),
            ..Default::default()
        }
    }

    pub(crate) fn failed(operation: impl Into<String>, error: OperationError) -> Self {
        Self {
            success: false,
            operation: operation.into(),
            error: Some(error),
            ..Default::default()
        }
    }

    /// Error message, if the operation failed.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    /// One-line human summary, used for progress output.
    pub fn summary(&self) -> String {
        let target = self
            .filename
            .as_deref()
            .or(self.directory.as_deref())
            .or(self.filter.as_deref())
            .unwrap_or("");
        match (&self.error, self.success) {
            (Some(err), _) => format!("{} {target}: {err}", self.operation),
            (None, true) if self.requires_follow_up => format!(
                "{} requested: {}",
                self.operation,
                self.reason.as_deref().unwrap_or("")
            ),
            (None, _) => match &self.files {
                Some(files) => format!("{} {target}: {} file(s)", self.operation, files.len()),
                None => format!("{} {target}: ok", self.operation),
            },
        }
    }
}

fn serialize_error<S: Serializer>(
    error: &Option<OperationError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(err) => serializer.serialize_str(&err.to_string()),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_serializes_error_as_message() {
        let result = ExecutionResult::failed("READ_FILE", OperationError::FileNotFound);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["operation"], "READ_FILE");
        assert_eq!(json["error"], "file not found");
        assert!(json.get("content").is_none());
        assert!(json.get("requires_follow_up").is_none());
    }

    #[test]
    fn test_again_serializes_follow_up() {
        let result = ExecutionResult {
            reason: Some("init".into()),
            requires_follow_up: true,
            ..ExecutionResult::ok("AGAIN")
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["requires_follow_up"], true);
        assert_eq!(json["reason"], "init");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_summary() {
        let failed = ExecutionResult {
            filename: Some("nope.txt".into()),
            ..ExecutionResult::failed("READ_FILE", OperationError::FileNotFound)
        };
        assert_eq!(failed.summary(), "READ_FILE nope.txt: file not found");

        let listed = ExecutionResult {
            files: Some(vec!["a".into(), "b".into()]),
            filter: Some("*.py".into()),
            ..ExecutionResult::ok("LIST_FILES")
        };
        assert_eq!(listed.summary(), "LIST_FILES *.py: 2 file(s)");
    }
}
