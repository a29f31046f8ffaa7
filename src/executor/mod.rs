//! Executes parsed protocol operations against a [`Sandbox`].
//!
//! Operations run one at a time, in parse order. A failing operation
//! produces a failed [`ExecutionResult`] and the batch carries on, so
//! callers always get one result per record.

mod result;

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::protocol::{parse, Operation, OperationError, OperationKind, OperationRecord};
use crate::sandbox::{GlobFilter, Sandbox, DEFAULT_ROOT};

pub use result::ExecutionResult;

/// Characters of file content shown in the read preview log line.
const PREVIEW_CHARS: usize = 100;

/// Applies tagged operations to one sandbox root.
///
/// Holds the ledger of files this instance created; mutation goes through
/// `&mut self`, so concurrent agents need one executor each.
#[derive(Debug)]
pub struct OperationExecutor {
    sandbox: Sandbox,
    created_files: Vec<PathBuf>,
}

impl OperationExecutor {
    /// Opens the sandbox at `root`, creating the directory if absent.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self {
            sandbox: Sandbox::open(root)?,
            created_files: Vec::new(),
        })
    }

    /// Executor rooted at `./output`.
    pub fn with_default_root() -> std::io::Result<Self> {
        Self::new(DEFAULT_ROOT)
    }

    pub fn root(&self) -> &Path {
        self.sandbox.root()
    }

    /// Absolute paths created by this executor and not deleted since.
    pub fn created_files(&self) -> &[PathBuf] {
        &self.created_files
    }

    /// Parses `text` and executes every operation found.
    ///
    /// Returns `false` when the text holds no operations.
    pub fn apply(&mut self, text: &str) -> bool {
        self.apply_with(text, |_, _| {})
    }

    /// Like [`apply`](Self::apply), calling `on_result` after each operation.
    ///
    /// Returns `true` once every record has been dispatched, whether or not
    /// the individual operations succeeded.
    pub fn apply_with<F>(&mut self, text: &str, mut on_result: F) -> bool
    where
        F: FnMut(&OperationRecord, &ExecutionResult),
    {
        let records = parse(text);
        if records.is_empty() {
            return false;
        }

        info!("Found {} tagged operation(s)", records.len());
        for (i, record) in records.iter().enumerate() {
            debug!(
                "[{}] {} {}",
                i + 1,
                record.kind,
                record.attr("path").unwrap_or("")
            );
            let result = self.execute(record);
            on_result(record, &result);
        }
        info!("Batch complete");
        true
    }

    /// Executes records in order and collects their results.
    pub fn execute_all(&mut self, records: &[OperationRecord]) -> Vec<ExecutionResult> {
        records.iter().map(|r| self.execute(r)).collect()
    }

    /// Executes one record.
    pub fn execute(&mut self, record: &OperationRecord) -> ExecutionResult {
        let operation = match Operation::try_from(record) {
            Ok(op) => op,
            Err(err) => {
                if let OperationKind::Unknown(name) = &record.kind {
                    warn!("Unsupported operation: {name}");
                }
                let mut result = ExecutionResult::failed(record.kind.as_str(), err);
                result.filename = record.attr("path").map(str::to_string);
                return result;
            }
        };
        self.run(operation)
    }

    /// Executes an already validated operation.
    pub fn run(&mut self, operation: Operation) -> ExecutionResult {
        match operation {
            Operation::CreateFile { path, content } => {
                let result = self.write_file(OperationKind::CreateFile, &path, &content);
                if result.success {
                    if let Some(full) = &result.path {
                        self.created_files.push(full.clone());
                    }
                }
                result
            }
            Operation::UpdateFile { path, content } => {
                self.write_file(OperationKind::UpdateFile, &path, &content)
            }
            Operation::ReadFile { path } => self.read_file(&path),
            Operation::DeleteFile { path } => self.delete_file(&path),
            Operation::ListFiles { filter } => self.list_files(filter),
            Operation::ListDir { path, filter } => self.list_dir(&path, filter),
            Operation::Again { reason } => {
                info!("Follow-up requested: {reason}");
                ExecutionResult {
                    reason: Some(reason),
                    requires_follow_up: true,
                    ..ExecutionResult::ok(OperationKind::Again.as_str())
                }
            }
        }
    }

    // ── File operations ───────────────────────────────────

    /// Shared by create and update: mkdir -p the parent, then truncate-write.
    fn write_file(&self, kind: OperationKind, filename: &str, content: &str) -> ExecutionResult {
        let full = match self.sandbox.validate_path(filename) {
            Ok(full) => full,
            Err(err) => return failure(kind, filename, err),
        };

        let written = full
            .parent()
            .map_or(Ok(()), std::fs::create_dir_all)
            .and_then(|()| std::fs::write(&full, content));
        if let Err(e) = written {
            return failure(kind, filename, OperationError::Io { action: "write", source: e });
        }

        let size = content.chars().count();
        info!("{kind} {} ({size} chars)", full.display());
        ExecutionResult {
            filename: Some(filename.to_string()),
            path: Some(full),
            size: Some(size),
            ..ExecutionResult::ok(kind.as_str())
        }
    }

    fn read_file(&self, filename: &str) -> ExecutionResult {
        let kind = OperationKind::ReadFile;
        let full = match self.sandbox.validate_path(filename) {
            Ok(full) => full,
            Err(err) => return failure(kind, filename, err),
        };

        match std::fs::read_to_string(&full) {
            Ok(content) => {
                debug!(
                    "Read {} ({} chars): {}",
                    full.display(),
                    content.chars().count(),
                    preview(&content)
                );
                ExecutionResult {
                    filename: Some(filename.to_string()),
                    path: Some(full),
                    content: Some(content),
                    ..ExecutionResult::ok(kind.as_str())
                }
            }
            Err(e) => {
                warn!("Read failed for {}: {e}", full.display());
                failure(kind, filename, OperationError::io("read", e))
            }
        }
    }

    fn delete_file(&mut self, filename: &str) -> ExecutionResult {
        let kind = OperationKind::DeleteFile;
        let full = match self.sandbox.validate_path(filename) {
            Ok(full) => full,
            Err(err) => return failure(kind, filename, err),
        };

        if let Err(e) = std::fs::remove_file(&full) {
            warn!("Delete failed for {}: {e}", full.display());
            return failure(kind, filename, OperationError::io("delete", e));
        }

        self.created_files.retain(|p| p != &full);
        info!("Deleted {}", full.display());
        ExecutionResult {
            filename: Some(filename.to_string()),
            path: Some(full),
            ..ExecutionResult::ok(kind.as_str())
        }
    }

    // ── Listings ──────────────────────────────────────────

    fn list_files(&self, filter: Option<String>) -> ExecutionResult {
        let kind = OperationKind::ListFiles;
        let root = self.sandbox.root();

        match filter {
            None => match self.sandbox.immediate_files(root) {
                Ok(files) => {
                    info!("Listed {} file(s) in sandbox root", files.len());
                    ExecutionResult {
                        files: Some(files),
                        recursive: Some(false),
                        ..ExecutionResult::ok(kind.as_str())
                    }
                }
                Err(e) => ExecutionResult::failed(
                    kind.as_str(),
                    OperationError::Io { action: "list", source: e },
                ),
            },
            Some(filter) => {
                let files = self.sandbox.find_files(root, &GlobFilter::new(&filter));
                info!("{} file(s) match '{filter}'", files.len());
                ExecutionResult {
                    files: Some(files),
                    filter: Some(filter),
                    recursive: Some(true),
                    ..ExecutionResult::ok(kind.as_str())
                }
            }
        }
    }

    fn list_dir(&self, dir: &str, filter: Option<String>) -> ExecutionResult {
        let kind = OperationKind::ListDir;
        let failed = |err: OperationError| ExecutionResult {
            directory: Some(dir.to_string()),
            ..ExecutionResult::failed(kind.as_str(), err)
        };

        let target = match self.sandbox.safe_join(self.sandbox.root(), dir) {
            Ok(target) => target,
            Err(err) => return failed(err),
        };
        if !target.exists() {
            return failed(OperationError::DirectoryNotFound(dir.to_string()));
        }
        if !target.is_dir() {
            return failed(OperationError::NotADirectory(dir.to_string()));
        }

        let (files, recursive) = match &filter {
            None => match self.sandbox.immediate_files(&target) {
                Ok(names) => {
                    let prefix = self.sandbox.relative(&target);
                    let files = names
                        .into_iter()
                        .map(|name| join_relative(&prefix, &name))
                        .collect();
                    (files, false)
                }
                Err(e) => return failed(OperationError::Io { action: "list", source: e }),
            },
            Some(f) => (self.sandbox.find_files(&target, &GlobFilter::new(f)), true),
        };

        info!("Listed {} file(s) in '{dir}'", files.len());
        ExecutionResult {
            directory: Some(dir.to_string()),
            files: Some(files),
            filter,
            recursive: Some(recursive),
            ..ExecutionResult::ok(kind.as_str())
        }
    }
}

fn failure(kind: OperationKind, filename: &str, error: OperationError) -> ExecutionResult {
    ExecutionResult {
        filename: Some(filename.to_string()),
        ..ExecutionResult::failed(kind.as_str(), error)
    }
}

fn join_relative(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

/// First characters of `content`, with `...` when truncated.
fn preview(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
