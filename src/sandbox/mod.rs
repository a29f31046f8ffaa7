//! Root-directory confinement for agent file operations.
//!
//! Every path the model names is joined onto the sandbox root and
//! normalized lexically (`.`/`..`/duplicate separators). The result must be
//! the root itself or lie beneath it; anything else is rejected before the
//! filesystem is touched.
//!
//! Confinement is purely lexical: symlinks already present inside the root
//! are followed by the OS as usual.

pub mod listing;

use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::{info, warn};

use crate::protocol::OperationError;

pub use listing::GlobFilter;

/// Default sandbox directory, relative to the working directory.
pub const DEFAULT_ROOT: &str = "output";

/// A project directory that file operations are confined to.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    /// Opens (and creates if needed) the sandbox at `root`.
    ///
    /// A relative `root` is resolved against the current working directory
    /// once, here; later changes of the working directory don't move it.
    pub fn open(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref();
        let absolute = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()?.join(root)
        };
        let root = normalize(&absolute);
        std::fs::create_dir_all(&root)?;
        info!("Sandbox root: {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a model-supplied path against the root.
    pub fn validate_path(&self, candidate: &str) -> Result<PathBuf, OperationError> {
        self.safe_join(&self.root, candidate)
    }

    /// Resolves `sub` against `base`, requiring the result to stay inside
    /// `base`. `base` must already be normalized.
    pub fn safe_join(&self, base: &Path, sub: &str) -> Result<PathBuf, OperationError> {
        let joined = normalize(&base.join(sub));
        if is_within(base, &joined) {
            Ok(joined)
        } else {
            warn!("Rejected path outside sandbox: {sub}");
            Err(OperationError::PathTraversal(sub.to_string()))
        }
    }

    /// Path of `path` relative to the root, always with `/` separators.
    pub fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// True when `path` is `base` or a descendant of it (component-wise).
fn is_within(base: &Path, path: &Path) -> bool {
    path.starts_with(base)
}

/// Lexical normalization: drops `.`, resolves `..` against preceding
/// segments, and collapses separators. Never touches the filesystem.
///
/// `..` directly under the filesystem root is dropped (`/..` is `/`); on a
/// relative path with nothing left to pop it is kept.
pub fn normalize(path: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return PathBuf::from(".");
    }
    parts.iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox() -> (tempfile::TempDir, Sandbox) {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::open(dir.path().join("output")).unwrap();
        (dir, sandbox)
    }

    // ── normalize ──────────────────────────────────────

    #[test]
    fn test_normalize_dots_and_separators() {
        assert_eq!(normalize(Path::new("/a/./b//c/")), PathBuf::from("/a/b/c"));
        assert_eq!(normalize(Path::new("/a/b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("/a/../../b")), PathBuf::from("/b"));
        assert_eq!(normalize(Path::new("a/../..")), PathBuf::from(".."));
        assert_eq!(normalize(Path::new("./")), PathBuf::from("."));
    }

    // ── open ───────────────────────────────────────────

    #[test]
    fn test_open_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested").join("output");
        let sandbox = Sandbox::open(&root).unwrap();
        assert!(root.is_dir());
        assert!(sandbox.root().is_absolute());
    }

    #[test]
    fn test_open_normalizes_root() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::open(dir.path().join("a/../output/.")).unwrap();
        assert_eq!(sandbox.root(), normalize(&dir.path().join("output")));
    }

    // ── validate_path ──────────────────────────────────

    #[test]
    fn test_validate_inside_paths() {
        let (_dir, sb) = sandbox();
        assert_eq!(sb.validate_path("a.txt").unwrap(), sb.root().join("a.txt"));
        assert_eq!(
            sb.validate_path("src/../lib/./x.rs").unwrap(),
            sb.root().join("lib/x.rs")
        );
        assert_eq!(sb.validate_path("").unwrap(), sb.root());
        assert_eq!(sb.validate_path(".").unwrap(), sb.root());
    }

    #[test]
    fn test_validate_rejects_traversal() {
        let (_dir, sb) = sandbox();
        for bad in ["../evil.txt", "a/../../evil.txt", "..", "/etc/passwd", "./../output2/x"] {
            let err = sb.validate_path(bad).unwrap_err();
            assert!(matches!(err, OperationError::PathTraversal(ref p) if p == bad), "{bad}");
        }
    }

    #[test]
    fn test_validate_rejects_sibling_with_shared_prefix() {
        let (_dir, sb) = sandbox();
        // "output_evil" shares a string prefix with "output" but is a sibling
        assert!(sb.validate_path("../output_evil/x").is_err());
    }

    #[test]
    fn test_validate_absolute_path_inside_root() {
        let (_dir, sb) = sandbox();
        let inside = sb.root().join("x.txt");
        let resolved = sb.validate_path(inside.to_str().unwrap()).unwrap();
        assert_eq!(resolved, inside);
    }

    #[test]
    fn test_safe_join_subdirectory() {
        let (_dir, sb) = sandbox();
        let base = sb.root().to_path_buf();
        assert_eq!(sb.safe_join(&base, "log").unwrap(), base.join("log"));
        assert!(sb.safe_join(&base, "log/../../x").is_err());
    }

    #[test]
    fn test_relative_uses_forward_slashes() {
        let (_dir, sb) = sandbox();
        let path = sb.root().join("log").join("app.log");
        assert_eq!(sb.relative(&path), "log/app.log");
        assert_eq!(sb.relative(sb.root()), "");
    }
}
