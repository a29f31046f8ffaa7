//! Directory listings for `list_files` / `list_dir`.

use std::io;
use std::path::Path;

use glob::{MatchOptions, Pattern};
use walkdir::WalkDir;

use super::Sandbox;

/// Shell-style filter matched against root-relative paths.
///
/// `*` matches any run of characters including `/`, `?` a single character,
/// `[...]` a character class. Matching is case-sensitive. A `[` with no
/// closing `]` stands for itself while the rest of the pattern keeps its
/// wildcards.
#[derive(Debug, Clone)]
pub struct GlobFilter {
    pattern: Pattern,
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

impl GlobFilter {
    pub fn new(filter: &str) -> Self {
        let sanitized = escape_unclosed_brackets(&collapse_stars(filter));
        let pattern = Pattern::new(&sanitized)
            .or_else(|_| Pattern::new(&Pattern::escape(filter)))
            .unwrap_or_default();
        Self { pattern }
    }

    pub fn matches(&self, relative_path: &str) -> bool {
        self.pattern.matches_with(relative_path, MATCH_OPTIONS)
    }
}

/// `**` has no special meaning here; since `*` already crosses `/`, a run of
/// stars is equivalent to one.
fn collapse_stars(filter: &str) -> String {
    let mut out = String::with_capacity(filter.len());
    let mut prev_star = false;
    for c in filter.chars() {
        if c == '*' && prev_star {
            continue;
        }
        prev_star = c == '*';
        out.push(c);
    }
    out
}

/// Rewrites every `[` that never gets closed as the literal class `[[]`.
///
/// A class closes at the first `]` after an optional leading `!` and an
/// optional leading `]`, the same rule the `glob` crate parses with.
fn escape_unclosed_brackets(filter: &str) -> String {
    let chars: Vec<char> = filter.chars().collect();
    let mut out = String::with_capacity(filter.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '[' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        let mut j = i + 1;
        if chars.get(j) == Some(&'!') {
            j += 1;
        }
        if chars.get(j) == Some(&']') {
            j += 1;
        }
        while j < chars.len() && chars[j] != ']' {
            j += 1;
        }
        if j < chars.len() {
            out.extend(&chars[i..=j]);
            i = j + 1;
        } else {
            out.push_str("[[]");
            i += 1;
        }
    }
    out
}

impl Sandbox {
    /// Files directly inside `dir` (no recursion), as bare file names, sorted.
    pub fn immediate_files(&self, dir: &Path) -> io::Result<Vec<String>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            // Follows symlinks, like the recursive walk below
            if entry.path().is_file() {
                files.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        files.sort();
        Ok(files)
    }

    /// Every file under `dir` (recursively) whose root-relative path matches
    /// `filter`. Returned as sorted root-relative paths.
    ///
    /// Symlinks to files are listed; symlinked directories are not descended.
    /// Unreadable entries are skipped rather than failing the whole walk.
    pub fn find_files(&self, dir: &Path, filter: &GlobFilter) -> Vec<String> {
        let mut matched: Vec<String> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .map(|e| self.relative(e.path()))
            .filter(|rel| filter.matches(rel))
            .collect();
        matched.sort();
        matched
    }
}
