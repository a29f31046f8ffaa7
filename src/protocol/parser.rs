//! Tag scanner for the file-operation protocol.
//!
//! Model replies are free text with XML-like tags sprinkled in:
//!
//! ```text
//! Sure, here is the entry point.
//! <create_file path="main.py">print("Hello")</create_file>
//! <again reason="check the layout" />
//! ```
//!
//! Two shapes are recognised and scanned in two independent passes:
//! block tags (`<name attrs>content</name>`) first, then self-closing tags
//! (`<name attrs />`). Each pass keeps document order, but the relative
//! order of a block tag and a self-closing tag is not preserved: all block
//! records come before all self-closing ones.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// Opening tag of a block: the tag ends at the first `>`.
static OPEN_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(\w+)\s*([^>]*)>").expect("valid open tag regex"));

static SELF_CLOSING_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(\w+)\s*([^>]*)/\s*>").expect("valid self-closing regex"));

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(\w+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid attribute regex")
});

static KNOWN_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)<(?:create_file|read_file|update_file|delete_file|list_files|list_dir|again)[^>]*>",
    )
    .expect("valid known tag regex")
});

/// Kind of a tagged operation, derived from the upper-cased tag name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperationKind {
    CreateFile,
    ReadFile,
    UpdateFile,
    DeleteFile,
    ListFiles,
    ListDir,
    Again,
    /// Any other tag name, upper-cased. Rejected at dispatch time.
    Unknown(String),
}

impl OperationKind {
    /// Maps a raw tag name (any case) to its kind.
    pub fn from_tag_name(name: &str) -> Self {
        let upper = name.to_uppercase();
        match upper.as_str() {
            "CREATE_FILE" => Self::CreateFile,
            "READ_FILE" => Self::ReadFile,
            "UPDATE_FILE" => Self::UpdateFile,
            "DELETE_FILE" => Self::DeleteFile,
            "LIST_FILES" => Self::ListFiles,
            "LIST_DIR" => Self::ListDir,
            "AGAIN" => Self::Again,
            _ => Self::Unknown(upper),
        }
    }

    /// Upper-case wire name, e.g. `"CREATE_FILE"`.
    pub fn as_str(&self) -> &str {
        match self {
            Self::CreateFile => "CREATE_FILE",
            Self::ReadFile => "READ_FILE",
            Self::UpdateFile => "UPDATE_FILE",
            Self::DeleteFile => "DELETE_FILE",
            Self::ListFiles => "LIST_FILES",
            Self::ListDir => "LIST_DIR",
            Self::Again => "AGAIN",
            Self::Unknown(name) => name,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tag extracted from model output.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationRecord {
    pub kind: OperationKind,
    pub attributes: BTreeMap<String, String>,
    /// Trimmed block content; `None` for self-closing tags and empty blocks.
    pub content: Option<String>,
    pub self_closing: bool,
}

impl OperationRecord {
    /// Returns an attribute value by name.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Extracts every operation tag from `text`.
///
/// Never fails: unmatched or malformed fragments are skipped.
pub fn parse(text: &str) -> Vec<OperationRecord> {
    let mut records = parse_blocks(text);
    records.extend(parse_self_closing(text));
    records
}

/// Cheap check for at least one known operation tag (any case),
/// without building records.
pub fn has_operations(text: &str) -> bool {
    KNOWN_TAG.is_match(text)
}

fn parse_blocks(text: &str) -> Vec<OperationRecord> {
    let mut records = Vec::new();
    let mut pos = 0;

    while pos < text.len() {
        let Some(caps) = OPEN_TAG.captures_at(text, pos) else {
            break;
        };
        let (Some(whole), Some(name), Some(attrs)) = (caps.get(0), caps.get(1), caps.get(2))
        else {
            break;
        };

        match find_closing_tag(text, whole.end(), name.as_str()) {
            Some((content_end, close_end)) => {
                let content = text[whole.end()..content_end].trim();
                records.push(OperationRecord {
                    kind: OperationKind::from_tag_name(name.as_str()),
                    attributes: parse_attributes(attrs.as_str()),
                    content: (!content.is_empty()).then(|| content.to_string()),
                    self_closing: false,
                });
                pos = close_end;
            }
            // No matching close: retry just past this '<'
            None => pos = whole.start() + 1,
        }
    }

    records
}

/// Finds the nearest `</name>` (whitespace allowed before `>`) at or after
/// `from`. Returns the start of the closing tag and the offset just past it.
fn find_closing_tag(text: &str, from: usize, name: &str) -> Option<(usize, usize)> {
    let needle = format!("</{name}");
    let mut search = from;

    while let Some(offset) = text[search..].find(&needle) {
        let start = search + offset;
        let after_name = start + needle.len();
        let rest = &text[after_name..];
        let trimmed = rest.trim_start();
        if trimmed.starts_with('>') {
            let close_end = after_name + (rest.len() - trimmed.len()) + 1;
            return Some((start, close_end));
        }
        search = start + 1;
    }

    None
}

fn parse_self_closing(text: &str) -> Vec<OperationRecord> {
    SELF_CLOSING_TAG
        .captures_iter(text)
        .filter_map(|caps| {
            let name = caps.get(1)?;
            let attrs = caps.get(2).map_or("", |m| m.as_str());
            Some(OperationRecord {
                kind: OperationKind::from_tag_name(name.as_str()),
                attributes: parse_attributes(attrs),
                content: None,
                self_closing: true,
            })
        })
        .collect()
}

/// Collects `key="value"` / `key='value'` pairs. Later duplicates win;
/// anything else in the string is ignored.
pub fn parse_attributes(attrs: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for caps in ATTRIBUTE.captures_iter(attrs.trim()) {
        let Some(key) = caps.get(1) else { continue };
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map_or("", |m| m.as_str());
        map.insert(key.as_str().to_string(), value.to_string());
    }
    map
}
