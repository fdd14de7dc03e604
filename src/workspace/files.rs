//! Source Files
//!
//! Submitted `{name, content}` pairs, name validation and entry selection.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::error::{RunnerError, RunnerResult};

/// Preferred entry file name
pub const CANONICAL_ENTRY: &str = "main.cpp";

/// Suffixes accepted as a C++ translation unit
const SOURCE_SUFFIXES: &[&str] = &[".cpp", ".cc", ".cxx"];

/// A single submitted file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub name: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    fn is_source(&self) -> bool {
        SOURCE_SUFFIXES.iter().any(|s| self.name.ends_with(s))
    }
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9._-]*$").expect("valid regex"))
}

/// Reject file sets that cannot be materialized safely.
///
/// Names must be a single path component, unique, and free of `..`.
pub fn validate_files(files: &[SourceFile]) -> RunnerResult<()> {
    if files.is_empty() {
        return Err(RunnerError::InvalidRequest("no files submitted".into()));
    }

    let mut seen = HashSet::new();
    for file in files {
        if !name_pattern().is_match(&file.name) || file.name.contains("..") {
            return Err(RunnerError::InvalidRequest(format!(
                "invalid file name: {:?}",
                file.name
            )));
        }
        if !seen.insert(file.name.as_str()) {
            return Err(RunnerError::InvalidRequest(format!(
                "duplicate file name: {}",
                file.name
            )));
        }
    }

    if select_entry_file(files).is_none() {
        return Err(RunnerError::InvalidRequest(
            "no C++ source file (.cpp/.cc/.cxx) submitted".into(),
        ));
    }

    Ok(())
}

/// Pick the translation unit to compile: `main.cpp` if present, otherwise
/// the first file with a source suffix.
pub fn select_entry_file(files: &[SourceFile]) -> Option<&SourceFile> {
    files
        .iter()
        .find(|f| f.name == CANONICAL_ENTRY)
        .or_else(|| files.iter().find(|f| f.is_source()))
}
