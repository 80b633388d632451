//! Glob-based file selection rooted at a directory.
//!
//! Every stage describes the files it operates on with a [`FileSelector`]:
//! one or more glob patterns, where a leading `!` turns a pattern into an
//! exclusion that subtracts from the included set.
//!
//! ```toml
//! [templates]
//! files = ["**/*.html", "!**/_*.html"]
//! ```
//!
//! Selection walks the root directory once and matches relative paths
//! (always `/`-separated) against the compiled patterns. Results come back
//! sorted by relative path so every stage processes files in a deterministic
//! order regardless of filesystem iteration order.

use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum FileSetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad glob pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        source: glob::PatternError,
    },
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

/// One-or-many glob patterns, `!`-prefixed patterns exclude.
///
/// Deserializes from either a single string or an array of strings,
/// so config files can write `files = "**/*.css"` for the common case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileSelector {
    One(String),
    Many(Vec<String>),
}

impl Default for FileSelector {
    fn default() -> Self {
        FileSelector::Many(Vec::new())
    }
}

impl FileSelector {
    pub fn one(pattern: impl Into<String>) -> Self {
        FileSelector::One(pattern.into())
    }

    pub fn many<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FileSelector::Many(patterns.into_iter().map(Into::into).collect())
    }

    /// All patterns, inclusions and exclusions alike.
    pub fn patterns(&self) -> &[String] {
        match self {
            FileSelector::One(p) => std::slice::from_ref(p),
            FileSelector::Many(ps) => ps,
        }
    }

    /// True when no pattern is present; selecting with an empty selector
    /// yields an empty set.
    pub fn is_empty(&self) -> bool {
        self.patterns().iter().all(|p| p.is_empty())
    }
}

/// A file passing through a stage: relative identity plus stat metadata.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Path relative to the selection root, `/`-separated.
    pub rel_path: PathBuf,
    /// Absolute (root-joined) path for I/O.
    pub abs_path: PathBuf,
    /// Size in bytes (0 for directories).
    pub len: u64,
    /// Regular file vs. directory.
    pub is_file: bool,
}

/// Compiled include/exclude pattern sets.
struct CompiledSelector {
    includes: Vec<Pattern>,
    excludes: Vec<Pattern>,
}

impl CompiledSelector {
    fn compile(selector: &FileSelector) -> Result<Self, FileSetError> {
        let mut includes = Vec::new();
        let mut excludes = Vec::new();
        for raw in selector.patterns() {
            if raw.is_empty() {
                continue;
            }
            let (target, text) = match raw.strip_prefix('!') {
                Some(rest) => (&mut excludes, rest.trim_start_matches('/')),
                None => (&mut includes, raw.trim_start_matches('/')),
            };
            let pattern = Pattern::new(text).map_err(|source| FileSetError::Pattern {
                pattern: raw.clone(),
                source,
            })?;
            target.push(pattern);
        }
        Ok(Self { includes, excludes })
    }

    fn matches(&self, rel: &str) -> bool {
        let options = MatchOptions {
            require_literal_separator: true,
            ..MatchOptions::default()
        };
        self.includes
            .iter()
            .any(|p| p.matches_with(rel, options))
            && !self.excludes.iter().any(|p| p.matches_with(rel, options))
    }
}

/// Relative path with `/` separators, for pattern matching and rewriting.
pub fn rel_str(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Select files (and directories) under `root` matching `selector`.
///
/// Returns records sorted by relative path. A missing root or an empty
/// selector yields an empty set rather than an error.
pub fn select(root: &Path, selector: &FileSelector) -> Result<Vec<FileRecord>, FileSetError> {
    if selector.is_empty() || !root.exists() {
        return Ok(Vec::new());
    }
    let compiled = CompiledSelector::compile(selector)?;

    let mut records = Vec::new();
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(root)
            .expect("walked path is under root")
            .to_path_buf();
        if !compiled.matches(&rel_str(&rel)) {
            continue;
        }
        let meta = entry.metadata()?;
        records.push(FileRecord {
            abs_path: entry.path().to_path_buf(),
            len: meta.len(),
            is_file: meta.is_file(),
            rel_path: rel,
        });
    }
    records.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, rel).unwrap();
    }

    fn rel_paths(records: &[FileRecord]) -> Vec<String> {
        records
            .iter()
            .filter(|r| r.is_file)
            .map(|r| rel_str(&r.rel_path))
            .collect()
    }

    #[test]
    fn selector_deserializes_from_string_and_array() {
        let one: FileSelector = toml::from_str::<toml::Value>(r#"v = "**/*.css""#)
            .unwrap()
            .get("v")
            .cloned()
            .unwrap()
            .try_into()
            .unwrap();
        assert_eq!(one, FileSelector::one("**/*.css"));

        let many: FileSelector = toml::from_str::<toml::Value>(r#"v = ["a", "!b"]"#)
            .unwrap()
            .get("v")
            .cloned()
            .unwrap()
            .try_into()
            .unwrap();
        assert_eq!(many.patterns(), ["a", "!b"]);
    }

    #[test]
    fn empty_selector_selects_nothing() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "a.css");
        let records = select(tmp.path(), &FileSelector::default()).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn missing_root_selects_nothing() {
        let tmp = TempDir::new().unwrap();
        let records = select(&tmp.path().join("nope"), &FileSelector::one("**/*")).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn recursive_glob_matches_root_level_files() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "top.css");
        touch(tmp.path(), "css/nested.css");
        touch(tmp.path(), "js/app.js");

        let records = select(tmp.path(), &FileSelector::one("**/*.css")).unwrap();
        assert_eq!(rel_paths(&records), ["css/nested.css", "top.css"]);
    }

    #[test]
    fn exclusion_subtracts_from_inclusion() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "index.html");
        touch(tmp.path(), "partials/_head.html");
        touch(tmp.path(), "about.html");

        let selector = FileSelector::many(["**/*.html", "!**/_*.html"]);
        let records = select(tmp.path(), &selector).unwrap();
        assert_eq!(rel_paths(&records), ["about.html", "index.html"]);
    }

    #[test]
    fn leading_slash_in_pattern_is_tolerated() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "vendor/lib.js");

        let records = select(tmp.path(), &FileSelector::one("/vendor/*.js")).unwrap();
        assert_eq!(rel_paths(&records), ["vendor/lib.js"]);
    }

    #[test]
    fn bad_pattern_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let result = select(tmp.path(), &FileSelector::one("a[")); // unclosed class
        assert!(matches!(result, Err(FileSetError::Pattern { .. })));
    }

    #[test]
    fn directories_are_selected_with_metadata() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "cache/entry.tmp");

        let records = select(tmp.path(), &FileSelector::one("cache")).unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].is_file);
    }

    #[test]
    fn results_are_sorted() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "b.js");
        touch(tmp.path(), "a.js");
        touch(tmp.path(), "c.js");

        let records = select(tmp.path(), &FileSelector::one("*.js")).unwrap();
        assert_eq!(rel_paths(&records), ["a.js", "b.js", "c.js"]);
    }
}
