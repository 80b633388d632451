//! Content-hash asset revisioning with cross-file reference rewriting.
//!
//! Revisioning runs in three passes over the working directory:
//!
//! 1. **Fingerprint**: every selected file gets a SHA-256 content
//!    fingerprint and a new name with the fingerprint embedded before the
//!    extension (`main.css` -> `main-3f786850e3.css`). The mapping of
//!    original to fingerprinted paths is the [`RevisionMap`].
//! 2. **Rewrite**: every textual reference to an original path, in every
//!    file of the output set, is replaced with the fingerprinted path. This
//!    is a separate full pass so cross-file references resolve regardless of
//!    the order files were fingerprinted in. A reference only counts when it
//!    starts at a path-component boundary; a name that merely ends with a
//!    mapped path is left alone.
//! 3. **Rename**: each renamed file moves to its fingerprinted path; the
//!    original is gone afterward. Files whose name didn't change are left
//!    untouched.
//!
//! The policy is fingerprint-driven, not reference-driven: a file that is
//! referenced but not in the selected set is never renamed and its
//! references are never rewritten.
//!
//! Fingerprints are a pure function of content, so a byte-identical input
//! set always produces the same names. Files already carrying a fingerprint
//! suffix are recognized and skipped, which makes a second run over an
//! unchanged tree a no-op.

use crate::cache::hash_bytes;
use crate::fileset::{self, FileSelector, FileSetError};
use regex::Regex;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;
use walkdir::WalkDir;

/// Hex characters of the content hash embedded in revisioned names.
const FINGERPRINT_LEN: usize = 10;

#[derive(Error, Debug)]
pub enum RevisionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    FileSet(#[from] FileSetError),
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Mapping from original relative path to fingerprinted relative path,
/// `/`-separated. Only files whose name actually changed appear here.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RevisionMap {
    entries: BTreeMap<String, String>,
}

impl RevisionMap {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, original: &str) -> Option<&str> {
        self.entries.get(original).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// What one revisioning pass did, for logging.
#[derive(Debug, Default)]
pub struct RevisionOutcome {
    /// original -> fingerprinted relative paths.
    pub map: RevisionMap,
    /// Files whose content was rewritten to point at new names.
    pub rewritten: Vec<String>,
}

/// Content fingerprint: first [`FINGERPRINT_LEN`] hex chars of SHA-256.
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hex = hash_bytes(bytes);
    hex.truncate(FINGERPRINT_LEN);
    hex
}

/// Embed a fingerprint into a relative path, before the extension.
///
/// `css/main.css` + `abc123def0` -> `css/main-abc123def0.css`. Files
/// without an extension get the fingerprint appended to the name.
pub fn revisioned_path(rel: &str, fp: &str) -> String {
    match rel.rsplit_once('/') {
        Some((dir, name)) => format!("{}/{}", dir, revisioned_name(name, fp)),
        None => revisioned_name(rel, fp),
    }
}

fn revisioned_name(name: &str, fp: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}-{fp}.{ext}"),
        _ => format!("{name}-{fp}"),
    }
}

/// Whether a filename stem already ends in a fingerprint suffix
/// (`-` followed by [`FINGERPRINT_LEN`] lowercase hex chars).
pub fn is_revisioned(rel: &str) -> bool {
    let name = rel.rsplit_once('/').map_or(rel, |(_, n)| n);
    let stem = name.rsplit_once('.').map_or(name, |(s, _)| s);
    let Some((_, suffix)) = stem.rsplit_once('-') else {
        return false;
    };
    suffix.len() == FINGERPRINT_LEN && suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

/// Run the full revisioning pass over `root` for files matching `selector`.
pub fn revision(root: &Path, selector: &FileSelector) -> Result<RevisionOutcome, RevisionError> {
    // Pass 1: fingerprint the selected set.
    let mut entries = BTreeMap::new();
    for record in fileset::select(root, selector)? {
        if !record.is_file {
            continue;
        }
        let rel = fileset::rel_str(&record.rel_path);
        if is_revisioned(&rel) {
            continue;
        }
        let bytes = fs::read(&record.abs_path)?;
        let new_rel = revisioned_path(&rel, &fingerprint(&bytes));
        if new_rel != rel {
            entries.insert(rel, new_rel);
        }
    }
    let map = RevisionMap { entries };

    // Pass 2: rewrite references across the whole output set. One combined
    // regex makes a single sweep per file, so rewritten text is never
    // rescanned. A match must start at a path-component boundary (start of
    // text, or after a char outside [0-9A-Za-z_.-]), otherwise a reference
    // to an unrenamed file whose name merely ends with a mapped path would
    // be corrupted. Alternatives go longest first so that at any position
    // the longest mapped path wins.
    let mut rewritten = Vec::new();
    if !map.is_empty() {
        let mut alternatives: Vec<&str> = map.iter().map(|(original, _)| original).collect();
        alternatives.sort_by_key(|original| std::cmp::Reverse(original.len()));
        let pattern = format!(
            "(^|[^0-9A-Za-z_.-])({})",
            alternatives
                .iter()
                .map(|original| regex::escape(original))
                .collect::<Vec<_>>()
                .join("|")
        );
        let reference_re = Regex::new(&pattern).expect("valid regex");

        for entry in WalkDir::new(root).min_depth(1) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let bytes = fs::read(entry.path())?;
            // Binary files can't carry textual references; skip them.
            let Ok(content) = String::from_utf8(bytes) else {
                continue;
            };
            let updated = reference_re.replace_all(&content, |caps: &regex::Captures| {
                let new = map.get(&caps[2]).unwrap_or(&caps[2]);
                format!("{}{}", &caps[1], new)
            });
            if let Cow::Owned(updated) = updated {
                fs::write(entry.path(), &updated)?;
                let rel = entry
                    .path()
                    .strip_prefix(root)
                    .expect("walked path is under root");
                rewritten.push(fileset::rel_str(rel));
            }
        }
        rewritten.sort();
    }

    // Pass 3: move files to their fingerprinted names. The rename removes
    // the now-orphaned original in the same step.
    for (original, new) in map.iter() {
        fs::rename(root.join(original), root.join(new))?;
    }

    Ok(RevisionOutcome { map, rewritten })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn selector() -> FileSelector {
        FileSelector::many(["**/*.css", "**/*.js"])
    }

    // =========================================================================
    // Naming helpers
    // =========================================================================

    #[test]
    fn fingerprint_is_deterministic_and_short() {
        let fp = fingerprint(b"body {}");
        assert_eq!(fp, fingerprint(b"body {}"));
        assert_eq!(fp.len(), FINGERPRINT_LEN);
        assert_ne!(fp, fingerprint(b"body { }"));
    }

    #[test]
    fn revisioned_path_inserts_before_extension() {
        assert_eq!(
            revisioned_path("css/main.css", "abcdef0123"),
            "css/main-abcdef0123.css"
        );
        assert_eq!(revisioned_path("app.js", "abcdef0123"), "app-abcdef0123.js");
    }

    #[test]
    fn revisioned_path_without_extension_appends() {
        assert_eq!(revisioned_path("LICENSE", "abcdef0123"), "LICENSE-abcdef0123");
    }

    #[test]
    fn is_revisioned_detects_fingerprint_suffix() {
        assert!(is_revisioned("css/main-abcdef0123.css"));
        assert!(!is_revisioned("css/main.css"));
        assert!(!is_revisioned("css/main-tooshort.css"));
        assert!(!is_revisioned("css/main-ABCDEF0123.css"));
        // 10 trailing non-hex chars don't count
        assert!(!is_revisioned("css/main-stylesheet.css"));
    }

    // =========================================================================
    // Full pass
    // =========================================================================

    #[test]
    fn renames_selected_files_and_deletes_originals() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "css/main.css", "body { color: red }");

        let outcome = revision(tmp.path(), &selector()).unwrap();

        assert_eq!(outcome.map.len(), 1);
        let new = outcome.map.get("css/main.css").unwrap();
        assert!(tmp.path().join(new).exists());
        assert!(!tmp.path().join("css/main.css").exists());
    }

    #[test]
    fn rewrites_cross_file_references() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "css/main.css", "body { color: red }");
        write(
            tmp.path(),
            "index.html",
            r#"<link rel="stylesheet" href="css/main.css">"#,
        );

        let outcome = revision(tmp.path(), &selector()).unwrap();

        let new = outcome.map.get("css/main.css").unwrap().to_string();
        let html = fs::read_to_string(tmp.path().join("index.html")).unwrap();
        assert!(html.contains(&new));
        assert!(!html.contains("css/main.css\""));
        assert!(!tmp.path().join("css/main.css").exists());
        assert_eq!(outcome.rewritten, vec!["index.html".to_string()]);
    }

    #[test]
    fn references_resolve_between_revisioned_files() {
        // app.js references main.css; both are in the selected set. The
        // second pass must rewrite app.js regardless of fingerprint order.
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "css/main.css", "body {}");
        write(tmp.path(), "js/app.js", r#"load("css/main.css");"#);

        let outcome = revision(tmp.path(), &selector()).unwrap();

        let new_css = outcome.map.get("css/main.css").unwrap();
        let new_js = outcome.map.get("js/app.js").unwrap();
        let js = fs::read_to_string(tmp.path().join(new_js)).unwrap();
        assert!(js.contains(new_css));
    }

    #[test]
    fn unselected_files_are_never_renamed_or_rewritten() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "img/logo.png", "pngbytes");
        write(tmp.path(), "css/main.css", "h1 { background: url(img/logo.png) }");

        let outcome = revision(tmp.path(), &selector()).unwrap();

        // logo.png is outside the selected set: not renamed, reference kept.
        assert!(tmp.path().join("img/logo.png").exists());
        assert!(outcome.map.get("img/logo.png").is_none());
        let new_css = outcome.map.get("css/main.css").unwrap();
        let css = fs::read_to_string(tmp.path().join(new_css)).unwrap();
        assert!(css.contains("img/logo.png"));
    }

    #[test]
    fn unselected_name_ending_with_a_mapped_path_is_left_alone() {
        // webapp.js is excluded from the set; its name ends with the mapped
        // "app.js" and must survive both on disk and in references.
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "app.js", "var a = 1;");
        write(tmp.path(), "webapp.js", "var w = 1;");
        write(
            tmp.path(),
            "index.html",
            r#"<script src="app.js"></script><script src="webapp.js"></script>"#,
        );

        let selector = FileSelector::one("app.js");
        let outcome = revision(tmp.path(), &selector).unwrap();

        let new = outcome.map.get("app.js").unwrap();
        let html = fs::read_to_string(tmp.path().join("index.html")).unwrap();
        assert!(html.contains(&format!(r#"src="{new}""#)));
        assert!(html.contains(r#"src="webapp.js""#));
        assert!(tmp.path().join("webapp.js").exists());
        assert!(outcome.map.get("webapp.js").is_none());
    }

    #[test]
    fn overlapping_mapped_paths_rewrite_independently() {
        // app.js and app.js.map are both selected; a reference to the map
        // file must take the long match, and neither rewrite may cascade
        // into the other's output.
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "app.js", "code");
        write(tmp.path(), "app.js.map", "{}");
        write(
            tmp.path(),
            "index.html",
            r#"<script src="app.js"></script><a href="app.js.map">map</a>"#,
        );

        let selector = FileSelector::many(["app.js", "app.js.map"]);
        let outcome = revision(tmp.path(), &selector).unwrap();

        let new_js = outcome.map.get("app.js").unwrap();
        let new_map = outcome.map.get("app.js.map").unwrap();
        let html = fs::read_to_string(tmp.path().join("index.html")).unwrap();
        assert!(html.contains(&format!(r#"src="{new_js}""#)));
        assert!(html.contains(&format!(r#"href="{new_map}""#)));
        assert!(tmp.path().join(new_js).exists());
        assert!(tmp.path().join(new_map).exists());
    }

    #[test]
    fn same_content_always_gets_the_same_name() {
        let tmp_a = TempDir::new().unwrap();
        let tmp_b = TempDir::new().unwrap();
        write(tmp_a.path(), "app.js", "console.log(1);");
        write(tmp_b.path(), "app.js", "console.log(1);");

        let a = revision(tmp_a.path(), &selector()).unwrap();
        let b = revision(tmp_b.path(), &selector()).unwrap();

        assert_eq!(a.map.get("app.js"), b.map.get("app.js"));
    }

    #[test]
    fn second_run_without_changes_is_a_noop() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "css/main.css", "body {}");
        write(
            tmp.path(),
            "index.html",
            r#"<link href="css/main.css">"#,
        );

        let first = revision(tmp.path(), &selector()).unwrap();
        assert_eq!(first.map.len(), 1);

        let snapshot = |root: &Path| {
            let mut paths: Vec<_> = walkdir::WalkDir::new(root)
                .into_iter()
                .filter_map(|e| e.ok())
                .map(|e| e.path().to_path_buf())
                .collect();
            paths.sort();
            paths
        };
        let before = snapshot(tmp.path());

        let second = revision(tmp.path(), &selector()).unwrap();
        assert!(second.map.is_empty());
        assert!(second.rewritten.is_empty());
        assert_eq!(snapshot(tmp.path()), before);
    }

    #[test]
    fn binary_files_are_not_rewritten() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "css/main.css", "body {}");
        fs::write(tmp.path().join("blob.bin"), [0xff, 0xfe, 0x00, 0x01]).unwrap();

        revision(tmp.path(), &selector()).unwrap();

        let blob = fs::read(tmp.path().join("blob.bin")).unwrap();
        assert_eq!(blob, [0xff, 0xfe, 0x00, 0x01]);
    }

    #[test]
    fn empty_selection_is_a_noop() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "index.html", "<p>hi</p>");

        let outcome = revision(tmp.path(), &FileSelector::default()).unwrap();
        assert!(outcome.map.is_empty());
        assert!(outcome.rewritten.is_empty());
    }
}
