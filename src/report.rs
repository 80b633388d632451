//! Post-build size report over the distribution directory.
//!
//! The report is a snapshot of what a build actually shipped: total file
//! count and byte size, broken down per file extension. It reads the final
//! directory directly rather than accumulating counters during the run, so
//! it reflects exactly what ended up on disk after cleanup and revisioning.

use crate::fileset;
use crate::output::format_size;
use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

/// Per-extension slice of the report.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TypeSummary {
    pub amount: u64,
    pub size: u64,
    /// Every file of this type as `(relative path, bytes)`, sorted by path.
    pub files: Vec<(String, u64)>,
}

/// Aggregate size report for one build output.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Report {
    pub total_amount: u64,
    pub total_size: u64,
    /// Keyed by extension including the dot (".css"), or "" for files
    /// without an extension. BTreeMap keeps the printout ordering stable.
    pub types: BTreeMap<String, TypeSummary>,
}

/// Extension key for a path: ".css" style, lowercased, "" when absent.
fn type_key(rel: &Path) -> String {
    match rel.extension() {
        Some(ext) => format!(".{}", ext.to_string_lossy().to_lowercase()),
        None => String::new(),
    }
}

/// Walk `dist` and aggregate every regular file into a [`Report`].
///
/// A missing or empty directory yields an empty report rather than an error.
pub fn build_report(dist: &Path) -> io::Result<Report> {
    let mut report = Report::default();
    if !dist.exists() {
        return Ok(report);
    }
    for entry in WalkDir::new(dist).min_depth(1) {
        let entry = entry.map_err(io::Error::other)?;
        let meta = entry.metadata().map_err(io::Error::other)?;
        if !meta.is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(dist)
            .expect("walked path is under root");
        let key = type_key(entry.path());
        let summary = report.types.entry(key).or_default();
        summary.amount += 1;
        summary.size += meta.len();
        summary.files.push((fileset::rel_str(rel), meta.len()));
        report.total_amount += 1;
        report.total_size += meta.len();
    }
    for summary in report.types.values_mut() {
        summary.files.sort();
    }
    Ok(report)
}

/// Format the report for terminal display.
pub fn format_report(report: &Report) -> String {
    let mut out = String::new();
    out.push_str("Build report\n");
    out.push_str("------------\n");
    out.push_str(&format!(
        "A total of {} files weighing {} were generated.\n",
        report.total_amount,
        format_size(report.total_size)
    ));
    for (key, summary) in &report.types {
        let label = if key.is_empty() { "(no extension)" } else { key };
        out.push_str(&format!(
            "{}: {} files, {}\n",
            label,
            summary.amount,
            format_size(summary.size)
        ));
        for (path, size) in &summary.files {
            out.push_str(&format!("  {} ({})\n", path, format_size(*size)));
        }
    }
    out
}

/// Print the report to stdout.
pub fn print_report(report: &Report) {
    print!("{}", format_report(report));
}
