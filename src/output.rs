//! CLI output formatting for the build pipeline.
//!
//! Every stage reports file activity through the same three action markers:
//!
//! ```text
//! + css/main.css        created
//! > index.html          edited in place
//! x js/app.js           removed
//! ```
//!
//! Finalized files additionally carry their size. Skipped stages get a
//! one-line notice naming the stage and the reason.
//!
//! # Architecture
//!
//! Each line has a `format_*` function (returns `String`) for testability
//! and a `print_*` wrapper that writes to stdout. Format functions are pure —
//! no I/O, no side effects.

use std::path::Path;

/// What happened to a file during a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Edit,
    Remove,
}

impl Action {
    /// Single-character marker used as the line prefix.
    pub fn marker(self) -> char {
        match self {
            Action::Create => '+',
            Action::Edit => '>',
            Action::Remove => 'x',
        }
    }
}

/// Format a per-file action line: marker, path, optional size.
pub fn format_action(action: Action, root: &Path, rel: &Path, size: Option<u64>) -> String {
    let path = root.join(rel);
    match size {
        Some(bytes) => format!(
            "{} {} ({})",
            action.marker(),
            path.display(),
            format_size(bytes)
        ),
        None => format!("{} {}", action.marker(), path.display()),
    }
}

/// Print a per-file action line to stdout.
pub fn print_action(action: Action, root: &Path, rel: &Path) {
    println!("{}", format_action(action, root, rel, None));
}

/// Print a per-file action line with the file size appended.
pub fn print_action_sized(action: Action, root: &Path, rel: &Path, size: u64) {
    println!("{}", format_action(action, root, rel, Some(size)));
}

/// Format a stage-skip notice.
pub fn format_skip(stage: &str, reason: &str) -> String {
    format!("Skipping '{}': {}", stage, reason)
}

/// Print a stage-skip notice.
pub fn print_skip(stage: &str, reason: &str) {
    println!("{}", format_skip(stage, reason));
}

/// Format a stage-failure notice.
pub fn format_failure(stage: &str, reason: &str) -> String {
    format!("Stage '{}' failed: {}", stage, reason)
}

/// Print a stage-failure notice to stderr.
pub fn print_failure(stage: &str, reason: &str) {
    eprintln!("{}", format_failure(stage, reason));
}

/// Format a byte count as a human-readable decimal size, rounded to whole units.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["kB", "MB", "GB", "TB"];
    if bytes < 1000 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = "B";
    for next in UNITS {
        if value < 1000.0 {
            break;
        }
        value /= 1000.0;
        unit = next;
    }
    format!("{} {}", value.round() as u64, unit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn action_markers() {
        assert_eq!(Action::Create.marker(), '+');
        assert_eq!(Action::Edit.marker(), '>');
        assert_eq!(Action::Remove.marker(), 'x');
    }

    #[test]
    fn format_action_without_size() {
        let line = format_action(
            Action::Create,
            &PathBuf::from("build"),
            &PathBuf::from("css/main.css"),
            None,
        );
        assert_eq!(line, "+ build/css/main.css");
    }

    #[test]
    fn format_action_with_size() {
        let line = format_action(
            Action::Edit,
            &PathBuf::from("dist"),
            &PathBuf::from("index.html"),
            Some(2048),
        );
        assert_eq!(line, "> dist/index.html (2 kB)");
    }

    #[test]
    fn format_skip_names_stage_and_reason() {
        assert_eq!(
            format_skip("validate-markup", "validator unavailable"),
            "Skipping 'validate-markup': validator unavailable"
        );
    }

    #[test]
    fn format_size_bytes() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(999), "999 B");
    }

    #[test]
    fn format_size_rounds_units() {
        assert_eq!(format_size(1000), "1 kB");
        assert_eq!(format_size(1499), "1 kB");
        assert_eq!(format_size(1500), "2 kB");
        assert_eq!(format_size(3_200_000), "3 MB");
        assert_eq!(format_size(7_800_000_000), "8 GB");
    }
}
