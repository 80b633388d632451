//! Atomic output-directory swap and post-swap cleanup.
//!
//! The working (build) directory becomes the distribution directory with a
//! single `rename`. That rename is the atomic-visibility point: an external
//! viewer sees either the prior complete distribution or the new complete
//! one, never a half-written tree. Deleting the old distribution happens
//! immediately before the rename, so both operations together are the last
//! destructive acts of a build.
//!
//! If the working directory doesn't exist (an earlier stage aborted before
//! setup), finalization is a no-op rather than an error.

use crate::config::BuildConfig;
use crate::fileset::{self, FileSelector};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FinalizeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    FileSet(#[from] fileset::FileSetError),
}

/// What finalization did, for logging.
#[derive(Debug, Default)]
pub struct FinalizeOutcome {
    /// Whether the working directory was swapped into the dist location.
    pub swapped: bool,
    /// Relative paths removed by the `clean_after` pass.
    pub removed: Vec<PathBuf>,
}

/// Swap the working directory into the distribution location, then remove
/// `clean_after` globs from the now-final directory.
pub fn finalize(config: &BuildConfig) -> Result<FinalizeOutcome, FinalizeError> {
    let build = Path::new(&config.build_path);
    let dist = Path::new(&config.dist_path);

    if !build.exists() {
        return Ok(FinalizeOutcome::default());
    }

    if dist.exists() {
        fs::remove_dir_all(dist)?;
    }
    fs::rename(build, dist)?;

    let removed = clean(dist, &config.clean_after)?;
    Ok(FinalizeOutcome {
        swapped: true,
        removed,
    })
}

/// Remove files and directories matching `selector` under `root`.
/// Returns the removed relative paths, sorted.
pub fn clean(root: &Path, selector: &FileSelector) -> Result<Vec<PathBuf>, FinalizeError> {
    let mut removed = Vec::new();
    for record in fileset::select(root, selector)? {
        // A parent directory earlier in the sorted set may have taken
        // this entry with it already.
        if !record.abs_path.exists() {
            continue;
        }
        if record.is_file {
            fs::remove_file(&record.abs_path)?;
        } else {
            fs::remove_dir_all(&record.abs_path)?;
        }
        removed.push(record.rel_path);
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config_in(tmp: &TempDir) -> BuildConfig {
        let mut config = BuildConfig::default();
        config.src_path = tmp.path().join("src").display().to_string();
        config.build_path = tmp.path().join("build").display().to_string();
        config.dist_path = tmp.path().join("dist").display().to_string();
        config
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn missing_build_dir_is_a_noop() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);

        let outcome = finalize(&config).unwrap();
        assert!(!outcome.swapped);
        assert!(!Path::new(&config.dist_path).exists());
    }

    #[test]
    fn swap_replaces_prior_dist_exactly() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);
        let build = Path::new(&config.build_path);
        let dist = Path::new(&config.dist_path);

        write(dist, "stale.html", "old");
        write(dist, "old/only.css", "old");
        write(build, "index.html", "new");
        write(build, "css/main.css", "new css");

        let outcome = finalize(&config).unwrap();
        assert!(outcome.swapped);

        // Old contents gone, new contents exactly in place.
        assert!(!dist.join("stale.html").exists());
        assert!(!dist.join("old").exists());
        assert_eq!(fs::read_to_string(dist.join("index.html")).unwrap(), "new");
        assert_eq!(
            fs::read_to_string(dist.join("css/main.css")).unwrap(),
            "new css"
        );
        // The working directory no longer exists after the rename.
        assert!(!build.exists());
    }

    #[test]
    fn clean_after_prunes_final_directory() {
        let tmp = TempDir::new().unwrap();
        let mut config = config_in(&tmp);
        config.clean_after = FileSelector::many(["**/*.map", "notes"]);
        let build = Path::new(&config.build_path);

        write(build, "app.js", "code");
        write(build, "app.js.map", "map");
        write(build, "notes/todo.txt", "x");

        let outcome = finalize(&config).unwrap();
        let dist = Path::new(&config.dist_path);

        assert!(dist.join("app.js").exists());
        assert!(!dist.join("app.js.map").exists());
        assert!(!dist.join("notes").exists());
        assert_eq!(outcome.removed.len(), 2);
    }

    #[test]
    fn clean_handles_directory_selected_before_children() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "junk/deep/file.txt", "x");

        let removed = clean(tmp.path(), &FileSelector::one("junk/**/*")).unwrap();
        // deep/ was removed with its file in one remove_dir_all.
        assert!(!tmp.path().join("junk/deep").exists());
        assert!(!removed.is_empty());
    }
}
