//! Build instances: validated config + computed plan + owned cache.
//!
//! A [`BuildInstance`] is constructed once from a validated config; its plan
//! and identity never change afterward. Builds are serialized process-wide
//! by a mutex because every stage works through shared on-disk directories —
//! two interleaved builds would corrupt each other's working tree. Distinct
//! instances can still alternate builds; each keeps its own lint cache.
//!
//! ## Failure handling
//!
//! A failing stage aborts the rest of the plan, deletes the working
//! directory, and surfaces the error to the caller. The previous
//! distribution directory is untouched: the swap in `finalize` is the only
//! point where it changes, and a build that dies earlier never reaches it.
//! `serve` reports rebuild failures and keeps watching.

use crate::cache::StageCache;
use crate::config::{BuildConfig, ConfigError};
use crate::output::print_failure;
use crate::plan::{compute_plan, StageKind};
use crate::report::Report;
use crate::stages::{run_stage, StageContext, StageError};
use crate::toolchain::Toolchain;
use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Mutex};
use std::time::Duration;
use thiserror::Error;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Builds touch shared directories, so only one may run at a time.
static BUILD_LOCK: Mutex<()> = Mutex::new(());

#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("stage '{stage}' failed: {source}")]
    Stage {
        stage: &'static str,
        source: StageError,
    },
    #[error("watch error: {0}")]
    Watch(String),
}

/// One configured build pipeline, ready to run any number of times.
pub struct BuildInstance {
    config: BuildConfig,
    plan: Vec<StageKind>,
    cache: StageCache,
    toolchain: Toolchain,
}

impl BuildInstance {
    /// Validate the config, compute the plan, and claim an instance id.
    pub fn new(config: BuildConfig, toolchain: Toolchain) -> Result<Self, BuildError> {
        config.validate()?;
        let plan = compute_plan(&config);
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        Ok(Self {
            cache: StageCache::new(id),
            config,
            plan,
            toolchain,
        })
    }

    /// Identity of this instance, which doubles as its cache namespace.
    pub fn id(&self) -> u64 {
        self.cache.instance_id()
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// The ordered stages this instance will run.
    pub fn plan(&self) -> &[StageKind] {
        &self.plan
    }

    /// Run the full plan once. Returns the size report when the plan
    /// includes the report stage.
    pub fn build(&mut self) -> Result<Option<Report>, BuildError> {
        let _guard = BUILD_LOCK
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut ctx = StageContext {
            config: &self.config,
            toolchain: &self.toolchain,
            cache: &mut self.cache,
            report: None,
        };
        for &kind in &self.plan {
            if let Err(source) = run_stage(kind, &mut ctx) {
                let stage = kind.name();
                print_failure(stage, &source.to_string());
                let build_dir = Path::new(&self.config.build_path);
                if build_dir.exists() {
                    // Best effort: a half-built tree must not survive.
                    let _ = fs::remove_dir_all(build_dir);
                }
                return Err(BuildError::Stage { stage, source });
            }
        }
        Ok(ctx.report.take())
    }

    /// Build once, then rebuild on every debounced change under the source
    /// tree. Rebuild failures are reported and watching continues; the
    /// reload notifier fires only after successful rebuilds.
    pub fn serve(&mut self) -> Result<(), BuildError> {
        if self.build().is_err() {
            eprintln!("Initial build failed; watching for changes.");
        }

        let debounce = Duration::from_millis(self.config.server.debounce_ms);
        let src = self.config.src_path.clone();
        let (tx, rx) = mpsc::channel();
        let mut debouncer =
            new_debouncer(debounce, tx).map_err(|e| BuildError::Watch(e.to_string()))?;
        debouncer
            .watcher()
            .watch(Path::new(&src), RecursiveMode::Recursive)
            .map_err(|e| BuildError::Watch(e.to_string()))?;

        println!("Watching {src} for changes");
        loop {
            match rx.recv() {
                Ok(Ok(_events)) => {
                    if self.build().is_ok() {
                        self.toolchain.reload.reload();
                    }
                }
                Ok(Err(error)) => eprintln!("watch error: {error}"),
                Err(_) => break,
            }
        }
        Ok(())
    }
}
