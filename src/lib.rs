//! # Gristmill
//!
//! A configurable build pipeline for static sites. The config file is the
//! pipeline: every stage is gated by the presence of its table in
//! `gristmill.toml`, and the stage order is fixed, so a build always means
//! the same thing regardless of which subset of stages a project enables.
//!
//! # Architecture: One Pass Through a Working Directory
//!
//! A build flows through three directory roots:
//!
//! ```text
//! src/  →  .gristmill-build/  →  dist/
//! read     staged in place       swapped in atomically
//! ```
//!
//! Stages before `setup` read the source tree; `setup` clones it into the
//! working directory and every middle stage transforms that copy in place;
//! `finalize` renames the working directory over `dist/` in one step. The
//! source tree is never written to, and the distribution directory is either
//! the previous complete build or the new complete build — never a mix.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | Typed `gristmill.toml` schema, layered loading, validation |
//! | [`plan`] | The ordered, gated stage table and plan computation |
//! | [`stages`] | Stage implementations and the [`StageKind`](plan::StageKind) dispatch |
//! | [`instance`] | A validated config + plan + cache, with the build lock and watch loop |
//! | [`fileset`] | Glob selection (`!`-prefixed exclusions) rooted at a directory |
//! | [`toolchain`] | Collaborator traits (templates, styles, minifiers, linters) and built-ins |
//! | [`revision`] | Content-hash fingerprinting with cross-file reference rewriting |
//! | [`finalize`] | The atomic dist swap and glob-based cleanup |
//! | [`cache`] | Per-instance content-hash cache for incremental linting |
//! | [`report`] | Post-build size report over the distribution directory |
//! | [`output`] | CLI output formatting — action lines, skip notices, sizes |
//!
//! # Design Decisions
//!
//! ## Presence-Gated Stages
//!
//! A stage runs if and only if its config table exists. There is no
//! `enabled = true` flag to keep in sync with the table: deleting the table
//! is disabling the stage. With no tables at all, a build degenerates to
//! copying `src/` into `dist/`, which is a useful smoke test on its own.
//!
//! ## Collaborators Behind Traits
//!
//! The pipeline never names a concrete template engine or minifier: stages
//! call through the [`toolchain`] seams, and the default
//! [`Toolchain`](toolchain::Toolchain) ships conservative built-ins (lightningcss for
//! styles, a substitution-plus-markdown template engine). Embedders swap in
//! their own implementations per seam without touching stage code.
//!
//! ## Failure Means Rollback
//!
//! A failing stage deletes the working directory and propagates the error.
//! The previous `dist/` survives untouched because nothing before `finalize`
//! ever writes there.

pub mod cache;
pub mod config;
pub mod fileset;
pub mod finalize;
pub mod instance;
pub mod output;
pub mod plan;
pub mod report;
pub mod revision;
pub mod stages;
pub mod toolchain;
