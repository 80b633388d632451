//! Stage implementations and the dispatch from [`StageKind`] to behavior.
//!
//! A stage is a function over a [`StageContext`]: it reads the immutable
//! config, calls collaborators through the [`Toolchain`] seams, and touches
//! only the directory roots its contract names. Stages before `setup` read
//! the source tree; `setup` through `finalize` operate on the working
//! directory; `validate-markup` and `report` read the finished distribution.
//!
//! Every stage is a no-op when its config table is absent, so dispatch stays
//! total even if a caller runs a stage outside a computed plan.

use crate::cache::{hash_bytes, StageCache};
use crate::config::BuildConfig;
use crate::fileset::{self, FileSelector, FileSetError};
use crate::finalize::{self, FinalizeError};
use crate::output::{print_action, print_action_sized, print_skip, Action};
use crate::plan::StageKind;
use crate::report::{self, Report};
use crate::revision::{self, RevisionError};
use crate::toolchain::{Toolchain, TransformError};
use image::imageops::FilterType;
use rayon::prelude::*;
use regex::Regex;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum StageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    FileSet(#[from] FileSetError),
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("{path}: {source}")]
    Transform {
        path: String,
        source: TransformError,
    },
    #[error("{path}: {source}")]
    Image {
        path: String,
        source: image::ImageError,
    },
    #[error(transparent)]
    Revision(#[from] RevisionError),
    #[error(transparent)]
    Finalize(#[from] FinalizeError),
}

impl StageError {
    fn transform(path: impl Into<String>) -> impl FnOnce(TransformError) -> Self {
        let path = path.into();
        move |source| StageError::Transform { path, source }
    }
}

/// Everything a stage may touch during one build.
pub struct StageContext<'a> {
    pub config: &'a BuildConfig,
    pub toolchain: &'a Toolchain,
    pub cache: &'a mut StageCache,
    /// Filled in by the report stage, for callers that want the numbers.
    pub report: Option<Report>,
}

/// Run one stage against the context.
pub fn run_stage(kind: StageKind, ctx: &mut StageContext) -> Result<(), StageError> {
    match kind {
        StageKind::LintScripts | StageKind::LintStyles => lint(ctx, kind),
        StageKind::Setup => setup(ctx),
        StageKind::Templates => templates(ctx),
        StageKind::Styles => styles(ctx),
        StageKind::CollectAssets => collect_assets(ctx),
        StageKind::MinifyScripts => {
            let Some(cfg) = &ctx.config.minify_scripts else {
                return Ok(());
            };
            let minifier = &ctx.toolchain.script_minifier;
            minify_in_place(Path::new(&ctx.config.build_path), &cfg.files, &|s| {
                minifier.minify(s)
            })
        }
        StageKind::MinifyMarkup => {
            let Some(cfg) = &ctx.config.minify_markup else {
                return Ok(());
            };
            let minifier = &ctx.toolchain.markup_minifier;
            minify_in_place(Path::new(&ctx.config.build_path), &cfg.files, &|s| {
                minifier.minify(s)
            })
        }
        StageKind::PruneStyles => prune_styles(ctx),
        StageKind::MinifyStyles => {
            let Some(cfg) = &ctx.config.minify_styles else {
                return Ok(());
            };
            let minifier = &ctx.toolchain.style_minifier;
            minify_in_place(Path::new(&ctx.config.build_path), &cfg.files, &|s| {
                minifier.minify(s)
            })
        }
        StageKind::Sitemap => sitemap(ctx),
        StageKind::IconManifest => icon_manifest(ctx),
        StageKind::GenerateImages => generate_images(ctx),
        StageKind::OptimizeImages => optimize_images(ctx),
        StageKind::Revision => revision_stage(ctx),
        StageKind::Finalize => finalize_stage(ctx),
        StageKind::ValidateMarkup => validate_markup(ctx),
        StageKind::Report => report_stage(ctx),
    }
}

// =============================================================================
// Lint stages
// =============================================================================

fn lint(ctx: &mut StageContext, kind: StageKind) -> Result<(), StageError> {
    let (cfg, linter) = match kind {
        StageKind::LintScripts => (&ctx.config.lint_scripts, &ctx.toolchain.script_linter),
        _ => (&ctx.config.lint_styles, &ctx.toolchain.style_linter),
    };
    let Some(cfg) = cfg else {
        return Ok(());
    };
    let stage = kind.name();
    let root = Path::new(&ctx.config.src_path);

    for record in fileset::select(root, &cfg.files)? {
        if !record.is_file {
            continue;
        }
        let source = fs::read_to_string(&record.abs_path)?;
        let hash = hash_bytes(source.as_bytes());
        let rel = fileset::rel_str(&record.rel_path);
        if ctx.cache.is_unchanged(stage, &rel, &hash) {
            continue;
        }
        linter
            .lint(&record.rel_path, &source)
            .map_err(StageError::transform(rel.clone()))?;
        ctx.cache.record(stage, rel, hash);
    }
    Ok(())
}

// =============================================================================
// Setup: fresh working directory
// =============================================================================

fn setup(ctx: &mut StageContext) -> Result<(), StageError> {
    let src = Path::new(&ctx.config.src_path);
    let build = Path::new(&ctx.config.build_path);

    if build.exists() {
        fs::remove_dir_all(build)?;
    }
    fs::create_dir_all(build)?;
    copy_dir_recursive(src, build)?;

    for rel in finalize::clean(build, &ctx.config.clean_before)? {
        print_action(Action::Remove, build, &rel);
    }
    Ok(())
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<(), StageError> {
    if !src.exists() {
        return Ok(());
    }
    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .expect("walked path is under root");
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

// =============================================================================
// Templates
// =============================================================================

fn templates(ctx: &mut StageContext) -> Result<(), StageError> {
    let Some(cfg) = &ctx.config.templates else {
        return Ok(());
    };
    let src = Path::new(&ctx.config.src_path);
    let build = Path::new(&ctx.config.build_path);
    let shared = cfg
        .data
        .as_ref()
        .map(toml_to_json)
        .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()));

    for record in fileset::select(src, &cfg.files)? {
        if !record.is_file {
            continue;
        }
        let rel = fileset::rel_str(&record.rel_path);
        let out_rel = strip_marker(&rel, &cfg.id);

        let mut context = shared.clone();
        let sidecar = context_sidecar(&out_rel, &cfg.context_id);
        let sidecar_path = src.join(&sidecar);
        if sidecar_path.exists() {
            let raw = fs::read_to_string(&sidecar_path)?;
            let own: serde_json::Value = serde_json::from_str(&raw).map_err(|e| {
                StageError::Transform {
                    path: sidecar.clone(),
                    source: TransformError::msg(e.to_string()),
                }
            })?;
            context = merge_context(context, own);
        }

        let source = fs::read_to_string(&record.abs_path)?;
        let rendered = ctx
            .toolchain
            .templates
            .render(&record.rel_path, &source, &context)
            .map_err(StageError::transform(rel))?;

        let out_path = build.join(&out_rel);
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&out_path, rendered)?;
        print_action(Action::Create, build, Path::new(&out_rel));
    }
    Ok(())
}

/// Strip the template id marker from the filename part of a relative path
/// (`about.tpl.html` -> `about.html`). Directory segments are never touched.
fn strip_marker(rel: &str, id: &str) -> String {
    if id.is_empty() {
        return rel.to_string();
    }
    match rel.rsplit_once('/') {
        Some((dir, name)) => format!("{}/{}", dir, name.replacen(id, "", 1)),
        None => rel.replacen(id, "", 1),
    }
}

/// Sidecar context filename for an output path (`about.html` -> `about.ctx.json`).
fn context_sidecar(rel: &str, context_id: &str) -> String {
    let (dir, name) = rel.rsplit_once('/').map_or(("", rel), |(d, n)| (d, n));
    let stem = name.rsplit_once('.').map_or(name, |(s, _)| s);
    let file = format!("{stem}{context_id}.json");
    if dir.is_empty() {
        file
    } else {
        format!("{dir}/{file}")
    }
}

fn toml_to_json(value: &toml::Value) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

/// Recursively merge `overlay` on top of `base`; objects merge key-by-key,
/// everything else is replaced.
fn merge_context(base: serde_json::Value, overlay: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_val) => merge_context(base_val, overlay_val),
                    None => overlay_val,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

// =============================================================================
// Styles
// =============================================================================

fn styles(ctx: &mut StageContext) -> Result<(), StageError> {
    let Some(cfg) = &ctx.config.styles else {
        return Ok(());
    };
    let src = Path::new(&ctx.config.src_path);
    let build = Path::new(&ctx.config.build_path);

    for record in fileset::select(src, &cfg.files)? {
        if !record.is_file {
            continue;
        }
        let rel = fileset::rel_str(&record.rel_path);
        let source = fs::read_to_string(&record.abs_path)?;
        let compiled = ctx
            .toolchain
            .styles
            .compile(&record.rel_path, &source)
            .map_err(StageError::transform(rel.clone()))?;

        let out_rel = with_css_extension(&rel);
        let out_path = build.join(&out_rel);
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&out_path, compiled)?;
        print_action(Action::Create, build, Path::new(&out_rel));
    }
    Ok(())
}

/// Swap the filename extension for `.css` (`css/site.scss` -> `css/site.css`).
fn with_css_extension(rel: &str) -> String {
    let (dir, name) = rel.rsplit_once('/').map_or(("", rel), |(d, n)| (d, n));
    let stem = name.rsplit_once('.').map_or(name, |(s, _)| s);
    if dir.is_empty() {
        format!("{stem}.css")
    } else {
        format!("{dir}/{stem}.css")
    }
}

// =============================================================================
// Asset bundling: build-block concatenation
// =============================================================================

fn collect_assets(ctx: &mut StageContext) -> Result<(), StageError> {
    let Some(cfg) = &ctx.config.collect_assets else {
        return Ok(());
    };
    let build = Path::new(&ctx.config.build_path);
    let block_re = Regex::new(
        r"(?s)<!--\s*build:(css|js)\s+(\S+)\s*-->(.*?)<!--\s*endbuild\s*-->",
    )
    .expect("valid regex");
    let ref_re = Regex::new(r#"(?:href|src)\s*=\s*["']([^"']+)["']"#).expect("valid regex");

    for record in fileset::select(build, &cfg.files)? {
        if !record.is_file {
            continue;
        }
        let content = fs::read_to_string(&record.abs_path)?;
        let mut out = String::with_capacity(content.len());
        let mut last = 0;

        for caps in block_re.captures_iter(&content) {
            let whole = caps.get(0).expect("match has a full group");
            let target = caps[2].to_string();
            let target_rel = target.trim_start_matches('/').to_string();

            let mut bundle = String::new();
            for ref_caps in ref_re.captures_iter(&caps[3]) {
                let asset_rel = ref_caps[1].trim_start_matches('/').to_string();
                let piece = fs::read_to_string(build.join(&asset_rel))?;
                if !bundle.is_empty() {
                    bundle.push('\n');
                }
                bundle.push_str(&piece);
            }
            let bundle_path = build.join(&target_rel);
            if let Some(parent) = bundle_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&bundle_path, &bundle)?;
            print_action(Action::Create, build, Path::new(&target_rel));

            out.push_str(&content[last..whole.start()]);
            match &caps[1] {
                "css" => out.push_str(&format!(r#"<link rel="stylesheet" href="{target}">"#)),
                _ => out.push_str(&format!(r#"<script src="{target}"></script>"#)),
            }
            last = whole.end();
        }

        if last > 0 {
            out.push_str(&content[last..]);
            fs::write(&record.abs_path, &out)?;
            print_action(Action::Edit, build, &record.rel_path);
        }
    }
    Ok(())
}

// =============================================================================
// In-place minification
// =============================================================================

fn minify_in_place(
    root: &Path,
    files: &FileSelector,
    apply: &dyn Fn(&str) -> Result<String, TransformError>,
) -> Result<(), StageError> {
    for record in fileset::select(root, files)? {
        if !record.is_file {
            continue;
        }
        let source = fs::read_to_string(&record.abs_path)?;
        let minified =
            apply(&source).map_err(StageError::transform(fileset::rel_str(&record.rel_path)))?;
        if minified != source {
            fs::write(&record.abs_path, &minified)?;
            print_action(Action::Edit, root, &record.rel_path);
        }
    }
    Ok(())
}

fn prune_styles(ctx: &mut StageContext) -> Result<(), StageError> {
    let Some(cfg) = &ctx.config.prune_styles else {
        return Ok(());
    };
    let build = Path::new(&ctx.config.build_path);

    let mut markup = Vec::new();
    for record in fileset::select(build, &cfg.content)? {
        if record.is_file {
            markup.push(fs::read_to_string(&record.abs_path)?);
        }
    }

    for record in fileset::select(build, &cfg.files)? {
        if !record.is_file {
            continue;
        }
        let source = fs::read_to_string(&record.abs_path)?;
        let pruned = ctx
            .toolchain
            .style_pruner
            .prune(&source, &markup)
            .map_err(StageError::transform(fileset::rel_str(&record.rel_path)))?;
        if pruned != source {
            fs::write(&record.abs_path, &pruned)?;
            print_action(Action::Edit, build, &record.rel_path);
        }
    }
    Ok(())
}

// =============================================================================
// Generated artifacts: sitemap, icon manifest
// =============================================================================

fn sitemap(ctx: &mut StageContext) -> Result<(), StageError> {
    let Some(cfg) = &ctx.config.sitemap else {
        return Ok(());
    };
    let build = Path::new(&ctx.config.build_path);
    let site = cfg.site_url.trim_end_matches('/');

    let mut urls = Vec::new();
    for record in fileset::select(build, &cfg.files)? {
        if record.is_file {
            urls.push(page_url(site, &fileset::rel_str(&record.rel_path)));
        }
    }
    urls.sort();

    let mut body = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    body.push_str("<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n");
    for url in &urls {
        body.push_str(&format!("  <url><loc>{url}</loc></url>\n"));
    }
    body.push_str("</urlset>\n");

    fs::write(build.join("sitemap.xml"), body)?;
    print_action(Action::Create, build, Path::new("sitemap.xml"));
    Ok(())
}

/// Canonical URL for a markup file: `index.html` collapses to its directory.
fn page_url(site: &str, rel: &str) -> String {
    if rel == "index.html" {
        format!("{site}/")
    } else if let Some(dir) = rel.strip_suffix("/index.html") {
        format!("{site}/{dir}/")
    } else {
        format!("{site}/{rel}")
    }
}

fn icon_manifest(ctx: &mut StageContext) -> Result<(), StageError> {
    let Some(cfg) = &ctx.config.icon_manifest else {
        return Ok(());
    };
    let build = Path::new(&ctx.config.build_path);

    let body = format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<browserconfig>
  <msapplication>
    <tile>
      <square70x70logo src="{}"/>
      <square150x150logo src="{}"/>
      <wide310x150logo src="{}"/>
      <square310x310logo src="{}"/>
      <TileColor>{}</TileColor>
    </tile>
  </msapplication>
</browserconfig>
"#,
        cfg.tile_70x70, cfg.tile_150x150, cfg.tile_310x150, cfg.tile_310x310, cfg.tile_color
    );

    fs::write(build.join("browserconfig.xml"), body)?;
    print_action(Action::Create, build, Path::new("browserconfig.xml"));
    Ok(())
}

// =============================================================================
// Images
// =============================================================================

fn generate_images(ctx: &mut StageContext) -> Result<(), StageError> {
    let Some(sets) = &ctx.config.generate_images else {
        return Ok(());
    };
    let build = Path::new(&ctx.config.build_path);

    for set in sets {
        let img = image::open(build.join(&set.source)).map_err(|source| StageError::Image {
            path: set.source.clone(),
            source,
        })?;

        set.sizes.par_iter().try_for_each(|&[width, height]| -> Result<(), StageError> {
            let target_rel = set
                .target
                .replace("{width}", &width.to_string())
                .replace("{height}", &height.to_string());
            let target = build.join(&target_rel);
            // Existing targets are authoritative, e.g. hand-tuned crops.
            if target.exists() {
                return Ok(());
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            img.resize_exact(width, height, FilterType::Lanczos3)
                .save(&target)
                .map_err(|source| StageError::Image {
                    path: target_rel.clone(),
                    source,
                })?;
            print_action(Action::Create, build, Path::new(&target_rel));
            Ok(())
        })?;
    }
    Ok(())
}

fn optimize_images(ctx: &mut StageContext) -> Result<(), StageError> {
    let Some(cfg) = &ctx.config.optimize_images else {
        return Ok(());
    };
    let build = Path::new(&ctx.config.build_path);

    for record in fileset::select(build, &cfg.files)? {
        if !record.is_file {
            continue;
        }
        let rel = fileset::rel_str(&record.rel_path);
        let img = image::open(&record.abs_path).map_err(|source| StageError::Image {
            path: rel.clone(),
            source,
        })?;
        let format =
            image::ImageFormat::from_path(&record.abs_path).map_err(|source| StageError::Image {
                path: rel.clone(),
                source,
            })?;
        let mut buf = Vec::new();
        img.write_to(&mut io::Cursor::new(&mut buf), format)
            .map_err(|source| StageError::Image { path: rel, source })?;
        // Re-encoding only pays off when it actually shrinks the file.
        if (buf.len() as u64) < record.len {
            fs::write(&record.abs_path, &buf)?;
            print_action(Action::Edit, build, &record.rel_path);
        }
    }
    Ok(())
}

// =============================================================================
// Revision, finalize, validate, report
// =============================================================================

fn revision_stage(ctx: &mut StageContext) -> Result<(), StageError> {
    let Some(cfg) = &ctx.config.revision else {
        return Ok(());
    };
    let build = Path::new(&ctx.config.build_path);
    let outcome = revision::revision(build, &cfg.files)?;

    for (original, new) in outcome.map.iter() {
        print_action(Action::Remove, build, Path::new(original));
        print_action(Action::Create, build, Path::new(new));
    }
    for rel in &outcome.rewritten {
        print_action(Action::Edit, build, Path::new(rel));
    }
    Ok(())
}

fn finalize_stage(ctx: &mut StageContext) -> Result<(), StageError> {
    let outcome = finalize::finalize(ctx.config)?;
    if outcome.swapped {
        let dist = Path::new(&ctx.config.dist_path);
        for rel in &outcome.removed {
            print_action(Action::Remove, dist, rel);
        }
        // Finalized files are the ones that shipped; log each with its size.
        for entry in WalkDir::new(dist).min_depth(1) {
            let entry = entry?;
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(dist)
                .expect("walked path is under root");
            print_action_sized(Action::Create, dist, rel, meta.len());
        }
    }
    Ok(())
}

fn validate_markup(ctx: &mut StageContext) -> Result<(), StageError> {
    let Some(cfg) = &ctx.config.validate_markup else {
        return Ok(());
    };
    let validator = &ctx.toolchain.markup_validator;
    if !validator.available() {
        print_skip(StageKind::ValidateMarkup.name(), "validator unavailable");
        return Ok(());
    }
    let dist = Path::new(&ctx.config.dist_path);

    for record in fileset::select(dist, &cfg.files)? {
        if !record.is_file {
            continue;
        }
        let rel = fileset::rel_str(&record.rel_path);
        let source = fs::read_to_string(&record.abs_path)?;
        let findings = validator
            .validate(&record.rel_path, &source)
            .map_err(StageError::transform(rel.clone()))?;
        // Findings are advisory; the build already shipped.
        for finding in findings {
            println!("{rel}: {finding}");
        }
    }
    Ok(())
}

fn report_stage(ctx: &mut StageContext) -> Result<(), StageError> {
    let report = report::build_report(Path::new(&ctx.config.dist_path))?;
    report::print_report(&report);
    ctx.report = Some(report);
    Ok(())
}
