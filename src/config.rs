//! Build configuration: typed schema, layered loading, validation.
//!
//! A [`BuildConfig`] is the single source of truth for one build instance.
//! It is resolved once — stock defaults, then an optional `gristmill.toml`,
//! then programmatic overrides, merged layer by layer — validated, and
//! immutable for the duration of the build.
//!
//! ## Shape checking
//!
//! The configuration schema is the type system: every recognized key maps to
//! a typed field, `deny_unknown_fields` rejects unrecognized keys at
//! deserialization time, and a wrong value type is a parse error naming the
//! offending key. No file I/O happens until the config has deserialized and
//! validated cleanly.
//!
//! ## Stage gating
//!
//! Each pipeline stage is gated by the presence of its config table:
//!
//! ```toml
//! src_path = "src"
//! build_path = ".gristmill-build"
//! dist_path = "dist"
//!
//! [styles]                 # table present -> stage runs
//! files = "**/*.css"
//!
//! # [minify_scripts]       # table absent -> stage is skipped
//! ```
//!
//! With no stage tables at all, a build just clones the source directory
//! into the distribution directory.

use crate::fileset::FileSelector;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("config validation error: {0}")]
    Validation(String),
}

/// Top-level build configuration.
///
/// The three path roots must be pairwise distinct: the pipeline reads from
/// `src_path`, stages through `build_path`, and finalizes into `dist_path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Source tree the pipeline reads from. Never written to.
    pub src_path: String,
    /// Temporary working directory. Deleted wholesale on stage failure.
    pub build_path: String,
    /// Final distribution directory, swapped in atomically.
    pub dist_path: String,

    pub lint_scripts: Option<LintConfig>,
    pub lint_styles: Option<LintConfig>,
    pub templates: Option<TemplatesConfig>,
    pub styles: Option<StylesConfig>,
    pub collect_assets: Option<CollectAssetsConfig>,
    pub minify_scripts: Option<MinifyConfig>,
    pub minify_markup: Option<MinifyConfig>,
    pub prune_styles: Option<PruneStylesConfig>,
    pub minify_styles: Option<MinifyConfig>,
    pub sitemap: Option<SitemapConfig>,
    pub icon_manifest: Option<IconManifestConfig>,
    pub generate_images: Option<Vec<ImageSet>>,
    pub optimize_images: Option<OptimizeImagesConfig>,
    pub revision: Option<RevisionConfig>,
    pub validate_markup: Option<ValidateMarkupConfig>,

    /// Emit the end-of-build size report.
    pub report: bool,
    /// Globs removed from the working directory right after setup.
    pub clean_before: FileSelector,
    /// Globs removed from the distribution directory after the swap.
    pub clean_after: FileSelector,
    /// Live-reload server settings used by `serve`.
    pub server: ServerConfig,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            src_path: "src".to_string(),
            build_path: ".gristmill-build".to_string(),
            dist_path: "dist".to_string(),
            lint_scripts: None,
            lint_styles: None,
            templates: None,
            styles: None,
            collect_assets: None,
            minify_scripts: None,
            minify_markup: None,
            prune_styles: None,
            minify_styles: None,
            sitemap: None,
            icon_manifest: None,
            generate_images: None,
            optimize_images: None,
            revision: None,
            validate_markup: None,
            report: false,
            clean_before: FileSelector::default(),
            clean_after: FileSelector::default(),
            server: ServerConfig::default(),
        }
    }
}

impl BuildConfig {
    /// Validate cross-field rules the type system can't express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("src_path", &self.src_path),
            ("build_path", &self.build_path),
            ("dist_path", &self.dist_path),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Validation(format!("{name} must not be empty")));
            }
        }
        let pairs = [
            ("src_path", &self.src_path, "build_path", &self.build_path),
            ("src_path", &self.src_path, "dist_path", &self.dist_path),
            ("build_path", &self.build_path, "dist_path", &self.dist_path),
        ];
        for (a_name, a, b_name, b) in pairs {
            if a == b {
                return Err(ConfigError::Validation(format!(
                    "{a_name} and {b_name} must be distinct (both are '{a}')"
                )));
            }
        }
        if let Some(sets) = &self.generate_images {
            for set in sets {
                if set.sizes.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "generate_images entry '{}' has no sizes",
                        set.source
                    )));
                }
                if set.sizes.iter().any(|[w, h]| *w == 0 || *h == 0) {
                    return Err(ConfigError::Validation(format!(
                        "generate_images entry '{}' has a zero dimension",
                        set.source
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Lint stage settings (scripts or styles).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LintConfig {
    pub files: FileSelector,
    /// Options passed verbatim to the linter collaborator.
    pub options: Option<toml::Value>,
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            files: FileSelector::many(["**/*.js", "!vendor/**/*.js"]),
            options: None,
        }
    }
}

/// Template rendering stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TemplatesConfig {
    /// Templates to render, rooted at `src_path`. Underscore-prefixed files
    /// are partials by convention and excluded by default.
    pub files: FileSelector,
    /// Marker stripped from output basenames (`page.tpl.html` -> `page.html`).
    pub id: String,
    /// Suffix of per-template context sidecars (`page.ctx.json`).
    pub context_id: String,
    /// Shared context data merged under every template's own context.
    pub data: Option<toml::Value>,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            files: FileSelector::many(["**/*.html", "!**/_*.html"]),
            id: ".tpl".to_string(),
            context_id: ".ctx".to_string(),
            data: None,
        }
    }
}

/// Stylesheet compilation stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StylesConfig {
    /// Stylesheets to compile, rooted at `src_path`. Output always lands in
    /// the build directory with a `.css` extension.
    pub files: FileSelector,
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            files: FileSelector::many(["**/*.css", "!**/_*.css"]),
        }
    }
}

/// Asset bundling (build-block concatenation) stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollectAssetsConfig {
    /// Markup files scanned for build blocks, rooted at `build_path`.
    pub files: FileSelector,
}

impl Default for CollectAssetsConfig {
    fn default() -> Self {
        Self {
            files: FileSelector::one("**/*.html"),
        }
    }
}

/// Generic minify stage settings (scripts, styles, or markup).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MinifyConfig {
    /// Files to minify in place, rooted at `build_path`.
    pub files: FileSelector,
}

impl MinifyConfig {
    pub fn scripts() -> Self {
        Self {
            files: FileSelector::one("**/*.js"),
        }
    }

    pub fn styles() -> Self {
        Self {
            files: FileSelector::one("**/*.css"),
        }
    }

    pub fn markup() -> Self {
        Self {
            files: FileSelector::one("**/*.html"),
        }
    }
}

/// Dead-style pruning stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PruneStylesConfig {
    /// Stylesheets to prune, rooted at `build_path`.
    pub files: FileSelector,
    /// Markup scanned for selector usage.
    pub content: FileSelector,
}

impl Default for PruneStylesConfig {
    fn default() -> Self {
        Self {
            files: FileSelector::one("**/*.css"),
            content: FileSelector::one("**/*.html"),
        }
    }
}

/// Sitemap generation stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SitemapConfig {
    /// Markup files listed in the sitemap, rooted at `build_path`.
    pub files: FileSelector,
    /// Site base URL prepended to every location, no trailing slash.
    pub site_url: String,
}

impl Default for SitemapConfig {
    fn default() -> Self {
        Self {
            files: FileSelector::one("**/*.html"),
            site_url: String::new(),
        }
    }
}

/// Tile icon manifest (`browserconfig.xml`) stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IconManifestConfig {
    pub tile_70x70: String,
    pub tile_150x150: String,
    pub tile_310x150: String,
    pub tile_310x310: String,
    pub tile_color: String,
}

impl Default for IconManifestConfig {
    fn default() -> Self {
        Self {
            tile_70x70: "/icons/tile-70x70.png".to_string(),
            tile_150x150: "/icons/tile-150x150.png".to_string(),
            tile_310x150: "/icons/tile-310x150.png".to_string(),
            tile_310x310: "/icons/tile-310x310.png".to_string(),
            tile_color: "#ffffff".to_string(),
        }
    }
}

/// One image generation set: a source image resized to several dimensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageSet {
    /// Source image, relative to `build_path`.
    pub source: String,
    /// Target path template; `{width}` and `{height}` are substituted
    /// per size. Existing targets are left untouched.
    pub target: String,
    /// `[width, height]` pairs to generate.
    pub sizes: Vec<[u32; 2]>,
}

/// Image optimization stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizeImagesConfig {
    /// Raster images to re-encode in place, rooted at `build_path`.
    pub files: FileSelector,
}

impl Default for OptimizeImagesConfig {
    fn default() -> Self {
        Self {
            files: FileSelector::many(["**/*.jpg", "**/*.jpeg", "**/*.png", "**/*.gif"]),
        }
    }
}

/// Asset revisioning stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RevisionConfig {
    /// Files to fingerprint and rename, rooted at `build_path`. References
    /// to renamed files are rewritten across the whole build directory.
    pub files: FileSelector,
}

impl Default for RevisionConfig {
    fn default() -> Self {
        Self {
            files: FileSelector::many(["**/*.css", "**/*.js"]),
        }
    }
}

/// Markup validation stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidateMarkupConfig {
    /// Markup files to validate, rooted at `dist_path`.
    pub files: FileSelector,
}

impl Default for ValidateMarkupConfig {
    fn default() -> Self {
        Self {
            files: FileSelector::one("**/*.html"),
        }
    }
}

/// Live-reload server settings used by `serve`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub port: u16,
    /// Debounce window for filesystem events, in milliseconds.
    pub debounce_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 4000,
            debounce_ms: 250,
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(BuildConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file doesn't exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<BuildConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: BuildConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load a full build config: stock defaults, then the config file at `path`
/// (if present), then per-instance `overrides` (if any).
pub fn load_config(
    path: &Path,
    overrides: Option<toml::Value>,
) -> Result<BuildConfig, ConfigError> {
    let mut layered = stock_defaults_value();
    if let Some(file_value) = load_raw_config(path)? {
        layered = merge_toml(layered, file_value);
    }
    resolve_config(layered, overrides)
}

/// Returns a fully-commented stock `gristmill.toml` with all keys documented.
///
/// Used by the `gen-config` CLI command. Stage tables are commented out
/// because their presence is what turns the stage on.
pub fn stock_config_toml() -> &'static str {
    r##"# Gristmill Configuration
# =======================
# The three path roots are required and must be pairwise distinct.
# Every other table gates one pipeline stage: uncomment it to run the stage.
# Unknown keys are an error.

# Source tree the pipeline reads from.
src_path = "src"

# Temporary working directory. Deleted wholesale if a stage fails.
build_path = ".gristmill-build"

# Final distribution directory, swapped in atomically at the end.
dist_path = "dist"

# Emit the end-of-build size report (file count, total size, per-type).
report = true

# Globs removed from the working directory right after setup,
# and from the distribution directory after the final swap.
clean_before = []
clean_after = []

# ---------------------------------------------------------------------------
# Pre-build lint stages
# ---------------------------------------------------------------------------
# [lint_scripts]
# files = ["**/*.js", "!vendor/**/*.js"]

# [lint_styles]
# files = "**/*.css"

# ---------------------------------------------------------------------------
# Template rendering (src -> build)
# ---------------------------------------------------------------------------
# Renders templates with their sidecar context (`page.ctx.json`) and strips
# the template id marker from output names (`page.tpl.html` -> `page.html`).
# [templates]
# files = ["**/*.html", "!**/_*.html"]
# id = ".tpl"
# context_id = ".ctx"
# [templates.data]
# site_name = "My Site"

# ---------------------------------------------------------------------------
# Stylesheet compilation (src -> build, output extension is .css)
# ---------------------------------------------------------------------------
# [styles]
# files = ["**/*.css", "!**/_*.css"]

# ---------------------------------------------------------------------------
# Asset bundling: concatenate <!-- build:... --> blocks in markup
# ---------------------------------------------------------------------------
# [collect_assets]
# files = "**/*.html"

# ---------------------------------------------------------------------------
# Minification (in place, within the build directory)
# ---------------------------------------------------------------------------
# [minify_scripts]
# files = "**/*.js"

# [minify_markup]
# files = "**/*.html"

# [prune_styles]
# files = "**/*.css"
# content = "**/*.html"

# [minify_styles]
# files = "**/*.css"

# ---------------------------------------------------------------------------
# Generated artifacts
# ---------------------------------------------------------------------------
# [sitemap]
# files = "**/*.html"
# site_url = "https://example.com"

# [icon_manifest]
# tile_70x70 = "/icons/tile-70x70.png"
# tile_150x150 = "/icons/tile-150x150.png"
# tile_310x150 = "/icons/tile-310x150.png"
# tile_310x310 = "/icons/tile-310x310.png"
# tile_color = "#ffffff"

# [[generate_images]]
# source = "icons/master.png"
# target = "icons/tile-{width}x{height}.png"
# sizes = [[70, 70], [150, 150], [310, 150], [310, 310]]

# [optimize_images]
# files = ["**/*.jpg", "**/*.jpeg", "**/*.png", "**/*.gif"]

# ---------------------------------------------------------------------------
# Asset revisioning: content fingerprints in filenames, references rewritten
# ---------------------------------------------------------------------------
# [revision]
# files = ["**/*.css", "**/*.js"]

# ---------------------------------------------------------------------------
# Post-build markup validation (skipped when the validator is unavailable)
# ---------------------------------------------------------------------------
# [validate_markup]
# files = "**/*.html"

# ---------------------------------------------------------------------------
# Live-reload server (serve command)
# ---------------------------------------------------------------------------
[server]
port = 4000
debounce_ms = 250
"##
}
