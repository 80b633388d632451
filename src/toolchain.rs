//! External collaborators behind uniform traits.
//!
//! The pipeline never hardcodes a template engine, style compiler, or
//! minifier — each stage calls through a trait, and a [`Toolchain`] bundles
//! one implementation per seam. Swapping in a different engine is a matter
//! of constructing a `Toolchain` with your own boxed implementation.
//!
//! The default toolchain ships working built-ins:
//!
//! - [`ContextTemplates`]: `{{ key }}` substitution from a JSON context plus
//!   `{% markdown %}…{% endmarkdown %}` blocks rendered with pulldown-cmark.
//! - [`LightningStyles`]: CSS compilation and minification via lightningcss.
//! - [`BasicScriptMinifier`] / [`BasicMarkupMinifier`]: conservative
//!   whitespace/comment stripping that never changes semantics.
//! - [`PassLinter`], [`KeepAllPruner`]: accept-everything placeholders.
//! - [`OfflineValidator`]: always unavailable, so the validate-markup stage
//!   logs a skip unless a real validator is plugged in.

use pulldown_cmark::{html, Parser};
use regex::Regex;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("{0}")]
    Message(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransformError {
    pub fn msg(text: impl Into<String>) -> Self {
        TransformError::Message(text.into())
    }
}

/// Renders a template source with a per-file context.
pub trait TemplateEngine {
    fn render(
        &self,
        rel: &Path,
        source: &str,
        context: &serde_json::Value,
    ) -> Result<String, TransformError>;
}

/// Compiles a stylesheet source to plain CSS.
pub trait StyleCompiler {
    fn compile(&self, rel: &Path, source: &str) -> Result<String, TransformError>;
}

pub trait ScriptMinifier {
    fn minify(&self, source: &str) -> Result<String, TransformError>;
}

pub trait StyleMinifier {
    fn minify(&self, source: &str) -> Result<String, TransformError>;
}

pub trait MarkupMinifier {
    fn minify(&self, source: &str) -> Result<String, TransformError>;
}

/// Removes rules a given markup corpus never uses.
pub trait StylePruner {
    fn prune(&self, stylesheet: &str, markup: &[String]) -> Result<String, TransformError>;
}

/// Checks one source file; an `Err` is a lint violation and fails the build.
pub trait Linter {
    fn lint(&self, rel: &Path, source: &str) -> Result<(), TransformError>;
}

/// Markup validator that may need external resources (e.g. a network
/// service). When unavailable, the stage is skipped with a logged reason.
pub trait MarkupValidator {
    fn available(&self) -> bool;
    /// Returns validation findings; findings are reported, not fatal.
    fn validate(&self, rel: &Path, source: &str) -> Result<Vec<String>, TransformError>;
}

/// Live-reload channel notified after each successful rebuild in serve mode.
pub trait ReloadNotifier {
    fn reload(&self);
}

/// One implementation per collaborator seam.
pub struct Toolchain {
    pub templates: Box<dyn TemplateEngine>,
    pub styles: Box<dyn StyleCompiler>,
    pub script_minifier: Box<dyn ScriptMinifier>,
    pub style_minifier: Box<dyn StyleMinifier>,
    pub markup_minifier: Box<dyn MarkupMinifier>,
    pub style_pruner: Box<dyn StylePruner>,
    pub script_linter: Box<dyn Linter>,
    pub style_linter: Box<dyn Linter>,
    pub markup_validator: Box<dyn MarkupValidator>,
    pub reload: Box<dyn ReloadNotifier>,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            templates: Box::new(ContextTemplates::new()),
            styles: Box::new(LightningStyles),
            script_minifier: Box::new(BasicScriptMinifier),
            style_minifier: Box::new(LightningStyles),
            markup_minifier: Box::new(BasicMarkupMinifier::new()),
            style_pruner: Box::new(KeepAllPruner),
            script_linter: Box::new(PassLinter),
            style_linter: Box::new(PassLinter),
            markup_validator: Box::new(OfflineValidator),
            reload: Box::new(NoopReload),
        }
    }
}

// =============================================================================
// Built-in template engine
// =============================================================================

/// `{{ key }}` substitution plus `{% markdown %}` blocks.
///
/// Keys may be dotted paths into the context object (`site.name`). Missing
/// keys render as the empty string. Markdown blocks are converted after
/// substitution, so variables work inside them.
pub struct ContextTemplates {
    var_re: Regex,
    markdown_re: Regex,
}

impl ContextTemplates {
    pub fn new() -> Self {
        Self {
            var_re: Regex::new(r"\{\{\s*([A-Za-z0-9_.]+)\s*\}\}").expect("valid regex"),
            markdown_re: Regex::new(r"(?s)\{%\s*markdown\s*%\}(.*?)\{%\s*endmarkdown\s*%\}")
                .expect("valid regex"),
        }
    }
}

impl Default for ContextTemplates {
    fn default() -> Self {
        Self::new()
    }
}

/// Look up a dotted path in a JSON value, rendered as plain text.
fn context_lookup(context: &serde_json::Value, path: &str) -> String {
    let mut current = context;
    for segment in path.split('.') {
        match current.get(segment) {
            Some(next) => current = next,
            None => return String::new(),
        }
    }
    match current {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl TemplateEngine for ContextTemplates {
    fn render(
        &self,
        _rel: &Path,
        source: &str,
        context: &serde_json::Value,
    ) -> Result<String, TransformError> {
        let substituted = self
            .var_re
            .replace_all(source, |caps: &regex::Captures| {
                context_lookup(context, &caps[1])
            })
            .into_owned();

        let rendered = self
            .markdown_re
            .replace_all(&substituted, |caps: &regex::Captures| {
                let mut out = String::new();
                html::push_html(&mut out, Parser::new(caps[1].trim()));
                out
            })
            .into_owned();

        Ok(rendered)
    }
}

// =============================================================================
// Built-in style compiler / minifier (lightningcss)
// =============================================================================

/// CSS processing through lightningcss: `compile` pretty-prints a
/// stylesheet, `minify` emits the compact form. Parsing follows CSS error
/// recovery, so many malformed declarations are dropped rather than
/// rejected; only structurally unrecoverable input is an error.
pub struct LightningStyles;

impl LightningStyles {
    fn process(source: &str, minify: bool) -> Result<String, TransformError> {
        use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};

        let mut sheet = StyleSheet::parse(source, ParserOptions::default())
            .map_err(|e| TransformError::msg(e.to_string()))?;
        sheet
            .minify(MinifyOptions::default())
            .map_err(|e| TransformError::msg(e.to_string()))?;
        let result = sheet
            .to_css(PrinterOptions {
                minify,
                ..PrinterOptions::default()
            })
            .map_err(|e| TransformError::msg(e.to_string()))?;
        Ok(result.code)
    }
}

impl StyleCompiler for LightningStyles {
    fn compile(&self, _rel: &Path, source: &str) -> Result<String, TransformError> {
        Self::process(source, false)
    }
}

impl StyleMinifier for LightningStyles {
    fn minify(&self, source: &str) -> Result<String, TransformError> {
        Self::process(source, true)
    }
}

// =============================================================================
// Built-in minifiers
// =============================================================================

/// Strips trailing whitespace and blank lines. Never touches code.
pub struct BasicScriptMinifier;

impl ScriptMinifier for BasicScriptMinifier {
    fn minify(&self, source: &str) -> Result<String, TransformError> {
        let out: Vec<&str> = source
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .collect();
        Ok(out.join("\n"))
    }
}

/// Drops HTML comments and collapses whitespace runs between tags.
pub struct BasicMarkupMinifier {
    comment_re: Regex,
    between_tags_re: Regex,
}

impl BasicMarkupMinifier {
    pub fn new() -> Self {
        Self {
            comment_re: Regex::new(r"(?s)<!--.*?-->").expect("valid regex"),
            between_tags_re: Regex::new(r">\s+<").expect("valid regex"),
        }
    }
}

impl Default for BasicMarkupMinifier {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkupMinifier for BasicMarkupMinifier {
    fn minify(&self, source: &str) -> Result<String, TransformError> {
        let stripped = self.comment_re.replace_all(source, "");
        let collapsed = self.between_tags_re.replace_all(&stripped, "><");
        Ok(collapsed.trim().to_string())
    }
}

// =============================================================================
// Accept-everything placeholders
// =============================================================================

/// Linter that accepts every file.
pub struct PassLinter;

impl Linter for PassLinter {
    fn lint(&self, _rel: &Path, _source: &str) -> Result<(), TransformError> {
        Ok(())
    }
}

/// Pruner that keeps every rule.
pub struct KeepAllPruner;

impl StylePruner for KeepAllPruner {
    fn prune(&self, stylesheet: &str, _markup: &[String]) -> Result<String, TransformError> {
        Ok(stylesheet.to_string())
    }
}

/// Validator standing in for a network-backed service that isn't reachable.
pub struct OfflineValidator;

impl MarkupValidator for OfflineValidator {
    fn available(&self) -> bool {
        false
    }

    fn validate(&self, _rel: &Path, _source: &str) -> Result<Vec<String>, TransformError> {
        Ok(Vec::new())
    }
}

/// Reload notifier that does nothing.
pub struct NoopReload;

impl ReloadNotifier for NoopReload {
    fn reload(&self) {}
}
