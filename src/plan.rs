//! The build task graph: a static, ordered list of gated stages.
//!
//! The stage order is the dependency encoding — templates render before
//! bundling, bundling before minification, minification before revisioning,
//! revisioning before the final swap. [`STAGES`] is the single source of
//! truth; [`compute_plan`] filters it against a config without ever
//! reordering. The plan is computed once per build instance and immutable
//! afterward.

use crate::config::BuildConfig;

/// One stage of the build pipeline, in no particular order.
/// Ordering lives in [`STAGES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    LintScripts,
    LintStyles,
    Setup,
    Templates,
    Styles,
    CollectAssets,
    MinifyScripts,
    MinifyMarkup,
    PruneStyles,
    MinifyStyles,
    Sitemap,
    IconManifest,
    GenerateImages,
    OptimizeImages,
    Revision,
    Finalize,
    ValidateMarkup,
    Report,
}

impl StageKind {
    /// Stable stage name used in logs and error messages.
    pub fn name(self) -> &'static str {
        match self {
            StageKind::LintScripts => "lint-scripts",
            StageKind::LintStyles => "lint-styles",
            StageKind::Setup => "setup",
            StageKind::Templates => "templates",
            StageKind::Styles => "styles",
            StageKind::CollectAssets => "collect-assets",
            StageKind::MinifyScripts => "minify-scripts",
            StageKind::MinifyMarkup => "minify-markup",
            StageKind::PruneStyles => "prune-styles",
            StageKind::MinifyStyles => "minify-styles",
            StageKind::Sitemap => "sitemap",
            StageKind::IconManifest => "icon-manifest",
            StageKind::GenerateImages => "generate-images",
            StageKind::OptimizeImages => "optimize-images",
            StageKind::Revision => "revision",
            StageKind::Finalize => "finalize",
            StageKind::ValidateMarkup => "validate-markup",
            StageKind::Report => "report",
        }
    }
}

/// A stage plus its configuration gate.
///
/// A stage with a trivially-true gate always runs (setup, finalize).
pub struct StageDescriptor {
    pub kind: StageKind,
    gate: fn(&BuildConfig) -> bool,
}

impl StageDescriptor {
    /// Whether this stage is included for the given configuration.
    pub fn included(&self, config: &BuildConfig) -> bool {
        (self.gate)(config)
    }
}

/// All stages in execution order. Do not reorder: the sequence encodes
/// real on-disk dependencies between stages.
pub static STAGES: &[StageDescriptor] = &[
    StageDescriptor {
        kind: StageKind::LintScripts,
        gate: |c| c.lint_scripts.is_some(),
    },
    StageDescriptor {
        kind: StageKind::LintStyles,
        gate: |c| c.lint_styles.is_some(),
    },
    StageDescriptor {
        kind: StageKind::Setup,
        gate: |_| true,
    },
    StageDescriptor {
        kind: StageKind::Templates,
        gate: |c| c.templates.is_some(),
    },
    StageDescriptor {
        kind: StageKind::Styles,
        gate: |c| c.styles.is_some(),
    },
    StageDescriptor {
        kind: StageKind::CollectAssets,
        gate: |c| c.collect_assets.is_some(),
    },
    StageDescriptor {
        kind: StageKind::MinifyScripts,
        gate: |c| c.minify_scripts.is_some(),
    },
    StageDescriptor {
        kind: StageKind::MinifyMarkup,
        gate: |c| c.minify_markup.is_some(),
    },
    StageDescriptor {
        kind: StageKind::PruneStyles,
        gate: |c| c.prune_styles.is_some(),
    },
    StageDescriptor {
        kind: StageKind::MinifyStyles,
        gate: |c| c.minify_styles.is_some(),
    },
    StageDescriptor {
        kind: StageKind::Sitemap,
        gate: |c| c.sitemap.is_some(),
    },
    StageDescriptor {
        kind: StageKind::IconManifest,
        gate: |c| c.icon_manifest.is_some(),
    },
    StageDescriptor {
        kind: StageKind::GenerateImages,
        gate: |c| c.generate_images.is_some(),
    },
    StageDescriptor {
        kind: StageKind::OptimizeImages,
        gate: |c| c.optimize_images.is_some(),
    },
    StageDescriptor {
        kind: StageKind::Revision,
        gate: |c| c.revision.is_some(),
    },
    StageDescriptor {
        kind: StageKind::Finalize,
        gate: |_| true,
    },
    StageDescriptor {
        kind: StageKind::ValidateMarkup,
        gate: |c| c.validate_markup.is_some(),
    },
    StageDescriptor {
        kind: StageKind::Report,
        gate: |c| c.report,
    },
];

/// The ordered subsequence of stages whose gates pass for `config`.
pub fn compute_plan(config: &BuildConfig) -> Vec<StageKind> {
    STAGES
        .iter()
        .filter(|d| d.included(config))
        .map(|d| d.kind)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MinifyConfig, RevisionConfig, StylesConfig, TemplatesConfig};

    #[test]
    fn minimal_config_runs_setup_and_finalize_only() {
        let plan = compute_plan(&BuildConfig::default());
        assert_eq!(plan, vec![StageKind::Setup, StageKind::Finalize]);
    }

    #[test]
    fn gated_stage_included_at_fixed_position() {
        let mut config = BuildConfig::default();
        config.styles = Some(StylesConfig::default());
        let plan = compute_plan(&config);
        assert_eq!(
            plan,
            vec![StageKind::Setup, StageKind::Styles, StageKind::Finalize]
        );
    }

    #[test]
    fn absent_gate_key_excludes_stage() {
        let mut config = BuildConfig::default();
        config.templates = Some(TemplatesConfig::default());
        config.revision = Some(RevisionConfig::default());
        let plan = compute_plan(&config);
        assert!(!plan.contains(&StageKind::Styles));
        assert!(!plan.contains(&StageKind::MinifyScripts));
    }

    #[test]
    fn order_is_preserved_from_descriptor_list() {
        let mut config = BuildConfig::default();
        config.templates = Some(TemplatesConfig::default());
        config.styles = Some(StylesConfig::default());
        config.minify_styles = Some(MinifyConfig::styles());
        config.revision = Some(RevisionConfig::default());
        config.report = true;

        let plan = compute_plan(&config);
        assert_eq!(
            plan,
            vec![
                StageKind::Setup,
                StageKind::Templates,
                StageKind::Styles,
                StageKind::MinifyStyles,
                StageKind::Revision,
                StageKind::Finalize,
                StageKind::Report,
            ]
        );
    }

    #[test]
    fn report_gated_by_boolean() {
        let mut config = BuildConfig::default();
        config.report = true;
        assert!(compute_plan(&config).contains(&StageKind::Report));
        config.report = false;
        assert!(!compute_plan(&config).contains(&StageKind::Report));
    }

    #[test]
    fn descriptor_table_covers_every_stage_once() {
        let mut seen = std::collections::HashSet::new();
        for descriptor in STAGES {
            assert!(seen.insert(descriptor.kind), "{:?} listed twice", descriptor.kind);
        }
        assert_eq!(seen.len(), 18);
    }
}
