// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{DeserializedProduct, ProductConfig};
use crate::{
    errors::{ConfigParseError, ConfigParseErrorKind},
    platform::{PlatformCatalog, PlatformInfo},
    reconcile::DirectLogSettings,
    report::OutputPolicy,
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{
    Config, ConfigBuilder, ConfigError, Environment, File, FileFormat, builder::DefaultState,
};
use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::warn;

/// Trait for handling configuration warnings.
pub trait ConfigWarnings {
    /// Handle unknown configuration keys found in a config file.
    fn unknown_config_keys(
        &mut self,
        config_file: &Utf8Path,
        root: &Utf8Path,
        unknown: &BTreeSet<String>,
    );
}

/// Logs configuration warnings with `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultConfigWarnings;

impl ConfigWarnings for DefaultConfigWarnings {
    fn unknown_config_keys(
        &mut self,
        config_file: &Utf8Path,
        root: &Utf8Path,
        unknown: &BTreeSet<String>,
    ) {
        let mut unknown_str = String::new();
        if let [single] = unknown.iter().collect::<Vec<_>>().as_slice() {
            // Print this on the same line.
            unknown_str.push_str("key: ");
            unknown_str.push_str(single);
        } else {
            unknown_str.push_str("keys:\n");
            for ignored_key in unknown {
                unknown_str.push('\n');
                unknown_str.push_str("  - ");
                unknown_str.push_str(ignored_key);
            }
        }

        warn!(
            "in config file {}, ignoring unknown configuration {unknown_str}",
            config_file.strip_prefix(root).unwrap_or(config_file),
        )
    }
}

/// Overall configuration for nightly-check.
#[derive(Clone, Debug)]
pub struct NightlyConfig {
    root: Utf8PathBuf,
    store: StoreConfig,
    report: ReportConfig,
    direct_log: DirectLogSettings,
    revision: RevisionConfig,
    special_units: IndexMap<String, String>,
    platforms: PlatformCatalog,
    products: Vec<ProductConfig>,
}

impl NightlyConfig {
    /// The default location of the config within the build root.
    pub const CONFIG_PATH: &'static str = ".config/nightly.toml";

    /// Contains the default config as a TOML file.
    ///
    /// User configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// Environment configuration uses this prefix, followed by `__` and the key path with
    /// sections separated by `__`.
    pub const ENVIRONMENT_PREFIX: &'static str = "NIGHTLY_CONFIG";

    /// Reads the config from the given file, or if not specified from `.config/nightly.toml` in
    /// the build root.
    ///
    /// If no config file is specified and the build root doesn't have `.config/nightly.toml`,
    /// the default config is used, which defines no products.
    pub fn from_sources(
        root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        Self::from_sources_with_warnings(root, config_file, &mut DefaultConfigWarnings)
    }

    /// Loads configuration with custom warning handling.
    pub fn from_sources_with_warnings(
        root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
        warnings: &mut impl ConfigWarnings,
    ) -> Result<Self, ConfigParseError> {
        let root = root.into();
        let (config_file, required) = match config_file {
            Some(file) => (file.to_owned(), true),
            None => (root.join(Self::CONFIG_PATH), false),
        };

        let builder = Self::make_default_config()
            .add_source(File::new(config_file.as_str(), FileFormat::Toml).required(required))
            .add_source(
                Environment::with_prefix(Self::ENVIRONMENT_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            );
        let (deserialized, unknown) = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(&config_file, kind))?;
        if !unknown.is_empty() {
            warnings.unknown_config_keys(&config_file, &root, &unknown);
        }

        Self::compile(root, deserialized).map_err(|kind| ConfigParseError::new(&config_file, kind))
    }

    /// Returns the default config, with no products.
    #[cfg(test)]
    pub(crate) fn default_config(root: impl Into<Utf8PathBuf>) -> Self {
        let config = Self::make_default_config()
            .build()
            .expect("default config is always valid");
        let deserialized: NightlyConfigDeserialize =
            serde_ignored::deserialize(config, |path: serde_ignored::Path| {
                panic!("unknown key in default config: {path}")
            })
            .expect("default config is always valid");
        Self::compile(root.into(), deserialized).expect("default config is always valid")
    }

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    /// This returns a tuple of (config, ignored paths).
    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(NightlyConfigDeserialize, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: NightlyConfigDeserialize = serde_path_to_error::deserialize(ignored_de)
            .map_err(|error| {
                // The config crate reports the key as well; drop it so the path is only
                // reported once.
                let path = error.path().clone();
                let config_error = error.into_inner();
                let error = match config_error {
                    ConfigError::At { error, .. } => *error,
                    other => other,
                };
                ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                    path, error,
                )))
            })?;

        Ok((config, ignored))
    }

    fn compile(
        root: Utf8PathBuf,
        deserialized: NightlyConfigDeserialize,
    ) -> Result<Self, ConfigParseErrorKind> {
        let NightlyConfigDeserialize {
            mut store,
            report,
            direct_log,
            revision,
            special_units,
            platforms,
            products,
        } = deserialized;

        if store.dir.is_relative() {
            store.dir = root.join(&store.dir);
        }

        let section = Regex::new(&direct_log.section_pattern)
            .map_err(|error| ConfigParseErrorKind::InvalidSectionPattern(Box::new(error)))?;
        for group in ["unit", "code"] {
            if !section.capture_names().flatten().any(|name| name == group) {
                return Err(ConfigParseErrorKind::SectionPatternMissingGroup { group });
            }
        }
        let direct_log = DirectLogSettings::new(section, direct_log.completion_marker);

        let platforms = PlatformCatalog::new(platforms);
        let products = products
            .into_iter()
            .map(|(name, product)| product.compile(name, &platforms))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            root,
            store,
            report,
            direct_log,
            revision,
            special_units,
            platforms,
            products,
        })
    }

    /// Returns the build root.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Returns the history store configuration.
    pub fn store(&self) -> &StoreConfig {
        &self.store
    }

    /// Returns the report parsing configuration.
    pub fn report(&self) -> &ReportConfig {
        &self.report
    }

    /// Returns how direct logs are read.
    pub fn direct_log(&self) -> &DirectLogSettings {
        &self.direct_log
    }

    /// Returns repository name aliases used when recording other repositories' revisions.
    pub fn revision_aliases(&self) -> &IndexMap<String, String> {
        &self.revision.aliases
    }

    /// Returns the catalog of special build steps and their descriptions.
    pub fn special_units(&self) -> &IndexMap<String, String> {
        &self.special_units
    }

    /// Returns the platform catalog.
    pub fn platforms(&self) -> &PlatformCatalog {
        &self.platforms
    }

    /// Returns the configured products, in order.
    pub fn products(&self) -> &[ProductConfig] {
        &self.products
    }

    /// Looks up a product by name.
    pub fn product(&self, name: &str) -> Option<&ProductConfig> {
        self.products.iter().find(|p| p.name() == name)
    }
}

/// Where history is stored.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StoreConfig {
    dir: Utf8PathBuf,
    daily_branch: String,
}

impl StoreConfig {
    /// Returns the absolute store directory.
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Returns the branch that is built every day.
    pub fn daily_branch(&self) -> &str {
        &self.daily_branch
    }
}

/// How test and benchmark reports are read.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReportConfig {
    namespace_prefix: String,
    output_tail_chars: usize,
    detail_head_chars: usize,
    benchmark_platform_markers: Vec<String>,
}

impl ReportConfig {
    /// Returns the prefix stripped from test names before matching them to their module.
    pub fn namespace_prefix(&self) -> &str {
        &self.namespace_prefix
    }

    /// Returns the policy for storing failure output.
    pub fn output_policy(&self) -> OutputPolicy {
        OutputPolicy {
            tail_chars: self.output_tail_chars,
            detail_head_chars: self.detail_head_chars,
        }
    }

    /// Returns the substrings that mark a platform as producing meaningful benchmark timings.
    pub fn benchmark_platform_markers(&self) -> &[String] {
        &self.benchmark_platform_markers
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RevisionConfig {
    #[serde(default)]
    aliases: IndexMap<String, String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DirectLogConfig {
    section_pattern: String,
    completion_marker: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct NightlyConfigDeserialize {
    store: StoreConfig,
    report: ReportConfig,
    direct_log: DirectLogConfig,
    #[serde(default)]
    revision: RevisionConfig,
    #[serde(default)]
    special_units: IndexMap<String, String>,
    #[serde(default)]
    platforms: IndexMap<String, PlatformInfo>,
    #[serde(default)]
    products: IndexMap<String, DeserializedProduct>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{outcome::Phase, platform::PlatformClass};
    use camino_tempfile::Utf8TempDir;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct CollectWarnings {
        unknown: Vec<String>,
    }

    impl ConfigWarnings for CollectWarnings {
        fn unknown_config_keys(
            &mut self,
            _config_file: &Utf8Path,
            _root: &Utf8Path,
            unknown: &BTreeSet<String>,
        ) {
            self.unknown.extend(unknown.iter().cloned());
        }
    }

    fn load(contents: &str) -> (Utf8TempDir, Result<NightlyConfig, ConfigParseError>, Vec<String>) {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let config_dir = dir.path().join(".config");
        std::fs::create_dir_all(&config_dir).expect("created .config");
        std::fs::write(config_dir.join("nightly.toml"), contents).expect("wrote config");
        let mut warnings = CollectWarnings::default();
        let config = NightlyConfig::from_sources_with_warnings(dir.path(), None, &mut warnings);
        (dir, config, warnings.unknown)
    }

    #[test]
    fn defaults() {
        let config = NightlyConfig::default_config("/build");
        assert_eq!(config.store().daily_branch(), "develop");
        assert_eq!(config.store().dir(), "/build/nightly-history");
        assert_eq!(config.report().namespace_prefix(), "IMP.");
        assert_eq!(
            config.report().output_policy(),
            OutputPolicy::default(),
            "default policy matches the built-in one"
        );
        assert_eq!(config.report().benchmark_platform_markers(), ["fast", "release"]);
        assert!(config.platforms().contains("fast8"));
        assert!(config.special_units().contains_key("ALL"));
        assert_eq!(
            config.revision_aliases().get("multifit").map(String::as_str),
            Some("multifit2")
        );
        assert!(config.products().is_empty());
    }

    #[test]
    fn products_and_unknown_keys() {
        let (dir, config, unknown) = load(indoc! {r#"
            [store]
            dir = "/var/nightly"

            [products.imp]
            platforms = ["debug8", "fast8", "mac14-intel"]
            module-coverage = true
            special-units = ["ALL", "INSTALL"]
            exclude = { foxs = ["mac14-intel"] }
            unknown-key = 1

            [[products.imp.structured]]
            platform = "fast8"
            build-types = ["test", "build", "example"]

            [[products.imp.structured]]
            platform = "debug8"
            build-types = ["build", "test", "example", "benchmark"]
            generated-files = ["imp-{version}.tar.gz"]

            [[products.imp.logs]]
            name = "package.log"
            description = "RPM package"
        "#});
        let config = config.expect("config is valid");
        assert_eq!(unknown, ["products.imp.unknown-key"]);
        assert_eq!(config.root(), dir.path());
        assert_eq!(config.store().dir(), "/var/nightly");

        let product = config.product("imp").expect("product exists");
        assert_eq!(product.dir(), "imp");
        assert_eq!(product.repository(), "imp");
        assert!(product.module_coverage());
        assert_eq!(
            product.platforms().keys().collect::<Vec<_>>(),
            ["debug8", "fast8", "mac14-intel"]
        );
        let PlatformClass::Structured(fast8) = &product.platforms()["fast8"] else {
            panic!("fast8 is structured");
        };
        assert_eq!(fast8.build_types(), [Phase::Build, Phase::Test, Phase::Example]);
        assert_eq!(product.platforms()["mac14-intel"], PlatformClass::DirectLog);
        assert_eq!(product.logs()[0].name(), "package.log");
    }

    #[test]
    fn structured_platform_must_be_active() {
        let (_dir, config, _) = load(indoc! {r#"
            [products.imp]
            platforms = ["fast8"]

            [[products.imp.structured]]
            platform = "debug8"
            build-types = ["build"]
        "#});
        let error = config.expect_err("structured platform is not active");
        assert!(
            matches!(error.kind(), ConfigParseErrorKind::InvalidProduct { product, .. } if product == "imp"),
            "unexpected error: {error:?}"
        );
    }

    #[test]
    fn direct_log_platform_needs_catalog_entry() {
        let (_dir, config, _) = load(indoc! {r#"
            [products.imp]
            platforms = ["mystery"]
        "#});
        let error = config.expect_err("mystery has no log file");
        assert!(
            matches!(error.kind(), ConfigParseErrorKind::InvalidProduct { .. }),
            "unexpected error: {error:?}"
        );
    }

    #[test]
    fn section_pattern_needs_groups() {
        let (_dir, config, _) = load(indoc! {r#"
            [direct-log]
            section-pattern = '^%%% (?P<unit>.+)$'
        "#});
        let error = config.expect_err("pattern lacks a code group");
        assert!(
            matches!(
                error.kind(),
                ConfigParseErrorKind::SectionPatternMissingGroup { group: "code" }
            ),
            "unexpected error: {error:?}"
        );
    }

    #[test]
    fn malformed_config() {
        let (_dir, config, _) = load(indoc! {r#"
            [products.imp]
            platforms = "fast8"
        "#});
        let error = config.expect_err("platforms must be a list");
        assert!(
            matches!(error.kind(), ConfigParseErrorKind::DeserializeError(_)),
            "unexpected error: {error:?}"
        );
    }
}
