// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::{ConfigParseErrorKind, RegistryLoadError},
    helpers::BuildLayout,
    outcome::Phase,
    platform::{PlatformCatalog, PlatformClass, StructuredPlatform},
    registry::{Registry, UnitKind},
};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::Deserialize;

/// A log a product's build is expected to write, and the files it should produce.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct ExpectedLog {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    generated_files: Vec<String>,
}

impl ExpectedLog {
    /// Creates an expected log.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        generated_files: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            generated_files: generated_files.into_iter().collect(),
        }
    }

    /// Returns the log file name, relative to the product's log directory.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a description of what writes the log, defaulting to its name.
    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or(&self.name)
    }

    /// Returns the files the build should produce, relative to the build root.
    ///
    /// Names may contain `{version}`, which is replaced with the product's long version.
    pub fn generated_files(&self) -> &[String] {
        &self.generated_files
    }
}

/// One product: a set of units built on a set of platforms.
#[derive(Clone, Debug)]
pub struct ProductConfig {
    name: String,
    dir: String,
    root: Option<Utf8PathBuf>,
    repository: String,
    lab_only: bool,
    ignore_unknown: bool,
    module_coverage: bool,
    platforms: IndexMap<String, PlatformClass>,
    special_units: Vec<String>,
    extra_modules: Vec<String>,
    exclude: IndexMap<String, Vec<String>>,
    include: IndexMap<String, Vec<String>>,
    exclude_all: Vec<String>,
    logs: Vec<ExpectedLog>,
}

impl ProductConfig {
    /// Returns the product name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the directory name used for the product's logs, component list and history.
    pub fn dir(&self) -> &str {
        &self.dir
    }

    /// Returns the repository whose version stamp identifies the product's revision.
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Returns true if the product's units are lab-only.
    pub fn lab_only(&self) -> bool {
        self.lab_only
    }

    /// Returns true if reports for units missing from the component list are skipped silently.
    pub fn ignore_unknown(&self) -> bool {
        self.ignore_unknown
    }

    /// Returns true if per-module coverage is recorded.
    pub fn module_coverage(&self) -> bool {
        self.module_coverage
    }

    /// Returns the active platforms, in display order, with how each reports results.
    pub fn platforms(&self) -> &IndexMap<String, PlatformClass> {
        &self.platforms
    }

    /// Returns the logs the product's build is expected to write, besides the direct logs of its
    /// platforms.
    pub fn logs(&self) -> &[ExpectedLog] {
        &self.logs
    }

    /// Returns the layout of the product's build directory.
    ///
    /// A product may live in its own root, relative to the overall build root.
    pub fn layout(&self, build_root: &Utf8Path) -> BuildLayout {
        match &self.root {
            Some(root) => BuildLayout::new(build_root.join(root)),
            None => BuildLayout::new(build_root),
        }
    }

    /// Builds the product's registry: special units first, then the component list, then extra
    /// modules, with configured exclusions applied.
    pub fn registry(
        &self,
        layout: &BuildLayout,
        special_catalog: &IndexMap<String, String>,
    ) -> Result<Registry, RegistryLoadError> {
        let mut registry = Registry::new(
            &self.name,
            self.lab_only,
            self.platforms.keys(),
            special_catalog.clone(),
        );
        for unit in &self.special_units {
            registry.add_unit(unit, UnitKind::Special);
        }
        registry.load_component_list(&layout.component_list(&self.dir))?;
        for module in &self.extra_modules {
            registry.add_unit(module, UnitKind::Module);
        }

        for unit in &self.exclude_all {
            registry.exclude_all(unit);
        }
        for (unit, platforms) in &self.exclude {
            registry.exclude(unit, platforms);
        }
        for (unit, platforms) in &self.include {
            registry.include(unit, platforms);
        }
        Ok(registry)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DeserializedStructured {
    platform: String,
    build_types: Vec<Phase>,
    #[serde(default)]
    generated_files: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(super) struct DeserializedProduct {
    #[serde(default)]
    dir: Option<String>,
    #[serde(default)]
    root: Option<Utf8PathBuf>,
    #[serde(default)]
    repository: Option<String>,
    #[serde(default)]
    lab_only: bool,
    #[serde(default)]
    ignore_unknown: bool,
    #[serde(default)]
    module_coverage: bool,
    platforms: Vec<String>,
    #[serde(default)]
    structured: Vec<DeserializedStructured>,
    #[serde(default)]
    special_units: Vec<String>,
    #[serde(default)]
    extra_modules: Vec<String>,
    #[serde(default)]
    exclude: IndexMap<String, Vec<String>>,
    #[serde(default)]
    include: IndexMap<String, Vec<String>>,
    #[serde(default)]
    exclude_all: Vec<String>,
    #[serde(default)]
    logs: Vec<ExpectedLog>,
}

impl DeserializedProduct {
    pub(super) fn compile(
        self,
        name: String,
        catalog: &PlatformCatalog,
    ) -> Result<ProductConfig, ConfigParseErrorKind> {
        let invalid = |message: String| ConfigParseErrorKind::InvalidProduct {
            product: name.clone(),
            message,
        };

        let mut structured: IndexMap<String, StructuredPlatform> = IndexMap::new();
        for entry in self.structured {
            if !self.platforms.contains(&entry.platform) {
                return Err(invalid(format!(
                    "structured platform `{}` is not in the platform list",
                    entry.platform
                )));
            }
            let platform =
                StructuredPlatform::new(entry.build_types, entry.generated_files);
            if structured.insert(entry.platform.clone(), platform).is_some() {
                return Err(invalid(format!(
                    "structured platform `{}` is defined more than once",
                    entry.platform
                )));
            }
        }

        let mut platforms = IndexMap::new();
        for platform in self.platforms {
            let class = match structured.shift_remove(&platform) {
                Some(structured) => PlatformClass::Structured(structured),
                None if catalog.contains(&platform) => PlatformClass::DirectLog,
                None => {
                    return Err(invalid(format!(
                        "platform `{platform}` reports through a direct log, \
                         but is not in the platform catalog"
                    )));
                }
            };
            if platforms.insert(platform.clone(), class).is_some() {
                return Err(invalid(format!("platform `{platform}` is listed more than once")));
            }
        }

        let dir = self.dir.unwrap_or_else(|| name.clone());
        let repository = self.repository.unwrap_or_else(|| dir.clone());
        Ok(ProductConfig {
            name,
            dir,
            root: self.root,
            repository,
            lab_only: self.lab_only,
            ignore_unknown: self.ignore_unknown,
            module_coverage: self.module_coverage,
            platforms,
            special_units: self.special_units,
            extra_modules: self.extra_modules,
            exclude: self.exclude,
            include: self.include,
            exclude_all: self.exclude_all,
            logs: self.logs,
        })
    }
}
