// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The set of units built for one product.
//!
//! A [`Registry`] is created once per product per run and passed by reference to everything that
//! needs to resolve unit names.

use crate::errors::RegistryLoadError;
use camino::Utf8Path;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::{fmt, io};
use tracing::{debug, warn};

/// Which part of a unit a result refers to.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum SubKind {
    /// The unit itself.
    #[default]
    Base,

    /// A module's examples.
    Examples,

    /// A module's benchmarks.
    Benchmarks,
}

impl SubKind {
    /// Returns true for [`SubKind::Base`].
    pub fn is_base(&self) -> bool {
        matches!(self, Self::Base)
    }

    fn suffix(self) -> &'static str {
        match self {
            Self::Base => "",
            Self::Examples => " examples",
            Self::Benchmarks => " benchmarks",
        }
    }
}

/// Identifies a unit, or one of a module's derived sub-units.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct UnitId {
    /// The name of the unit.
    pub name: String,

    /// The part of the unit.
    #[serde(default, skip_serializing_if = "SubKind::is_base")]
    pub sub_kind: SubKind,
}

impl UnitId {
    /// Creates an identifier for a unit itself.
    pub fn base(name: impl Into<String>) -> Self {
        Self::new(name, SubKind::Base)
    }

    /// Creates a new identifier.
    pub fn new(name: impl Into<String>, sub_kind: SubKind) -> Self {
        Self {
            name: name.into(),
            sub_kind,
        }
    }

    /// Returns the identifier for the same unit with a different sub-kind.
    pub fn with_sub_kind(&self, sub_kind: SubKind) -> Self {
        Self::new(self.name.clone(), sub_kind)
    }

    /// Parses the display form, e.g. `em examples`.
    pub fn parse_display(s: &str) -> Self {
        for sub_kind in [SubKind::Examples, SubKind::Benchmarks] {
            if let Some(name) = s.strip_suffix(sub_kind.suffix()) {
                return Self::new(name, sub_kind);
            }
        }
        Self::base(s)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.sub_kind.suffix())
    }
}

/// The kind of a unit, from the component list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnitKind {
    /// A library module, which also has examples and benchmarks.
    Module,

    /// A standalone application.
    Application,

    /// A build step that is not a module, such as documentation or packaging.
    Special,
}

impl UnitKind {
    /// Parses the kind column of a component list line.
    pub fn from_list_kind(kind: &str) -> Option<Self> {
        match kind {
            "module" => Some(Self::Module),
            "application" => Some(Self::Application),
            "special" | "build" => Some(Self::Special),
            _ => None,
        }
    }
}

/// The units of one product, and the platforms they are built on.
#[derive(Clone, Debug)]
pub struct Registry {
    product: String,
    lab_only: bool,
    platforms: Vec<String>,
    units: IndexMap<String, UnitKind>,
    special_catalog: IndexMap<String, String>,
    excluded: IndexSet<(UnitId, String)>,
}

impl Registry {
    /// Creates an empty registry for the given product and active platforms.
    ///
    /// `special_catalog` maps the names of special build steps to their descriptions. Units with
    /// these names are always treated as special.
    pub fn new(
        product: impl Into<String>,
        lab_only: bool,
        platforms: impl IntoIterator<Item = impl Into<String>>,
        special_catalog: IndexMap<String, String>,
    ) -> Self {
        Self {
            product: product.into(),
            lab_only,
            platforms: platforms.into_iter().map(Into::into).collect(),
            units: IndexMap::new(),
            special_catalog,
            excluded: IndexSet::new(),
        }
    }

    /// Returns the product name.
    pub fn product(&self) -> &str {
        &self.product
    }

    /// Returns true if the product's units are lab-only.
    pub fn lab_only(&self) -> bool {
        self.lab_only
    }

    /// Returns the active platforms, in order.
    pub fn platforms(&self) -> &[String] {
        &self.platforms
    }

    /// Adds a unit. Returns false, with a warning, if the unit was already present.
    pub fn add_unit(&mut self, name: impl Into<String>, kind: UnitKind) -> bool {
        let name = name.into();
        if self.units.contains_key(&name) {
            warn!(
                "product {}: duplicate unit `{name}` in component list; ignoring",
                self.product
            );
            return false;
        }
        self.units.insert(name, kind);
        true
    }

    /// Adds units from the contents of a component list.
    ///
    /// Each non-blank line is `<kind>\t<unit>`. Malformed lines are skipped with a warning.
    pub fn add_component_list(&mut self, contents: &str) {
        for (index, line) in contents.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let Some((kind, name)) = line.split_once('\t') else {
                warn!(
                    "product {}: malformed component list line {}: `{line}`",
                    self.product,
                    index + 1
                );
                continue;
            };
            match UnitKind::from_list_kind(kind) {
                Some(kind) => {
                    self.add_unit(name, kind);
                }
                None => warn!(
                    "product {}: unknown component kind `{kind}` for `{name}`; ignoring",
                    self.product
                ),
            }
        }
    }

    /// Adds units from a component list file.
    ///
    /// A missing file leaves the registry unchanged, with a warning.
    pub fn load_component_list(&mut self, path: &Utf8Path) -> Result<(), RegistryLoadError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                self.add_component_list(&contents);
                debug!("read {} units from {path}", self.units.len());
                Ok(())
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                warn!("product {}: component list {path} not found", self.product);
                Ok(())
            }
            Err(error) => Err(RegistryLoadError::new(path, error)),
        }
    }

    /// Returns the kind of a unit, if it is known.
    pub fn kind(&self, name: &str) -> Option<UnitKind> {
        self.units.get(name).copied()
    }

    /// Looks up a unit or sub-unit.
    ///
    /// Sub-units only exist for modules.
    pub fn lookup(&self, unit: &UnitId) -> Option<UnitKind> {
        let kind = self.kind(&unit.name)?;
        match (unit.sub_kind, kind) {
            (SubKind::Base, _) | (_, UnitKind::Module) => Some(kind),
            _ => None,
        }
    }

    /// Returns true if the unit is a special build step.
    pub fn is_special(&self, name: &str) -> bool {
        self.kind(name) == Some(UnitKind::Special) || self.special_catalog.contains_key(name)
    }

    /// Returns the description of a special build step, if it is in the catalog.
    pub fn special_description(&self, name: &str) -> Option<&str> {
        self.special_catalog.get(name).map(String::as_str)
    }

    /// Iterates over base unit names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.units.keys().map(String::as_str)
    }

    /// Iterates over the names of modules in order.
    pub fn modules(&self) -> impl Iterator<Item = &str> + '_ {
        self.units
            .iter()
            .filter(|(_, kind)| **kind == UnitKind::Module)
            .map(|(name, _)| name.as_str())
    }

    /// Iterates over every unit and sub-unit in order: each module is followed by its examples
    /// and benchmarks.
    pub fn unit_ids(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.units.iter().flat_map(|(name, kind)| {
            let sub_kinds: &[SubKind] = match kind {
                UnitKind::Module => &[SubKind::Base, SubKind::Examples, SubKind::Benchmarks],
                UnitKind::Application | UnitKind::Special => &[SubKind::Base],
            };
            sub_kinds
                .iter()
                .map(move |sub_kind| UnitId::new(name.clone(), *sub_kind))
        })
    }

    /// Returns the number of base units.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns true if there are no units.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Marks a unit as intentionally not built on the given platforms.
    ///
    /// For modules, the examples and benchmarks sub-units are excluded too. Unknown units are
    /// ignored with a warning.
    pub fn exclude<S: AsRef<str>>(&mut self, name: &str, platforms: &[S]) {
        let Some(kind) = self.kind(name) else {
            warn!(
                "product {}: ignoring attempt to exclude missing component {name}",
                self.product
            );
            return;
        };
        let sub_kinds: &[SubKind] = match kind {
            UnitKind::Module => &[SubKind::Base, SubKind::Examples, SubKind::Benchmarks],
            UnitKind::Application | UnitKind::Special => &[SubKind::Base],
        };
        for platform in platforms {
            for sub_kind in sub_kinds {
                self.excluded.insert((
                    UnitId::new(name, *sub_kind),
                    platform.as_ref().to_owned(),
                ));
            }
        }
    }

    /// Marks a unit as excluded on every active platform except the given ones.
    pub fn include<S: AsRef<str>>(&mut self, name: &str, platforms: &[S]) {
        let others: Vec<String> = self
            .platforms
            .iter()
            .filter(|active| !platforms.iter().any(|p| p.as_ref() == active.as_str()))
            .cloned()
            .collect();
        self.exclude(name, &others);
    }

    /// Marks a unit as excluded on every active platform.
    pub fn exclude_all(&mut self, name: &str) {
        let platforms = self.platforms.clone();
        self.exclude(name, &platforms);
    }

    /// Returns true if the unit is excluded on the platform.
    pub fn is_excluded(&self, unit: &UnitId, platform: &str) -> bool {
        self.excluded.contains(&(unit.clone(), platform.to_owned()))
    }
}
