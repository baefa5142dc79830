// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Build platforms and their descriptions.

use crate::outcome::Phase;
use indexmap::IndexMap;
use serde::Deserialize;

/// Human-readable descriptions of one build platform.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct PlatformInfo {
    /// A label of at most five characters, used as a column header in text summaries.
    pub very_short: String,

    /// A short label.
    pub short: String,

    /// A one-line description.
    pub long: String,

    #[serde(default)]
    very_long: Option<String>,

    /// The name of the raw build log for this platform.
    pub logfile: String,
}

impl PlatformInfo {
    /// Creates a platform description without a very long description.
    pub fn new(
        very_short: impl Into<String>,
        short: impl Into<String>,
        long: impl Into<String>,
        logfile: impl Into<String>,
    ) -> Self {
        Self {
            very_short: very_short.into(),
            short: short.into(),
            long: long.into(),
            very_long: None,
            logfile: logfile.into(),
        }
    }

    /// Returns the longest description available, falling back to [`Self::long`].
    pub fn very_long(&self) -> &str {
        self.very_long.as_deref().unwrap_or(&self.long)
    }
}

/// The catalog of known platforms, in display order.
///
/// Platform names that are not in the catalog (for example, platforms that have since been
/// retired but still show up in history) are tolerated and sort after all known platforms.
#[derive(Clone, Debug, Default)]
pub struct PlatformCatalog {
    platforms: IndexMap<String, PlatformInfo>,
}

impl PlatformCatalog {
    /// Creates a catalog from platforms in display order.
    pub fn new(platforms: IndexMap<String, PlatformInfo>) -> Self {
        Self { platforms }
    }

    /// Looks up a platform by name.
    pub fn get(&self, name: &str) -> Option<&PlatformInfo> {
        self.platforms.get(name)
    }

    /// Returns true if the platform is in the catalog.
    pub fn contains(&self, name: &str) -> bool {
        self.platforms.contains_key(name)
    }

    /// Iterates over known platforms in display order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PlatformInfo)> + '_ {
        self.platforms.iter().map(|(name, info)| (name.as_str(), info))
    }

    /// Returns the very short label for a platform, or its name if it is not known.
    pub fn very_short<'a>(&'a self, name: &'a str) -> &'a str {
        self.get(name).map_or(name, |info| info.very_short.as_str())
    }

    /// Returns the long description for a platform, or its name if it is not known.
    pub fn long<'a>(&'a self, name: &'a str) -> &'a str {
        self.get(name).map_or(name, |info| info.long.as_str())
    }

    /// Returns a key that sorts platforms in display order.
    pub fn sort_key<'a>(&self, name: &'a str) -> (usize, &'a str) {
        let index = self
            .platforms
            .get_index_of(name)
            .unwrap_or(self.platforms.len());
        (index, name)
    }

    /// Sorts platform names in display order.
    pub fn sort<S: AsRef<str>>(&self, names: &mut [S]) {
        names.sort_by(|a, b| self.sort_key(a.as_ref()).cmp(&self.sort_key(b.as_ref())));
    }
}

/// How results for a platform are produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlatformClass {
    /// The platform writes a machine-readable summary document.
    Structured(StructuredPlatform),

    /// The platform writes a single flat log with section markers.
    DirectLog,
}

impl PlatformClass {
    /// Returns true for [`PlatformClass::Structured`].
    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Structured(_))
    }
}

/// Settings for a structured platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructuredPlatform {
    build_types: Vec<Phase>,
    generated_files: Vec<String>,
}

impl StructuredPlatform {
    /// Creates a new structured platform.
    ///
    /// Build types are stored in canonical order regardless of the order they were given in.
    pub fn new(
        build_types: impl IntoIterator<Item = Phase>,
        generated_files: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut build_types: Vec<_> = build_types.into_iter().collect();
        build_types.sort_unstable();
        build_types.dedup();
        Self {
            build_types,
            generated_files: generated_files.into_iter().collect(),
        }
    }

    /// Returns the build types, in canonical order.
    pub fn build_types(&self) -> &[Phase] {
        &self.build_types
    }

    /// Returns true if the platform runs the given build type.
    pub fn has(&self, phase: Phase) -> bool {
        self.build_types.contains(&phase)
    }

    /// Returns files the build is expected to produce, relative to the build root.
    pub fn generated_files(&self) -> &[String] {
        &self.generated_files
    }
}
