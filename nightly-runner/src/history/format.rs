// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serialized form of history records.

use crate::{
    aggregate::{BuildInfo, LogError},
    outcome::UnitState,
    registry::UnitId,
    revision::BuildRevision,
};
use chrono::NaiveDate;
use nightly_metadata::{BuildVerdict, TestDelta, TestStatus};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

macro_rules! define_format_version {
    (
        $(#[$attr:meta])*
        $vis:vis struct $name:ident;
    ) => {
        $(#[$attr])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
        #[serde(transparent)]
        $vis struct $name(u32);

        impl $name {
            #[doc = concat!("Creates a new `", stringify!($name), "`.")]
            pub const fn new(version: u32) -> Self {
                Self(version)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_format_version! {
    /// Version of the [`DailyRecord`] format.
    pub struct FormatVersion;
}

/// The format version written by this version of nightly-check.
///
/// Records with a newer version are rejected on read.
pub const RECORD_FORMAT_VERSION: FormatVersion = FormatVersion::new(1);

/// Everything recorded for one product on one day.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DailyRecord {
    /// The record format version.
    pub format_version: FormatVersion,

    /// The build date.
    pub date: NaiveDate,

    /// The branch that was built.
    pub branch: String,

    /// The product.
    pub product: String,

    /// Whether the product's units are lab-only.
    pub lab_only: bool,

    /// The overall verdict.
    pub verdict: BuildVerdict,

    /// The product's source revision, if its version stamp was found.
    #[serde(default)]
    pub revision: Option<BuildRevision>,

    /// Revisions of other repositories that went into the build.
    #[serde(default)]
    pub other_revisions: BTreeMap<String, String>,

    /// Module list and coverage.
    #[serde(default)]
    pub build_info: BuildInfo,

    /// Problems with the set of logs the build produced.
    #[serde(default)]
    pub log_errors: Vec<LogError>,

    /// One row per unit and platform.
    #[serde(default)]
    pub units: Vec<UnitResultRow>,

    /// One row per test and platform.
    #[serde(default)]
    pub tests: Vec<TestRecord>,

    /// One row per benchmark and platform.
    #[serde(default)]
    pub benchmarks: Vec<BenchmarkRecord>,
}

/// The outcome of one unit on one platform.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct UnitResultRow {
    /// The unit.
    pub unit: UnitId,

    /// The platform.
    pub platform: String,

    /// The stored state code.
    pub state: UnitState,

    /// The line in the platform's log that the state was read from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_line: Option<usize>,
}

/// The result of one test on one platform.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestRecord {
    /// The unit the test belongs to.
    pub unit: UnitId,

    /// The test name, or its docstring if it has one.
    pub name: String,

    /// The platform.
    pub platform: String,

    /// The final status.
    pub status: TestStatus,

    /// The runtime in seconds, or 0.0 if unknown.
    pub runtime: f64,

    /// Failure output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// The change since the previous build.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<TestDelta>,
}

/// One benchmark measurement on one platform.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BenchmarkRecord {
    /// The base unit.
    pub unit: String,

    /// The benchmark file.
    pub file: String,

    /// The benchmark name.
    pub name: String,

    /// The algorithm.
    pub algorithm: String,

    /// The platform.
    pub platform: String,

    /// The runtime in seconds. Absent if it was not finite.
    pub runtime: Option<f64>,

    /// The check value. Absent if it was not finite.
    pub check: Option<f64>,
}
