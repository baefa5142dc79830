// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The closed set of results a unit can have on a platform.
//!
//! Every (unit, platform) cell of a [`ComponentMatrix`](crate::matrix::ComponentMatrix) holds
//! exactly one [`Outcome`] once reconciliation is done. Consumers classify outcomes through the
//! tables on `Outcome` rather than matching on them directly, so that adding a variant forces
//! every table to be revisited.

use nightly_metadata::BuildVerdict;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::{fmt, str::FromStr};

/// A build type, in the order build types are applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Compiling the unit.
    Build,
    /// Running the unit's tests.
    Test,
    /// Running the unit's examples.
    Example,
    /// Running the unit's benchmarks.
    Benchmark,
}

impl Phase {
    /// All phases, in precedence order.
    pub const ALL: [Phase; 4] = [Self::Build, Self::Test, Self::Example, Self::Benchmark];

    /// Returns the lowercase name of this phase.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Test => "test",
            Self::Example => "example",
            Self::Benchmark => "benchmark",
        }
    }

    /// Returns the key holding this phase's raw result in a platform summary document.
    pub fn summary_key(self) -> &'static str {
        match self {
            Self::Build => "build_result",
            Self::Test => "test_result",
            Self::Example => "example_result",
            Self::Benchmark => "benchmark_result",
        }
    }

    fn code_suffix(self) -> &'static str {
        match self {
            Self::Build => "BUILD",
            Self::Test => "TEST",
            Self::Example => "EX",
            Self::Benchmark => "BENCH",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The classified result of one unit on one platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Built, and everything that ran passed.
    Ok,
    /// The unit is intentionally not built on this platform.
    Excluded,
    /// The unit was not configured on this platform.
    NotConfigured,
    /// No log exists for this unit on this platform.
    NoLog,
    /// The unit failed to build.
    BuildFailed,
    /// At least one of the unit's tests failed.
    TestFailed,
    /// At least one of the unit's examples failed.
    ExampleFailed,
    /// At least one of the unit's benchmarks failed.
    BenchmarkFailed,
    /// The unit was disabled because of a configuration error.
    Disabled,
    /// The unit could not be built because of a dependency cycle.
    CircularDependency,
    /// The unit was not built because a dependency failed to build.
    FailedDependency,
    /// The given phase started but had not finished.
    Running(Phase),
    /// The given phase never started.
    NotRun(Phase),
}

impl Outcome {
    /// Every outcome, for exhaustive table checks.
    pub const ALL: [Outcome; 19] = [
        Self::Ok,
        Self::Excluded,
        Self::NotConfigured,
        Self::NoLog,
        Self::BuildFailed,
        Self::TestFailed,
        Self::ExampleFailed,
        Self::BenchmarkFailed,
        Self::Disabled,
        Self::CircularDependency,
        Self::FailedDependency,
        Self::Running(Phase::Build),
        Self::Running(Phase::Test),
        Self::Running(Phase::Example),
        Self::Running(Phase::Benchmark),
        Self::NotRun(Phase::Build),
        Self::NotRun(Phase::Test),
        Self::NotRun(Phase::Example),
        Self::NotRun(Phase::Benchmark),
    ];

    /// Returns the failure outcome specific to the given phase.
    pub fn failed(phase: Phase) -> Self {
        match phase {
            Phase::Build => Self::BuildFailed,
            Phase::Test => Self::TestFailed,
            Phase::Example => Self::ExampleFailed,
            Phase::Benchmark => Self::BenchmarkFailed,
        }
    }

    /// Returns true if this is [`Outcome::Ok`].
    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Classifies this outcome for the plain-text failure summary.
    pub fn display_bucket(self) -> DisplayBucket {
        match self {
            Self::Ok | Self::NoLog | Self::NotRun(_) | Self::FailedDependency => {
                DisplayBucket::Blank
            }
            Self::BuildFailed | Self::CircularDependency => DisplayBucket::Build,
            Self::Running(_) => DisplayBucket::Incomplete,
            Self::BenchmarkFailed => DisplayBucket::Benchmark,
            Self::TestFailed | Self::ExampleFailed => DisplayBucket::Test,
            Self::Disabled => DisplayBucket::Disabled,
            Self::NotConfigured => DisplayBucket::Unconfigured,
            Self::Excluded => DisplayBucket::Skip,
        }
    }

    /// Returns true if this outcome makes its unit and platform show up in failures-only views.
    ///
    /// Benign states (intentional exclusion, missing logs, phases that never started) are not
    /// failures.
    pub fn is_reportable_failure(self) -> bool {
        match self {
            Self::Ok | Self::Excluded | Self::NoLog | Self::NotRun(_) => false,
            Self::NotConfigured
            | Self::BuildFailed
            | Self::TestFailed
            | Self::ExampleFailed
            | Self::BenchmarkFailed
            | Self::Disabled
            | Self::CircularDependency
            | Self::FailedDependency
            | Self::Running(_) => true,
        }
    }

    /// Returns the severity of this outcome for the overall verdict.
    pub fn severity(self) -> CellSeverity {
        match self {
            Self::Running(_) => CellSeverity::Incomplete,
            Self::TestFailed | Self::ExampleFailed | Self::BenchmarkFailed => CellSeverity::Test,
            Self::BuildFailed | Self::CircularDependency | Self::Disabled => CellSeverity::Build,
            Self::Ok
            | Self::Excluded
            | Self::NotConfigured
            | Self::NoLog
            | Self::FailedDependency
            | Self::NotRun(_) => CellSeverity::Ok,
        }
    }

    /// Returns the stable code for this outcome, as stored in history.
    pub fn state_code(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Excluded => "SKIP",
            Self::NotConfigured => "UNCON",
            Self::NoLog => "NOLOG",
            Self::BuildFailed => "BUILD",
            Self::TestFailed => "TEST",
            Self::ExampleFailed => "EXAMPLE",
            Self::BenchmarkFailed => "BENCH",
            Self::Disabled => "DISABLED",
            Self::CircularDependency => "CIRCDEP",
            Self::FailedDependency => "FAILDEP",
            Self::Running(Phase::Build) => "RUNBUILD",
            Self::Running(Phase::Test) => "RUNTEST",
            Self::Running(Phase::Example) => "RUNEX",
            Self::Running(Phase::Benchmark) => "RUNBENCH",
            Self::NotRun(Phase::Build) => "NOBUILD",
            Self::NotRun(Phase::Test) => "NOTEST",
            Self::NotRun(Phase::Example) => "NOEX",
            Self::NotRun(Phase::Benchmark) => "NOBENCH",
        }
    }

    /// Parses a code produced by [`Self::state_code`].
    pub fn from_state_code(code: &str) -> Option<Self> {
        if let Some(suffix) = code.strip_prefix("RUN") {
            return phase_from_code_suffix(suffix).map(Self::Running);
        }
        if let Some(suffix) = code.strip_prefix("NO") {
            if let Some(phase) = phase_from_code_suffix(suffix) {
                return Some(Self::NotRun(phase));
            }
        }
        Self::ALL
            .into_iter()
            .find(|outcome| outcome.state_code() == code)
    }

    /// Returns a short human-readable description.
    pub fn description(self) -> &'static str {
        match self {
            Self::Ok => "built successfully",
            Self::Excluded => "not built on this platform",
            Self::NotConfigured => "not configured",
            Self::NoLog => "no log file for build on this platform",
            Self::BuildFailed => "failed to build",
            Self::TestFailed => "failed test cases",
            Self::ExampleFailed => "examples failed",
            Self::BenchmarkFailed => "benchmark failed",
            Self::Disabled => "disabled due to configuration error",
            Self::CircularDependency => "did not build (circular dependency)",
            Self::FailedDependency => "not built due to the failure to build a dependency",
            Self::Running(Phase::Build) => "build did not complete",
            Self::Running(Phase::Test) => "test did not complete",
            Self::Running(Phase::Example) => "examples did not complete",
            Self::Running(Phase::Benchmark) => "benchmark did not complete",
            Self::NotRun(Phase::Build) => "build did not run",
            Self::NotRun(Phase::Test) => "test did not run",
            Self::NotRun(Phase::Example) => "examples did not run",
            Self::NotRun(Phase::Benchmark) => "benchmark did not run",
        }
    }
}

fn phase_from_code_suffix(suffix: &str) -> Option<Phase> {
    Phase::ALL
        .into_iter()
        .find(|phase| phase.code_suffix() == suffix)
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.state_code())
    }
}

/// An outcome, plus the 1-based line in the platform's log that it was derived from, if known.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellOutcome {
    /// The outcome.
    pub outcome: Outcome,

    /// The log line this outcome refers to.
    pub log_line: Option<usize>,
}

impl CellOutcome {
    /// Creates a new `CellOutcome` with no log line.
    pub fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            log_line: None,
        }
    }

    /// Creates a new `CellOutcome` pointing at a log line.
    pub fn at_line(outcome: Outcome, log_line: usize) -> Self {
        Self {
            outcome,
            log_line: Some(log_line),
        }
    }
}

impl From<Outcome> for CellOutcome {
    fn from(outcome: Outcome) -> Self {
        Self::new(outcome)
    }
}

/// The column value shown for an outcome in the plain-text failure summary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DisplayBucket {
    /// Nothing to report.
    Blank,
    /// Failed to build.
    Build,
    /// Still running.
    Incomplete,
    /// Benchmark failure.
    Benchmark,
    /// Test or example failure.
    Test,
    /// Disabled by configuration.
    Disabled,
    /// Not configured.
    Unconfigured,
    /// Not built on this platform.
    Skip,
}

impl DisplayBucket {
    /// Returns the column text, at most five characters wide.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blank => "-",
            Self::Build => "BUILD",
            Self::Incomplete => "INCOM",
            Self::Benchmark => "BENCH",
            Self::Test => "TEST",
            Self::Disabled => "DISAB",
            Self::Unconfigured => "UNCON",
            Self::Skip => "skip",
        }
    }
}

/// How bad a single cell is for the purposes of the overall verdict.
///
/// Declared least severe first, so the worst cell is the maximum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CellSeverity {
    /// Does not affect the verdict.
    Ok,
    /// A test, example or benchmark failure.
    Test,
    /// Something was still running.
    Incomplete,
    /// A build failure, dependency cycle, or disabled unit.
    Build,
}

impl From<CellSeverity> for BuildVerdict {
    fn from(severity: CellSeverity) -> Self {
        match severity {
            CellSeverity::Ok => BuildVerdict::Ok,
            CellSeverity::Test => BuildVerdict::Test,
            CellSeverity::Incomplete => BuildVerdict::Incomplete,
            CellSeverity::Build => BuildVerdict::Build,
        }
    }
}

/// A unit's outcome on one platform as stored in history.
///
/// Outcomes from structured platforms are stored with a `CMAKE_` prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UnitState {
    /// The outcome.
    pub outcome: Outcome,

    /// Whether the outcome came from a structured platform.
    pub structured: bool,
}

const STRUCTURED_PREFIX: &str = "CMAKE_";

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.structured {
            f.write_str(STRUCTURED_PREFIX)?;
        }
        f.write_str(self.outcome.state_code())
    }
}

impl FromStr for UnitState {
    type Err = UnknownStateCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (code, structured) = match s.strip_prefix(STRUCTURED_PREFIX) {
            Some(code) => (code, true),
            None => (s, false),
        };
        let outcome = Outcome::from_state_code(code).ok_or_else(|| UnknownStateCode {
            code: s.to_owned(),
        })?;
        Ok(Self {
            outcome,
            structured,
        })
    }
}

impl Serialize for UnitState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for UnitState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct V;

        impl de::Visitor<'_> for V {
            type Value = UnitState;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "a unit state code such as `OK` or `CMAKE_TEST`")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(V)
    }
}

/// Error returned when a stored unit state code is not recognized.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown unit state code `{code}`")]
pub struct UnknownStateCode {
    code: String,
}
