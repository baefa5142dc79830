// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::ParsedTest;
use crate::{history::BenchmarkRecord, registry::UnitId};
use nightly_metadata::TestStatus;
use std::collections::HashSet;
use tracing::warn;

/// Returns true if benchmark results from this platform are recorded.
///
/// Only optimized builds produce meaningful timings, so a platform is included when its name
/// contains one of `markers` (by default `fast` and `release`).
pub fn is_benchmark_platform<S: AsRef<str>>(platform: &str, markers: &[S]) -> bool {
    markers
        .iter()
        .any(|marker| platform.contains(marker.as_ref()))
}

/// One line of benchmark output: `name, algorithm, runtime, check, extra`.
#[derive(Clone, Debug, PartialEq)]
pub struct BenchmarkLine {
    /// The benchmark name.
    pub name: String,

    /// The algorithm the benchmark exercised.
    pub algorithm: String,

    /// The runtime in seconds.
    pub runtime: f64,

    /// A check value used to spot results that changed.
    pub check: f64,
}

impl BenchmarkLine {
    /// Parses a line. Lines without exactly five fields, or with a runtime or check value that
    /// is not a number, are not benchmark lines.
    pub fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split(',').collect();
        let [name, algorithm, runtime, check, _extra] = fields.as_slice() else {
            return None;
        };
        Some(Self {
            name: name.trim().to_owned(),
            algorithm: algorithm.trim().to_owned(),
            runtime: runtime.trim().parse().ok()?,
            check: check.trim().parse().ok()?,
        })
    }
}

/// Collects benchmark records for one unit on one platform.
#[derive(Debug)]
pub struct BenchmarkCollector {
    unit: UnitId,
    platform: String,
    records: Vec<BenchmarkRecord>,
}

impl BenchmarkCollector {
    /// Creates a collector. Benchmarks are recorded against the base unit.
    pub fn new(unit: UnitId, platform: impl Into<String>) -> Self {
        Self {
            unit,
            platform: platform.into(),
            records: Vec::new(),
        }
    }

    /// Adds the benchmark lines from one passing benchmark test.
    ///
    /// The test name is the benchmark file. Values that are not finite are stored as absent.
    pub fn push(&mut self, test: ParsedTest) {
        if test.status != TestStatus::Ok {
            return;
        }
        if test.output.contains("test output was removed") {
            warn!(
                "output of benchmark {} in {} was truncated",
                test.name, self.unit
            );
        }

        let mut seen = HashSet::new();
        for line in test.output.split('\n') {
            let Some(line) = BenchmarkLine::parse(line) else {
                continue;
            };
            if !seen.insert((line.name.clone(), line.algorithm.clone())) {
                warn!(
                    "ignoring duplicate benchmark {}, {}",
                    line.name, line.algorithm
                );
                continue;
            }
            self.records.push(BenchmarkRecord {
                unit: self.unit.name.clone(),
                file: test.name.clone(),
                name: line.name,
                algorithm: line.algorithm,
                platform: self.platform.clone(),
                runtime: finite(line.runtime),
                check: finite(line.check),
            });
        }
    }

    /// Returns the collected records.
    pub fn into_records(self) -> Vec<BenchmarkRecord> {
        self.records
    }
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}
