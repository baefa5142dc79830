// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{DailyRecord, TestRecord};
use crate::{
    outcome::UnitState,
    platform::PlatformCatalog,
    registry::{SubKind, UnitId},
};
use indexmap::IndexSet;
use nightly_metadata::{BuildVerdict, TestDelta};
use std::collections::HashMap;

/// Tests that ran longer than this many seconds are reported as long.
pub const LONG_TEST_SECONDS: f64 = 20.0;

/// One day's records, as seen by the dashboard.
///
/// The public view leaves out lab-only products.
#[derive(Clone, Debug)]
pub struct DailyView {
    records: Vec<DailyRecord>,
    lab: bool,
}

impl DailyView {
    /// Creates a view over one day's records.
    pub fn new(records: Vec<DailyRecord>, lab: bool) -> Self {
        let records = records
            .into_iter()
            .filter(|record| lab || !record.lab_only)
            .collect();
        Self { records, lab }
    }

    /// Returns true if lab-only products are included.
    pub fn is_lab(&self) -> bool {
        self.lab
    }

    /// Returns the records in the view.
    pub fn records(&self) -> &[DailyRecord] {
        &self.records
    }

    fn tests(&self) -> impl Iterator<Item = &TestRecord> + '_ {
        self.records.iter().flat_map(|r| r.tests.iter())
    }

    /// Returns the worst verdict over every product in the view, or `None` if nothing was built.
    pub fn verdict(&self) -> Option<BuildVerdict> {
        self.records.iter().map(|r| r.verdict).max()
    }

    /// Returns true if the day's build counts as a pass for machine checks.
    pub fn is_pass(&self) -> bool {
        self.verdict().is_some_and(BuildVerdict::is_pass)
    }

    /// Returns every test of a unit, optionally on one platform only. Failing tests come first.
    pub fn component_tests(&self, unit: &UnitId, platform: Option<&str>) -> Vec<&TestRecord> {
        let mut tests: Vec<_> = self
            .tests()
            .filter(|t| &t.unit == unit && platform.is_none_or(|p| t.platform == p))
            .collect();
        tests.sort_by_key(|t| t.status.is_ok_like());
        tests
    }

    /// Returns every failing test, ordered by unit.
    pub fn failed_tests(&self) -> Vec<&TestRecord> {
        let mut tests: Vec<_> = self.tests().filter(|t| !t.status.is_ok_like()).collect();
        tests.sort_by(|a, b| a.unit.name.cmp(&b.unit.name));
        tests
    }

    /// Returns every test that failed today but not in the previous build, ordered by unit.
    pub fn new_failures(&self) -> Vec<&TestRecord> {
        let mut tests: Vec<_> = self
            .tests()
            .filter(|t| t.delta == Some(TestDelta::Newfail))
            .collect();
        tests.sort_by(|a, b| a.unit.name.cmp(&b.unit.name));
        tests
    }

    /// Returns every test that took longer than [`LONG_TEST_SECONDS`], slowest first.
    pub fn long_tests(&self) -> Vec<&TestRecord> {
        let mut tests: Vec<_> = self
            .tests()
            .filter(|t| t.runtime > LONG_TEST_SECONDS)
            .collect();
        tests.sort_by(|a, b| b.runtime.total_cmp(&a.runtime));
        tests
    }

    /// Returns the unit by platform grid.
    ///
    /// Units follow the stored module order, each module followed by its benchmarks and examples;
    /// units the module list doesn't know come last. Platforms follow the catalog, with unknown
    /// platforms last.
    pub fn unit_summary(&self, catalog: &PlatformCatalog) -> UnitSummary {
        let mut fail_counts: HashMap<(UnitId, &str), (usize, usize)> = HashMap::new();
        for test in self.tests().filter(|t| !t.status.is_ok_like()) {
            let counts = fail_counts
                .entry((test.unit.clone(), test.platform.as_str()))
                .or_default();
            counts.0 += 1;
            if test.delta == Some(TestDelta::Newfail) {
                counts.1 += 1;
            }
        }

        let mut cells = HashMap::new();
        let mut seen_units = IndexSet::new();
        let mut seen_platforms = IndexSet::new();
        let mut failed_units = IndexSet::new();
        let mut failed_platforms = IndexSet::new();
        for record in &self.records {
            for row in &record.units {
                seen_units.insert(row.unit.clone());
                seen_platforms.insert(row.platform.clone());
                if row.state.outcome.is_reportable_failure() {
                    failed_units.insert(row.unit.clone());
                    failed_platforms.insert(row.platform.clone());
                }
                let (failures, new_failures) = fail_counts
                    .get(&(row.unit.clone(), row.platform.as_str()))
                    .copied()
                    .unwrap_or_default();
                cells.insert(
                    (row.unit.clone(), row.platform.clone()),
                    SummaryCell {
                        state: row.state,
                        log_line: row.log_line,
                        lab_only: record.lab_only,
                        failures,
                        new_failures,
                    },
                );
            }
        }

        let mut units = Vec::with_capacity(seen_units.len());
        for record in &self.records {
            for module in &record.build_info.modules {
                for sub_kind in [SubKind::Base, SubKind::Benchmarks, SubKind::Examples] {
                    let unit = UnitId::new(module.name.clone(), sub_kind);
                    if seen_units.shift_remove(&unit) {
                        units.push(unit);
                    }
                }
            }
        }
        units.extend(seen_units);

        let mut platforms: Vec<String> = seen_platforms.into_iter().collect();
        catalog.sort(&mut platforms);

        UnitSummary {
            units,
            platforms,
            cells,
            failed_units,
            failed_platforms,
        }
    }
}

/// One cell of the unit summary grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SummaryCell {
    /// The stored state.
    pub state: UnitState,

    /// The line in the platform log the state came from.
    pub log_line: Option<usize>,

    /// Whether the unit belongs to a lab-only product.
    pub lab_only: bool,

    /// The number of failing tests.
    pub failures: usize,

    /// The number of tests that failed today but not in the previous build.
    pub new_failures: usize,
}

/// The unit by platform grid for one day.
#[derive(Clone, Debug)]
pub struct UnitSummary {
    units: Vec<UnitId>,
    platforms: Vec<String>,
    cells: HashMap<(UnitId, String), SummaryCell>,
    failed_units: IndexSet<UnitId>,
    failed_platforms: IndexSet<String>,
}

impl UnitSummary {
    /// Returns the units, in display order.
    pub fn units(&self) -> &[UnitId] {
        &self.units
    }

    /// Returns the platforms, in display order.
    pub fn platforms(&self) -> &[String] {
        &self.platforms
    }

    /// Returns a cell, or `None` if the unit has no result on the platform.
    pub fn get(&self, unit: &UnitId, platform: &str) -> Option<&SummaryCell> {
        self.cells.get(&(unit.clone(), platform.to_owned()))
    }

    /// Returns true if the outcome in a cell counts as a failure.
    pub fn is_failure(&self, unit: &UnitId, platform: &str) -> bool {
        self.get(unit, platform)
            .is_some_and(|cell| cell.state.outcome.is_reportable_failure())
    }

    /// Restricts the grid to units and platforms with at least one failure.
    pub fn failures_only(mut self) -> Self {
        self.units.retain(|u| self.failed_units.contains(u));
        self.platforms.retain(|p| self.failed_platforms.contains(p));
        self
    }
}
