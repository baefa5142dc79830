// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The unit × platform grid of outcomes for one product.

use crate::{
    outcome::{CellOutcome, CellSeverity, Outcome, Phase},
    platform::PlatformCatalog,
    registry::{Registry, UnitId},
};
use indexmap::IndexMap;
use itertools::Itertools;
use swrite::{SWrite, swrite, swriteln};
use tracing::warn;

/// Outcomes for every (unit, platform) cell of one product.
///
/// Cells start out unset, except for those the registry excludes, which start out
/// [`Outcome::Excluded`]. Reconcilers fill cells in with [`Self::update`]; [`Self::finalize`]
/// turns anything still unset into [`Outcome::Ok`].
#[derive(Clone, Debug)]
pub struct ComponentMatrix {
    platforms: Vec<String>,
    cells: IndexMap<UnitId, Vec<Option<CellOutcome>>>,
}

impl ComponentMatrix {
    /// Creates a matrix for every unit and active platform in the registry.
    pub fn new(registry: &Registry) -> Self {
        let platforms = registry.platforms().to_vec();
        let cells = registry
            .unit_ids()
            .map(|unit| {
                let row = platforms
                    .iter()
                    .map(|platform| {
                        registry
                            .is_excluded(&unit, platform)
                            .then(|| CellOutcome::new(Outcome::Excluded))
                    })
                    .collect();
                (unit, row)
            })
            .collect();
        Self { platforms, cells }
    }

    /// Returns the platforms, in order.
    pub fn platforms(&self) -> &[String] {
        &self.platforms
    }

    /// Iterates over units in order.
    pub fn units(&self) -> impl Iterator<Item = &UnitId> + '_ {
        self.cells.keys()
    }

    fn cell_mut(&mut self, unit: &UnitId, platform: &str) -> Option<&mut Option<CellOutcome>> {
        let index = self.platforms.iter().position(|p| p == platform)?;
        self.cells.get_mut(unit)?.get_mut(index)
    }

    /// Records an outcome for a cell.
    ///
    /// * A cell excluded up front keeps `Excluded`. Reporting anything other than a phase that
    ///   never ran or a disabled unit for it is suspicious and is warned about.
    /// * `Ok` never changes a cell.
    /// * The first failure recorded for a cell wins.
    pub fn update(&mut self, unit: &UnitId, platform: &str, new: CellOutcome) -> CellUpdate {
        let Some(cell) = self.cell_mut(unit, platform) else {
            warn!("ignoring result {} for unknown cell {unit} on {platform}", new.outcome);
            return CellUpdate::Unchanged;
        };
        if let Some(update) = check_excluded(cell.as_ref(), unit, platform, new) {
            return update;
        }
        if new.outcome.is_ok() || cell.is_some() {
            return CellUpdate::Unchanged;
        }
        *cell = Some(new);
        CellUpdate::Changed
    }

    /// Records a successful result that carries information of its own, such as a log line.
    ///
    /// The cell is only set if it is still unset. Excluded cells are checked as in
    /// [`Self::update`].
    pub fn record_ok(&mut self, unit: &UnitId, platform: &str, ok: CellOutcome) -> CellUpdate {
        let Some(cell) = self.cell_mut(unit, platform) else {
            warn!("ignoring result {} for unknown cell {unit} on {platform}", ok.outcome);
            return CellUpdate::Unchanged;
        };
        if let Some(update) = check_excluded(cell.as_ref(), unit, platform, ok) {
            return update;
        }
        if cell.is_some() {
            return CellUpdate::Unchanged;
        }
        *cell = Some(ok);
        CellUpdate::Changed
    }

    /// Marks a cell as excluded, overriding anything recorded for it.
    pub fn mark_excluded(&mut self, unit: &UnitId, platform: &str) {
        if let Some(cell) = self.cell_mut(unit, platform) {
            *cell = Some(CellOutcome::new(Outcome::Excluded));
        }
    }

    /// Records an outcome for a cell only if it is still unset, without checking exclusions.
    ///
    /// Unlike [`Self::update`], this can store [`Outcome::Ok`].
    pub fn set_if_unset(&mut self, unit: &UnitId, platform: &str, outcome: CellOutcome) {
        if let Some(cell) = self.cell_mut(unit, platform) {
            if cell.is_none() {
                *cell = Some(outcome);
            }
        }
    }

    /// Returns true if the cell has not been set yet.
    pub fn is_unset(&self, unit: &UnitId, platform: &str) -> bool {
        self.platform_index(platform)
            .and_then(|index| self.cells.get(unit)?.get(index))
            .is_some_and(Option::is_none)
    }

    /// Sets every cell that is still unset to `Ok`.
    pub fn finalize(&mut self) {
        for row in self.cells.values_mut() {
            for cell in row.iter_mut().filter(|cell| cell.is_none()) {
                *cell = Some(CellOutcome::new(Outcome::Ok));
            }
        }
    }

    fn platform_index(&self, platform: &str) -> Option<usize> {
        self.platforms.iter().position(|p| p == platform)
    }

    /// Returns the outcome of a cell. Unset cells read as `Ok`.
    pub fn get(&self, unit: &UnitId, platform: &str) -> Option<CellOutcome> {
        let index = self.platform_index(platform)?;
        let cell = self.cells.get(unit)?.get(index)?;
        Some(cell.unwrap_or(CellOutcome::new(Outcome::Ok)))
    }

    /// Iterates over every cell, unit by unit.
    pub fn cells(&self) -> impl Iterator<Item = (&UnitId, &str, CellOutcome)> + '_ {
        self.cells.iter().flat_map(move |(unit, row)| {
            row.iter().zip(&self.platforms).map(move |(cell, platform)| {
                (
                    unit,
                    platform.as_str(),
                    cell.unwrap_or(CellOutcome::new(Outcome::Ok)),
                )
            })
        })
    }

    /// Returns the outcomes for one unit, in platform order.
    pub fn by_unit<'a>(
        &'a self,
        unit: &UnitId,
    ) -> impl Iterator<Item = (&'a str, CellOutcome)> + 'a {
        self.cells
            .get(unit)
            .into_iter()
            .flat_map(move |row| {
                row.iter().zip(&self.platforms).map(|(cell, platform)| {
                    (
                        platform.as_str(),
                        cell.unwrap_or(CellOutcome::new(Outcome::Ok)),
                    )
                })
            })
    }

    /// Returns the outcomes on one platform, in unit order.
    pub fn by_platform<'a>(
        &'a self,
        platform: &str,
    ) -> impl Iterator<Item = (&'a UnitId, CellOutcome)> + 'a {
        let index = self.platform_index(platform);
        self.cells.iter().filter_map(move |(unit, row)| {
            let cell = row.get(index?)?;
            Some((unit, cell.unwrap_or(CellOutcome::new(Outcome::Ok))))
        })
    }

    /// Returns the units that have a reportable failure on at least one platform.
    pub fn failed_units(&self) -> Vec<&UnitId> {
        self.cells
            .iter()
            .filter(|(_, row)| row.iter().flatten().any(|c| c.outcome.is_reportable_failure()))
            .map(|(unit, _)| unit)
            .collect()
    }

    /// Returns the platforms that have a reportable failure for at least one unit.
    pub fn failed_platforms(&self) -> Vec<&str> {
        self.platforms
            .iter()
            .enumerate()
            .filter(|(index, _)| {
                self.cells.values().any(|row| {
                    row[*index].is_some_and(|c| c.outcome.is_reportable_failure())
                })
            })
            .map(|(_, platform)| platform.as_str())
            .collect()
    }

    /// Returns the most severe cell in the matrix.
    pub fn severity(&self) -> CellSeverity {
        self.cells()
            .map(|(_, _, cell)| cell.outcome.severity())
            .max()
            .unwrap_or(CellSeverity::Ok)
    }

    /// Returns true if any cell is still running the given phase.
    pub fn is_running(&self, phase: Phase) -> bool {
        self.cells()
            .any(|(_, _, cell)| cell.outcome == Outcome::Running(phase))
    }

    /// Renders the plain-text failure summary: only units and platforms with at least one
    /// reportable failure are shown.
    pub fn text_summary(&self, name: &str, catalog: &PlatformCatalog) -> String {
        let mut out = String::new();
        swrite!(
            out,
            "{name} module failure summary (BUILD = failed to build;\n\
             TEST = failed tests; DISAB = disabled due to wrong configuration;\n\
             skip = not built on this platform; only modules that failed on\n\
             at least one architecture are shown)\n"
        );

        let platforms = self.failed_platforms();
        let header = platforms
            .iter()
            .map(|platform| format!("{:<5}", catalog.very_short(platform)))
            .join(" ");
        swriteln!(out, "{:13}{header}", "");

        for unit in self.failed_units() {
            let unit_name: String = unit.to_string().chars().take(13).collect();
            let codes = platforms
                .iter()
                .map(|platform| {
                    let bucket = self
                        .get(unit, platform)
                        .map_or("-", |cell| cell.outcome.display_bucket().as_str());
                    format!("{bucket:<5}")
                })
                .join(" ");
            swriteln!(out, "{unit_name:<13}{codes}");
        }
        out
    }
}

/// What [`ComponentMatrix::update`] did with a result.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CellUpdate {
    /// The result was stored.
    Changed,

    /// The cell already held a result, or the result does not change cells.
    Unchanged,

    /// The cell is excluded, but the result claims the unit was built or tested there. The cell
    /// stays excluded.
    ExcludedMismatch,
}

impl CellUpdate {
    /// Returns true if the result was stored.
    pub fn is_changed(self) -> bool {
        self == Self::Changed
    }
}

fn check_excluded(
    cell: Option<&CellOutcome>,
    unit: &UnitId,
    platform: &str,
    new: CellOutcome,
) -> Option<CellUpdate> {
    if !matches!(
        cell,
        Some(CellOutcome {
            outcome: Outcome::Excluded,
            ..
        })
    ) {
        return None;
    }
    if matches!(new.outcome, Outcome::NotRun(_) | Outcome::Disabled) {
        return Some(CellUpdate::Unchanged);
    }
    warn!(
        "build of {unit} reported {} for {platform}, \
         but component is supposed to be excluded",
        new.outcome
    );
    Some(CellUpdate::ExcludedMismatch)
}
