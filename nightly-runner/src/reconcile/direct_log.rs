// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    matrix::ComponentMatrix,
    outcome::{CellOutcome, Outcome, Phase},
    registry::{Registry, UnitId},
};
use camino::Utf8Path;
use regex::Regex;
use std::{io, sync::LazyLock};
use tracing::{debug, warn};

/// The default pattern for section lines in a direct log.
pub const DEFAULT_SECTION_PATTERN: &str = r"^%%% (?P<unit>.+?): (?P<code>[A-Z]+)\s*$";

/// The default line a direct log ends with once the build has finished.
pub const DEFAULT_COMPLETION_MARKER: &str = "BUILD COMPLETED";

static DEFAULT_SECTION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(DEFAULT_SECTION_PATTERN).expect("default section pattern is valid")
});

/// How to read a direct log.
#[derive(Clone, Debug)]
pub struct DirectLogSettings {
    section: Regex,
    completion_marker: String,
}

impl DirectLogSettings {
    /// Creates new settings.
    ///
    /// `section` must have `unit` and `code` capture groups.
    pub fn new(section: Regex, completion_marker: impl Into<String>) -> Self {
        Self {
            section,
            completion_marker: completion_marker.into(),
        }
    }
}

impl Default for DirectLogSettings {
    fn default() -> Self {
        Self::new(DEFAULT_SECTION_REGEX.clone(), DEFAULT_COMPLETION_MARKER)
    }
}

/// Parses a section code.
pub fn outcome_for_section_code(code: &str) -> Option<Outcome> {
    let outcome = match code {
        "OK" => Outcome::Ok,
        "BUILD" => Outcome::BuildFailed,
        "TEST" => Outcome::TestFailed,
        "EXAMPLE" => Outcome::ExampleFailed,
        "BENCH" => Outcome::BenchmarkFailed,
        "DISABLED" => Outcome::Disabled,
        "UNCON" => Outcome::NotConfigured,
        "CIRCDEP" => Outcome::CircularDependency,
        "FAILDEP" => Outcome::FailedDependency,
        _ => return None,
    };
    Some(outcome)
}

/// The sections found in one direct log.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirectLog {
    sections: Vec<(UnitId, CellOutcome)>,
    completed: bool,
}

impl DirectLog {
    /// Parses the contents of a direct log.
    pub fn parse(contents: &str, settings: &DirectLogSettings) -> Self {
        let mut log = Self::default();
        for (index, line) in contents.lines().enumerate() {
            let line_number = index + 1;
            let line = line.trim_end_matches('\r');
            if line.trim() == settings.completion_marker {
                log.completed = true;
                continue;
            }
            let Some(captures) = settings.section.captures(line) else {
                continue;
            };
            let (Some(unit), Some(code)) = (captures.name("unit"), captures.name("code")) else {
                continue;
            };
            match outcome_for_section_code(code.as_str()) {
                Some(outcome) => log.sections.push((
                    UnitId::parse_display(unit.as_str()),
                    CellOutcome::at_line(outcome, line_number),
                )),
                None => warn!(
                    "line {line_number}: unknown section code `{}` for {}; ignoring",
                    code.as_str(),
                    unit.as_str()
                ),
            }
        }
        log
    }

    /// Reads a direct log from disk. A missing log is `None`.
    pub fn load(path: &Utf8Path, settings: &DirectLogSettings) -> io::Result<Option<Self>> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(Some(Self::parse(&String::from_utf8_lossy(&bytes), settings))),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Returns the sections, in log order.
    pub fn sections(&self) -> &[(UnitId, CellOutcome)] {
        &self.sections
    }

    /// Returns true if the log ends with the completion marker.
    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

/// Fills in a direct-log platform's column of the matrix.
///
/// With no log, every cell that is not excluded becomes [`Outcome::NoLog`]. If the log did not
/// reach its completion marker, units without a section are still building.
pub fn reconcile_direct_log(
    matrix: &mut ComponentMatrix,
    registry: &Registry,
    platform_name: &str,
    log: Option<&DirectLog>,
) {
    let Some(log) = log else {
        debug!("no direct log for {platform_name}");
        for unit in registry.unit_ids() {
            matrix.set_if_unset(&unit, platform_name, CellOutcome::new(Outcome::NoLog));
        }
        return;
    };

    for (unit, cell) in log.sections() {
        if registry.lookup(unit).is_none() {
            warn!("{platform_name}: log has a section for unknown unit {unit}; ignoring");
            continue;
        }
        if cell.outcome.is_ok() {
            matrix.record_ok(unit, platform_name, *cell);
        } else {
            matrix.update(unit, platform_name, *cell);
        }
    }

    if !log.is_completed() {
        for unit in registry.unit_ids() {
            if matrix.is_unset(&unit, platform_name) {
                matrix.update(
                    &unit,
                    platform_name,
                    CellOutcome::new(Outcome::Running(Phase::Build)),
                );
            }
        }
    }
}
