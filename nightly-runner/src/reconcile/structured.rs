// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::CheckError,
    helpers::sorted_dir_entries,
    matrix::ComponentMatrix,
    outcome::{CellOutcome, Outcome, Phase},
    platform::StructuredPlatform,
    registry::{Registry, SubKind, UnitId, UnitKind},
};
use camino::Utf8Path;
use serde_json::{Map, Value};
use std::{fmt, io};
use tracing::{debug, warn};

/// The summary document a structured platform writes: unit name to raw results per build type.
#[derive(Clone, Debug, Default)]
pub struct SummaryDocument {
    units: Map<String, Value>,
}

impl SummaryDocument {
    /// Parses a summary document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let units = serde_json::from_str(json)?;
        Ok(Self { units })
    }

    /// Loads a summary document from disk.
    ///
    /// A missing document means the platform produced nothing, and is empty. A document that
    /// cannot be read or parsed is also treated as empty, with a warning.
    pub fn load(path: &Utf8Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!("no summary document at {path}");
                return Self::default();
            }
            Err(error) => {
                warn!("could not read summary document {path}: {error}");
                return Self::default();
            }
        };
        match Self::from_json(&contents) {
            Ok(summary) => summary,
            Err(error) => {
                warn!("malformed summary document {path}: {error}");
                Self::default()
            }
        }
    }

    /// Returns true if the document has no units.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Iterates over units in the document.
    pub fn unit_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.units.keys().map(String::as_str)
    }

    /// Returns the raw value for a unit and build type, if present.
    pub fn raw(&self, unit: &str, phase: Phase) -> Option<&Value> {
        self.units.get(unit)?.get(phase.summary_key())
    }

    fn has_unit(&self, unit: &str) -> bool {
        self.units.contains_key(unit)
    }
}

/// A raw result code from a summary document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawCode {
    /// The build type succeeded.
    Pass,
    /// The build type failed.
    Failed,
    /// A dependency cycle.
    CircularDependency,
    /// A dependency failed.
    FailedDependency,
    /// Disabled by configuration.
    Disabled,
    /// Still running.
    Running,
    /// Never started.
    NotRun,
    /// A string that is not a known code.
    Unknown(String),
}

impl RawCode {
    /// Classifies a raw value.
    ///
    /// Zero (or `false`) is a pass and any other number or boolean is a failure. `null` means the
    /// build type never ran.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => Self::NotRun,
            Value::Bool(false) => Self::Pass,
            Value::Bool(true) => Self::Failed,
            Value::Number(n) => {
                if n.as_f64() == Some(0.0) {
                    Self::Pass
                } else {
                    Self::Failed
                }
            }
            Value::String(s) => match s.as_str() {
                "circdep" => Self::CircularDependency,
                "depfail" => Self::FailedDependency,
                "disabled" => Self::Disabled,
                "running" => Self::Running,
                "notrun" => Self::NotRun,
                other => Self::Unknown(other.to_owned()),
            },
            Value::Array(_) | Value::Object(_) => Self::Failed,
        }
    }

    /// Returns the outcome for this code in the given build type, or the unrecognized string for
    /// [`RawCode::Unknown`].
    pub fn to_outcome(&self, phase: Phase) -> Result<Outcome, &str> {
        let outcome = match self {
            Self::Pass => Outcome::Ok,
            Self::Failed => Outcome::failed(phase),
            Self::CircularDependency => Outcome::CircularDependency,
            Self::FailedDependency => Outcome::FailedDependency,
            Self::Disabled => Outcome::Disabled,
            Self::Running => Outcome::Running(phase),
            Self::NotRun => Outcome::NotRun(phase),
            Self::Unknown(code) => return Err(code),
        };
        Ok(outcome)
    }
}

/// Fills in a structured platform's column of the matrix from its summary document.
///
/// Special units only have a build step. A module's examples and benchmarks are read into its
/// sub-units; if the platform does not run that build type, the sub-unit is excluded.
pub fn reconcile_structured(
    matrix: &mut ComponentMatrix,
    registry: &Registry,
    platform_name: &str,
    platform: &StructuredPlatform,
    summary: &SummaryDocument,
) {
    for (name, kind) in registry.names().map(|name| (name, registry.kind(name))) {
        if summary.has_unit(name) {
            warn_extra_build_types(name, platform_name, platform, summary);
        }

        let build_types: &[Phase] = if registry.is_special(name) {
            &[Phase::Build]
        } else {
            platform.build_types()
        };
        let base_types: Vec<Phase> = build_types
            .iter()
            .copied()
            .filter(|phase| matches!(phase, Phase::Build | Phase::Test))
            .collect();
        apply_build_types(
            matrix,
            &UnitId::base(name),
            platform_name,
            &base_types,
            summary,
        );

        if kind == Some(UnitKind::Module) {
            for (sub_kind, phase) in [
                (SubKind::Examples, Phase::Example),
                (SubKind::Benchmarks, Phase::Benchmark),
            ] {
                let unit = UnitId::new(name, sub_kind);
                if build_types.contains(&phase) {
                    apply_build_types(matrix, &unit, platform_name, &[phase], summary);
                } else {
                    matrix.mark_excluded(&unit, platform_name);
                }
            }
        }
    }
}

fn warn_extra_build_types(
    name: &str,
    platform_name: &str,
    platform: &StructuredPlatform,
    summary: &SummaryDocument,
) {
    for phase in Phase::ALL {
        if !platform.has(phase) && summary.raw(name, phase).is_some() {
            warn!("{name} in {platform_name} has extra build type {phase}");
        }
    }
}

fn apply_build_types(
    matrix: &mut ComponentMatrix,
    unit: &UnitId,
    platform_name: &str,
    build_types: &[Phase],
    summary: &SummaryDocument,
) {
    for &phase in build_types {
        let raw = summary
            .raw(&unit.name, phase)
            .map_or(RawCode::NotRun, RawCode::from_value);
        let outcome = match raw.to_outcome(phase) {
            Ok(outcome) => outcome,
            Err(code) => {
                warn!(
                    "{unit} in {platform_name}: unrecognized {} `{code}`; \
                     skipping remaining build types",
                    phase.summary_key()
                );
                matrix.set_if_unset(unit, platform_name, CellOutcome::new(Outcome::NoLog));
                return;
            }
        };
        if matrix
            .update(unit, platform_name, CellOutcome::new(outcome))
            .is_changed()
        {
            return;
        }
    }
}

/// A unit that is still running or has failed to build, found while inspecting a build
/// directory that may not have finished.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildProblem {
    /// The platform.
    pub platform: String,

    /// The unit.
    pub unit: String,

    /// What is wrong.
    pub kind: BuildProblemKind,
}

/// The kind of a [`BuildProblem`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildProblemKind {
    /// The build step has not finished.
    StillRunning,

    /// The build step failed with the given raw code.
    Failed(String),
}

impl fmt::Display for BuildProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            BuildProblemKind::StillRunning => {
                write!(f, "{}: {} still running", self.platform, self.unit)
            }
            BuildProblemKind::Failed(code) => {
                write!(f, "{}: {} failed with {code}", self.platform, self.unit)
            }
        }
    }
}

/// Lists units whose build step is running or failed, across every platform directory under a
/// product log directory that has a summary document.
pub fn scan_build_problems(product_log_dir: &Utf8Path) -> Result<Vec<BuildProblem>, CheckError> {
    let entries = sorted_dir_entries(product_log_dir).map_err(|error| CheckError::ListDir {
        path: product_log_dir.to_owned(),
        error,
    })?;

    let mut problems = Vec::new();
    for (platform, is_dir) in entries {
        if !is_dir {
            continue;
        }
        let path = product_log_dir.join(&platform).join("summary.json");
        if !path.exists() {
            continue;
        }
        let summary = SummaryDocument::load(&path);
        for unit in summary.unit_names() {
            let Some(raw) = summary.raw(unit, Phase::Build) else {
                continue;
            };
            let kind = match RawCode::from_value(raw) {
                RawCode::Running => BuildProblemKind::StillRunning,
                RawCode::Pass | RawCode::Disabled | RawCode::NotRun => continue,
                _ => BuildProblemKind::Failed(raw_display(raw)),
            };
            problems.push(BuildProblem {
                platform: platform.clone(),
                unit: unit.to_owned(),
                kind,
            });
        }
    }
    Ok(problems)
}

fn raw_display(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use indexmap::IndexMap;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use test_case::test_case;

    const FAST: &str = "fast8";

    fn registry() -> Registry {
        let mut registry = Registry::new("IMP", false, [FAST], IndexMap::new());
        registry.add_component_list(indoc! {"
            build\tALL
            module\tem
            application\tfoxs
        "});
        registry
    }

    fn outcome(matrix: &ComponentMatrix, unit: &str) -> Outcome {
        matrix
            .get(&UnitId::parse_display(unit), FAST)
            .map(|cell| cell.outcome)
            .expect("cell exists")
    }

    fn run(platform: &StructuredPlatform, summary: &str) -> ComponentMatrix {
        let registry = registry();
        let mut matrix = ComponentMatrix::new(&registry);
        let summary = SummaryDocument::from_json(summary).expect("valid summary");
        reconcile_structured(&mut matrix, &registry, FAST, platform, &summary);
        matrix.finalize();
        matrix
    }

    fn all_types() -> StructuredPlatform {
        StructuredPlatform::new(Phase::ALL, [])
    }

    #[test_case(json!(0), RawCode::Pass; "zero")]
    #[test_case(json!(0.0), RawCode::Pass; "float zero")]
    #[test_case(json!(false), RawCode::Pass; "false")]
    #[test_case(json!(2), RawCode::Failed; "nonzero")]
    #[test_case(json!(true), RawCode::Failed; "true")]
    #[test_case(json!(null), RawCode::NotRun; "null")]
    #[test_case(json!("circdep"), RawCode::CircularDependency; "circdep")]
    #[test_case(json!("depfail"), RawCode::FailedDependency; "depfail")]
    #[test_case(json!("exploded"), RawCode::Unknown("exploded".to_owned()); "unknown string")]
    fn raw_codes(value: Value, expected: RawCode) {
        assert_eq!(RawCode::from_value(&value), expected);
    }

    #[test]
    fn first_failing_build_type_wins() {
        let matrix = run(
            &all_types(),
            r#"{
                "ALL": {"build_result": 0},
                "em": {"build_result": 0, "test_result": 1,
                       "example_result": "running", "benchmark_result": 0},
                "foxs": {"build_result": 1, "test_result": 1}
            }"#,
        );
        assert_eq!(outcome(&matrix, "ALL"), Outcome::Ok);
        assert_eq!(outcome(&matrix, "em"), Outcome::TestFailed);
        assert_eq!(outcome(&matrix, "em examples"), Outcome::Running(Phase::Example));
        assert_eq!(outcome(&matrix, "em benchmarks"), Outcome::Ok);
        assert_eq!(outcome(&matrix, "foxs"), Outcome::BuildFailed);
    }

    #[test]
    fn missing_units_and_types_did_not_run() {
        let matrix = run(&all_types(), r#"{"em": {"build_result": 0}}"#);
        assert_eq!(outcome(&matrix, "em"), Outcome::NotRun(Phase::Test));
        assert_eq!(outcome(&matrix, "em examples"), Outcome::NotRun(Phase::Example));
        assert_eq!(outcome(&matrix, "foxs"), Outcome::NotRun(Phase::Build));
        assert_eq!(outcome(&matrix, "ALL"), Outcome::NotRun(Phase::Build));
    }

    #[test]
    fn special_units_only_build() {
        let matrix = run(
            &all_types(),
            r#"{"ALL": {"build_result": 0, "test_result": 1}}"#,
        );
        assert_eq!(outcome(&matrix, "ALL"), Outcome::Ok);
    }

    #[test]
    fn sub_units_without_build_type_are_excluded() {
        let platform = StructuredPlatform::new([Phase::Build, Phase::Test], []);
        let matrix = run(
            &platform,
            r#"{"em": {"build_result": 0, "test_result": 0, "example_result": 1}}"#,
        );
        assert_eq!(outcome(&matrix, "em"), Outcome::Ok);
        assert_eq!(outcome(&matrix, "em examples"), Outcome::Excluded);
        assert_eq!(outcome(&matrix, "em benchmarks"), Outcome::Excluded);
    }

    #[test]
    fn unknown_string_aborts_the_cell() {
        let matrix = run(
            &all_types(),
            r#"{"foxs": {"build_result": "exploded", "test_result": 1}}"#,
        );
        assert_eq!(outcome(&matrix, "foxs"), Outcome::NoLog);
    }

    #[test]
    fn excluded_cell_is_not_overwritten() {
        let mut registry = registry();
        registry.exclude("foxs", &[FAST]);
        let mut matrix = ComponentMatrix::new(&registry);
        let summary =
            SummaryDocument::from_json(r#"{"foxs": {"build_result": 1}}"#).expect("valid");
        reconcile_structured(&mut matrix, &registry, FAST, &all_types(), &summary);
        matrix.finalize();
        assert_eq!(outcome(&matrix, "foxs"), Outcome::Excluded);
    }

    #[test]
    fn malformed_summary_is_empty() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let path = dir.path().join("summary.json");
        std::fs::write(&path, "{not json").expect("wrote summary");
        assert!(SummaryDocument::load(&path).is_empty());
        assert!(SummaryDocument::load(&dir.path().join("missing.json")).is_empty());
    }

    #[test]
    fn build_problems() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let fast = dir.path().join("fast8");
        std::fs::create_dir(&fast).expect("created platform dir");
        std::fs::write(
            fast.join("summary.json"),
            r#"{
                "em": {"build_result": "running"},
                "foxs": {"build_result": 2},
                "kernel": {"build_result": 0},
                "mpi": {"build_result": "disabled"},
                "spb": {"build_result": "depfail"}
            }"#,
        )
        .expect("wrote summary");
        std::fs::create_dir(dir.path().join("debug8")).expect("created platform dir");

        let problems: Vec<_> = scan_build_problems(dir.path())
            .expect("scanned")
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            problems,
            [
                "fast8: em still running",
                "fast8: foxs failed with 2",
                "fast8: spb failed with depfail",
            ]
        );
    }
}
