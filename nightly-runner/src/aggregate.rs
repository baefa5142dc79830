// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Checking one product's build from end to end.
//!
//! [`ProductCheck::run`] builds the product's registry and matrix, checks that the build wrote
//! the logs and files it should have, reconciles every platform, parses every report, and
//! computes the overall [`BuildVerdict`].

use crate::{
    config::{NightlyConfig, ProductConfig},
    errors::CheckError,
    helpers::{BuildLayout, sorted_dir_entries},
    history::{
        BenchmarkRecord, DailyRecord, PreviousStatuses, RECORD_FORMAT_VERSION, TestRecord,
        UnitResultRow,
    },
    matrix::ComponentMatrix,
    outcome::UnitState,
    platform::PlatformClass,
    reconcile::{DirectLog, SummaryDocument, reconcile_direct_log, reconcile_structured},
    registry::Registry,
    report::{
        BenchmarkCollector, ReportFile, ReportKind, ReportParser, TestCollector,
        is_benchmark_platform,
    },
    revision::{BuildRevision, read_other_revisions},
};
use camino::Utf8Path;
use chrono::NaiveDate;
use nightly_metadata::BuildVerdict;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, sync::LazyLock};
use swrite::{SWrite, swrite, swriteln};
use tracing::{debug, info, warn};

/// A problem with the set of logs or files a build produced.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum LogError {
    /// An expected log was not written.
    MissingLog {
        /// The log path, relative to the build's log directory.
        log: String,

        /// What should have written the log.
        description: String,
    },

    /// A log was written that nothing is expected to write.
    ExtraLog {
        /// The log path, relative to the build's log directory.
        log: String,
    },

    /// A file the build should have produced is missing.
    MissingOutput {
        /// The file, relative to the build root.
        output: String,

        /// What should have produced the file.
        description: String,

        /// The log of the step that should have produced the file, if there is one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        log: Option<String>,
    },
}

impl LogError {
    /// Returns true if the build system itself misbehaved.
    pub fn is_bad_log(&self) -> bool {
        matches!(self, Self::MissingLog { .. } | Self::ExtraLog { .. })
    }
}

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingLog { log, description } => {
                write!(f, "{description}: log {log} not generated")
            }
            Self::ExtraLog { log } => write!(f, "Unexpected log {log} generated"),
            Self::MissingOutput {
                output,
                description,
                log: None,
            } => write!(f, "{description}: output {output} not generated"),
            Self::MissingOutput {
                output,
                description,
                log: Some(log),
            } => write!(f, "{description}: output {output} not generated; see log {log}"),
        }
    }
}

/// Module list and per-module coverage.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildInfo {
    /// Units in component list order.
    pub modules: Vec<ModuleInfo>,
}

/// One module in [`BuildInfo`].
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModuleInfo {
    /// The unit name.
    pub name: String,

    /// Python line coverage, in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_coverage: Option<f64>,

    /// C++ line coverage, in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpp_coverage: Option<f64>,
}

impl ModuleInfo {
    /// Creates an entry without coverage.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            python_coverage: None,
            cpp_coverage: None,
        }
    }
}

static PYTHON_COVERAGE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<span class=.pc_cov.>(\d+)%</span>").expect("python coverage regex is valid")
});

static CPP_COVERAGE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<td class="headerCovTableEntry\w+">(\d+\.\d+)(?:\s|&nbsp;)*%</td>"#)
        .expect("C++ coverage regex is valid")
});

fn extract_percentage(regex: &Regex, path: &Utf8Path) -> Option<f64> {
    let contents = std::fs::read_to_string(path).ok()?;
    contents
        .lines()
        .find_map(|line| regex.captures(line))
        .and_then(|captures| captures[1].parse().ok())
}

impl BuildInfo {
    /// Collects the module list. With `coverage_dir`, coverage percentages are read from
    /// `coverage/python/<module>/index.html` and `coverage/cpp/<module>/index.html` under it.
    pub fn collect<'a>(
        modules: impl IntoIterator<Item = &'a str>,
        coverage_dir: Option<&Utf8Path>,
    ) -> Self {
        let modules = modules
            .into_iter()
            .map(|name| {
                let mut info = ModuleInfo::new(name);
                if let Some(dir) = coverage_dir {
                    let coverage = dir.join("coverage");
                    info.python_coverage = extract_percentage(
                        &PYTHON_COVERAGE_REGEX,
                        &coverage.join("python").join(name).join("index.html"),
                    );
                    info.cpp_coverage = extract_percentage(
                        &CPP_COVERAGE_REGEX,
                        &coverage.join("cpp").join(name).join("index.html"),
                    );
                }
                info
            })
            .collect();
        Self { modules }
    }
}

/// Combines the matrix severity with log problems.
///
/// A missing or unexpected log always gives [`BuildVerdict::BadLog`]. Otherwise a missing output
/// file turns a build that would pass into [`BuildVerdict::Build`].
pub fn compute_verdict(matrix: &ComponentMatrix, log_errors: &[LogError]) -> BuildVerdict {
    if log_errors.iter().any(LogError::is_bad_log) {
        return BuildVerdict::BadLog;
    }
    let verdict = BuildVerdict::from(matrix.severity());
    let missing_output = log_errors
        .iter()
        .any(|e| matches!(e, LogError::MissingOutput { .. }));
    if missing_output && verdict.is_pass() {
        BuildVerdict::Build
    } else {
        verdict
    }
}

fn substitute_version(file: &str, revision: Option<&BuildRevision>) -> String {
    match revision {
        Some(revision) => file.replace("{version}", &revision.long_version),
        None => file.to_owned(),
    }
}

/// Lists a directory, treating one that cannot be read as empty.
fn list_dir_or_warn(dir: &Utf8Path) -> Vec<(String, bool)> {
    sorted_dir_entries(dir).unwrap_or_else(|error| {
        warn!("error listing {dir}, treating it as empty: {error}");
        Vec::new()
    })
}

/// Checks one product's build.
#[derive(Debug)]
pub struct ProductCheck<'a> {
    config: &'a NightlyConfig,
    product: &'a ProductConfig,
    previous: &'a PreviousStatuses,
}

impl<'a> ProductCheck<'a> {
    /// Creates a check. `previous` holds the previous build's test statuses, for deltas.
    pub fn new(
        config: &'a NightlyConfig,
        product: &'a ProductConfig,
        previous: &'a PreviousStatuses,
    ) -> Self {
        Self {
            config,
            product,
            previous,
        }
    }

    /// Runs the check.
    pub fn run(&self) -> Result<ProductResult, CheckError> {
        let product = self.product;
        let layout = product.layout(self.config.root());
        let log_dir = layout.product_log_dir(product.dir());
        info!("checking product {} in {log_dir}", product.name());

        let registry = product
            .registry(&layout, self.config.special_units())
            .map_err(|error| CheckError::Registry {
                product: product.name().to_owned(),
                error,
            })?;

        let revision = self.read_revision(&layout)?;
        let other_revisions = read_other_revisions(
            &layout,
            product.repository(),
            self.config.revision_aliases(),
        )
        .map_err(|error| CheckError::ListDir {
            path: layout.build_dir(),
            error,
        })?;

        let log_errors = self.check_logs(&layout, revision.as_ref());

        let mut matrix = ComponentMatrix::new(&registry);
        for (platform, class) in product.platforms() {
            match class {
                PlatformClass::Structured(structured) => {
                    let summary =
                        SummaryDocument::load(&layout.summary_document(product.dir(), platform));
                    reconcile_structured(&mut matrix, &registry, platform, structured, &summary);
                }
                PlatformClass::DirectLog => {
                    let log = self.read_direct_log(&log_dir, platform);
                    reconcile_direct_log(&mut matrix, &registry, platform, log.as_ref());
                }
            }
        }
        matrix.finalize();

        let (tests, benchmarks) = self.collect_reports(&registry, &log_dir);

        let verdict = compute_verdict(&matrix, &log_errors);
        let coverage_dir = product.module_coverage().then_some(log_dir.as_path());
        let build_info = BuildInfo::collect(registry.names(), coverage_dir);
        debug!("product {}: verdict {verdict}", product.name());

        Ok(ProductResult {
            product: product.clone(),
            registry,
            matrix,
            log_errors,
            verdict,
            build_info,
            revision,
            other_revisions,
            tests,
            benchmarks,
        })
    }

    fn read_revision(&self, layout: &BuildLayout) -> Result<Option<BuildRevision>, CheckError> {
        let repo = self.product.repository();
        if !layout.version_stamp(repo).exists() {
            warn!(
                "product {}: no version stamp for repository {repo}",
                self.product.name()
            );
            return Ok(None);
        }
        BuildRevision::read(layout, repo)
            .map(Some)
            .map_err(|error| CheckError::Revision {
                product: self.product.name().to_owned(),
                error,
            })
    }

    fn read_direct_log(&self, log_dir: &Utf8Path, platform: &str) -> Option<DirectLog> {
        let info = self.config.platforms().get(platform)?;
        let path = log_dir.join(&info.logfile);
        match DirectLog::load(&path, self.config.direct_log()) {
            Ok(log) => log,
            Err(error) => {
                warn!("error reading direct log {path}: {error}");
                None
            }
        }
    }

    fn check_logs(
        &self,
        layout: &BuildLayout,
        revision: Option<&BuildRevision>,
    ) -> Vec<LogError> {
        let product = self.product;
        let log_dir = layout.product_log_dir(product.dir());
        let mut errors = Vec::new();

        // Expected logs: configured ones, then the direct logs of direct-log platforms.
        let mut expected: Vec<(&str, &str, &[String])> = product
            .logs()
            .iter()
            .map(|log| (log.name(), log.description(), log.generated_files()))
            .collect();
        for (platform, class) in product.platforms() {
            if *class == PlatformClass::DirectLog
                && let Some(info) = self.config.platforms().get(platform)
            {
                expected.push((info.logfile.as_str(), info.long.as_str(), &[]));
            }
        }

        for (name, description, generated_files) in &expected {
            let log = format!("{}/{name}", product.dir());
            if !log_dir.join(name).exists() {
                errors.push(LogError::MissingLog {
                    log,
                    description: (*description).to_owned(),
                });
                continue;
            }
            for file in generated_files.iter() {
                let output = substitute_version(file, revision);
                if !layout.root().join(&output).exists() {
                    errors.push(LogError::MissingOutput {
                        output,
                        description: (*description).to_owned(),
                        log: Some(log.clone()),
                    });
                }
            }
        }

        for (platform, class) in product.platforms() {
            let PlatformClass::Structured(structured) = class else {
                continue;
            };
            for file in structured.generated_files() {
                let output = substitute_version(file, revision);
                if !layout.root().join(&output).exists() {
                    errors.push(LogError::MissingOutput {
                        output,
                        description: self.config.platforms().long(platform).to_owned(),
                        log: None,
                    });
                }
            }
        }

        for (file_name, is_dir) in list_dir_or_warn(&log_dir) {
            if is_dir || !file_name.ends_with(".log") {
                continue;
            }
            if !expected.iter().any(|(name, _, _)| *name == file_name) {
                errors.push(LogError::ExtraLog {
                    log: format!("{}/{file_name}", product.dir()),
                });
            }
        }

        errors
    }

    fn collect_reports(
        &self,
        registry: &Registry,
        log_dir: &Utf8Path,
    ) -> (Vec<TestRecord>, Vec<BenchmarkRecord>) {
        let report_config = self.config.report();
        let parser = ReportParser::new(report_config.namespace_prefix());
        let policy = report_config.output_policy();
        let mut tests = Vec::new();
        let mut benchmarks = Vec::new();

        // Every platform directory is read, including platforms no longer active.
        for (platform, is_dir) in list_dir_or_warn(log_dir) {
            if !is_dir {
                continue;
            }
            let platform_dir = log_dir.join(&platform);
            let benchmark_platform =
                is_benchmark_platform(&platform, report_config.benchmark_platform_markers());

            for (file_name, _) in list_dir_or_warn(&platform_dir) {
                let Some(file) = ReportFile::classify(&platform_dir.join(&file_name)) else {
                    continue;
                };
                let Some(base) = file.base_unit(registry) else {
                    if !self.product.ignore_unknown() {
                        warn!(
                            "{}: report for unknown unit {}; ignoring",
                            file.path(),
                            file.module()
                        );
                    }
                    continue;
                };

                // Applications have no examples or benchmarks sub-units, but their benchmark
                // output is still recorded against the base unit.
                let mut collector = file.unit(registry).map(|unit| {
                    TestCollector::new(unit, platform.as_str(), self.previous, policy)
                });
                let mut bench_collector = (file.kind() == ReportKind::Benchmark
                    && benchmark_platform)
                    .then(|| BenchmarkCollector::new(base.clone(), platform.as_str()));
                if collector.is_none() && bench_collector.is_none() {
                    debug!("{}: {base} has no sub-unit for this report; ignoring", file.path());
                    continue;
                }

                let result = parser.parse_file(&file, |test| {
                    if let Some(bench_collector) = &mut bench_collector {
                        bench_collector.push(test.clone());
                    }
                    if let Some(collector) = &mut collector {
                        collector.push(test);
                    }
                });
                match result {
                    Ok(0) if file.kind() == ReportKind::Test => {
                        warn!("no tests for {base} {platform}");
                    }
                    Ok(_) => {}
                    Err(error) => {
                        warn!("{error}: {}; skipping document", error.kind());
                        continue;
                    }
                }

                if let Some(collector) = collector {
                    tests.extend(collector.into_records());
                }
                if let Some(bench_collector) = bench_collector {
                    benchmarks.extend(bench_collector.into_records());
                }
            }
        }

        (tests, benchmarks)
    }
}

/// Everything learned about one product's build.
#[derive(Clone, Debug)]
pub struct ProductResult {
    product: ProductConfig,
    registry: Registry,
    matrix: ComponentMatrix,
    log_errors: Vec<LogError>,
    verdict: BuildVerdict,
    build_info: BuildInfo,
    revision: Option<BuildRevision>,
    other_revisions: BTreeMap<String, String>,
    tests: Vec<TestRecord>,
    benchmarks: Vec<BenchmarkRecord>,
}

impl ProductResult {
    /// Returns the product's name.
    pub fn name(&self) -> &str {
        self.product.name()
    }

    /// Returns the registry the check used.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Returns the reconciled matrix.
    pub fn matrix(&self) -> &ComponentMatrix {
        &self.matrix
    }

    /// Returns problems with the logs and files the build produced.
    pub fn log_errors(&self) -> &[LogError] {
        &self.log_errors
    }

    /// Returns the overall verdict.
    pub fn verdict(&self) -> BuildVerdict {
        self.verdict
    }

    /// Returns the product's revision, if its version stamp was found.
    pub fn revision(&self) -> Option<&BuildRevision> {
        self.revision.as_ref()
    }

    /// Returns every test record.
    pub fn tests(&self) -> &[TestRecord] {
        &self.tests
    }

    /// Returns every benchmark record.
    pub fn benchmarks(&self) -> &[BenchmarkRecord] {
        &self.benchmarks
    }

    /// Renders the plain-text report: a pass/fail line, one line per log problem, and the matrix
    /// failure summary.
    pub fn text_report(&self, config: &NightlyConfig) -> String {
        let mut out = String::new();
        if self.log_errors.is_empty() {
            swriteln!(out, "{} OK", self.name());
        } else {
            swriteln!(out, "{} FAILED", self.name());
            for error in &self.log_errors {
                swriteln!(out, "  {error}");
            }
        }
        if !self.registry.is_empty() {
            swrite!(
                out,
                "{}\n",
                self.matrix.text_summary(self.name(), config.platforms())
            );
        }
        out
    }

    /// Converts the result into a history record.
    pub fn into_record(self, date: NaiveDate, branch: impl Into<String>) -> DailyRecord {
        let units = self
            .matrix
            .cells()
            .map(|(unit, platform, cell)| UnitResultRow {
                unit: unit.clone(),
                platform: platform.to_owned(),
                state: UnitState {
                    outcome: cell.outcome,
                    structured: self
                        .product
                        .platforms()
                        .get(platform)
                        .is_some_and(PlatformClass::is_structured),
                },
                log_line: cell.log_line,
            })
            .collect();

        DailyRecord {
            format_version: RECORD_FORMAT_VERSION,
            date,
            branch: branch.into(),
            product: self.product.dir().to_owned(),
            lab_only: self.product.lab_only(),
            verdict: self.verdict,
            revision: self.revision,
            other_revisions: self.other_revisions,
            build_info: self.build_info,
            log_errors: self.log_errors,
            units,
            tests: self.tests,
            benchmarks: self.benchmarks,
        }
    }
}
