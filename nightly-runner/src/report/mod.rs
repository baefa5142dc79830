// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-test records from CTest-style XML reports.
//!
//! Each platform directory holds one report per module and kind: `<module>.test.xml`,
//! `<module>.example.xml` and `<module>.benchmark.xml`. A [`ReportParser`] turns the raw tests in
//! a report into [`ParsedTest`]s, which a [`TestCollector`] or [`BenchmarkCollector`] turns into
//! history records.

mod benchmark;

pub use benchmark::*;

use crate::{
    errors::{ReportReadError, ReportReadErrorKind},
    helpers::{tail_chars, truncate_chars},
    history::{PreviousStatuses, TestRecord},
    registry::{Registry, SubKind, UnitId},
};
use camino::{Utf8Path, Utf8PathBuf};
use ctest_xml::TestReport;
use nightly_metadata::{TestDelta, TestStatus};
use std::{collections::HashSet, fs::File, io::BufReader};
use tracing::warn;

/// The kind of a report file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReportKind {
    /// `<module>.test.xml`
    Test,
    /// `<module>.example.xml`
    Example,
    /// `<module>.benchmark.xml`
    Benchmark,
}

impl ReportKind {
    /// All kinds.
    pub const ALL: [ReportKind; 3] = [Self::Test, Self::Example, Self::Benchmark];

    /// Returns the file name suffix for this kind.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Test => ".test.xml",
            Self::Example => ".example.xml",
            Self::Benchmark => ".benchmark.xml",
        }
    }

    /// Returns the sub-unit that results of this kind belong to.
    pub fn sub_kind(self) -> SubKind {
        match self {
            Self::Test => SubKind::Base,
            Self::Example => SubKind::Examples,
            Self::Benchmark => SubKind::Benchmarks,
        }
    }
}

/// A report file found in a platform directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportFile {
    path: Utf8PathBuf,
    module: String,
    kind: ReportKind,
}

impl ReportFile {
    /// Classifies a path by its file name. Returns `None` if it is not a report.
    pub fn classify(path: &Utf8Path) -> Option<Self> {
        let file_name = path.file_name()?;
        let kind = ReportKind::ALL
            .into_iter()
            .find(|kind| file_name.ends_with(kind.suffix()))?;
        let module = file_name.split('.').next()?;
        if module.is_empty() {
            return None;
        }
        Some(Self {
            path: path.to_owned(),
            module: module.to_owned(),
            kind,
        })
    }

    /// Returns the path.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Returns the module name, from the first component of the file name.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Returns the kind of report.
    pub fn kind(&self) -> ReportKind {
        self.kind
    }

    /// Resolves the unit this report's results belong to.
    pub fn unit(&self, registry: &Registry) -> Option<UnitId> {
        let unit = UnitId::new(&self.module, self.kind.sub_kind());
        registry.lookup(&unit).map(|_| unit)
    }

    /// Resolves the base unit of this report's module.
    pub fn base_unit(&self, registry: &Registry) -> Option<UnitId> {
        registry
            .kind(&self.module)
            .map(|_| UnitId::base(&self.module))
    }
}

/// One test from a report, after name and status normalization.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedTest {
    /// The test name, with the namespace and module prefixes removed.
    pub name: String,

    /// The final status.
    pub status: TestStatus,

    /// The runtime in seconds, or 0.0 if it was not reported.
    pub runtime: f64,

    /// Captured output.
    pub output: String,

    /// The unittest failure detail, if any.
    pub detail: Option<String>,

    /// The test's docstring, if any.
    pub docstring: Option<String>,
}

/// Normalizes raw tests from a report.
#[derive(Clone, Debug)]
pub struct ReportParser {
    namespace_prefix: String,
}

impl ReportParser {
    /// Creates a parser that strips the given namespace prefix (e.g. `IMP.`) from test names.
    pub fn new(namespace_prefix: impl Into<String>) -> Self {
        Self {
            namespace_prefix: namespace_prefix.into(),
        }
    }

    /// Normalizes one raw test belonging to `module`.
    ///
    /// Tests without a name, and tests whose name does not belong to the module, are dropped with
    /// a warning.
    pub fn normalize(&self, test: ctest_xml::Test, module: &str) -> Option<ParsedTest> {
        let Some(raw_name) = test.name.as_deref() else {
            warn!("test without a name encountered; ignored");
            return None;
        };
        let name = raw_name
            .strip_prefix(self.namespace_prefix.as_str())
            .unwrap_or(raw_name);
        let Some(name) = name
            .strip_prefix(module)
            .and_then(|rest| rest.strip_prefix(['.', '-']))
        else {
            warn!("test name {name} does not start with module {module}; ignoring");
            return None;
        };

        let mut status = match test.status {
            ctest_xml::TestStatus::Passed => TestStatus::Ok,
            ctest_xml::TestStatus::Failed | ctest_xml::TestStatus::NotRun => TestStatus::Fail,
        };
        match test.exit_code() {
            Some("Timeout") => status = TestStatus::Timeout,
            Some("SEGFAULT") => status = TestStatus::Segfault,
            _ => {}
        }
        if status == TestStatus::Ok {
            let skip = test.has_case_state("SKIP");
            let expfail = test.has_case_state("EXPFAIL");
            status = match (skip, expfail) {
                (true, true) => TestStatus::SkipExpfail,
                (true, false) => TestStatus::Skip,
                (false, true) => TestStatus::Expfail,
                (false, false) => TestStatus::Ok,
            };
        }

        let runtime = test
            .execution_time()
            .and_then(|time| time.trim().parse::<f64>().ok())
            .unwrap_or(0.0);

        Some(ParsedTest {
            name: name.to_owned(),
            status,
            runtime,
            detail: test.detail().map(str::to_owned),
            docstring: test.docstring().map(str::to_owned),
            output: test.output,
        })
    }

    /// Normalizes every test in a parsed report, passing valid ones to `sink`. Returns the number
    /// of valid tests.
    pub fn parse_report(
        &self,
        report: TestReport,
        module: &str,
        mut sink: impl FnMut(ParsedTest),
    ) -> usize {
        let mut count = 0;
        for test in report.tests {
            if let Some(parsed) = self.normalize(test, module) {
                sink(parsed);
                count += 1;
            }
        }
        count
    }

    /// Reads and normalizes a report file.
    ///
    /// The whole document is parsed before any test reaches `sink`, so a document that fails to
    /// parse contributes nothing.
    pub fn parse_file(
        &self,
        file: &ReportFile,
        sink: impl FnMut(ParsedTest),
    ) -> Result<usize, ReportReadError> {
        let handle = File::open(file.path())
            .map_err(|error| ReportReadError::new(file.path(), ReportReadErrorKind::Io(error)))?;
        let report = TestReport::parse(BufReader::new(handle))
            .map_err(|error| ReportReadError::new(file.path(), ReportReadErrorKind::Parse(error)))?;
        Ok(self.parse_report(report, file.module(), sink))
    }
}

/// How much failure output to keep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputPolicy {
    /// Raw output longer than this many characters keeps only its tail.
    pub tail_chars: usize,

    /// Unittest detail is cut to this many characters.
    pub detail_head_chars: usize,
}

impl Default for OutputPolicy {
    fn default() -> Self {
        Self {
            tail_chars: 2048,
            detail_head_chars: 20480,
        }
    }
}

impl OutputPolicy {
    /// Returns the output to store for a test.
    ///
    /// Passing tests store nothing. Otherwise unittest detail is preferred over raw output, and
    /// empty output is not stored.
    pub fn stored_output(&self, test: &ParsedTest) -> Option<String> {
        if test.status == TestStatus::Ok {
            return None;
        }
        let output = match test.detail.as_deref().filter(|detail| !detail.is_empty()) {
            Some(detail) => truncate_chars(detail, self.detail_head_chars).to_owned(),
            None if test.output.chars().count() > self.tail_chars => {
                format!("[...] {}", tail_chars(&test.output, self.tail_chars))
            }
            None => test.output.clone(),
        };
        (!output.is_empty()).then_some(output)
    }
}

/// Collects test records for one unit on one platform.
#[derive(Debug)]
pub struct TestCollector<'a> {
    unit: UnitId,
    platform: String,
    previous: &'a PreviousStatuses,
    policy: OutputPolicy,
    seen: HashSet<String>,
    records: Vec<TestRecord>,
}

impl<'a> TestCollector<'a> {
    /// Creates a collector. `previous` holds the previous build's statuses, for deltas.
    pub fn new(
        unit: UnitId,
        platform: impl Into<String>,
        previous: &'a PreviousStatuses,
        policy: OutputPolicy,
    ) -> Self {
        Self {
            unit,
            platform: platform.into(),
            previous,
            policy,
            seen: HashSet::new(),
            records: Vec::new(),
        }
    }

    /// Adds a test. A docstring replaces the test name; duplicate names are dropped with a
    /// warning.
    pub fn push(&mut self, test: ParsedTest) {
        let name = test.docstring.clone().unwrap_or_else(|| test.name.clone());
        if !self.seen.insert(name.clone()) {
            warn!("duplicate test {name} in {}; ignoring", self.unit);
            return;
        }
        let previous = self.previous.get(&self.unit, &name, &self.platform);
        self.records.push(TestRecord {
            unit: self.unit.clone(),
            platform: self.platform.clone(),
            status: test.status,
            runtime: test.runtime,
            output: self.policy.stored_output(&test),
            delta: TestDelta::between(previous, test.status),
            name,
        });
    }

    /// Returns the collected records.
    pub fn into_records(self) -> Vec<TestRecord> {
        self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::UnitKind;
    use indexmap::IndexMap;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn parse_one(xml: &str) -> Option<ParsedTest> {
        let report = TestReport::parse_str(xml).expect("valid report");
        let mut tests = Vec::new();
        ReportParser::new("IMP.").parse_report(report, "em", |test| tests.push(test));
        tests.pop()
    }

    #[test_case("IMP.em.test_maps", Some("test_maps"); "namespace and module")]
    #[test_case("em-test_maps", Some("test_maps"); "dash separator")]
    #[test_case("IMP.emx.test_maps", None; "other module")]
    #[test_case("IMP.kernel.test_maps", None; "wrong module")]
    fn test_names(raw: &str, expected: Option<&str>) {
        let xml = format!(r#"<Test Status="passed"><Name>{raw}</Name></Test>"#);
        assert_eq!(parse_one(&xml).map(|t| t.name).as_deref(), expected);
    }

    #[test]
    fn nameless_test_is_dropped() {
        assert_eq!(parse_one(r#"<Test Status="passed"></Test>"#), None);
    }

    #[test_case("passed", "", &[], TestStatus::Ok; "passed")]
    #[test_case("failed", "", &[], TestStatus::Fail; "failed")]
    #[test_case("notrun", "", &[], TestStatus::Fail; "not run")]
    #[test_case("failed", "Timeout", &[], TestStatus::Timeout; "timeout")]
    #[test_case("failed", "SEGFAULT", &["SKIP"], TestStatus::Segfault; "segfault beats cases")]
    #[test_case("passed", "", &["SKIP", "OK"], TestStatus::Skip; "skip")]
    #[test_case("passed", "", &["EXPFAIL"], TestStatus::Expfail; "expfail")]
    #[test_case("passed", "", &["EXPFAIL", "SKIP"], TestStatus::SkipExpfail; "skip and expfail")]
    #[test_case("failed", "", &["SKIP"], TestStatus::Fail; "cases only refine passes")]
    fn status_precedence(status: &str, exit_code: &str, cases: &[&str], expected: TestStatus) {
        let mut xml = format!(r#"<Test Status="{status}"><Name>em.t</Name><Results>"#);
        if !exit_code.is_empty() {
            xml.push_str(&format!(
                r#"<NamedMeasurement name="Exit Code"><Value>{exit_code}</Value></NamedMeasurement>"#
            ));
        }
        xml.push_str("</Results>");
        for (i, state) in cases.iter().enumerate() {
            xml.push_str(&format!(r#"<TestCase name="c{i}" state="{state}"/>"#));
        }
        xml.push_str("</Test>");
        assert_eq!(parse_one(&xml).map(|t| t.status), Some(expected));
    }

    #[test]
    fn runtime_defaults_to_zero() {
        let xml = indoc! {r#"
            <Testing>
              <Test Status="passed"><Name>em.a</Name>
                <NamedMeasurement name="Execution Time"><Value>3.5</Value></NamedMeasurement>
              </Test>
              <Test Status="passed"><Name>em.b</Name></Test>
            </Testing>
        "#};
        let report = TestReport::parse_str(xml).expect("valid report");
        let mut runtimes = Vec::new();
        let count =
            ReportParser::new("IMP.").parse_report(report, "em", |t| runtimes.push(t.runtime));
        assert_eq!(count, 2);
        assert_eq!(runtimes, [3.5, 0.0]);
    }

    fn parsed(status: TestStatus, output: &str, detail: Option<&str>) -> ParsedTest {
        ParsedTest {
            name: "test_x".to_owned(),
            status,
            runtime: 0.0,
            output: output.to_owned(),
            detail: detail.map(str::to_owned),
            docstring: None,
        }
    }

    #[test]
    fn output_policy() {
        let policy = OutputPolicy {
            tail_chars: 4,
            detail_head_chars: 3,
        };
        assert_eq!(policy.stored_output(&parsed(TestStatus::Ok, "noise", None)), None);
        assert_eq!(
            policy.stored_output(&parsed(TestStatus::Fail, "abcdefg", None)).as_deref(),
            Some("[...] defg")
        );
        assert_eq!(
            policy.stored_output(&parsed(TestStatus::Fail, "abcd", None)).as_deref(),
            Some("abcd")
        );
        assert_eq!(
            policy
                .stored_output(&parsed(TestStatus::Fail, "abcdefg", Some("detail")))
                .as_deref(),
            Some("det")
        );
        assert_eq!(
            policy
                .stored_output(&parsed(TestStatus::Skip, "", Some("")))
                .as_deref(),
            None
        );
    }

    #[test]
    fn collector_dedupes_and_computes_deltas() {
        let unit = UnitId::base("em");
        let mut previous = PreviousStatuses::default();
        previous.insert(unit.clone(), "test_a", "fast8", TestStatus::Ok);
        previous.insert(unit.clone(), "Density maps", "fast8", TestStatus::Fail);

        let mut collector =
            TestCollector::new(unit.clone(), "fast8", &previous, OutputPolicy::default());
        collector.push(parsed_named("test_a", TestStatus::Timeout, None));
        collector.push(parsed_named("test_b", TestStatus::Ok, Some("Density maps")));
        collector.push(parsed_named("test_a", TestStatus::Ok, None));
        let records = collector.into_records();

        let summary: Vec<_> = records
            .iter()
            .map(|r| (r.name.as_str(), r.status, r.delta))
            .collect();
        assert_eq!(
            summary,
            [
                ("test_a", TestStatus::Timeout, Some(TestDelta::Newfail)),
                ("Density maps", TestStatus::Ok, Some(TestDelta::Newok)),
            ]
        );
    }

    fn parsed_named(name: &str, status: TestStatus, docstring: Option<&str>) -> ParsedTest {
        ParsedTest {
            name: name.to_owned(),
            docstring: docstring.map(str::to_owned),
            ..parsed(status, "", None)
        }
    }

    #[test]
    fn report_files() {
        let mut registry = Registry::new("IMP", false, ["fast8"], IndexMap::new());
        registry.add_unit("em", UnitKind::Module);
        registry.add_unit("foxs", UnitKind::Application);

        let file = ReportFile::classify(Utf8Path::new("/logs/fast8/em.example.xml"))
            .expect("is a report");
        assert_eq!(file.kind(), ReportKind::Example);
        assert_eq!(file.unit(&registry), Some(UnitId::new("em", SubKind::Examples)));
        assert_eq!(file.base_unit(&registry), Some(UnitId::base("em")));

        let file = ReportFile::classify(Utf8Path::new("foxs.benchmark.xml")).expect("is a report");
        assert_eq!(file.unit(&registry), None, "applications have no benchmark sub-unit");
        assert_eq!(file.base_unit(&registry), Some(UnitId::base("foxs")));

        assert_eq!(ReportFile::classify(Utf8Path::new("summary.json")), None);
        assert_eq!(ReportFile::classify(Utf8Path::new("em.xml")), None);
    }
}
