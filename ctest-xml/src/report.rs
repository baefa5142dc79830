// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{ReadError, read::read_report};
use indexmap::IndexMap;
use std::{fmt, io};

/// The name of the measurement holding the wall-clock time of a test, in seconds.
pub const EXECUTION_TIME: &str = "Execution Time";

/// The name of the measurement holding the exit code, or a description of how the test ended.
pub const EXIT_CODE: &str = "Exit Code";

/// The name of the measurement holding the test's docstring.
pub const DOCSTRING: &str = "docstring";

/// The name of the measurement holding structured unittest failure detail.
pub const UNITTEST_DETAIL: &str = "Python unittest detail";

/// The root of a CTest XML report: every `<Test>` element that carried a `Status`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TestReport {
    /// The tests in this report, in document order.
    pub tests: Vec<Test>,
}

impl TestReport {
    /// Reads a report from the given reader.
    ///
    /// The whole document is read before anything is returned. Malformed XML, an unknown test
    /// status, or a measurement with an unknown encoding or compression fails the entire read.
    pub fn parse(reader: impl io::BufRead) -> Result<Self, ReadError> {
        read_report(reader)
    }

    /// Reads a report from a string.
    pub fn parse_str(s: &str) -> Result<Self, ReadError> {
        Self::parse(s.as_bytes())
    }
}

/// The raw status reported for a test.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TestStatus {
    /// `Status="passed"`.
    Passed,

    /// `Status="failed"`.
    Failed,

    /// `Status="notrun"`.
    NotRun,
}

impl TestStatus {
    /// Parses the value of a `Status` attribute.
    pub fn from_attr(value: &str) -> Option<Self> {
        match value {
            "passed" => Some(Self::Passed),
            "failed" => Some(Self::Failed),
            "notrun" => Some(Self::NotRun),
            _ => None,
        }
    }

    /// Returns the attribute value for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::NotRun => "notrun",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `<Test>` element.
#[derive(Clone, Debug, PartialEq)]
pub struct Test {
    /// The raw status of the test.
    pub status: TestStatus,

    /// The contents of the `<Name>` element, if one was present.
    pub name: Option<String>,

    /// Sub-case results, in document order.
    pub test_cases: Vec<TestCase>,

    /// Decoded `<NamedMeasurement>` values, keyed by measurement name.
    ///
    /// A measurement with several `<Value>` elements has their contents concatenated.
    pub measurements: IndexMap<String, String>,

    /// Decoded contents of the `<Measurement>` element, i.e. the captured output.
    pub output: String,
}

impl Test {
    /// Creates a new `Test` with the given status and no other data.
    pub fn new(status: TestStatus) -> Self {
        Self {
            status,
            name: None,
            test_cases: Vec::new(),
            measurements: IndexMap::new(),
            output: String::new(),
        }
    }

    /// Returns the named measurement, if present.
    pub fn measurement(&self, name: &str) -> Option<&str> {
        self.measurements.get(name).map(|s| s.as_str())
    }

    /// Returns the raw `Execution Time` measurement.
    pub fn execution_time(&self) -> Option<&str> {
        self.measurement(EXECUTION_TIME)
    }

    /// Returns the `Exit Code` measurement.
    pub fn exit_code(&self) -> Option<&str> {
        self.measurement(EXIT_CODE)
    }

    /// Returns the `docstring` measurement.
    pub fn docstring(&self) -> Option<&str> {
        self.measurement(DOCSTRING)
    }

    /// Returns the `Python unittest detail` measurement.
    pub fn detail(&self) -> Option<&str> {
        self.measurement(UNITTEST_DETAIL)
    }

    /// Returns true if any sub-case has the given state.
    pub fn has_case_state(&self, state: &str) -> bool {
        self.test_cases.iter().any(|case| case.state == state)
    }
}

/// A sub-case inside a test, from a `<TestCase name=".." state=".."/>` element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestCase {
    /// The name of the sub-case.
    pub name: String,

    /// The state of the sub-case, for example `SKIP` or `EXPFAIL`.
    pub state: String,
}

impl TestCase {
    /// Creates a new sub-case.
    pub fn new(name: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: state.into(),
        }
    }
}
