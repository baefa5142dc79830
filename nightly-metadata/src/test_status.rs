// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::ParseCodeError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The final status of one test file on one platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestStatus {
    /// The test passed.
    Ok,

    /// The test failed.
    Fail,

    /// The test passed, but at least one sub-case was skipped.
    Skip,

    /// The test passed, and at least one sub-case was an expected failure.
    Expfail,

    /// The test passed with both skipped and expected-failure sub-cases.
    SkipExpfail,

    /// The test was killed after running too long.
    Timeout,

    /// The test crashed.
    Segfault,
}

impl TestStatus {
    /// The statuses that count as passing, for coloring and for day-over-day deltas.
    pub const OK_LIKE: [TestStatus; 4] = [Self::Ok, Self::Skip, Self::Expfail, Self::SkipExpfail];

    /// All statuses, in declaration order.
    pub const ALL: [TestStatus; 7] = [
        Self::Ok,
        Self::Fail,
        Self::Skip,
        Self::Expfail,
        Self::SkipExpfail,
        Self::Timeout,
        Self::Segfault,
    ];

    /// Returns true if this status is in the OK-like set.
    pub fn is_ok_like(self) -> bool {
        Self::OK_LIKE.contains(&self)
    }

    /// Returns the stored code for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Fail => "FAIL",
            Self::Skip => "SKIP",
            Self::Expfail => "EXPFAIL",
            Self::SkipExpfail => "SKIP_EXPFAIL",
            Self::Timeout => "TIMEOUT",
            Self::Segfault => "SEGFAULT",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestStatus {
    type Err = ParseCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseCodeError::new("test status", s))
    }
}

/// A day-over-day change in a test's pass/fail classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestDelta {
    /// The test was OK-like on the previous build and is not now.
    Newfail,

    /// The test was not OK-like on the previous build and is now.
    Newok,
}

impl TestDelta {
    /// Computes the delta between the previous build's status, if any, and the current one.
    pub fn between(previous: Option<TestStatus>, current: TestStatus) -> Option<Self> {
        let previous = previous?;
        match (previous.is_ok_like(), current.is_ok_like()) {
            (true, false) => Some(Self::Newfail),
            (false, true) => Some(Self::Newok),
            _ => None,
        }
    }

    /// Returns the stored code for this delta.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Newfail => "NEWFAIL",
            Self::Newok => "NEWOK",
        }
    }
}

impl fmt::Display for TestDelta {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
