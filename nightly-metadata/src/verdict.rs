// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{NightlyExitCode, ParseCodeError};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The overall verdict for one product's nightly build.
///
/// Variants are declared from least to most severe, so the derived `Ord` can be used to combine
/// verdicts across products: the worst one wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildVerdict {
    /// Everything built and every test passed.
    Ok,

    /// Everything built, but some tests, examples or benchmarks failed.
    Test,

    /// Some platforms had not finished when results were collected.
    Incomplete,

    /// The build system itself misbehaved: expected logs were missing or unexpected ones appeared.
    #[serde(rename = "BADLOG")]
    BadLog,

    /// At least one unit failed to build.
    Build,
}

impl BuildVerdict {
    /// All verdicts, least severe first.
    pub const ALL: [BuildVerdict; 5] = [
        Self::Ok,
        Self::Test,
        Self::Incomplete,
        Self::BadLog,
        Self::Build,
    ];

    /// Returns true if this verdict counts as a pass for machine checks.
    pub fn is_pass(self) -> bool {
        matches!(self, Self::Ok | Self::Test)
    }

    /// Returns the process exit code `nightly-check` uses for this verdict.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Ok | Self::Test => NightlyExitCode::OK,
            Self::Incomplete => NightlyExitCode::INCOMPLETE_BUILD,
            Self::BadLog => NightlyExitCode::BAD_LOGS,
            Self::Build => NightlyExitCode::BUILD_FAILED,
        }
    }

    /// Returns the stored code for this verdict.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Test => "TEST",
            Self::Incomplete => "INCOMPLETE",
            Self::BadLog => "BADLOG",
            Self::Build => "BUILD",
        }
    }
}

impl fmt::Display for BuildVerdict {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildVerdict {
    type Err = ParseCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|verdict| verdict.as_str() == s)
            .ok_or_else(|| ParseCodeError::new("build verdict", s))
    }
}
