// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{error, fmt};

/// An error that occurs while parsing one of the stored codes in this crate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseCodeError {
    kind: &'static str,
    input: String,
}

impl ParseCodeError {
    pub(crate) fn new(kind: &'static str, input: impl Into<String>) -> Self {
        Self {
            kind,
            input: input.into(),
        }
    }

    /// Returns the input that failed to parse.
    pub fn input(&self) -> &str {
        &self.input
    }
}

impl fmt::Display for ParseCodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "unrecognized {}: `{}`", self.kind, self.input)
    }
}

impl error::Error for ParseCodeError {}
