// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, StderrStyles};
use chrono::NaiveDate;
use nightly_metadata::NightlyExitCode;
use nightly_runner::errors::{CheckError, ConfigParseError, HistoryStoreError};
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// The #[error()] strings are placeholders: errors are meant to be printed with
// display_to_stderr, which colorizes them.

/// An error that nightly-check expects to be able to report.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("unknown product")]
    UnknownProduct { product: String },
    #[error("product check failed")]
    CheckFailed {
        #[from]
        err: CheckError,
    },
    #[error("history store error")]
    HistoryStoreError {
        #[from]
        err: HistoryStoreError,
    },
    #[error("no history")]
    NoHistory { branch: String, date: NaiveDate },
    #[error("error writing output")]
    WriteOutput {
        #[source]
        err: std::io::Error,
    },
}

impl ExpectedError {
    pub(crate) fn write_output(err: std::io::Error) -> Self {
        Self::WriteOutput { err }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::ConfigParseError { .. }
            | Self::UnknownProduct { .. }
            | Self::CheckFailed { .. } => NightlyExitCode::SETUP_ERROR,
            Self::HistoryStoreError { .. } => NightlyExitCode::HISTORY_STORE_ERROR,
            Self::NoHistory { .. } => NightlyExitCode::NO_HISTORY,
            Self::WriteOutput { .. } => NightlyExitCode::WRITE_OUTPUT_ERROR,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match self {
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse nightly config at `{}`",
                    err.config_file().style(styles.bold)
                );
                Some(err.kind() as &dyn Error)
            }
            Self::UnknownProduct { product } => {
                error!("product `{}` is not configured", product.style(styles.bold));
                None
            }
            Self::CheckFailed { err } => {
                error!("{err}");
                err.source()
            }
            Self::HistoryStoreError { err } => {
                error!("{err}");
                err.source()
            }
            Self::NoHistory { branch, date } => {
                error!(
                    "no history recorded for branch `{}` on {}",
                    branch.style(styles.bold),
                    date.style(styles.bold)
                );
                None
            }
            Self::WriteOutput { err } => {
                error!("error writing output");
                Some(err as &dyn Error)
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
