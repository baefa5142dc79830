// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by nightly-runner.
//!
//! Most problems with individual build artifacts are logged as warnings and skipped. The errors
//! here are the ones that stop a whole document, product or command.

use crate::history::FormatVersion;
use camino::Utf8PathBuf;
use chrono::NaiveDate;
use config::ConfigError;
use std::io;
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse nightly config at `{config_file}`")]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a config.
///
/// Returned by [`ConfigParseError::kind`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),

    /// A product's platform lists are inconsistent.
    #[error("product `{product}`: {message}")]
    InvalidProduct {
        /// The product.
        product: String,

        /// What is wrong with it.
        message: String,
    },

    /// The direct-log section pattern is not a valid regex.
    #[error("invalid direct-log section pattern")]
    InvalidSectionPattern(#[source] Box<regex::Error>),

    /// The direct-log section pattern lacks a required capture group.
    #[error("direct-log section pattern has no `{group}` capture group")]
    SectionPatternMissingGroup {
        /// The missing group.
        group: &'static str,
    },
}

/// An error that occurred while reading a component list file.
#[derive(Debug, Error)]
#[error("error reading component list at `{path}`")]
pub struct RegistryLoadError {
    path: Utf8PathBuf,
    #[source]
    error: io::Error,
}

impl RegistryLoadError {
    pub(crate) fn new(path: impl Into<Utf8PathBuf>, error: io::Error) -> Self {
        Self {
            path: path.into(),
            error,
        }
    }
}

/// An error that occurred while reading a version stamp.
#[derive(Debug, Error)]
#[error("error reading version stamp at `{path}`")]
pub struct RevisionReadError {
    path: Utf8PathBuf,
    #[source]
    error: io::Error,
}

impl RevisionReadError {
    pub(crate) fn new(path: impl Into<Utf8PathBuf>, error: io::Error) -> Self {
        Self {
            path: path.into(),
            error,
        }
    }
}

/// An error that occurred while reading a test report.
#[derive(Debug, Error)]
#[error("error reading test report at `{path}`")]
pub struct ReportReadError {
    path: Utf8PathBuf,
    #[source]
    kind: ReportReadErrorKind,
}

impl ReportReadError {
    pub(crate) fn new(path: impl Into<Utf8PathBuf>, kind: ReportReadErrorKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Returns the path of the report.
    pub fn path(&self) -> &Utf8PathBuf {
        &self.path
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ReportReadErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while reading a test report.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReportReadErrorKind {
    /// The file could not be opened.
    #[error("error opening file")]
    Io(#[source] io::Error),

    /// The document could not be parsed.
    #[error(transparent)]
    Parse(ctest_xml::ReadError),
}

/// An error that occurred while reading from or writing to the history store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HistoryStoreError {
    /// A record could not be read.
    #[error("error reading history record at `{path}`")]
    Read {
        /// The record path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// A record could not be deserialized.
    #[error("error deserializing history record at `{path}`")]
    Deserialize {
        /// The record path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },

    /// A record was written by a newer version of nightly-check.
    #[error(
        "history record at `{path}` has format version {found}, \
         but this version of nightly-check supports up to {supported}"
    )]
    UnsupportedFormatVersion {
        /// The record path.
        path: Utf8PathBuf,

        /// The version in the record.
        found: FormatVersion,

        /// The newest supported version.
        supported: FormatVersion,
    },

    /// A record could not be written.
    #[error("error writing history record at `{path}`")]
    Write {
        /// The record path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: atomicwrites::Error<io::Error>,
    },

    /// A directory could not be created.
    #[error("error creating history directory `{path}`")]
    CreateDir {
        /// The directory.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The stored dates for a branch could not be listed.
    #[error("error listing history dates in `{path}`")]
    ListDates {
        /// The branch directory.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// A record for the day being appended to was written for a different product.
    #[error("cannot append to record for {date}: stored product is `{stored}`, not `{product}`")]
    ProductMismatch {
        /// The date.
        date: NaiveDate,

        /// The product in the stored record.
        stored: String,

        /// The product being appended.
        product: String,
    },
}

/// An error that stopped checking one product.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CheckError {
    /// The component list could not be read.
    #[error("error loading components for product `{product}`")]
    Registry {
        /// The product.
        product: String,

        /// The underlying error.
        #[source]
        error: RegistryLoadError,
    },

    /// The product's version stamp could not be read.
    #[error("error reading revision for product `{product}`")]
    Revision {
        /// The product.
        product: String,

        /// The underlying error.
        #[source]
        error: RevisionReadError,
    },

    /// A build directory could not be listed.
    #[error("error listing directory `{path}`")]
    ListDir {
        /// The directory.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },
}
