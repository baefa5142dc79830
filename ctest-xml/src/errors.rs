// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::io;
use thiserror::Error;

/// An error that occurs while reading a [`TestReport`](crate::TestReport).
///
/// Any error aborts the whole document: a report that fails to decode is never partially
/// returned.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReadError {
    /// The document is not well-formed XML.
    #[error("error reading test report XML")]
    Xml(#[from] quick_xml::Error),

    /// A `<Test>` element had a `Status` attribute that is not known.
    #[error("unknown test status `{status}`")]
    UnknownStatus {
        /// The status that was found.
        status: String,
    },

    /// A `<TestCase>` element was missing a required attribute.
    #[error("<TestCase> element is missing the `{attr}` attribute")]
    MissingTestCaseAttribute {
        /// The attribute that was missing.
        attr: &'static str,
    },

    /// A `<Value>` element used an encoding this reader does not understand.
    #[error("unknown measurement encoding `{encoding}`")]
    UnknownEncoding {
        /// The encoding that was found.
        encoding: String,
    },

    /// A `<Value>` element used a compression this reader does not understand.
    #[error("unknown measurement compression `{compression}`")]
    UnknownCompression {
        /// The compression that was found.
        compression: String,
    },

    /// A base64-encoded value could not be decoded.
    #[error("invalid base64 in measurement value")]
    Base64(#[source] base64::DecodeError),

    /// A compressed value could not be inflated.
    #[error("failed to decompress measurement value")]
    Decompress(#[source] io::Error),
}
