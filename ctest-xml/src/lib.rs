// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read CTest-style XML test reports in Rust.
//!
//! A report is a sequence of `<Test Status="...">` elements. Each one carries a name, optional
//! sub-case results, named measurements (timing, exit code, docstring, unittest detail) and the
//! captured output. Measurement payloads may be base64-encoded and zlib-compressed.

#![warn(missing_docs)]

mod errors;
mod read;
mod report;

pub use errors::*;
pub use report::*;
