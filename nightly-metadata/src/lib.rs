// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structured access to nightly build history records.
//!
//! These types are stored in the history written by `nightly-check` and read back by the
//! dashboard, so their serialized forms are stable.

#![warn(missing_docs)]

mod errors;
mod exit_codes;
mod test_status;
mod verdict;

pub use errors::*;
pub use exit_codes::*;
pub use test_status::*;
pub use verdict::*;
