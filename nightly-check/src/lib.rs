// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Checks a nightly build directory and records the results.
//!
//! `nightly-check check` reconciles every configured product's per-platform results, prints a
//! failure summary, and writes a history record for the day. The other subcommands read that
//! history back.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::{Color, OutputContext, StderrStyles};
