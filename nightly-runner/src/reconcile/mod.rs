// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turning raw per-platform build artifacts into matrix outcomes.
//!
//! Structured platforms write a summary document with one raw result per unit and build type;
//! direct-log platforms write one flat log with a marker line per unit. Both feed the same
//! [`ComponentMatrix`](crate::matrix::ComponentMatrix) through its update rule.

mod direct_log;
mod structured;

pub use direct_log::*;
pub use structured::*;
