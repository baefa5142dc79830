// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for [nightly-check](https://crates.io/crates/nightly-check). The `nightly-check`
//! binary is the primary entry point; this crate is exposed so the dashboard and other tools can
//! read the same history records.
//!
//! The flow is one-way: per-platform artifacts are reconciled into a [`matrix::ComponentMatrix`]
//! by [`reconcile`], test reports are parsed by [`report`], everything for one product is driven
//! by [`aggregate`], and the result lands in [`history`].

pub mod aggregate;
pub mod config;
pub mod errors;
mod helpers;
pub mod history;
pub mod matrix;
pub mod outcome;
pub mod platform;
pub mod reconcile;
pub mod registry;
pub mod report;
pub mod revision;

pub use helpers::BuildLayout;
