// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-day history of build results.
//!
//! Each product's results for one day are stored as a single [`DailyRecord`], a zstd-compressed
//! JSON document. The dashboard reads records back through [`DailyView`].

mod format;
mod query;
mod store;

pub use format::*;
pub use query::*;
pub use store::*;
