// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for nightly-check.
//!
//! Configuration is layered: the built-in defaults ([`NightlyConfig::DEFAULT_CONFIG`]) come
//! first, then the repository's `.config/nightly.toml` (or a file passed on the command line),
//! then environment variables prefixed with `NIGHTLY_CONFIG__`.
//!
//! The defaults hold the platform catalog, the catalog of special build steps and the report
//! policy. Products are always defined by the user.

mod imp;
mod product;

pub use imp::*;
pub use product::*;
