// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

mod check;
mod fixtures;
mod idempotence;
mod store;
