// Copyright (c) The logtriage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Structured, machine-readable stage reports produced by
//! [logtriage](https://crates.io/crates/logtriage-analyzer).
//!
//! This crate carries the data model shared between the analysis engine and
//! downstream consumers such as report renderers and dashboards. Everything
//! here is plain data: construction, read access, and serde. The analysis
//! itself lives in `logtriage-analyzer`.

mod errors;
mod reports;

pub use errors::*;
pub use reports::*;
