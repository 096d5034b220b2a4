// Copyright (c) The logtriage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core log-parsing and result-reconciliation engine for logtriage.
//!
//! The engine turns the captured console log of a CI build stage into a
//! [`StageReport`](logtriage_metadata::StageReport): either an
//! infrastructure-level [environment
//! failure](logtriage_metadata::EnvironmentFailure), or reconciled per-test
//! totals with a deduplicated, rerun-aware failure list.
//!
//! The flow is: each chunk of log text (one per parallel execution node) goes
//! through the [`parser`] using the configured [`patterns`], producing an
//! ordered sequence of raw test events; the [`aggregator`] then merges all
//! chunks of a stage and reconciles repeated test identities with
//! last-outcome-wins semantics.
//!
//! Fetching log text, loading configuration files, and rendering reports are
//! collaborators outside this crate; the engine itself performs no I/O.

pub mod aggregator;
pub mod errors;
pub mod events;
pub mod parser;
pub mod patterns;
