// Copyright (c) The logtriage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Raw per-attempt test events, the unit of exchange between the chunk
//! parser and the stage aggregator.

use logtriage_metadata::{TestIdentity, TestOutcome};
use smol_str::SmolStr;
use std::fmt;

/// Identifies one chunk within a stage by its submission order.
///
/// Chunk order is a caller-controlled input: it is the deterministic
/// tie-break when events from several chunks are merged.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ChunkIndex(usize);

impl ChunkIndex {
    /// Creates a chunk index from a zero-based submission position.
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the zero-based submission position.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ChunkIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "chunk {}", self.0)
    }
}

/// One observed execution attempt of one test, in log order.
///
/// Events are immutable once their chunk parse returns, and are consumed by
/// aggregation rather than retained.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawEvent {
    /// The reconciliation key extracted from the test's long name.
    pub identity: TestIdentity,

    /// The test name exactly as it appeared in the log. Failure-section
    /// blocks carry the bare test name rather than the full `file::name`
    /// form, so this is kept alongside the identity for suffix matching.
    pub test_name: SmolStr,

    /// The outcome token reported for this attempt.
    pub outcome: TestOutcome,

    /// Line index within the chunk; strictly increasing per chunk.
    pub seq: usize,

    /// Extracted failure detail, if any. Populated for failing outcomes.
    pub detail: Option<String>,

    /// The chunk this event was parsed from.
    pub chunk: ChunkIndex,
}

impl RawEvent {
    /// Returns the final `::`-separated component of the test name: the bare
    /// test function name.
    pub fn short_name(&self) -> &str {
        self.test_name
            .rsplit("::")
            .next()
            .expect("rsplit always yields at least one element")
    }
}
