// Copyright (c) The logtriage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by the analysis engine.
//!
//! Noisy or unexpected log content is never an error: unmatched lines are
//! ignored and an empty stage is a valid "no tests found" result. The only
//! fatal condition is structurally invalid configuration, raised while
//! building a [`PatternLibrary`](crate::patterns::PatternLibrary).

use std::fmt;
use thiserror::Error;

/// An error that occurred while compiling a configured pattern.
///
/// Construction of a pattern library is all-or-nothing: the first entry that
/// fails to compile aborts it, and the error names the offending entry.
#[derive(Debug, Error)]
#[error("failed to compile {kind} pattern `{entry}`")]
pub struct PatternError {
    kind: PatternKind,
    entry: String,
    #[source]
    err: regex::Error,
}

impl PatternError {
    pub(crate) fn new(kind: PatternKind, entry: impl Into<String>, err: regex::Error) -> Self {
        Self {
            kind,
            entry: entry.into(),
            err,
        }
    }

    /// Returns the role of the entry that failed to compile.
    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    /// Returns the name (or description) of the entry that failed to compile.
    pub fn entry(&self) -> &str {
        &self.entry
    }
}

/// The role a configured pattern plays in the library.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PatternKind {
    /// The test-case identity extraction pattern.
    TestIdentity,

    /// A special-result recognizer entry.
    SpecialResult,

    /// An environment-failure signature entry.
    EnvironmentFailure,
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let role = match self {
            PatternKind::TestIdentity => "test-identity",
            PatternKind::SpecialResult => "special-result",
            PatternKind::EnvironmentFailure => "environment-failure",
        };
        write!(f, "{role}")
    }
}
