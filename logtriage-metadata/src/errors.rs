// Copyright (c) The logtriage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::TestOutcome;
use std::{error, fmt};

/// An error that occurs while parsing a [`TestOutcome`] token from a string.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestOutcomeParseError {
    input: String,
}

impl TestOutcomeParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }

    /// Returns the input that failed to parse.
    pub fn input(&self) -> &str {
        &self.input
    }
}

impl fmt::Display for TestOutcomeParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "unrecognized test outcome token: {}\n(known values: {})",
            self.input,
            TestOutcome::variants().join(", "),
        )
    }
}

impl error::Error for TestOutcomeParseError {}
