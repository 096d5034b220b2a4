// Copyright (c) The logtriage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The configured matching rules driving the parser.
//!
//! A [`PatternLibrary`] is built once from a [`PatternConfig`] supplied by
//! the (out-of-scope) configuration loader, and is immutable afterwards: it
//! can be shared freely across parallel chunk parses. All configured
//! patterns compile case-insensitively.

use crate::errors::{PatternError, PatternKind};
use logtriage_metadata::{EnvironmentFailure, TestIdentity};
use regex::{Regex, RegexBuilder};
use serde::Deserialize;

/// Externally supplied pattern configuration.
///
/// This is the input contract with the configuration loader: entries arrive
/// already deserialized (typically from JSON), and malformed *structure* is
/// rejected by serde before this crate ever sees it. Pattern *compilation*
/// failures are reported by [`PatternLibrary::new`].
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct PatternConfig {
    /// Pattern extracting a test-case id token from a test's long name.
    /// The first capture group (or the whole match, if there are no groups)
    /// is the token.
    #[serde(default = "default_identity_pattern")]
    pub test_identity_pattern: String,

    /// Ordered special-result recognizers. The first matching entry
    /// overrides the generic failure detail of a failing test.
    #[serde(default = "default_special_results")]
    pub special_results: Vec<SpecialResultEntry>,

    /// Ordered environment-failure signatures. Earlier entries take
    /// priority; the first match decides the stage verdict.
    #[serde(default)]
    pub environment_failures: Vec<EnvironmentFailureEntry>,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            test_identity_pattern: default_identity_pattern(),
            special_results: default_special_results(),
            environment_failures: Vec::new(),
        }
    }
}

fn default_identity_pattern() -> String {
    r"(tc[-_]?\d+)".to_owned()
}

fn default_special_results() -> Vec<SpecialResultEntry> {
    vec![SpecialResultEntry {
        name: "visual-diff-url".to_owned(),
        pattern: r"(https?://\S+\.applitools\.com\S+)".to_owned(),
    }]
}

/// One special-result recognizer entry.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct SpecialResultEntry {
    /// Short name identifying the recognizer, used in diagnostics.
    pub name: String,

    /// The pattern to search for in a failure's surrounding text. The first
    /// capture group (or the whole match) becomes the failure detail.
    pub pattern: String,
}

/// One environment-failure signature entry.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct EnvironmentFailureEntry {
    /// The pattern to search for in the whole chunk text.
    pub pattern: String,

    /// Human-readable description reported as the failure reason.
    pub description: String,
}

/// A frozen set of compiled matchers.
#[derive(Clone, Debug)]
pub struct PatternLibrary {
    test_identity: Regex,
    special_results: Vec<CompiledSpecialResult>,
    environment_failures: Vec<CompiledEnvironmentFailure>,
}

#[derive(Clone, Debug)]
struct CompiledSpecialResult {
    name: String,
    regex: Regex,
}

#[derive(Clone, Debug)]
struct CompiledEnvironmentFailure {
    description: String,
    regex: Regex,
}

/// A special-result hit: the recognizer that fired and the text it rendered.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SpecialResultMatch {
    /// Name of the recognizer entry that matched.
    pub name: String,

    /// The rendered detail: capture group 1 of the match if the pattern has
    /// one, the whole match otherwise.
    pub rendered: String,
}

impl PatternLibrary {
    /// Compiles a configuration into a library.
    ///
    /// Fails on the first entry whose pattern does not compile, naming that
    /// entry.
    pub fn new(config: &PatternConfig) -> Result<Self, PatternError> {
        let test_identity = compile(
            &config.test_identity_pattern,
            PatternKind::TestIdentity,
            &config.test_identity_pattern,
        )?;

        let special_results = config
            .special_results
            .iter()
            .map(|entry| {
                let regex = compile(&entry.pattern, PatternKind::SpecialResult, &entry.name)?;
                Ok(CompiledSpecialResult {
                    name: entry.name.clone(),
                    regex,
                })
            })
            .collect::<Result<Vec<_>, PatternError>>()?;

        let environment_failures = config
            .environment_failures
            .iter()
            .map(|entry| {
                let regex = compile(
                    &entry.pattern,
                    PatternKind::EnvironmentFailure,
                    &entry.description,
                )?;
                Ok(CompiledEnvironmentFailure {
                    description: entry.description.clone(),
                    regex,
                })
            })
            .collect::<Result<Vec<_>, PatternError>>()?;

        Ok(Self {
            test_identity,
            special_results,
            environment_failures,
        })
    }

    /// Extracts the reconciliation identity from a test's long name.
    ///
    /// The matched token is uppercased to a canonical case; if the identity
    /// pattern does not match, the full name is the identity verbatim.
    pub fn extract_identity(&self, test_name: &str) -> TestIdentity {
        match self.test_identity.captures(test_name) {
            Some(caps) => {
                let token = caps
                    .get(1)
                    .unwrap_or_else(|| caps.get(0).expect("group 0 is the whole match"));
                TestIdentity::new(token.as_str().to_uppercase())
            }
            None => TestIdentity::new(test_name),
        }
    }

    /// Probes the special-result recognizers against `text`, in declaration
    /// order. The first matching entry wins.
    pub fn match_special_result(&self, text: &str) -> Option<SpecialResultMatch> {
        self.special_results.iter().find_map(|entry| {
            entry.regex.captures(text).map(|caps| {
                let rendered = caps
                    .get(1)
                    .unwrap_or_else(|| caps.get(0).expect("group 0 is the whole match"));
                SpecialResultMatch {
                    name: entry.name.clone(),
                    rendered: rendered.as_str().to_owned(),
                }
            })
        })
    }

    /// Probes the environment-failure signatures against the whole chunk
    /// text, in declaration order. Earlier entries take priority by
    /// contract, so the first match decides.
    ///
    /// The evidence line is the first line of the matched text.
    pub fn match_environment_failure(&self, text: &str) -> Option<EnvironmentFailure> {
        self.environment_failures.iter().find_map(|entry| {
            entry.regex.find(text).map(|m| {
                let evidence_line = m
                    .as_str()
                    .lines()
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_owned();
                EnvironmentFailure {
                    description: entry.description.clone(),
                    evidence_line,
                }
            })
        })
    }
}

fn compile(pattern: &str, kind: PatternKind, entry: &str) -> Result<Regex, PatternError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|err| PatternError::new(kind, entry, err))
}
