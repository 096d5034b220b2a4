// Copyright (c) The logtriage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-stage report model.
//!
//! A [`StageReport`] is the final verdict for one monitored `(job, build,
//! stage)` target: either an [`EnvironmentFailure`] that made test-level
//! analysis meaningless, or a [`TestRunSummary`] with reconciled totals and a
//! deduplicated failure list. Reports serialize to snake_case JSON for
//! consumption by rendering tools.

use crate::TestOutcomeParseError;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{fmt, str::FromStr};

/// The reconciliation key for a test across multiple execution attempts.
///
/// An identity is either the normalized test-case id token extracted from a
/// test's long name (e.g. `TC123` out of `test_tc123_checkout_flow`), or the
/// full long name if no token was found. Two events with equal identity refer
/// to the same logical test across reruns and across log chunks.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestIdentity(SmolStr);

impl TestIdentity {
    /// Creates a new identity from a string.
    pub fn new(identity: impl AsRef<str>) -> Self {
        Self(SmolStr::new(identity))
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for TestIdentity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TestIdentity {
    fn from(identity: &str) -> Self {
        Self::new(identity)
    }
}

/// The outcome of a single test execution attempt, as reported by the runner.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestOutcome {
    /// The attempt passed.
    Passed,
    /// The attempt failed an assertion.
    Failed,
    /// The attempt errored outside the test body (e.g. a fixture error).
    Error,
    /// The attempt was skipped.
    Skipped,
}

impl TestOutcome {
    /// Returns true if this outcome counts as a failure for reporting
    /// purposes (failed or errored).
    pub fn is_failure(self) -> bool {
        matches!(self, TestOutcome::Failed | TestOutcome::Error)
    }

    /// Returns the canonical runner tokens for all outcomes.
    pub fn variants() -> &'static [&'static str] {
        &["PASSED", "FAILED", "ERROR", "SKIPPED"]
    }
}

impl FromStr for TestOutcome {
    type Err = TestOutcomeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PASSED" => Ok(TestOutcome::Passed),
            "FAILED" => Ok(TestOutcome::Failed),
            "ERROR" => Ok(TestOutcome::Error),
            "SKIPPED" => Ok(TestOutcome::Skipped),
            other => Err(TestOutcomeParseError::new(other)),
        }
    }
}

impl fmt::Display for TestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let token = match self {
            TestOutcome::Passed => "PASSED",
            TestOutcome::Failed => "FAILED",
            TestOutcome::Error => "ERROR",
            TestOutcome::Skipped => "SKIPPED",
        };
        write!(f, "{token}")
    }
}

/// The reconciled, single-per-identity outcome of one logical test.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CanonicalTestResult {
    /// The test's identity.
    pub identity: TestIdentity,

    /// The final outcome, taken from the last execution attempt.
    pub outcome: TestOutcome,

    /// Extracted failure detail: an assertion-style source line, a rendered
    /// error type, or a recognized special result such as a visual-diff URL.
    /// Only meaningful for failing outcomes; `None` when nothing usable was
    /// found in the log.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// How many raw execution attempts were folded into this result. Greater
    /// than 1 means the test was rerun.
    pub attempts: usize,
}

/// Reconciled per-outcome counters for one stage.
///
/// `flaky` counts tests whose final outcome is passed but which needed more
/// than one attempt; it is a subset of `passed` and does not participate in
/// the `total` arithmetic.
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StageTotals {
    /// The total number of distinct tests counted.
    pub total: usize,

    /// The number of tests whose final outcome was passed. Includes `flaky`.
    pub passed: usize,

    /// The number of tests that passed only after at least one failing
    /// attempt.
    pub flaky: usize,

    /// The number of tests whose final outcome was failed.
    pub failed: usize,

    /// The number of tests whose final outcome was an error.
    pub errors: usize,

    /// The number of tests whose final outcome was skipped.
    pub skipped: usize,
}

impl StageTotals {
    /// Checks the counter invariant: `total` must equal the sum of the four
    /// per-outcome counters.
    pub fn is_consistent(&self) -> bool {
        self.total == self.passed + self.failed + self.errors + self.skipped
    }

    /// Returns true if the stage is considered a success: no failed and no
    /// errored tests.
    pub fn is_success(&self) -> bool {
        !self.any_failed()
    }

    /// Returns true if any tests failed or errored.
    #[inline]
    pub fn any_failed(&self) -> bool {
        self.failed > 0 || self.errors > 0
    }

    /// Builds totals from runner summary-line counts alone, for stages where
    /// no per-test result lines were recognized.
    pub fn from_summary(counts: &SummaryCounts) -> Self {
        Self {
            total: counts.total(),
            passed: counts.passed,
            flaky: 0,
            failed: counts.failed,
            errors: counts.errors,
            skipped: counts.skipped,
        }
    }
}

/// Counts harvested from a runner's terminal summary lines
/// (`=== 2 failed, 10 passed in 12.34s ===`), before any per-test
/// reconciliation.
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SummaryCounts {
    /// Passed count as printed by the runner.
    pub passed: usize,
    /// Failed count as printed by the runner.
    pub failed: usize,
    /// Error count as printed by the runner.
    pub errors: usize,
    /// Skipped count as printed by the runner.
    pub skipped: usize,
}

impl SummaryCounts {
    /// The sum of all counters.
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.errors + self.skipped
    }

    /// Adds another set of summary counts into this one. Used when several
    /// chunks of one stage each printed their own summary.
    pub fn accumulate(&mut self, other: &SummaryCounts) {
        self.passed += other.passed;
        self.failed += other.failed;
        self.errors += other.errors;
        self.skipped += other.skipped;
    }
}

/// An infrastructure-level failure that invalidates test-level analysis for
/// its stage: dependency installation, networking, runner startup and
/// similar.
///
/// This is a first-class result variant, not an error. A stage with an
/// environment failure has no test counts at all.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentFailure {
    /// Human-readable description from the matching configured pattern.
    pub description: String,

    /// The first line of the log text that matched the pattern.
    pub evidence_line: String,
}

/// Reconciled test-level results for one stage.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TestRunSummary {
    /// Per-outcome counters.
    pub totals: StageTotals,

    /// Reconciled failing tests, in first-seen identity order. Empty when
    /// the stage is clean.
    pub failures: Vec<CanonicalTestResult>,
}

/// The verdict for one stage: exactly one of an environment failure or a
/// test-run summary.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StageVerdict {
    /// The stage failed at the infrastructure level; test analysis was
    /// skipped.
    EnvironmentFailure(EnvironmentFailure),

    /// The stage was analyzed at the test level.
    TestRun(TestRunSummary),
}

/// Identifies one monitored analysis target.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StageSpecifier {
    /// The CI job name.
    pub job_name: String,

    /// The build identifier within the job.
    pub build_id: String,

    /// The stage within the build, or `None` to cover the whole build log.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<String>,
}

impl StageSpecifier {
    /// Creates a specifier for one stage of a build.
    pub fn new(
        job_name: impl Into<String>,
        build_id: impl Into<String>,
        stage_id: Option<String>,
    ) -> Self {
        Self {
            job_name: job_name.into(),
            build_id: build_id.into(),
            stage_id,
        }
    }
}

impl fmt::Display for StageSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "job {} | build {} | stage ", self.job_name, self.build_id)?;
        match &self.stage_id {
            Some(stage_id) => write!(f, "{stage_id}"),
            None => write!(f, "full log"),
        }
    }
}

/// The final report for one analysis target, consumed by the rendering
/// layer.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    /// The target this report describes.
    pub specifier: StageSpecifier,

    /// The stage verdict.
    pub verdict: StageVerdict,
}

impl StageReport {
    /// Creates a new report.
    pub fn new(specifier: StageSpecifier, verdict: StageVerdict) -> Self {
        Self { specifier, verdict }
    }

    /// Returns the environment failure, if that is the verdict.
    pub fn environment_failure(&self) -> Option<&EnvironmentFailure> {
        match &self.verdict {
            StageVerdict::EnvironmentFailure(failure) => Some(failure),
            StageVerdict::TestRun(_) => None,
        }
    }

    /// Returns the test-run summary, if that is the verdict.
    pub fn test_run(&self) -> Option<&TestRunSummary> {
        match &self.verdict {
            StageVerdict::EnvironmentFailure(_) => None,
            StageVerdict::TestRun(summary) => Some(summary),
        }
    }
}
