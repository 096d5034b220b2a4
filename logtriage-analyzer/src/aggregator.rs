// Copyright (c) The logtriage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reducing all chunks of one stage to a single verdict.
//!
//! Aggregation runs only after every chunk of a stage is available, and is
//! deterministic regardless of the order chunk parsing completed in: events
//! are merged in (chunk submission order, line order) and repeated test
//! identities are reconciled with last-outcome-wins semantics. A test that
//! failed and was rerun to a pass counts as passed (and flaky); a test rerun
//! to another failure counts once, with the detail of its last failing
//! attempt.
//!
//! An environment failure in any chunk is fatal to the whole stage: the
//! first one in submission order becomes the verdict and every test event is
//! discarded, since per-test analysis of a broken environment is
//! meaningless.

use crate::{
    events::{ChunkIndex, RawEvent},
    parser::{ChunkOutput, ChunkParser},
    patterns::PatternLibrary,
};
use indexmap::{map::Entry, IndexMap};
use logtriage_metadata::{
    CanonicalTestResult, StageReport, StageSpecifier, StageTotals, StageVerdict, SummaryCounts,
    TestIdentity, TestOutcome, TestRunSummary,
};
use tracing::warn;

/// Every execution attempt observed for one test identity, in merged order.
#[derive(Clone, Debug)]
pub struct AttemptHistory {
    /// This is guaranteed to be non-empty.
    events: Vec<RawEvent>,
}

impl AttemptHistory {
    fn new(event: RawEvent) -> Self {
        Self {
            events: vec![event],
        }
    }

    fn push(&mut self, event: RawEvent) {
        self.events.push(event);
    }

    /// Returns the last attempt.
    ///
    /// This attempt decides the test's final outcome.
    pub fn last(&self) -> &RawEvent {
        self.events.last().expect("attempt history is non-empty")
    }

    /// Returns the number of attempts observed.
    pub fn attempts(&self) -> usize {
        self.events.len()
    }

    /// Iterates over all attempts in merged order.
    pub fn iter(&self) -> impl Iterator<Item = &'_ RawEvent> + DoubleEndedIterator + '_ {
        self.events.iter()
    }

    /// Returns true if the final outcome is a pass preceded by at least one
    /// failing attempt.
    pub fn is_flaky(&self) -> bool {
        self.last().outcome == TestOutcome::Passed
            && self
                .events
                .iter()
                .rev()
                .skip(1)
                .any(|event| event.outcome.is_failure())
    }

    /// Returns a description of self.
    pub fn describe(&self) -> AttemptsDescription {
        match self.last().outcome {
            TestOutcome::Passed if self.is_flaky() => AttemptsDescription::Flaky {
                failing_attempts: self
                    .events
                    .iter()
                    .filter(|event| event.outcome.is_failure())
                    .count(),
            },
            TestOutcome::Passed => AttemptsDescription::Passed,
            TestOutcome::Failed => AttemptsDescription::Failed,
            TestOutcome::Error => AttemptsDescription::Errored,
            TestOutcome::Skipped => AttemptsDescription::Skipped,
        }
    }

    /// Folds the history into the single-per-identity result used for
    /// counting and failure listing.
    pub fn canonical(&self) -> CanonicalTestResult {
        let last = self.last();
        CanonicalTestResult {
            identity: last.identity.clone(),
            outcome: last.outcome,
            detail: last.detail.clone(),
            attempts: self.attempts(),
        }
    }
}

/// A quick classification of an [`AttemptHistory`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AttemptsDescription {
    /// The final outcome is a pass with no earlier failing attempt.
    Passed,

    /// The final outcome is a pass, but earlier attempts failed.
    Flaky {
        /// How many attempts failed before the final pass.
        failing_attempts: usize,
    },

    /// The final outcome is a failed assertion.
    Failed,

    /// The final outcome is an error.
    Errored,

    /// The final outcome is a skip.
    Skipped,
}

/// Reconciles a merged event sequence into per-identity attempt histories.
///
/// The map preserves first-seen identity order, which is the order the
/// failure list is reported in. Reconciling an already-reconciled
/// (one-event-per-identity) sequence yields the same canonical results.
pub fn reconcile(events: impl IntoIterator<Item = RawEvent>) -> IndexMap<TestIdentity, AttemptHistory> {
    let mut histories: IndexMap<TestIdentity, AttemptHistory> = IndexMap::new();
    for event in events {
        match histories.entry(event.identity.clone()) {
            Entry::Occupied(mut occupied) => occupied.get_mut().push(event),
            Entry::Vacant(vacant) => {
                vacant.insert(AttemptHistory::new(event));
            }
        }
    }
    histories
}

/// Reduces the parsed chunks of one stage, in submission order, to a
/// [`StageReport`].
///
/// Chunk submission order is the deterministic tie-break between chunks: it
/// is a caller-controlled input, and events within a chunk already carry
/// strictly increasing line indices, so concatenation yields the documented
/// merge order.
pub fn aggregate(
    specifier: StageSpecifier,
    chunks: impl IntoIterator<Item = ChunkOutput>,
) -> StageReport {
    let mut merged: Vec<RawEvent> = Vec::new();
    let mut summary: Option<SummaryCounts> = None;

    for output in chunks {
        if let Some(failure) = output.environment_failure {
            return StageReport::new(specifier, StageVerdict::EnvironmentFailure(failure));
        }
        merged.extend(output.events);
        if let Some(counts) = output.summary {
            match &mut summary {
                Some(total) => total.accumulate(&counts),
                None => summary = Some(counts),
            }
        }
    }

    let histories = reconcile(merged);

    let mut totals = StageTotals::default();
    let mut failures = Vec::new();
    for history in histories.values() {
        record_reconciled(&mut totals, history);
        if history.last().outcome.is_failure() {
            failures.push(history.canonical());
        }
    }

    if histories.is_empty() {
        // Degraded parse: no per-test result lines anywhere, but the runner
        // printed summary counts. Totals come from those; identities are
        // unknown at that granularity, so the failure list stays empty.
        if let Some(counts) = &summary {
            totals = StageTotals::from_summary(counts);
        }
    } else if let Some(counts) = &summary {
        let summarized = StageTotals::from_summary(counts);
        if summarized.total != totals.total {
            warn!(
                summarized = summarized.total,
                reconciled = totals.total,
                "runner summary disagrees with reconciled totals, trusting per-test results"
            );
        }
    }

    StageReport::new(
        specifier,
        StageVerdict::TestRun(TestRunSummary { totals, failures }),
    )
}

/// Tallies one reconciled test into the stage totals.
///
/// The last attempt decides the counter, not the first failure. Note that
/// this differs from what Maven Surefire does with rerun results; it matches
/// the rerun semantics the failure list is built with.
fn record_reconciled(totals: &mut StageTotals, history: &AttemptHistory) {
    totals.total += 1;
    match history.last().outcome {
        TestOutcome::Passed => {
            totals.passed += 1;
            if history.is_flaky() {
                totals.flaky += 1;
            }
        }
        TestOutcome::Failed => totals.failed += 1,
        TestOutcome::Error => totals.errors += 1,
        TestOutcome::Skipped => totals.skipped += 1,
    }
}

/// The top-level analysis driver for one stage.
///
/// Owns a [`PatternLibrary`] and walks a stage's chunk texts in submission
/// order. Parsing stops at the first chunk with an environment failure —
/// the stage verdict is already decided, so later chunks are not parsed at
/// all.
#[derive(Clone, Debug)]
pub struct StageAnalyzer {
    library: PatternLibrary,
}

impl StageAnalyzer {
    /// Creates an analyzer around a compiled pattern library.
    pub fn new(library: PatternLibrary) -> Self {
        Self { library }
    }

    /// Returns the pattern library in use.
    pub fn library(&self) -> &PatternLibrary {
        &self.library
    }

    /// Analyzes one stage given its ordered chunk texts.
    ///
    /// An empty iterator is valid input meaning "no data" and yields an
    /// all-zero report.
    pub fn analyze<S: AsRef<str>>(
        &self,
        specifier: StageSpecifier,
        chunk_texts: impl IntoIterator<Item = S>,
    ) -> StageReport {
        let parser = ChunkParser::new(&self.library);
        let mut outputs = Vec::new();
        for (index, text) in chunk_texts.into_iter().enumerate() {
            let output = parser.parse(ChunkIndex::new(index), text.as_ref());
            let fatal = output.environment_failure.is_some();
            outputs.push(output);
            if fatal {
                break;
            }
        }
        aggregate(specifier, outputs)
    }
}
