// Copyright (c) The logtriage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parsing one chunk of log text into raw test events.
//!
//! A chunk is one execution node's captured console output. Parsing is a
//! single line-ordered scan with a small amount of state: the detail window
//! of the most recent failing test, or the body of a failure-section block.
//! Unmatched lines are ignored — log text is noisy free text, and
//! best-effort reporting beats hard failure here.
//!
//! Chunk parsing is pure: no shared mutable state, so chunks of one stage
//! may be parsed in any order or in parallel before aggregation.

use crate::{
    events::{ChunkIndex, RawEvent},
    patterns::PatternLibrary,
};
use logtriage_metadata::{EnvironmentFailure, SummaryCounts, TestOutcome};
use regex::Regex;
use smol_str::SmolStr;
use std::sync::LazyLock;
use tracing::debug;

/// A verbose-mode per-test result line: long name followed by an outcome
/// token, with an arbitrary prefix (timestamps etc.) allowed.
static RESULT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\s)(?P<name>\S+\.py::\S+)\s+(?P<outcome>PASSED|FAILED|ERROR|SKIPPED)\b")
        .unwrap()
});

/// A `====`-ruled section line; terminates any detail window or block.
static SECTION_RULE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"={10,}").unwrap());

/// A section line with inner text, e.g. `=== 2 failed, 10 passed in 3.1s ===`.
static SUMMARY_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"={10,}\s+(?P<text>.*?)\s+={10,}").unwrap());

/// One counter inside a summary line.
static SUMMARY_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?P<count>\d+)\s+(?P<key>passed|failed|errors?|skipped)").unwrap());

/// A failure-section block header: `____ test_name ____`.
static BLOCK_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_{5,}\s+(?P<name>test_\S+)\s+_{5,}").unwrap());

/// A traceback error-location line: `path/to/file.py:42: AssertionError`.
static ERROR_LOCATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?P<file>\S+\.py):(?P<line>\d+):\s+(?P<error>.*Error.*)$").unwrap());

/// A `>`-marked failing source line in a traceback.
static CODE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*>\s+(?P<code>\S.*)$").unwrap());

/// Everything one chunk parse produced.
///
/// `environment_failure` and `events` are mutually exclusive: an environment
/// failure abandons test parsing for the chunk.
#[derive(Clone, Debug)]
pub struct ChunkOutput {
    /// The chunk this output was parsed from.
    pub chunk: ChunkIndex,

    /// The environment-failure signal, if one matched the chunk text.
    pub environment_failure: Option<EnvironmentFailure>,

    /// Raw test events, in line order. `seq` is strictly increasing.
    pub events: Vec<RawEvent>,

    /// Counts harvested from runner summary lines, if any were present.
    pub summary: Option<SummaryCounts>,
}

/// Parses chunks of log text against a pattern library.
#[derive(Copy, Clone, Debug)]
pub struct ChunkParser<'lib> {
    library: &'lib PatternLibrary,
}

impl<'lib> ChunkParser<'lib> {
    /// Creates a parser borrowing the given library.
    pub fn new(library: &'lib PatternLibrary) -> Self {
        Self { library }
    }

    /// Parses one chunk's raw text.
    ///
    /// The environment-failure signatures are probed against the whole text
    /// before any test-result scanning; on a match, test parsing for this
    /// chunk is abandoned entirely. A chunk with no recognized lines is not
    /// an error — it yields an empty event sequence.
    pub fn parse(&self, chunk: ChunkIndex, text: &str) -> ChunkOutput {
        // CI console output is frequently ANSI-colored; normalize first so
        // escape sequences can't split a token.
        let text = strip_ansi_escapes::strip_str(text);

        if let Some(failure) = self.library.match_environment_failure(&text) {
            debug!(
                %chunk,
                description = %failure.description,
                "environment failure matched, abandoning test parsing"
            );
            return ChunkOutput {
                chunk,
                environment_failure: Some(failure),
                events: Vec::new(),
                summary: None,
            };
        }

        let mut scan = Scan {
            library: self.library,
            chunk,
            events: Vec::new(),
            summary: None,
            state: ScanState::Idle,
        };
        for (seq, line) in text.lines().enumerate() {
            scan.step(seq, line);
        }
        scan.finish()
    }
}

/// Collects candidate failure details from a window of traceback lines.
///
/// Precedence on extraction: a special-result recognizer hit replaces
/// everything; otherwise the `>`-marked source line beats the rendered error
/// type. Within each category the first hit wins.
#[derive(Default)]
struct DetailSink {
    special: Option<String>,
    code_line: Option<String>,
    error_line: Option<String>,
}

impl DetailSink {
    fn observe(&mut self, library: &PatternLibrary, line: &str) {
        if self.special.is_none() {
            if let Some(hit) = library.match_special_result(line) {
                debug!(recognizer = %hit.name, "special result overrides failure detail");
                self.special = Some(hit.rendered);
                return;
            }
        }
        if self.code_line.is_none() {
            if let Some(caps) = CODE_LINE.captures(line) {
                self.code_line = Some(caps["code"].trim().to_owned());
                return;
            }
        }
        if self.error_line.is_none() {
            if let Some(caps) = ERROR_LOCATION.captures(line) {
                self.error_line = Some(format!("Error: {}", caps["error"].trim()));
            }
        }
    }

    fn has_special(&self) -> bool {
        self.special.is_some()
    }

    fn into_detail(self) -> Option<String> {
        self.special.or(self.code_line).or(self.error_line)
    }
}

/// A failure-section block under a `____ test_name ____` header.
struct FailureBlock {
    name: SmolStr,
    seq: usize,
    sink: DetailSink,
}

/// The detail window following a failing result line.
struct DetailWindow {
    event: usize,
    sink: DetailSink,
}

enum ScanState {
    Idle,
    Capture(DetailWindow),
    Block(FailureBlock),
}

struct Scan<'lib> {
    library: &'lib PatternLibrary,
    chunk: ChunkIndex,
    events: Vec<RawEvent>,
    summary: Option<SummaryCounts>,
    state: ScanState,
}

impl Scan<'_> {
    fn step(&mut self, seq: usize, line: &str) {
        if SECTION_RULE.is_match(line) {
            self.flush();
            if let Some(caps) = SUMMARY_TEXT.captures(line) {
                self.record_summary(&caps["text"]);
            }
            return;
        }

        if let Some(caps) = BLOCK_HEADER.captures(line) {
            self.flush();
            self.state = ScanState::Block(FailureBlock {
                name: SmolStr::new(&caps["name"]),
                seq,
                sink: DetailSink::default(),
            });
            return;
        }

        if let Some(caps) = RESULT_LINE.captures(line) {
            self.flush();
            let name = &caps["name"];
            let outcome: TestOutcome = caps["outcome"]
                .parse()
                .expect("the outcome alternation only admits known tokens");
            self.events.push(RawEvent {
                identity: self.library.extract_identity(name),
                test_name: SmolStr::new(name),
                outcome,
                seq,
                detail: None,
                chunk: self.chunk,
            });
            if outcome.is_failure() {
                self.state = ScanState::Capture(DetailWindow {
                    event: self.events.len() - 1,
                    sink: DetailSink::default(),
                });
            }
            return;
        }

        match &mut self.state {
            ScanState::Idle => {}
            ScanState::Capture(window) => window.sink.observe(self.library, line),
            ScanState::Block(block) => block.sink.observe(self.library, line),
        }
    }

    /// Closes the active detail window or block, if any.
    fn flush(&mut self) {
        match std::mem::replace(&mut self.state, ScanState::Idle) {
            ScanState::Idle => {}
            ScanState::Capture(window) => {
                if let Some(detail) = window.sink.into_detail() {
                    self.events[window.event].detail = Some(detail);
                }
            }
            ScanState::Block(block) => self.flush_block(block),
        }
    }

    /// Resolves a finished failure-section block against the events seen so
    /// far.
    ///
    /// Block headers carry the bare test name while verbose result lines
    /// carry the `file.py::name` form, so matching falls back from identity
    /// equality to long-name suffix. A block with no matching event
    /// synthesizes a failed event at the header line: non-verbose logs
    /// report failures only through these blocks.
    fn flush_block(&mut self, block: FailureBlock) {
        let identity = self.library.extract_identity(&block.name);
        let special = block.sink.has_special();
        let detail = block.sink.into_detail();

        let target = self.events.iter().rposition(|event| {
            event.outcome.is_failure()
                && (event.identity == identity || event.short_name() == block.name.as_str())
        });
        match target {
            Some(index) => {
                // A recognizer hit always wins; plain traceback detail only
                // fills a gap left by the result-line window.
                let event = &mut self.events[index];
                if detail.is_some() && (special || event.detail.is_none()) {
                    event.detail = detail;
                }
            }
            None => {
                self.events.push(RawEvent {
                    identity,
                    test_name: block.name,
                    outcome: TestOutcome::Failed,
                    seq: block.seq,
                    detail,
                    chunk: self.chunk,
                });
            }
        }
    }

    fn record_summary(&mut self, text: &str) {
        let mut counts = SummaryCounts::default();
        let mut any = false;
        for caps in SUMMARY_COUNT.captures_iter(text) {
            let Ok(count) = caps["count"].parse::<usize>() else {
                debug!(token = &caps["count"], "summary count does not fit usize, skipping");
                continue;
            };
            any = true;
            match &caps["key"] {
                "passed" => counts.passed += count,
                "failed" => counts.failed += count,
                "skipped" => counts.skipped += count,
                // "error" or "errors"
                _ => counts.errors += count,
            }
        }
        if any {
            match &mut self.summary {
                Some(summary) => summary.accumulate(&counts),
                None => self.summary = Some(counts),
            }
        }
    }

    fn finish(mut self) -> ChunkOutput {
        self.flush();
        if self.events.is_empty() && self.summary.is_none() {
            debug!(chunk = %self.chunk, "no recognized test output in chunk");
        }
        ChunkOutput {
            chunk: self.chunk,
            environment_failure: None,
            events: self.events,
            summary: self.summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::{EnvironmentFailureEntry, PatternConfig};
    use indoc::indoc;
    use logtriage_metadata::TestIdentity;
    use pretty_assertions::assert_eq;

    fn library() -> PatternLibrary {
        PatternLibrary::new(&PatternConfig::default()).unwrap()
    }

    fn library_with_env() -> PatternLibrary {
        let config = PatternConfig {
            environment_failures: vec![EnvironmentFailureEntry {
                pattern: r"npm ERR!.*".to_owned(),
                description: "Dependency installation failed".to_owned(),
            }],
            ..PatternConfig::default()
        };
        PatternLibrary::new(&config).unwrap()
    }

    fn parse(library: &PatternLibrary, text: &str) -> ChunkOutput {
        ChunkParser::new(library).parse(ChunkIndex::new(0), text)
    }

    #[test]
    fn verbose_result_lines_become_events() {
        let library = library();
        let output = parse(
            &library,
            indoc! {"
                collected 3 items

                tests/test_cart.py::test_tc101_add_item PASSED [ 33%]
                tests/test_cart.py::test_tc102_remove_item FAILED [ 66%]
                tests/test_cart.py::test_checkout_flow SKIPPED [100%]
            "},
        );

        assert!(output.environment_failure.is_none());
        let outcomes: Vec<_> = output
            .events
            .iter()
            .map(|event| (event.identity.as_str().to_owned(), event.outcome))
            .collect();
        assert_eq!(
            outcomes,
            vec![
                ("TC101".to_owned(), TestOutcome::Passed),
                ("TC102".to_owned(), TestOutcome::Failed),
                (
                    "tests/test_cart.py::test_checkout_flow".to_owned(),
                    TestOutcome::Skipped
                ),
            ],
        );

        // seq is strictly increasing within the chunk.
        let seqs: Vec<_> = output.events.iter().map(|event| event.seq).collect();
        assert!(seqs.windows(2).all(|pair| pair[0] < pair[1]), "seqs not increasing: {seqs:?}");
    }

    #[test]
    fn timestamp_prefixes_are_tolerated() {
        let library = library();
        let output = parse(
            &library,
            "[2026-08-06T10:21:33Z] tests/test_auth.py::test_tc7_login PASSED\n",
        );
        assert_eq!(output.events.len(), 1);
        assert_eq!(output.events[0].identity, TestIdentity::new("TC7"));
    }

    #[test]
    fn failing_event_captures_code_line_detail() {
        let library = library();
        let output = parse(
            &library,
            indoc! {"
                tests/test_cart.py::test_tc102_remove_item FAILED
                    def test_tc102_remove_item():
                >       assert cart.remove(item) is True
                E       AssertionError: assert False is True
                tests/test_cart.py:58: AssertionError
                tests/test_cart.py::test_tc103_clear_cart PASSED
            "},
        );

        assert_eq!(
            output.events[0].detail.as_deref(),
            Some("assert cart.remove(item) is True"),
        );
        // The window closed at the next result line.
        assert_eq!(output.events[1].detail, None);
    }

    #[test]
    fn failing_event_falls_back_to_error_location() {
        let library = library();
        let output = parse(
            &library,
            indoc! {"
                tests/test_db.py::test_tc201_connect ERROR
                tests/conftest.py:12: OperationalError
            "},
        );
        assert_eq!(output.events[0].detail.as_deref(), Some("Error: OperationalError"));
    }

    #[test]
    fn special_result_overrides_generic_detail() {
        let library = library();
        let output = parse(
            &library,
            indoc! {"
                tests/test_ui.py::test_tc301_homepage FAILED
                >       eyes.check_window()
                E       Eyes mismatch: https://eyes.applitools.com/app/batches/99
            "},
        );
        assert_eq!(
            output.events[0].detail.as_deref(),
            Some("https://eyes.applitools.com/app/batches/99"),
        );
    }

    #[test]
    fn environment_failure_short_circuits_chunk() {
        let library = library_with_env();
        let output = parse(
            &library,
            indoc! {"
                tests/test_cart.py::test_tc101_add_item PASSED
                npm ERR! code ENETUNREACH
                npm ERR! network request to https://registry.npmjs.org failed
            "},
        );

        let failure = output.environment_failure.expect("signature must match");
        assert_eq!(failure.description, "Dependency installation failed");
        assert_eq!(failure.evidence_line, "npm ERR! code ENETUNREACH");
        assert!(output.events.is_empty(), "test parsing is abandoned");
        assert!(output.summary.is_none());
    }

    #[test]
    fn failure_block_backfills_event_detail() {
        let library = library();
        let output = parse(
            &library,
            indoc! {"
                tests/test_cart.py::test_tc102_remove_item FAILED
                =========================== FAILURES ===========================
                _______________ test_tc102_remove_item ________________
                    def test_tc102_remove_item():
                >       assert cart.remove(item) is True
                E       AssertionError
                ================ 1 failed, 0 passed in 2.11s ================
            "},
        );

        assert_eq!(output.events.len(), 1, "block matched the existing event");
        assert_eq!(
            output.events[0].detail.as_deref(),
            Some("assert cart.remove(item) is True"),
        );
    }

    #[test]
    fn failure_block_synthesizes_event_in_non_verbose_logs() {
        let library = library();
        let output = parse(
            &library,
            indoc! {"
                =========================== FAILURES ===========================
                ________________ test_tc404_missing_page ________________
                tests/test_pages.py:77: AssertionError
                ================ 1 failed in 0.52s ================
            "},
        );

        assert_eq!(output.events.len(), 1);
        let event = &output.events[0];
        assert_eq!(event.identity, TestIdentity::new("TC404"));
        assert_eq!(event.outcome, TestOutcome::Failed);
        assert_eq!(event.detail.as_deref(), Some("Error: AssertionError"));
    }

    #[test]
    fn block_recognizer_beats_window_detail() {
        let library = library();
        let output = parse(
            &library,
            indoc! {"
                tests/test_ui.py::test_tc301_homepage FAILED
                >       assert screenshot_matches()
                =========================== FAILURES ===========================
                _________________ test_tc301_homepage _________________
                E   see https://eyes.applitools.com/app/batches/7 for the diff
            "},
        );

        assert_eq!(output.events.len(), 1);
        assert_eq!(
            output.events[0].detail.as_deref(),
            Some("https://eyes.applitools.com/app/batches/7"),
            "a recognizer hit in the block replaces the window's code line",
        );
    }

    #[test]
    fn summary_counts_are_harvested() {
        let library = library();
        let output = parse(
            &library,
            indoc! {"
                ========================= test session starts =========================
                tests/test_cart.py::test_tc101_add_item PASSED
                ============ 1 failed, 3 passed, 2 skipped, 1 error in 9.41s ============
            "},
        );

        let summary = output.summary.expect("summary line present");
        assert_eq!(
            summary,
            SummaryCounts {
                passed: 3,
                failed: 1,
                errors: 1,
                skipped: 2,
            },
        );
    }

    #[test]
    fn ansi_escapes_are_stripped_before_matching() {
        let library = library();
        let output = parse(
            &library,
            "tests/test_cart.py::test_tc101_add_item \u{1b}[32mPASSED\u{1b}[0m\n",
        );
        assert_eq!(output.events.len(), 1);
        assert_eq!(output.events[0].outcome, TestOutcome::Passed);
    }

    #[test]
    fn unrecognized_text_yields_empty_output() {
        let library = library();
        let output = parse(
            &library,
            "Cloning repository...\nFinished in 3.2s\nNothing to see here.\n",
        );
        assert!(output.events.is_empty());
        assert!(output.summary.is_none());
        assert!(output.environment_failure.is_none());
    }

    #[test]
    fn empty_chunk_is_valid() {
        let library = library();
        let output = parse(&library, "");
        assert!(output.events.is_empty());
    }
}
