//! Pattern tables for log-based evidence extraction.
//!
//! Every heuristic cascade is an ordered table evaluated
//! first-match-wins; the order is part of the contract and is what
//! the tests pin down.

use regex::Regex;
use std::sync::LazyLock;

// ── Summary counts ──

/// How to read the capture groups of a summary-line pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryKind {
    /// `(failed, total)` — passed derived.
    FailedTotal,
    /// `(passed, total)` — failed derived.
    PassedTotal,
    /// `(failed, passed, total)`.
    FailedPassedTotal,
    /// `(passed, failed, total)`.
    PassedFailedTotal,
    /// `(passing, failing)` — total derived.
    PassingFailing,
    /// `(failing, passing)` — total derived.
    FailingPassing,
    /// `(failed, passed)` — total derived.
    FailedPassed,
    /// `(passed, failed)` — total derived.
    PassedFailed,
    /// `Failed: N` — needs a `Passed: M` companion elsewhere.
    FailedCounter,
    /// `Passed: N` — needs a `Failed: M` companion elsewhere.
    PassedCounter,
}

pub struct SummaryPattern {
    pub regex: Regex,
    pub kind: SummaryKind,
}

/// Ordered cascade of test-summary line shapes. Jest-style two-count
/// lines first, three-count lines next, Mocha and explicit counters
/// last.
pub static SUMMARY_PATTERNS: LazyLock<Vec<SummaryPattern>> = LazyLock::new(|| {
    use SummaryKind::*;
    let table: &[(&str, SummaryKind)] = &[
        (r"Test Suites:\s+(\d+) failed, (\d+) total", FailedTotal),
        (r"Tests:\s+(\d+) failed, (\d+) total", FailedTotal),
        (r"Test Suites:\s+(\d+) passed, (\d+) total", PassedTotal),
        (r"Tests:\s+(\d+) passed, (\d+) total", PassedTotal),
        (
            r"Tests:\s+(\d+) failed, (\d+) passed, (\d+) total",
            FailedPassedTotal,
        ),
        (
            r"Tests:\s+(\d+) passed, (\d+) failed, (\d+) total",
            PassedFailedTotal,
        ),
        (r"(\d+) failed, (\d+) passed, (\d+) total", FailedPassedTotal),
        (r"(\d+) passed, (\d+) failed, (\d+) total", PassedFailedTotal),
        (r"(?s)(\d+)\s+passing.*?(\d+)\s+failing", PassingFailing),
        (r"(?s)(\d+)\s+failing.*?(\d+)\s+passing", FailingPassing),
        (r"Failed:\s+(\d+)", FailedCounter),
        (r"Passed:\s+(\d+)", PassedCounter),
        (r"Test Results:\s+(\d+) failed, (\d+) passed", FailedPassed),
        (r"Test Results:\s+(\d+) passed, (\d+) failed", PassedFailed),
    ];
    table
        .iter()
        .map(|(pattern, kind)| SummaryPattern {
            regex: Regex::new(pattern).unwrap(),
            kind: *kind,
        })
        .collect()
});

/// Companion lookups for the split `Failed:`/`Passed:` counter pair.
pub static FAILED_COUNTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Failed:\s+(\d+)").unwrap());
pub static PASSED_COUNTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Passed:\s+(\d+)").unwrap());

// ── Failure indicators (last-resort counting) ──

/// Tokens counted across the whole log when no summary line matched.
pub static FAILURE_INDICATORS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)FAILED",
        r"✗",
        r"❌",
        r"(?i)Error:",
        r"(?i)Exception:",
        r"(?i)AssertionError:",
        r"(?i)Test failed:",
        r"expect\(.+\)\.toBe\(.+\)",
        r"expect\(.+\)\.toEqual\(.+\)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

// ── Framework / test-type classification ──

pub struct FrameworkSignature {
    pub regex: Regex,
    pub name: &'static str,
    pub test_type: &'static str,
}

/// Framework signature table — first match wins, so the more
/// distinctive names sit above the short generic ones.
pub static FRAMEWORK_SIGNATURES: LazyLock<Vec<FrameworkSignature>> = LazyLock::new(|| {
    let table: &[(&str, &str, &str)] = &[
        (r"(?i)jest", "Jest", "unit"),
        (r"(?i)mocha", "Mocha", "unit"),
        (r"(?i)jasmine", "Jasmine", "unit"),
        (r"(?i)vitest", "Vitest", "unit"),
        (r"(?i)cypress", "Cypress", "e2e"),
        (r"(?i)playwright", "Playwright", "e2e"),
        (r"(?i)selenium", "Selenium", "e2e"),
        (r"(?i)puppeteer", "Puppeteer", "e2e"),
        (r"(?i)pytest", "PyTest", "unit"),
        (r"(?i)unittest", "UnitTest", "unit"),
        (r"(?i)nose", "Nose", "unit"),
        (r"(?i)rspec", "RSpec", "unit"),
        (r"(?i)minitest", "Minitest", "unit"),
        (r"(?i)junit", "JUnit", "unit"),
        (r"(?i)testng", "TestNG", "unit"),
        (r"(?i)spock", "Spock", "unit"),
        (r"(?i)go test", "Go Test", "unit"),
        (r"(?i)ginkgo", "Ginkgo", "unit"),
        (r"(?i)gtest", "Google Test", "unit"),
        (r"(?i)catch2", "Catch2", "unit"),
        (r"(?i)boost\.test", "Boost.Test", "unit"),
        (r"(?i)xunit", "xUnit", "unit"),
        (r"(?i)nunit", "NUnit", "unit"),
        (r"(?i)mstest", "MSTest", "unit"),
        (r"(?i)phpunit", "PHPUnit", "unit"),
        (r"(?i)codeception", "Codeception", "unit"),
        (r"(?i)karma", "Karma", "unit"),
        (r"(?i)ava", "Ava", "unit"),
        (r"(?i)tap", "TAP", "unit"),
        (r"(?i)tape", "Tape", "unit"),
        (r"(?i)uvu", "UVU", "unit"),
        (r"(?i)node:test", "Node.js Test", "unit"),
        (r"(?i)deno test", "Deno Test", "unit"),
        (r"(?i)bun test", "Bun Test", "unit"),
    ];
    table
        .iter()
        .map(|(pattern, name, test_type)| FrameworkSignature {
            regex: Regex::new(pattern).unwrap(),
            name,
            test_type,
        })
        .collect()
});

/// Generic test-type table, consulted when no framework matched.
pub static TEST_TYPE_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    let table: &[(&str, &str)] = &[
        (r"(?i)unit test", "unit"),
        (r"(?i)integration test", "integration"),
        (r"(?i)e2e test|end-to-end test", "e2e"),
        (r"(?i)functional test", "functional"),
        (r"(?i)performance test|load test|stress test", "performance"),
        (r"(?i)security test|penetration test", "security"),
        (r"(?i)accessibility test|a11y test", "accessibility"),
        (r"(?i)visual test|screenshot test", "visual"),
        (r"(?i)api test|rest test", "api"),
        (r"(?i)contract test", "contract"),
        (r"(?i)smoke test", "smoke"),
        (r"(?i)regression test", "regression"),
        (r"(?i)acceptance test", "acceptance"),
        (r"(?i)bdd test|behavior test", "bdd"),
        (r"(?i)tdd test", "tdd"),
    ];
    table
        .iter()
        .map(|(pattern, test_type)| (Regex::new(pattern).unwrap(), *test_type))
        .collect()
});

/// Classify framework (and its default test type) from free text.
pub fn classify_framework(text: &str) -> Option<(&'static str, &'static str)> {
    FRAMEWORK_SIGNATURES
        .iter()
        .find(|sig| sig.regex.is_match(text))
        .map(|sig| (sig.name, sig.test_type))
}

/// Classify a generic test type from free text.
pub fn classify_test_type(text: &str) -> Option<&'static str> {
    TEST_TYPE_PATTERNS
        .iter()
        .find(|(regex, _)| regex.is_match(text))
        .map(|(_, test_type)| *test_type)
}

/// Environment bucket inferred from a job or workflow name.
pub fn infer_environment(name: &str) -> &'static str {
    let name = name.to_lowercase();
    if name.contains("test") || name.contains("unit") || name.contains("integration") {
        "test"
    } else if name.contains("build") || name.contains("compile") {
        "build"
    } else if name.contains("deploy") || name.contains("production") {
        "production"
    } else if name.contains("staging") {
        "staging"
    } else if name.contains("dev") {
        "development"
    } else {
        "default"
    }
}

// ── Error details ──

/// Error-detail shapes. The whole table is scanned and the longest
/// match wins, so multi-line expected/received blocks beat the
/// single-line generic matches.
pub static ERROR_DETAIL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"expect\(received\)\.toBe\(expected\)",
        r"Expected:\s*[^\n]+",
        r"Received:\s*[^\n]+",
        r"at Object\.\w+ \([^:)]+:\d+:\d+\)",
        r"(?i)Error:\s*[^\n]+",
        r"(?i)Exception:\s*[^\n]+",
        r"(?i)AssertionError:\s*[^\n]+",
        r"(?i)Test failed:\s*[^\n]+",
        r"(?i)FAILED\s*[^\n]+",
        r"✗\s*[^\n]+",
        r"❌\s*[^\n]+",
        r"expect\(.+\)\.toBe\(.+\)",
        r"expect\(.+\)\.toEqual\(.+\)",
        r"(?i)failed\s+with\s+error:\s*[^\n]+",
        r"(?i)test\s+.*\s+failed:\s*[^\n]+",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Jest assertion block: header plus its Expected/Received lines.
pub static EXPECT_RECEIVED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)expect\(received\)\.toBe\(expected\).*?Expected:\s*([^\n]+).*?Received:\s*([^\n]+)")
        .unwrap()
});

// ── Stack traces ──

/// Stack-trace shapes, framework-specific frames before generic ones.
/// For the first shape that matches, the longest match is kept.
pub static STACK_TRACE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Jest: at Object.toBe (tests/math.test.js:19:19)
        r"(?:at Object\.\w+ \([^)]+:\d+:\d+\)\s*\n?)+",
        // Generic JavaScript frames
        r"(?:at\s+[^\s(]+\s*\([^)]*\)\s*\n?)+",
        // Python tracebacks
        r#"(?:File\s+"[^"]+",\s+line\s+\d+,\s+in\s+\w+\s*\n?)+"#,
        // Java frames
        r"(?:at\s+[\w.]+\.\w+\([^)]*\)\s*\n?)+",
        // Generic "in frame(...)" shapes
        r"(?:in\s+[\w.]+\([^)]*\)\s*\n?)+",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Jest source-context block with the `>` failure marker line.
pub static JEST_CONTEXT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+\s+\|[^\n]*\n\s*\d+\s+\|[^\n]*\n\s*>\s*\d+\s+\|[^\n]+").unwrap()
});

/// Per-file failure marker used to refine the suite name.
pub static FAIL_SUITE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"FAIL\s+(\S+)").unwrap());

/// Jest failed-test marker used to refine the suite name.
pub static FAILED_TEST_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"✕\s+([^\n]+)").unwrap());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framework_cascade_order_is_first_match_wins() {
        // "jest" sits above "junit" in the table.
        assert_eq!(classify_framework("jest run with junit output"), Some(("Jest", "unit")));
        assert_eq!(classify_framework("Running cypress 12.0"), Some(("Cypress", "e2e")));
        assert_eq!(classify_framework("nothing to see"), None);
    }

    #[test]
    fn test_type_cascade_matches_generic_labels() {
        assert_eq!(classify_test_type("running integration tests"), Some("integration"));
        assert_eq!(classify_test_type("load test suite"), Some("performance"));
        assert_eq!(classify_test_type("hello"), None);
    }

    #[test]
    fn environment_buckets() {
        assert_eq!(infer_environment("Unit Tests"), "test");
        assert_eq!(infer_environment("Build & Compile"), "build");
        assert_eq!(infer_environment("Deploy to production"), "production");
        assert_eq!(infer_environment("staging rollout"), "staging");
        assert_eq!(infer_environment("dev sandbox"), "development");
        assert_eq!(infer_environment("lint"), "default");
    }

    #[test]
    fn summary_cascade_prefers_two_count_jest_lines() {
        let log = "Tests:       1 failed, 2 total";
        let hit = SUMMARY_PATTERNS
            .iter()
            .find(|p| p.regex.is_match(log))
            .unwrap();
        assert_eq!(hit.kind, SummaryKind::FailedTotal);
    }

    #[test]
    fn three_count_line_skips_two_count_patterns() {
        // "2 failed, 3 passed, 5 total" must not be read as
        // "failed/total" by an earlier two-count pattern.
        let log = "Tests:       2 failed, 3 passed, 5 total";
        let hit = SUMMARY_PATTERNS
            .iter()
            .find(|p| p.regex.is_match(log))
            .unwrap();
        assert_eq!(hit.kind, SummaryKind::FailedPassedTotal);
    }

    #[test]
    fn mocha_counts_match_across_lines() {
        let log = "  5 passing (40ms)\n  2 failing\n";
        let hit = SUMMARY_PATTERNS
            .iter()
            .find(|p| p.regex.is_match(log))
            .unwrap();
        assert_eq!(hit.kind, SummaryKind::PassingFailing);
    }
}
