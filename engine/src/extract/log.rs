//! Log-heuristic extraction — the fallback when no structured report
//! is available.
//!
//! Counts come from an ordered summary-pattern cascade, with
//! failure-indicator token counting as the last resort. The failed
//! summary outcome carries the most detailed error text and stack
//! trace the cascades can find.

use crate::extract::patterns::{
    classify_framework, classify_test_type, infer_environment, SummaryKind,
    ERROR_DETAIL_PATTERNS, EXPECT_RECEIVED_BLOCK, FAILED_COUNTER, FAILED_TEST_NAME, FAILURE_INDICATORS,
    FAIL_SUITE, JEST_CONTEXT_BLOCK, PASSED_COUNTER, STACK_TRACE_PATTERNS, SUMMARY_PATTERNS,
};
use crate::extract::Extraction;
use crate::models::test_outcome::{NewTestOutcome, TestStatus};

/// Counts recovered from a job log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogCounts {
    pub failed: u32,
    pub passed: u32,
    pub total: u32,
}

/// Extract outcome candidates from one job's raw log text.
pub fn outcomes_from_job_log(
    job_name: &str,
    job_conclusion: Option<&str>,
    log_text: &str,
) -> Extraction {
    let environment = infer_environment(job_name);
    let suite = suite_name(job_name, log_text);
    let (framework, test_type) = classify(job_name, log_text);

    let counts = summary_counts(log_text).or_else(|| indicator_counts(log_text));

    tracing::debug!(
        job = job_name,
        suite = %suite,
        environment,
        found = counts.is_some(),
        "Parsed job log"
    );

    let mut outcomes = Vec::new();

    match counts {
        Some(counts) => {
            if counts.passed > 0 {
                outcomes.push(NewTestOutcome {
                    suite: suite.clone(),
                    test_type: test_type.map(str::to_string),
                    framework: framework.map(str::to_string),
                    status: TestStatus::Passed,
                    duration_secs: None,
                    coverage: None,
                    error_message: None,
                    stack_trace: None,
                    environment: environment.to_string(),
                });
            }
            if counts.failed > 0 {
                outcomes.push(NewTestOutcome {
                    suite,
                    test_type: test_type.map(str::to_string),
                    framework: framework.map(str::to_string),
                    status: TestStatus::Failed,
                    duration_secs: None,
                    coverage: None,
                    error_message: Some(error_details(log_text)),
                    stack_trace: stack_trace(log_text),
                    environment: environment.to_string(),
                });
            }
        }
        None => {
            // No counts anywhere. A failed or cancelled job still
            // leaves one failed record so the build is not silently
            // green.
            if matches!(job_conclusion, Some("failure") | Some("cancelled")) {
                outcomes.push(NewTestOutcome {
                    suite,
                    test_type: test_type.map(str::to_string),
                    framework: framework.map(str::to_string),
                    status: TestStatus::Failed,
                    duration_secs: None,
                    coverage: None,
                    error_message: Some(
                        "Job failed - no structured test results found in logs".to_string(),
                    ),
                    stack_trace: None,
                    environment: environment.to_string(),
                });
            }
        }
    }

    Extraction {
        outcomes,
        confident: false,
    }
}

/// Run the summary-pattern cascade over the log; first pattern whose
/// counts resolve wins. The unknown third count is always derived.
pub fn summary_counts(log_text: &str) -> Option<LogCounts> {
    for pattern in SUMMARY_PATTERNS.iter() {
        let Some(caps) = pattern.regex.captures(log_text) else {
            continue;
        };
        let group = |i: usize| -> u32 {
            caps.get(i)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0)
        };

        let counts = match pattern.kind {
            SummaryKind::FailedTotal => {
                let (failed, total) = (group(1), group(2));
                LogCounts {
                    failed,
                    passed: total.saturating_sub(failed),
                    total,
                }
            }
            SummaryKind::PassedTotal => {
                let (passed, total) = (group(1), group(2));
                LogCounts {
                    failed: total.saturating_sub(passed),
                    passed,
                    total,
                }
            }
            SummaryKind::FailedPassedTotal => LogCounts {
                failed: group(1),
                passed: group(2),
                total: group(3),
            },
            SummaryKind::PassedFailedTotal => LogCounts {
                failed: group(2),
                passed: group(1),
                total: group(3),
            },
            SummaryKind::PassingFailing => LogCounts {
                passed: group(1),
                failed: group(2),
                total: group(1) + group(2),
            },
            SummaryKind::FailingPassing => LogCounts {
                failed: group(1),
                passed: group(2),
                total: group(1) + group(2),
            },
            SummaryKind::FailedPassed => LogCounts {
                failed: group(1),
                passed: group(2),
                total: group(1) + group(2),
            },
            SummaryKind::PassedFailed => LogCounts {
                passed: group(1),
                failed: group(2),
                total: group(1) + group(2),
            },
            // The split counters only resolve as a pair; a lone half
            // falls through to the rest of the cascade.
            SummaryKind::FailedCounter => {
                let failed = group(1);
                match PASSED_COUNTER
                    .captures(log_text)
                    .and_then(|c| c[1].parse::<u32>().ok())
                {
                    Some(passed) => LogCounts {
                        failed,
                        passed,
                        total: failed + passed,
                    },
                    None => continue,
                }
            }
            SummaryKind::PassedCounter => {
                let passed = group(1);
                match FAILED_COUNTER
                    .captures(log_text)
                    .and_then(|c| c[1].parse::<u32>().ok())
                {
                    Some(failed) => LogCounts {
                        failed,
                        passed,
                        total: failed + passed,
                    },
                    None => continue,
                }
            }
        };
        return Some(counts);
    }
    None
}

/// Last resort: count failure-indicator tokens across the whole log
/// and report them as failed = total.
fn indicator_counts(log_text: &str) -> Option<LogCounts> {
    let count: usize = FAILURE_INDICATORS
        .iter()
        .map(|regex| regex.find_iter(log_text).count())
        .sum();
    if count == 0 {
        return None;
    }
    Some(LogCounts {
        failed: count as u32,
        passed: 0,
        total: count as u32,
    })
}

/// Suite name: sanitized job name, overridden by a `FAIL <path>`
/// marker (extension stripped) or, failing that, the first Jest
/// failed-test name.
fn suite_name(job_name: &str, log_text: &str) -> String {
    let sanitized: String = job_name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();
    let sanitized = sanitized.trim().to_string();
    let mut suite = if sanitized.is_empty() {
        "unknown".to_string()
    } else {
        sanitized
    };

    if let Some(caps) = FAIL_SUITE.captures(log_text) {
        let path = caps[1]
            .trim_end_matches(".test.js")
            .trim_end_matches(".spec.js");
        suite = path.to_string();
    } else if let Some(caps) = FAILED_TEST_NAME.captures(log_text) {
        suite = caps[1].trim().to_string();
    }

    suite
}

/// Framework and test type, log text first, then the job name.
fn classify(
    job_name: &str,
    log_text: &str,
) -> (Option<&'static str>, Option<&'static str>) {
    let mut framework = None;
    let mut test_type = None;

    if let Some((name, fw_type)) = classify_framework(log_text) {
        framework = Some(name);
        test_type = Some(fw_type);
    } else if let Some(generic) = classify_test_type(log_text) {
        test_type = Some(generic);
    }

    if framework.is_none() {
        if let Some((name, fw_type)) = classify_framework(job_name) {
            framework = Some(name);
            test_type = Some(fw_type);
        }
    }
    if test_type.is_none() {
        test_type = classify_test_type(job_name);
    }

    (framework, test_type)
}

/// Most detailed error text in the log: longest match across the
/// detail cascade, with the multi-line Expected/Received block taking
/// precedence when present.
fn error_details(log_text: &str) -> String {
    let mut best: Option<&str> = None;
    for regex in ERROR_DETAIL_PATTERNS.iter() {
        if let Some(found) = regex.find(log_text) {
            if best.map_or(true, |current| found.as_str().len() > current.len()) {
                best = Some(found.as_str());
            }
        }
    }

    if let Some(caps) = EXPECT_RECEIVED_BLOCK.captures(log_text) {
        return format!(
            "expect(received).toBe(expected)\nExpected: {}\nReceived: {}",
            caps[1].trim(),
            caps[2].trim()
        );
    }

    best.map(|text| text.trim().to_string())
        .unwrap_or_else(|| "Failed tests detected in logs".to_string())
}

/// Stack trace: first shape in the cascade that matches wins, keeping
/// its longest match; then the Jest source-context block; then the
/// lines surrounding the first error marker.
fn stack_trace(log_text: &str) -> Option<String> {
    for regex in STACK_TRACE_PATTERNS.iter() {
        let longest = regex
            .find_iter(log_text)
            .max_by_key(|m| m.as_str().len());
        if let Some(found) = longest {
            return Some(found.as_str().trim().to_string());
        }
    }

    if let Some(found) = JEST_CONTEXT_BLOCK.find(log_text) {
        return Some(found.as_str().to_string());
    }

    error_context(log_text)
}

/// Non-empty lines around the first error/exception marker.
fn error_context(log_text: &str) -> Option<String> {
    let lines: Vec<&str> = log_text.lines().collect();
    let index = lines.iter().position(|line| {
        line.contains("Error:") || line.contains("Exception:") || line.contains("FAILED")
    })?;

    let start = index.saturating_sub(2);
    let end = (index + 3).min(lines.len().saturating_sub(1));
    let context: Vec<&str> = lines[start..=end]
        .iter()
        .filter(|line| !line.trim().is_empty())
        .copied()
        .collect();

    if context.is_empty() {
        None
    } else {
        Some(context.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jest_three_count_summary_emits_one_passed_and_one_failed() {
        let log = "Tests:       2 failed, 3 passed, 5 total\nTime: 4s";
        let extraction = outcomes_from_job_log("Unit Tests", Some("failure"), log);

        assert!(!extraction.confident);
        assert_eq!(extraction.outcomes.len(), 2);
        assert_eq!(extraction.outcomes[0].status, TestStatus::Passed);
        assert_eq!(extraction.outcomes[1].status, TestStatus::Failed);
        assert_eq!(extraction.outcomes[0].environment, "test");
    }

    #[test]
    fn passed_only_summary_emits_a_single_outcome() {
        let log = "Tests:       3 passed, 3 total";
        let extraction = outcomes_from_job_log("Unit Tests", Some("success"), log);
        assert_eq!(extraction.outcomes.len(), 1);
        assert_eq!(extraction.outcomes[0].status, TestStatus::Passed);
    }

    #[test]
    fn derived_count_fills_the_missing_third() {
        let counts = summary_counts("Tests:  1 failed, 4 total").unwrap();
        assert_eq!(
            counts,
            LogCounts {
                failed: 1,
                passed: 3,
                total: 4
            }
        );
    }

    #[test]
    fn split_counters_resolve_as_a_pair() {
        let counts = summary_counts("Failed: 2\nPassed: 8").unwrap();
        assert_eq!(
            counts,
            LogCounts {
                failed: 2,
                passed: 8,
                total: 10
            }
        );
    }

    #[test]
    fn mocha_summary_is_understood() {
        let counts = summary_counts("  7 passing (2s)\n  1 failing").unwrap();
        assert_eq!(
            counts,
            LogCounts {
                failed: 1,
                passed: 7,
                total: 8
            }
        );
    }

    #[test]
    fn indicator_counting_kicks_in_without_a_summary() {
        let log = "something went wrong\nAssertionError: nope\nError: bad state";
        let extraction = outcomes_from_job_log("CI", Some("failure"), log);
        assert_eq!(extraction.outcomes.len(), 1);
        assert_eq!(extraction.outcomes[0].status, TestStatus::Failed);
        // The error detail cascade still runs for the failed record.
        assert!(extraction.outcomes[0]
            .error_message
            .as_deref()
            .unwrap()
            .contains("AssertionError"));
    }

    #[test]
    fn failed_job_without_any_signal_gets_the_fallback_record() {
        let extraction = outcomes_from_job_log("Deploy", Some("failure"), "uploading...");
        assert_eq!(extraction.outcomes.len(), 1);
        assert_eq!(
            extraction.outcomes[0].error_message.as_deref(),
            Some("Job failed - no structured test results found in logs")
        );
        assert_eq!(extraction.outcomes[0].environment, "production");
    }

    #[test]
    fn successful_job_without_signal_yields_nothing() {
        let extraction = outcomes_from_job_log("Deploy", Some("success"), "uploading...");
        assert!(extraction.outcomes.is_empty());
    }

    #[test]
    fn fail_marker_overrides_the_suite_name() {
        let log = "FAIL tests/auth.test.js\nTests: 1 failed, 1 total";
        let extraction = outcomes_from_job_log("Unit Tests", Some("failure"), log);
        assert_eq!(extraction.outcomes[0].suite, "tests/auth");
    }

    #[test]
    fn jest_failed_test_name_refines_an_unknown_suite() {
        let log = "✕ renders the login form\nTests: 1 failed, 1 total";
        let extraction = outcomes_from_job_log("!!!", Some("failure"), log);
        assert_eq!(extraction.outcomes[0].suite, "renders the login form");
    }

    #[test]
    fn expected_received_block_beats_single_line_matches() {
        let log = "Error: generic one-liner\n\
                   expect(received).toBe(expected)\n\n\
                   Expected: 42\n\
                   Received: 41\n\
                   Tests: 1 failed, 1 total";
        let details = error_details(log);
        assert_eq!(
            details,
            "expect(received).toBe(expected)\nExpected: 42\nReceived: 41"
        );
    }

    #[test]
    fn jest_frames_are_extracted_as_the_stack_trace() {
        let log = "expect failed\n\
                   at Object.toBe (tests/math.test.js:19:19)\n\
                   at Object.run (tests/math.test.js:4:3)\n";
        let stack = stack_trace(log).unwrap();
        assert!(stack.starts_with("at Object.toBe"));
        assert!(stack.contains("tests/math.test.js:4:3"));
    }

    #[test]
    fn error_context_is_the_last_resort() {
        let log = "step one\nstep two\nError: kaboom\ndetail a\ndetail b";
        let stack = stack_trace(log).unwrap();
        assert!(stack.contains("Error: kaboom"));
        assert!(stack.contains("step one"));
        assert!(stack.contains("detail b"));
    }

    #[test]
    fn framework_from_log_sets_the_default_test_type() {
        let log = "PASS with jest 29\nTests: 1 passed, 1 total";
        let extraction = outcomes_from_job_log("CI", Some("success"), log);
        assert_eq!(extraction.outcomes[0].framework.as_deref(), Some("Jest"));
        assert_eq!(extraction.outcomes[0].test_type.as_deref(), Some("unit"));
    }
}
