//! Flakiness analysis — read-only, side-effect-free classification of
//! test groups from their accumulated outcome history.
//!
//! Seven detectors run over each `(suite, environment)` group in a
//! fixed order; a group is flaky if any hard detector trips, and its
//! score is the maximum any detector proposed. The reported reason
//! comes from the strongest hard detector when one fired, with ties
//! going to the earliest in the order — deterministic for equal
//! inputs.

use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use crate::error::EngineResult;
use crate::models::flakiness::{
    AnalysisSummary, DetectionMethod, FlakinessReport, FlakyTest, PatternAnalysis, TimeRange,
};
use crate::models::test_outcome::{TestOutcome, TestStatus};
use crate::store::Store;

/// Mixed results within a build flag the group past this percentage.
const MIXED_BUILDS_THRESHOLD: f64 = 30.0;
/// Alternation ratio (percent) past which a sequence is intermittent.
const ALTERNATION_THRESHOLD: f64 = 40.0;
/// Minimum runs before sequence-shape detectors apply.
const SEQUENCE_MIN_RUNS: usize = 5;
/// Pass-rate delta between recent and older runs marking instability.
const TREND_THRESHOLD: f64 = 0.3;
/// Builds must be this consistent (fraction) to look healthy.
const BUILD_CONSISTENCY_FLOOR: f64 = 0.7;
/// Distinct builds needed for the consistency detector.
const CONSISTENCY_MIN_BUILDS: usize = 3;

/// Analyze a team's test history for flaky tests.
///
/// Works over a snapshot: builds in the window and their outcomes are
/// fetched once up front, then everything is pure computation.
pub async fn analyze_flakiness(
    store: &dyn Store,
    team_id: Uuid,
    time_range: TimeRange,
    min_runs: usize,
    flakiness_threshold: f64,
) -> EngineResult<FlakinessReport> {
    let since = time_range.start(Utc::now());
    let builds = store.list_builds(team_id, since).await?;
    let build_ids: Vec<i64> = builds.iter().map(|b| b.id).collect();

    // Short commit per build, for grouping runs by build.
    let commit_by_build: HashMap<i64, String> = builds
        .iter()
        .map(|b| (b.id, short(&b.commit_hash).to_string()))
        .collect();

    let outcomes = store.outcomes_for_builds(&build_ids).await?;
    tracing::debug!(
        %team_id,
        builds = builds.len(),
        outcomes = outcomes.len(),
        "Flakiness analysis snapshot"
    );

    // Group by (suite, environment) — one test's history. Outcomes
    // arrive newest first and stay that way within each group.
    let mut groups: HashMap<(String, String), Vec<TestOutcome>> = HashMap::new();
    for outcome in outcomes {
        let key = (outcome.suite.clone(), outcome.environment.clone());
        groups.entry(key).or_default().push(outcome);
    }

    let total_groups = groups.len();
    let mut flaky_tests: Vec<FlakyTest> = Vec::new();

    for ((suite, environment), runs) in groups {
        if runs.len() < min_runs {
            tracing::debug!(suite = %suite, runs = runs.len(), "Group below min_runs, skipped");
            continue;
        }
        if let Some(verdict) = evaluate_group(
            suite,
            environment,
            &runs,
            &commit_by_build,
            flakiness_threshold,
        ) {
            flaky_tests.push(verdict);
        }
    }

    flaky_tests.sort_by(|a, b| {
        b.flakiness_score
            .partial_cmp(&a.flakiness_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.suite.cmp(&b.suite))
    });

    let flagged = flaky_tests.len();
    let average_flakiness_score = if flagged > 0 {
        flaky_tests.iter().map(|t| t.flakiness_score).sum::<f64>() / flagged as f64
    } else {
        0.0
    };
    let flakiness_rate = if total_groups > 0 {
        flagged as f64 / total_groups as f64 * 100.0
    } else {
        0.0
    };

    crate::metrics::analysis_completed(flagged);

    Ok(FlakinessReport {
        summary: AnalysisSummary {
            total_tests: total_groups,
            flaky_tests: flagged,
            flakiness_rate,
            average_flakiness_score,
            time_range: time_range.as_str(),
            min_runs,
            flakiness_threshold,
        },
        flaky_tests,
    })
}

/// One detector's proposal.
struct Candidate {
    method: DetectionMethod,
    score: f64,
    reason: String,
    /// Hard detectors set the flaky verdict on their own; soft ones
    /// only raise the score floor.
    hard: bool,
}

/// Evaluate one test group. Returns a verdict only when the group is
/// flagged flaky or its score beats the threshold.
fn evaluate_group(
    suite: String,
    environment: String,
    runs: &[TestOutcome],
    commit_by_build: &HashMap<i64, String>,
    flakiness_threshold: f64,
) -> Option<FlakyTest> {
    if runs.is_empty() {
        return None;
    }

    let total = runs.len();
    let passed = runs.iter().filter(|r| r.status == TestStatus::Passed).count();
    let failed = runs.iter().filter(|r| r.status == TestStatus::Failed).count();
    let flaky = runs.iter().filter(|r| r.status == TestStatus::Flaky).count();

    let pass_rate = passed as f64 / total as f64;
    let fail_rate = failed as f64 / total as f64;
    let flaky_rate = flaky as f64 / total as f64;

    // Statuses grouped by owning build, insertion-ordered.
    let mut build_statuses: Vec<(&str, Vec<TestStatus>)> = Vec::new();
    for run in runs {
        let key = commit_by_build
            .get(&run.build_id)
            .map(String::as_str)
            .unwrap_or("unknown");
        match build_statuses.iter_mut().find(|(k, _)| *k == key) {
            Some((_, statuses)) => statuses.push(run.status),
            None => build_statuses.push((key, vec![run.status])),
        }
    }
    let distinct_builds = build_statuses.len();

    let mut candidates: Vec<Candidate> = Vec::new();

    // 1. Mixed results within individual builds.
    let mixed_builds = build_statuses
        .iter()
        .filter(|(_, statuses)| {
            statuses.contains(&TestStatus::Passed) && statuses.contains(&TestStatus::Failed)
        })
        .count();
    if mixed_builds > 0 {
        let score = mixed_builds as f64 / distinct_builds as f64 * 100.0;
        if score > MIXED_BUILDS_THRESHOLD {
            candidates.push(Candidate {
                method: DetectionMethod::MixedResultsInBuilds,
                score,
                reason: format!("Mixed results in {mixed_builds} builds"),
                hard: true,
            });
        }
    }

    // 2. Inconsistent pass/fail overall — same code, different result.
    if passed > 0 && failed > 0 {
        let score = pass_rate.min(fail_rate) * 100.0;
        if score > flakiness_threshold * 100.0 {
            candidates.push(Candidate {
                method: DetectionMethod::InconsistentResults,
                score,
                reason: "Inconsistent pass/fail results".to_string(),
                hard: true,
            });
        }
    }

    // 3. Explicit flaky-status runs.
    if flaky > 0 {
        candidates.push(Candidate {
            method: DetectionMethod::ExplicitFlakyStatus,
            score: flaky_rate * 100.0,
            reason: if flaky == total {
                "Consistently flaky".to_string()
            } else {
                "Mixed flaky results".to_string()
            },
            hard: true,
        });
    }

    // 4. Intermittent alternation over the reverse-chronological
    // sequence.
    let statuses: Vec<TestStatus> = runs.iter().map(|r| r.status).collect();
    let mut transitions = 0usize;
    let mut consecutive_failures = 0usize;
    let mut max_consecutive_failures = 0usize;
    for pair in statuses.windows(2) {
        if pair[0] != pair[1] {
            transitions += 1;
        }
    }
    for status in &statuses {
        if *status == TestStatus::Failed {
            consecutive_failures += 1;
            max_consecutive_failures = max_consecutive_failures.max(consecutive_failures);
        } else {
            consecutive_failures = 0;
        }
    }

    let alternating_ratio = if total >= 2 {
        transitions as f64 / (total - 1) as f64
    } else {
        0.0
    };
    let intermittent_score = alternating_ratio * 100.0;
    if intermittent_score > ALTERNATION_THRESHOLD && total >= SEQUENCE_MIN_RUNS {
        candidates.push(Candidate {
            method: DetectionMethod::IntermittentPattern,
            score: intermittent_score,
            reason: "Intermittent failure pattern detected".to_string(),
            hard: true,
        });
    }

    // 5. Low pass rate — raises the score, not the verdict.
    if pass_rate < 0.5 && total >= SEQUENCE_MIN_RUNS {
        candidates.push(Candidate {
            method: DetectionMethod::LowPassRate,
            score: (1.0 - pass_rate) * 100.0,
            reason: "Low pass rate".to_string(),
            hard: false,
        });
    }

    // 6. Unstable trend: most-recent 30% vs the older 70%.
    let recent_len = (total as f64 * 0.3).ceil() as usize;
    let (recent, older) = statuses.split_at(recent_len.min(total));
    let slice_pass_rate = |slice: &[TestStatus]| {
        slice.iter().filter(|s| **s == TestStatus::Passed).count() as f64 / slice.len() as f64
    };
    if !recent.is_empty() && !older.is_empty() {
        let trend_change = (slice_pass_rate(recent) - slice_pass_rate(older)).abs();
        if trend_change > TREND_THRESHOLD {
            candidates.push(Candidate {
                method: DetectionMethod::UnstableTrend,
                score: trend_change * 100.0,
                reason: "Unstable trend".to_string(),
                hard: false,
            });
        }
    }

    // 7. Build-to-build consistency.
    let consistent_builds = build_statuses
        .iter()
        .filter(|(_, statuses)| {
            statuses.windows(2).all(|pair| pair[0] == pair[1])
        })
        .count();
    let build_consistency_rate = consistent_builds as f64 / distinct_builds as f64;
    if build_consistency_rate < BUILD_CONSISTENCY_FLOOR && distinct_builds >= CONSISTENCY_MIN_BUILDS
    {
        candidates.push(Candidate {
            method: DetectionMethod::BuildInconsistency,
            score: (1.0 - build_consistency_rate) * 100.0,
            reason: "Inconsistent across builds".to_string(),
            hard: false,
        });
    }

    let is_flaky = candidates.iter().any(|c| c.hard);
    let max_score = candidates.iter().map(|c| c.score).fold(0.0, f64::max);

    if !is_flaky && max_score <= flakiness_threshold * 100.0 {
        return None;
    }

    // The reported reason comes from the highest-scoring hard
    // detector when the group is flagged, from the highest-scoring
    // detector otherwise. Strict comparison keeps the earliest
    // detector on ties, so the reason is deterministic.
    let mut best: Option<&Candidate> = None;
    for candidate in candidates.iter().filter(|c| c.hard || !is_flaky) {
        if best.map_or(true, |current| candidate.score > current.score) {
            best = Some(candidate);
        }
    }

    Some(FlakyTest {
        suite,
        environment,
        total_runs: total,
        passed_runs: passed,
        failed_runs: failed,
        flaky_runs: flaky,
        pass_rate: pass_rate * 100.0,
        fail_rate: fail_rate * 100.0,
        flaky_rate: flaky_rate * 100.0,
        flakiness_score: max_score.round(),
        is_flaky,
        reason: best.map(|c| c.reason.clone()).unwrap_or_default(),
        detection_methods: candidates.iter().map(|c| c.method).collect(),
        pattern_analysis: PatternAnalysis {
            alternating_transitions: transitions,
            alternating_ratio: alternating_ratio * 100.0,
            max_consecutive_failures,
            build_consistency_rate: build_consistency_rate * 100.0,
            distinct_builds,
        },
        // Runs are newest first.
        first_run: runs[runs.len() - 1].created_at,
        last_run: runs[0].created_at,
    })
}

fn short(sha: &str) -> &str {
    &sha[..8.min(sha.len())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_outcome::NewTestOutcome;

    /// Newest-first sequence of outcomes, one build per run by
    /// default.
    fn runs(statuses: &[TestStatus]) -> (Vec<TestOutcome>, HashMap<i64, String>) {
        let mut outcomes = Vec::new();
        let mut commits = HashMap::new();
        for (i, status) in statuses.iter().enumerate() {
            let build_id = i as i64 + 1;
            outcomes.push(
                NewTestOutcome {
                    suite: "checkout".to_string(),
                    test_type: None,
                    framework: None,
                    status: *status,
                    duration_secs: None,
                    coverage: None,
                    error_message: None,
                    stack_trace: None,
                    environment: "test".to_string(),
                }
                .into_outcome(i as i64 + 1, build_id, Utc::now()),
            );
            commits.insert(build_id, format!("commit{build_id:02}"));
        }
        (outcomes, commits)
    }

    fn evaluate(statuses: &[TestStatus], threshold: f64) -> Option<FlakyTest> {
        let (outcomes, commits) = runs(statuses);
        evaluate_group(
            "checkout".to_string(),
            "test".to_string(),
            &outcomes,
            &commits,
            threshold,
        )
    }

    use TestStatus::{Failed as F, Flaky as X, Passed as P};

    #[test]
    fn all_passed_group_is_not_flagged() {
        assert!(evaluate(&[P, P, P, P, P, P], 0.3).is_none());
    }

    #[test]
    fn strict_alternation_is_flaky_with_high_score() {
        let verdict = evaluate(&[P, F, P, F, P, F], 0.3).unwrap();
        assert!(verdict.is_flaky);
        assert!(verdict.flakiness_score >= 40.0);
        assert!(verdict
            .detection_methods
            .contains(&DetectionMethod::IntermittentPattern));
        assert_eq!(verdict.reason, "Intermittent failure pattern detected");
    }

    #[test]
    fn explicit_flaky_status_flags_unconditionally() {
        let verdict = evaluate(&[P, X, P], 0.99).unwrap();
        assert!(verdict.is_flaky);
        assert!(verdict
            .detection_methods
            .contains(&DetectionMethod::ExplicitFlakyStatus));
        assert_eq!(verdict.reason, "Mixed flaky results");
    }

    #[test]
    fn low_pass_rate_raises_score_without_the_verdict() {
        // Four failures then one old pass: no hard detector trips,
        // but the score floor beats the threshold.
        let verdict = evaluate(&[F, F, F, F, P], 0.3).unwrap();
        assert!(!verdict.is_flaky);
        assert_eq!(verdict.reason, "Low pass rate");
        assert_eq!(verdict.flakiness_score, 80.0);
        assert!(verdict
            .detection_methods
            .contains(&DetectionMethod::LowPassRate));
    }

    #[test]
    fn mixed_results_within_builds_take_the_tie() {
        // Two builds, each with one pass and one fail: mixed-per-build
        // scores 100 and outranks the inconsistency detector.
        let (mut outcomes, mut commits) = runs(&[P, F, P, F]);
        commits.clear();
        for (i, outcome) in outcomes.iter_mut().enumerate() {
            outcome.build_id = if i < 2 { 1 } else { 2 };
        }
        commits.insert(1, "commit01".to_string());
        commits.insert(2, "commit02".to_string());

        let verdict = evaluate_group(
            "checkout".to_string(),
            "test".to_string(),
            &outcomes,
            &commits,
            0.3,
        )
        .unwrap();

        assert!(verdict.is_flaky);
        assert_eq!(verdict.flakiness_score, 100.0);
        assert_eq!(verdict.reason, "Mixed results in 2 builds");
        assert_eq!(verdict.pattern_analysis.distinct_builds, 2);
        // Two distinct builds stay below the consistency detector's
        // three-build floor.
        assert!(!verdict
            .detection_methods
            .contains(&DetectionMethod::BuildInconsistency));
    }

    #[test]
    fn consistent_failures_are_broken_not_flaky() {
        // Always failing: no mixed signal, no alternation. Score
        // rides on the low pass rate alone.
        let verdict = evaluate(&[F, F, F, F, F], 0.3).unwrap();
        assert!(!verdict.is_flaky);
        assert_eq!(verdict.flakiness_score, 100.0);
        assert_eq!(verdict.reason, "Low pass rate");
        assert!(!verdict
            .detection_methods
            .contains(&DetectionMethod::IntermittentPattern));
    }

    #[test]
    fn short_sequences_skip_the_alternation_detector() {
        // Alternating but below the five-run floor.
        let verdict = evaluate(&[P, F, P], 0.3);
        // Inconsistent-results still fires: min(2/3, 1/3) = 33%.
        let verdict = verdict.unwrap();
        assert!(verdict.is_flaky);
        assert!(!verdict
            .detection_methods
            .contains(&DetectionMethod::IntermittentPattern));
        assert!(verdict
            .detection_methods
            .contains(&DetectionMethod::InconsistentResults));
    }

    #[tokio::test]
    async fn analyze_skips_groups_below_min_runs() {
        use crate::models::build::NewBuild;
        use crate::store::{MemoryStore, Store};

        let store = MemoryStore::new();
        let team = Uuid::new_v4();
        let build = store
            .insert_build_if_new(NewBuild {
                team_id: team,
                repo_full_name: "acme/widgets".to_string(),
                version: "abc".to_string(),
                branch: "main".to_string(),
                commit_hash: "abcdef1234".to_string(),
                commit_message: "msg".to_string(),
                author: "dev".to_string(),
                status: "completed".to_string(),
                environment: "production".to_string(),
                workflow_run_id: 1,
            })
            .await
            .unwrap()
            .unwrap();

        store
            .insert_outcomes(
                build.id,
                vec![NewTestOutcome {
                    suite: "solo".to_string(),
                    test_type: None,
                    framework: None,
                    status: TestStatus::Failed,
                    duration_secs: None,
                    coverage: None,
                    error_message: None,
                    stack_trace: None,
                    environment: "test".to_string(),
                }],
            )
            .await
            .unwrap();

        let report = analyze_flakiness(&store, team, TimeRange::AllTime, 3, 0.3)
            .await
            .unwrap();
        assert_eq!(report.summary.total_tests, 1);
        assert_eq!(report.summary.flaky_tests, 0);
        assert!(report.flaky_tests.is_empty());
    }
}
