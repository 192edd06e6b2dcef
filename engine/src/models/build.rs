//! Build — one CI execution attempt for a specific commit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::test_outcome::{TestOutcome, TestStatus};

/// A synchronized CI execution. The external `workflow_run_id` is the
/// dedupe key: one build per upstream run, ever.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Build {
    pub id: i64,
    pub team_id: Uuid,
    pub repo_full_name: String,
    pub version: String,
    pub branch: String,
    pub commit_hash: String,
    pub commit_message: String,
    pub author: String,
    pub status: String,
    pub environment: String,
    /// Upstream workflow run identifier. 64-bit end-to-end.
    pub workflow_run_id: i64,
    pub total_tests: u32,
    pub passed_tests: u32,
    pub failed_tests: u32,
    pub flaky_tests: u32,
    /// Mean coverage over outcomes that carry one. `None` means no
    /// outcome reported coverage, which is distinct from measured 0.
    pub coverage: Option<f64>,
    pub release_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewBuild {
    pub team_id: Uuid,
    pub repo_full_name: String,
    pub version: String,
    pub branch: String,
    pub commit_hash: String,
    pub commit_message: String,
    pub author: String,
    pub status: String,
    pub environment: String,
    pub workflow_run_id: i64,
}

/// Rollup counters recomputed from a build's current outcomes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildStats {
    pub total_tests: u32,
    pub passed_tests: u32,
    pub failed_tests: u32,
    pub flaky_tests: u32,
    pub coverage: Option<f64>,
}

impl BuildStats {
    pub fn from_outcomes(outcomes: &[TestOutcome]) -> Self {
        let total_tests = outcomes.len() as u32;
        let passed_tests = outcomes
            .iter()
            .filter(|o| o.status == TestStatus::Passed)
            .count() as u32;
        let failed_tests = outcomes
            .iter()
            .filter(|o| o.status == TestStatus::Failed)
            .count() as u32;
        let flaky_tests = outcomes
            .iter()
            .filter(|o| o.status == TestStatus::Flaky)
            .count() as u32;

        let covered: Vec<f64> = outcomes.iter().filter_map(|o| o.coverage).collect();
        let coverage = if covered.is_empty() {
            None
        } else {
            Some(covered.iter().sum::<f64>() / covered.len() as f64)
        };

        Self {
            total_tests,
            passed_tests,
            failed_tests,
            flaky_tests,
            coverage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_outcome::NewTestOutcome;

    fn outcome(status: TestStatus, coverage: Option<f64>) -> TestOutcome {
        NewTestOutcome {
            suite: "auth".to_string(),
            test_type: None,
            framework: None,
            status,
            duration_secs: None,
            coverage,
            error_message: None,
            stack_trace: None,
            environment: "test".to_string(),
        }
        .into_outcome(1, 1, Utc::now())
    }

    #[test]
    fn stats_count_by_status() {
        let outcomes = vec![
            outcome(TestStatus::Passed, None),
            outcome(TestStatus::Passed, None),
            outcome(TestStatus::Failed, None),
            outcome(TestStatus::Flaky, None),
        ];
        let stats = BuildStats::from_outcomes(&outcomes);
        assert_eq!(stats.total_tests, 4);
        assert_eq!(stats.passed_tests, 2);
        assert_eq!(stats.failed_tests, 1);
        assert_eq!(stats.flaky_tests, 1);
        assert_eq!(stats.coverage, None);
    }

    #[test]
    fn coverage_is_mean_over_reporting_outcomes_only() {
        let outcomes = vec![
            outcome(TestStatus::Passed, Some(80.0)),
            outcome(TestStatus::Passed, Some(60.0)),
            outcome(TestStatus::Failed, None),
        ];
        let stats = BuildStats::from_outcomes(&outcomes);
        assert_eq!(stats.coverage, Some(70.0));
    }

    #[test]
    fn no_outcomes_means_no_coverage_data() {
        let stats = BuildStats::from_outcomes(&[]);
        assert_eq!(stats.total_tests, 0);
        assert_eq!(stats.coverage, None);
    }
}
