//! Test outcome — one observed test/suite result within a build.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result status of a single test execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Flaky,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Passed => "passed",
            TestStatus::Failed => "failed",
            TestStatus::Flaky => "flaky",
        }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded pass/fail/flaky result. Immutable once created except
/// by bulk delete-and-recreate on re-parse. `(suite, environment)` is
/// the grouping key the flakiness analyzer treats as one test series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestOutcome {
    pub id: i64,
    pub build_id: i64,
    pub suite: String,
    pub test_type: Option<String>,
    pub framework: Option<String>,
    pub status: TestStatus,
    pub duration_secs: Option<f64>,
    pub coverage: Option<f64>,
    pub error_message: Option<String>,
    pub stack_trace: Option<String>,
    pub environment: String,
    pub created_at: DateTime<Utc>,
}

/// Outcome candidate produced by the evidence extractor, not yet
/// bound to a build row.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewTestOutcome {
    pub suite: String,
    pub test_type: Option<String>,
    pub framework: Option<String>,
    pub status: TestStatus,
    pub duration_secs: Option<f64>,
    pub coverage: Option<f64>,
    pub error_message: Option<String>,
    pub stack_trace: Option<String>,
    pub environment: String,
}

impl NewTestOutcome {
    /// Bind this candidate to a build row.
    pub fn into_outcome(self, id: i64, build_id: i64, created_at: DateTime<Utc>) -> TestOutcome {
        TestOutcome {
            id,
            build_id,
            suite: self.suite,
            test_type: self.test_type,
            framework: self.framework,
            status: self.status,
            duration_secs: self.duration_secs,
            coverage: self.coverage,
            error_message: self.error_message,
            stack_trace: self.stack_trace,
            environment: self.environment,
            created_at,
        }
    }
}
