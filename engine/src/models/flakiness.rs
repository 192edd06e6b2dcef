//! Flakiness verdicts — derived per analysis query, never persisted.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Analysis window over build creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeRange {
    Last7Days,
    Last30Days,
    Last90Days,
    #[default]
    AllTime,
}

impl TimeRange {
    /// Lower bound for the window, `None` for all-time.
    pub fn start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            TimeRange::Last7Days => Some(now - Duration::days(7)),
            TimeRange::Last30Days => Some(now - Duration::days(30)),
            TimeRange::Last90Days => Some(now - Duration::days(90)),
            TimeRange::AllTime => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::Last7Days => "7d",
            TimeRange::Last30Days => "30d",
            TimeRange::Last90Days => "90d",
            TimeRange::AllTime => "all",
        }
    }
}

impl std::str::FromStr for TimeRange {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "7d" => TimeRange::Last7Days,
            "30d" => TimeRange::Last30Days,
            "90d" => TimeRange::Last90Days,
            _ => TimeRange::AllTime,
        })
    }
}

/// Detection heuristics, in fixed evaluation (and tie-break) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    MixedResultsInBuilds,
    InconsistentResults,
    ExplicitFlakyStatus,
    IntermittentPattern,
    LowPassRate,
    UnstableTrend,
    BuildInconsistency,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::MixedResultsInBuilds => "mixed_results_in_builds",
            DetectionMethod::InconsistentResults => "inconsistent_results",
            DetectionMethod::ExplicitFlakyStatus => "explicit_flaky_status",
            DetectionMethod::IntermittentPattern => "intermittent_pattern",
            DetectionMethod::LowPassRate => "low_pass_rate",
            DetectionMethod::UnstableTrend => "unstable_trend",
            DetectionMethod::BuildInconsistency => "build_inconsistency",
        }
    }
}

/// Sequence/build structure observed while evaluating one test group.
#[derive(Debug, Clone, Serialize)]
pub struct PatternAnalysis {
    pub alternating_transitions: usize,
    pub alternating_ratio: f64,
    pub max_consecutive_failures: usize,
    pub build_consistency_rate: f64,
    pub distinct_builds: usize,
}

/// Verdict for one `(suite, environment)` test group.
#[derive(Debug, Clone, Serialize)]
pub struct FlakyTest {
    pub suite: String,
    pub environment: String,
    pub total_runs: usize,
    pub passed_runs: usize,
    pub failed_runs: usize,
    pub flaky_runs: usize,
    /// Percentages, 0-100.
    pub pass_rate: f64,
    pub fail_rate: f64,
    pub flaky_rate: f64,
    /// 0-100, rounded to the nearest integer.
    pub flakiness_score: f64,
    pub is_flaky: bool,
    pub reason: String,
    pub detection_methods: Vec<DetectionMethod>,
    pub pattern_analysis: PatternAnalysis,
    pub first_run: DateTime<Utc>,
    pub last_run: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSummary {
    /// All groups seen, including those below `min_runs`.
    pub total_tests: usize,
    pub flaky_tests: usize,
    /// Percentage of groups flagged, 0-100.
    pub flakiness_rate: f64,
    /// Mean score across flagged groups.
    pub average_flakiness_score: f64,
    pub time_range: &'static str,
    pub min_runs: usize,
    pub flakiness_threshold: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlakinessReport {
    pub summary: AnalysisSummary,
    pub flaky_tests: Vec<FlakyTest>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_range_parses_known_windows() {
        assert_eq!("7d".parse::<TimeRange>().unwrap(), TimeRange::Last7Days);
        assert_eq!("30d".parse::<TimeRange>().unwrap(), TimeRange::Last30Days);
        assert_eq!("90d".parse::<TimeRange>().unwrap(), TimeRange::Last90Days);
        assert_eq!("anything".parse::<TimeRange>().unwrap(), TimeRange::AllTime);
    }

    #[test]
    fn all_time_has_no_lower_bound() {
        let now = Utc::now();
        assert_eq!(TimeRange::AllTime.start(now), None);
        assert_eq!(
            TimeRange::Last7Days.start(now),
            Some(now - Duration::days(7))
        );
    }
}
