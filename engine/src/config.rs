//! Engine configuration — loaded from environment variables.

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Provider API token for authenticated calls.
    pub github_token: String,
    /// Provider API base URL (overridable for tests/proxies).
    pub api_base: String,
    /// Workflow runs fetched per sync pass.
    pub runs_per_page: u32,
    /// Maximum in-flight provider requests per client.
    pub max_concurrent_requests: usize,
    /// Per-request timeout in seconds.
    pub http_timeout_secs: u64,
    /// Secret for signing connect-flow state tokens.
    pub state_token_secret: String,
    /// Minimum runs before a test group is analyzed.
    pub min_runs: usize,
    /// Flakiness threshold (0.0 - 1.0).
    pub flakiness_threshold: f64,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let github_token = std::env::var("FLAKEHAWK_GITHUB_TOKEN").unwrap_or_default();
        let api_base = std::env::var("FLAKEHAWK_API_BASE")
            .unwrap_or_else(|_| "https://api.github.com".to_string());
        let runs_per_page = std::env::var("FLAKEHAWK_RUNS_PER_PAGE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(50);
        let max_concurrent_requests = std::env::var("FLAKEHAWK_MAX_CONCURRENT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(4);
        let http_timeout_secs = std::env::var("FLAKEHAWK_HTTP_TIMEOUT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);
        let state_token_secret = std::env::var("FLAKEHAWK_STATE_SECRET").unwrap_or_default();
        let min_runs = std::env::var("FLAKEHAWK_MIN_RUNS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3);
        let flakiness_threshold = std::env::var("FLAKEHAWK_FLAKINESS_THRESHOLD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.3);

        if github_token.is_empty() {
            tracing::warn!("FLAKEHAWK_GITHUB_TOKEN not set -- provider sync will fail");
        }
        if state_token_secret.is_empty() {
            tracing::warn!("FLAKEHAWK_STATE_SECRET not set -- connect-flow state tokens disabled");
        }

        Self {
            github_token,
            api_base,
            runs_per_page,
            max_concurrent_requests,
            http_timeout_secs,
            state_token_secret,
            min_runs,
            flakiness_threshold,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            github_token: String::new(),
            api_base: "https://api.github.com".to_string(),
            runs_per_page: 50,
            max_concurrent_requests: 4,
            http_timeout_secs: 30,
            state_token_secret: String::new(),
            min_runs: 3,
            flakiness_threshold: 0.3,
        }
    }
}
