//! GitHub API client — bearer-token authenticated, read-only.
//!
//! Every request runs under a semaphore permit so a sync pass never
//! fans out past the configured in-flight limit, and under the
//! client-wide timeout so a stuck upstream call cannot wedge a sync.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::github::types::{
    Artifact, ArtifactsPage, Comparison, CommitRef, Job, JobsPage, ReleasePayload, TagRef,
    WorkflowRun, WorkflowRunsPage,
};

/// The read surface the engine consumes from the CI/source-control
/// provider. Implemented by `GithubClient`; tests substitute fakes.
#[async_trait]
pub trait CiProvider: Send + Sync {
    async fn list_releases(&self, repo: &str) -> EngineResult<Vec<ReleasePayload>>;

    async fn list_workflow_runs(&self, repo: &str, per_page: u32) -> EngineResult<Vec<WorkflowRun>>;

    async fn list_artifacts(&self, repo: &str, run_id: i64) -> EngineResult<Vec<Artifact>>;

    /// Download an artifact as a zip archive.
    async fn download_artifact(&self, repo: &str, artifact_id: i64) -> EngineResult<Vec<u8>>;

    async fn list_jobs(&self, repo: &str, run_id: i64) -> EngineResult<Vec<Job>>;

    async fn download_job_log(&self, repo: &str, job_id: i64) -> EngineResult<String>;

    /// Dereference a tag to the commit it points at.
    async fn tag_commit(&self, repo: &str, tag: &str) -> EngineResult<String>;

    /// Commit hashes reachable from `head` but not from `base`.
    async fn compare_commits(&self, repo: &str, base: &str, head: &str)
        -> EngineResult<Vec<String>>;

    /// Linear commit list, optionally starting from `sha` or bounded
    /// below by `since`.
    async fn list_commits(
        &self,
        repo: &str,
        sha: Option<&str>,
        since: Option<&str>,
        per_page: u32,
    ) -> EngineResult<Vec<String>>;
}

/// GitHub REST implementation of `CiProvider`.
#[derive(Debug)]
pub struct GithubClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
    permits: Arc<Semaphore>,
}

impl GithubClient {
    /// Build a client from engine configuration. Fails fast when no
    /// token is on file — sync cannot proceed unauthenticated.
    pub fn from_config(config: &EngineConfig) -> EngineResult<Self> {
        Self::new(
            &config.github_token,
            &config.api_base,
            config.max_concurrent_requests,
            config.http_timeout_secs,
        )
    }

    pub fn new(
        token: &str,
        api_base: &str,
        max_concurrent: usize,
        timeout_secs: u64,
    ) -> EngineResult<Self> {
        if token.is_empty() {
            return Err(EngineError::MissingCredential);
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        })
    }

    async fn get(&self, url: &str, query: &[(&str, String)]) -> EngineResult<reqwest::Response> {
        // Closed semaphores never occur here; the permit bounds
        // in-flight requests for the lifetime of the response read.
        let _permit = self.permits.acquire().await.expect("semaphore closed");

        let resp = self
            .http
            .get(url)
            .query(query)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "flakehawk")
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(url, status, "Provider request failed: {body}");
            return Err(EngineError::upstream(
                format!("GET {url} returned {status}"),
                Some(status),
            ));
        }

        Ok(resp)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> EngineResult<T> {
        Ok(self.get(url, query).await?.json::<T>().await?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }
}

#[async_trait]
impl CiProvider for GithubClient {
    async fn list_releases(&self, repo: &str) -> EngineResult<Vec<ReleasePayload>> {
        self.get_json(&self.url(&format!("/repos/{repo}/releases")), &[])
            .await
    }

    async fn list_workflow_runs(&self, repo: &str, per_page: u32) -> EngineResult<Vec<WorkflowRun>> {
        let page: WorkflowRunsPage = self
            .get_json(
                &self.url(&format!("/repos/{repo}/actions/runs")),
                &[("per_page", per_page.to_string())],
            )
            .await?;
        Ok(page.workflow_runs)
    }

    async fn list_artifacts(&self, repo: &str, run_id: i64) -> EngineResult<Vec<Artifact>> {
        let page: ArtifactsPage = self
            .get_json(
                &self.url(&format!("/repos/{repo}/actions/runs/{run_id}/artifacts")),
                &[],
            )
            .await?;
        Ok(page.artifacts)
    }

    async fn download_artifact(&self, repo: &str, artifact_id: i64) -> EngineResult<Vec<u8>> {
        let resp = self
            .get(
                &self.url(&format!("/repos/{repo}/actions/artifacts/{artifact_id}/zip")),
                &[],
            )
            .await?;
        Ok(resp.bytes().await?.to_vec())
    }

    async fn list_jobs(&self, repo: &str, run_id: i64) -> EngineResult<Vec<Job>> {
        let page: JobsPage = self
            .get_json(
                &self.url(&format!("/repos/{repo}/actions/runs/{run_id}/jobs")),
                &[],
            )
            .await?;
        Ok(page.jobs)
    }

    async fn download_job_log(&self, repo: &str, job_id: i64) -> EngineResult<String> {
        let resp = self
            .get(&self.url(&format!("/repos/{repo}/actions/jobs/{job_id}/logs")), &[])
            .await?;
        Ok(resp.text().await?)
    }

    async fn tag_commit(&self, repo: &str, tag: &str) -> EngineResult<String> {
        let tag_ref: TagRef = self
            .get_json(&self.url(&format!("/repos/{repo}/git/refs/tags/{tag}")), &[])
            .await?;
        Ok(tag_ref.object.sha)
    }

    async fn compare_commits(
        &self,
        repo: &str,
        base: &str,
        head: &str,
    ) -> EngineResult<Vec<String>> {
        let comparison: Comparison = self
            .get_json(&self.url(&format!("/repos/{repo}/compare/{base}...{head}")), &[])
            .await?;
        Ok(comparison.commits.into_iter().map(|c| c.sha).collect())
    }

    async fn list_commits(
        &self,
        repo: &str,
        sha: Option<&str>,
        since: Option<&str>,
        per_page: u32,
    ) -> EngineResult<Vec<String>> {
        let mut query = vec![("per_page", per_page.to_string())];
        if let Some(sha) = sha {
            query.push(("sha", sha.to_string()));
        }
        if let Some(since) = since {
            query.push(("since", since.to_string()));
        }

        let commits: Vec<CommitRef> = self
            .get_json(&self.url(&format!("/repos/{repo}/commits")), &query)
            .await?;
        Ok(commits.into_iter().map(|c| c.sha).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_token_is_a_missing_credential() {
        let err = GithubClient::new("", "https://api.github.com", 4, 30).unwrap_err();
        assert!(matches!(err, EngineError::MissingCredential));
    }

    #[test]
    fn api_base_trailing_slash_is_normalized() {
        let client = GithubClient::new("tok", "https://api.github.com/", 4, 30).unwrap();
        assert_eq!(
            client.url("/repos/acme/widgets/releases"),
            "https://api.github.com/repos/acme/widgets/releases"
        );
    }
}
