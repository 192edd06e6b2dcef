//! Provider API payload types.

use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ReleasePayload {
    pub tag_name: String,
    pub name: Option<String>,
    pub body: Option<String>,
    /// Possibly-stale commit hint; the tag ref is authoritative.
    pub target_commitish: String,
    #[serde(default)]
    pub prerelease: bool,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowRunsPage {
    pub workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowRun {
    /// Upstream run identifier — 64-bit, preserved exactly.
    pub id: i64,
    pub name: Option<String>,
    pub head_sha: String,
    pub head_branch: Option<String>,
    pub status: Option<String>,
    pub conclusion: Option<String>,
    pub head_commit: Option<HeadCommit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeadCommit {
    pub message: Option<String>,
    pub author: Option<CommitAuthor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitAuthor {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactsPage {
    pub artifacts: Vec<Artifact>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Artifact {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobsPage {
    pub jobs: Vec<Job>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    pub id: i64,
    pub name: String,
    pub conclusion: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagRef {
    pub object: TagObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagObject {
    pub sha: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Comparison {
    pub commits: Vec<CommitRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitRef {
    pub sha: String,
}
