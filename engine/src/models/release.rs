//! Release — a tagged, published version of the repository.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A published version marker. The tag name is unique per repository;
/// the commit hash, once resolved against the tag ref, is
/// authoritative for range computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub id: i64,
    pub team_id: Uuid,
    pub repo_full_name: String,
    pub tag_name: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub commit_hash: String,
    pub is_prerelease: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Release {
    /// Timestamp used for chronological ordering: publish time when
    /// known, record creation time otherwise.
    pub fn effective_time(&self) -> DateTime<Utc> {
        self.published_at.unwrap_or(self.created_at)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRelease {
    pub team_id: Uuid,
    pub repo_full_name: String,
    pub tag_name: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub commit_hash: String,
    pub is_prerelease: bool,
    pub published_at: Option<DateTime<Utc>>,
}
