//! Persistence boundary.
//!
//! The engine consumes storage as a transactional record store with
//! upsert and range-query primitives; the concrete backend lives
//! outside the engine. `MemoryStore` is the in-process
//! implementation used by the binary and the test suite.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::EngineResult;
use crate::models::build::{Build, BuildStats, NewBuild};
use crate::models::release::{NewRelease, Release};
use crate::models::test_outcome::{NewTestOutcome, TestOutcome};

pub use memory::MemoryStore;

/// Record store consumed by the engine.
///
/// Guarantees required of an implementation:
/// - `insert_build_if_new` is atomic with respect to the
///   `(team, workflow_run_id)` key: two concurrent calls for the same
///   run create exactly one build.
/// - `link_release_if_unset` only touches builds whose release link
///   is currently empty.
/// - Outcome reads for multiple builds are returned newest first.
#[async_trait]
pub trait Store: Send + Sync {
    // ── Builds ──

    /// Create a build unless one already exists for the same team and
    /// upstream run identifier. Returns the created build, or `None`
    /// if the run was already synchronized.
    async fn insert_build_if_new(&self, build: NewBuild) -> EngineResult<Option<Build>>;

    /// Fetch a build by id. `EngineError::NotFound` if absent.
    async fn get_build(&self, build_id: i64) -> EngineResult<Build>;

    /// Persist recomputed rollup counters for a build.
    async fn update_build_stats(&self, build_id: i64, stats: &BuildStats) -> EngineResult<()>;

    /// All builds for a team, optionally bounded by creation time.
    async fn list_builds(
        &self,
        team_id: Uuid,
        created_since: Option<DateTime<Utc>>,
    ) -> EngineResult<Vec<Build>>;

    /// Point builds at a release, skipping builds already linked.
    /// Returns the number of builds updated.
    async fn link_release_if_unset(
        &self,
        team_id: Uuid,
        repo_full_name: &str,
        commit_hashes: &[String],
        release_id: i64,
    ) -> EngineResult<u64>;

    /// Reset builds on the given commits to unreleased.
    async fn clear_release_for_commits(
        &self,
        team_id: Uuid,
        repo_full_name: &str,
        commit_hashes: &[String],
    ) -> EngineResult<u64>;

    // ── Test outcomes ──

    /// Append extracted outcomes to a build.
    async fn insert_outcomes(
        &self,
        build_id: i64,
        outcomes: Vec<NewTestOutcome>,
    ) -> EngineResult<Vec<TestOutcome>>;

    /// Outcomes belonging to one build, oldest first.
    async fn outcomes_for_build(&self, build_id: i64) -> EngineResult<Vec<TestOutcome>>;

    /// Outcomes across a set of builds, newest first.
    async fn outcomes_for_builds(&self, build_ids: &[i64]) -> EngineResult<Vec<TestOutcome>>;

    /// Drop every outcome of a build (re-parse). Returns the count.
    async fn delete_outcomes_for_build(&self, build_id: i64) -> EngineResult<u64>;

    // ── Releases ──

    /// Create or update a release keyed by `(team, repo, tag_name)`.
    async fn upsert_release(&self, release: NewRelease) -> EngineResult<Release>;

    /// Persist the resolved commit hash for a release.
    async fn set_release_commit(&self, release_id: i64, commit_hash: &str) -> EngineResult<()>;

    /// Releases of a repository ordered by publish time ascending.
    async fn list_releases(&self, team_id: Uuid, repo_full_name: &str)
        -> EngineResult<Vec<Release>>;
}
