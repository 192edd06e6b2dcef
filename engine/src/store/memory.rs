//! In-memory record store.
//!
//! Satisfies the `Store` contract with no external dependencies:
//! a single mutex over the record maps makes the check-then-insert
//! build creation atomic.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::models::build::{Build, BuildStats, NewBuild};
use crate::models::release::{NewRelease, Release};
use crate::models::test_outcome::{NewTestOutcome, TestOutcome};
use crate::store::Store;

#[derive(Debug, Default)]
struct Inner {
    builds: HashMap<i64, Build>,
    outcomes: Vec<TestOutcome>,
    releases: HashMap<i64, Release>,
    next_build_id: i64,
    next_outcome_id: i64,
    next_release_id: i64,
}

/// In-memory `Store` backed by a mutexed record map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_build_if_new(&self, build: NewBuild) -> EngineResult<Option<Build>> {
        let mut inner = self.inner.lock().unwrap();

        let exists = inner.builds.values().any(|b| {
            b.team_id == build.team_id && b.workflow_run_id == build.workflow_run_id
        });
        if exists {
            return Ok(None);
        }

        inner.next_build_id += 1;
        let id = inner.next_build_id;
        let record = Build {
            id,
            team_id: build.team_id,
            repo_full_name: build.repo_full_name,
            version: build.version,
            branch: build.branch,
            commit_hash: build.commit_hash,
            commit_message: build.commit_message,
            author: build.author,
            status: build.status,
            environment: build.environment,
            workflow_run_id: build.workflow_run_id,
            total_tests: 0,
            passed_tests: 0,
            failed_tests: 0,
            flaky_tests: 0,
            coverage: None,
            release_id: None,
            created_at: Utc::now(),
        };
        inner.builds.insert(id, record.clone());
        Ok(Some(record))
    }

    async fn get_build(&self, build_id: i64) -> EngineResult<Build> {
        let inner = self.inner.lock().unwrap();
        inner
            .builds
            .get(&build_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("build", build_id))
    }

    async fn update_build_stats(&self, build_id: i64, stats: &BuildStats) -> EngineResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let build = inner
            .builds
            .get_mut(&build_id)
            .ok_or_else(|| EngineError::not_found("build", build_id))?;
        build.total_tests = stats.total_tests;
        build.passed_tests = stats.passed_tests;
        build.failed_tests = stats.failed_tests;
        build.flaky_tests = stats.flaky_tests;
        build.coverage = stats.coverage;
        Ok(())
    }

    async fn list_builds(
        &self,
        team_id: Uuid,
        created_since: Option<DateTime<Utc>>,
    ) -> EngineResult<Vec<Build>> {
        let inner = self.inner.lock().unwrap();
        let mut builds: Vec<Build> = inner
            .builds
            .values()
            .filter(|b| b.team_id == team_id)
            .filter(|b| created_since.map_or(true, |since| b.created_at >= since))
            .cloned()
            .collect();
        builds.sort_by_key(|b| b.id);
        Ok(builds)
    }

    async fn link_release_if_unset(
        &self,
        team_id: Uuid,
        repo_full_name: &str,
        commit_hashes: &[String],
        release_id: i64,
    ) -> EngineResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        let mut updated = 0;
        for build in inner.builds.values_mut() {
            if build.team_id == team_id
                && build.repo_full_name == repo_full_name
                && build.release_id.is_none()
                && commit_hashes.contains(&build.commit_hash)
            {
                build.release_id = Some(release_id);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn clear_release_for_commits(
        &self,
        team_id: Uuid,
        repo_full_name: &str,
        commit_hashes: &[String],
    ) -> EngineResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        let mut updated = 0;
        for build in inner.builds.values_mut() {
            if build.team_id == team_id
                && build.repo_full_name == repo_full_name
                && build.release_id.is_some()
                && commit_hashes.contains(&build.commit_hash)
            {
                build.release_id = None;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn insert_outcomes(
        &self,
        build_id: i64,
        outcomes: Vec<NewTestOutcome>,
    ) -> EngineResult<Vec<TestOutcome>> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.builds.contains_key(&build_id) {
            return Err(EngineError::not_found("build", build_id));
        }
        let now = Utc::now();
        let mut created = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            inner.next_outcome_id += 1;
            let record = outcome.into_outcome(inner.next_outcome_id, build_id, now);
            inner.outcomes.push(record.clone());
            created.push(record);
        }
        Ok(created)
    }

    async fn outcomes_for_build(&self, build_id: i64) -> EngineResult<Vec<TestOutcome>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .outcomes
            .iter()
            .filter(|o| o.build_id == build_id)
            .cloned()
            .collect())
    }

    async fn outcomes_for_builds(&self, build_ids: &[i64]) -> EngineResult<Vec<TestOutcome>> {
        let inner = self.inner.lock().unwrap();
        let mut outcomes: Vec<TestOutcome> = inner
            .outcomes
            .iter()
            .filter(|o| build_ids.contains(&o.build_id))
            .cloned()
            .collect();
        // Newest first; id breaks ties within one timestamp.
        outcomes.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(outcomes)
    }

    async fn delete_outcomes_for_build(&self, build_id: i64) -> EngineResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.outcomes.len();
        inner.outcomes.retain(|o| o.build_id != build_id);
        Ok((before - inner.outcomes.len()) as u64)
    }

    async fn upsert_release(&self, release: NewRelease) -> EngineResult<Release> {
        let mut inner = self.inner.lock().unwrap();

        let existing_id = inner
            .releases
            .values()
            .find(|r| {
                r.team_id == release.team_id
                    && r.repo_full_name == release.repo_full_name
                    && r.tag_name == release.tag_name
            })
            .map(|r| r.id);

        if let Some(id) = existing_id {
            let record = inner.releases.get_mut(&id).unwrap();
            record.name = release.name;
            record.description = release.description;
            record.commit_hash = release.commit_hash;
            record.is_prerelease = release.is_prerelease;
            record.published_at = release.published_at;
            return Ok(record.clone());
        }

        inner.next_release_id += 1;
        let id = inner.next_release_id;
        let record = Release {
            id,
            team_id: release.team_id,
            repo_full_name: release.repo_full_name,
            tag_name: release.tag_name,
            name: release.name,
            description: release.description,
            commit_hash: release.commit_hash,
            is_prerelease: release.is_prerelease,
            published_at: release.published_at,
            created_at: Utc::now(),
        };
        inner.releases.insert(id, record.clone());
        Ok(record)
    }

    async fn set_release_commit(&self, release_id: i64, commit_hash: &str) -> EngineResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let release = inner
            .releases
            .get_mut(&release_id)
            .ok_or_else(|| EngineError::not_found("release", release_id))?;
        release.commit_hash = commit_hash.to_string();
        Ok(())
    }

    async fn list_releases(
        &self,
        team_id: Uuid,
        repo_full_name: &str,
    ) -> EngineResult<Vec<Release>> {
        let inner = self.inner.lock().unwrap();
        let mut releases: Vec<Release> = inner
            .releases
            .values()
            .filter(|r| r.team_id == team_id && r.repo_full_name == repo_full_name)
            .cloned()
            .collect();
        releases.sort_by_key(|r| (r.effective_time(), r.id));
        Ok(releases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_outcome::TestStatus;

    fn new_build(team_id: Uuid, run_id: i64, commit: &str) -> NewBuild {
        NewBuild {
            team_id,
            repo_full_name: "acme/widgets".to_string(),
            version: commit.to_string(),
            branch: "main".to_string(),
            commit_hash: commit.to_string(),
            commit_message: "msg".to_string(),
            author: "dev".to_string(),
            status: "completed".to_string(),
            environment: "production".to_string(),
            workflow_run_id: run_id,
        }
    }

    fn new_outcome(status: TestStatus) -> NewTestOutcome {
        NewTestOutcome {
            suite: "api".to_string(),
            test_type: None,
            framework: None,
            status,
            duration_secs: None,
            coverage: None,
            error_message: None,
            stack_trace: None,
            environment: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn duplicate_run_id_is_rejected() {
        let store = MemoryStore::new();
        let team = Uuid::new_v4();

        let first = store.insert_build_if_new(new_build(team, 100, "abc")).await.unwrap();
        assert!(first.is_some());

        let second = store.insert_build_if_new(new_build(team, 100, "abc")).await.unwrap();
        assert!(second.is_none());

        // A different team may hold the same run id.
        let other = store
            .insert_build_if_new(new_build(Uuid::new_v4(), 100, "abc"))
            .await
            .unwrap();
        assert!(other.is_some());
    }

    #[tokio::test]
    async fn link_release_skips_already_linked_builds() {
        let store = MemoryStore::new();
        let team = Uuid::new_v4();
        let build = store
            .insert_build_if_new(new_build(team, 1, "aaa111"))
            .await
            .unwrap()
            .unwrap();

        let commits = vec!["aaa111".to_string()];
        let linked = store
            .link_release_if_unset(team, "acme/widgets", &commits, 10)
            .await
            .unwrap();
        assert_eq!(linked, 1);

        // A later pass for another release must not steal the build.
        let relinked = store
            .link_release_if_unset(team, "acme/widgets", &commits, 20)
            .await
            .unwrap();
        assert_eq!(relinked, 0);
        assert_eq!(store.get_build(build.id).await.unwrap().release_id, Some(10));
    }

    #[tokio::test]
    async fn delete_outcomes_clears_only_that_build() {
        let store = MemoryStore::new();
        let team = Uuid::new_v4();
        let b1 = store.insert_build_if_new(new_build(team, 1, "a")).await.unwrap().unwrap();
        let b2 = store.insert_build_if_new(new_build(team, 2, "b")).await.unwrap().unwrap();

        store
            .insert_outcomes(b1.id, vec![new_outcome(TestStatus::Passed)])
            .await
            .unwrap();
        store
            .insert_outcomes(b2.id, vec![new_outcome(TestStatus::Failed)])
            .await
            .unwrap();

        assert_eq!(store.delete_outcomes_for_build(b1.id).await.unwrap(), 1);
        assert!(store.outcomes_for_build(b1.id).await.unwrap().is_empty());
        assert_eq!(store.outcomes_for_build(b2.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn upsert_release_updates_in_place() {
        let store = MemoryStore::new();
        let team = Uuid::new_v4();
        let release = NewRelease {
            team_id: team,
            repo_full_name: "acme/widgets".to_string(),
            tag_name: "v1.0".to_string(),
            name: Some("First".to_string()),
            description: None,
            commit_hash: "stale".to_string(),
            is_prerelease: false,
            published_at: None,
        };

        let created = store.upsert_release(release.clone()).await.unwrap();
        let updated = store
            .upsert_release(NewRelease {
                commit_hash: "resolved".to_string(),
                ..release
            })
            .await
            .unwrap();

        assert_eq!(created.id, updated.id);
        assert_eq!(updated.commit_hash, "resolved");
        assert_eq!(store.list_releases(team, "acme/widgets").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn outcomes_for_builds_returns_newest_first() {
        let store = MemoryStore::new();
        let team = Uuid::new_v4();
        let build = store.insert_build_if_new(new_build(team, 1, "a")).await.unwrap().unwrap();

        store
            .insert_outcomes(build.id, vec![new_outcome(TestStatus::Passed)])
            .await
            .unwrap();
        store
            .insert_outcomes(build.id, vec![new_outcome(TestStatus::Failed)])
            .await
            .unwrap();

        let outcomes = store.outcomes_for_builds(&[build.id]).await.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].id > outcomes[1].id);
    }
}
