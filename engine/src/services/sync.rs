//! Run synchronization — walks upstream workflow runs, dedupes
//! builds, extracts test outcomes, and keeps rollup counters honest.
//!
//! Sync is idempotent by construction: a run whose identifier already
//! has a build is skipped before anything is written, and build
//! creation is an atomic check-then-insert in the store. A failure on
//! one run never aborts the rest of the pass.

use std::time::Instant;

use serde::Serialize;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::extract::{log, report, Extraction};
use crate::github::types::WorkflowRun;
use crate::github::CiProvider;
use crate::models::build::{BuildStats, NewBuild};
use crate::models::release::NewRelease;
use crate::store::Store;

/// Result of one sync pass.
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub synced_builds: u32,
    pub synced_releases: u32,
    pub total_runs: usize,
    pub total_releases: usize,
}

/// Result of re-parsing one build's evidence.
#[derive(Debug, Clone, Serialize)]
pub struct ReparseSummary {
    pub test_runs: usize,
}

/// Synchronize a repository's releases and workflow runs into the
/// store. Returns counts of newly created records.
pub async fn sync_repository(
    store: &dyn Store,
    provider: &dyn CiProvider,
    team_id: Uuid,
    repo: &str,
    config: &EngineConfig,
) -> EngineResult<SyncSummary> {
    let started = Instant::now();
    tracing::info!(%team_id, repo, "Syncing repository");

    // Releases first, so the association pass that usually follows a
    // sync sees them all. A failed listing skips the step, not the
    // whole sync.
    let releases = match provider.list_releases(repo).await {
        Ok(releases) => releases,
        Err(e) => {
            tracing::warn!(repo, "Release listing failed, skipping releases: {e}");
            crate::metrics::unit_skipped("release_listing");
            Vec::new()
        }
    };

    let total_releases = releases.len();
    let mut synced_releases = 0;
    for release in releases {
        store
            .upsert_release(NewRelease {
                team_id,
                repo_full_name: repo.to_string(),
                tag_name: release.tag_name,
                name: release.name,
                description: release.body,
                commit_hash: release.target_commitish,
                is_prerelease: release.prerelease,
                published_at: release.published_at,
            })
            .await?;
        crate::metrics::release_synced();
        synced_releases += 1;
    }

    let runs = provider
        .list_workflow_runs(repo, config.runs_per_page)
        .await?;
    let total_runs = runs.len();

    let mut synced_builds = 0;
    for run in runs {
        let run_id = run.id;
        match sync_run(store, provider, team_id, repo, run).await {
            Ok(true) => synced_builds += 1,
            Ok(false) => {
                tracing::debug!(run_id, "Build for workflow run already exists, skipping");
            }
            Err(e) => {
                tracing::warn!(run_id, "Skipping workflow run: {e}");
                crate::metrics::unit_skipped("run");
            }
        }
    }

    crate::metrics::sync_duration(started.elapsed().as_millis() as u64);
    tracing::info!(
        %team_id,
        repo,
        synced_builds,
        synced_releases,
        total_runs,
        "Sync complete"
    );

    Ok(SyncSummary {
        synced_builds,
        synced_releases,
        total_runs,
        total_releases,
    })
}

/// Sync one workflow run. Returns false when the run was already
/// synchronized.
async fn sync_run(
    store: &dyn Store,
    provider: &dyn CiProvider,
    team_id: Uuid,
    repo: &str,
    run: WorkflowRun,
) -> EngineResult<bool> {
    let status = run
        .conclusion
        .clone()
        .or_else(|| run.status.clone())
        .unwrap_or_else(|| "unknown".to_string());
    let commit_message = run
        .head_commit
        .as_ref()
        .and_then(|c| c.message.clone())
        .unwrap_or_else(|| "No commit message".to_string());
    let author = run
        .head_commit
        .as_ref()
        .and_then(|c| c.author.as_ref())
        .and_then(|a| a.name.clone())
        .unwrap_or_else(|| "Unknown".to_string());

    let new_build = NewBuild {
        team_id,
        repo_full_name: repo.to_string(),
        version: run.head_sha.clone(),
        branch: run.head_branch.clone().unwrap_or_else(|| "unknown".to_string()),
        commit_hash: run.head_sha.clone(),
        commit_message,
        author,
        status: status.clone(),
        environment: "production".to_string(),
        workflow_run_id: run.id,
    };

    let Some(build) = store.insert_build_if_new(new_build).await? else {
        return Ok(false);
    };

    crate::metrics::build_synced(&status);
    tracing::info!(
        build_id = build.id,
        run_id = run.id,
        commit = %run.head_sha,
        "Build created"
    );

    ingest_run_evidence(store, provider, build.id, repo, run.id, run.name.as_deref()).await?;
    Ok(true)
}

/// Fetch a run's evidence, extract outcomes, persist them, and bring
/// the build's rollup counters up to date.
///
/// Extractor priority: report artifacts first; job logs only when no
/// artifact yielded outcomes.
pub async fn ingest_run_evidence(
    store: &dyn Store,
    provider: &dyn CiProvider,
    build_id: i64,
    repo: &str,
    run_id: i64,
    run_name: Option<&str>,
) -> EngineResult<usize> {
    let mut extraction = Extraction::empty();

    match provider.list_artifacts(repo, run_id).await {
        Ok(artifacts) => {
            for artifact in artifacts {
                if !is_test_report_artifact(&artifact.name) {
                    continue;
                }
                match provider.download_artifact(repo, artifact.id).await {
                    Ok(data) => {
                        let candidate = report::outcomes_from_archive(&data, run_name);
                        if !candidate.outcomes.is_empty() {
                            extraction = candidate;
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            artifact = %artifact.name,
                            "Skipping artifact download: {e}"
                        );
                        crate::metrics::unit_skipped("artifact");
                    }
                }
            }
        }
        Err(e) => {
            tracing::warn!(run_id, "Artifact listing failed, falling back to logs: {e}");
        }
    }

    if extraction.outcomes.is_empty() {
        let jobs = provider.list_jobs(repo, run_id).await?;
        for job in jobs {
            let log_text = match provider.download_job_log(repo, job.id).await {
                Ok(log_text) => log_text,
                Err(e) => {
                    // One bad log must not stop the sibling jobs.
                    tracing::warn!(job = %job.name, "Skipping job log: {e}");
                    crate::metrics::unit_skipped("job");
                    continue;
                }
            };
            let candidate =
                log::outcomes_from_job_log(&job.name, job.conclusion.as_deref(), &log_text);
            extraction.outcomes.extend(candidate.outcomes);
        }
        crate::metrics::outcomes_extracted("log", extraction.outcomes.len());
    } else {
        crate::metrics::outcomes_extracted("report", extraction.outcomes.len());
    }

    let count = extraction.outcomes.len();
    if count > 0 {
        store.insert_outcomes(build_id, extraction.outcomes).await?;
    }
    recompute_build_stats(store, build_id).await?;

    Ok(count)
}

/// Whether an artifact name marks a test report.
fn is_test_report_artifact(name: &str) -> bool {
    let name = name.to_lowercase();
    name.contains("test") || name.contains("junit")
}

/// Recompute and persist one build's rollup counters from its current
/// outcomes.
pub async fn recompute_build_stats(store: &dyn Store, build_id: i64) -> EngineResult<BuildStats> {
    let outcomes = store.outcomes_for_build(build_id).await?;
    let stats = BuildStats::from_outcomes(&outcomes);
    store.update_build_stats(build_id, &stats).await?;
    Ok(stats)
}

/// Drop a build's outcomes and re-run extraction from the upstream
/// evidence. The only sanctioned way to mutate outcomes after sync.
pub async fn reparse_build(
    store: &dyn Store,
    provider: &dyn CiProvider,
    build_id: i64,
) -> EngineResult<ReparseSummary> {
    let build = store.get_build(build_id).await?;

    let deleted = store.delete_outcomes_for_build(build_id).await?;
    tracing::info!(build_id, deleted, "Re-parsing build evidence");

    let test_runs = ingest_run_evidence(
        store,
        provider,
        build.id,
        &build.repo_full_name,
        build.workflow_run_id,
        None,
    )
    .await?;

    Ok(ReparseSummary { test_runs })
}

/// Recompute rollup counters for every build of a team.
pub async fn recalculate_build_stats(store: &dyn Store, team_id: Uuid) -> EngineResult<u32> {
    let builds = store.list_builds(team_id, None).await?;
    let mut updated = 0;
    for build in builds {
        recompute_build_stats(store, build.id).await?;
        updated += 1;
    }
    Ok(updated)
}
