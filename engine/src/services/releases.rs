//! Release association — maps each release to its owned commit range
//! and links builds to the release that shipped them.
//!
//! Tag metadata is not trusted: every tag is dereferenced against the
//! ref API and the resolved commit persisted before any range math.
//! Association never moves a build between releases; running the
//! pass twice is a no-op.

use serde::Serialize;
use uuid::Uuid;

use crate::error::EngineResult;
use crate::github::CiProvider;
use crate::models::release::Release;
use crate::store::Store;

/// How many commits the linear fallback fetch asks for.
const COMMITS_PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Serialize)]
pub struct AssociationSummary {
    pub releases_processed: usize,
}

/// Associate a repository's builds with its releases by commit range.
pub async fn associate_releases(
    store: &dyn Store,
    provider: &dyn CiProvider,
    team_id: Uuid,
    repo: &str,
) -> EngineResult<AssociationSummary> {
    let releases = store.list_releases(team_id, repo).await?;

    // Releases without a tag cannot anchor a range.
    let mut valid: Vec<Release> = Vec::with_capacity(releases.len());
    for release in releases {
        if release.tag_name.is_empty() {
            tracing::warn!(release_id = release.id, "Release has no tag, excluded from ranges");
            continue;
        }
        valid.push(release);
    }

    tracing::info!(repo, count = valid.len(), "Associating builds with releases");

    // Resolve each tag to its true commit. The hint stored at sync
    // time may point at a branch head rather than the tagged commit.
    for release in valid.iter_mut() {
        match provider.tag_commit(repo, &release.tag_name).await {
            Ok(sha) => {
                tracing::debug!(
                    tag = %release.tag_name,
                    commit = %short(&sha),
                    "Resolved tag commit"
                );
                store.set_release_commit(release.id, &sha).await?;
                release.commit_hash = sha;
            }
            Err(e) => {
                // Range math falls back to the best-known hash.
                tracing::warn!(
                    tag = %release.tag_name,
                    "Tag dereference failed, keeping stored commit: {e}"
                );
                crate::metrics::unit_skipped("tag_resolution");
            }
        }
    }

    // Each release owns the commits reachable since the previous one.
    for index in 0..valid.len() {
        let current = &valid[index];
        let previous = index.checked_sub(1).map(|i| &valid[i]);

        let commits = match previous {
            Some(previous) if previous.commit_hash == current.commit_hash => Vec::new(),
            Some(previous) => {
                match provider
                    .compare_commits(repo, &previous.commit_hash, &current.commit_hash)
                    .await
                {
                    Ok(commits) => commits,
                    Err(e) => {
                        tracing::warn!(tag = %current.tag_name, "Commit comparison failed: {e}");
                        crate::metrics::unit_skipped("release");
                        continue;
                    }
                }
            }
            // First release: linear history up to the release commit.
            None => {
                match provider
                    .list_commits(repo, Some(&current.commit_hash), None, COMMITS_PER_PAGE)
                    .await
                {
                    Ok(commits) => commits,
                    Err(e) => {
                        tracing::warn!(tag = %current.tag_name, "Commit listing failed: {e}");
                        crate::metrics::unit_skipped("release");
                        continue;
                    }
                }
            }
        };

        if commits.is_empty() {
            continue;
        }

        let linked = store
            .link_release_if_unset(team_id, repo, &commits, current.id)
            .await?;
        tracing::info!(
            tag = %current.tag_name,
            commits = commits.len(),
            linked,
            "Associated builds with release"
        );
    }

    // Builds on commits after the latest release are unreleased, even
    // if an earlier (now-deleted) association claimed them.
    if let Some(latest) = valid.last() {
        match provider
            .list_commits(repo, None, Some(&latest.commit_hash), COMMITS_PER_PAGE)
            .await
        {
            Ok(commits) if !commits.is_empty() => {
                let cleared = store
                    .clear_release_for_commits(team_id, repo, &commits)
                    .await?;
                if cleared > 0 {
                    tracing::info!(cleared, "Reset post-release builds to unreleased");
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Unreleased-commit listing failed: {e}");
            }
        }
    }

    Ok(AssociationSummary {
        releases_processed: valid.len(),
    })
}

fn short(sha: &str) -> &str {
    &sha[..8.min(sha.len())]
}
