//! The aggregation pipeline: repository listing, per-repository commit
//! retrieval, date filtering and diff summation.

use futures::future::join_all;
use futures::stream::{self, StreamExt};

use crate::error::FetchError;
use crate::github::GitHubApi;
use crate::models::{AggregateStats, ChangeTotals, CommitRecord, DateRange, RepoStat, RepositoryRef};

/// Result of one complete run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Repositories with a non-zero line change, in repository order.
    pub rows: Vec<RepoStat>,
    /// Every analyzed repository, including hidden ones.
    pub all_rows: Vec<RepoStat>,
    pub totals: AggregateStats,
}

/// Lists every public repository of `owner` page by page, then appends the
/// configured private names. Any failed page aborts the whole listing.
pub async fn list_repositories(
    api: &impl GitHubApi,
    owner: &str,
    private_names: &[String],
) -> Result<Vec<RepositoryRef>, FetchError> {
    let mut repos = Vec::new();
    let mut page = 1;

    loop {
        let batch = api
            .repos_page(owner, page)
            .await
            .map_err(|source| FetchError::Listing {
                owner: owner.to_string(),
                page,
                source,
            })?;

        if batch.is_empty() {
            break;
        }

        tracing::info!("Fetched {} repositories from page {}", batch.len(), page);
        repos.extend(batch);
        page += 1;
    }

    repos.extend(private_names.iter().map(RepositoryRef::private));

    tracing::info!(
        "Resolved {} repositories for {} ({} private)",
        repos.len(),
        owner,
        private_names.len()
    );

    Ok(repos)
}

/// Commit history of one repository. Never fails: an empty repository (409)
/// or any other error yields an empty list.
pub async fn list_commits(api: &impl GitHubApi, owner: &str, repo: &str) -> Vec<CommitRecord> {
    match api.commits(owner, repo).await {
        Ok(commits) => commits,
        Err(source) if source.is_conflict() => {
            tracing::warn!(repo = %repo, "Repository has no commits");
            Vec::new()
        }
        Err(source) => {
            let err = FetchError::Commits {
                repo: repo.to_string(),
                source,
            };
            tracing::warn!(repo = %repo, error = %err, "Treating repository as having no commits");
            Vec::new()
        }
    }
}

async fn commit_changes(
    api: &impl GitHubApi,
    owner: &str,
    repo: &str,
    commit: CommitRecord,
) -> ChangeTotals {
    match api.commit_stats(owner, repo, &commit.sha).await {
        Ok(totals) => {
            tracing::debug!(repo = %repo, sha = %commit.sha, "+{} -{}", totals.additions, totals.deletions);
            totals
        }
        Err(source) => {
            let err = FetchError::Detail {
                repo: repo.to_string(),
                sha: commit.sha,
                source,
            };
            tracing::warn!(error = %err, "Counting commit as zero changes");
            ChangeTotals::default()
        }
    }
}

/// Sums line changes over `commits`, fetching at most `concurrency` commit
/// details at once. A failed detail request counts as zero.
pub async fn sum_changes(
    api: &impl GitHubApi,
    owner: &str,
    repo: &str,
    commits: &[CommitRecord],
    concurrency: usize,
) -> ChangeTotals {
    stream::iter(commits.iter().cloned())
        .map(|commit| commit_changes(api, owner, repo, commit))
        .buffer_unordered(concurrency.max(1))
        .fold(ChangeTotals::default(), |acc, t| async move { acc + t })
        .await
}

/// Commits, date filter and diff totals for a single repository.
pub async fn analyze_repository(
    api: &impl GitHubApi,
    owner: &str,
    repo: &RepositoryRef,
    range: &DateRange,
    concurrency: usize,
) -> RepoStat {
    if repo.is_known_empty() {
        tracing::warn!(repo = %repo.name, "Skipping empty repository");
        return RepoStat::empty(&repo.name);
    }

    let in_range: Vec<CommitRecord> = list_commits(api, owner, &repo.name)
        .await
        .into_iter()
        .filter(|c| range.contains(&c.authored_at))
        .collect();

    let total_changes = sum_changes(api, owner, &repo.name, &in_range, concurrency).await;

    RepoStat {
        repo_name: repo.name.clone(),
        total_changes,
        commit_count: in_range.len() as u64,
    }
}

/// Analyzes every repository concurrently and aggregates the results.
/// Row order follows `repos`, not completion order.
pub async fn run_analysis(
    api: &impl GitHubApi,
    owner: &str,
    repos: &[RepositoryRef],
    range: &DateRange,
    concurrency: usize,
) -> RunOutcome {
    let all_rows: Vec<RepoStat> = join_all(
        repos
            .iter()
            .map(|repo| analyze_repository(api, owner, repo, range, concurrency)),
    )
    .await;

    let rows: Vec<RepoStat> = all_rows
        .iter()
        .filter(|r| !r.total_changes.is_zero())
        .cloned()
        .collect();

    let totals = AggregateStats::from_rows(&all_rows, &rows);

    RunOutcome {
        rows,
        all_rows,
        totals,
    }
}
