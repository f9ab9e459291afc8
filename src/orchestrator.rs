//! Owns the dashboard state: date range, repository list, run lifecycle and
//! the published results.
//!
//! Every date-range change and every trigger bumps a run generation. A run
//! publishes only if the generation it started with is still current, so a
//! slow stale run can never overwrite or merge into newer results.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::{FetchError, TriggerError};
use crate::github::GitHubApi;
use crate::models::{AggregateStats, DateRange, RepoStat, RepositoryRef};
use crate::pipeline::{list_repositories, run_analysis};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// No results; runs disabled.
    Idle,
    /// Repository list loaded, no run triggered yet.
    Ready,
    Running,
    Settled,
    /// Repository listing failed. Cleared by a successful refresh.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryListing {
    Loading,
    Loaded(Vec<RepositoryRef>),
    Failed(String),
}

struct Inner {
    date_range: DateRange,
    listing: RepositoryListing,
    listing_generation: u64,
    state: RunState,
    run_enabled: bool,
    generation: u64,
    totals: AggregateStats,
    rows: Vec<RepoStat>,
    error: Option<String>,
}

impl Inner {
    fn new(date_range: DateRange) -> Self {
        Self {
            date_range,
            listing: RepositoryListing::Loading,
            listing_generation: 0,
            state: RunState::Idle,
            run_enabled: false,
            generation: 0,
            totals: AggregateStats::default(),
            rows: Vec::new(),
            error: None,
        }
    }

    /// Zero the published results and invalidate any run in flight.
    fn reset_results(&mut self) {
        self.generation += 1;
        self.totals = AggregateStats::default();
        self.rows.clear();
    }
}

/// Handle to a spawned run.
pub struct RunTicket {
    pub run_id: u64,
    pub handle: JoinHandle<()>,
}

pub struct StatsOrchestrator<A> {
    api: Arc<A>,
    owner: String,
    private_repos: Vec<String>,
    detail_concurrency: usize,
    inner: Arc<RwLock<Inner>>,
}

impl<A: GitHubApi> StatsOrchestrator<A> {
    pub fn new(api: Arc<A>, owner: impl Into<String>, private_repos: Vec<String>) -> Self {
        Self {
            api,
            owner: owner.into(),
            private_repos,
            detail_concurrency: 8,
            inner: Arc::new(RwLock::new(Inner::new(DateRange::default()))),
        }
    }

    pub fn from_config(api: Arc<A>, config: &Config) -> Self {
        Self::new(api, config.username.clone(), config.private_repos.clone())
            .with_detail_concurrency(config.detail_concurrency)
    }

    pub fn with_detail_concurrency(mut self, concurrency: usize) -> Self {
        self.detail_concurrency = concurrency.max(1);
        self
    }

    /// Resolve the repository list. Must complete before any run can start.
    pub async fn load_repositories(&self) -> Result<usize, FetchError> {
        let listing_generation = {
            let mut inner = self.inner.write().await;
            inner.listing_generation += 1;
            inner.listing = RepositoryListing::Loading;
            inner.listing_generation
        };

        tracing::info!("Loading repositories for {}", self.owner);
        let result = list_repositories(&*self.api, &self.owner, &self.private_repos).await;

        let mut inner = self.inner.write().await;
        if inner.listing_generation != listing_generation {
            tracing::debug!("Discarding superseded repository listing");
            return result.map(|repos| repos.len());
        }

        match result {
            Ok(repos) => {
                let count = repos.len();
                inner.listing = RepositoryListing::Loaded(repos);
                if matches!(inner.state, RunState::Idle | RunState::Failed) {
                    inner.state = RunState::Ready;
                    inner.error = None;
                }
                Ok(count)
            }
            Err(err) => {
                tracing::error!("Repository listing failed: {}", err);
                inner.listing = RepositoryListing::Failed(err.to_string());
                inner.error = Some(format!("Error loading repositories: {}", err));
                inner.state = RunState::Failed;
                inner.run_enabled = false;
                inner.reset_results();
                Err(err)
            }
        }
    }

    /// Replace the date range. Results are zeroed and runs disabled until the
    /// next trigger.
    pub async fn set_date_range(&self, range: DateRange) {
        let mut inner = self.inner.write().await;
        inner.date_range = range;
        inner.run_enabled = false;
        inner.reset_results();
        if inner.state != RunState::Failed {
            inner.state = RunState::Idle;
        }
        tracing::info!(
            start = ?range.start,
            end = ?range.end,
            "Date range changed, results reset"
        );
    }

    /// Start a fresh run over the loaded repositories. Any earlier run still in
    /// flight is superseded and its results will be dropped.
    pub async fn trigger_run(&self) -> Result<RunTicket, TriggerError> {
        let (run_id, repos, range) = {
            let mut inner = self.inner.write().await;
            let repos = match &inner.listing {
                RepositoryListing::Loaded(repos) => repos.clone(),
                _ => return Err(TriggerError::RepositoriesNotLoaded),
            };
            if !inner.date_range.is_complete() {
                return Err(TriggerError::DateRangeIncomplete);
            }

            inner.reset_results();
            inner.run_enabled = true;
            inner.state = RunState::Running;
            inner.error = None;
            (inner.generation, repos, inner.date_range)
        };

        let api = Arc::clone(&self.api);
        let shared = Arc::clone(&self.inner);
        let owner = self.owner.clone();
        let concurrency = self.detail_concurrency;

        let handle = tokio::spawn(async move {
            tracing::info!(run_id, "Starting analysis of {} repositories", repos.len());
            let outcome = run_analysis(&*api, &owner, &repos, &range, concurrency).await;

            let mut inner = shared.write().await;
            if inner.generation != run_id {
                tracing::debug!(run_id, current = inner.generation, "Discarding results of stale run");
                return;
            }

            let hidden = outcome.all_rows.len() - outcome.rows.len();
            inner.totals = outcome.totals;
            inner.rows = outcome.rows;
            inner.state = RunState::Settled;
            tracing::info!(
                run_id,
                hidden,
                "Run settled: {} commits, +{} -{} across {} repositories",
                inner.totals.total_commits,
                inner.totals.total_additions,
                inner.totals.total_deletions,
                inner.totals.total_repos
            );
        });

        Ok(RunTicket { run_id, handle })
    }

    pub async fn snapshot(&self) -> StatsSnapshot {
        let inner = self.inner.read().await;
        let repositories = match &inner.listing {
            RepositoryListing::Loading => ListingView {
                status: "loading",
                count: 0,
                error: None,
            },
            RepositoryListing::Loaded(repos) => ListingView {
                status: "loaded",
                count: repos.len(),
                error: None,
            },
            RepositoryListing::Failed(message) => ListingView {
                status: "failed",
                count: 0,
                error: Some(message.clone()),
            },
        };

        StatsSnapshot {
            username: self.owner.clone(),
            profile_url: format!("https://github.com/{}", self.owner),
            date_range: inner.date_range,
            state: inner.state,
            run_enabled: inner.run_enabled,
            run_id: inner.generation,
            repositories,
            totals: TotalsView::from(inner.totals),
            repo_stats: inner.rows.clone(),
            error: inner.error.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListingView {
    pub status: &'static str,
    pub count: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalsView {
    #[serde(flatten)]
    pub stats: AggregateStats,
    pub total_modifications: u64,
}

impl From<AggregateStats> for TotalsView {
    fn from(stats: AggregateStats) -> Self {
        Self {
            stats,
            total_modifications: stats.total_modifications(),
        }
    }
}

/// Read view handed to the presentation layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub username: String,
    pub profile_url: String,
    pub date_range: DateRange,
    pub state: RunState,
    pub run_enabled: bool,
    pub run_id: u64,
    pub repositories: ListingView,
    pub totals: TotalsView,
    pub repo_stats: Vec<RepoStat>,
    pub error: Option<String>,
}
