//! In-memory GitHub used by the pipeline, orchestrator and route tests.

use chrono::{DateTime, TimeZone, Utc};
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use crate::error::GitHubError;
use crate::github::GitHubApi;
use crate::models::{ChangeTotals, CommitRecord, RepositoryRef};

pub fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
}

pub fn commit(sha: &str, authored_at: DateTime<Utc>) -> CommitRecord {
    CommitRecord {
        sha: sha.into(),
        authored_at,
    }
}

fn status(code: u16, url: String) -> GitHubError {
    GitHubError::Status {
        status: StatusCode::from_u16(code).unwrap(),
        url,
    }
}

#[derive(Default)]
pub struct FakeGitHub {
    pages: Vec<Vec<RepositoryRef>>,
    listing_status: Option<(u32, u16)>,
    commits: HashMap<String, Result<Vec<CommitRecord>, u16>>,
    stats: HashMap<String, Result<ChangeTotals, u16>>,
    gate: Option<Arc<Semaphore>>,
    pub commit_calls: AtomicUsize,
    pub detail_calls: AtomicUsize,
    pub requested_pages: Mutex<Vec<u32>>,
}

impl FakeGitHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, repos: Vec<RepositoryRef>) -> Self {
        self.pages.push(repos);
        self
    }

    /// Make the request for `page` fail with the given HTTP status.
    pub fn with_listing_failure(mut self, page: u32, code: u16) -> Self {
        self.listing_status = Some((page, code));
        self
    }

    pub fn with_commits(mut self, repo: &str, commits: Vec<CommitRecord>) -> Self {
        self.commits.insert(repo.into(), Ok(commits));
        self
    }

    pub fn with_commit_failure(mut self, repo: &str, code: u16) -> Self {
        self.commits.insert(repo.into(), Err(code));
        self
    }

    pub fn with_stats(mut self, sha: &str, additions: u64, deletions: u64) -> Self {
        self.stats.insert(sha.into(), Ok(ChangeTotals { additions, deletions }));
        self
    }

    pub fn with_stats_failure(mut self, sha: &str, code: u16) -> Self {
        self.stats.insert(sha.into(), Err(code));
        self
    }

    /// Every commit listing holds a permit from `gate` while answering, so a
    /// gate with no permits parks the run until the test adds some.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn commit_calls(&self) -> usize {
        self.commit_calls.load(Ordering::SeqCst)
    }

    pub fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }
}

impl GitHubApi for FakeGitHub {
    async fn repos_page(&self, owner: &str, page: u32) -> Result<Vec<RepositoryRef>, GitHubError> {
        self.requested_pages.lock().unwrap().push(page);
        if let Some((failing, code)) = self.listing_status {
            if failing == page {
                return Err(status(code, format!("/users/{}/repos?page={}", owner, page)));
            }
        }
        Ok(self
            .pages
            .get(page as usize - 1)
            .cloned()
            .unwrap_or_default())
    }

    async fn commits(&self, owner: &str, repo: &str) -> Result<Vec<CommitRecord>, GitHubError> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        let _permit = match &self.gate {
            Some(gate) => Some(gate.acquire().await.unwrap()),
            None => None,
        };
        match self.commits.get(repo) {
            Some(Ok(commits)) => Ok(commits.clone()),
            Some(Err(code)) => Err(status(*code, format!("/repos/{}/{}/commits", owner, repo))),
            None => Ok(Vec::new()),
        }
    }

    async fn commit_stats(&self, owner: &str, repo: &str, sha: &str) -> Result<ChangeTotals, GitHubError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        match self.stats.get(sha) {
            Some(Ok(totals)) => Ok(*totals),
            Some(Err(code)) => Err(status(
                *code,
                format!("/repos/{}/{}/commits/{}", owner, repo, sha),
            )),
            None => Ok(ChangeTotals::default()),
        }
    }
}
