use chrono::{DateTime, Utc};
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::future::Future;

use crate::config::Config;
use crate::error::GitHubError;
use crate::models::{ChangeTotals, CommitRecord, RepositoryRef};

pub const REPOS_PER_PAGE: u32 = 100;
const USER_AGENT: &str = concat!("github-stats-service/", env!("CARGO_PKG_VERSION"));

/// Read-only view of the GitHub REST API used by the stats pipeline.
pub trait GitHubApi: Send + Sync + 'static {
    /// One page of `owner`'s repositories. An empty page ends the listing.
    fn repos_page(
        &self,
        owner: &str,
        page: u32,
    ) -> impl Future<Output = Result<Vec<RepositoryRef>, GitHubError>> + Send;

    fn commits(
        &self,
        owner: &str,
        repo: &str,
    ) -> impl Future<Output = Result<Vec<CommitRecord>, GitHubError>> + Send;

    fn commit_stats(
        &self,
        owner: &str,
        repo: &str,
        sha: &str,
    ) -> impl Future<Output = Result<ChangeTotals, GitHubError>> + Send;
}

pub struct GitHubClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl GitHubClient {
    pub fn new(config: &Config) -> Result<Self, GitHubError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: config.api_url.clone(),
            token: config.token.clone(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T, GitHubError> {
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GitHubError::Status { status, url });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| GitHubError::Decode {
            url,
            message: e.to_string(),
        })
    }
}

impl GitHubApi for GitHubClient {
    async fn repos_page(&self, owner: &str, page: u32) -> Result<Vec<RepositoryRef>, GitHubError> {
        let payload: Vec<RepoPayload> = self.get_json(repos_url(&self.base_url, owner, page)).await?;
        Ok(payload.into_iter().map(RepositoryRef::from).collect())
    }

    async fn commits(&self, owner: &str, repo: &str) -> Result<Vec<CommitRecord>, GitHubError> {
        let payload: Vec<CommitPayload> = self.get_json(commits_url(&self.base_url, owner, repo)).await?;
        Ok(commit_records(payload))
    }

    async fn commit_stats(&self, owner: &str, repo: &str, sha: &str) -> Result<ChangeTotals, GitHubError> {
        let payload: DetailPayload = self
            .get_json(commit_url(&self.base_url, owner, repo, sha))
            .await?;
        Ok(payload.into())
    }
}

fn repos_url(base: &str, owner: &str, page: u32) -> String {
    format!(
        "{}/users/{}/repos?type=all&per_page={}&page={}",
        base, owner, REPOS_PER_PAGE, page
    )
}

fn commits_url(base: &str, owner: &str, repo: &str) -> String {
    format!("{}/repos/{}/{}/commits", base, owner, repo)
}

fn commit_url(base: &str, owner: &str, repo: &str, sha: &str) -> String {
    format!("{}/repos/{}/{}/commits/{}", base, owner, repo, sha)
}

#[derive(Debug, Deserialize)]
struct RepoPayload {
    name: String,
    #[serde(default)]
    size: Option<u64>,
}

impl From<RepoPayload> for RepositoryRef {
    fn from(p: RepoPayload) -> Self {
        RepositoryRef {
            name: p.name,
            size: p.size,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CommitPayload {
    sha: String,
    commit: CommitBody,
}

#[derive(Debug, Deserialize)]
struct CommitBody {
    #[serde(default)]
    author: Option<CommitAuthor>,
}

#[derive(Debug, Deserialize)]
struct CommitAuthor {
    #[serde(default)]
    date: Option<DateTime<Utc>>,
}

fn commit_records(payload: Vec<CommitPayload>) -> Vec<CommitRecord> {
    payload
        .into_iter()
        .filter_map(|c| match c.commit.author.and_then(|a| a.date) {
            Some(authored_at) => Some(CommitRecord {
                sha: c.sha,
                authored_at,
            }),
            None => {
                tracing::debug!("Commit {} has no author date, skipping", c.sha);
                None
            }
        })
        .collect()
}

#[derive(Debug, Default, Deserialize)]
struct DetailPayload {
    #[serde(default)]
    stats: Option<StatsPayload>,
}

#[derive(Debug, Default, Deserialize)]
struct StatsPayload {
    #[serde(default)]
    additions: Option<u64>,
    #[serde(default)]
    deletions: Option<u64>,
}

impl From<DetailPayload> for ChangeTotals {
    fn from(p: DetailPayload) -> Self {
        let stats = p.stats.unwrap_or_default();
        ChangeTotals {
            additions: stats.additions.unwrap_or(0),
            deletions: stats.deletions.unwrap_or(0),
        }
    }
}
