use reqwest::StatusCode;
use thiserror::Error;

/// A single GitHub API request that did not produce a usable body.
#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{url} returned {status}")]
    Status { status: StatusCode, url: String },

    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl GitHubError {
    /// GitHub answers 409 for repositories with no commit history.
    pub fn is_conflict(&self) -> bool {
        matches!(self, GitHubError::Status { status, .. } if *status == StatusCode::CONFLICT)
    }
}

/// Pipeline-level failures. Only `Listing` escapes to callers; the other
/// variants are recovered per repository and logged.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to list repositories for {owner} (page {page}): {source}")]
    Listing {
        owner: String,
        page: u32,
        #[source]
        source: GitHubError,
    },

    #[error("failed to list commits for {repo}: {source}")]
    Commits {
        repo: String,
        #[source]
        source: GitHubError,
    },

    #[error("failed to fetch commit {sha} in {repo}: {source}")]
    Detail {
        repo: String,
        sha: String,
        #[source]
        source: GitHubError,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TriggerError {
    #[error("repository list is not loaded")]
    RepositoriesNotLoaded,

    #[error("both start and end dates must be set")]
    DateRangeIncomplete,
}
