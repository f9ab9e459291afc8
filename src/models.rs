use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A repository to analyze. Configured private repositories have no known
/// size and are never skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub name: String,
    pub size: Option<u64>,
}

impl RepositoryRef {
    pub fn public(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size: Some(size),
        }
    }

    pub fn private(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
        }
    }

    /// Only a known size of zero marks a repository as empty.
    pub fn is_known_empty(&self) -> bool {
        self.size == Some(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub sha: String,
    pub authored_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeTotals {
    pub additions: u64,
    pub deletions: u64,
}

impl ChangeTotals {
    pub fn is_zero(&self) -> bool {
        self.additions == 0 && self.deletions == 0
    }
}

impl std::ops::Add for ChangeTotals {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            additions: self.additions + rhs.additions,
            deletions: self.deletions + rhs.deletions,
        }
    }
}

impl std::iter::Sum for ChangeTotals {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |acc, t| acc + t)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoStat {
    pub repo_name: String,
    pub total_changes: ChangeTotals,
    #[serde(rename = "commits")]
    pub commit_count: u64,
}

impl RepoStat {
    pub fn empty(repo_name: impl Into<String>) -> Self {
        Self {
            repo_name: repo_name.into(),
            total_changes: ChangeTotals::default(),
            commit_count: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStats {
    pub total_additions: u64,
    pub total_deletions: u64,
    pub total_commits: u64,
    pub total_repos: u64,
}

impl AggregateStats {
    /// Sums additions, deletions and commits over every analyzed repository,
    /// while `total_repos` counts only the rows that are displayed.
    pub fn from_rows(all: &[RepoStat], displayed: &[RepoStat]) -> Self {
        let changes: ChangeTotals = all.iter().map(|r| r.total_changes).sum();
        Self {
            total_additions: changes.additions,
            total_deletions: changes.deletions,
            total_commits: all.iter().map(|r| r.commit_count).sum(),
            total_repos: displayed.len() as u64,
        }
    }

    pub fn total_modifications(&self) -> u64 {
        self.total_additions + self.total_deletions
    }
}

/// Inclusive date bounds for commit filtering. A missing bound does not
/// constrain that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    /// The year leading up to `today`, both ends included.
    pub fn last_year(today: NaiveDate) -> Self {
        let start = today.checked_sub_months(Months::new(12)).unwrap_or(today);
        Self::new(Some(start), Some(today))
    }

    pub fn is_complete(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }

    pub fn contains(&self, at: &DateTime<Utc>) -> bool {
        let day = at.date_naive();
        if let Some(start) = self.start {
            if day < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if day > end {
                return false;
            }
        }
        true
    }
}

impl Default for DateRange {
    fn default() -> Self {
        Self::last_year(Utc::now().date_naive())
    }
}
