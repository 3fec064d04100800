use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Id = i64;

/// The label this system attaches to issues it flags.
pub const SPAM_LABEL: &str = "spam";
pub const SPAM_LABEL_COLOR: &str = "f5222d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Label {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IssueAuthor {
    pub login: String,
}

/// An issue as returned by the external tracker. Only the fields the
/// workflow cares about; everything else upstream sends is dropped.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Issue {
    pub number: i64,
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub user: IssueAuthor,
    #[serde(default)]
    pub labels: Vec<Label>,
    pub state: IssueState,
    pub created_at: DateTime<Utc>,
}

impl Issue {
    /// Labels are a set keyed by name.
    pub fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|l| l.name == name)
    }

    /// Idempotent: applying the spam label twice leaves one entry.
    pub fn apply_spam_label(&mut self) {
        if !self.has_label(SPAM_LABEL) {
            self.labels.push(Label {
                name: SPAM_LABEL.to_string(),
                color: Some(SPAM_LABEL_COLOR.to_string()),
            });
        }
    }

    pub fn remove_spam_label(&mut self) {
        self.labels.retain(|l| l.name != SPAM_LABEL);
    }
}

/// One entry in a report's flagged-issue payload. Keyed by issue number
/// (stable per repo), not the tracker's internal id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FlaggedIssue {
    pub number: i64,
    pub username: String,
    pub label: String,
    pub state: IssueState,
}

impl FlaggedIssue {
    pub fn for_issue(issue: &Issue) -> Self {
        Self {
            number: issue.number,
            username: issue.user.login.clone(),
            label: SPAM_LABEL.to_string(),
            state: issue.state,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Report {
    #[serde(rename = "reportid")]
    pub report_id: Id,
    #[serde(rename = "creatorid")]
    pub creator_id: String,
    #[serde(rename = "repoid")]
    pub repo_id: String,
    #[serde(rename = "repoownerid")]
    pub repo_owner_id: String,
    #[serde(rename = "datecreated")]
    pub date_created: DateTime<Utc>,
    #[serde(rename = "isopen")]
    pub is_open: bool,
    #[serde(rename = "flaggedissues")]
    pub flagged_issues: Vec<FlaggedIssue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewReport {
    #[serde(rename = "creatorID")]
    pub creator_id: String,
    #[serde(rename = "repoID")]
    pub repo_id: String,
    #[serde(rename = "repoOwnerID")]
    pub repo_owner_id: String,
    #[serde(rename = "flaggedissues")]
    pub flagged_issues: Vec<FlaggedIssue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateReport {
    #[serde(rename = "flaggedissues")]
    pub flagged_issues: Option<Vec<FlaggedIssue>>,
    #[serde(rename = "isopen")]
    pub is_open: Option<bool>,
}

/// User profile keyed by the tracker's external id (kept as a string so
/// the id format stays opaque to us).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    #[serde(rename = "ID")]
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RepoOwner {
    pub id: i64,
    pub login: String,
    /// "User" or "Organization"; org-only actions check this.
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RepoMetadata {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub owner: RepoOwner,
    #[serde(default)]
    pub open_issues_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub per_page: u32,
    pub total_pages: u32,
    pub total_issues: i64,
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub next_page: Option<u32>,
    pub prev_page: Option<u32>,
}

impl Pagination {
    /// Derived from the repo's open-issue count; upstream does not send
    /// page totals on the issues listing itself.
    pub fn for_page(current_page: u32, per_page: u32, total_issues: i64) -> Self {
        let total_pages = (total_issues.max(0) as u32 + per_page - 1) / per_page;
        let has_next_page = current_page < total_pages;
        let has_previous_page = current_page > 1;
        Self {
            current_page,
            per_page,
            total_pages,
            total_issues,
            has_next_page,
            has_previous_page,
            next_page: has_next_page.then(|| current_page + 1),
            prev_page: has_previous_page.then(|| current_page - 1),
        }
    }
}

/// The working set for one (owner, repo) session.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RepoData {
    pub repo_metadata: RepoMetadata,
    pub issues: Vec<Issue>,
    pub pagination: Pagination,
}
