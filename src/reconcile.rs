//! The report reconciliation workflow: aligns a persisted report's
//! flagged-issue list with issues fetched from the external tracker and
//! propagates user actions back to both systems.

use std::collections::HashSet;
use std::sync::Arc;

use crate::cache::IssueCache;
use crate::github::{GithubClient, GithubError, RepoRef, PER_PAGE_ANONYMOUS, PER_PAGE_AUTHENTICATED};
use crate::models::*;
use crate::repo::{Repo, RepoError};

#[derive(Debug, Clone)]
pub struct CurrentUser {
    /// External tracker id, stringified (matches `Report::creator_id`).
    pub id: String,
    pub login: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseStep {
    Lock,
    CloseState,
    EnsureLabel,
    ApplyLabel,
}

/// The close-issue sequence has no automatic compensation; on failure
/// the caller sees exactly which steps already completed.
#[derive(thiserror::Error, Debug)]
#[error("close-issue stopped at {step:?} (completed: {completed:?}): {source}")]
pub struct CloseIssueError {
    pub step: CloseStep,
    pub completed: Vec<CloseStep>,
    #[source]
    pub source: GithubError,
}

#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error("authentication required")] Unauthenticated,
    #[error("permission denied")] Forbidden,
    #[error("no repository loaded")] NoRepo,
    #[error("no open report")] NoReport,
    #[error(transparent)] Github(#[from] GithubError),
    #[error(transparent)] Store(#[from] RepoError),
    #[error(transparent)] Close(#[from] Box<CloseIssueError>),
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

#[derive(Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Report created or overwritten; carries the (stable) report id.
    Saved(Id),
    /// Empty payload with an existing open report: delete-on-empty.
    Deleted(Id),
    /// Empty payload and nothing persisted: no-op.
    Nothing,
}

/// Issues partitioned for display after reconciliation.
#[derive(Debug, Default)]
pub struct IssueViews {
    pub spam_open: Vec<Issue>,
    pub spam_closed: Vec<Issue>,
    pub unflagged: Vec<Issue>,
}

pub struct ReconcileSession {
    github: GithubClient,
    store: Arc<dyn Repo>,
    token: Option<String>,
    current_user: Option<CurrentUser>,
    cache: IssueCache,
    metadata: Option<RepoMetadata>,
    page: u32,
    report: Option<Report>,
    /// UI state only; never persisted in the report schema.
    blocked: HashSet<String>,
}

impl ReconcileSession {
    pub fn new(
        github: GithubClient,
        store: Arc<dyn Repo>,
        token: Option<String>,
        current_user: Option<CurrentUser>,
    ) -> Self {
        Self {
            github,
            store,
            token,
            current_user,
            cache: IssueCache::new(),
            metadata: None,
            page: 1,
            report: None,
            blocked: HashSet::new(),
        }
    }

    fn per_page(&self) -> u32 {
        if self.token.is_some() { PER_PAGE_AUTHENTICATED } else { PER_PAGE_ANONYMOUS }
    }

    fn owner_repo(&self) -> WorkflowResult<(String, String)> {
        let meta = self.metadata.as_ref().ok_or(WorkflowError::NoRepo)?;
        Ok((meta.owner.login.clone(), meta.name.clone()))
    }

    /// `currentUser != None && (user == report creator || user == repo owner)`.
    pub fn has_edit_permission(&self) -> bool {
        let Some(user) = &self.current_user else { return false };
        let is_creator = self
            .report
            .as_ref()
            .map(|r| r.creator_id == user.id)
            .unwrap_or(false);
        is_creator || self.is_repo_owner()
    }

    pub fn is_repo_owner(&self) -> bool {
        match (&self.current_user, &self.metadata) {
            (Some(user), Some(meta)) => meta.owner.id.to_string() == user.id,
            _ => false,
        }
    }

    pub fn report(&self) -> Option<&Report> {
        self.report.as_ref()
    }

    pub fn blocked_usernames(&self) -> &HashSet<String> {
        &self.blocked
    }

    /// Load one page of the working set and reconcile any open report
    /// against it.
    pub async fn load(&mut self, owner: &str, repo: &str, page: u32) -> WorkflowResult<RepoData> {
        let switched = self.cache.activate(owner, repo);
        if switched || self.metadata.is_none() {
            let meta = self
                .github
                .get_metadata(&RepoRef::full(owner, repo), self.token.as_deref())
                .await?;
            self.metadata = Some(meta);
            self.report = None;
            self.blocked.clear();
        }

        if self.cache.page(page).is_none() {
            let issues = self
                .github
                .list_issues(owner, repo, self.token.as_deref(), page)
                .await?;
            self.cache.insert_page(page, issues);
        }
        self.page = page;

        if let (Some(user), Some(meta)) = (&self.current_user, &self.metadata) {
            if self.report.is_none() {
                self.report = self
                    .store
                    .get_open_report(&user.id, &meta.id.to_string())
                    .await?;
            }
        }

        self.reconcile_report(owner, repo).await?;
        self.repo_data()
    }

    /// Map each flagged issue onto a cached issue; anything missing
    /// (closed, or on an unfetched page) is backfilled by number.
    async fn reconcile_report(&mut self, owner: &str, repo: &str) -> WorkflowResult<()> {
        let Some(report) = self.report.clone() else { return Ok(()) };

        let mut missing = Vec::new();
        for flagged in &report.flagged_issues {
            if self.cache.contains_issue(flagged.number) {
                let state = flagged.state;
                self.cache.update_issue(flagged.number, |issue| {
                    issue.apply_spam_label();
                    issue.state = state;
                });
            } else {
                missing.push(flagged.number);
            }
        }

        if !missing.is_empty() {
            // All-or-nothing fetch; a single failure aborts the load.
            let mut fetched = self
                .github
                .get_issues_by_numbers(&RepoRef::full(owner, repo), &missing, self.token.as_deref())
                .await?;
            for issue in &mut fetched {
                if let Some(flagged) = report.flagged_issues.iter().find(|f| f.number == issue.number)
                {
                    issue.apply_spam_label();
                    issue.state = flagged.state;
                }
            }
            self.cache.merge_extra(fetched);
        }
        Ok(())
    }

    fn repo_data(&self) -> WorkflowResult<RepoData> {
        let meta = self.metadata.clone().ok_or(WorkflowError::NoRepo)?;
        let mut issues: Vec<Issue> = self
            .cache
            .page(self.page)
            .map(|p| p.to_vec())
            .unwrap_or_default();
        // Spam-flagged first; sort_by_key is stable so upstream order
        // breaks ties.
        issues.sort_by_key(|i| !i.has_label(SPAM_LABEL));
        let pagination = Pagination::for_page(self.page, self.per_page(), meta.open_issues_count);
        Ok(RepoData { repo_metadata: meta, issues, pagination })
    }

    /// Partition everything seen so far into spam-open / spam-closed /
    /// unflagged views.
    pub fn views(&self) -> IssueViews {
        let mut views = IssueViews::default();
        for issue in self.cache.all_issues() {
            if !issue.has_label(SPAM_LABEL) {
                views.unflagged.push(issue);
            } else if issue.state == IssueState::Closed {
                views.spam_closed.push(issue);
            } else {
                views.spam_open.push(issue);
            }
        }
        views
    }

    /// Local-only staging step: toggles the in-memory spam label; no
    /// external call until `save_report`. Returns whether the issue is
    /// flagged afterwards; a number absent from the cache is a no-op.
    pub fn toggle_spam(&mut self, number: i64) -> bool {
        let Some(flagged) = self
            .cache
            .all_issues()
            .iter()
            .find(|i| i.number == number)
            .map(|i| i.has_label(SPAM_LABEL))
        else {
            return false;
        };
        if flagged {
            self.cache.update_issue(number, |i| i.remove_spam_label());
        } else {
            self.cache.update_issue(number, |i| i.apply_spam_label());
        }
        !flagged
    }

    /// Persist the current spam-labeled set. An empty set with an open
    /// report means "no report": delete it.
    pub async fn save_report(&mut self) -> WorkflowResult<SaveOutcome> {
        let user = self.current_user.clone().ok_or(WorkflowError::Unauthenticated)?;
        let meta = self.metadata.clone().ok_or(WorkflowError::NoRepo)?;

        let mut seen = HashSet::new();
        let flagged: Vec<FlaggedIssue> = self
            .cache
            .all_issues()
            .iter()
            .filter(|i| i.has_label(SPAM_LABEL) && seen.insert(i.number))
            .map(FlaggedIssue::for_issue)
            .collect();

        if flagged.is_empty() {
            if self.report.as_ref().map(|r| r.is_open).unwrap_or(false) {
                let deleted = self
                    .store
                    .delete_open_report(&user.id, &meta.id.to_string())
                    .await?;
                self.report = None;
                if let Some(id) = deleted {
                    return Ok(SaveOutcome::Deleted(id));
                }
            }
            return Ok(SaveOutcome::Nothing);
        }

        let id = self
            .store
            .create_report(NewReport {
                creator_id: user.id.clone(),
                repo_id: meta.id.to_string(),
                repo_owner_id: meta.owner.id.to_string(),
                flagged_issues: flagged,
            })
            .await?;
        self.report = Some(self.store.get_report(id).await?);
        Ok(SaveOutcome::Saved(id))
    }

    /// Lock-as-spam: lock, close, ensure the spam label exists, attach
    /// it. Strictly sequential; later steps depend on earlier ones. No
    /// rollback of completed steps.
    pub async fn close_issue(&mut self, number: i64) -> WorkflowResult<()> {
        if !self.has_edit_permission() {
            return Err(WorkflowError::Forbidden);
        }
        let token = self.token.clone().ok_or(WorkflowError::Unauthenticated)?;
        let (owner, repo) = self.owner_repo()?;
        let report = self.report.clone().ok_or(WorkflowError::NoReport)?;

        let mut completed = Vec::new();
        let step = |step: CloseStep, completed: &[CloseStep]| {
            let completed = completed.to_vec();
            move |source: GithubError| Box::new(CloseIssueError { step, completed, source })
        };

        self.github
            .lock_issue(&owner, &repo, number, "spam", &token)
            .await
            .map_err(step(CloseStep::Lock, &completed))?;
        completed.push(CloseStep::Lock);

        self.github
            .update_issue_state(&owner, &repo, number, "closed", &token)
            .await
            .map_err(step(CloseStep::CloseState, &completed))?;
        completed.push(CloseStep::CloseState);

        self.github
            .create_label(
                &owner,
                &repo,
                SPAM_LABEL,
                SPAM_LABEL_COLOR,
                Some("Issues flagged as spam"),
                &token,
            )
            .await
            .map_err(step(CloseStep::EnsureLabel, &completed))?;
        completed.push(CloseStep::EnsureLabel);

        self.github
            .add_labels_to_issue(&owner, &repo, number, &[SPAM_LABEL.to_string()], &token)
            .await
            .map_err(step(CloseStep::ApplyLabel, &completed))?;

        self.cache.update_issue(number, |issue| {
            issue.state = IssueState::Closed;
            issue.apply_spam_label();
        });

        let mut flagged = report.flagged_issues.clone();
        match flagged.iter_mut().find(|f| f.number == number) {
            Some(entry) => entry.state = IssueState::Closed,
            None => {
                if let Some(issue) = self.cache.all_issues().iter().find(|i| i.number == number) {
                    flagged.push(FlaggedIssue::for_issue(issue));
                }
            }
        }
        let updated = self
            .store
            .update_report(
                report.report_id,
                UpdateReport { flagged_issues: Some(flagged), is_open: None },
            )
            .await?;
        self.report = Some(updated);
        Ok(())
    }

    /// Remove an issue from the report. The only action with explicit
    /// compensation: a persistence failure rolls back the in-memory
    /// removal.
    pub async fn unflag_issue(&mut self, number: i64) -> WorkflowResult<()> {
        if !self.has_edit_permission() {
            return Err(WorkflowError::Forbidden);
        }
        let report = self.report.as_mut().ok_or(WorkflowError::NoReport)?;
        let Some(pos) = report.flagged_issues.iter().position(|f| f.number == number) else {
            return Ok(());
        };
        let removed = report.flagged_issues.remove(pos);
        let report_id = report.report_id;
        let payload = report.flagged_issues.clone();
        self.cache.update_issue(number, |i| i.remove_spam_label());

        match self
            .store
            .update_report(report_id, UpdateReport { flagged_issues: Some(payload), is_open: None })
            .await
        {
            Ok(updated) => {
                self.report = Some(updated);
                Ok(())
            }
            Err(e) => {
                if let Some(r) = self.report.as_mut() {
                    let at = pos.min(r.flagged_issues.len());
                    r.flagged_issues.insert(at, removed);
                }
                self.cache.update_issue(number, |i| i.apply_spam_label());
                Err(e.into())
            }
        }
    }

    pub async fn block_user(&mut self, username: &str) -> WorkflowResult<()> {
        if !self.is_repo_owner() {
            return Err(WorkflowError::Forbidden);
        }
        let token = self.token.clone().ok_or(WorkflowError::Unauthenticated)?;
        let (org, _) = self.owner_repo()?;
        self.github.block_user(&org, username, &token).await?;
        self.blocked.insert(username.to_string());
        Ok(())
    }

    pub async fn unblock_user(&mut self, username: &str) -> WorkflowResult<()> {
        if !self.is_repo_owner() {
            return Err(WorkflowError::Forbidden);
        }
        let token = self.token.clone().ok_or(WorkflowError::Unauthenticated)?;
        let (org, _) = self.owner_repo()?;
        self.github.unblock_user(&org, username, &token).await?;
        self.blocked.remove(username);
        Ok(())
    }

    /// One-way transition; there is no reopen operation.
    pub async fn close_report(&mut self) -> WorkflowResult<()> {
        if !self.has_edit_permission() {
            return Err(WorkflowError::Forbidden);
        }
        let report = self.report.as_ref().ok_or(WorkflowError::NoReport)?;
        let updated = self
            .store
            .update_report(
                report.report_id,
                UpdateReport { flagged_issues: None, is_open: Some(false) },
            )
            .await?;
        self.report = Some(updated);
        Ok(())
    }
}
