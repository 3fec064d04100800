use std::collections::BTreeMap;

use crate::models::Issue;

/// Per-session page cache for one (owner, repo) working set. Switching
/// repos discards everything; refetching a page overwrites its entry.
/// No time-based invalidation.
#[derive(Default)]
pub struct IssueCache {
    key: Option<(String, String)>,
    pages: BTreeMap<u32, Vec<Issue>>,
    /// Issues backfilled individually by number (closed, or on a page we
    /// never fetched). They live outside any page slot.
    extra: Vec<Issue>,
}

impl IssueCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `(owner, repo)` the active working set. Returns true when the
    /// previous contents were discarded because the target changed.
    pub fn activate(&mut self, owner: &str, repo: &str) -> bool {
        let key = (owner.to_string(), repo.to_string());
        if self.key.as_ref() == Some(&key) {
            return false;
        }
        self.pages.clear();
        self.extra.clear();
        self.key = Some(key);
        true
    }

    pub fn page(&self, page: u32) -> Option<&[Issue]> {
        self.pages.get(&page).map(Vec::as_slice)
    }

    pub fn insert_page(&mut self, page: u32, issues: Vec<Issue>) {
        self.pages.insert(page, issues);
    }

    pub fn merge_extra(&mut self, issues: Vec<Issue>) {
        self.extra.extend(issues);
    }

    /// Flattens all cached pages in page-ascending order, then the
    /// backfilled extras. No duplicate suppression by issue number:
    /// upstream reordering can move an issue between pages, and callers
    /// must tolerate the resulting duplicates.
    pub fn all_issues(&self) -> Vec<Issue> {
        self.pages
            .values()
            .flatten()
            .chain(self.extra.iter())
            .cloned()
            .collect()
    }

    pub fn contains_issue(&self, number: i64) -> bool {
        self.pages
            .values()
            .flatten()
            .chain(self.extra.iter())
            .any(|i| i.number == number)
    }

    /// Apply a mutation to every cached copy of issue `number`.
    pub fn update_issue<F>(&mut self, number: i64, mut f: F)
    where
        F: FnMut(&mut Issue),
    {
        for issue in self
            .pages
            .values_mut()
            .flatten()
            .chain(self.extra.iter_mut())
            .filter(|i| i.number == number)
        {
            f(issue);
        }
    }
}
