//! Cleanup-report summary: aggregate statistics over a flagged issue set
//! plus the downloadable text/markdown renderings.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::models::{Issue, SPAM_LABEL};

pub struct ReportSummary {
    spam_issues: Vec<Issue>,
    total_issues: usize,
}

impl ReportSummary {
    pub fn from_issues(issues: &[Issue]) -> Self {
        Self {
            spam_issues: issues
                .iter()
                .filter(|i| i.has_label(SPAM_LABEL))
                .cloned()
                .collect(),
            total_issues: issues.len(),
        }
    }

    pub fn spam_count(&self) -> usize {
        self.spam_issues.len()
    }

    pub fn total_issues(&self) -> usize {
        self.total_issues
    }

    pub fn spam_ratio(&self) -> f64 {
        if self.total_issues == 0 {
            return 0.0;
        }
        self.spam_count() as f64 / self.total_issues as f64 * 100.0
    }

    /// Top-10 labels co-occurring with spam, most frequent first.
    pub fn label_distribution(&self) -> Vec<(String, usize)> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for issue in &self.spam_issues {
            for label in &issue.labels {
                if label.name != SPAM_LABEL {
                    *counts.entry(label.name.clone()).or_default() += 1;
                }
            }
        }
        let mut out: Vec<(String, usize)> = counts.into_iter().collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out.truncate(10);
        out
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for issue in &self.spam_issues {
            let labels: Vec<&str> = issue.labels.iter().map(|l| l.name.as_str()).collect();
            let _ = write!(
                out,
                "Title: {}\nBody: {}\nUsername: {}\nDate: {}\nIssue Number: {}\nLabels: {}\n\n",
                issue.title,
                issue.body.as_deref().unwrap_or(""),
                issue.user.login,
                issue.created_at,
                issue.number,
                labels.join(", "),
            );
        }
        out
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::from("# Spam Issues Report\n\n## Summary\n");
        let _ = write!(
            out,
            "- Total Issues: {}\n- Spam Issues: {}\n- Spam Ratio: {:.2}%\n",
            self.total_issues(),
            self.spam_count(),
            self.spam_ratio(),
        );
        out.push_str("\n## Label Distribution (Top 10)\n");
        for (label, count) in self.label_distribution() {
            let _ = writeln!(out, "- {label}: {count}");
        }
        out.push_str("\n## Detailed Spam Issues\n");
        for issue in &self.spam_issues {
            let labels: Vec<&str> = issue.labels.iter().map(|l| l.name.as_str()).collect();
            let _ = write!(
                out,
                "\n### Issue #{}: {}\n- **ID**: {}\n- **Username**: {}\n- **Date**: {}\n- **Labels**: {}\n- **Body**: {}\n",
                issue.number,
                issue.title,
                issue.id,
                issue.user.login,
                issue.created_at,
                labels.join(", "),
                issue.body.as_deref().unwrap_or(""),
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IssueAuthor, IssueState, Label};
    use chrono::Utc;

    fn issue(number: i64, labels: &[&str]) -> Issue {
        Issue {
            number,
            id: number,
            title: format!("issue {number}"),
            body: Some("body".into()),
            user: IssueAuthor { login: "mallory".into() },
            labels: labels
                .iter()
                .map(|n| Label { name: n.to_string(), color: None })
                .collect(),
            state: IssueState::Open,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn counts_and_ratio() {
        let issues = vec![
            issue(1, &["spam", "bug"]),
            issue(2, &["spam"]),
            issue(3, &["feature"]),
            issue(4, &[]),
        ];
        let s = ReportSummary::from_issues(&issues);
        assert_eq!(s.spam_count(), 2);
        assert_eq!(s.total_issues(), 4);
        assert!((s.spam_ratio() - 50.0).abs() < f64::EPSILON);
        assert_eq!(s.label_distribution(), vec![("bug".to_string(), 1)]);
    }

    #[test]
    fn empty_set_has_zero_ratio() {
        let s = ReportSummary::from_issues(&[]);
        assert_eq!(s.spam_ratio(), 0.0);
    }

    #[test]
    fn markdown_includes_summary_and_details() {
        let issues = vec![issue(7, &["spam"])];
        let md = ReportSummary::from_issues(&issues).to_markdown();
        assert!(md.contains("# Spam Issues Report"));
        assert!(md.contains("- Spam Issues: 1"));
        assert!(md.contains("### Issue #7: issue 7"));
        let txt = ReportSummary::from_issues(&issues).to_text();
        assert!(txt.contains("Issue Number: 7"));
    }
}
