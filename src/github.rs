use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::json;

use base64::Engine as _;

use crate::models::Issue;

/// Page size policy: anonymous callers are throttled to smaller pages.
pub const PER_PAGE_AUTHENTICATED: u32 = 30;
pub const PER_PAGE_ANONYMOUS: u32 = 10;

static HTTP: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent("repocleanup")
        .build()
        .expect("reqwest client")
});

#[derive(thiserror::Error, Debug)]
pub enum GithubError {
    #[error("authorization required")] Unauthorized,
    #[error("not found")] NotFound,
    #[error("invalid request: {0}")] Validation(String),
    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("transport error: {0}")] Transport(#[from] reqwest::Error),
}

pub type GithubResult<T> = Result<T, GithubError>;

/// A repository addressed either by owner/name or by its numeric id.
/// Upstream exposes both shapes; flagged-issue backfill uses whichever
/// the report stored.
#[derive(Debug, Clone)]
pub enum RepoRef {
    Full { owner: String, repo: String },
    Id(String),
}

impl RepoRef {
    pub fn full(owner: &str, repo: &str) -> Self {
        RepoRef::Full { owner: owner.to_string(), repo: repo.to_string() }
    }

    fn api_path(&self) -> String {
        match self {
            RepoRef::Full { owner, repo } => format!("repos/{owner}/{repo}"),
            RepoRef::Id(id) => format!("repositories/{id}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubAccount {
    pub id: i64,
    pub login: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum LabelOutcome {
    Created,
    AlreadyExists,
}

/// Thin pass-through client for the external issue tracker's REST API.
/// No retries anywhere: a failed call is reported to the caller as-is.
#[derive(Clone)]
pub struct GithubClient {
    api_base: String,
    oauth_base: String,
    client_id: Option<String>,
    client_secret: Option<String>,
}

impl GithubClient {
    pub fn new(api_base: impl Into<String>, oauth_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            oauth_base: oauth_base.into(),
            client_id: None,
            client_secret: None,
        }
    }

    /// Base URLs are overridable so tests can point at a mock server.
    pub fn from_env() -> Self {
        Self {
            api_base: std::env::var("GITHUB_API_BASE")
                .unwrap_or_else(|_| "https://api.github.com".to_string()),
            oauth_base: std::env::var("GITHUB_OAUTH_BASE")
                .unwrap_or_else(|_| "https://github.com".to_string()),
            client_id: std::env::var("GITHUB_CLIENT_ID").ok(),
            client_secret: std::env::var("GITHUB_CLIENT_SECRET").ok(),
        }
    }

    pub fn with_app_credentials(mut self, id: &str, secret: &str) -> Self {
        self.client_id = Some(id.to_string());
        self.client_secret = Some(secret.to_string());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    /// End-user token if present, else the app-level credential for
    /// public read access, else fully anonymous.
    fn authed(&self, rb: reqwest::RequestBuilder, token: Option<&str>) -> reqwest::RequestBuilder {
        match token {
            Some(t) => rb.header("Authorization", format!("token {t}")),
            None => match (&self.client_id, &self.client_secret) {
                (Some(id), Some(secret)) => rb.basic_auth(id, Some(secret)),
                _ => rb,
            },
        }
    }

    async fn check(resp: reqwest::Response) -> GithubResult<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        match status.as_u16() {
            401 => Err(GithubError::Unauthorized),
            404 => Err(GithubError::NotFound),
            s => {
                let message = resp.text().await.unwrap_or_default();
                Err(GithubError::Upstream { status: s, message })
            }
        }
    }

    pub async fn get_metadata(
        &self,
        repo: &RepoRef,
        token: Option<&str>,
    ) -> GithubResult<crate::models::RepoMetadata> {
        let rb = HTTP.get(self.url(&repo.api_path()));
        let resp = Self::check(self.authed(rb, token).send().await?).await?;
        Ok(resp.json().await?)
    }

    /// Only `state=open` issues; closed issues are fetched individually
    /// by number when a report references them.
    pub async fn list_issues(
        &self,
        owner: &str,
        repo: &str,
        token: Option<&str>,
        page: u32,
    ) -> GithubResult<Vec<Issue>> {
        let per_page = if token.is_some() { PER_PAGE_AUTHENTICATED } else { PER_PAGE_ANONYMOUS };
        let rb = HTTP
            .get(self.url(&format!("repos/{owner}/{repo}/issues")))
            .query(&[
                ("state", "open".to_string()),
                ("per_page", per_page.to_string()),
                ("page", page.to_string()),
            ]);
        let resp = Self::check(self.authed(rb, token).send().await?).await?;
        Ok(resp.json().await?)
    }

    pub async fn get_issue(
        &self,
        repo: &RepoRef,
        number: i64,
        token: Option<&str>,
    ) -> GithubResult<Issue> {
        let rb = HTTP.get(self.url(&format!("{}/issues/{number}", repo.api_path())));
        let resp = Self::check(self.authed(rb, token).send().await?).await?;
        Ok(resp.json().await?)
    }

    /// Sequential fetch, results in input order. All-or-nothing: any
    /// single failure fails the whole batch.
    pub async fn get_issues_by_numbers(
        &self,
        repo: &RepoRef,
        numbers: &[i64],
        token: Option<&str>,
    ) -> GithubResult<Vec<Issue>> {
        let mut issues = Vec::with_capacity(numbers.len());
        for &n in numbers {
            issues.push(self.get_issue(repo, n, token).await?);
        }
        Ok(issues)
    }

    pub async fn update_issue_state(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
        state: &str,
        token: &str,
    ) -> GithubResult<()> {
        let rb = HTTP
            .patch(self.url(&format!("repos/{owner}/{repo}/issues/{number}")))
            .json(&json!({ "state": state }));
        Self::check(self.authed(rb, Some(token)).send().await?).await?;
        Ok(())
    }

    pub async fn lock_issue(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
        reason: &str,
        token: &str,
    ) -> GithubResult<()> {
        let rb = HTTP
            .put(self.url(&format!("repos/{owner}/{repo}/issues/{number}/lock")))
            .json(&json!({ "lock_reason": reason }));
        Self::check(self.authed(rb, Some(token)).send().await?).await?;
        Ok(())
    }

    /// A 422 "already exists" from upstream is success, not an error.
    pub async fn create_label(
        &self,
        owner: &str,
        repo: &str,
        name: &str,
        color: &str,
        description: Option<&str>,
        token: &str,
    ) -> GithubResult<LabelOutcome> {
        let rb = HTTP
            .post(self.url(&format!("repos/{owner}/{repo}/labels")))
            .json(&json!({ "name": name, "color": color, "description": description }));
        let resp = self.authed(rb, Some(token)).send().await?;
        if resp.status().as_u16() == 422 {
            return Ok(LabelOutcome::AlreadyExists);
        }
        Self::check(resp).await?;
        Ok(LabelOutcome::Created)
    }

    pub async fn add_labels_to_issue(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
        labels: &[String],
        token: &str,
    ) -> GithubResult<()> {
        let rb = HTTP
            .post(self.url(&format!("repos/{owner}/{repo}/issues/{number}/labels")))
            .json(&json!({ "labels": labels }));
        Self::check(self.authed(rb, Some(token)).send().await?).await?;
        Ok(())
    }

    /// Fixed baseline policy: enforce on admins, linear history, no
    /// force-pushes or deletion. `required_approvals` adds a PR review
    /// rule on top.
    pub async fn set_branch_protection(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        required_approvals: Option<u8>,
        token: &str,
    ) -> GithubResult<()> {
        let reviews = required_approvals
            .map(|n| json!({ "required_approving_review_count": n }))
            .unwrap_or(serde_json::Value::Null);
        let rb = HTTP
            .put(self.url(&format!("repos/{owner}/{repo}/branches/{branch}/protection")))
            .json(&json!({
                "required_status_checks": null,
                "enforce_admins": true,
                "required_pull_request_reviews": reviews,
                "restrictions": null,
                "required_linear_history": true,
                "allow_force_pushes": false,
                "allow_deletions": false,
            }));
        Self::check(self.authed(rb, Some(token)).send().await?).await?;
        Ok(())
    }

    pub async fn create_or_update_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        content: &str,
        message: &str,
        token: &str,
    ) -> GithubResult<()> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(content);
        let rb = HTTP
            .put(self.url(&format!("repos/{owner}/{repo}/contents/{path}")))
            .json(&json!({ "message": message, "content": encoded }));
        Self::check(self.authed(rb, Some(token)).send().await?).await?;
        Ok(())
    }

    pub async fn block_user(&self, org: &str, username: &str, token: &str) -> GithubResult<()> {
        let rb = HTTP.put(self.url(&format!(
            "orgs/{org}/blocks/{}",
            urlencoding::encode(username)
        )));
        Self::check(self.authed(rb, Some(token)).send().await?).await?;
        Ok(())
    }

    pub async fn unblock_user(&self, org: &str, username: &str, token: &str) -> GithubResult<()> {
        let rb = HTTP.delete(self.url(&format!(
            "orgs/{org}/blocks/{}",
            urlencoding::encode(username)
        )));
        Self::check(self.authed(rb, Some(token)).send().await?).await?;
        Ok(())
    }

    /// Exchange an OAuth code for an access token.
    pub async fn exchange_code(&self, code: &str) -> GithubResult<String> {
        let (client_id, client_secret) = match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) => (id, secret),
            _ => {
                return Err(GithubError::Validation(
                    "OAuth app credentials not configured".to_string(),
                ))
            }
        };
        let resp = HTTP
            .post(format!("{}/login/oauth/access_token", self.oauth_base))
            .header("Accept", "application/json")
            .json(&json!({
                "client_id": client_id,
                "client_secret": client_secret,
                "code": code,
            }))
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        let body: AccessTokenResponse = resp.json().await?;
        body.access_token.ok_or(GithubError::Upstream {
            status: 500,
            message: "no access_token in OAuth response".to_string(),
        })
    }

    pub async fn get_authenticated_user(&self, token: &str) -> GithubResult<GithubAccount> {
        let rb = HTTP.get(self.url("user"));
        let resp = Self::check(self.authed(rb, Some(token)).send().await?).await?;
        Ok(resp.json().await?)
    }
}
