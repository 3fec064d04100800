use std::sync::Arc;

use actix_web::{web, HttpResponse};

use crate::auth::{maybe_token, Token};
use crate::error::ApiError;
use crate::github::{GithubClient, LabelOutcome, RepoRef};
use crate::models::*;
use crate::repo::Repo;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(
                web::resource("/github/callback").route(web::post().to(github_callback)),
            )
            .service(
                web::resource("/github/{owner}/{repo}/metadata")
                    .route(web::get().to(get_metadata)),
            )
            .service(
                web::resource("/github/{repoid}/metadata")
                    .route(web::get().to(get_metadata_by_id)),
            )
            .service(
                web::resource("/github/{owner}/{repo}/issues")
                    .route(web::get().to(list_issues)),
            )
            .service(
                web::resource("/github/{owner}/{repo}/issues/numbers")
                    .route(web::get().to(issues_by_numbers)),
            )
            .service(
                web::resource("/github/{owner}/{repo}/issues/{number}/lock")
                    .route(web::put().to(lock_issue)),
            )
            .service(
                web::resource("/github/{owner}/{repo}/issues/{number}/labels")
                    .route(web::post().to(add_labels_to_issue)),
            )
            .service(
                web::resource("/github/{owner}/{repo}/issues/{number}")
                    .route(web::patch().to(update_issue_state)),
            )
            .service(
                web::resource("/github/{owner}/{repo}/labels")
                    .route(web::post().to(create_label)),
            )
            .service(
                web::resource("/github/{org}/block/{username}")
                    .route(web::put().to(block_user))
                    .route(web::delete().to(unblock_user)),
            )
            .service(
                web::resource("/github/{owner}/{repo}/secure-main-branch")
                    .route(web::post().to(secure_main_branch)),
            )
            .service(
                web::resource("/github/{owner}/{repo}/require-pr-approvals")
                    .route(web::post().to(require_pr_approvals)),
            )
            .service(
                web::resource("/github/{owner}/{repo}/add-templates")
                    .route(web::post().to(add_templates)),
            )
            .service(web::resource("/reports").route(web::post().to(create_report)))
            .service(
                web::resource("/reports/open/{creator_id}/{repo_id}")
                    .route(web::get().to(get_open_report)),
            )
            .service(
                web::resource("/reports/{creator_id}/{repo_id}")
                    .route(web::delete().to(delete_report)),
            )
            .service(
                web::resource("/reports/{id}")
                    .route(web::get().to(get_report))
                    .route(web::put().to(update_report)),
            )
            .service(web::resource("/users").route(web::post().to(upsert_user))),
    );
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub github: GithubClient,
}

// ---------------- OAuth -----------------------------------------------

#[derive(serde::Deserialize, utoipa::ToSchema)]
pub struct CallbackRequest {
    code: String,
}

/// Exchange an OAuth code for an access token, look up the account and
/// upsert the user profile.
pub async fn github_callback(
    data: web::Data<AppState>,
    payload: web::Json<CallbackRequest>,
) -> Result<HttpResponse, ApiError> {
    let token = data.github.exchange_code(&payload.code).await.map_err(|e| {
        log::error!("OAuth exchange failed: {e}");
        ApiError::Internal
    })?;
    let account = data.github.get_authenticated_user(&token).await.map_err(|e| {
        log::error!("fetching authenticated user failed: {e}");
        ApiError::Internal
    })?;
    let user = data
        .repo
        .upsert_user(User {
            id: account.id.to_string(),
            username: account.login,
            email: account.email,
        })
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "access_token": token,
        "user": user,
    })))
}

// ---------------- GitHub proxy ----------------------------------------

#[utoipa::path(
    get,
    path = "/api/github/{owner}/{repo}/metadata",
    responses(
        (status = 200, description = "Repository metadata", body = RepoMetadata),
        (status = 404, description = "Repository not found or not visible")
    )
)]
pub async fn get_metadata(
    token: Option<Token>,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (owner, repo) = path.into_inner();
    let meta = data
        .github
        .get_metadata(&RepoRef::full(&owner, &repo), maybe_token(&token))
        .await?;
    Ok(HttpResponse::Ok().json(meta))
}

pub async fn get_metadata_by_id(
    token: Option<Token>,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let meta = data
        .github
        .get_metadata(&RepoRef::Id(path.into_inner()), maybe_token(&token))
        .await?;
    Ok(HttpResponse::Ok().json(meta))
}

#[derive(serde::Deserialize)]
pub struct PageQuery {
    page: Option<u32>,
}

#[utoipa::path(
    get,
    path = "/api/github/{owner}/{repo}/issues",
    params(("page" = Option<u32>, Query, description = "Page number, 1-based")),
    responses(
        (status = 200, description = "Open issues; page size 30 with a token, 10 without", body = [Issue])
    )
)]
pub async fn list_issues(
    token: Option<Token>,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let (owner, repo) = path.into_inner();
    let issues = data
        .github
        .list_issues(&owner, &repo, maybe_token(&token), query.page.unwrap_or(1))
        .await?;
    Ok(HttpResponse::Ok().json(issues))
}

#[derive(serde::Deserialize)]
pub struct NumbersQuery {
    numbers: Option<String>,
}

pub async fn issues_by_numbers(
    token: Option<Token>,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
    query: web::Query<NumbersQuery>,
) -> Result<HttpResponse, ApiError> {
    let (owner, repo) = path.into_inner();
    let raw = query.numbers.as_deref().ok_or(ApiError::BadRequest)?;
    let numbers: Vec<i64> = raw
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.trim().parse::<i64>())
        .collect::<Result<_, _>>()
        .map_err(|_| ApiError::BadRequest)?;
    if numbers.is_empty() {
        return Err(ApiError::BadRequest);
    }
    let issues = data
        .github
        .get_issues_by_numbers(&RepoRef::full(&owner, &repo), &numbers, maybe_token(&token))
        .await?;
    Ok(HttpResponse::Ok().json(issues))
}

#[derive(serde::Deserialize, utoipa::ToSchema)]
pub struct LockRequest {
    lock_reason: Option<String>,
}

#[utoipa::path(
    put,
    path = "/api/github/{owner}/{repo}/issues/{issue_number}/lock",
    request_body = LockRequest,
    responses(
        (status = 204, description = "Issue locked"),
        (status = 401, description = "Missing token")
    )
)]
pub async fn lock_issue(
    token: Token,
    data: web::Data<AppState>,
    path: web::Path<(String, String, i64)>,
    payload: web::Json<LockRequest>,
) -> Result<HttpResponse, ApiError> {
    let (owner, repo, number) = path.into_inner();
    let reason = payload.lock_reason.as_deref().unwrap_or("spam");
    data.github
        .lock_issue(&owner, &repo, number, reason, token.as_str())
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

#[derive(serde::Deserialize, utoipa::ToSchema)]
pub struct UpdateIssueRequest {
    state: IssueState,
}

pub async fn update_issue_state(
    token: Token,
    data: web::Data<AppState>,
    path: web::Path<(String, String, i64)>,
    payload: web::Json<UpdateIssueRequest>,
) -> Result<HttpResponse, ApiError> {
    let (owner, repo, number) = path.into_inner();
    let state = match payload.state {
        IssueState::Open => "open",
        IssueState::Closed => "closed",
    };
    data.github
        .update_issue_state(&owner, &repo, number, state, token.as_str())
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

#[derive(serde::Deserialize, utoipa::ToSchema)]
pub struct CreateLabelRequest {
    name: String,
    color: Option<String>,
    description: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/github/{owner}/{repo}/labels",
    request_body = CreateLabelRequest,
    responses(
        (status = 201, description = "Label created"),
        (status = 200, description = "Label already exists (upstream 422 folded into success)")
    )
)]
pub async fn create_label(
    token: Token,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
    payload: web::Json<CreateLabelRequest>,
) -> Result<HttpResponse, ApiError> {
    let (owner, repo) = path.into_inner();
    let outcome = data
        .github
        .create_label(
            &owner,
            &repo,
            &payload.name,
            payload.color.as_deref().unwrap_or(SPAM_LABEL_COLOR),
            payload.description.as_deref(),
            token.as_str(),
        )
        .await?;
    Ok(match outcome {
        LabelOutcome::Created => HttpResponse::Created()
            .json(serde_json::json!({ "message": "Label created" })),
        LabelOutcome::AlreadyExists => HttpResponse::Ok()
            .json(serde_json::json!({ "message": "Label already exists" })),
    })
}

#[derive(serde::Deserialize, utoipa::ToSchema)]
pub struct AddLabelsRequest {
    labels: Vec<String>,
}

pub async fn add_labels_to_issue(
    token: Token,
    data: web::Data<AppState>,
    path: web::Path<(String, String, i64)>,
    payload: web::Json<AddLabelsRequest>,
) -> Result<HttpResponse, ApiError> {
    let (owner, repo, number) = path.into_inner();
    data.github
        .add_labels_to_issue(&owner, &repo, number, &payload.labels, token.as_str())
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Labels added" })))
}

pub async fn block_user(
    token: Token,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (org, username) = path.into_inner();
    data.github.block_user(&org, &username, token.as_str()).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn unblock_user(
    token: Token,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (org, username) = path.into_inner();
    data.github.unblock_user(&org, &username, token.as_str()).await?;
    Ok(HttpResponse::NoContent().finish())
}

// ---------------- Baseline protections --------------------------------

const ISSUE_TEMPLATE_PATH: &str = ".github/ISSUE_TEMPLATE/bug_report.md";
const ISSUE_TEMPLATE: &str = "---\nname: Bug report\nabout: Create a report to help us improve\n---\n\n**Describe the bug**\n\n**To Reproduce**\n\n**Expected behavior**\n";
const PR_TEMPLATE_PATH: &str = ".github/pull_request_template.md";
const PR_TEMPLATE: &str = "## Summary\n\n## Changes\n\n## Checklist\n- [ ] Tests added\n- [ ] Documentation updated\n";

pub async fn secure_main_branch(
    token: Token,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (owner, repo) = path.into_inner();
    data.github
        .set_branch_protection(&owner, &repo, "main", None, token.as_str())
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Main branch secured" })))
}

pub async fn require_pr_approvals(
    token: Token,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (owner, repo) = path.into_inner();
    data.github
        .set_branch_protection(&owner, &repo, "main", Some(2), token.as_str())
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "PR approval rule set" })))
}

pub async fn add_templates(
    token: Token,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (owner, repo) = path.into_inner();
    data.github
        .create_or_update_file(
            &owner,
            &repo,
            ISSUE_TEMPLATE_PATH,
            ISSUE_TEMPLATE,
            "Add issue template",
            token.as_str(),
        )
        .await?;
    data.github
        .create_or_update_file(
            &owner,
            &repo,
            PR_TEMPLATE_PATH,
            PR_TEMPLATE,
            "Add pull request template",
            token.as_str(),
        )
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Templates added" })))
}

// ---------------- Reports ---------------------------------------------

#[utoipa::path(
    get,
    path = "/api/reports/{id}",
    params(("id" = Id, Path, description = "Report id")),
    responses(
        (status = 200, description = "Report", body = Report),
        (status = 400, description = "Invalid report id"),
        (status = 404, description = "Report not found")
    )
)]
pub async fn get_report(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id: Id = path.into_inner().parse().map_err(|_| ApiError::BadRequest)?;
    let report = data.repo.get_report(id).await?;
    Ok(HttpResponse::Ok().json(report))
}

#[utoipa::path(
    get,
    path = "/api/reports/open/{creatorID}/{repoID}",
    responses(
        (status = 200, description = "Open report for the pair", body = Report),
        (status = 204, description = "No open report; absence is not an error")
    )
)]
pub async fn get_open_report(
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (creator_id, repo_id) = path.into_inner();
    match data.repo.get_open_report(&creator_id, &repo_id).await? {
        Some(report) => Ok(HttpResponse::Ok().json(report)),
        None => Ok(HttpResponse::NoContent().finish()),
    }
}

#[utoipa::path(
    post,
    path = "/api/reports",
    request_body = NewReport,
    responses(
        (status = 201, description = "Report created or overwritten (upsert); returns the stable reportID")
    )
)]
pub async fn create_report(
    data: web::Data<AppState>,
    payload: web::Json<NewReport>,
) -> Result<HttpResponse, ApiError> {
    let id = data.repo.create_report(payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({
        "message": "Report saved successfully",
        "reportID": id,
    })))
}

#[utoipa::path(
    put,
    path = "/api/reports/{id}",
    request_body = UpdateReport,
    responses(
        (status = 200, description = "Updated report", body = Report),
        (status = 404, description = "Report not found")
    )
)]
pub async fn update_report(
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<UpdateReport>,
) -> Result<HttpResponse, ApiError> {
    let id: Id = path.into_inner().parse().map_err(|_| ApiError::BadRequest)?;
    let report = data.repo.update_report(id, payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(report))
}

#[utoipa::path(
    delete,
    path = "/api/reports/{creatorID}/{repoID}",
    responses(
        (status = 200, description = "Open report deleted"),
        (status = 204, description = "No open report for the pair")
    )
)]
pub async fn delete_report(
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (creator_id, repo_id) = path.into_inner();
    match data.repo.delete_open_report(&creator_id, &repo_id).await? {
        Some(id) => Ok(HttpResponse::Ok().json(serde_json::json!({ "deletedReportID": id }))),
        None => Ok(HttpResponse::NoContent().finish()),
    }
}

// ---------------- Users -----------------------------------------------

pub async fn upsert_user(
    data: web::Data<AppState>,
    payload: web::Json<User>,
) -> Result<HttpResponse, ApiError> {
    let user = data.repo.upsert_user(payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(user))
}
