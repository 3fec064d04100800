use crate::models::{
    FlaggedIssue, Issue, IssueAuthor, IssueState, Label, NewReport, Pagination, RepoData,
    RepoMetadata, RepoOwner, Report, UpdateReport, User,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::get_metadata,
        crate::routes::list_issues,
        crate::routes::lock_issue,
        crate::routes::create_label,
        crate::routes::get_report,
        crate::routes::get_open_report,
        crate::routes::create_report,
        crate::routes::update_report,
        crate::routes::delete_report,
    ),
    components(schemas(
        Report, NewReport, UpdateReport, FlaggedIssue, Issue, IssueAuthor, IssueState, Label,
        RepoMetadata, RepoOwner, RepoData, Pagination, User,
        crate::routes::CallbackRequest, crate::routes::LockRequest,
        crate::routes::CreateLabelRequest, crate::routes::UpdateIssueRequest,
        crate::routes::AddLabelsRequest,
    )),
    tags(
        (name = "github", description = "GitHub proxy operations"),
        (name = "reports", description = "Cleanup report operations"),
    )
)]
pub struct ApiDoc;
