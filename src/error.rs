use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::github::GithubError;
use crate::repo::RepoError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("authorization required")] Unauthorized,
    #[error("forbidden")] Forbidden,
    #[error("bad request")] BadRequest,
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("upstream error ({0})")] Upstream(u16),
    #[error("internal error")] Internal,
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound,
            RepoError::Internal(_) => ApiError::Internal,
        }
    }
}

impl From<GithubError> for ApiError {
    fn from(e: GithubError) -> Self {
        match e {
            GithubError::Unauthorized => ApiError::Unauthorized,
            GithubError::NotFound => ApiError::NotFound,
            GithubError::Validation(_) => ApiError::BadRequest,
            // Preserve the upstream status verbatim where meaningful.
            GithubError::Upstream { status, .. } => ApiError::Upstream(status),
            GithubError::Transport(_) => ApiError::Internal,
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;
        let status = match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::BadRequest => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::Upstream(code) => {
                StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        HttpResponse::build(status).json(ApiErrorBody { error: self.to_string() })
    }
}
