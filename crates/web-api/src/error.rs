use application::{ApplicationError, UploadError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::{DomainError, RepositoryError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code: code.to_string(),
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        use ApplicationError as AppErr;

        match error {
            AppErr::Domain(DomainError::InvalidArgument { field, reason }) => ApiError::new(
                StatusCode::BAD_REQUEST,
                "INVALID_ARGUMENT",
                format!("{}: {}", field, reason),
            ),
            AppErr::Domain(DomainError::UserNotFound) => {
                ApiError::new(StatusCode::NOT_FOUND, "USER_NOT_FOUND", "user not found")
            }
            AppErr::Domain(DomainError::GroupNotFound) => {
                ApiError::new(StatusCode::NOT_FOUND, "GROUP_NOT_FOUND", "group not found")
            }
            AppErr::Domain(DomainError::MessageNotFound) => ApiError::new(
                StatusCode::NOT_FOUND,
                "MESSAGE_NOT_FOUND",
                "message not found",
            ),
            AppErr::Domain(DomainError::ReactionNotFound) => ApiError::new(
                StatusCode::NOT_FOUND,
                "REACTION_NOT_FOUND",
                "reaction not found",
            ),
            AppErr::Domain(DomainError::GroupInactive) => {
                ApiError::new(StatusCode::NOT_FOUND, "GROUP_INACTIVE", "group is inactive")
            }
            AppErr::Domain(DomainError::NotGroupMember) => ApiError::new(
                StatusCode::NOT_FOUND,
                "NOT_GROUP_MEMBER",
                "group not found or you are not a member",
            ),
            AppErr::Domain(DomainError::AlreadyGroupMember) => ApiError::new(
                StatusCode::CONFLICT,
                "ALREADY_GROUP_MEMBER",
                "user is already a member",
            ),
            AppErr::Domain(DomainError::OperationNotAllowed) => ApiError::new(
                StatusCode::FORBIDDEN,
                "OPERATION_NOT_ALLOWED",
                "operation not allowed",
            ),
            AppErr::Domain(DomainError::DuplicateReaction) => ApiError::new(
                StatusCode::CONFLICT,
                "DUPLICATE_REACTION",
                "you have already reacted with this emoji",
            ),
            AppErr::Repository(repo_err) => match repo_err {
                RepositoryError::NotFound => ApiError::new(
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    "requested resource not found",
                ),
                RepositoryError::Conflict => {
                    ApiError::new(StatusCode::CONFLICT, "CONFLICT", "resource already exists")
                }
                RepositoryError::Storage { message } => {
                    tracing::error!(error = %message, "存储错误");
                    ApiError::new(
                        StatusCode::SERVICE_UNAVAILABLE,
                        "STORAGE_UNAVAILABLE",
                        "storage temporarily unavailable",
                    )
                }
            },
            AppErr::Upload(UploadError::Rejected(reason)) => {
                ApiError::new(StatusCode::BAD_REQUEST, "UPLOAD_REJECTED", reason)
            }
            AppErr::Upload(UploadError::Unavailable(reason)) => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "UPLOAD_UNAVAILABLE",
                reason,
            ),
            AppErr::Authentication => ApiError::new(
                StatusCode::UNAUTHORIZED,
                "AUTHENTICATION_FAILED",
                "authentication failed",
            ),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", errors.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
