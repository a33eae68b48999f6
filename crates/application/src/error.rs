use domain::{DomainError, RepositoryError};
use thiserror::Error;

use crate::attachments::UploadError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(RepositoryError),
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),
    #[error("authentication failed")]
    Authentication,
}

impl ApplicationError {
    /// 重复表情回应在存储层表现为唯一约束冲突
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            ApplicationError::Repository(RepositoryError::Conflict)
                | ApplicationError::Domain(DomainError::DuplicateReaction)
        )
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Conflict => ApplicationError::Domain(DomainError::DuplicateReaction),
            other => ApplicationError::Repository(other),
        }
    }
}

pub type ApplicationResult<T> = Result<T, ApplicationError>;
