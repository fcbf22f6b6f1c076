//! Client-visible error categories.

use crate::tracker::JobStatus;
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Missing or unusable upload; no job is created.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("request not found: {0}")]
    NotFound(String),

    #[error("request {id} is not completed (status: {status})")]
    NotReady { id: String, status: JobStatus },

    #[error("request {id} failed: {message}")]
    JobFailed { id: String, message: String },

    #[error("worker queue is full")]
    Busy,

    #[error("video duration is zero or could not be determined")]
    DurationUnknown,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// HTTP-equivalent status code for the category.
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::Validation(_) => 400,
            ServiceError::NotFound(_) => 404,
            ServiceError::NotReady { .. } => 409,
            ServiceError::Busy => 503,
            ServiceError::DurationUnknown => 422,
            ServiceError::JobFailed { .. } | ServiceError::Internal(_) => 500,
        }
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::Internal(err.into())
    }
}
