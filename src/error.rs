use thiserror::Error;

#[derive(Debug, Error)]
pub enum GradeError {
    #[error("{what} not found")]
    NotFound { what: String },
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("database unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
}

impl GradeError {
    pub fn not_found(what: impl Into<String>) -> Self {
        GradeError::NotFound { what: what.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        GradeError::Validation(message.into())
    }
}
