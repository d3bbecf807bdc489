use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid course id: {0:?}")]
    InvalidCourseId(String),

    #[error("Unknown course type: {0}")]
    UnknownCourseType(String),

    #[error("Course already tracked: {0}")]
    DuplicateCourse(String),

    #[error("Unexpected HTTP status: {0}")]
    UnexpectedStatus(u16),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage unavailable")]
    StorageUnavailable,
}

impl AppError {
    /// Errors caused by what the user typed rather than by the environment.
    pub fn is_user_input(&self) -> bool {
        matches!(
            self,
            AppError::InvalidCourseId(_)
                | AppError::UnknownCourseType(_)
                | AppError::DuplicateCourse(_)
                | AppError::NotFound(_)
        )
    }
}
