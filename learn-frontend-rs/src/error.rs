use learn_types::LessonId;

use crate::gates::LockReason;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("request error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP error {status}: {message}")]
    Status { status: u16, message: String },
    #[error("response parsing error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A read-path failure. The view shows a blocking, retryable error for these.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to load course catalog: {0}")]
    Catalog(#[source] BackendError),
    #[error("failed to load dashboard: {0}")]
    Dashboard(#[source] BackendError),
    #[error("failed to load module gates: {0}")]
    Gates(#[source] BackendError),
    #[error("failed to load recommendation: {0}")]
    Recommendation(#[source] BackendError),
}

#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    #[error("invalid lesson id for chapter completion: {0:?}")]
    InvalidLessonId(String),
    #[error("failed to complete lesson {lesson_id}: {source}")]
    Completion {
        lesson_id: LessonId,
        #[source]
        source: BackendError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LessonAccessError {
    #[error("lesson {chapter_id} not found in module {category_id}")]
    NotFound {
        category_id: String,
        chapter_id: String,
    },
    #[error("lesson is locked: {0}")]
    Locked(LockReason),
}
