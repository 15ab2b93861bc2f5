//! Wire types shared between the learning frontend and the tools built on it.
//!
//! Everything here mirrors a JSON body exchanged with the learning backend, so
//! field names follow the backend's snake_case spelling.

pub mod catalog;
pub mod learning;
pub mod progress;

pub use catalog::{CodingChallenge, Course, Lesson, Module, QuizQuestion};
pub use learning::{
    AttemptHeartbeatRequest, AttemptStartRequest, AttemptStatus, LearningRecommendation,
    ModuleGate,
};
pub use progress::{DashboardSnapshot, LessonCompletionRequest, LessonCompletionResponse};

pub type CourseId = i64;
pub type ModuleId = i64;
pub type LessonId = i64;
pub type AttemptId = i64;

/// Free-form metadata attached to attempts, stored server-side as `metadata_json`.
pub type Metadata = std::collections::BTreeMap<String, serde_json::Value>;
