use serde::{Deserialize, Serialize};

use crate::{AttemptId, LessonId, Metadata, ModuleId};

/// Server-computed mastery gate for one module.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, schemars::JsonSchema)]
pub struct ModuleGate {
    pub module_id: ModuleId,
    pub unlocked: bool,
    #[serde(default)]
    pub mastered: bool,
    #[serde(default)]
    pub average_quiz_score: i64,
    #[serde(default)]
    pub lessons_completed: i64,
    #[serde(default)]
    pub total_lessons: i64,
    #[serde(default)]
    pub challenges_passed: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, schemars::JsonSchema)]
pub struct AttemptStartRequest {
    pub dwell_seconds: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_json: Option<Metadata>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, schemars::JsonSchema)]
pub struct AttemptHeartbeatRequest {
    pub attempt_id: Option<AttemptId>,
    pub dwell_seconds: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_json: Option<Metadata>,
}

/// Echo of the attempt record returned by both start and heartbeat.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, schemars::JsonSchema)]
pub struct AttemptStatus {
    pub attempt_id: AttemptId,
    #[serde(default)]
    pub lesson_id: LessonId,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub dwell_seconds: u32,
    #[serde(default)]
    pub challenge_passed: bool,
    #[serde(default)]
    pub anti_fake_passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, schemars::JsonSchema)]
pub struct LearningRecommendation {
    #[serde(default)]
    pub lesson_id: Option<LessonId>,
    #[serde(default)]
    pub lesson_title: Option<String>,
    #[serde(default)]
    pub lesson_objective: Option<String>,
    #[serde(default)]
    pub module_id: Option<ModuleId>,
    #[serde(default)]
    pub module_title: Option<String>,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlock_reason: Option<String>,
}
