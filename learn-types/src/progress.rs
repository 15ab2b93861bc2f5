use serde::{Deserialize, Serialize};

use crate::{AttemptId, LessonId};

/// Authoritative snapshot served by `GET /users/me/dashboard`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, schemars::JsonSchema)]
pub struct DashboardSnapshot {
    pub xp: i64,
    pub level: i64,
    pub streak_days: i64,
    #[serde(default)]
    pub daily_xp: i64,
    #[serde(default)]
    pub weekly_xp: i64,
    #[serde(default)]
    pub completed_lesson_ids: Vec<LessonId>,
    #[serde(default)]
    pub total_lessons: i64,
    #[serde(default)]
    pub completed_lessons: i64,
    #[serde(default)]
    pub can_access_advanced_topics: bool,
    #[serde(default)]
    pub earned_advanced_access: bool,
    #[serde(default = "default_unlock_xp")]
    pub advanced_unlock_xp_required: i64,
    #[serde(default = "default_unlock_lessons")]
    pub advanced_unlock_lessons_required: i64,
}

pub const DEFAULT_ADVANCED_UNLOCK_XP: i64 = 1800;
pub const DEFAULT_ADVANCED_UNLOCK_LESSONS: i64 = 12;

fn default_unlock_xp() -> i64 {
    DEFAULT_ADVANCED_UNLOCK_XP
}

fn default_unlock_lessons() -> i64 {
    DEFAULT_ADVANCED_UNLOCK_LESSONS
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, schemars::JsonSchema)]
pub struct LessonCompletionRequest {
    pub quiz_score: i64,
    pub challenge_passed: bool,
    pub attempt_id: Option<AttemptId>,
    pub dwell_seconds: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, schemars::JsonSchema)]
pub struct LessonCompletionResponse {
    #[serde(default)]
    pub lesson_id: LessonId,
    #[serde(default)]
    pub status: String,
    pub xp_awarded: i64,
    pub level: i64,
    pub total_xp: i64,
}
