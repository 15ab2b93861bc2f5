use serde::{Deserialize, Serialize};

use crate::{CourseId, LessonId, ModuleId};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, schemars::JsonSchema)]
pub struct QuizQuestion {
    pub id: i64,
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_option: i64,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, schemars::JsonSchema)]
pub struct CodingChallenge {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub starter_code: String,
    /// `"easy"`, `"medium"` or `"hard"`, compared case-insensitively.
    pub difficulty: String,
    pub xp_reward: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, schemars::JsonSchema)]
pub struct Lesson {
    pub id: LessonId,
    pub title: String,
    #[serde(default)]
    pub objective: String,
    #[serde(default)]
    pub content_md: String,
    pub order_index: i64,
    #[serde(default)]
    pub estimated_minutes: i64,
    #[serde(default)]
    pub quiz_questions: Vec<QuizQuestion>,
    #[serde(default)]
    pub coding_challenges: Vec<CodingChallenge>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, schemars::JsonSchema)]
pub struct Module {
    pub id: ModuleId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub order_index: i64,
    pub xp_reward: i64,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, schemars::JsonSchema)]
pub struct Course {
    pub id: CourseId,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub difficulty: String,
    pub order_index: i64,
    #[serde(default)]
    pub modules: Vec<Module>,
}
