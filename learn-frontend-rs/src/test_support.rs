//! Scripted in-memory backend and clocks shared by the unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use learn_types::{
    AttemptHeartbeatRequest, AttemptId, AttemptStartRequest, AttemptStatus, Course,
    DashboardSnapshot, LearningRecommendation, LessonCompletionRequest, LessonCompletionResponse,
    LessonId, ModuleGate, ModuleId,
};

use crate::backend::LearnBackend;
use crate::error::BackendError;
use crate::platform::Clock;

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Catalog,
    Dashboard,
    Gates,
    Recommendation,
    Start(LessonId, AttemptStartRequest),
    Heartbeat(LessonId, AttemptHeartbeatRequest),
    Complete(LessonId, LessonCompletionRequest),
}

pub fn unavailable() -> BackendError {
    BackendError::Status {
        status: 503,
        message: "Service unavailable".to_string(),
    }
}

pub fn epoch() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

/// Module 1 "Basics" (lessons 10 and 11) is open; module 2 "Recursion Basics"
/// (lesson 20) sits behind a mastery gate; module 3 is advanced by XP.
pub fn sample_courses() -> Vec<Course> {
    serde_json::from_value(serde_json::json!([{
        "id": 1,
        "slug": "python",
        "title": "Python",
        "order_index": 0,
        "modules": [
            {
                "id": 1,
                "title": "Basics",
                "order_index": 0,
                "xp_reward": 100,
                "lessons": [
                    {
                        "id": 10,
                        "title": "Variables",
                        "objective": "Name a value",
                        "content_md": "Values have names.\n```python\nx = 1\n```",
                        "order_index": 0,
                        "coding_challenges": [{
                            "id": 1,
                            "title": "Assign",
                            "starter_code": "x = ...",
                            "difficulty": "easy",
                            "xp_reward": 80
                        }]
                    },
                    { "id": 11, "title": "Printing", "order_index": 1 }
                ]
            },
            {
                "id": 2,
                "title": "Recursion Basics",
                "order_index": 1,
                "xp_reward": 50,
                "lessons": [{ "id": 20, "title": "Base cases", "order_index": 0 }]
            },
            {
                "id": 3,
                "title": "Module A",
                "order_index": 2,
                "xp_reward": 300,
                "lessons": [{ "id": 30, "title": "Intro", "order_index": 0 }]
            }
        ]
    }]))
    .unwrap()
}

pub fn gate(module_id: ModuleId, unlocked: bool) -> ModuleGate {
    ModuleGate {
        module_id,
        unlocked,
        mastered: false,
        average_quiz_score: 0,
        lessons_completed: 0,
        total_lessons: 0,
        challenges_passed: 0,
    }
}

pub fn snapshot(xp: i64, level: i64, completed: &[LessonId]) -> DashboardSnapshot {
    DashboardSnapshot {
        xp,
        level,
        streak_days: 2,
        daily_xp: 10,
        weekly_xp: 40,
        completed_lesson_ids: completed.to_vec(),
        total_lessons: 10,
        completed_lessons: completed.len() as i64,
        can_access_advanced_topics: false,
        earned_advanced_access: false,
        advanced_unlock_xp_required: 1800,
        advanced_unlock_lessons_required: 12,
    }
}

#[derive(Default)]
pub struct FakeBackend {
    pub calls: Mutex<Vec<Call>>,
    pub courses: Vec<Course>,
    pub gates: Vec<ModuleGate>,
    /// Served in order; the last one keeps being served.
    pub dashboards: Mutex<VecDeque<DashboardSnapshot>>,
    /// `None` makes attempt start fail.
    pub attempt_id: Option<AttemptId>,
    /// `None` makes completion fail.
    pub completion: Option<LessonCompletionResponse>,
    pub fail_catalog: bool,
    pub fail_heartbeats: bool,
}

impl FakeBackend {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn heartbeats(&self) -> Vec<AttemptHeartbeatRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Heartbeat(_, request) => Some(request),
                _ => None,
            })
            .collect()
    }

    pub fn completions(&self) -> Vec<LessonCompletionRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Complete(_, request) => Some(request),
                _ => None,
            })
            .collect()
    }

    pub fn push_dashboard(&self, dashboard: DashboardSnapshot) {
        self.dashboards.lock().unwrap().push_back(dashboard);
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl LearnBackend for FakeBackend {
    async fn fetch_catalog(&self) -> Result<Vec<Course>, BackendError> {
        self.record(Call::Catalog);
        if self.fail_catalog {
            return Err(unavailable());
        }
        Ok(self.courses.clone())
    }

    async fn fetch_dashboard(&self) -> Result<DashboardSnapshot, BackendError> {
        self.record(Call::Dashboard);
        let mut dashboards = self.dashboards.lock().unwrap();
        if dashboards.len() > 1 {
            return dashboards.pop_front().ok_or_else(unavailable);
        }
        dashboards.front().cloned().ok_or_else(unavailable)
    }

    async fn fetch_gates(&self) -> Result<Vec<ModuleGate>, BackendError> {
        self.record(Call::Gates);
        Ok(self.gates.clone())
    }

    async fn fetch_recommendation(&self) -> Result<LearningRecommendation, BackendError> {
        self.record(Call::Recommendation);
        Ok(LearningRecommendation {
            lesson_id: None,
            lesson_title: None,
            lesson_objective: None,
            module_id: None,
            module_title: None,
            reason: "Keep going".to_string(),
            unlock_reason: None,
        })
    }

    async fn start_attempt(
        &self,
        lesson_id: LessonId,
        request: &AttemptStartRequest,
    ) -> Result<AttemptStatus, BackendError> {
        self.record(Call::Start(lesson_id, request.clone()));
        let attempt_id = self.attempt_id.ok_or_else(unavailable)?;
        Ok(AttemptStatus {
            attempt_id,
            lesson_id,
            status: "started".to_string(),
            dwell_seconds: 0,
            challenge_passed: false,
            anti_fake_passed: false,
            created_at: None,
            updated_at: None,
        })
    }

    async fn heartbeat_attempt(
        &self,
        lesson_id: LessonId,
        request: &AttemptHeartbeatRequest,
    ) -> Result<AttemptStatus, BackendError> {
        self.record(Call::Heartbeat(lesson_id, request.clone()));
        if self.fail_heartbeats {
            return Err(unavailable());
        }
        Ok(AttemptStatus {
            attempt_id: request.attempt_id.unwrap_or_default(),
            lesson_id,
            status: "in_progress".to_string(),
            dwell_seconds: request.dwell_seconds,
            challenge_passed: false,
            anti_fake_passed: false,
            created_at: None,
            updated_at: None,
        })
    }

    async fn complete_lesson(
        &self,
        lesson_id: LessonId,
        request: &LessonCompletionRequest,
    ) -> Result<LessonCompletionResponse, BackendError> {
        self.record(Call::Complete(lesson_id, request.clone()));
        self.completion.clone().ok_or_else(unavailable)
    }
}

/// Wall clock that follows tokio's (possibly paused) timer.
pub struct TokioClock {
    origin: tokio::time::Instant,
    origin_wall: DateTime<Utc>,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
            origin_wall: epoch(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        self.origin_wall + chrono::Duration::from_std(self.origin.elapsed()).unwrap()
    }
}
