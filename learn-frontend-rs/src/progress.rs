//! The learner's XP, level, streak and completed lessons.
//!
//! Two values are kept apart. `confirmed` is whatever the dashboard endpoint
//! last said and is replaced wholesale on every refresh. `provisional_xp` is
//! a display-only bump from [`ProgressAggregator::add_xp`] that the next
//! refresh throws away.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::sync::Arc;

use learn_types::progress::{DEFAULT_ADVANCED_UNLOCK_LESSONS, DEFAULT_ADVANCED_UNLOCK_XP};
use learn_types::{AttemptId, DashboardSnapshot, LessonCompletionRequest, LessonId};
use serde::{Deserialize, Serialize};

use crate::backend::LearnBackend;
use crate::error::{LoadError, ProgressError};
use crate::xp_events::{ListenerKey, XpEvents, XpGained};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProgress {
    pub xp: i64,
    pub level: i64,
    pub streak_days: i64,
    pub daily_xp: i64,
    pub weekly_xp: i64,
    pub total_lessons: i64,
    pub completed_lessons: i64,
    pub completed_chapters: BTreeSet<LessonId>,
    pub can_access_advanced_topics: bool,
    pub earned_advanced_access: bool,
    pub advanced_unlock_xp_required: i64,
    pub advanced_unlock_lessons_required: i64,
}

impl Default for UserProgress {
    fn default() -> Self {
        Self {
            xp: 0,
            level: 1,
            streak_days: 0,
            daily_xp: 0,
            weekly_xp: 0,
            total_lessons: 0,
            completed_lessons: 0,
            completed_chapters: BTreeSet::new(),
            can_access_advanced_topics: false,
            earned_advanced_access: false,
            advanced_unlock_xp_required: DEFAULT_ADVANCED_UNLOCK_XP,
            advanced_unlock_lessons_required: DEFAULT_ADVANCED_UNLOCK_LESSONS,
        }
    }
}

impl From<DashboardSnapshot> for UserProgress {
    fn from(snapshot: DashboardSnapshot) -> Self {
        Self {
            xp: snapshot.xp,
            level: snapshot.level,
            streak_days: snapshot.streak_days,
            daily_xp: snapshot.daily_xp,
            weekly_xp: snapshot.weekly_xp,
            total_lessons: snapshot.total_lessons,
            completed_lessons: snapshot.completed_lessons,
            completed_chapters: snapshot.completed_lesson_ids.into_iter().collect(),
            can_access_advanced_topics: snapshot.can_access_advanced_topics,
            earned_advanced_access: snapshot.earned_advanced_access,
            advanced_unlock_xp_required: snapshot.advanced_unlock_xp_required,
            advanced_unlock_lessons_required: snapshot.advanced_unlock_lessons_required,
        }
    }
}

impl UserProgress {
    pub fn is_completed(&self, lesson_id: LessonId) -> bool {
        self.completed_chapters.contains(&lesson_id)
    }

    /// For [`crate::gates::build_categories`].
    pub fn completed_lesson_ids(&self) -> Vec<LessonId> {
        self.completed_chapters.iter().copied().collect()
    }
}

/// What a completion request reports besides the lesson itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompletionOptions {
    pub attempt_id: Option<AttemptId>,
    pub dwell_seconds: u32,
    pub quiz_score: i64,
    pub challenge_passed: bool,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            attempt_id: None,
            dwell_seconds: 0,
            quiz_score: 100,
            challenge_passed: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionOutcome {
    Completed {
        xp_awarded: i64,
        level: i64,
        leveled_up: bool,
    },
    /// Already in the completed set; nothing was sent.
    AlreadyCompleted,
    /// Another completion of the same lesson is still waiting on the server.
    Pending,
}

#[derive(Debug, Default)]
struct ProgressState {
    confirmed: UserProgress,
    provisional_xp: i64,
    /// Every lesson the server has confirmed as completed this session.
    session_completions: BTreeSet<LessonId>,
    in_flight: BTreeSet<LessonId>,
}

/// Owns the progress read model. Lives on the UI thread; never hold a
/// borrow of `state` across an `.await`.
pub struct ProgressAggregator<B> {
    backend: Arc<B>,
    state: RefCell<ProgressState>,
    events: XpEvents,
}

impl<B: LearnBackend> ProgressAggregator<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            state: RefCell::new(ProgressState::default()),
            events: XpEvents::new(),
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn progress(&self) -> UserProgress {
        self.state.borrow().confirmed.clone()
    }

    /// Confirmed progress with any provisional XP added on top.
    pub fn display_progress(&self) -> UserProgress {
        let state = self.state.borrow();
        let mut progress = state.confirmed.clone();
        progress.xp += state.provisional_xp;
        progress
    }

    pub fn provisional_xp(&self) -> i64 {
        self.state.borrow().provisional_xp
    }

    pub fn is_completed(&self, lesson_id: LessonId) -> bool {
        self.state.borrow().confirmed.is_completed(lesson_id)
    }

    pub fn subscribe_xp_gained(&self, listener: impl Fn(&XpGained) + 'static) -> ListenerKey {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe_xp_gained(&self, key: ListenerKey) -> bool {
        self.events.unsubscribe(key)
    }

    /// Replaces local progress with the server's dashboard snapshot.
    pub async fn refresh_progress(&self) -> Result<(), LoadError> {
        let snapshot = match self.backend.fetch_dashboard().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::warn!("Failed to refresh progress: {e}");
                return Err(LoadError::Dashboard(e));
            }
        };

        let mut state = self.state.borrow_mut();
        let mut confirmed = UserProgress::from(snapshot);
        // a snapshot that lags behind a completion must not undo it
        confirmed
            .completed_chapters
            .extend(state.session_completions.iter().copied());
        state
            .session_completions
            .extend(confirmed.completed_chapters.iter().copied());
        state.confirmed = confirmed;
        state.provisional_xp = 0;
        Ok(())
    }

    /// The streak is computed server-side, so this is a refresh.
    pub async fn update_streak(&self) -> Result<(), LoadError> {
        self.refresh_progress().await
    }

    /// Shows an XP bump right away without telling the server. It is not
    /// persisted and disappears on the next refresh.
    pub fn add_xp(&self, amount: i64, source: impl Into<String>) {
        let event = {
            let mut state = self.state.borrow_mut();
            state.provisional_xp += amount;
            XpGained {
                amount,
                source: source.into(),
                new_xp: state.confirmed.xp + state.provisional_xp,
                new_level: state.confirmed.level,
                leveled_up: false,
            }
        };
        self.events.emit(&event);
    }

    /// Marks a lesson complete on the server, at most once per lesson.
    ///
    /// A failed request leaves the lesson incomplete so it can be retried.
    pub async fn complete_chapter(
        &self,
        chapter_id: &str,
        options: CompletionOptions,
    ) -> Result<CompletionOutcome, ProgressError> {
        let Some(lesson_id) = chapter_id
            .trim()
            .parse::<LessonId>()
            .ok()
            .filter(|id| *id > 0)
        else {
            log::error!("Refusing to complete chapter with invalid lesson id {chapter_id:?}");
            return Err(ProgressError::InvalidLessonId(chapter_id.to_string()));
        };

        {
            let mut state = self.state.borrow_mut();
            if state.confirmed.is_completed(lesson_id) {
                log::debug!("Lesson {lesson_id} is already completed");
                return Ok(CompletionOutcome::AlreadyCompleted);
            }
            if !state.in_flight.insert(lesson_id) {
                return Ok(CompletionOutcome::Pending);
            }
        }

        let request = LessonCompletionRequest {
            quiz_score: options.quiz_score,
            challenge_passed: options.challenge_passed,
            attempt_id: options.attempt_id,
            dwell_seconds: options.dwell_seconds,
        };
        let result = self.backend.complete_lesson(lesson_id, &request).await;
        self.state.borrow_mut().in_flight.remove(&lesson_id);

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                log::warn!("Completing lesson {lesson_id} failed: {e}");
                return Err(ProgressError::Completion {
                    lesson_id,
                    source: e,
                });
            }
        };

        let leveled_up = {
            let mut state = self.state.borrow_mut();
            let leveled_up = response.level > state.confirmed.level;
            state.session_completions.insert(lesson_id);
            state.confirmed.completed_chapters.insert(lesson_id);
            state.confirmed.xp = response.total_xp;
            state.confirmed.level = response.level;
            leveled_up
        };

        if response.xp_awarded > 0 {
            self.events.emit(&XpGained {
                amount: response.xp_awarded,
                source: format!("Completed lesson {lesson_id}"),
                new_xp: response.total_xp,
                new_level: response.level,
                leveled_up,
            });
        }

        if self.refresh_progress().await.is_err() {
            log::warn!("Progress after completing lesson {lesson_id} may be stale");
        }

        Ok(CompletionOutcome::Completed {
            xp_awarded: response.xp_awarded,
            level: response.level,
            leveled_up,
        })
    }
}

impl<B> std::fmt::Debug for ProgressAggregator<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressAggregator")
            .field("state", &self.state)
            .field("events", &self.events)
            .finish()
    }
}
