//! Page-level flows: the learn overview, and one visit to a lesson from
//! opening its notebook to completing it.

use std::collections::BTreeMap;
use std::sync::Arc;

use learn_types::{Course, LearningRecommendation, Metadata, ModuleGate, ModuleId};
use tokio::sync::watch;

use crate::attempt::{AttemptHandle, AttemptReceipt, AttemptTracker, spawn_attempt};
use crate::backend::LearnBackend;
use crate::error::{LessonAccessError, LoadError, ProgressError};
use crate::gates::{LearnCategory, LearnChapter, build_categories, gate_map};
use crate::notebook::{NotebookPage, NotebookPager, PageTurn, parse_notebook_pages};
use crate::platform::{Clock, Visibility};
use crate::progress::{CompletionOptions, CompletionOutcome, ProgressAggregator, UserProgress};

/// Everything the learn overview page renders.
#[derive(Clone, Debug)]
pub struct LearnOverview {
    pub courses: Vec<Course>,
    pub gates: BTreeMap<ModuleId, ModuleGate>,
    pub categories: Vec<LearnCategory>,
    pub recommendation: LearningRecommendation,
    pub advanced_unlock_xp_required: i64,
    pub advanced_unlock_lessons_required: i64,
}

impl LearnOverview {
    /// Recomputes the lock tree against newer progress, e.g. after a
    /// completion. Catalog and gates are reused as loaded.
    pub fn rebuild(&mut self, progress: &UserProgress) {
        self.categories = build_categories(
            &self.courses,
            &progress.completed_lesson_ids(),
            progress.can_access_advanced_topics,
            &self.gates,
        );
        self.advanced_unlock_xp_required = progress.advanced_unlock_xp_required;
        self.advanced_unlock_lessons_required = progress.advanced_unlock_lessons_required;
    }
}

/// Loads catalog, dashboard, gates and recommendation concurrently. Any
/// failure fails the whole load; calling again is the retry.
pub async fn load_learn_overview<B: LearnBackend>(backend: &B) -> Result<LearnOverview, LoadError> {
    let (catalog, dashboard, gates, recommendation) = futures::join!(
        backend.fetch_catalog(),
        backend.fetch_dashboard(),
        backend.fetch_gates(),
        backend.fetch_recommendation(),
    );

    let courses = catalog.map_err(LoadError::Catalog)?;
    let dashboard = dashboard.map_err(LoadError::Dashboard)?;
    let gates = gate_map(gates.map_err(LoadError::Gates)?);
    let recommendation = recommendation.map_err(LoadError::Recommendation)?;

    let categories = build_categories(
        &courses,
        &dashboard.completed_lesson_ids,
        dashboard.can_access_advanced_topics,
        &gates,
    );
    log::info!(
        "Loaded {} modules from {} courses",
        categories.len(),
        courses.len()
    );

    Ok(LearnOverview {
        courses,
        gates,
        categories,
        recommendation,
        advanced_unlock_xp_required: dashboard.advanced_unlock_xp_required,
        advanced_unlock_lessons_required: dashboard.advanced_unlock_lessons_required,
    })
}

pub fn resolve_lesson<'c>(
    categories: &'c [LearnCategory],
    category_id: &str,
    chapter_id: &str,
) -> Result<&'c LearnChapter, LessonAccessError> {
    let chapter = categories
        .iter()
        .find(|category| category.id == category_id)
        .and_then(|category| {
            category
                .chapters_list
                .iter()
                .find(|chapter| chapter.id == chapter_id)
        })
        .ok_or_else(|| LessonAccessError::NotFound {
            category_id: category_id.to_string(),
            chapter_id: chapter_id.to_string(),
        })?;

    match chapter.lock_reason {
        Some(reason) => Err(LessonAccessError::Locked(reason)),
        None => Ok(chapter),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisitStep {
    Page(usize),
    /// The last page was turned and completion went through.
    Finished(CompletionOutcome),
}

/// An open lesson: its notebook plus the attempt tracking the visit.
///
/// Dropping a visit that never finished closes the attempt in the
/// background.
#[derive(Debug)]
pub struct LessonVisit<'p, B> {
    progress: &'p ProgressAggregator<B>,
    category_id: String,
    chapter: LearnChapter,
    pager: NotebookPager,
    attempt: Option<AttemptHandle>,
    receipt: Option<AttemptReceipt>,
}

impl<'p, B: LearnBackend> LessonVisit<'p, B> {
    /// Opens an unlocked lesson and starts its attempt. Must be called from
    /// within a tokio runtime.
    pub fn open<C: Clock>(
        progress: &'p ProgressAggregator<B>,
        categories: &[LearnCategory],
        category_id: &str,
        chapter_id: &str,
        clock: C,
        visibility: watch::Receiver<Visibility>,
    ) -> Result<Self, LessonAccessError> {
        let chapter = resolve_lesson(categories, category_id, chapter_id)?.clone();

        let pages = parse_notebook_pages(
            &chapter.content_md,
            &chapter.objective,
            chapter.starter_code.as_deref(),
        );

        let mut metadata = Metadata::new();
        metadata.insert("category_id".to_string(), category_id.into());
        metadata.insert("chapter_id".to_string(), chapter_id.into());

        let tracker = AttemptTracker::new(chapter.lesson_id, metadata, clock);
        let attempt = spawn_attempt(Arc::clone(progress.backend()), tracker, visibility);

        Ok(Self {
            progress,
            category_id: category_id.to_string(),
            chapter,
            pager: NotebookPager::new(pages),
            attempt: Some(attempt),
            receipt: None,
        })
    }

    pub fn category_id(&self) -> &str {
        &self.category_id
    }

    pub fn chapter(&self) -> &LearnChapter {
        &self.chapter
    }

    pub fn pager(&self) -> &NotebookPager {
        &self.pager
    }

    pub fn current_page(&self) -> Option<&NotebookPage> {
        self.pager.current_page()
    }

    pub fn is_attempt_open(&self) -> bool {
        self.attempt.is_some()
    }

    pub fn previous_page(&mut self) -> PageTurn {
        self.pager.previous()
    }

    /// Turns the page. On the last page this closes the attempt, waits for
    /// its final heartbeat, and then completes the lesson.
    ///
    /// If completion fails the visit stays on the last page and calling this
    /// again retries with the same attempt data.
    pub async fn next_page(&mut self) -> Result<VisitStep, ProgressError> {
        match self.pager.next() {
            PageTurn::Moved(index) => Ok(VisitStep::Page(index)),
            PageTurn::Stayed => Ok(VisitStep::Page(self.pager.index())),
            PageTurn::Completed => {
                let receipt = self.close_attempt().await;
                let options = CompletionOptions {
                    attempt_id: receipt.attempt_id,
                    dwell_seconds: receipt.dwell_seconds,
                    ..Default::default()
                };
                let outcome = self
                    .progress
                    .complete_chapter(&self.chapter.id, options)
                    .await?;
                Ok(VisitStep::Finished(outcome))
            }
        }
    }

    async fn close_attempt(&mut self) -> AttemptReceipt {
        if let Some(attempt) = self.attempt.take() {
            self.receipt = Some(attempt.finish().await);
        }
        self.receipt.clone().unwrap_or(AttemptReceipt {
            lesson_id: self.chapter.lesson_id,
            attempt_id: None,
            dwell_seconds: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::gates::LockReason;
    use crate::platform::visibility_channel;
    use crate::test_support::{
        Call, FakeBackend, TokioClock, gate, sample_courses, snapshot,
    };
    use learn_types::LessonCompletionResponse;

    fn backend() -> FakeBackend {
        let backend = FakeBackend {
            courses: sample_courses(),
            gates: vec![gate(1, true), gate(2, false), gate(3, true)],
            attempt_id: Some(77),
            completion: Some(LessonCompletionResponse {
                lesson_id: 10,
                status: "completed".to_string(),
                xp_awarded: 80,
                level: 1,
                total_xp: 80,
            }),
            ..Default::default()
        };
        backend.push_dashboard(snapshot(0, 1, &[]));
        backend
    }

    #[tokio::test]
    async fn test_overview_applies_gates() {
        let overview = load_learn_overview(&backend()).await.unwrap();

        let reasons: Vec<Option<LockReason>> = overview
            .categories
            .iter()
            .map(|category| category.lock_reason)
            .collect();
        assert_eq!(
            reasons,
            vec![
                None,
                Some(LockReason::MasteryGate),
                Some(LockReason::AdvancedModule)
            ]
        );
        assert_eq!(overview.categories[0].chapters_list[0].xp_reward, 80);
        assert_eq!(overview.categories[0].chapters_list[1].xp_reward, 60);
        assert_eq!(overview.advanced_unlock_xp_required, 1800);
    }

    #[tokio::test]
    async fn test_overview_fails_when_catalog_fails() {
        let backend = FakeBackend {
            fail_catalog: true,
            ..backend()
        };
        let result = load_learn_overview(&backend).await;
        assert!(matches!(result, Err(LoadError::Catalog(_))));
    }

    #[tokio::test]
    async fn test_rebuild_marks_new_completions() {
        let mut overview = load_learn_overview(&backend()).await.unwrap();
        let progress = UserProgress::from(snapshot(80, 1, &[10]));

        overview.rebuild(&progress);

        assert!(overview.categories[0].chapters_list[0].completed);
        assert_eq!(overview.categories[0].completed_lessons, 1);
        assert_eq!(overview.categories[0].progress_percent, 50);
    }

    #[tokio::test]
    async fn test_resolve_lesson() {
        let overview = load_learn_overview(&backend()).await.unwrap();
        let categories = &overview.categories;

        assert_eq!(resolve_lesson(categories, "1", "11").unwrap().title, "Printing");
        assert_eq!(
            resolve_lesson(categories, "2", "20"),
            Err(LessonAccessError::Locked(LockReason::MasteryGate))
        );
        assert_eq!(
            resolve_lesson(categories, "3", "30"),
            Err(LessonAccessError::Locked(LockReason::AdvancedModule))
        );
        assert!(matches!(
            resolve_lesson(categories, "1", "20"),
            Err(LessonAccessError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_locked_lesson_opens_no_attempt() {
        let backend = Arc::new(backend());
        let overview = load_learn_overview(backend.as_ref()).await.unwrap();
        let progress = ProgressAggregator::new(Arc::clone(&backend));
        let (_reporter, visibility) = visibility_channel(Visibility::Visible);

        let visit = LessonVisit::open(
            &progress,
            &overview.categories,
            "2",
            "20",
            TokioClock::new(),
            visibility,
        );

        assert!(visit.is_err());
        tokio::task::yield_now().await;
        assert!(
            !backend
                .calls()
                .iter()
                .any(|call| matches!(call, Call::Start(..)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_visit_pages_through_and_completes() {
        let backend = Arc::new(backend());
        let overview = load_learn_overview(backend.as_ref()).await.unwrap();
        let progress = ProgressAggregator::new(Arc::clone(&backend));
        let (_reporter, visibility) = visibility_channel(Visibility::Visible);

        let mut visit = LessonVisit::open(
            &progress,
            &overview.categories,
            "1",
            "10",
            TokioClock::new(),
            visibility,
        )
        .unwrap();

        // prose, fenced code, starter code, goal
        assert_eq!(visit.pager().page_count(), 4);
        assert_eq!(visit.next_page().await.unwrap(), VisitStep::Page(1));
        assert_eq!(visit.previous_page(), PageTurn::Moved(0));
        for expected in 1..4 {
            assert_eq!(visit.next_page().await.unwrap(), VisitStep::Page(expected));
        }

        tokio::time::sleep(Duration::from_secs(20)).await;
        let step = visit.next_page().await.unwrap();

        assert!(matches!(
            step,
            VisitStep::Finished(CompletionOutcome::Completed { xp_awarded: 80, .. })
        ));
        assert!(!visit.is_attempt_open());

        let calls = backend.calls();
        let after_overview = &calls[4..];
        assert!(matches!(&after_overview[0], Call::Start(10, start) if start.dwell_seconds == 0));

        let (final_index, final_beat) = after_overview
            .iter()
            .enumerate()
            .find_map(|(i, call)| match call {
                Call::Heartbeat(10, beat)
                    if beat.metadata_json.as_ref().unwrap()["reason"] == "final" =>
                {
                    Some((i, beat))
                }
                _ => None,
            })
            .unwrap();
        let complete_index = after_overview
            .iter()
            .position(|call| matches!(call, Call::Complete(10, _)))
            .unwrap();
        assert!(final_index < complete_index);
        assert_eq!(final_beat.dwell_seconds, 20);
        assert_eq!(final_beat.metadata_json.as_ref().unwrap()["chapter_id"], "10");

        assert_eq!(
            backend.completions()[0],
            learn_types::LessonCompletionRequest {
                quiz_score: 100,
                challenge_passed: true,
                attempt_id: Some(77),
                dwell_seconds: 20,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_page_lesson_finished_at_once_keeps_attempt_id() {
        let backend = Arc::new(backend());
        let overview = load_learn_overview(backend.as_ref()).await.unwrap();
        let progress = ProgressAggregator::new(Arc::clone(&backend));
        let (_reporter, visibility) = visibility_channel(Visibility::Visible);

        let mut visit = LessonVisit::open(
            &progress,
            &overview.categories,
            "1",
            "11",
            TokioClock::new(),
            visibility,
        )
        .unwrap();
        let step = visit.next_page().await.unwrap();

        assert!(matches!(
            step,
            VisitStep::Finished(CompletionOutcome::Completed { .. })
        ));
        let starts = backend
            .calls()
            .iter()
            .filter(|call| matches!(call, Call::Start(11, _)))
            .count();
        assert_eq!(starts, 1);
        assert_eq!(backend.completions()[0].attempt_id, Some(77));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_start_still_completes_without_attempt_id() {
        let backend = Arc::new(FakeBackend {
            attempt_id: None,
            ..backend()
        });
        let overview = load_learn_overview(backend.as_ref()).await.unwrap();
        let progress = ProgressAggregator::new(Arc::clone(&backend));
        let (_reporter, visibility) = visibility_channel(Visibility::Visible);

        let mut visit = LessonVisit::open(
            &progress,
            &overview.categories,
            "1",
            "10",
            TokioClock::new(),
            visibility,
        )
        .unwrap();

        tokio::time::sleep(Duration::from_secs(16)).await;
        for expected in 1..4 {
            assert_eq!(visit.next_page().await.unwrap(), VisitStep::Page(expected));
        }
        let step = visit.next_page().await.unwrap();

        assert!(matches!(
            step,
            VisitStep::Finished(CompletionOutcome::Completed { xp_awarded: 80, .. })
        ));
        let heartbeats = backend.heartbeats();
        let reasons: Vec<&str> = heartbeats
            .iter()
            .map(|beat| beat.metadata_json.as_ref().unwrap()["reason"].as_str().unwrap())
            .collect();
        assert_eq!(reasons, vec!["interval", "final"]);
        assert!(heartbeats.iter().all(|beat| beat.attempt_id.is_none()));

        let completions = backend.completions();
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].attempt_id, None);
        assert_eq!(completions[0].dwell_seconds, 16);
        assert!(progress.is_completed(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_completion_can_be_retried() {
        let backend = Arc::new(FakeBackend {
            completion: None,
            ..backend()
        });
        let overview = load_learn_overview(backend.as_ref()).await.unwrap();
        let progress = ProgressAggregator::new(Arc::clone(&backend));
        let (_reporter, visibility) = visibility_channel(Visibility::Visible);

        let mut visit = LessonVisit::open(
            &progress,
            &overview.categories,
            "1",
            "11",
            TokioClock::new(),
            visibility,
        )
        .unwrap();
        assert_eq!(visit.pager().page_count(), 1);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(visit.next_page().await.is_err());
        assert!(visit.next_page().await.is_err());

        let completions = backend.completions();
        assert_eq!(completions.len(), 2);
        assert_eq!(completions[0], completions[1]);
        assert_eq!(completions[1].dwell_seconds, 3);
        assert!(!progress.is_completed(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_leaving_a_lesson_closes_its_attempt() {
        let backend = Arc::new(backend());
        let overview = load_learn_overview(backend.as_ref()).await.unwrap();
        let progress = ProgressAggregator::new(Arc::clone(&backend));
        let (_reporter, visibility) = visibility_channel(Visibility::Visible);

        let visit = LessonVisit::open(
            &progress,
            &overview.categories,
            "1",
            "10",
            TokioClock::new(),
            visibility,
        )
        .unwrap();
        tokio::time::sleep(Duration::from_secs(7)).await;
        drop(visit);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let heartbeats = backend.heartbeats();
        assert_eq!(heartbeats.len(), 1);
        assert_eq!(heartbeats[0].dwell_seconds, 7);
        assert!(backend.completions().is_empty());
    }
}
