//! Turns the raw catalog into the module/lesson tree the learn pages show,
//! deciding for every entry whether it is locked and why.
//!
//! "Advanced" is inferred client-side from titles, challenge difficulty and an
//! XP threshold. The backend has no explicit flag for it yet, so these
//! heuristics are the source of truth for advanced locks.
//!
//! Nothing here caches: entitlements and gates can change during a session,
//! so callers rebuild the tree from scratch every time their inputs change.

use std::collections::{BTreeMap, BTreeSet};

use learn_types::{Course, Lesson, LessonId, Module, ModuleGate, ModuleId};
use serde::{Deserialize, Serialize};

pub const ADVANCED_KEYWORDS: [&str; 9] = [
    "advanced",
    "internals",
    "metaclass",
    "concurrency",
    "async",
    "decorator",
    "generator",
    "profiling",
    "optimization",
];

/// Modules rewarding at least this much XP are treated as advanced.
pub const ADVANCED_MODULE_XP_THRESHOLD: i64 = 220;

/// XP shown for a lesson that has no challenge worth anything.
pub const DEFAULT_LESSON_XP: i64 = 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockReason {
    #[serde(rename = "Advanced module lock")]
    AdvancedModule,
    #[serde(rename = "Advanced lesson lock")]
    AdvancedLesson,
    #[serde(rename = "Mastery gate lock")]
    MasteryGate,
}

impl LockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockReason::AdvancedModule => "Advanced module lock",
            LockReason::AdvancedLesson => "Advanced lesson lock",
            LockReason::MasteryGate => "Mastery gate lock",
        }
    }
}

impl std::fmt::Display for LockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnChapter {
    pub id: String,
    pub lesson_id: LessonId,
    pub title: String,
    pub objective: String,
    pub estimated_minutes: i64,
    pub xp_reward: i64,
    pub completed: bool,
    pub is_advanced: bool,
    pub locked: bool,
    pub lock_reason: Option<LockReason>,
    pub content_md: String,
    pub starter_code: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnCategory {
    pub id: String,
    pub module_id: ModuleId,
    pub title: String,
    pub description: String,
    /// Number of lessons in the module.
    pub chapters: usize,
    pub completed_lessons: usize,
    pub progress_percent: u8,
    pub is_advanced: bool,
    pub locked: bool,
    pub lock_reason: Option<LockReason>,
    pub chapters_list: Vec<LearnChapter>,
}

pub fn gate_map(gates: impl IntoIterator<Item = ModuleGate>) -> BTreeMap<ModuleId, ModuleGate> {
    gates
        .into_iter()
        .map(|gate| (gate.module_id, gate))
        .collect()
}

fn mentions_advanced_topic(title: &str) -> bool {
    let title = title.trim().to_lowercase();
    ADVANCED_KEYWORDS
        .iter()
        .any(|keyword| title.contains(keyword))
}

pub fn is_advanced_module(module: &Module) -> bool {
    mentions_advanced_topic(&module.title) || module.xp_reward >= ADVANCED_MODULE_XP_THRESHOLD
}

/// Whether the lesson is advanced on its own account, ignoring its module.
fn is_advanced_lesson_alone(lesson: &Lesson) -> bool {
    mentions_advanced_topic(&lesson.title)
        || lesson
            .coding_challenges
            .iter()
            .any(|challenge| challenge.difficulty.trim().eq_ignore_ascii_case("hard"))
}

pub fn is_advanced_lesson(module: &Module, lesson: &Lesson) -> bool {
    is_advanced_module(module) || is_advanced_lesson_alone(lesson)
}

fn lesson_xp(lesson: &Lesson) -> i64 {
    let best = lesson
        .coding_challenges
        .iter()
        .map(|challenge| challenge.xp_reward)
        .fold(0, i64::max);
    if best > 0 { best } else { DEFAULT_LESSON_XP }
}

fn starter_code(lesson: &Lesson) -> Option<String> {
    lesson
        .coding_challenges
        .first()
        .map(|challenge| challenge.starter_code.clone())
        .filter(|code| !code.is_empty())
}

pub fn progress_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    (completed as f64 / total as f64 * 100.0).round() as u8
}

fn sorted_by_order<T>(items: &[T], order_index: impl Fn(&T) -> i64) -> Vec<&T> {
    let mut sorted: Vec<&T> = items.iter().collect();
    // stable, so equal indices keep catalog order
    sorted.sort_by_key(|item| order_index(item));
    sorted
}

/// Annotates every module and lesson of `courses` with its lock state.
///
/// Lock precedence for a module: advanced lock, then mastery gate. A lesson
/// reports its module's advanced lock first, then its own advanced lock, then
/// the module's mastery lock. A module without a gate record is not gated.
pub fn build_categories(
    courses: &[Course],
    completed_lesson_ids: &[LessonId],
    can_access_advanced_topics: bool,
    module_gates: &BTreeMap<ModuleId, ModuleGate>,
) -> Vec<LearnCategory> {
    let completed: BTreeSet<LessonId> = completed_lesson_ids.iter().copied().collect();
    let mut categories = Vec::new();

    for course in sorted_by_order(courses, |course| course.order_index) {
        for module in sorted_by_order(&course.modules, |module| module.order_index) {
            categories.push(build_category(
                module,
                &completed,
                can_access_advanced_topics,
                module_gates.get(&module.id),
            ));
        }
    }

    categories
}

fn build_category(
    module: &Module,
    completed: &BTreeSet<LessonId>,
    can_access_advanced_topics: bool,
    gate: Option<&ModuleGate>,
) -> LearnCategory {
    let module_advanced = is_advanced_module(module);
    let locked_by_advanced = module_advanced && !can_access_advanced_topics;
    let locked_by_mastery = gate.is_some_and(|gate| !gate.unlocked);

    let module_lock_reason = if locked_by_advanced {
        Some(LockReason::AdvancedModule)
    } else if locked_by_mastery {
        Some(LockReason::MasteryGate)
    } else {
        None
    };

    let chapters_list: Vec<LearnChapter> =
        sorted_by_order(&module.lessons, |lesson| lesson.order_index)
            .into_iter()
            .map(|lesson| {
                let own_advanced = is_advanced_lesson_alone(lesson);
                let lesson_lock_reason = match module_lock_reason {
                    Some(LockReason::AdvancedModule) => Some(LockReason::AdvancedModule),
                    _ if own_advanced && !can_access_advanced_topics => {
                        Some(LockReason::AdvancedLesson)
                    }
                    reason => reason,
                };

                LearnChapter {
                    id: lesson.id.to_string(),
                    lesson_id: lesson.id,
                    title: lesson.title.clone(),
                    objective: lesson.objective.clone(),
                    estimated_minutes: lesson.estimated_minutes,
                    xp_reward: lesson_xp(lesson),
                    completed: completed.contains(&lesson.id),
                    is_advanced: module_advanced || own_advanced,
                    locked: lesson_lock_reason.is_some(),
                    lock_reason: lesson_lock_reason,
                    content_md: lesson.content_md.clone(),
                    starter_code: starter_code(lesson),
                }
            })
            .collect();

    let total = chapters_list.len();
    let completed_lessons = chapters_list
        .iter()
        .filter(|chapter| chapter.completed)
        .count();

    LearnCategory {
        id: module.id.to_string(),
        module_id: module.id,
        title: module.title.clone(),
        description: module.description.clone(),
        chapters: total,
        completed_lessons,
        progress_percent: progress_percent(completed_lessons, total),
        is_advanced: module_advanced,
        locked: module_lock_reason.is_some(),
        lock_reason: module_lock_reason,
        chapters_list,
    }
}
