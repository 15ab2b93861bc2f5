#![deny(clippy::string_slice)]

pub mod attempt;
pub mod backend;
pub mod config;
pub mod error;
pub mod gates;
pub mod learn;
pub mod notebook;
pub mod platform;
pub mod progress;
pub mod xp_events;

#[cfg(test)]
mod test_support;

use std::sync::LazyLock;

pub use attempt::{
    AttemptHandle, AttemptPhase, AttemptReceipt, AttemptTracker, HEARTBEAT_INTERVAL,
    HeartbeatReason, spawn_attempt,
};
pub use backend::{HttpBackend, LearnBackend};
pub use config::BackendConfig;
pub use error::{BackendError, LessonAccessError, LoadError, ProgressError};
pub use gates::{LearnCategory, LearnChapter, LockReason, build_categories, gate_map};
pub use learn::{LearnOverview, LessonVisit, VisitStep, load_learn_overview, resolve_lesson};
pub use notebook::{
    Direction, NotebookPage, NotebookPager, PageKind, PageTurn, parse_notebook_pages,
};
pub use platform::{Clock, SystemClock, Visibility, VisibilityReporter, visibility_channel};
pub use progress::{CompletionOptions, CompletionOutcome, ProgressAggregator, UserProgress};
pub use xp_events::{ListenerKey, XpEvents, XpGained};

// putting this inside LOGGER prevents us from accidentally initializing the logger more than once
static LOGGER: LazyLock<()> = LazyLock::new(|| {
    if env_logger::try_init().is_ok() {
        log::info!("Logging initialized");
    }
});

/// Sets up `env_logger` (filtered by `RUST_LOG`). Safe to call repeatedly.
pub fn init_logging() {
    LazyLock::force(&LOGGER);
}
