//! Tracks one visit to a lesson for the backend's anti-fake check.
//!
//! The visit goes `Idle -> Starting -> Active -> Closed`. While active it
//! reports how long the learner has been on the lesson: every 15 seconds
//! while the page is visible, and immediately when the page is hidden. A
//! final heartbeat goes out when the visit ends, before any completion call.
//!
//! [`AttemptTracker`] is the state machine and produces request bodies
//! without doing any I/O. [`spawn_attempt`] drives it with real timers and a
//! visibility source and does the sending.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use learn_types::{
    AttemptHeartbeatRequest, AttemptId, AttemptStartRequest, AttemptStatus, LessonId, Metadata,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};

use crate::backend::LearnBackend;
use crate::error::BackendError;
use crate::platform::{Clock, Visibility};

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptPhase {
    Idle,
    Starting,
    Active,
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeartbeatReason {
    Interval,
    Visibility,
    Final,
}

impl HeartbeatReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeartbeatReason::Interval => "interval",
            HeartbeatReason::Visibility => "visibility",
            HeartbeatReason::Final => "final",
        }
    }
}

/// Set once the visit is torn down. Late responses check it before touching
/// tracker state.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What the completion request needs to know about the attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttemptReceipt {
    pub lesson_id: LessonId,
    pub attempt_id: Option<AttemptId>,
    pub dwell_seconds: u32,
}

pub struct AttemptTracker<C> {
    clock: C,
    lesson_id: LessonId,
    metadata: Metadata,
    phase: AttemptPhase,
    attempt_id: Option<AttemptId>,
    started_at: DateTime<Utc>,
    last_dwell: u32,
    cancelled: CancelFlag,
}

impl<C: Clock> AttemptTracker<C> {
    pub fn new(lesson_id: LessonId, metadata: Metadata, clock: C) -> Self {
        let started_at = clock.now();
        Self {
            clock,
            lesson_id,
            metadata,
            phase: AttemptPhase::Idle,
            attempt_id: None,
            started_at,
            last_dwell: 0,
            cancelled: CancelFlag::default(),
        }
    }

    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }

    pub fn phase(&self) -> AttemptPhase {
        self.phase
    }

    pub fn attempt_id(&self) -> Option<AttemptId> {
        self.attempt_id
    }

    /// Active without a server attempt because the start request failed.
    pub fn is_degraded(&self) -> bool {
        self.phase == AttemptPhase::Active && self.attempt_id.is_none()
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancelled.clone()
    }

    pub fn begin_start(&mut self) -> Option<AttemptStartRequest> {
        if self.phase != AttemptPhase::Idle {
            return None;
        }
        self.phase = AttemptPhase::Starting;
        Some(AttemptStartRequest {
            dwell_seconds: 0,
            metadata_json: Some(self.metadata.clone()),
        })
    }

    /// Applies the start response. A failed start still activates the
    /// attempt, just without an `attempt_id`.
    pub fn finish_start(&mut self, result: Result<AttemptStatus, BackendError>) {
        if self.cancelled.is_cancelled() {
            log::debug!(
                "Discarding attempt start for lesson {}: visit already closed",
                self.lesson_id
            );
            return;
        }
        if self.phase != AttemptPhase::Starting {
            return;
        }

        match result {
            Ok(status) => {
                self.attempt_id = Some(status.attempt_id);
                self.started_at = self.clock.now();
            }
            Err(e) => {
                log::warn!(
                    "Could not start attempt for lesson {}, tracking locally: {e}",
                    self.lesson_id
                );
            }
        }
        self.phase = AttemptPhase::Active;
    }

    /// Whole seconds since the attempt started. Never lower than a value
    /// already handed out, even if the clock jumps backwards.
    pub fn dwell_seconds(&mut self) -> u32 {
        let elapsed_ms = (self.clock.now() - self.started_at)
            .num_milliseconds()
            .max(0);
        let dwell = u32::try_from(elapsed_ms / 1000).unwrap_or(u32::MAX);
        self.last_dwell = self.last_dwell.max(dwell);
        self.last_dwell
    }

    fn heartbeat(
        &mut self,
        reason: HeartbeatReason,
        visibility: Visibility,
    ) -> AttemptHeartbeatRequest {
        let dwell_seconds = self.dwell_seconds();
        let mut metadata = self.metadata.clone();
        metadata.insert("reason".to_string(), reason.as_str().into());
        metadata.insert("visibility".to_string(), visibility.as_str().into());
        metadata.insert("lesson_id".to_string(), self.lesson_id.into());

        AttemptHeartbeatRequest {
            attempt_id: self.attempt_id,
            dwell_seconds,
            metadata_json: Some(metadata),
        }
    }

    /// Interval ticks are dropped while the page is hidden.
    pub fn interval_heartbeat(&mut self, visibility: Visibility) -> Option<AttemptHeartbeatRequest> {
        let due = self.phase == AttemptPhase::Active && visibility.is_visible();
        due.then(|| self.heartbeat(HeartbeatReason::Interval, visibility))
    }

    pub fn visibility_heartbeat(
        &mut self,
        visibility: Visibility,
    ) -> Option<AttemptHeartbeatRequest> {
        let due = self.phase == AttemptPhase::Active && !visibility.is_visible();
        due.then(|| self.heartbeat(HeartbeatReason::Visibility, visibility))
    }

    /// Closes the attempt. Returns `None` if it was already closed or never
    /// started.
    pub fn final_heartbeat(&mut self, visibility: Visibility) -> Option<AttemptHeartbeatRequest> {
        match self.phase {
            AttemptPhase::Starting | AttemptPhase::Active => {
                let request = self.heartbeat(HeartbeatReason::Final, visibility);
                self.phase = AttemptPhase::Closed;
                Some(request)
            }
            AttemptPhase::Idle => {
                self.phase = AttemptPhase::Closed;
                None
            }
            AttemptPhase::Closed => None,
        }
    }

    pub fn receipt(&self) -> AttemptReceipt {
        AttemptReceipt {
            lesson_id: self.lesson_id,
            attempt_id: self.attempt_id,
            dwell_seconds: self.last_dwell,
        }
    }
}

/// Heartbeats are best-effort; failures are only logged.
pub(crate) async fn send_heartbeat<B: LearnBackend>(
    backend: &B,
    lesson_id: LessonId,
    request: AttemptHeartbeatRequest,
) {
    if let Err(e) = backend.heartbeat_attempt(lesson_id, &request).await {
        log::warn!(
            "Heartbeat ({}s) for lesson {lesson_id} failed: {e}",
            request.dwell_seconds
        );
    }
}

fn dispatch_heartbeat<B: LearnBackend>(
    backend: &Arc<B>,
    lesson_id: LessonId,
    request: AttemptHeartbeatRequest,
) {
    let backend = Arc::clone(backend);
    tokio::spawn(async move { send_heartbeat(backend.as_ref(), lesson_id, request).await });
}

enum Command {
    Finish(oneshot::Sender<AttemptReceipt>),
}

/// The UI's end of a running attempt. Dropping it is navigation away: the
/// attempt is cancelled and its final heartbeat is sent in the background.
#[derive(Debug)]
pub struct AttemptHandle {
    lesson_id: LessonId,
    commands: Option<mpsc::UnboundedSender<Command>>,
    cancelled: CancelFlag,
}

impl AttemptHandle {
    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }

    /// Closes the attempt, waiting for the final heartbeat to be sent.
    pub async fn finish(mut self) -> AttemptReceipt {
        let untracked = AttemptReceipt {
            lesson_id: self.lesson_id,
            attempt_id: None,
            dwell_seconds: 0,
        };
        let Some(commands) = self.commands.take() else {
            return untracked;
        };

        let (reply, receipt) = oneshot::channel();
        if commands.send(Command::Finish(reply)).is_err() {
            log::error!("Attempt driver for lesson {} is gone", self.lesson_id);
            return untracked;
        }
        receipt.await.unwrap_or_else(|_| {
            log::error!("Attempt driver for lesson {} dropped its receipt", self.lesson_id);
            untracked
        })
    }
}

impl Drop for AttemptHandle {
    fn drop(&mut self) {
        if self.commands.take().is_some() {
            self.cancelled.cancel();
        }
    }
}

/// Starts the attempt and runs its timers on the current tokio runtime.
pub fn spawn_attempt<B: LearnBackend, C: Clock>(
    backend: Arc<B>,
    tracker: AttemptTracker<C>,
    visibility: watch::Receiver<Visibility>,
) -> AttemptHandle {
    let (commands, receiver) = mpsc::unbounded_channel();
    let handle = AttemptHandle {
        lesson_id: tracker.lesson_id(),
        commands: Some(commands),
        cancelled: tracker.cancel_flag(),
    };
    tokio::spawn(drive_attempt(backend, tracker, visibility, receiver));
    handle
}

async fn drive_attempt<B: LearnBackend, C: Clock>(
    backend: Arc<B>,
    mut tracker: AttemptTracker<C>,
    mut visibility: watch::Receiver<Visibility>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let lesson_id = tracker.lesson_id();

    // a command that arrived before the start request resolved
    let mut pending = None;
    if let Some(request) = tracker.begin_start() {
        let start = backend.start_attempt(lesson_id, &request);
        tokio::pin!(start);
        // start is polled first so the request always goes out
        tokio::select! {
            biased;
            result = &mut start => tracker.finish_start(result),
            command = commands.recv() => {
                // finishing waits for the attempt id; a dropped visit does not
                if command.is_some() {
                    tracker.finish_start(start.await);
                }
                pending = Some(command);
            }
        }
    }

    let mut ticker = tokio::time::interval_at(Instant::now() + HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut visibility_open = true;

    let command = loop {
        if let Some(command) = pending.take() {
            break command;
        }
        tokio::select! {
            biased;
            changed = visibility.changed(), if visibility_open => match changed {
                Ok(()) => {
                    let current = *visibility.borrow_and_update();
                    if let Some(request) = tracker.visibility_heartbeat(current) {
                        dispatch_heartbeat(&backend, lesson_id, request);
                    }
                }
                Err(_) => visibility_open = false,
            },
            _ = ticker.tick() => {
                let current = *visibility.borrow();
                if let Some(request) = tracker.interval_heartbeat(current) {
                    dispatch_heartbeat(&backend, lesson_id, request);
                }
            }
            command = commands.recv() => pending = Some(command),
        }
    };

    let current = *visibility.borrow();
    if let Some(request) = tracker.final_heartbeat(current) {
        send_heartbeat(backend.as_ref(), lesson_id, request).await;
    }

    let receipt = tracker.receipt();
    match command {
        Some(Command::Finish(reply)) => {
            if reply.send(receipt).is_err() {
                log::debug!("Nobody waiting for the receipt of lesson {lesson_id}");
            }
        }
        None => log::info!(
            "Left lesson {lesson_id} after {}s without completing it",
            receipt.dwell_seconds
        ),
    }
}
