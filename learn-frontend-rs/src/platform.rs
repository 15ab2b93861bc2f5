//! The two bits of host environment the attempt tracker depends on: a wall
//! clock and whether the page is in the foreground. Both are injected so the
//! state machine runs the same under a fake clock in tests.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::watch;

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. It may be moved backwards, which is
/// how clock jumps are simulated.
#[derive(Clone, Debug)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Visible,
    Hidden,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Visible => "visible",
            Visibility::Hidden => "hidden",
        }
    }

    pub fn is_visible(&self) -> bool {
        matches!(self, Visibility::Visible)
    }
}

/// The host side of a visibility source. Receivers only wake on transitions.
#[derive(Debug)]
pub struct VisibilityReporter {
    sender: watch::Sender<Visibility>,
}

impl VisibilityReporter {
    pub fn set(&self, visibility: Visibility) {
        self.sender.send_if_modified(|current| {
            if *current == visibility {
                false
            } else {
                *current = visibility;
                true
            }
        });
    }

    pub fn current(&self) -> Visibility {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Visibility> {
        self.sender.subscribe()
    }
}

pub fn visibility_channel(initial: Visibility) -> (VisibilityReporter, watch::Receiver<Visibility>) {
    let (sender, receiver) = watch::channel(initial);
    (VisibilityReporter { sender }, receiver)
}
