use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use slotmap::{SlotMap, new_key_type};

new_key_type! {
    pub struct ListenerKey;
}

/// Payload of the "xpGained" notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpGained {
    pub amount: i64,
    pub source: String,
    pub new_xp: i64,
    pub new_level: i64,
    pub leveled_up: bool,
}

type Listener = Rc<dyn Fn(&XpGained)>;

/// Subscribers to XP notifications. Listeners may subscribe or unsubscribe
/// from inside a callback; changes take effect from the next emit.
#[derive(Default)]
pub struct XpEvents {
    listeners: RefCell<SlotMap<ListenerKey, Listener>>,
}

impl XpEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: impl Fn(&XpGained) + 'static) -> ListenerKey {
        self.listeners.borrow_mut().insert(Rc::new(listener))
    }

    /// Returns whether the key was still subscribed.
    pub fn unsubscribe(&self, key: ListenerKey) -> bool {
        self.listeners.borrow_mut().remove(key).is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn emit(&self, event: &XpGained) {
        // collected first so no borrow is held while listeners run
        let listeners: Vec<Listener> = self.listeners.borrow().values().cloned().collect();
        for listener in listeners {
            listener(event);
        }
    }
}

impl std::fmt::Debug for XpEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XpEvents")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
