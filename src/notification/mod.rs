//! Live "issue found" notifications.
//!
//! Reactively found issues are buffered for the next report and also handed
//! to every registered listener, synchronously, in the call stack of the
//! tree mutation that caused them.

mod renderer;

pub use renderer::IssueRenderer;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::issues::Issue;

/// Handle returned when registering an issue listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&Issue) + Send + Sync>;

/// Registry of issue listeners.
#[derive(Default)]
pub struct IssueNotifier {
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

impl IssueNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<L>(&self, listener: L) -> ListenerId
    where
        L: Fn(&Issue) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    /// Returns false if `id` was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls every listener with `issue`.
    ///
    /// No lock is held while listeners run, so a listener may register or
    /// remove listeners itself.
    pub fn notify(&self, issue: &Issue) {
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(issue);
        }
    }
}

impl std::fmt::Debug for IssueNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssueNotifier")
            .field("listeners", &self.len())
            .finish()
    }
}
