//! Event System
//!
//! Typed events emitted by the core. Listeners register against the
//! variants; there are no string-keyed emitters.

use std::sync::{Arc, RwLock};

use crate::realtime::ConnectionState;
use crate::update::UpdateEvent;

/// Events emitted by the core.
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// A sync cycle started.
    SyncStarted,

    /// A sync cycle finished.
    SyncCompleted {
        uploaded: usize,
        downloaded: usize,
        conflicts: usize,
    },

    /// A sync cycle failed; the scheduler keeps running.
    SyncFailed {
        /// Error description.
        error: String,
    },

    /// Realtime connection state changed.
    ConnectionStateChanged {
        /// The new connection state.
        state: ConnectionState,
    },

    /// A realtime patch was merged into a domain record.
    PatchApplied {
        resource_type: String,
        resource_id: String,
    },

    /// A merge needs the user; a conflict record was filed.
    ConflictFiled {
        conflict_id: String,
        resource_type: String,
        resource_id: String,
    },

    /// A presence signal changed the who-is-viewing-what cache.
    PresenceChanged {
        /// The actor the signal was about.
        actor_id: String,
    },

    /// The realtime channel gave up; sync continues pull-only.
    PullOnlyFallback,

    /// Token refresh failed; the UI must drive re-registration.
    NeedsRelogin,

    /// Update pipeline progress.
    Update(UpdateEvent),
}

/// Event handler trait.
///
/// Implement this trait to receive core events.
pub trait EventHandler: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: CoreEvent);
}

/// Simple callback-based event handler.
///
/// Wraps a closure for easy event handling.
pub struct CallbackHandler<F>
where
    F: Fn(CoreEvent) + Send + Sync,
{
    callback: F,
}

impl<F> CallbackHandler<F>
where
    F: Fn(CoreEvent) + Send + Sync,
{
    /// Creates a new callback handler.
    pub fn new(callback: F) -> Self {
        CallbackHandler { callback }
    }
}

impl<F> EventHandler for CallbackHandler<F>
where
    F: Fn(CoreEvent) + Send + Sync,
{
    fn on_event(&self, event: CoreEvent) {
        (self.callback)(event);
    }
}

/// Event dispatcher for managing multiple handlers.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventDispatcher {
    /// Creates a new event dispatcher.
    pub fn new() -> Self {
        EventDispatcher {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Adds an event handler.
    pub fn add_handler(&self, handler: Arc<dyn EventHandler>) {
        self.handlers
            .write()
            .expect("handler lock poisoned")
            .push(handler);
    }

    /// Removes all handlers.
    pub fn clear_handlers(&self) {
        self.handlers
            .write()
            .expect("handler lock poisoned")
            .clear();
    }

    /// Returns the number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.read().expect("handler lock poisoned").len()
    }

    /// Dispatches an event to all handlers.
    pub fn dispatch(&self, event: CoreEvent) {
        let handlers = self.handlers.read().expect("handler lock poisoned");
        for handler in handlers.iter() {
            handler.on_event(event.clone());
        }
    }
}
