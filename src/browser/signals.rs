use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::browser::host::SessionId;

/// Completion signal reported by a session host for one navigation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavSignal {
    /// The page finished loading
    Loaded,
    /// The navigation failed with the given message
    Failed(String),
}

/// Identifies one navigation attempt on one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NavTicket {
    pub session: SessionId,
    pub attempt: u64,
}

struct Listener {
    attempt: u64,
    tx: oneshot::Sender<NavSignal>,
}

/// Routes navigation signals from a host to the attempt waiting on them.
///
/// Each session has at most one live listener. A signal is delivered only if
/// its ticket matches that listener; anything else belongs to an attempt that
/// was already abandoned and is dropped.
#[derive(Default)]
pub struct NavigationSignals {
    listeners: Mutex<HashMap<SessionId, Listener>>,
    next_attempt: AtomicU64,
}

impl NavigationSignals {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn listeners(&self) -> MutexGuard<'_, HashMap<SessionId, Listener>> {
        self.listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register the listener for a new navigation attempt on `session`
    pub fn subscribe(self: &Arc<Self>, session: SessionId) -> Subscription {
        let attempt = self.next_attempt.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        if self.listeners().insert(session, Listener { attempt, tx }).is_some() {
            warn!("Replaced a live navigation listener on session {}", session);
        }

        Subscription {
            hub: Arc::clone(self),
            ticket: NavTicket { session, attempt },
            rx,
        }
    }

    /// Deliver a signal to the attempt named by `ticket`.
    ///
    /// Returns false when no matching listener is registered.
    pub fn emit(&self, ticket: NavTicket, signal: NavSignal) -> bool {
        let listener = {
            let mut listeners = self.listeners();
            match listeners.get(&ticket.session) {
                Some(listener) if listener.attempt == ticket.attempt => listeners.remove(&ticket.session),
                _ => None,
            }
        };

        match listener {
            Some(listener) => listener.tx.send(signal).is_ok(),
            None => {
                debug!(
                    "Discarding stale {:?} for session {} attempt {}",
                    signal, ticket.session, ticket.attempt
                );
                false
            }
        }
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners().len()
    }

    fn unregister(&self, ticket: NavTicket) {
        let mut listeners = self.listeners();
        if listeners.get(&ticket.session).map(|l| l.attempt) == Some(ticket.attempt) {
            listeners.remove(&ticket.session);
        }
    }
}

/// A registered listener for one navigation attempt; unregisters on drop
pub struct Subscription {
    hub: Arc<NavigationSignals>,
    ticket: NavTicket,
    rx: oneshot::Receiver<NavSignal>,
}

impl Subscription {
    pub fn ticket(&self) -> NavTicket {
        self.ticket
    }

    /// Wait for the load or error signal of this attempt
    pub async fn recv(&mut self) -> Option<NavSignal> {
        (&mut self.rx).await.ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unregister(self.ticket);
    }
}
