//! Session snapshot publishing.
//!
//! The link manager is the only writer. Observers hold a [`SessionView`]
//! and either read the latest snapshot or subscribe to an ordered stream of
//! every snapshot published after they subscribed.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rc_link_types::SessionState;
use tokio::sync::{mpsc, watch};

struct Shared {
    latest: watch::Sender<SessionState>,
    /// Also serialises publishers, so every subscriber sees one total order.
    subscribers: Mutex<Vec<mpsc::UnboundedSender<SessionState>>>,
}

impl Shared {
    fn subscribers(&self) -> MutexGuard<'_, Vec<mpsc::UnboundedSender<SessionState>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Write side, owned by the link manager.
pub(crate) struct SessionStore {
    shared: Arc<Shared>,
}

impl SessionStore {
    pub(crate) fn new(initial: SessionState) -> Self {
        let (latest, _) = watch::channel(initial);
        Self {
            shared: Arc::new(Shared {
                latest,
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub(crate) fn view(&self) -> SessionView {
        SessionView {
            shared: Arc::clone(&self.shared),
        }
    }

    pub(crate) fn current(&self) -> SessionState {
        self.shared.latest.borrow().clone()
    }

    /// Replace the snapshot with `next(current)`.
    ///
    /// Returns `false` and notifies nobody when the new snapshot equals the
    /// current one.
    pub(crate) fn publish(&self, next: impl FnOnce(&SessionState) -> SessionState) -> bool {
        let mut subscribers = self.shared.subscribers();
        let snapshot = {
            let current = self.shared.latest.borrow();
            let snapshot = next(&current);
            if snapshot == *current {
                return false;
            }
            snapshot
        };
        self.shared.latest.send_replace(snapshot.clone());
        subscribers.retain(|tx| tx.send(snapshot.clone()).is_ok());
        true
    }
}

/// Read-only handle on the session, for observers.
#[derive(Clone)]
pub struct SessionView {
    shared: Arc<Shared>,
}

impl SessionView {
    /// The latest fully-formed snapshot.
    pub fn current(&self) -> SessionState {
        self.shared.latest.borrow().clone()
    }

    /// Receive every snapshot published from now on, in publication order.
    pub fn subscribe(&self) -> SessionUpdates {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.subscribers().push(tx);
        SessionUpdates { rx }
    }

    /// Latest-value receiver; intermediate snapshots may be skipped.
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.shared.latest.subscribe()
    }
}

impl std::fmt::Debug for SessionView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionView")
            .field("current", &*self.shared.latest.borrow())
            .finish()
    }
}

/// Ordered, lossless stream of session snapshots.
#[derive(Debug)]
pub struct SessionUpdates {
    rx: mpsc::UnboundedReceiver<SessionState>,
}

impl SessionUpdates {
    /// Wait for the next snapshot. `None` once the manager is gone.
    pub async fn next(&mut self) -> Option<SessionState> {
        self.rx.recv().await
    }

    /// The next snapshot if one is already queued.
    pub fn try_next(&mut self) -> Option<SessionState> {
        self.rx.try_recv().ok()
    }
}
