//! # Connection State Machine
//!
//! Single authoritative holder of the current [`ConnectionState`].
//!
//! Transitions are published through a `tokio::sync::watch` channel, which
//! gives observers the current value on subscription and every later change
//! in order. A transition requested while another one is executing is
//! dropped, not queued: the link reports I/O failures in bursts and only the
//! settled state matters to observers.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::{debug, warn};

use super::state::ConnectionState;

/// Serialises and publishes connection state transitions
#[derive(Debug)]
pub struct StateMachine {
    tx: watch::Sender<ConnectionState>,
    updating: AtomicBool,
}

/// Held for the duration of one transition; clears the flag on drop
struct TransitionGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    /// Create a state machine starting in `Disconnected`
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::Disconnected);
        Self {
            tx,
            updating: AtomicBool::new(false),
        }
    }

    /// Current state
    pub fn current(&self) -> ConnectionState {
        self.tx.borrow().clone()
    }

    /// Subscribe to state changes
    ///
    /// The receiver sees the current value immediately, then every
    /// subsequent change (replay depth 1).
    pub fn observe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Move to `next`
    ///
    /// Returns `true` when observers were notified. Returns `false` when
    /// `next` equals the current state or when another transition was in
    /// progress and this one was suppressed.
    pub fn transition(&self, next: ConnectionState) -> bool {
        let Some(_guard) = self.try_begin() else {
            warn!("State transition already in progress, dropping: {}", next);
            return false;
        };

        let mut previous = None;
        let changed = self.tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            previous = Some(std::mem::replace(current, next.clone()));
            true
        });

        if let Some(previous) = previous {
            debug!("State changed: {} -> {}", previous, next);
        }
        changed
    }

    fn try_begin(&self) -> Option<TransitionGuard<'_>> {
        if self.updating.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(TransitionGuard {
            flag: &self.updating,
        })
    }
}
