//! Connection draining for graceful server shutdown.
//!
//! [`ShutdownState`] is shared between the signal handler, the accept loop,
//! and the per-connection handlers. Every connection is admitted through
//! [`ShutdownState::admit_session`] and holds the returned ticket for its
//! lifetime. Once draining begins no further sessions are admitted, and the
//! application layer can wait until the in-flight count reaches zero before
//! tearing the process down.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

/// Shared drain state for coordinating graceful shutdown.
///
/// Cloning is cheap; all clones observe the same underlying state.
#[derive(Debug, Clone, Default)]
pub struct ShutdownState {
    inner: Arc<ShutdownInner>,
}

#[derive(Debug, Default)]
struct ShutdownInner {
    /// Set once shutdown begins; no further sessions are admitted
    draining: AtomicBool,
    /// Sessions admitted and not yet finished
    in_flight: AtomicUsize,
}

impl ShutdownState {
    /// Creates a state that is not draining and has no sessions in flight.
    pub fn new() -> Self {
        Self::default()
    }

    /// Switches into draining mode.
    ///
    /// From here on [`ShutdownState::admit_session`] refuses every caller.
    /// Calling this more than once is harmless.
    pub fn begin_drain(&self) {
        if !self.inner.draining.swap(true, Ordering::AcqRel) {
            info!("🛑 Draining - no new connections will be admitted");
        }
    }

    /// Returns true once draining has begun.
    pub fn is_draining(&self) -> bool {
        self.inner.draining.load(Ordering::Acquire)
    }

    /// Admits one session into the in-flight count.
    ///
    /// Returns `None` while draining. The returned ticket removes the
    /// session from the count when dropped, whichever way the connection
    /// ends.
    pub fn admit_session(&self) -> Option<SessionTicket> {
        if self.is_draining() {
            return None;
        }
        self.inner.in_flight.fetch_add(1, Ordering::AcqRel);
        Some(SessionTicket {
            inner: Arc::clone(&self.inner),
        })
    }

    /// Number of admitted sessions that have not finished yet.
    pub fn in_flight_sessions(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// True once draining has begun and every admitted session has finished.
    pub fn is_drained(&self) -> bool {
        self.is_draining() && self.in_flight_sessions() == 0
    }
}

/// Keeps one session counted as in flight until dropped.
#[derive(Debug)]
pub struct SessionTicket {
    inner: Arc<ShutdownInner>,
}

impl Drop for SessionTicket {
    fn drop(&mut self) {
        self.inner.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tickets_track_in_flight_sessions() {
        let state = ShutdownState::new();
        let first = state.admit_session().unwrap();
        let second = state.admit_session().unwrap();
        assert_eq!(state.in_flight_sessions(), 2);

        drop(first);
        assert_eq!(state.in_flight_sessions(), 1);

        state.begin_drain();
        assert!(state.admit_session().is_none());
        assert!(!state.is_drained());

        drop(second);
        assert!(state.is_drained());
    }

    #[test]
    fn clones_share_drain_state() {
        let state = ShutdownState::new();
        assert!(!state.is_draining());
        assert!(!state.is_drained());

        let clone = state.clone();
        clone.begin_drain();
        clone.begin_drain(); // idempotent
        assert!(state.is_draining());
        assert!(state.is_drained());
    }
}
