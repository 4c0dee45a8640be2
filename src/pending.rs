//! Client-side dispatch correlation.
//!
//! Responses come back on a single socket in whatever order handlers
//! finish. [`PendingRequests`] maps each in-flight dispatch id to a
//! one-shot slot so the caller that sent the query is the one that wakes
//! up, and enforces the hard query timeout.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use crate::protocol::{Query, Response, TIMEOUT_MSG};

/// One-shot completion cell for a single in-flight query.
///
/// The sender side is taken by `set`, the receiver side by `get`; each
/// fires at most once.
struct PendingSlot {
    tx: Option<oneshot::Sender<Response>>,
    rx: Option<oneshot::Receiver<Response>>,
    /// Wall clock of the originating query, started at `add`.
    started: Instant,
}

/// Table of in-flight queries keyed by dispatch id.
pub(crate) struct PendingRequests {
    slots: Mutex<HashMap<i32, PendingSlot>>,
    hard_timeout: Duration,
}

impl PendingRequests {
    /// Create a table with the given hard query timeout.
    pub(crate) fn new(hard_timeout: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            hard_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<i32, PendingSlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a slot for an outbound query. The query's timer starts here.
    pub(crate) fn add(&self, query: &Query) {
        let (tx, rx) = oneshot::channel();
        self.lock().insert(
            query.dispatch,
            PendingSlot {
                tx: Some(tx),
                rx: Some(rx),
                started: Instant::now(),
            },
        );
    }

    /// Complete the slot for `dispatch`, if one exists.
    ///
    /// Stale responses (slot already gone, caller timed out or never
    /// existed) are dropped silently.
    pub(crate) fn set(&self, dispatch: i32, response: Response) {
        let tx = self.lock().get_mut(&dispatch).and_then(|slot| slot.tx.take());
        if let Some(tx) = tx {
            // The receiver may have been dropped by a racing timeout.
            let _ = tx.send(response);
        }
    }

    /// Wait for the response to `dispatch` and remove the slot.
    ///
    /// The wait is bounded by `hard_timeout` minus the time already spent
    /// since `add`, clamped to zero: an overdue call returns a synthesized
    /// timeout response without suspending. The timeout response carries
    /// `ok = false`, the `"timeout"` message, and the requested dispatch.
    pub(crate) async fn get(&self, dispatch: i32) -> Response {
        let rx = {
            let mut slots = self.lock();
            match slots.get_mut(&dispatch) {
                Some(slot) => slot.rx.take().map(|rx| (rx, slot.started)),
                None => None,
            }
        };

        let response = match rx {
            Some((rx, started)) => {
                let remaining = self.hard_timeout.saturating_sub(started.elapsed());
                if remaining.is_zero() {
                    Response::failure(dispatch, TIMEOUT_MSG)
                } else {
                    match tokio::time::timeout(remaining, rx).await {
                        Ok(Ok(response)) => response,
                        // Expired, or the sender vanished without firing.
                        _ => Response::failure(dispatch, TIMEOUT_MSG),
                    }
                }
            }
            None => Response::failure(dispatch, TIMEOUT_MSG),
        };

        self.delete(dispatch);
        response
    }

    /// Remove the slot for `dispatch` (idempotent).
    pub(crate) fn delete(&self, dispatch: i32) {
        self.lock().remove(&dispatch);
    }

    /// Number of in-flight slots.
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }
}
