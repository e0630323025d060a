//! Supersession of in-flight backend requests.
//!
//! Only the most recently started request may commit its result; starting a
//! new one cancels the previous.

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Default)]
struct TrackerState {
    latest: u64,
    current: Option<CancellationToken>,
}

/// Hands out [`RequestTicket`]s. Clones share the same sequence.
#[derive(Debug, Clone, Default)]
pub struct RequestTracker {
    state: Arc<Mutex<TrackerState>>,
}

#[derive(Debug, Clone)]
pub struct RequestTicket {
    seq: u64,
    token: CancellationToken,
}

impl RequestTicket {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Run `fut` unless the ticket gets cancelled first. `None` when superseded.
    pub async fn run<F, T>(&self, fut: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            _ = self.token.cancelled() => None,
            result = fut => Some(result),
        }
    }
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start a request, cancelling whatever was in flight.
    pub fn begin(&self) -> RequestTicket {
        let mut state = self.lock();
        if let Some(previous) = state.current.take() {
            debug!("Request {} superseded", state.latest);
            previous.cancel();
        }
        state.latest += 1;
        let token = CancellationToken::new();
        state.current = Some(token.clone());
        RequestTicket {
            seq: state.latest,
            token,
        }
    }

    pub fn is_current(&self, ticket: &RequestTicket) -> bool {
        let state = self.lock();
        ticket.seq == state.latest && !ticket.token.is_cancelled()
    }

    /// Mark `ticket` finished. Returns whether its result may be applied.
    pub fn finish(&self, ticket: &RequestTicket) -> bool {
        let mut state = self.lock();
        if ticket.seq != state.latest || ticket.token.is_cancelled() {
            return false;
        }
        state.current = None;
        true
    }

    pub fn cancel_all(&self) {
        let mut state = self.lock();
        if let Some(current) = state.current.take() {
            current.cancel();
        }
    }

    pub fn in_flight(&self) -> bool {
        self.lock().current.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_new_request_supersedes_previous() {
        let tracker = RequestTracker::new();
        let first = tracker.begin();
        let second = tracker.begin();

        assert!(first.is_cancelled());
        assert!(!tracker.is_current(&first));
        assert!(tracker.is_current(&second));
        assert!(!tracker.finish(&first));
        assert!(tracker.finish(&second));
        assert!(!tracker.in_flight());
    }

    #[test]
    fn test_cancel_all() {
        let tracker = RequestTracker::new();
        let ticket = tracker.begin();
        tracker.cancel_all();
        assert!(ticket.is_cancelled());
        assert!(!tracker.finish(&ticket));
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_run_returns_none() {
        let tracker = RequestTracker::new();
        let first = tracker.begin();

        let slow = tokio::spawn({
            let first = first.clone();
            async move {
                first
                    .run(async {
                        tokio::time::sleep(Duration::from_secs(10)).await;
                        1
                    })
                    .await
            }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = tracker.begin();
        assert_eq!(second.run(async { 2 }).await, Some(2));
        assert_eq!(slow.await.unwrap(), None);
    }
}
