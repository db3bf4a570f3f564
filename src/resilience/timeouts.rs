//! Request deadlines and the cancellation gate.
//!
//! A request's filesystem work runs on the blocking pool, which cannot be
//! aborted. The [`CancelGate`] decides, with a single compare-and-swap, whether
//! the request reaches AUTHORIZED or is CANCELLED by its deadline first. Work
//! that lost the race performs no file-operation I/O; work that won it runs to
//! completion even if the caller has already been answered with 504.

use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant};

use crate::gatekeeper::GateError;

const PENDING: u8 = 0;
const AUTHORIZED: u8 = 1;
const CANCELLED: u8 = 2;

/// Observable state of a [`CancelGate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Pending,
    Authorized,
    Cancelled,
}

/// One-shot PENDING -> AUTHORIZED | CANCELLED transition.
#[derive(Debug, Default)]
pub struct CancelGate {
    state: AtomicU8,
}

impl CancelGate {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(PENDING),
        }
    }

    /// Commit to running the operation. Fails if the deadline already fired.
    pub fn authorize(&self) -> Result<(), GateError> {
        self.state
            .compare_exchange(PENDING, AUTHORIZED, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| GateError::Timeout)
    }

    /// Cancel a pending request. Returns `false` if it was already authorized.
    pub fn cancel(&self) -> bool {
        self.state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == GateState::Cancelled
    }

    pub fn state(&self) -> GateState {
        match self.state.load(Ordering::Acquire) {
            PENDING => GateState::Pending,
            AUTHORIZED => GateState::Authorized,
            _ => GateState::Cancelled,
        }
    }
}

/// Deadline covering one request, paired with its cancellation gate.
#[derive(Debug, Clone)]
pub struct RequestDeadline {
    at: Instant,
    gate: Arc<CancelGate>,
}

impl RequestDeadline {
    /// Start the clock now.
    pub fn start(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            gate: Arc::new(CancelGate::new()),
        }
    }

    pub fn gate(&self) -> Arc<CancelGate> {
        Arc::clone(&self.gate)
    }

    /// Drive `fut` until it completes or the deadline passes.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, GateError>
    where
        F: Future<Output = Result<T, GateError>>,
    {
        match time::timeout_at(self.at, fut).await {
            Ok(result) => result,
            Err(_) => {
                if self.gate.cancel() {
                    tracing::warn!("Request deadline elapsed before authorization");
                } else {
                    tracing::warn!("Request deadline elapsed during an authorized operation");
                }
                Err(GateError::Timeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorize_then_cancel_is_noop() {
        let gate = CancelGate::new();
        assert_eq!(gate.state(), GateState::Pending);
        assert!(gate.authorize().is_ok());
        assert!(!gate.cancel());
        assert_eq!(gate.state(), GateState::Authorized);
    }

    #[test]
    fn test_cancel_then_authorize_fails() {
        let gate = CancelGate::new();
        assert!(gate.cancel());
        assert!(matches!(gate.authorize(), Err(GateError::Timeout)));
        assert!(gate.is_cancelled());
    }

    #[test]
    fn test_only_one_side_wins() {
        let gate = Arc::new(CancelGate::new());
        let authorizer = {
            let gate = Arc::clone(&gate);
            std::thread::spawn(move || gate.authorize().is_ok())
        };
        let cancelled = gate.cancel();
        let authorized = authorizer.join().unwrap();
        assert_ne!(authorized, cancelled);
    }

    #[tokio::test]
    async fn test_deadline_passes_result_through() {
        let deadline = RequestDeadline::start(Duration::from_secs(1));
        let value = deadline.run(async { Ok::<_, GateError>(7) }).await.unwrap();
        assert_eq!(value, 7);
        assert_eq!(deadline.gate().state(), GateState::Pending);
    }

    #[tokio::test]
    async fn test_elapsed_deadline_cancels_pending_work() {
        let deadline = RequestDeadline::start(Duration::from_millis(20));
        let gate = deadline.gate();

        let result = deadline
            .run(async {
                time::sleep(Duration::from_secs(5)).await;
                Ok::<_, GateError>(())
            })
            .await;

        assert!(matches!(result, Err(GateError::Timeout)));
        assert!(gate.is_cancelled());
        assert!(gate.authorize().is_err());
    }
}
