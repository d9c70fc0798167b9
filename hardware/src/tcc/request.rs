//! Pending status requests.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use super::state::TccState;
use super::{TccError, TccResult};

/// Progress of a status request. Leaves `Running` at most once.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestState {
    Running,
    Done(TccState),
    Failed(TccError),
}

impl RequestState {
    pub fn is_finished(&self) -> bool {
        !matches!(self, RequestState::Running)
    }
}

fn finish(tx: &watch::Sender<RequestState>, outcome: RequestState) -> bool {
    tx.send_if_modified(|current| {
        if current.is_finished() {
            false
        } else {
            *current = outcome;
            true
        }
    })
}

/// Link-side half of a status request.
#[derive(Debug, Clone)]
pub(crate) struct PendingStatus {
    tx: Arc<watch::Sender<RequestState>>,
    deadline: Instant,
    timeout: Duration,
}

impl PendingStatus {
    /// Mark a running request done. Past the deadline it fails with a
    /// timeout instead. Returns true only if the request became `Done`.
    pub(crate) fn complete(&self, state: &TccState) -> bool {
        if self.is_expired() {
            self.fail(TccError::Timeout(self.timeout));
            return false;
        }
        finish(&self.tx, RequestState::Done(state.clone()))
    }

    /// Mark a running request failed. Returns false if it had already finished.
    pub(crate) fn fail(&self, error: TccError) -> bool {
        finish(&self.tx, RequestState::Failed(error))
    }

    pub(crate) fn is_same(&self, other: &PendingStatus) -> bool {
        Arc::ptr_eq(&self.tx, &other.tx)
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Handle to an in-flight `device status` query.
///
/// The request completes when the TCC has reported both the instrument number
/// and the axis states again, fails when superseded or when the connection
/// cannot be established, and times out once its deadline passes. A reply
/// arriving after the deadline cannot complete it.
#[derive(Debug, Clone)]
pub struct StatusRequest {
    generation: u64,
    pending: PendingStatus,
    rx: watch::Receiver<RequestState>,
}

impl StatusRequest {
    pub(crate) fn start(generation: u64, timeout: Duration) -> (Self, PendingStatus) {
        let (tx, rx) = watch::channel(RequestState::Running);
        let pending = PendingStatus {
            tx: Arc::new(tx),
            deadline: Instant::now() + timeout,
            timeout,
        };
        let request = Self {
            generation,
            pending: pending.clone(),
            rx,
        };
        (request, pending)
    }

    /// A request that has already failed, for when nothing could be sent.
    pub(crate) fn failed(generation: u64, error: TccError) -> Self {
        let (request, pending) = Self::start(generation, Duration::ZERO);
        pending.fail(error);
        request
    }

    /// Sequence number of this request on its link.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Current state, applying the timeout if the deadline has passed.
    pub fn state(&self) -> RequestState {
        if !self.rx.borrow().is_finished() && self.pending.is_expired() {
            self.pending.fail(TccError::Timeout(self.pending.timeout));
        }
        self.rx.borrow().clone()
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state(), RequestState::Done(_))
    }

    /// Wait for the request to finish.
    pub async fn wait(self) -> TccResult<TccState> {
        let timeout = self.pending.timeout;
        let mut rx = self.rx.clone();
        let finished = tokio::time::timeout_at(self.pending.deadline, async {
            rx.wait_for(RequestState::is_finished)
                .await
                .map(|state| state.clone())
        })
        .await;

        let outcome = match finished {
            Ok(Ok(state)) => state,
            // The request holds its own sender, so the channel cannot close.
            Ok(Err(_)) => RequestState::Failed(TccError::Connection(
                "status request abandoned".to_string(),
            )),
            Err(_) => {
                self.pending.fail(TccError::Timeout(timeout));
                self.rx.borrow().clone()
            }
        };

        match outcome {
            RequestState::Done(state) => Ok(state),
            RequestState::Failed(e) => Err(e),
            RequestState::Running => Err(TccError::Timeout(timeout)),
        }
    }
}
