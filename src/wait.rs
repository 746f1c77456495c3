//! Cooperative wait-for-state primitive with deadline and cancellation.
//!
//! Provider resources transition asynchronously through intermediate phases
//! before becoming usable, so the orchestrators block on [`await_state`]
//! between mutations. The loop re-fetches the resource, re-derives its
//! phase, and sleeps a fixed interval between attempts. Unlike the polling
//! the original system performed, every wait here carries a deadline and an
//! externally supplied cancellation signal, and fails fast when the observed
//! phase can no longer reach the target.

use std::future::Future;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::sleep;

use crate::provider::{NodeDescriptor, VolumeDescriptor};
use crate::state::{LifecycleState, NodeState, VolumeState};

/// Caller-held handle that aborts in-progress waits when triggered.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Signals every associated [`CancelSignal`] to abort.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Cancellation signal observed by the wait loop.
#[derive(Clone, Debug)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Returns a signal that never fires, for callers without a timeout of
    /// their own.
    #[must_use]
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Returns whether cancellation has already been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested; never resolves otherwise.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // The handle is gone and can no longer fire.
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Creates a connected cancellation handle and signal.
#[must_use]
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

/// Polling cadence and deadline for one wait.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WaitParams {
    /// Sleep between refresh attempts.
    pub poll_interval: Duration,
    /// Overall deadline for reaching the target state.
    pub wait_timeout: Duration,
}

/// Resource descriptors whose lifecycle phase can be re-derived after a
/// refresh.
pub trait Observed {
    /// State vocabulary for this resource kind.
    type State: LifecycleState;

    /// Returns the phase recorded in this descriptor.
    fn observed_state(&self) -> Self::State;
}

impl Observed for NodeDescriptor {
    type State = NodeState;

    fn observed_state(&self) -> NodeState {
        self.state
    }
}

impl Observed for VolumeDescriptor {
    type State = VolumeState;

    fn observed_state(&self) -> VolumeState {
        self.state
    }
}

/// Errors raised by [`await_state`].
#[derive(Debug, Error)]
pub enum WaitError<S, E>
where
    S: LifecycleState,
    E: std::error::Error + 'static,
{
    /// Raised when the deadline expires before the target state is observed.
    #[error("timed out waiting for state {target}; last observed state {observed}")]
    Timeout {
        /// State that was being waited for.
        target: S,
        /// State seen on the final refresh before the deadline.
        observed: S,
    },
    /// Raised when the resource disappears mid-wait.
    #[error("resource disappeared while waiting for state {target}")]
    Gone {
        /// State that was being waited for.
        target: S,
    },
    /// Raised when the observed phase can no longer reach the target.
    #[error("observed state {observed} can no longer reach {target}")]
    Unreachable {
        /// State that was being waited for.
        target: S,
        /// Incompatible state the resource was observed in.
        observed: S,
    },
    /// Raised when the caller's cancellation signal fires.
    #[error("wait cancelled by caller")]
    Cancelled,
    /// Wrapper for provider failures during a refresh.
    #[error("provider error while waiting: {0}")]
    Provider(#[source] E),
}

/// Polls `fetch` until the resource reports `target`, sleeping
/// `params.poll_interval` between attempts.
///
/// The resource is fetched at least once before any sleep. A refresh that
/// returns `None` fails the wait with [`WaitError::Gone`]; callers waiting
/// for a resource to be garbage-collected interpret that outcome themselves.
///
/// # Errors
///
/// Returns [`WaitError::Timeout`] with the last-observed state once the
/// deadline passes, [`WaitError::Unreachable`] as soon as the observed phase
/// is incompatible with the target, [`WaitError::Cancelled`] when the signal
/// fires, and [`WaitError::Provider`] for refresh failures.
pub async fn await_state<R, E, F, Fut>(
    mut fetch: F,
    target: R::State,
    params: &WaitParams,
    cancel: &CancelSignal,
) -> Result<R, WaitError<R::State, E>>
where
    R: Observed,
    E: std::error::Error + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<R>, E>>,
{
    let deadline = Instant::now() + params.wait_timeout;

    loop {
        if cancel.is_cancelled() {
            return Err(WaitError::Cancelled);
        }

        let resource = fetch()
            .await
            .map_err(WaitError::Provider)?
            .ok_or(WaitError::Gone { target })?;
        let observed = resource.observed_state();

        if observed == target {
            return Ok(resource);
        }
        if !observed.can_reach(target) {
            return Err(WaitError::Unreachable { target, observed });
        }
        if Instant::now() >= deadline {
            return Err(WaitError::Timeout { target, observed });
        }

        tokio::select! {
            () = cancel.cancelled() => return Err(WaitError::Cancelled),
            () = sleep(params.poll_interval) => {}
        }
    }
}
