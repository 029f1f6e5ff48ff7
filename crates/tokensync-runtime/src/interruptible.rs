//! Supersede-on-call execution of cancellable async bodies.
//!
//! An [`Interruptible`] wraps one logical task. Every [`call`](Interruptible::call)
//! opens a new [`Epoch`] and cancels the one before it, so only the most recently
//! issued call can ever produce a visible result. Bodies cooperate by routing each
//! suspension point through [`Epoch::step`], which refuses to resume a body whose
//! epoch is no longer current. Side effects a body performed before it was
//! superseded are not rolled back.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use tokensync_runtime::{CallOutcome, Interrupted, Interruptible};
//!
//! async fn example() {
//!     let task = Interruptible::new("sync");
//!
//!     let outcome = task
//!         .call(|epoch| async move {
//!             epoch.step(tokio::time::sleep(Duration::from_millis(10))).await?;
//!             Ok::<_, Interrupted>(42)
//!         })
//!         .await;
//!
//!     assert_eq!(outcome, Ok(CallOutcome::Completed(42)));
//! }
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, Instrument};

/// Returned by an [`Epoch`] check once a newer call (or an explicit interrupt)
/// has superseded it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("superseded by a newer call")]
pub struct Interrupted;

/// How a call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome<T> {
    /// The body ran to completion while its epoch was still current.
    Completed(T),
    /// The call was superseded. Whatever the body produced is discarded.
    Interrupted,
}

impl<T> CallOutcome<T> {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, CallOutcome::Interrupted)
    }

    pub fn completed(self) -> Option<T> {
        match self {
            CallOutcome::Completed(value) => Some(value),
            CallOutcome::Interrupted => None,
        }
    }
}

#[derive(Debug)]
struct Current {
    epoch: u64,
    signal: CancellationToken,
}

#[derive(Debug)]
struct Inner {
    name: String,
    called: AtomicBool,
    current: Mutex<Current>,
}

/// Handle to one logical interruptible task.
///
/// Cloning the handle shares the epoch state; independent tasks should each
/// create their own handle.
#[derive(Debug, Clone)]
pub struct Interruptible {
    inner: Arc<Inner>,
}

impl Interruptible {
    /// Create a new interruptible task.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                called: AtomicBool::new(false),
                current: Mutex::new(Current {
                    epoch: 0,
                    signal: CancellationToken::new(),
                }),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether [`call`](Self::call) was ever issued. Never resets.
    pub fn has_been_called(&self) -> bool {
        self.inner.called.load(Ordering::SeqCst)
    }

    /// The most recent epoch number. Starts at 0 and only grows.
    pub fn current_epoch(&self) -> u64 {
        self.inner.current.lock().epoch
    }

    /// Invalidate the in-flight call, if any, and fire its cancellation signal.
    pub fn interrupt(&self) {
        let (epoch, previous) = {
            let mut current = self.inner.current.lock();
            current.epoch += 1;
            let previous = std::mem::replace(&mut current.signal, CancellationToken::new());
            (current.epoch, previous)
        };

        debug!(task = %self.inner.name, epoch, "Interrupting in-flight call");
        previous.cancel();
    }

    /// Start a new call of `body`, superseding any earlier one.
    ///
    /// The epoch is opened as soon as this method is invoked, not when the
    /// returned future is first polled, so supersession follows invocation order.
    /// The previous epoch's signal is cancelled before the new body starts.
    ///
    /// Resolves to [`CallOutcome::Completed`] only when the body finished while
    /// its epoch was still current. A superseded call resolves to
    /// [`CallOutcome::Interrupted`] and its output, error included, is dropped.
    pub fn call<F, Fut, T, E>(
        &self,
        body: F,
    ) -> impl Future<Output = Result<CallOutcome<T>, E>> + use<F, Fut, T, E>
    where
        F: FnOnce(Epoch) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let epoch = self.begin();
        let span = tracing::debug_span!(
            "interruptible_call",
            task = %self.inner.name,
            epoch = epoch.id,
        );

        async move {
            let watcher = epoch.clone();
            let result = body(epoch).await;

            if !watcher.is_current() {
                debug!("Call superseded, discarding its result");
                return Ok(CallOutcome::Interrupted);
            }

            debug!(ok = result.is_ok(), "Call finished");
            result.map(CallOutcome::Completed)
        }
        .instrument(span)
    }

    fn begin(&self) -> Epoch {
        let (id, signal, previous) = {
            let mut current = self.inner.current.lock();
            current.epoch += 1;
            let signal = CancellationToken::new();
            let previous = std::mem::replace(&mut current.signal, signal.clone());
            (current.epoch, signal, previous)
        };

        self.inner.called.store(true, Ordering::SeqCst);
        previous.cancel();

        Epoch {
            id,
            signal,
            inner: self.inner.clone(),
        }
    }
}

/// One call's view of its task: its epoch number and cancellation signal.
#[derive(Debug, Clone)]
pub struct Epoch {
    id: u64,
    signal: CancellationToken,
    inner: Arc<Inner>,
}

impl Epoch {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Cancellation signal of this epoch. Fires when the epoch is superseded or
    /// interrupted; hand it to I/O that should abort eagerly.
    pub fn signal(&self) -> &CancellationToken {
        &self.signal
    }

    /// Whether no newer call or interrupt has happened since this epoch opened.
    pub fn is_current(&self) -> bool {
        self.inner.current.lock().epoch == self.id
    }

    pub fn check(&self) -> Result<(), Interrupted> {
        if self.is_current() {
            Ok(())
        } else {
            Err(Interrupted)
        }
    }

    /// Await one step of the body.
    ///
    /// The step is not started when the epoch is already stale, and its output is
    /// withheld when the epoch went stale while it was running.
    pub async fn step<F: Future>(&self, future: F) -> Result<F::Output, Interrupted> {
        self.check()?;
        let output = future.await;
        self.check()?;
        Ok(output)
    }
}

#[cfg(test)]
#[path = "interruptible_tests.rs"]
mod tests;
