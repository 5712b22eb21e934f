//! Cancellation and deadlines for blocking FTP operations
//!
//! Every blocking call in the client takes a [`Context`]. A context can be
//! cancelled through its [`CancelHandle`] or expire at a deadline, and
//! child contexts observe their parent's cancellation.
//!
//! Two ways of honouring a context are offered:
//!
//! - [`Context::run`] executes work on a background thread and races its
//!   result against the signal. When the signal wins, the caller gets the
//!   cancellation error at once but the work keeps running to completion.
//!   [`Context::race`] does the same without the up-front check.
//!   Control-connection exchanges go through these so that a reply is never
//!   left half-read on the socket.
//! - [`Context::check`] only looks at the signal before an operation
//!   starts. Data-connection reads and writes use this.

use log::debug;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{FtpError, Result};

type Watcher = Box<dyn FnOnce(Reason) + Send>;

/// Why a context stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reason {
    Canceled,
    DeadlineExceeded,
}

impl Reason {
    fn into_error(self) -> FtpError {
        match self {
            Reason::Canceled => FtpError::Canceled,
            Reason::DeadlineExceeded => FtpError::DeadlineExceeded,
        }
    }
}

/// Shared cancellation state behind a context and its handle
struct Signal {
    deadline: Option<Instant>,
    state: Mutex<SignalState>,
    parent: Option<(Arc<Signal>, u64)>,
}

#[derive(Default)]
struct SignalState {
    reason: Option<Reason>,
    next_id: u64,
    watchers: Vec<(u64, Watcher)>,
}

impl Signal {
    fn lock(&self) -> MutexGuard<'_, SignalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reason(&self) -> Option<Reason> {
        if let Some(reason) = self.lock().reason {
            return Some(reason);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Reason::DeadlineExceeded),
            _ => None,
        }
    }

    /// Register a callback for cancellation. Fires immediately (and returns
    /// `None`) if the signal was already cancelled.
    fn watch(&self, watcher: Watcher) -> Option<u64> {
        let mut state = self.lock();
        if let Some(reason) = state.reason {
            drop(state);
            watcher(reason);
            return None;
        }
        let id = state.next_id;
        state.next_id += 1;
        state.watchers.push((id, watcher));
        Some(id)
    }

    fn unwatch(&self, id: u64) {
        self.lock().watchers.retain(|(watch_id, _)| *watch_id != id);
    }

    fn cancel(&self, reason: Reason) {
        let watchers = {
            let mut state = self.lock();
            if state.reason.is_some() {
                return;
            }
            state.reason = Some(reason);
            std::mem::take(&mut state.watchers)
        };
        for (_, watcher) in watchers {
            watcher(reason);
        }
    }
}

impl Drop for Signal {
    fn drop(&mut self) {
        if let Some((parent, id)) = &self.parent {
            parent.unwatch(*id);
        }
    }
}

/// Outcome of a background operation raced against the signal
enum Outcome<T> {
    Finished(std::result::Result<T, Box<dyn Any + Send>>),
    Stopped(Reason),
}

/// Cancellation and deadline signal passed to every blocking operation
#[derive(Clone, Default)]
pub struct Context {
    signal: Option<Arc<Signal>>,
}

/// Cancels the context it was created with, and that context's children
#[derive(Clone)]
pub struct CancelHandle {
    signal: Arc<Signal>,
}

impl CancelHandle {
    /// Fire the signal. Later calls have no effect.
    pub fn cancel(&self) {
        self.signal.cancel(Reason::Canceled);
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("canceled", &self.signal.reason().is_some())
            .finish()
    }
}

impl Context {
    /// A context that never fires. Operations under it run inline on the
    /// calling thread.
    pub fn background() -> Self {
        Self { signal: None }
    }

    /// Derive a context that is cancelled by the returned handle or by
    /// this context
    pub fn with_cancel(&self) -> (Context, CancelHandle) {
        self.child(None)
    }

    /// Derive a context that also expires after `timeout`
    pub fn with_timeout(&self, timeout: Duration) -> (Context, CancelHandle) {
        self.child(Some(Instant::now() + timeout))
    }

    /// Derive a context that also expires at `deadline`
    pub fn with_deadline(&self, deadline: Instant) -> (Context, CancelHandle) {
        self.child(Some(deadline))
    }

    fn child(&self, deadline: Option<Instant>) -> (Context, CancelHandle) {
        let deadline = match (self.deadline(), deadline) {
            (Some(parent), Some(own)) => Some(parent.min(own)),
            (parent, own) => parent.or(own),
        };

        let signal = Arc::new_cyclic(|weak: &std::sync::Weak<Signal>| {
            let parent = self.signal.as_ref().and_then(|parent| {
                let child = weak.clone();
                let id = parent.watch(Box::new(move |reason| {
                    if let Some(child) = child.upgrade() {
                        child.cancel(reason);
                    }
                }))?;
                Some((Arc::clone(parent), id))
            });

            // A parent that is already cancelled passes that on right away
            let reason = self.signal.as_ref().and_then(|parent| parent.lock().reason);

            Signal {
                deadline,
                state: Mutex::new(SignalState {
                    reason,
                    ..SignalState::default()
                }),
                parent,
            }
        });

        (
            Context {
                signal: Some(Arc::clone(&signal)),
            },
            CancelHandle { signal },
        )
    }

    /// The earliest deadline in this context's chain, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.signal.as_ref().and_then(|signal| signal.deadline)
    }

    /// Time left before the deadline, if there is one
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// The cancellation error, once the signal has fired
    pub fn err(&self) -> Option<FtpError> {
        self.signal
            .as_ref()
            .and_then(|signal| signal.reason())
            .map(Reason::into_error)
    }

    /// Fail with the cancellation error if the signal has already fired
    pub fn check(&self) -> Result<()> {
        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Run blocking `work` under this context.
    ///
    /// Returns the cancellation error as soon as the signal fires. Work that
    /// has started is never interrupted; its result is dropped when nobody
    /// is waiting for it any more. Work is not started at all if the signal
    /// has already fired.
    pub fn run<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        self.check()?;
        self.race(work)
    }

    /// Like [`run`](Self::run), but starts `work` even if the signal has
    /// already fired. Used for reads the protocol obliges the client to
    /// make no matter what.
    pub fn race<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let Some(signal) = &self.signal else {
            return Ok(work());
        };

        let (tx, rx) = mpsc::channel();
        let waker = tx.clone();

        // Watch first: a signal that has already fired is reported ahead
        // of any result
        let watch_id = signal.watch(Box::new(move |reason| {
            let _ = waker.send(Outcome::Stopped(reason));
        }));

        let spawned = thread::Builder::new()
            .name("rax-ftp-op".to_string())
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(work));
                let _ = tx.send(Outcome::Finished(result));
            });
        if let Err(e) = spawned {
            if let Some(id) = watch_id {
                signal.unwatch(id);
            }
            return Err(FtpError::Io(e));
        }

        let outcome = match (signal.reason(), signal.deadline) {
            (Some(reason), _) => Outcome::Stopped(reason),
            (None, Some(deadline)) => {
                match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                    Ok(outcome) => outcome,
                    Err(RecvTimeoutError::Timeout) => Outcome::Stopped(Reason::DeadlineExceeded),
                    Err(RecvTimeoutError::Disconnected) => Outcome::Stopped(Reason::Canceled),
                }
            }
            (None, None) => rx.recv().unwrap_or(Outcome::Stopped(Reason::Canceled)),
        };

        if let Some(id) = watch_id {
            signal.unwatch(id);
        }

        match outcome {
            Outcome::Finished(Ok(value)) => Ok(value),
            Outcome::Finished(Err(payload)) => panic::resume_unwind(payload),
            Outcome::Stopped(reason) => {
                debug!("Abandoning in-flight operation: {:?}", reason);
                Err(reason.into_error())
            }
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.signal {
            None => write!(f, "Context(background)"),
            Some(signal) => f
                .debug_struct("Context")
                .field("deadline", &signal.deadline)
                .field("stopped", &signal.reason())
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_background_runs_inline() {
        let ctx = Context::background();
        let caller = thread::current().id();
        let worker = ctx.run(move || thread::current().id()).unwrap();
        assert_eq!(caller, worker);
        assert!(ctx.err().is_none());
        assert!(ctx.deadline().is_none());
    }

    #[test]
    fn test_cancelled_context_does_not_start_work() {
        let (ctx, cancel) = Context::background().with_cancel();
        cancel.cancel();

        let started = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&started);
        let result = ctx.run(move || flag.store(true, Ordering::SeqCst));

        assert!(matches!(result, Err(FtpError::Canceled)));
        thread::sleep(Duration::from_millis(50));
        assert!(!started.load(Ordering::SeqCst));
    }

    #[test]
    fn test_cancel_returns_early_and_work_keeps_running() {
        let (ctx, cancel) = Context::background().with_cancel();
        let (done_tx, done_rx) = mpsc::channel();

        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            cancel.cancel();
        });

        let started = Instant::now();
        let result = ctx.run(move || {
            thread::sleep(Duration::from_millis(300));
            let _ = done_tx.send(());
        });

        assert!(matches!(result, Err(FtpError::Canceled)));
        assert!(started.elapsed() < Duration::from_millis(300));
        canceller.join().unwrap();

        // The abandoned work still finishes
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_timeout_expires() {
        let (ctx, _cancel) = Context::background().with_timeout(Duration::from_millis(20));
        let result = ctx.run(|| thread::sleep(Duration::from_millis(300)));
        assert!(matches!(result, Err(FtpError::DeadlineExceeded)));
        assert!(matches!(ctx.check(), Err(FtpError::DeadlineExceeded)));
    }

    #[test]
    fn test_work_finishing_first_wins() {
        let (ctx, _cancel) = Context::background().with_timeout(Duration::from_secs(5));
        assert_eq!(ctx.run(|| 42).unwrap(), 42);
        assert!(ctx.check().is_ok());
    }

    #[test]
    fn test_child_observes_parent_cancellation() {
        let (parent, cancel_parent) = Context::background().with_cancel();
        let (child, cancel_child) = parent.with_cancel();
        let (sibling, _) = parent.with_cancel();

        cancel_child.cancel();
        assert!(matches!(child.check(), Err(FtpError::Canceled)));
        assert!(parent.check().is_ok());
        assert!(sibling.check().is_ok());

        cancel_parent.cancel();
        assert!(matches!(sibling.check(), Err(FtpError::Canceled)));
    }

    #[test]
    fn test_child_of_cancelled_parent_starts_cancelled() {
        let (parent, cancel) = Context::background().with_cancel();
        cancel.cancel();
        let (child, _) = parent.with_timeout(Duration::from_secs(60));
        assert!(matches!(child.check(), Err(FtpError::Canceled)));
    }

    #[test]
    fn test_child_deadline_never_outlives_parent() {
        let (parent, _) = Context::background().with_timeout(Duration::from_millis(50));
        let (child, _) = parent.with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());
    }

    #[test]
    fn test_race_starts_work_after_cancellation() {
        let (ctx, cancel) = Context::background().with_cancel();
        cancel.cancel();

        let (done_tx, done_rx) = mpsc::channel();
        let result = ctx.race(move || {
            thread::sleep(Duration::from_millis(100));
            let _ = done_tx.send(());
        });

        assert!(matches!(result, Err(FtpError::Canceled)));
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    #[should_panic(expected = "boom")]
    fn test_panic_in_work_reaches_caller() {
        let (ctx, _cancel) = Context::background().with_cancel();
        let _ = ctx.run(|| panic!("boom"));
    }
}
