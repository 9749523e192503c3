//! Bounded execution for fits and whole trial evaluations.
//!
//! Work runs on a supervised worker thread. The caller waits on a channel
//! with a deadline; if the deadline passes the worker is abandoned, its
//! [`CancelToken`] is tripped, and whatever it eventually produces is dropped.
//! Long-running estimator loops poll [`checkpoint`] so abandoned workers stop
//! early instead of burning CPU.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::{AllstarsError, Result};

/// Callback receiving a human-readable message when an operation times out.
pub type Notifier = Arc<dyn Fn(&str) + Send + Sync>;

/// Default notifier: log the message as a warning.
pub fn log_notifier() -> Notifier {
    Arc::new(|msg: &str| log::warn!("{}", msg))
}

/// Cooperative cancellation flag. A child token is cancelled when any ancestor is.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    parent: Option<Box<CancelToken>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Box::new(self.clone())),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self.parent.as_ref().map_or(false, |p| p.is_cancelled())
    }

    /// Error out if cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(AllstarsError::Cancelled)
        } else {
            Ok(())
        }
    }
}

thread_local! {
    static CURRENT: RefCell<CancelToken> = RefCell::new(CancelToken::new());
}

/// Token governing the current thread.
pub fn current() -> CancelToken {
    CURRENT.with(|t| t.borrow().clone())
}

/// Fail with [`AllstarsError::Cancelled`] if the current thread's work was abandoned.
pub fn checkpoint() -> Result<()> {
    CURRENT.with(|t| t.borrow().check())
}

/// Which timeout condition to raise when the deadline passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Fit,
    Trial,
}

/// Run `work` on a worker thread and wait at most `limit` for it.
///
/// On expiry the notifier receives the timeout message and the caller gets
/// [`AllstarsError::FitTimeout`] or [`AllstarsError::TrialTimeout`]. Nothing
/// the worker owns is handed back in that case.
pub fn run_with_timeout<T, F>(
    operation: &str,
    limit: Duration,
    bound: Bound,
    notifier: &Notifier,
    work: F,
) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let token = current().child();
    let worker_token = token.clone();
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name(format!("allstars-{}", operation))
        .spawn(move || {
            CURRENT.with(|t| *t.borrow_mut() = worker_token);
            // the receiver is gone once the caller gave up
            let _ = tx.send(work());
        })?;

    match rx.recv_timeout(limit) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => {
            token.cancel();
            let err = match bound {
                Bound::Fit => AllstarsError::FitTimeout {
                    operation: operation.to_string(),
                    limit: limit.as_secs(),
                },
                Bound::Trial => AllstarsError::TrialTimeout {
                    operation: operation.to_string(),
                    limit: limit.as_secs(),
                },
            };
            notifier(&err.to_string());
            Err(err)
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(AllstarsError::Estimator(format!(
            "worker for '{}' exited without a result",
            operation
        ))),
    }
}
