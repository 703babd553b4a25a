//! Cancellable background work.
//!
//! A handler often wants to push a piece of work off the request task and
//! still give up on it the moment the client goes away. [`CancellableTask`]
//! does exactly that:
//!
//! ```text
//!   caller ──spawn──▶ work ──send──▶ [ one-slot hand-off ]
//!     │                                      │
//!     └──────── select! { cancelled, slot } ◀┘
//! ```
//!
//! Whichever side of the `select!` resolves first decides the [`Outcome`].
//! A cancelled caller drops its end of the hand-off; the work keeps running
//! until it finishes on its own, and its late `send` simply hands the value
//! back instead of blocking. Nothing is aborted. Work that must stop early
//! has to watch the [`CancellationToken`] it is given.
//!
//! ```rust,no_run
//! use kairo::{CancellableTask, Outcome};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() {
//! let cancel = CancellationToken::new();
//! let outcome = CancellableTask::new(|n: u64, _cancel: CancellationToken| async move {
//!     Ok::<_, std::io::Error>(n * 2)
//! })
//! .run(21, &cancel)
//! .await;
//!
//! match outcome {
//!     Outcome::Completed(Ok(v)) => assert_eq!(v, 42),
//!     Outcome::Completed(Err(e)) => eprintln!("work failed: {e}"),
//!     Outcome::Cancelled => {}
//! }
//! # }
//! ```

use std::future::Future;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

// ── Outcome ───────────────────────────────────────────────────────────────────

/// The terminal state of one invocation. Exactly one is ever produced.
#[derive(Debug)]
pub enum Outcome<T, E> {
    /// The work finished first. Carries its result, success or failure.
    Completed(Result<T, Failure<E>>),
    /// The token fired first. The work's result, if any, is discarded.
    Cancelled,
}

impl<T, E> Outcome<T, E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the work's result, or `None` if the invocation was cancelled.
    pub fn completed(self) -> Option<Result<T, Failure<E>>> {
        match self {
            Self::Completed(result) => Some(result),
            Self::Cancelled => None,
        }
    }
}

/// Why completed work carries no value.
#[derive(Debug, thiserror::Error)]
pub enum Failure<E> {
    /// The work returned `Err`.
    #[error("{0}")]
    Work(E),

    /// The work panicked; its end of the hand-off was dropped unsent.
    #[error("work panicked before producing a result")]
    Panicked,
}

// ── CancellableTask ───────────────────────────────────────────────────────────

/// Async work raced against a [`CancellationToken`].
///
/// The work closure is called on the caller's task to build its future,
/// which is then spawned onto the runtime. It receives a clone of the
/// caller's token so it can stop cooperatively.
pub struct CancellableTask<F> {
    work: F,
    label: &'static str,
}

impl<F> CancellableTask<F> {
    pub fn new<I, Fut>(work: F) -> Self
    where
        F: FnOnce(I, CancellationToken) -> Fut,
    {
        Self { work, label: "task" }
    }

    /// Name used in log events.
    pub fn label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    /// Runs the work and waits for it or for `cancel`, whichever comes first.
    ///
    /// A token that is already cancelled short-circuits: the work is never
    /// started.
    pub async fn run<I, Fut, T, E>(self, input: I, cancel: &CancellationToken) -> Outcome<T, E>
    where
        F: FnOnce(I, CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        if cancel.is_cancelled() {
            debug!(task = self.label, "already cancelled, work not started");
            return Outcome::Cancelled;
        }

        let (slot, handoff) = oneshot::channel();
        let work = (self.work)(input, cancel.clone());
        let label = self.label;

        // JoinHandle dropped; the task runs detached.
        tokio::spawn(async move {
            if slot.send(work.await).is_err() {
                debug!(task = label, "caller gone, late result discarded");
            }
        });

        wait(handoff, cancel, label).await
    }
}

// ── BlockingTask ──────────────────────────────────────────────────────────────

/// Synchronous work run on tokio's blocking pool, raced against a token.
///
/// Same contract as [`CancellableTask`]. Use it for CPU-bound or blocking
/// I/O work that must not sit on a runtime worker thread.
pub struct BlockingTask<F> {
    work: F,
    label: &'static str,
}

impl<F> BlockingTask<F> {
    pub fn new<I, T, E>(work: F) -> Self
    where
        F: FnOnce(I, CancellationToken) -> Result<T, E>,
    {
        Self { work, label: "blocking_task" }
    }

    pub fn label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    pub async fn run<I, T, E>(self, input: I, cancel: &CancellationToken) -> Outcome<T, E>
    where
        F: FnOnce(I, CancellationToken) -> Result<T, E> + Send + 'static,
        I: Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        if cancel.is_cancelled() {
            debug!(task = self.label, "already cancelled, work not started");
            return Outcome::Cancelled;
        }

        let (slot, handoff) = oneshot::channel();
        let work = self.work;
        let token = cancel.clone();
        let label = self.label;

        tokio::task::spawn_blocking(move || {
            if slot.send(work(input, token)).is_err() {
                debug!(task = label, "caller gone, late result discarded");
            }
        });

        wait(handoff, cancel, label).await
    }
}

// ── Shared wait ───────────────────────────────────────────────────────────────

/// The single suspension point of an invocation.
///
/// `biased` polls the token first: if both sides are ready on the same poll,
/// cancellation wins. Returning drops `handoff`, so nothing sent afterwards
/// can reach the caller.
async fn wait<T, E>(
    handoff: oneshot::Receiver<Result<T, E>>,
    cancel: &CancellationToken,
    label: &'static str,
) -> Outcome<T, E> {
    tokio::select! {
        biased;

        () = cancel.cancelled() => {
            debug!(task = label, "cancelled, abandoning work");
            Outcome::Cancelled
        }

        received = handoff => match received {
            Ok(result) => Outcome::Completed(result.map_err(Failure::Work)),
            Err(_) => {
                warn!(task = label, "work ended without a result");
                Outcome::Completed(Err(Failure::Panicked))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use tokio::time::{Instant, sleep};

    use super::*;

    fn cancel_after(cancel: &CancellationToken, after: Duration) {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            sleep(after).await;
            cancel.cancel();
        });
    }

    #[tokio::test(start_paused = true)]
    async fn fast_work_completes_before_cancellation() {
        let cancel = CancellationToken::new();
        cancel_after(&cancel, Duration::from_millis(50));

        let outcome = CancellableTask::new(|n: u32, _: CancellationToken| async move {
            sleep(Duration::from_millis(10)).await;
            Ok::<_, String>(n + 1)
        })
        .run(41, &cancel)
        .await;

        assert!(matches!(outcome, Outcome::Completed(Ok(42))));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_work_is_abandoned_at_cancellation() {
        let cancel = CancellationToken::new();
        cancel_after(&cancel, Duration::from_millis(10));
        let started = Instant::now();

        let outcome = CancellableTask::new(|_: (), _: CancellationToken| async move {
            sleep(Duration::from_millis(200)).await;
            Ok::<_, String>("late")
        })
        .run((), &cancel)
        .await;

        assert!(outcome.is_cancelled());
        // Returns when the token fires, not when the work would have finished.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(10), "returned early: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(12), "returned late: {elapsed:?}");
    }

    #[tokio::test]
    async fn work_error_is_a_completion() {
        let cancel = CancellationToken::new();

        let outcome = CancellableTask::new(|_: (), _: CancellationToken| async move {
            Err::<(), _>("boom")
        })
        .run((), &cancel)
        .await;

        match outcome {
            Outcome::Completed(Err(Failure::Work(e))) => assert_eq!(e, "boom"),
            other => panic!("expected work failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn already_cancelled_token_skips_the_work() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let started = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&started);

        let outcome = CancellableTask::new(move |_: (), _: CancellationToken| {
            flag.store(true, Ordering::SeqCst);
            async move { Ok::<_, String>(()) }
        })
        .run((), &cancel)
        .await;

        assert!(outcome.is_cancelled());
        assert!(!started.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn late_result_does_not_block_the_worker() {
        let cancel = CancellationToken::new();
        cancel_after(&cancel, Duration::from_millis(5));
        let (done_tx, done_rx) = oneshot::channel();

        let outcome = CancellableTask::new(move |_: (), _: CancellationToken| async move {
            sleep(Duration::from_millis(100)).await;
            let _ = done_tx.send(());
            Ok::<_, String>("nobody is listening")
        })
        .run((), &cancel)
        .await;

        assert!(outcome.is_cancelled());
        // The abandoned worker still runs to the end and exits cleanly.
        done_rx.await.expect("worker should finish");
    }

    #[tokio::test(start_paused = true)]
    async fn work_can_observe_the_token() {
        let cancel = CancellationToken::new();
        cancel_after(&cancel, Duration::from_millis(5));
        let (stopped_tx, stopped_rx) = oneshot::channel();

        let outcome = CancellableTask::new(move |_: (), token: CancellationToken| async move {
            tokio::select! {
                () = token.cancelled() => {
                    let _ = stopped_tx.send(true);
                    Err("stopped")
                }
                () = sleep(Duration::from_secs(60)) => Ok(()),
            }
        })
        .run((), &cancel)
        .await;

        assert!(outcome.is_cancelled());
        assert!(stopped_rx.await.unwrap());
    }

    #[tokio::test]
    async fn panicking_work_reports_failure() {
        let cancel = CancellationToken::new();

        let outcome = CancellableTask::new(|_: (), _: CancellationToken| async move {
            if true {
                panic!("worker blew up");
            }
            Ok::<(), String>(())
        })
        .label("panics")
        .run((), &cancel)
        .await;

        assert!(matches!(outcome, Outcome::Completed(Err(Failure::Panicked))));
    }

    #[tokio::test]
    async fn blocking_work_completes() {
        let cancel = CancellationToken::new();

        let outcome = BlockingTask::new(|s: String, _: CancellationToken| {
            Ok::<_, String>(s.to_uppercase())
        })
        .run("hay".to_owned(), &cancel)
        .await;

        assert_eq!(outcome.completed().unwrap().unwrap(), "HAY");
    }

    #[tokio::test]
    async fn blocking_work_is_abandoned_on_cancel() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let started = std::time::Instant::now();

        let outcome = BlockingTask::new(|_: (), _: CancellationToken| {
            std::thread::sleep(Duration::from_millis(300));
            Ok::<_, String>(())
        })
        .run((), &cancel)
        .await;

        assert!(outcome.is_cancelled());
        assert!(started.elapsed() < Duration::from_millis(300));
    }
}
