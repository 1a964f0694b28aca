//! Bounded concurrent fan-out over independent records
//!
//! Each item runs as its own task; at most `limit` tasks are past the
//! semaphore at once. Cancelling the shared token stops new work, aborts
//! in-flight tasks and keeps everything that already completed.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info};

#[derive(Debug, Default)]
struct CancelState {
    flag: AtomicBool,
    notify: Notify,
}

/// Shared cancellation signal for a run
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if !self.state.flag.swap(true, Ordering::SeqCst) {
            self.state.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.flag.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called
    pub async fn cancelled(&self) {
        loop {
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Results of a fan-out, ordered by input position
#[derive(Debug)]
pub struct FanOut<R> {
    pub completed: Vec<(usize, R)>,
    pub cancelled: bool,
    /// Input positions that never completed (cancelled before or during their call)
    pub discarded: Vec<usize>,
}

impl<R> FanOut<R> {
    pub fn into_results(self) -> impl Iterator<Item = R> {
        self.completed.into_iter().map(|(_, r)| r)
    }
}

/// Run `task` over every item with at most `limit` in flight.
///
/// A task that finishes after cancellation is discarded, so the completed
/// set only holds work that finished before the signal.
pub async fn fan_out<T, R, F, Fut>(items: Vec<T>, limit: usize, cancel: &CancelToken, task: F) -> FanOut<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = R> + Send + 'static,
{
    let total = items.len();
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut join_set = JoinSet::new();

    for (index, item) in items.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let cancel = cancel.clone();
        let work = task(item);
        join_set.spawn(async move {
            let _permit = semaphore.acquire().await.ok()?;
            if cancel.is_cancelled() {
                return None;
            }
            let output = work.await;
            if cancel.is_cancelled() {
                return None;
            }
            Some((index, output))
        });
    }

    let mut completed = Vec::with_capacity(total);
    let mut cancelled = false;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled(), if !cancelled => {
                cancelled = true;
                info!(completed = completed.len(), total, "cancellation requested, aborting in-flight tasks");
                join_set.abort_all();
            }
            next = join_set.join_next() => match next {
                Some(Ok(Some(entry))) => completed.push(entry),
                Some(Ok(None)) => {}
                Some(Err(e)) if e.is_cancelled() => {}
                Some(Err(e)) => error!("record task panicked: {}", e),
                None => break,
            },
        }
    }

    completed.sort_by_key(|(index, _)| *index);
    let mut done = completed.iter().map(|(index, _)| *index).peekable();
    let discarded: Vec<usize> = (0..total)
        .filter(|index| {
            if done.peek() == Some(index) {
                done.next();
                false
            } else {
                true
            }
        })
        .collect();

    FanOut {
        completed,
        cancelled: cancelled || cancel.is_cancelled(),
        discarded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn test_results_in_input_order() {
        let cancel = CancelToken::new();
        let out = fan_out((0..20u64).collect(), 4, &cancel, |i| async move {
            tokio::time::sleep(Duration::from_millis(20 - i)).await;
            i * 2
        })
        .await;

        assert!(!out.cancelled);
        assert!(out.discarded.is_empty());
        let values: Vec<_> = out.into_results().collect();
        assert_eq!(values, (0..20u64).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let cancel = CancelToken::new();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let out = fan_out((0..16).collect::<Vec<u32>>(), 3, &cancel, |_| {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await;

        assert_eq!(out.completed.len(), 16);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_cancel_keeps_completed_and_discards_in_flight() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();

        let out = fan_out((0..10u64).collect(), 2, &cancel, move |i| {
            let trigger = trigger.clone();
            async move {
                if i < 2 {
                    return i;
                }
                if i == 2 {
                    trigger.cancel();
                }
                tokio::time::sleep(Duration::from_secs(30)).await;
                i
            }
        })
        .await;

        assert!(out.cancelled);
        let values: Vec<_> = out.completed.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![0, 1]);
        assert_eq!(out.discarded, (2..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_pre_cancelled_runs_nothing() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let out = fan_out(vec![1, 2, 3], 2, &cancel, |i| async move { i }).await;
        assert!(out.cancelled);
        assert!(out.completed.is_empty());
        assert_eq!(out.discarded, vec![0, 1, 2]);
    }
}
