use crate::executor::ScheduledExecutor;
use log::{debug, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

const MAX_RETRIES: u32 = 2;

type Closure = Box<dyn FnOnce() + Send + 'static>;

struct State {
    pending: VecDeque<Closure>,
    busy: bool,
    retries: u32,
}

/// A per-owner FIFO of unit-of-work closures, strictly one in-flight at a
/// time, with `completed`/`retry` semantics (§4.2).
///
/// Used for two purposes with different completion triggers: the adapter
/// queue completes from a property-change signal handler, the GATT queue
/// completes from a method return or a characteristic signal. Either way,
/// the queue itself only knows about `enqueue`/`completed`/`retry`; the
/// caller decides when those fire.
pub struct CommandQueue {
    state: Mutex<State>,
    executor: Arc<ScheduledExecutor>,
    label: String,
}

impl CommandQueue {
    pub fn new(label: impl Into<String>, executor: Arc<ScheduledExecutor>) -> Self {
        CommandQueue {
            state: Mutex::new(State {
                pending: VecDeque::new(),
                busy: false,
                retries: 0,
            }),
            executor,
            label: label.into(),
        }
    }

    /// Appends `closure` and triggers dispatch if the queue is idle.
    pub fn enqueue(self: &Arc<Self>, closure: impl FnOnce() + Send + 'static) {
        let mut state = self.state.lock().unwrap();
        state.pending.push_back(Box::new(closure));
        drop(state);
        self.dispatch_next();
    }

    fn dispatch_next(self: &Arc<Self>) {
        let mut state = self.state.lock().unwrap();
        if state.busy {
            return;
        }
        let next = match state.pending.pop_front() {
            Some(next) => next,
            None => return,
        };
        state.busy = true;
        state.retries = 0;
        drop(state);

        self.executor.post(next);
    }

    /// Called by the completion trigger (signal handler or method return).
    /// Clears the busy marker and advances to the next closure.
    pub fn completed(self: &Arc<Self>) {
        debug!("{}: command completed", self.label);
        let mut state = self.state.lock().unwrap();
        state.busy = false;
        state.retries = 0;
        drop(state);
        self.dispatch_next();
    }

    /// Re-arms the in-flight command, up to `MAX_RETRIES` times; beyond that
    /// the command is dropped and the queue proceeds as if it had completed.
    /// `reschedule` is supplied by the caller (who is inside the original
    /// closure and knows how to redo its own work) since closures here are
    /// `FnOnce` and cannot be re-invoked directly.
    pub fn retry(self: &Arc<Self>, reschedule: impl FnOnce() + Send + 'static) {
        let mut state = self.state.lock().unwrap();
        if state.retries < MAX_RETRIES {
            state.retries += 1;
            let retries = state.retries;
            drop(state);
            warn!("{}: retrying command (attempt {})", self.label, retries);
            self.executor.post(reschedule);
        } else {
            warn!("{}: retries exhausted, dropping command", self.label);
            state.busy = false;
            state.retries = 0;
            drop(state);
            self.dispatch_next();
        }
    }

    pub fn is_busy(&self) -> bool {
        self.state.lock().unwrap().busy
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.pending.clear();
        state.busy = false;
        state.retries = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn closures_run_one_at_a_time_in_order() {
        let executor = Arc::new(ScheduledExecutor::new("test-queue"));
        let queue = Arc::new(CommandQueue::new("test", executor));
        let (tx, rx) = mpsc::channel();

        let queue_a = queue.clone();
        let tx_a = tx.clone();
        queue.enqueue(move || {
            tx_a.send("a-start").unwrap();
            queue_a.completed();
        });

        let queue_b = queue.clone();
        let tx_b = tx.clone();
        queue.enqueue(move || {
            tx_b.send("b-start").unwrap();
            queue_b.completed();
        });

        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), "a-start");
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), "b-start");
    }

    #[test]
    fn queue_waits_for_explicit_completion() {
        let executor = Arc::new(ScheduledExecutor::new("test-queue"));
        let queue = Arc::new(CommandQueue::new("test", executor));
        let (tx, rx) = mpsc::channel();

        queue.enqueue(move || {
            tx.send("a-start").unwrap();
            // Deliberately do not call completed() here.
        });

        let queue_b = queue.clone();
        queue.enqueue(move || {
            queue_b.completed();
        });

        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), "a-start");
        // b must not have started yet.
        std::thread::sleep(Duration::from_millis(50));
        assert!(queue.is_busy());
    }

    #[test]
    fn retries_stop_after_max() {
        let executor = Arc::new(ScheduledExecutor::new("test-queue"));
        let queue = Arc::new(CommandQueue::new("test", executor));
        let (tx, rx) = mpsc::channel();

        queue.enqueue(move || {
            tx.send(()).unwrap();
        });

        for _ in 0..3 {
            rx.recv_timeout(Duration::from_secs(1)).unwrap();
            let queue_retry = queue.clone();
            queue.retry(move || {
                // no-op reschedule body for the test
                let _ = &queue_retry;
            });
        }
        // After MAX_RETRIES (2) exhausted, the third retry() call should have
        // dropped the command and advanced the queue instead of rescheduling.
        assert!(!queue.is_busy());
    }
}
