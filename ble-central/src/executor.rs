use log::trace;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Opaque handle returned by [`ScheduledExecutor::post_delayed`], usable with
/// [`ScheduledExecutor::cancel`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TaskHandle(u64);

struct ScheduledTask {
    run_at: Instant,
    sequence: u64,
    handle: TaskHandle,
    task: Option<Task>,
}

impl ScheduledTask {
    fn key(&self) -> (Instant, u64) {
        (self.run_at, self.sequence)
    }
}

impl Eq for ScheduledTask {}

impl PartialEq for ScheduledTask {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Ord for ScheduledTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the earliest run_at sorts first.
        other.key().cmp(&self.key())
    }
}

impl PartialOrd for ScheduledTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Shared {
    queue: Mutex<BinaryHeap<ScheduledTask>>,
    condvar: Condvar,
    shutdown: Mutex<bool>,
}

/// Single-threaded ordered task runner: `post`/`post_delayed`/`cancel`/`shutdown`.
///
/// Tasks run strictly in order of scheduled execution time, one at a time, on
/// a dedicated worker thread. One instance is created per named purpose
/// (callback delivery, command execution, timeouts) rather than sharing a
/// pool across purposes.
pub struct ScheduledExecutor {
    name: String,
    shared: Arc<Shared>,
    next_sequence: AtomicU64,
    worker: Option<JoinHandle<()>>,
}

impl ScheduledExecutor {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let shared = Arc::new(Shared {
            queue: Mutex::new(BinaryHeap::new()),
            condvar: Condvar::new(),
            shutdown: Mutex::new(false),
        });
        let worker_shared = shared.clone();
        let worker_name = name.clone();
        let worker = thread::Builder::new()
            .name(format!("ble-central-{}", worker_name))
            .spawn(move || run_worker(worker_shared))
            .expect("failed to spawn executor thread");
        ScheduledExecutor {
            name,
            shared,
            next_sequence: AtomicU64::new(0),
            worker: Some(worker),
        }
    }

    /// Enqueues `task` to run as soon as the worker is free. If `post(a)` is
    /// called before `post(b)`, `a` runs to completion before `b` starts.
    pub fn post(&self, task: impl FnOnce() + Send + 'static) {
        self.schedule(task, Duration::from_millis(0));
    }

    /// Enqueues `task` to run no earlier than `delay` from now. Returns a
    /// handle that can be passed to [`cancel`](Self::cancel).
    pub fn post_delayed(&self, task: impl FnOnce() + Send + 'static, delay: Duration) -> TaskHandle {
        self.schedule(task, delay)
    }

    fn schedule(&self, task: impl FnOnce() + Send + 'static, delay: Duration) -> TaskHandle {
        let sequence = self.next_sequence.fetch_add(1, AtomicOrdering::SeqCst);
        let handle = TaskHandle(sequence);
        let scheduled = ScheduledTask {
            run_at: Instant::now() + delay,
            sequence,
            handle,
            task: Some(Box::new(task)),
        };
        let mut queue = self.shared.queue.lock().unwrap();
        queue.push(scheduled);
        drop(queue);
        self.shared.condvar.notify_one();
        handle
    }

    /// Best-effort cancellation: a delayed task that has not yet started will
    /// not start. A task already in progress runs to completion.
    pub fn cancel(&self, handle: TaskHandle) {
        let mut queue = self.shared.queue.lock().unwrap();
        let remaining: Vec<ScheduledTask> = queue
            .drain()
            .filter_map(|mut entry| {
                if entry.handle == handle {
                    trace!("{}: cancelled task {:?}", self.name, handle);
                    None
                } else {
                    entry.task.take().map(|task| ScheduledTask {
                        run_at: entry.run_at,
                        sequence: entry.sequence,
                        handle: entry.handle,
                        task: Some(task),
                    })
                }
            })
            .collect();
        *queue = remaining.into_iter().collect();
    }

    pub fn shutdown(&mut self) {
        *self.shared.shutdown.lock().unwrap() = true;
        self.shared.condvar.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for ScheduledExecutor {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.shutdown();
        }
    }
}

fn run_worker(shared: Arc<Shared>) {
    loop {
        let mut queue = shared.queue.lock().unwrap();
        loop {
            if *shared.shutdown.lock().unwrap() {
                return;
            }
            match queue.peek() {
                None => {
                    queue = shared.condvar.wait(queue).unwrap();
                }
                Some(next) => {
                    let now = Instant::now();
                    if next.run_at <= now {
                        break;
                    }
                    let wait_for = next.run_at - now;
                    let (q, _) = shared.condvar.wait_timeout(queue, wait_for).unwrap();
                    queue = q;
                }
            }
        }
        let mut scheduled = queue.pop().expect("queue non-empty after break");
        drop(queue);
        if let Some(task) = scheduled.task.take() {
            task();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn immediate_tasks_run_in_post_order() {
        let executor = ScheduledExecutor::new("test");
        let (tx, rx) = mpsc::channel();
        let tx_a = tx.clone();
        executor.post(move || tx_a.send('a').unwrap());
        let tx_b = tx.clone();
        executor.post(move || tx_b.send('b').unwrap());
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 'a');
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 'b');
    }

    #[test]
    fn delayed_task_runs_before_later_deadline() {
        let executor = ScheduledExecutor::new("test");
        let (tx, rx) = mpsc::channel();
        let tx_late = tx.clone();
        executor.post_delayed(move || tx_late.send("late").unwrap(), Duration::from_millis(60));
        let tx_early = tx.clone();
        executor.post_delayed(move || tx_early.send("early").unwrap(), Duration::from_millis(10));
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), "early");
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), "late");
    }

    #[test]
    fn cancelled_delayed_task_never_runs() {
        let executor = ScheduledExecutor::new("test");
        let (tx, rx) = mpsc::channel();
        let handle = executor.post_delayed(move || tx.send(()).unwrap(), Duration::from_millis(50));
        executor.cancel(handle);
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn shutdown_stops_the_worker() {
        let mut executor = ScheduledExecutor::new("test");
        executor.shutdown();
    }
}
