//! Fixed-size worker pool.
//!
//! Workers block on a shared FIFO queue. `shutdown` (and `Drop`) refuses new
//! submissions but lets the workers drain everything already queued, so a
//! pending fetch or favorites save is never thrown away.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Task pool errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("Task pool is closed")]
    Closed,
    #[error("Task panicked: {0}")]
    Panicked(String),
    #[error("Task pool needs at least one worker")]
    NoWorkers,
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(String),
    #[error("Task result was lost")]
    Lost,
}

struct Queue {
    jobs: VecDeque<Job>,
    closed: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    available: Condvar,
}

/// A bounded pool of worker threads executing submitted closures.
pub struct TaskPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl TaskPool {
    /// Spawn `workers` threads. Zero workers is rejected.
    pub fn new(workers: usize) -> Result<Self, PoolError> {
        if workers == 0 {
            return Err(PoolError::NoWorkers);
        }

        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                jobs: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
        });

        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let shared = shared.clone();
            let handle = thread::Builder::new()
                .name(format!("nimbus-worker-{}", id))
                .spawn(move || worker_loop(id, &shared))
                .map_err(|e| PoolError::Spawn(e.to_string()))?;
            handles.push(handle);
        }

        tracing::debug!("Task pool started with {} workers", workers);

        Ok(Self {
            shared,
            workers: Mutex::new(handles),
            size: workers,
        })
    }

    /// Queue `work` for execution.
    ///
    /// Fails with [`PoolError::Closed`] once shutdown has been requested.
    pub fn submit<F, T>(&self, work: F) -> Result<TaskHandle<T>, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        let job: Job = Box::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(work))
                .map_err(|payload| PoolError::Panicked(panic_message(payload.as_ref())));
            // The caller may have dropped its handle; the work still ran.
            let _ = tx.send(result);
        });

        {
            let mut queue = self.shared.queue.lock();
            if queue.closed {
                return Err(PoolError::Closed);
            }
            queue.jobs.push_back(job);
        }
        self.shared.available.notify_one();

        Ok(TaskHandle { rx })
    }

    /// Refuse new work, run everything already queued, then join the workers.
    ///
    /// Must not be called from inside a task running on this pool.
    pub fn shutdown(&self) {
        {
            let mut queue = self.shared.queue.lock();
            if !queue.closed {
                queue.closed = true;
                tracing::debug!("Task pool draining {} queued tasks", queue.jobs.len());
            }
        }
        self.shared.available.notify_all();

        let current = thread::current().id();
        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::error!("Worker thread exited abnormally");
            }
        }
    }

    /// Number of worker threads
    pub fn worker_count(&self) -> usize {
        self.size
    }

    /// Tasks queued but not yet picked up by a worker
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().jobs.len()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.queue.lock().closed
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPool")
            .field("workers", &self.size)
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn worker_loop(id: usize, shared: &Shared) {
    loop {
        let job = {
            let mut queue = shared.queue.lock();
            loop {
                if let Some(job) = queue.jobs.pop_front() {
                    break job;
                }
                if queue.closed {
                    tracing::trace!(worker = id, "Worker exiting");
                    return;
                }
                shared.available.wait(&mut queue);
            }
        };
        job();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Handle to the eventual result of a submitted task.
#[derive(Debug)]
pub struct TaskHandle<T> {
    rx: mpsc::Receiver<Result<T, PoolError>>,
}

impl<T> TaskHandle<T> {
    /// Block until the task finishes.
    pub fn join(self) -> Result<T, PoolError> {
        self.rx.recv().map_err(|_| PoolError::Lost)?
    }

    /// Take the result if the task has finished. Yields the result once;
    /// later calls report [`PoolError::Lost`].
    pub fn try_join(&self) -> Option<Result<T, PoolError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(PoolError::Lost)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_zero_workers_rejected() {
        assert_eq!(TaskPool::new(0).unwrap_err(), PoolError::NoWorkers);
    }

    #[test]
    fn test_every_task_completes_exactly_once() {
        for count in 0..20 {
            let pool = TaskPool::new(4).unwrap();
            let completed = Arc::new(AtomicUsize::new(0));

            let handles: Vec<_> = (0..count)
                .map(|_| {
                    let completed = completed.clone();
                    pool.submit(move || {
                        completed.fetch_add(1, Ordering::SeqCst);
                    })
                    .unwrap()
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }
            assert_eq!(completed.load(Ordering::SeqCst), count);
        }
    }

    #[test]
    fn test_results_delivered_through_handle() {
        let pool = TaskPool::new(2).unwrap();
        let handle = pool.submit(|| 6 * 7).unwrap();
        assert_eq!(handle.join().unwrap(), 42);
    }

    #[test]
    fn test_single_worker_runs_fifo() {
        let pool = TaskPool::new(1).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let order = order.clone();
                pool.submit(move || order.lock().push(i)).unwrap()
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*order.lock(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_panic_is_captured_and_worker_survives() {
        let pool = TaskPool::new(1).unwrap();

        let bad = pool.submit(|| -> u32 { panic!("boom") }).unwrap();
        let good = pool.submit(|| 1u32).unwrap();

        match bad.join() {
            Err(PoolError::Panicked(msg)) => assert!(msg.contains("boom")),
            other => panic!("expected panic error, got {:?}", other),
        }
        assert_eq!(good.join().unwrap(), 1);
    }

    #[test]
    fn test_shutdown_drains_queued_tasks() {
        let pool = TaskPool::new(2).unwrap();
        let completed = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let completed = completed.clone();
                pool.submit(move || {
                    thread::sleep(Duration::from_millis(10));
                    completed.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap()
            })
            .collect();

        pool.shutdown();
        assert_eq!(completed.load(Ordering::SeqCst), 10);

        for handle in handles {
            assert!(handle.join().is_ok());
        }
        assert!(pool.is_closed());
        assert_eq!(pool.submit(|| ()).unwrap_err(), PoolError::Closed);
    }

    #[test]
    fn test_drop_drains_queued_tasks() {
        let completed = Arc::new(AtomicUsize::new(0));
        {
            let pool = TaskPool::new(1).unwrap();
            for _ in 0..5 {
                let completed = completed.clone();
                let _ = pool.submit(move || {
                    thread::sleep(Duration::from_millis(5));
                    completed.fetch_add(1, Ordering::SeqCst);
                });
            }
        }
        assert_eq!(completed.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_try_join_pending_then_ready() {
        let pool = TaskPool::new(1).unwrap();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let handle = pool
            .submit(move || {
                let _ = release_rx.recv();
                "done"
            })
            .unwrap();

        assert!(handle.try_join().is_none());
        release_tx.send(()).unwrap();

        let mut result = None;
        for _ in 0..200 {
            if let Some(r) = handle.try_join() {
                result = Some(r);
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(result.unwrap().unwrap(), "done");
    }

    #[test]
    fn test_shutdown_twice_is_harmless() {
        let pool = TaskPool::new(3).unwrap();
        assert_eq!(pool.worker_count(), 3);
        pool.shutdown();
        pool.shutdown();
        assert_eq!(pool.pending(), 0);
    }
}
