//! Fixed-size worker pool with one task queue per worker.
//!
//! Each worker owns its state (output files, scratch buffers) exclusively;
//! tasks are closures dispatched to a *named* worker, so no two threads ever
//! share a sink and no locking happens on the output path. A panicking task
//! is logged and counted as completed; peers are unaffected.

use crossbeam_channel::{unbounded, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

type Job<W> = Box<dyn FnOnce(&mut W) + Send + 'static>;

pub struct WorkerPool<W> {
    senders: Vec<Sender<Job<W>>>,
    handles: Vec<JoinHandle<()>>,
    pending: Arc<(Mutex<usize>, Condvar)>,
}

impl<W: Send + 'static> WorkerPool<W> {
    /// Spawn `num_workers` threads; `make_state` builds each worker's
    /// private state on the caller thread before the worker starts.
    pub fn new(
        num_workers: usize,
        mut make_state: impl FnMut(usize) -> W,
    ) -> std::io::Result<Self> {
        let pending = Arc::new((Mutex::new(0usize), Condvar::new()));
        let mut senders = Vec::with_capacity(num_workers);
        let mut handles = Vec::with_capacity(num_workers);

        for tid in 0..num_workers {
            let (tx, rx) = unbounded::<Job<W>>();
            let pending = Arc::clone(&pending);
            let mut state = make_state(tid);
            let handle = std::thread::Builder::new()
                .name(format!("worker-{}", tid))
                .spawn(move || {
                    for job in rx.iter() {
                        let outcome = catch_unwind(AssertUnwindSafe(|| job(&mut state)));
                        if outcome.is_err() {
                            log::error!("worker {} task panicked; continuing", tid);
                        }
                        let (lock, cvar) = &*pending;
                        let mut count = lock.lock().expect("worker pool counter poisoned");
                        *count -= 1;
                        if *count == 0 {
                            cvar.notify_all();
                        }
                    }
                })?;
            senders.push(tx);
            handles.push(handle);
        }

        Ok(Self {
            senders,
            handles,
            pending,
        })
    }

    pub fn num_workers(&self) -> usize {
        self.senders.len()
    }

    /// Push a task onto worker `tid`'s queue.
    pub fn enqueue(&self, tid: usize, job: impl FnOnce(&mut W) + Send + 'static) {
        let (lock, _) = &*self.pending;
        *lock.lock().expect("worker pool counter poisoned") += 1;
        // send only fails after shutdown, which drops the senders first
        let _ = self.senders[tid].send(Box::new(job));
    }

    /// Block until every queue has drained and no task is running.
    pub fn wait_for_all(&self) {
        let (lock, cvar) = &*self.pending;
        let mut count = lock.lock().expect("worker pool counter poisoned");
        while *count > 0 {
            count = cvar.wait(count).expect("worker pool counter poisoned");
        }
    }

    /// Drain outstanding work, stop every worker and join the threads.
    pub fn shutdown(mut self) {
        self.wait_for_all();
        self.senders.clear(); // closes the channels; workers exit their loops
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                log::error!("worker thread terminated abnormally");
            }
        }
    }
}

impl<W> Drop for WorkerPool<W> {
    fn drop(&mut self) {
        self.senders.clear();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_tasks_run_on_their_worker() {
        let pool: WorkerPool<usize> = WorkerPool::new(4, |tid| tid).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        for i in 0..100 {
            let tid = i % 4;
            let hits = Arc::clone(&hits);
            pool.enqueue(tid, move |state| {
                assert_eq!(*state, tid);
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.wait_for_all();
        assert_eq!(hits.load(Ordering::SeqCst), 100);
        pool.shutdown();
    }

    #[test]
    fn test_state_is_worker_private() {
        let pool: WorkerPool<Vec<usize>> = WorkerPool::new(2, |_| Vec::new()).unwrap();
        for i in 0..50 {
            pool.enqueue(i % 2, move |state| state.push(i));
        }
        pool.wait_for_all();
        pool.shutdown();
    }

    #[test]
    fn test_panicking_task_does_not_abort_peers() {
        let pool: WorkerPool<()> = WorkerPool::new(2, |_| ()).unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        pool.enqueue(0, |_| panic!("boom"));
        for _ in 0..10 {
            let done = Arc::clone(&done);
            pool.enqueue(1, move |_| {
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        let done0 = Arc::clone(&done);
        pool.enqueue(0, move |_| {
            done0.fetch_add(1, Ordering::SeqCst);
        });
        pool.wait_for_all();
        assert_eq!(done.load(Ordering::SeqCst), 11);
        pool.shutdown();
    }

    #[test]
    fn test_wait_for_all_on_empty_pool() {
        let pool: WorkerPool<()> = WorkerPool::new(3, |_| ()).unwrap();
        pool.wait_for_all();
        pool.shutdown();
    }
}
