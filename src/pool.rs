//! Dedicated worker pool: an unordered, chunked map over a private rayon pool whose threads are
//! joined when the pool is released.

use crate::error::MapError;
use anyhow::Result;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

/// Count of worker threads that have not exited yet.
struct Liveness {
    live: Mutex<usize>,
    exited: Condvar,
}

impl Liveness {
    fn exit(&self) {
        let mut live = self.live.lock();
        *live = live.saturating_sub(1);
        self.exited.notify_all();
    }

    fn wait_all_exited(&self) {
        let mut live = self.live.lock();
        while *live > 0 {
            self.exited.wait(&mut live);
        }
    }
}

/// Observes a pool's worker threads; keeps working after the pool itself is gone.
#[derive(Clone)]
pub struct PoolProbe(Arc<Liveness>);

impl PoolProbe {
    pub fn live_workers(&self) -> usize {
        *self.0.live.lock()
    }
}

/// N worker threads owned by one caller. Released exactly once, either through
/// `shutdown()` or on drop: no new work is accepted and the caller blocks until every
/// worker thread has exited. Must not be released from one of its own workers.
pub struct WorkerPool {
    pool: Option<rayon::ThreadPool>,
    liveness: Arc<Liveness>,
    n_workers: usize,
}

impl WorkerPool {
    pub fn new(n_workers: usize) -> Result<Self, MapError> {
        if n_workers == 0 {
            return Err(MapError::InvalidConfiguration("n_workers must be at least 1".into()));
        }
        let liveness = Arc::new(Liveness { live: Mutex::new(n_workers), exited: Condvar::new() });
        let on_exit = Arc::clone(&liveness);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n_workers)
            .thread_name(|i| format!("multitask-worker-{}", i))
            .exit_handler(move |_| on_exit.exit())
            .build()
            .map_err(|e| MapError::PoolManagement(format!("spawning {} workers: {}", n_workers, e)))?;
        tracing::debug!(n_workers, "worker pool started");
        Ok(Self { pool: Some(pool), liveness, n_workers })
    }

    pub fn n_workers(&self) -> usize {
        self.n_workers
    }

    pub fn probe(&self) -> PoolProbe {
        PoolProbe(Arc::clone(&self.liveness))
    }

    /// Run `fun` over `items` in chunks of `chunk_size`, handing each result to `on_result` on
    /// the calling thread as soon as its chunk completes. Completion order is unspecified.
    ///
    /// A chunk reports its results together, and only once every item in it is done. The first
    /// error stops the caller from consuming further results; chunks that have not started are
    /// skipped, running chunks finish, and the error is returned unchanged.
    pub fn map_unordered<T, R, F, I, S>(&self, fun: F, items: I, chunk_size: usize, mut on_result: S) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Send,
        R: Send,
        F: Fn(T) -> Result<R> + Sync,
        S: FnMut(R),
    {
        if chunk_size == 0 {
            return Err(MapError::InvalidConfiguration("chunk_size must be at least 1".into()).into());
        }
        let pool = self
            .pool
            .as_ref()
            .ok_or_else(|| MapError::PoolManagement("pool already shut down".into()))?;

        let fun = &fun;
        let abort = &AtomicBool::new(false);

        pool.in_place_scope(|scope| {
            let (tx, rx) = mpsc::channel::<Result<Vec<R>>>();
            let mut items = items.into_iter();
            let mut chunks = 0usize;
            loop {
                let chunk: Vec<T> = items.by_ref().take(chunk_size).collect();
                if chunk.is_empty() {
                    break;
                }
                chunks += 1;
                let tx = tx.clone();
                scope.spawn(move |_| {
                    if abort.load(Ordering::Relaxed) {
                        return;
                    }
                    let out: Result<Vec<R>> = chunk.into_iter().map(fun).collect();
                    // Receiver is gone once the caller has seen an error.
                    let _ = tx.send(out);
                });
            }
            drop(tx);
            tracing::debug!(chunks, chunk_size, "dispatched chunks to pool");

            for batch in rx {
                match batch {
                    Ok(results) => results.into_iter().for_each(&mut on_result),
                    Err(e) => {
                        abort.store(true, Ordering::Relaxed);
                        return Err(e);
                    }
                }
            }
            Ok(())
        })
    }

    /// Stop accepting work and wait for every worker thread to exit.
    pub fn shutdown(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(pool) = self.pool.take() {
            drop(pool);
            self.liveness.wait_all_exited();
            tracing::debug!(n_workers = self.n_workers, "worker pool joined");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn zero_workers_rejected() {
        assert!(matches!(WorkerPool::new(0), Err(MapError::InvalidConfiguration(_))));
    }

    #[test]
    fn shutdown_joins_every_worker() {
        let pool = WorkerPool::new(3).unwrap();
        let probe = pool.probe();
        assert_eq!(pool.n_workers(), 3);
        pool.shutdown();
        assert_eq!(probe.live_workers(), 0);
    }

    #[test]
    fn drop_joins_every_worker() {
        let probe = {
            let pool = WorkerPool::new(2).unwrap();
            pool.probe()
        };
        assert_eq!(probe.live_workers(), 0);
    }

    #[test]
    fn map_unordered_yields_every_result_once() {
        let pool = WorkerPool::new(4).unwrap();
        let mut out = Vec::new();
        pool.map_unordered(|x: u64| Ok(x * 10), 0..50u64, 3, |r| out.push(r)).unwrap();
        out.sort_unstable();
        assert_eq!(out, (0..50u64).map(|x| x * 10).collect::<Vec<_>>());
    }

    #[test]
    fn results_within_a_chunk_stay_together_and_ordered() {
        let pool = WorkerPool::new(2).unwrap();
        let mut out = Vec::new();
        pool.map_unordered(|x: u32| Ok(x), 0..12u32, 4, |r| out.push(r)).unwrap();
        assert_eq!(out.len(), 12);
        for chunk in out.chunks(4) {
            let base = chunk[0];
            assert_eq!(base % 4, 0);
            assert_eq!(chunk, &[base, base + 1, base + 2, base + 3]);
        }
    }

    #[test]
    fn empty_input_is_fine() {
        let pool = WorkerPool::new(2).unwrap();
        let mut seen = 0;
        pool.map_unordered(|x: u8| Ok(x), Vec::<u8>::new(), 1, |_| seen += 1).unwrap();
        assert_eq!(seen, 0);
    }

    #[test]
    fn first_error_is_returned_and_pool_still_joins() {
        let pool = WorkerPool::new(2).unwrap();
        let probe = pool.probe();
        let calls = AtomicUsize::new(0);
        let err = pool
            .map_unordered(
                |x: u32| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    if x == 3 { Err(anyhow!("bad item {}", x)) } else { Ok(x) }
                },
                1..=5u32,
                1,
                |_| {},
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "bad item 3");
        assert!(calls.load(Ordering::SeqCst) <= 5);
        pool.shutdown();
        assert_eq!(probe.live_workers(), 0);
    }

    #[test]
    fn zero_chunk_size_rejected() {
        let pool = WorkerPool::new(2).unwrap();
        let err = pool.map_unordered(|x: u8| Ok(x), [1u8], 0, |_| {}).unwrap_err();
        assert!(matches!(err.downcast_ref::<MapError>(), Some(MapError::InvalidConfiguration(_))));
    }
}
