// Copyright (c) 2024-present, phylocore developers
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A bounded worker pool for CPU-bound unit-of-work dispatch, with an
//! optional serialized finalizer.
//!
//! State: a LIFO work stack, an idle-worker count, a work-ready condition
//! variable, a separate mutex serializing the finisher callback, and a kill
//! flag. `push` never blocks on worker availability (work just piles up on
//! the stack); `wait` blocks until the stack is empty *and* every worker is
//! idle; dropping the pool sets the kill flag, wakes every worker, and
//! joins them all.
//!
//! Ordering between queued items is not guaranteed: the stack is LIFO, and
//! with more than one worker, items pushed later may finish before items
//! pushed earlier.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

struct State<W> {
    stack: Vec<W>,
    idle: usize,
    kill: bool,
}

struct Shared<W, O> {
    state: Mutex<State<W>>,
    work_ready: Condvar,
    done: Condvar,
    work_fn: Box<dyn Fn(W) -> O + Send + Sync>,
    finisher: Mutex<Option<Box<dyn FnMut(O) + Send>>>,
}

/// A fixed-size pool of OS threads that pull work off a shared LIFO stack.
///
/// `W` is the unit of work, `O` is whatever a unit produces; if a finisher
/// was configured, every `O` is handed to it one at a time (the finisher
/// mutex is the only thing serializing it against concurrent workers).
pub struct ThreadPool<W, O> {
    shared: Arc<Shared<W, O>>,
    workers: Vec<JoinHandle<()>>,
}

impl<W, O> ThreadPool<W, O>
where
    W: Send + 'static,
    O: Send + 'static,
{
    /// Starts `num_workers` worker threads, each running `work_fn` on units
    /// popped from the shared stack. No finisher is configured: outputs are
    /// simply dropped.
    ///
    /// # Panics
    ///
    /// Panics if `num_workers` is zero.
    #[must_use]
    pub fn new(num_workers: usize, work_fn: impl Fn(W) -> O + Send + Sync + 'static) -> Self {
        Self::with_finisher(num_workers, work_fn, None)
    }

    /// Starts `num_workers` worker threads with a serialized finisher:
    /// every unit's output is passed to `finish_fn`, one at a time, never
    /// concurrently with another call to it.
    ///
    /// # Panics
    ///
    /// Panics if `num_workers` is zero.
    #[must_use]
    pub fn with_finisher(
        num_workers: usize,
        work_fn: impl Fn(W) -> O + Send + Sync + 'static,
        finish_fn: Option<Box<dyn FnMut(O) + Send>>,
    ) -> Self {
        assert!(num_workers > 0, "thread pool needs at least one worker");

        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                stack: Vec::new(),
                idle: num_workers,
                kill: false,
            }),
            work_ready: Condvar::new(),
            done: Condvar::new(),
            work_fn: Box::new(work_fn),
            finisher: Mutex::new(finish_fn),
        });

        let workers = (0..num_workers)
            .map(|_| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || worker_loop(shared))
            })
            .collect();

        Self { shared, workers }
    }

    /// Pushes a unit of work onto the stack and wakes a worker.
    pub fn push(&self, work: W) {
        let mut state = self.shared.state.lock().expect("pool mutex poisoned");
        state.stack.push(work);
        self.shared.work_ready.notify_one();
    }

    /// Blocks until the work stack is empty and every worker is idle.
    pub fn wait(&self) {
        let num_workers = self.workers.len();
        let mut state = self.shared.state.lock().expect("pool mutex poisoned");
        while !(state.stack.is_empty() && state.idle == num_workers) {
            state = self.shared.done.wait(state).expect("pool mutex poisoned");
        }
    }

    /// Number of worker threads in the pool.
    #[must_use]
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }
}

fn worker_loop<W, O>(shared: Arc<Shared<W, O>>) {
    loop {
        let unit = {
            let mut state = shared.state.lock().expect("pool mutex poisoned");
            loop {
                if let Some(unit) = state.stack.pop() {
                    state.idle -= 1;
                    break Some(unit);
                }
                if state.kill {
                    break None;
                }
                shared.done.notify_all();
                state = shared.work_ready.wait(state).expect("pool mutex poisoned");
            }
        };

        let Some(unit) = unit else { break };

        let output = (shared.work_fn)(unit);
        if let Some(finish_fn) = shared.finisher.lock().expect("finisher mutex poisoned").as_mut() {
            finish_fn(output);
        }

        let mut state = shared.state.lock().expect("pool mutex poisoned");
        state.idle += 1;
        shared.done.notify_all();
    }
}

impl<W, O> Drop for ThreadPool<W, O> {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock().expect("pool mutex poisoned");
            state.kill = true;
        }
        self.shared.work_ready.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn wait_blocks_until_stack_drains_and_workers_idle() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);
        let pool: ThreadPool<i64, ()> = ThreadPool::new(4, move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });
        for i in 0..100 {
            pool.push(i);
        }
        pool.wait();
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn merges_sorted_sub_units_into_one_sorted_output() {
        // Feed N disjoint lists as independent sort-and-merge units, wait,
        // and check the merged output equals the sorted concatenation.
        let merged: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));
        let merged_clone = Arc::clone(&merged);
        let finisher: Box<dyn FnMut(Vec<i64>) + Send> = Box::new(move |mut sorted: Vec<i64>| {
            merged_clone.lock().unwrap().append(&mut sorted);
        });

        let pool: ThreadPool<Vec<i64>, Vec<i64>> = ThreadPool::with_finisher(
            4,
            |mut unit: Vec<i64>| {
                unit.sort_unstable();
                unit
            },
            Some(finisher),
        );

        let mut rng = crate::random::Rng32::seeded(99);
        let mut expected = Vec::new();
        for _ in 0..50 {
            let unit: Vec<i64> = (0..5_000)
                .map(|_| rng.random_int(-1_000_000, 1_000_000).unwrap())
                .collect();
            expected.extend_from_slice(&unit);
            pool.push(unit);
        }
        pool.wait();

        expected.sort_unstable();
        let mut got = merged.lock().unwrap().clone();
        got.sort_unstable();
        assert_eq!(got, expected);
        assert_eq!(got.len(), 50 * 5_000);
    }

    #[test]
    fn destruct_joins_all_workers() {
        let pool: ThreadPool<i64, i64> = ThreadPool::new(2, |x| x * 2);
        pool.push(1);
        pool.wait();
        drop(pool);
    }
}
