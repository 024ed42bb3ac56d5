// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
//! Execution-context plumbing shared by pipeline nodes.
//!
//! Responsibilities:
//! - Carries the optional worker pool, output chunking configuration and the
//!   function registry handed to nodes at construction.
//! - Provides the thread-index assignment and the counter/latch primitives
//!   that drive the one-shot transition from consuming input to finalizing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::ThreadId;

use threadpool::ThreadPool;

use crate::exec::agg::FunctionRegistry;

pub const DEFAULT_OUTPUT_BATCH_SIZE: usize = 32 * 1024;

/// Context handed to pipeline nodes: worker pool, chunking, registry.
#[derive(Clone)]
pub struct ExecContext {
    /// Worker pool for parallel input delivery and chunk emission.
    /// `None` means fully single-threaded execution.
    pub executor: Option<Arc<ThreadPool>>,
    /// Maximum rows per emitted output batch; `<= 0` selects the default.
    pub exec_chunksize: i64,
    pub registry: Arc<FunctionRegistry>,
}

impl Default for ExecContext {
    fn default() -> Self {
        Self {
            executor: None,
            exec_chunksize: -1,
            registry: Arc::new(FunctionRegistry::default()),
        }
    }
}

impl ExecContext {
    pub fn with_executor(pool: Arc<ThreadPool>) -> Self {
        Self {
            executor: Some(pool),
            ..Self::default()
        }
    }

    pub fn output_batch_size(&self) -> usize {
        if self.exec_chunksize <= 0 {
            DEFAULT_OUTPUT_BATCH_SIZE
        } else {
            self.exec_chunksize as usize
        }
    }

    /// Number of thread-local partition slots a node must pre-allocate:
    /// one per pool worker plus the thread driving the plan.
    pub fn thread_capacity(&self) -> usize {
        match self.executor.as_ref() {
            Some(pool) => pool.max_count() + 1,
            None => 1,
        }
    }
}

/// Assigns each calling thread a dense, monotonically increasing index.
/// Indices are stable for the lifetime of the indexer and never reused.
#[derive(Default)]
pub struct ThreadIndexer {
    slots: Mutex<HashMap<ThreadId, usize>>,
}

impl ThreadIndexer {
    pub fn get(&self) -> usize {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let next = slots.len();
        *slots.entry(std::thread::current().id()).or_insert(next)
    }
}

/// Counter with an optional total, completing exactly once: either when the
/// count reaches the total, or on cancellation. Mirrors the input/output
/// bookkeeping of pipeline nodes: `increment` per delivered batch,
/// `set_total` when the producer announces how many there are.
pub struct AtomicCounter {
    count: AtomicUsize,
    total: AtomicI64,
    complete: AtomicBool,
}

impl Default for AtomicCounter {
    fn default() -> Self {
        Self {
            count: AtomicUsize::new(0),
            total: AtomicI64::new(-1),
            complete: AtomicBool::new(false),
        }
    }
}

impl AtomicCounter {
    /// Count one event. Returns true iff this call completed the counter.
    pub fn increment(&self) -> bool {
        let count = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        if count as i64 != self.total.load(Ordering::SeqCst) {
            return false;
        }
        self.done_once()
    }

    /// Record the expected total. Returns true iff the already-seen count
    /// equals it and this call completed the counter.
    pub fn set_total(&self, total: usize) -> bool {
        self.total.store(total as i64, Ordering::SeqCst);
        if self.count.load(Ordering::SeqCst) as i64 != total as i64 {
            return false;
        }
        self.done_once()
    }

    /// Complete without reaching the total. Returns true iff this call was
    /// the one that completed the counter.
    pub fn cancel(&self) -> bool {
        self.done_once()
    }

    pub fn completed(&self) -> bool {
        self.complete.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> Option<usize> {
        let total = self.total.load(Ordering::SeqCst);
        (total >= 0).then_some(total as usize)
    }

    fn done_once(&self) -> bool {
        !self.complete.swap(true, Ordering::SeqCst)
    }
}

/// One-shot latch the node resolves when it finishes (successfully,
/// with an error, or after `stop`). Downstream joins on `wait`.
#[derive(Default)]
pub struct FinishedLatch {
    done: Mutex<bool>,
    cond: Condvar,
}

impl FinishedLatch {
    pub fn mark(&self) {
        let mut done = self.done.lock().unwrap_or_else(|e| e.into_inner());
        *done = true;
        self.cond.notify_all();
    }

    pub fn is_finished(&self) -> bool {
        *self.done.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn wait(&self) {
        let mut done = self.done.lock().unwrap_or_else(|e| e.into_inner());
        while !*done {
            done = self.cond.wait(done).unwrap_or_else(|e| e.into_inner());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_completes_on_total_then_never_again() {
        let counter = AtomicCounter::default();
        assert!(!counter.increment());
        assert!(!counter.increment());
        assert!(counter.set_total(2));
        assert!(!counter.increment());
        assert!(!counter.cancel());
    }

    #[test]
    fn counter_completes_on_late_increment() {
        let counter = AtomicCounter::default();
        assert!(!counter.set_total(1));
        assert!(counter.increment());
        assert!(counter.completed());
    }

    #[test]
    fn counter_cancel_wins_once() {
        let counter = AtomicCounter::default();
        assert!(counter.cancel());
        assert!(!counter.cancel());
        assert!(!counter.set_total(0));
    }

    #[test]
    fn thread_indexer_is_stable_per_thread() {
        let indexer = ThreadIndexer::default();
        let first = indexer.get();
        assert_eq!(first, indexer.get());
        assert_eq!(first, 0);
    }
}
