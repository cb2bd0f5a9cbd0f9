//! Parallel indexed loops and reductions.
//!
//! The two entry points, [`par_loop`] and [`par_reduce`], walk the index
//! range `[begin, end)` with a positive stride and hand disjoint sub-ranges
//! to the global worker pool. Both accept anything convertible into an
//! [`IndexRange`], which is how the progressively-defaulted call shapes are
//! spelled:
//!
//! ```
//! use parloop::prelude::*;
//! # use std::sync::atomic::{AtomicUsize, Ordering};
//! # let hits = AtomicUsize::new(0);
//! # let body = |_i: i32| { hits.fetch_add(1, Ordering::Relaxed); };
//!
//! par_loop(10, &body);                                // [0, 10), step 1
//! par_loop(2..11, &body);                             // [2, 11), step 1
//! par_loop(IndexRange::new(2, 11).step(3), &body);    // 2, 5, 8
//! par_loop(IndexRange::new(2, 11).step(3).chunk(1), &body);
//! ```
//!
//! When `chunk` is not given, a default is computed from the range size, the
//! pool parallelism and the current pool backlog, targeting roughly eight
//! outstanding leaves per worker.
//!
//! Calls made from inside a loop body (the body of an outer `par_loop`
//! running on a pool worker) execute their root task directly on the current
//! worker instead of submitting and blocking, so nesting never deadlocks.
use std::ops::Range;

use log::trace;

use crate::check;
use crate::core::registry::{get_global_registry, Registry};

mod body;
mod task;

pub use body::{LoopBody, ReduceBody, Reduction};

use task::{run_action, run_reduce, submit_and_wait, RangeTask};

/// An index range `[begin, end)` with a stride and an optional chunk
/// threshold.
///
/// `begin` defaults to 0, `step` to 1; a missing `chunk` is resolved by the
/// engine at call time. Validation happens in the entry points, not here.
#[derive(Clone, Copy, Debug)]
pub struct IndexRange {
    begin: i32,
    end: i32,
    step: i32,
    chunk: Option<i32>,
}

impl IndexRange {
    /// Range `[begin, end)` with stride 1.
    pub fn new(begin: i32, end: i32) -> IndexRange {
        IndexRange {
            begin,
            end,
            step: 1,
            chunk: None,
        }
    }

    /// Set the stride between consecutive indices.
    pub fn step(mut self, step: i32) -> IndexRange {
        self.step = step;
        self
    }

    /// Set the chunk threshold: sub-ranges spanning at most `chunk` indices
    /// run sequentially instead of splitting further.
    pub fn chunk(mut self, chunk: i32) -> IndexRange {
        self.chunk = Some(chunk);
        self
    }
}

impl From<i32> for IndexRange {
    /// Range `[0, end)` with stride 1.
    fn from(end: i32) -> IndexRange {
        IndexRange::new(0, end)
    }
}

impl From<Range<i32>> for IndexRange {
    fn from(range: Range<i32>) -> IndexRange {
        IndexRange::new(range.start, range.end)
    }
}

/// Execute `body.compute(i)` for every `i` in `range`, in parallel.
///
/// Every index is visited exactly once; no cross-index ordering is
/// guaranteed, so the body must be independent per index. The call returns
/// once all indices have been visited, and the caller then observes every
/// memory effect of the body.
///
/// # Panics
///
/// Panics synchronously when `begin >= end`, `step <= 0` or an explicit
/// `chunk <= 0`. A panic raised by the body is re-raised from this call with
/// its original payload; side effects already performed remain.
///
/// # Examples
///
/// ```
/// use parloop::prelude::*;
/// use std::sync::atomic::{AtomicI32, Ordering};
///
/// let a: Vec<i32> = (0..10).collect();
/// let b: Vec<AtomicI32> = (0..10).map(|_| AtomicI32::new(0)).collect();
/// par_loop(10, |i: i32| {
///     let i = i as usize;
///     b[i].store(a[i] * a[i], Ordering::Relaxed);
/// });
/// assert_eq!(b[3].load(Ordering::Relaxed), 9);
/// ```
pub fn par_loop<R, B>(range: R, body: B)
where
    R: Into<IndexRange>,
    B: LoopBody,
{
    let range = range.into();
    validate(&range);

    let registry = get_global_registry();
    let task = resolve(&range, &registry);

    if registry.is_worker_thread() {
        run_action(&registry, task, &body);
    } else {
        submit_and_wait(&registry, || run_action(&registry, task, &body));
    }
}

/// Reduce `range` with `body`: compute a value per index and fold the
/// values pairwise with `body.combine`, lower indices always on the left.
///
/// The result equals the sequential left-to-right fold of `compute(begin)`,
/// `compute(begin + step)`, … for any chunk size and pool shape, so an
/// associative combiner may be non-commutative.
///
/// # Panics
///
/// Same conditions as [`par_loop`].
///
/// # Examples
///
/// ```
/// use parloop::prelude::*;
///
/// let words = ["pa", "ral", "lel"];
/// let joined = par_reduce(
///     3,
///     Reduction::new(|i: i32| words[i as usize].to_string(), |a, b| a + &b),
/// );
/// assert_eq!(joined, "parallel");
/// ```
pub fn par_reduce<R, V, B>(range: R, body: B) -> V
where
    R: Into<IndexRange>,
    V: Send,
    B: ReduceBody<V>,
{
    let range = range.into();
    validate(&range);

    let registry = get_global_registry();
    let task = resolve(&range, &registry);

    if registry.is_worker_thread() {
        run_reduce(&registry, task, &body)
    } else {
        submit_and_wait(&registry, || run_reduce(&registry, task, &body))
    }
}

fn validate(range: &IndexRange) {
    check::argument(range.begin < range.end, "begin < end");
    check::argument(range.step > 0, "step > 0");
    if let Some(chunk) = range.chunk {
        check::argument(chunk > 0, "chunk > 0");
    }
}

fn resolve(range: &IndexRange, registry: &Registry) -> RangeTask {
    let chunk = range
        .chunk
        .unwrap_or_else(|| default_chunk(range, registry));
    trace!(
        "Range [{}, {}) step {} resolved with chunk {}.",
        range.begin,
        range.end,
        range.step,
        chunk
    );
    RangeTask {
        begin: range.begin,
        end: range.end,
        step: range.step,
        chunk,
    }
}

/// Default chunk threshold for a range on the given pool.
///
/// Targets about eight outstanding leaves per worker, discounted by the jobs
/// already queued; a single-threaded pool collapses to one sequential chunk.
/// When the backlog exceeds the target the whole range becomes one chunk.
/// The queue depth is advisory and may be stale.
fn default_chunk(range: &IndexRange, registry: &Registry) -> i32 {
    let ni = 1 + (i64::from(range.end) - i64::from(range.begin) - 1) / i64::from(range.step);
    let nthreads = registry.get_nthreads() as i64;
    let nqueued = registry.get_queued() as i64;
    let ntasks = if nthreads > 1 {
        (nthreads * 8 - nqueued).max(1)
    } else {
        1
    };
    let chunk = if ntasks > 0 { ni / ntasks } else { ni };
    chunk.min(i64::from(i32::MAX)) as i32
}
