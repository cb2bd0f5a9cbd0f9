//! Divide-and-conquer range tasks.
//!
//! A task describes `[begin, end)` with stride `step` and a `chunk`
//! threshold. A task whose span is at or below the threshold is a leaf and
//! runs sequentially; anything larger splits at a step-aligned midpoint,
//! forks the right half onto the current worker's deque and recurses into
//! the left half on the current thread. Reductions combine as the recursion
//! unwinds, left argument first, which keeps the combine order equal to the
//! sequential left-to-right fold over the whole range.
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::{mem, thread};

use crate::core::registry::{Func, Registry};

use super::body::{LoopBody, ReduceBody};

/// Immutable configuration of one divide-and-conquer unit.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RangeTask {
    pub(crate) begin: i32,
    pub(crate) end: i32,
    pub(crate) step: i32,
    pub(crate) chunk: i32,
}

impl RangeTask {
    /// A leaf spans at most `chunk` indices. A `chunk` of 0 out of the
    /// default-chunk integer division behaves like 1.
    fn is_leaf(&self) -> bool {
        i64::from(self.end) - i64::from(self.begin)
            <= i64::from(self.chunk.max(1)) * i64::from(self.step)
    }

    /// Split into a non-empty left half and a possibly-empty right half.
    fn split(self) -> (RangeTask, Option<RangeTask>) {
        let middle = split_point(self.begin, self.end, self.step);
        let left = RangeTask {
            end: middle,
            ..self
        };
        let right = (middle < self.end).then_some(RangeTask {
            begin: middle,
            ..self
        });
        (left, right)
    }
}

/// Step-aligned midpoint of `[begin, end)`.
///
/// The midpoint is of the form `begin + k*step` with `k >= 1`, never exceeds
/// `end`, and rounds toward the left so the left half is at least as large
/// as the right half. The strict left progress is what bounds the recursion.
pub(crate) fn split_point(begin: i32, end: i32, step: i32) -> i32 {
    let begin = i64::from(begin);
    let end = i64::from(end);
    let step = i64::from(step);
    (begin + step + ((end - begin - 1) / 2 / step) * step) as i32
}

/// Completion flag plus result slot of a forked task.
///
/// The slot is written at most once, with either the task's value or the
/// payload of a panic raised by the body.
struct TaskHandle<T> {
    done: Arc<AtomicBool>,
    slot: Arc<Mutex<Option<thread::Result<T>>>>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> TaskHandle<T> {
        TaskHandle {
            done: Arc::clone(&self.done),
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: Send> TaskHandle<T> {
    fn new() -> TaskHandle<T> {
        TaskHandle {
            done: Arc::new(AtomicBool::new(false)),
            slot: Arc::new(Mutex::new(None)),
        }
    }

    fn complete(&self, result: thread::Result<T>) {
        *self.slot.lock().unwrap() = Some(result);
        self.done.store(true, Ordering::Release);
    }

    /// Wait for the forked task, executing other pool work meanwhile when
    /// called from a worker.
    fn join(self, registry: &Registry) -> thread::Result<T> {
        registry.wait_until(&self.done);
        self.slot.lock().unwrap().take().unwrap()
    }
}

/// Hand `f` to the pool and return a handle to its completion.
///
/// From a pool worker this enqueues on the worker's own deque; from any
/// other thread it goes through the global injector, which is how top-level
/// root tasks enter the pool.
///
/// The closure may borrow from the caller's stack. That is sound for the
/// same reason the scoped-job pattern is: every handle is joined before the
/// frame it borrows from unwinds, on the panic path included.
fn fork_with<'a, T, F>(registry: &Registry, f: F) -> TaskHandle<T>
where
    T: Send + 'a,
    F: FnOnce() -> T + Send + 'a,
{
    let handle = TaskHandle::new();
    let remote = handle.clone();
    let job: Func<'a> = Box::new(move || {
        remote.complete(catch_unwind(AssertUnwindSafe(f)));
    });
    let job = unsafe { mem::transmute::<Func<'a>, Func<'static>>(job) };
    registry.fork(job);
    handle
}

/// Submit a root task from a non-worker thread and block until it is done.
///
/// A panic raised by the body is re-raised here with its original payload,
/// so the caller never sees an execution wrapper.
pub(crate) fn submit_and_wait<'a, T, F>(registry: &Registry, f: F) -> T
where
    T: Send,
    F: FnOnce() -> T + Send + 'a,
{
    match fork_with(registry, f).join(registry) {
        Ok(value) => value,
        Err(payload) => resume_unwind(payload),
    }
}

/// Execute an action task, recursively splitting branches.
pub(crate) fn run_action<B>(registry: &Arc<Registry>, task: RangeTask, body: &B)
where
    B: LoopBody + ?Sized,
{
    if task.is_leaf() {
        let mut i = task.begin;
        while i < task.end {
            body.compute(i);
            match i.checked_add(task.step) {
                Some(next) => i = next,
                None => break,
            }
        }
        return;
    }

    let (left, right) = task.split();
    match right {
        None => run_action(registry, left, body),
        Some(right) => {
            let remote = Arc::clone(registry);
            let handle = fork_with(registry, move || run_action(&remote, right, body));
            // Catch so the forked half is always joined before unwinding
            // past the borrows it shares with this frame.
            let left_result = catch_unwind(AssertUnwindSafe(|| run_action(registry, left, body)));
            let right_result = handle.join(registry);
            if let Err(payload) = left_result {
                resume_unwind(payload);
            }
            if let Err(payload) = right_result {
                resume_unwind(payload);
            }
        }
    }
}

/// Execute a reduction task, combining sub-results as the recursion unwinds.
///
/// The left sub-result is always the first argument of `combine`, within
/// leaves and across branches, so the final value equals the sequential
/// left-to-right fold regardless of scheduling.
pub(crate) fn run_reduce<V, B>(registry: &Arc<Registry>, task: RangeTask, body: &B) -> V
where
    V: Send,
    B: ReduceBody<V> + ?Sized,
{
    if task.is_leaf() {
        // Leaves are never empty: entry points require begin < end and the
        // splitter keeps both halves step-aligned and the left non-empty.
        let mut v = body.compute(task.begin);
        let mut i = task.begin;
        loop {
            match i.checked_add(task.step) {
                Some(next) => i = next,
                None => break,
            }
            if i >= task.end {
                break;
            }
            v = body.combine(v, body.compute(i));
        }
        return v;
    }

    let (left, right) = task.split();
    match right {
        None => run_reduce(registry, left, body),
        Some(right) => {
            let remote = Arc::clone(registry);
            let handle = fork_with(registry, move || run_reduce(&remote, right, body));
            let left_result = catch_unwind(AssertUnwindSafe(|| run_reduce(registry, left, body)));
            let right_result = handle.join(registry);
            match (left_result, right_result) {
                (Ok(left_value), Ok(right_value)) => body.combine(left_value, right_value),
                (Err(payload), _) => resume_unwind(payload),
                (_, Err(payload)) => resume_unwind(payload),
            }
        }
    }
}
