//! Loop body capabilities.
//!
//! A body is borrowed by the engine for the duration of one invocation and
//! shared by reference across every sub-task of that invocation; the engine
//! keeps no reference to it afterward.
use std::marker::PhantomData;

/// A side-effecting loop body.
///
/// `compute` is called exactly once for every index of the range, possibly
/// from many workers at once, so it must be safe for disjoint indices and
/// must not assume any per-index ordering.
///
/// Any `Fn(i32) + Sync` closure is a `LoopBody`:
///
/// ```
/// use parloop::prelude::*;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// let visited = AtomicUsize::new(0);
/// par_loop(100, |_i: i32| {
///     visited.fetch_add(1, Ordering::Relaxed);
/// });
/// assert_eq!(visited.into_inner(), 100);
/// ```
pub trait LoopBody: Sync {
    /// Compute the work for index `i`.
    fn compute(&self, i: i32);
}

impl<F> LoopBody for F
where
    F: Fn(i32) + Sync,
{
    fn compute(&self, i: i32) {
        self(i)
    }
}

/// A value-producing loop body with a pairwise combiner.
///
/// `combine` must be associative; it does not have to be commutative. The
/// engine applies it in strict left-to-right index order, so the result of a
/// reduction equals the sequential fold of `compute(begin)`,
/// `compute(begin + step)`, … for any chunk size and pool shape.
pub trait ReduceBody<V>: Sync {
    /// Compute the value for index `i`.
    fn compute(&self, i: i32) -> V;
    /// Combine two values. `v1` always holds the lower index range.
    fn combine(&self, v1: V, v2: V) -> V;
}

/// A [`ReduceBody`] built from a pair of closures.
///
/// ```
/// use parloop::prelude::*;
///
/// let a: Vec<f64> = (1..=100).map(f64::from).collect();
/// let sum = par_reduce(100, Reduction::new(|i: i32| a[i as usize], |x, y| x + y));
/// assert_eq!(sum, 5050.0);
/// ```
pub struct Reduction<V, F, G>
where
    F: Fn(i32) -> V + Sync,
    G: Fn(V, V) -> V + Sync,
{
    compute: F,
    combine: G,
    phantom: PhantomData<fn() -> V>,
}

impl<V, F, G> Reduction<V, F, G>
where
    F: Fn(i32) -> V + Sync,
    G: Fn(V, V) -> V + Sync,
{
    /// Pair a per-index `compute` closure with an associative `combine`
    /// closure.
    pub fn new(compute: F, combine: G) -> Reduction<V, F, G> {
        Reduction {
            compute,
            combine,
            phantom: PhantomData,
        }
    }
}

impl<V, F, G> ReduceBody<V> for Reduction<V, F, G>
where
    F: Fn(i32) -> V + Sync,
    G: Fn(V, V) -> V + Sync,
{
    fn compute(&self, i: i32) -> V {
        (self.compute)(i)
    }

    fn combine(&self, v1: V, v2: V) -> V {
        (self.combine)(v1, v2)
    }
}
