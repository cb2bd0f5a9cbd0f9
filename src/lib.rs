//! Parloop is a parallel indexed-loop engine for Rust.
//!
//! The crate executes a loop body over an integer index range `[begin, end)`
//! with a positive stride, distributing disjoint sub-ranges across a shared
//! work-stealing worker pool. Ranges split recursively until each leaf spans
//! at most `chunk` indices, and leaves run sequentially on whichever worker
//! picked them up. The reduction variant combines per-leaf results with a
//! user-supplied associative combiner, in strict left-to-right index order,
//! so even non-commutative combiners produce a deterministic result.
//!
//! Loop bodies may themselves call back into the engine: a nested call from
//! a pool worker runs directly on that worker instead of submitting and
//! blocking, so nested parallel loops never deadlock.
//!
//! # Examples
//!
//! Square every element of a vector:
//!
//! ```
//! use parloop::prelude::*;
//! use std::sync::atomic::{AtomicI64, Ordering};
//!
//! let a: Vec<i64> = (0..10).collect();
//! let b: Vec<AtomicI64> = (0..10).map(|_| AtomicI64::new(0)).collect();
//!
//! par_loop(10, |i: i32| {
//!     let i = i as usize;
//!     b[i].store(a[i] * a[i], Ordering::Relaxed);
//! });
//!
//! assert_eq!(b[9].load(Ordering::Relaxed), 81);
//! ```
//!
//! Sum a range of values:
//!
//! ```
//! use parloop::prelude::*;
//!
//! let total = par_reduce(1..101, Reduction::new(|i: i32| i as i64, |a, b| a + b));
//! assert_eq!(total, 5050);
//! ```
#![warn(missing_docs)]

pub(crate) mod check;
pub mod core;
pub mod parallel;

pub mod prelude {
    //! This module contains the most used types and functions.
    pub use crate::core::registry::{get_global_registry, new_global_registry, Registry};
    pub use crate::parallel::{par_loop, par_reduce, IndexRange, LoopBody, ReduceBody, Reduction};
}
