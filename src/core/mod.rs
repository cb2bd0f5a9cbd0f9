//! Core components of the engine.
//!
//! This module contains the worker pool and its configuration.
//!
//! The pool is a registry of worker threads, each owning a local deque of
//! jobs and a set of stealers over the deques of the other workers. Jobs
//! submitted from outside the pool land in a global injector queue; jobs
//! forked by a worker land on that worker's own deque. Idle workers drain
//! their deque first, then the injector, then steal from their siblings.
//! The registry is a process-wide singleton, created lazily from the
//! [`configuration::Configuration`] on first use and never shut down during
//! normal process execution.

pub mod configuration;
pub mod registry;
