//! Work-stealing thread registry.
//!
//! The registry owns the worker threads that execute range tasks. Each
//! worker keeps a local FIFO deque; jobs submitted from outside the pool go
//! through a global injector queue, jobs forked by a worker go onto the
//! worker's own deque. Idle workers drain their deque first, then the
//! injector, then steal from their siblings.
//!
//! Every worker marks its thread with a thread-local identity while it runs.
//! That identity is what lets the loop entry points distinguish a nested
//! invocation (run in place on the current worker) from a top-level one
//! (submit and block).
use std::{
    cell::Cell,
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Barrier, Mutex, OnceLock, RwLock,
    },
    thread,
};

use crossbeam_deque::{Injector, Steal, Stealer, Worker};
use log::{error, trace};

use super::configuration::Configuration;

pub(crate) type Func<'a> = Box<dyn FnOnce() + Send + 'a>;

enum Job {
    NewJob(Func<'static>),
    Terminate,
}

/// Error raised when the global registry cannot be (re)initialized.
#[derive(Debug)]
pub struct RegistryError {
    details: String,
}

impl RegistryError {
    fn new(msg: &str) -> RegistryError {
        RegistryError {
            details: msg.to_string(),
        }
    }
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.details)
    }
}

impl Error for RegistryError {}

thread_local! {
    // (registry id, worker index) of the worker running on this thread.
    static WORKER: Cell<Option<(usize, usize)>> = const { Cell::new(None) };
}

static REGISTRY_SEQ: AtomicUsize = AtomicUsize::new(0);

/// Global registry of worker threads.
static REGISTRY: OnceLock<Arc<Registry>> = OnceLock::new();

/// Get the global registry, creating it from the default
/// [`Configuration`] if it does not exist yet.
pub fn get_global_registry() -> Arc<Registry> {
    REGISTRY
        .get_or_init(|| {
            let configuration = Configuration::new_default();
            Arc::new(Registry::new(
                configuration.get_max_threads(),
                configuration.get_pinning(),
            ))
        })
        .clone()
}

/// Initialize the global registry with an explicit thread count.
///
/// Returns an error if the global registry was already initialized. The
/// pool lives for the rest of the process; there is no shutdown API.
pub fn new_global_registry(nthreads: usize, pinning: bool) -> Result<Arc<Registry>, RegistryError> {
    let mut created = false;
    let registry = REGISTRY
        .get_or_init(|| {
            created = true;
            Arc::new(Registry::new(nthreads, pinning))
        })
        .clone();
    if created {
        Ok(registry)
    } else {
        Err(RegistryError::new("Global registry already initialized."))
    }
}

/// A pool of worker threads with per-worker deques and work stealing.
pub struct Registry {
    id: usize,
    workers: Vec<Arc<WorkerThread>>,
    threads: Vec<Thread>,
    global: Arc<Injector<Job>>,
    pending: Arc<AtomicUsize>,
}

impl Registry {
    /// Create a new registry with `nthreads` threads.
    /// If `pinning` is true, worker `i` is pinned to core `i`.
    pub fn new(nthreads: usize, pinning: bool) -> Registry {
        if nthreads == 0 {
            panic!("Cannot create a pool with 0 threads.");
        } else if (nthreads > num_cpus::get()) && pinning {
            panic!(
                "Cannot create a pool with more pinned threads than available cores. ({} > {})",
                nthreads,
                num_cpus::get()
            );
        }

        trace!("Creating new thread registry.");
        let id = REGISTRY_SEQ.fetch_add(1, Ordering::Relaxed);
        let mut workers = Vec::new();
        let mut threads = Vec::new();
        let global = Arc::new(Injector::new());
        let pending = Arc::new(AtomicUsize::new(0));

        let barrier = Arc::new(Barrier::new(nthreads));

        for i in 0..nthreads {
            let worker = WorkerThread::new(i, Arc::clone(&global), Arc::clone(&pending));
            workers.push(Arc::new(worker));
        }

        for worker in &workers {
            for other in &workers {
                if Arc::ptr_eq(worker, other) {
                    continue;
                }
                worker.register_stealer(other.get_stealer());
            }
            let worker_copy = Arc::clone(worker);
            let local_barrier = Arc::clone(&barrier);

            let thread = Thread::new(
                worker_copy.id,
                move || {
                    WORKER.with(|w| w.set(Some((id, worker_copy.id))));
                    local_barrier.wait();
                    worker_copy.run();
                },
                pinning,
            );

            threads.push(thread);
        }

        Registry {
            id,
            workers,
            threads,
            global,
            pending,
        }
    }

    /// Get the number of worker threads.
    pub fn get_nthreads(&self) -> usize {
        self.workers.len()
    }

    /// Get the approximate number of submitted-but-unfinished jobs.
    ///
    /// The count races with concurrent submissions and completions; callers
    /// must tolerate staleness.
    pub fn get_queued(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Execute a function in the pool.
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inject(Box::new(f));
    }

    /// Push a job into the global injector queue.
    pub(crate) fn inject(&self, f: Func<'static>) {
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.global.push(Job::NewJob(f));
    }

    /// Push a job onto the current worker's deque.
    ///
    /// Falls back to the injector when the calling thread is not a worker of
    /// this registry.
    pub(crate) fn fork(&self, f: Func<'static>) {
        match self.local_worker_index() {
            Some(i) => {
                self.pending.fetch_add(1, Ordering::AcqRel);
                self.workers[i].push(Job::NewJob(f));
            }
            None => self.inject(f),
        }
    }

    /// True when the calling thread is a worker of this registry.
    ///
    /// Loop entry points use this to decide between running a root task in
    /// place (nested invocation) and submitting it to the pool.
    pub fn is_worker_thread(&self) -> bool {
        self.local_worker_index().is_some()
    }

    fn local_worker_index(&self) -> Option<usize> {
        WORKER
            .with(|w| w.get())
            .and_then(|(id, index)| (id == self.id).then_some(index))
    }

    /// Wait until `done` is set.
    ///
    /// A worker of this registry keeps executing available jobs while it
    /// waits, so a task joining its forked sibling contributes to draining
    /// the pool instead of occupying a thread idly. Any other thread just
    /// yields.
    pub(crate) fn wait_until(&self, done: &AtomicBool) {
        match self.local_worker_index() {
            Some(i) => {
                let me = &self.workers[i];
                while !done.load(Ordering::Acquire) {
                    match me.fetch_task() {
                        Some(Job::NewJob(f)) => me.run_job(f),
                        Some(Job::Terminate) => {
                            // Teardown sentinel of a local registry; put it
                            // back for the main worker loops.
                            self.global.push(Job::Terminate);
                            thread::yield_now();
                        }
                        None => thread::yield_now(),
                    }
                }
            }
            None => {
                while !done.load(Ordering::Acquire) {
                    thread::yield_now();
                }
            }
        }
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        trace!("Closing thread registry.");
        self.global.push(Job::Terminate);
        for thread in &mut self.threads {
            thread.join();
        }
    }
}

/// A worker in the registry.
struct WorkerThread {
    id: usize,
    global: Arc<Injector<Job>>,
    worker: Mutex<Worker<Job>>,
    stealers: RwLock<Vec<Stealer<Job>>>,
    pending: Arc<AtomicUsize>,
}

impl WorkerThread {
    fn new(id: usize, global: Arc<Injector<Job>>, pending: Arc<AtomicUsize>) -> WorkerThread {
        WorkerThread {
            id,
            global,
            worker: Mutex::new(Worker::new_fifo()),
            stealers: RwLock::new(Vec::new()),
            pending,
        }
    }

    fn get_stealer(&self) -> Stealer<Job> {
        self.worker.lock().unwrap().stealer()
    }

    fn register_stealer(&self, stealer: Stealer<Job>) {
        self.stealers.write().unwrap().push(stealer);
    }

    fn push(&self, job: Job) {
        self.worker.lock().unwrap().push(job);
    }

    /// Fetch a task. If the local deque is empty, try to steal a batch of
    /// tasks from the global queue. If the global queue is empty too, try to
    /// steal a task from one of the other workers.
    fn fetch_task(&self) -> Option<Job> {
        if let Some(job) = self.pop() {
            return Some(job);
        } else if let Some(job) = self.steal_from_global() {
            return Some(job);
        } else if let Some(job) = self.steal() {
            return Some(job);
        }
        None
    }

    fn run_job(&self, f: Func<'static>) {
        f();
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }

    /// Main loop of the worker thread.
    fn run(&self) {
        trace!("Worker {} started.", self.id);
        let mut stop = false;
        loop {
            match self.fetch_task() {
                Some(Job::NewJob(f)) => self.run_job(f),
                Some(Job::Terminate) => stop = true,
                None => {
                    if stop {
                        self.global.push(Job::Terminate);
                        break;
                    }
                    thread::yield_now();
                }
            }
        }
        trace!("Worker {} stopped.", self.id);
    }

    fn pop(&self) -> Option<Job> {
        self.worker.lock().unwrap().pop()
    }

    fn steal(&self) -> Option<Job> {
        let stealers = self.stealers.read().unwrap();
        for stealer in stealers.iter() {
            loop {
                match stealer.steal() {
                    Steal::Success(job) => return Some(job),
                    Steal::Empty => break,
                    Steal::Retry => continue,
                }
            }
        }
        None
    }

    fn steal_from_global(&self) -> Option<Job> {
        let worker = self.worker.lock().unwrap();
        loop {
            match self.global.steal_batch_and_pop(&worker) {
                Steal::Success(job) => return Some(job),
                Steal::Empty => return None,
                Steal::Retry => continue,
            };
        }
    }
}

/// An OS thread hosting a worker.
struct Thread {
    thread: Option<thread::JoinHandle<()>>,
}

impl Thread {
    fn new<F>(id: usize, f: F, pinning: bool) -> Thread
    where
        F: FnOnce() + Send + 'static,
    {
        Thread {
            thread: Some(thread::spawn(move || {
                if pinning {
                    let core_ids = core_affinity::get_core_ids().unwrap();
                    match core_ids.get(id) {
                        Some(core) => {
                            let ok = core_affinity::set_for_current(*core);
                            if !ok {
                                error!("Thread pinning for worker {} failed!", id);
                            } else {
                                trace!("Worker {} pinned on core {}.", id, core.id);
                            }
                        }
                        None => {
                            error!("No core available to pin worker {}.", id);
                        }
                    }
                }
                trace!("{:?} started", thread::current().id());
                (f)();
                trace!("{:?} now will end.", thread::current().id());
            })),
        }
    }

    fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            thread.join().unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_registry() {
        let registry = Registry::new(4, false);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..1000 {
            let counter_copy = Arc::clone(&counter);
            registry.execute(move || {
                counter_copy.fetch_add(1, Ordering::AcqRel);
            });
        }
        while registry.get_queued() > 0 {
            thread::yield_now();
        }
        drop(registry);
        assert_eq!(counter.load(Ordering::Acquire), 1000);
    }

    #[test]
    fn test_worker_identity() {
        let registry = Registry::new(2, false);
        assert!(!registry.is_worker_thread());

        let inside = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AtomicBool::new(false));
        let inside_copy = Arc::clone(&inside);
        let done_copy = Arc::clone(&done);
        let registry = Arc::new(registry);
        let registry_copy = Arc::clone(&registry);
        registry.execute(move || {
            inside_copy.store(registry_copy.is_worker_thread(), Ordering::Release);
            done_copy.store(true, Ordering::Release);
        });
        registry.wait_until(&done);
        assert!(inside.load(Ordering::Acquire));
    }

    #[test]
    #[serial]
    fn test_only_one_global() {
        let registry = get_global_registry();
        assert!(registry.get_nthreads() > 0);
        assert!(new_global_registry(registry.get_nthreads(), false).is_err());
    }
}
