//! Environment-driven configuration of the global worker pool.
use std::env;

/// Global configuration.
///
/// Read once, when the global registry is lazily created. The per-call
/// tuning knob of the engine is the `chunk` threshold, not the pool shape.
pub struct Configuration {
    max_threads: usize,
    pinning: bool,
}

impl Configuration {
    /// Create a configuration with an explicit thread count and pinning flag.
    pub fn new(max_threads: usize, pinning: bool) -> Configuration {
        if max_threads == 0 {
            panic!("Error: Cannot configure a pool with 0 threads!");
        }
        Configuration {
            max_threads,
            pinning,
        }
    }

    /// Create a configuration from the environment.
    ///
    /// `PARLOOP_MAX_THREADS` overrides the worker count (default: the number
    /// of logical cores). `PARLOOP_PINNING` enables pinning worker `i` to
    /// core `i` (default: false).
    pub fn new_default() -> Configuration {
        let max_threads = match env::var("PARLOOP_MAX_THREADS") {
            Ok(val) => val.parse::<usize>().unwrap(),
            Err(_) => num_cpus::get(),
        };
        let pinning = match env::var("PARLOOP_PINNING") {
            Ok(val) => val.parse::<bool>().unwrap(),
            Err(_) => false,
        };
        Configuration::new(max_threads, pinning)
    }

    /// Get the maximum number of worker threads.
    pub(crate) fn get_max_threads(&self) -> usize {
        self.max_threads
    }

    /// Get the pinning flag.
    pub(crate) fn get_pinning(&self) -> bool {
        self.pinning
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn reset_env() {
        env::remove_var("PARLOOP_MAX_THREADS");
        env::remove_var("PARLOOP_PINNING");
    }

    #[test]
    #[serial]
    fn test_configuration() {
        reset_env();
        let conf = Configuration::new_default();
        assert_eq!(conf.max_threads, num_cpus::get());
        assert!(!conf.pinning);
    }

    #[test]
    #[serial]
    fn test_configuration_with_env() {
        env::set_var("PARLOOP_MAX_THREADS", "4");
        env::set_var("PARLOOP_PINNING", "true");
        let conf = Configuration::new_default();
        assert_eq!(conf.max_threads, 4);
        assert!(conf.pinning);
        reset_env();
    }

    #[test]
    #[should_panic(expected = "0 threads")]
    fn test_zero_threads() {
        Configuration::new(0, false);
    }
}
