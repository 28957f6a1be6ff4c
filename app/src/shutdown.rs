//! Ordered shutdown hooks.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{error, info};

type Hook = Box<dyn FnOnce() + Send>;

/// Explicit list of teardown actions, run in reverse registration order.
///
/// Every hook runs exactly once: an earlier hook panicking does not stop the
/// rest, and hooks not run explicitly still run when the list is dropped.
#[derive(Default)]
pub struct ShutdownHooks {
    hooks: Vec<(&'static str, Hook)>,
}

impl ShutdownHooks {
    /// Create an empty hook list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook. Hooks run in reverse registration order.
    pub fn push(&mut self, name: &'static str, hook: impl FnOnce() + Send + 'static) {
        self.hooks.push((name, Box::new(hook)));
    }

    /// Run all remaining hooks, newest first.
    pub fn run(&mut self) {
        while let Some((name, hook)) = self.hooks.pop() {
            info!(hook = name, "Running shutdown hook");
            if catch_unwind(AssertUnwindSafe(hook)).is_err() {
                error!(hook = name, "Shutdown hook panicked");
            }
        }
    }
}

impl Drop for ShutdownHooks {
    fn drop(&mut self) {
        self.run();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    #[test]
    fn test_hooks_run_in_reverse_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut hooks = ShutdownHooks::new();

        for name in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            hooks.push(name, move || order.lock().unwrap().push(name));
        }
        hooks.run();

        assert_eq!(order.lock().unwrap().as_slice(), &["third", "second", "first"]);
    }

    #[test]
    fn test_panicking_hook_does_not_stop_the_rest() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut hooks = ShutdownHooks::new();

        {
            let order = Arc::clone(&order);
            hooks.push("survivor", move || order.lock().unwrap().push("survivor"));
        }
        hooks.push("bomb", || panic!("boom"));
        hooks.run();

        assert_eq!(order.lock().unwrap().as_slice(), &["survivor"]);
    }

    #[test]
    fn test_drop_runs_remaining_hooks() {
        let order = Arc::new(Mutex::new(Vec::new()));

        {
            let mut hooks = ShutdownHooks::new();
            let order = Arc::clone(&order);
            hooks.push("late", move || order.lock().unwrap().push("late"));
        }

        assert_eq!(order.lock().unwrap().as_slice(), &["late"]);
    }
}
