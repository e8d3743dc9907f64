//! Single-flight guard.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lets at most one run hold the "in progress" flag.
///
/// Acquisition never blocks and never queues: a caller that finds the flag
/// set gets `None` and is expected to give up.
#[derive(Debug, Default)]
pub struct RunGuard {
    in_progress: Mutex<bool>,
}

impl RunGuard {
    /// Create a released guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Test-and-set the flag. The flag clears when the permit is dropped.
    pub fn try_acquire(&self) -> Option<RunPermit<'_>> {
        let mut in_progress = self.lock();
        if *in_progress {
            return None;
        }
        *in_progress = true;
        Some(RunPermit { guard: self })
    }

    /// Whether a run currently holds the flag.
    pub fn is_held(&self) -> bool {
        *self.lock()
    }

    fn release(&self) {
        *self.lock() = false;
    }

    // A panic while holding the permit still releases it in Drop, so the
    // flag itself is never left inconsistent by poisoning.
    fn lock(&self) -> MutexGuard<'_, bool> {
        self.in_progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Proof of holding the [`RunGuard`]. Releases the guard on drop.
#[derive(Debug)]
#[must_use = "dropping the permit releases the guard immediately"]
pub struct RunPermit<'a> {
    guard: &'a RunGuard,
}

impl Drop for RunPermit<'_> {
    fn drop(&mut self) {
        self.guard.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_second_acquire_fails_while_held() {
        let guard = RunGuard::new();
        let permit = guard.try_acquire();
        assert!(permit.is_some());
        assert!(guard.is_held());
        assert!(guard.try_acquire().is_none());

        drop(permit);
        assert!(!guard.is_held());
        assert!(guard.try_acquire().is_some());
    }

    #[test]
    fn test_panic_releases_guard() {
        let guard = RunGuard::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _permit = guard.try_acquire().unwrap();
            panic!("stage blew up");
        }));

        assert!(result.is_err());
        assert!(!guard.is_held());
    }

    proptest! {
        #[test]
        fn only_one_concurrent_holder(threads in 2usize..16) {
            let guard = RunGuard::new();
            let winners = AtomicUsize::new(0);
            let barrier = Barrier::new(threads);
            let release = Barrier::new(threads);

            std::thread::scope(|s| {
                for _ in 0..threads {
                    s.spawn(|| {
                        barrier.wait();
                        let permit = guard.try_acquire();
                        if permit.is_some() {
                            winners.fetch_add(1, Ordering::SeqCst);
                        }
                        // Hold until everyone has tried.
                        release.wait();
                        drop(permit);
                    });
                }
            });

            prop_assert_eq!(winners.load(Ordering::SeqCst), 1);
            prop_assert!(!guard.is_held());
        }
    }
}
