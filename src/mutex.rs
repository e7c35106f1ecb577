/*
 * Mutex with direct handoff (spec §4.6).
 *
 * Grounded on `original_source/mutex.c`. The defining property is that
 * `unlock` never clears `locked` when it has a waiter to hand off to --
 * it wakes the head of the FIFO queue while leaving the lock marked held,
 * so that waiter does not need to (and must not) re-test availability on
 * wake. Without this, a task scheduled between the unlock and the waiter's
 * next run could steal the lock and starve the FIFO order (spec §4.6
 * "Rationale for direct handoff").
 */

use core::cell::Cell;

use crate::arch;
use crate::queue::Queue;
use crate::scheduler;
#[cfg(test)]
use crate::task::TaskHandle;

/// A single-holder lock with FIFO waiters and direct handoff on unlock.
///
/// Must live in `'static` storage (a `static MUTEX: Mutex = Mutex::new();`)
/// since its waiters queue links `&'static Task`s, same requirement as
/// `Queue` itself.
pub struct Mutex {
    locked: Cell<bool>,
    waiters: Queue,
}

// SAFETY: every field access happens with interrupts disabled (via
// `crate::critical::with`), the same single-core discipline `Task`
// relies on (see queue.rs).
unsafe impl Sync for Mutex {}

impl Mutex {
    pub const fn new() -> Self {
        Self {
            locked: Cell::new(false),
            waiters: Queue::new(),
        }
    }

    /// Acquire the lock, blocking the current task if it is already held.
    ///
    /// On a blocking path, the task resumes already holding the lock by
    /// direct handoff -- it must not (and does not need to) retest
    /// `locked` after this call returns.
    pub fn lock(&'static self) {
        crate::critical::with(|| {
            if !self.locked.get() {
                self.locked.set(true);
                return;
            }

            let task = scheduler::current();
            Queue::remove(task);
            self.waiters.insert_tail(task);
            // SAFETY: `task` is the current task, just moved onto this
            // mutex's waiters queue; `unlock` is the only thing that will
            // ever move it off again, straight onto the runnable queue.
            unsafe { arch::switch_away_from(task) };
        });
    }

    /// Release the lock. If another task is waiting, hand the lock
    /// directly to it (it is woken already considered the holder);
    /// otherwise mark the lock free.
    pub fn unlock(&'static self) {
        crate::critical::with(|| match self.waiters.head() {
            Some(next_holder) => scheduler::wakeup(next_holder),
            None => self.locked.set(false),
        });
    }

    /// Handle of the task currently blocked longest on this mutex, if any.
    /// Exposed for an instrumented test harness to check FIFO order (spec
    /// §8 "Mutex FIFO") without taking the lock.
    #[cfg(test)]
    pub(crate) fn first_waiter(&self) -> Option<TaskHandle> {
        self.waiters.head()
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::task::Task;
    use std::boxed::Box;

    fn leak(t: Task) -> &'static Task {
        Box::leak(Box::new(t))
    }

    fn leak_mutex() -> &'static Mutex {
        Box::leak(Box::new(Mutex::new()))
    }

    #[test]
    fn lock_uncontended_succeeds_without_blocking() {
        let m = leak_mutex();
        m.lock();
        assert!(m.locked.get());
        assert!(m.first_waiter().is_none());
    }

    #[test]
    fn unlock_with_no_waiters_frees_the_lock() {
        let m = leak_mutex();
        m.lock();
        m.unlock();
        assert!(!m.locked.get());
    }

    #[test]
    fn unlock_hands_lock_directly_to_fifo_head_without_clearing_locked() {
        let m = leak_mutex();
        m.locked.set(true);
        let a = leak(Task::new_for_test(1));
        let b = leak(Task::new_for_test(2));
        m.waiters.insert_tail(a);
        m.waiters.insert_tail(b);

        m.unlock();

        // `a` was handed the lock: it is runnable now, `locked` was never
        // cleared, and `b` is still FIFO-first among waiters.
        assert!(m.locked.get());
        assert_eq!(m.first_waiter().unwrap().test_id(), 2);
    }
}
