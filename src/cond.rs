/*
 * Condition variable (spec §4.7).
 *
 * Grounded on `original_source/cond.c`. The one subtlety worth restating:
 * `wait` must unlock the mutex and suspend as a single atomic step with
 * respect to interrupts, or a signaler that runs between the unlock and
 * the suspend would see an empty waiters queue and wake no one (spec
 * §4.7, §8 "No-lost-wakeup"). That's why `Mutex::unlock` is called *from
 * inside* this module's own critical section rather than before entering
 * it -- `critical_section` nests correctly, so the combined region stays
 * disabled for interrupts the whole time.
 */

use crate::arch;
use crate::mutex::Mutex;
use crate::queue::Queue;
use crate::scheduler;

/// A FIFO wait-queue with `wait`/`signal`/`broadcast`. Carries no owning
/// mutex of its own -- `wait` takes the mutex as an argument (spec §3: "one
/// cvar may be used with different mutexes in principle").
pub struct Condvar {
    waiters: Queue,
}

// SAFETY: same rationale as `Mutex`'s `Sync` impl -- mutated only inside
// `crate::critical::with`.
unsafe impl Sync for Condvar {}

impl Condvar {
    pub const fn new() -> Self {
        Self { waiters: Queue::new() }
    }

    /// Atomically unlock `mutex` and suspend the current task on this
    /// cvar's waiters queue, then re-acquire `mutex` before returning.
    ///
    /// The caller must hold `mutex`. As with every cvar, the kernel
    /// guarantees no spurious wakeups of its own, but callers must still
    /// re-check their predicate after `wait` returns (spec §4.7) -- this
    /// call only promises that a matching `signal`/`broadcast` will wake
    /// this task eventually, not that the condition it was waiting for
    /// still holds by the time it gets the mutex back.
    pub fn wait(&'static self, mutex: &'static Mutex) {
        crate::critical::with(|| {
            mutex.unlock();
            let task = scheduler::current();
            Queue::remove(task);
            self.waiters.insert_tail(task);
            // SAFETY: `task` is the current task, just moved onto this
            // cvar's waiters queue.
            unsafe { arch::switch_away_from(task) };
        });
        mutex.lock();
    }

    /// Wake the longest-waiting task, if any. A no-op on an empty cvar.
    pub fn signal(&'static self) {
        crate::critical::with(|| {
            if let Some(task) = self.waiters.head() {
                scheduler::wakeup(task);
            }
        });
    }

    /// Wake every waiting task, in FIFO order.
    pub fn broadcast(&'static self) {
        crate::critical::with(|| {
            while let Some(task) = self.waiters.head() {
                scheduler::wakeup(task);
            }
        });
    }

    #[cfg(test)]
    pub(crate) fn waiter_count(&self) -> usize {
        let mut n = 0;
        self.waiters.for_each(|_| n += 1);
        n
    }
}

impl Default for Condvar {
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

    fn leak_cond() -> &'static Condvar {
        Box::leak(Box::new(Condvar::new()))
    }

    #[test]
    fn signal_on_empty_cond_is_a_no_op() {
        let c = leak_cond();
        c.signal();
        assert_eq!(c.waiter_count(), 0);
    }

    #[test]
    fn signal_wakes_exactly_the_fifo_head() {
        let c = leak_cond();
        let a = leak(Task::new_for_test(1));
        let b = leak(Task::new_for_test(2));
        c.waiters.insert_tail(a);
        c.waiters.insert_tail(b);

        c.signal();

        assert_eq!(c.waiter_count(), 1);
        assert_eq!(c.waiters.head().unwrap().test_id(), 2);
    }

    #[test]
    fn broadcast_drains_every_waiter() {
        let c = leak_cond();
        for id in 1..=5u8 {
            c.waiters.insert_tail(leak(Task::new_for_test(id)));
        }

        c.broadcast();

        assert_eq!(c.waiter_count(), 0);
    }
}
