/*
 * Intrusive task queue
 *
 * Every wait-set in the kernel (runnable, suspended, sleeping, a mutex's
 * waiters, a condvar's waiters) is one of these. There is no allocation:
 * the link lives inside the `Task` itself, and a queue is just a pair of
 * `Option<&'static Task>` pointers at the ends of the chain.
 *
 * A task carries a back-pointer to the queue that currently holds it
 * (`Task::link().queue`), so `remove()` can patch up the queue's head/tail
 * without the caller having to know which queue a task is on -- this is
 * what lets `wakeup()` unlink a task from *whatever* queue it's currently
 * sitting in.
 */

use core::cell::Cell;

use crate::task::Task;

/// Intrusive link embedded in every `Task`.
///
/// All fields are `Cell`s rather than plain fields because tasks are shared
/// as `&'static Task` and mutated from within a critical section rather than
/// through a unique `&mut Task` -- there is exactly one owner (the kernel,
/// with interrupts disabled) at any instant, but the borrow checker can't see
/// that, so `Cell` is the standard escape hatch here.
pub struct Link {
    prev: Cell<Option<&'static Task>>,
    next: Cell<Option<&'static Task>>,
    queue: Cell<Option<&'static Queue>>,
}

impl Link {
    pub const fn new() -> Self {
        Self {
            prev: Cell::new(None),
            next: Cell::new(None),
            queue: Cell::new(None),
        }
    }
}

impl Default for Link {
    fn default() -> Self {
        Self::new()
    }
}

/// A FIFO queue of tasks. Empty iff `head` is `None`.
pub struct Queue {
    head: Cell<Option<&'static Task>>,
    tail: Cell<Option<&'static Task>>,
}

// SAFETY: same rationale as `Task`'s `Sync` impl below -- every queue used
// by the kernel is a `'static` singleton (runnable/suspended/sleeping, or
// a mutex/condvar's waiters) mutated only from inside a critical section
// (`crate::critical::with`), which on this single-core target is the only
// synchronization primitive there is.
unsafe impl Sync for Queue {}

impl Queue {
    pub const fn new() -> Self {
        Self {
            head: Cell::new(None),
            tail: Cell::new(None),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.get().is_none()
    }

    pub fn head(&self) -> Option<&'static Task> {
        self.head.get()
    }

    /// Append `task` to the tail of this queue. `task` must not currently be
    /// linked into any other queue.
    ///
    /// Call only with interrupts disabled (see `crate::critical`).
    pub fn insert_tail(&'static self, task: &'static Task) {
        debug_assert!(
            task.link().queue.get().is_none(),
            "task inserted into a queue while already linked into another"
        );

        let link = task.link();
        link.prev.set(self.tail.get());
        link.next.set(None);
        link.queue.set(Some(self));

        match self.tail.get() {
            Some(prev_tail) => prev_tail.link().next.set(Some(task)),
            None => self.head.set(Some(task)),
        }
        self.tail.set(Some(task));
    }

    /// Unlink `task` from whichever queue it is currently on, if any. No-op
    /// if the task is not linked into a queue.
    ///
    /// Call only with interrupts disabled.
    pub fn remove(task: &'static Task) {
        let link = task.link();
        let Some(queue) = link.queue.get() else {
            return;
        };

        let prev = link.prev.get();
        let next = link.next.get();

        match prev {
            Some(p) => p.link().next.set(next),
            None => queue.head.set(next),
        }
        match next {
            Some(n) => n.link().prev.set(prev),
            None => queue.tail.set(prev),
        }

        link.prev.set(None);
        link.next.set(None);
        link.queue.set(None);
    }

    /// Remove the task at the head of this queue and return it, if any.
    ///
    /// Call only with interrupts disabled.
    pub fn pop_head(&'static self) -> Option<&'static Task> {
        let head = self.head.get()?;
        Self::remove(head);
        Some(head)
    }

    /// Rotate `node` (which must be the current head) to the tail: the next
    /// scheduling decision will prefer the task that used to follow it. O(1).
    ///
    /// Call only with interrupts disabled.
    pub fn rotate_head_to_tail(&'static self) {
        if let Some(head) = self.head.get() {
            Self::remove(head);
            self.insert_tail(head);
        }
    }

    /// Iterate over every task currently linked into this queue.
    ///
    /// Safe against unlinking the *current* node mid-iteration (the next
    /// pointer is captured before the closure runs), matching spec's
    /// `foreach` contract.
    pub fn for_each(&self, mut f: impl FnMut(&'static Task)) {
        let mut cur = self.head.get();
        while let Some(task) = cur {
            cur = task.link().next.get();
            f(task);
        }
    }
}

impl Default for Queue {
    fn default() -> Self {
        Self::new()
    }
}

// Gives `Queue`/`Link` access to a task's link cells without making them a
// public field of `Task`.
impl Task {
    pub(crate) fn link(&self) -> &Link {
        self.link_cell()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::task::Task;
    use std::boxed::Box;

    // Tasks used by queue tests never actually run; only their link/id
    // fields are exercised, so a zero-length stack is fine here.
    fn new_task(id: u8) -> Task {
        Task::new_for_test(id)
    }

    #[test]
    fn empty_queue_has_no_head() {
        let q = Queue::new();
        assert!(q.is_empty());
        assert!(q.head().is_none());
    }

    #[test]
    fn insert_tail_preserves_fifo_order() {
        static Q: Queue = Queue::new();
        let a = leak(new_task(1));
        let b = leak(new_task(2));
        let c = leak(new_task(3));

        Q.insert_tail(a);
        Q.insert_tail(b);
        Q.insert_tail(c);

        assert_eq!(Q.pop_head().unwrap().test_id(), 1);
        assert_eq!(Q.pop_head().unwrap().test_id(), 2);
        assert_eq!(Q.pop_head().unwrap().test_id(), 3);
        assert!(Q.is_empty());
    }

    #[test]
    fn remove_from_middle_relinks_neighbors() {
        static Q: Queue = Queue::new();
        let a = leak(new_task(1));
        let b = leak(new_task(2));
        let c = leak(new_task(3));

        Q.insert_tail(a);
        Q.insert_tail(b);
        Q.insert_tail(c);

        Queue::remove(b);

        assert_eq!(Q.pop_head().unwrap().test_id(), 1);
        assert_eq!(Q.pop_head().unwrap().test_id(), 3);
        assert!(Q.is_empty());
    }

    #[test]
    fn rotate_moves_head_to_tail() {
        static Q: Queue = Queue::new();
        let a = leak(new_task(1));
        let b = leak(new_task(2));

        Q.insert_tail(a);
        Q.insert_tail(b);

        Q.rotate_head_to_tail();

        assert_eq!(Q.pop_head().unwrap().test_id(), 2);
        assert_eq!(Q.pop_head().unwrap().test_id(), 1);
    }

    #[test]
    fn for_each_survives_removal_of_current_node() {
        static Q: Queue = Queue::new();
        let a = leak(new_task(1));
        let b = leak(new_task(2));
        let c = leak(new_task(3));

        Q.insert_tail(a);
        Q.insert_tail(b);
        Q.insert_tail(c);

        let mut seen = heapless::Vec::<u8, 4>::new();
        Q.for_each(|t| {
            if t.test_id() == 2 {
                Queue::remove(t);
            }
            let _ = seen.push(t.test_id());
        });

        assert_eq!(seen.as_slice(), &[1, 2, 3]);
        assert!(!Q.is_empty());
    }

    // Test-only helper: leak a `Task` to get a `&'static Task`, mirroring how
    // real tasks are always caller-provided `'static` storage.
    fn leak(t: Task) -> &'static Task {
        Box::leak(Box::new(t))
    }
}
