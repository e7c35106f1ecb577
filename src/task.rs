/*
 * Task control block and the task-facing half of the external API (§6).
 *
 * A `Task` is never destroyed (spec §1 Non-goal: no dynamic task
 * destruction) and is never heap-allocated (no `alloc` dependency at all).
 * Callers provide both the `Task` slot and its stack buffer as `'static
 * mut` storage -- see `task_create` -- which is the "caller-provided
 * buffer" alternative to a bump-pointer stack arena that spec §9's design
 * notes call out explicitly.
 */

use core::cell::Cell;

use crate::arch;
use crate::queue::Link;

/// Function signature tasks are created with. Takes one `usize`-sized
/// argument, matching the single-argument-register first-run ABI in §4.2.
pub type TaskFn = fn(usize);

/// Opaque handle to a task, returned by `task_create` and accepted by
/// `task_wakeup`/`task_suspend`. Backed by a `&'static Task` rather than a
/// raw pointer, so the handle can never dangle.
pub type TaskHandle = &'static Task;

/// Per-task control block (TCB).
///
/// Holds exactly the three attributes spec §3 calls essential: the saved
/// stack pointer, the sleep countdown, and the intrusive queue link. At any
/// instant a task is linked into exactly one queue (the single-queue
/// invariant from §8), enforced by `Queue::insert_tail`'s debug assertion
/// and by the fact that every transition goes through `Queue::remove` first.
///
/// `#[repr(C)]` with `sp` as the first field is load-bearing on AVR: the
/// naked context-switch asm in `arch::avr` addresses a task's saved stack
/// pointer through the task's own address (mirroring the original C code's
/// `t->sp`, where `t` is a struct pointer and `sp` its first member).
/// `Cell<T>` is `#[repr(transparent)]` over `T`, so this holds through the
/// `Cell` wrapper as well.
#[repr(C)]
pub struct Task {
    /// Saved stack pointer. Written only by the architecture's context-save
    /// code, read only by its context-restore code (§3). Must stay the
    /// first field.
    sp: Cell<*mut u8>,

    link: Link,

    /// Ticks remaining before this task is promoted out of the sleeping
    /// queue. Nonzero only while linked into the sleeping queue.
    sleep_ticks: Cell<u16>,

    #[cfg(test)]
    test_id: u8,
}

// SAFETY: a `Task` is only ever mutated with interrupts disabled (every
// write to its `Cell` fields happens inside `crate::critical::with` or
// inside the context-switch/tick ISR, which runs with interrupts already
// off). On this single-core target that critical section is the only
// synchronization primitive there is, so there is never genuine concurrent
// access -- the borrow checker just can't see across the ISR boundary.
unsafe impl Sync for Task {}

impl Task {
    /// Construct a `Task` with no first-run context yet. Call `task_create`
    /// to get a fully initialized, schedulable task; this constructor alone
    /// leaves `sp` null, which must not be scheduled.
    pub const fn new() -> Self {
        Self {
            sp: Cell::new(core::ptr::null_mut()),
            link: Link::new(),
            sleep_ticks: Cell::new(0),
            #[cfg(test)]
            test_id: 0,
        }
    }

    pub(crate) fn link_cell(&self) -> &Link {
        &self.link
    }

    pub(crate) fn sp(&self) -> *mut u8 {
        self.sp.get()
    }

    pub(crate) fn set_sp(&self, sp: *mut u8) {
        self.sp.set(sp);
    }

    pub(crate) fn sleep_ticks(&self) -> u16 {
        self.sleep_ticks.get()
    }

    pub(crate) fn set_sleep_ticks(&self, ticks: u16) {
        self.sleep_ticks.set(ticks);
    }

    /// Decrement the sleep countdown by one tick, saturating at zero.
    /// Returns `true` if the countdown just reached zero.
    pub(crate) fn tick_sleep(&self) -> bool {
        let ticks = self.sleep_ticks.get();
        if ticks == 0 {
            return false;
        }
        let ticks = ticks - 1;
        self.sleep_ticks.set(ticks);
        ticks == 0
    }

    #[cfg(test)]
    pub(crate) fn new_for_test(id: u8) -> Self {
        Self {
            sp: Cell::new(core::ptr::null_mut()),
            link: Link::new(),
            sleep_ticks: Cell::new(0),
            test_id: id,
        }
    }

    #[cfg(test)]
    pub(crate) fn test_id(&self) -> u8 {
        self.test_id
    }
}

impl Default for Task {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the first-run context for `task` so that scheduling it for the
/// first time dispatches to `entry(arg)`, on the stack given by `stack`.
///
/// `stack` must not be shared with any other task and must outlive the
/// kernel (`'static`); it is typically a `static mut` buffer sized by
/// `Config::STACK_BYTES`. See spec §4.2 "First-run stack construction" and
/// §9's note on caller-provided stacks.
///
/// # Safety
/// `task` must not already be linked into any queue (i.e. this must be the
/// one-time initialization of a freshly-declared `Task`), and `stack` must
/// be valid for writes for its entire length and not aliased elsewhere.
pub unsafe fn task_create(task: &'static Task, stack: &'static mut [u8], entry: TaskFn, arg: usize) -> TaskHandle {
    let sp = unsafe { arch::init_stack(stack, entry, arg) };
    task.set_sp(sp);
    task.set_sleep_ticks(0);
    crate::scheduler::admit(task);
    log::debug!("task created: sp={:p}", sp);
    task
}

/// Example driver shape this API is meant to support (see SPEC_FULL.md
/// §3, "driver consumption pattern"): an interrupt-driven device arms a
/// single in-flight request, suspends the requesting task on the default
/// suspended queue, and the completion ISR calls `task_wakeup` on it.
///
/// ```ignore
/// static REQUESTER: Cell<Option<TaskHandle>> = Cell::new(None);
///
/// fn blocking_read() {
///     crate::critical::with(|| {
///         arm_hardware_request();
///         REQUESTER.set(Some(task_current()));
///     });
///     task_suspend(None);
/// }
///
/// // Called from the device's completion ISR:
/// fn on_completion_isr() {
///     if let Some(t) = REQUESTER.take() {
///         task_wakeup(t);
///     }
/// }
/// ```
pub fn task_suspend(queue: Option<&'static crate::queue::Queue>) {
    crate::scheduler::suspend(queue)
}

pub fn task_wakeup(task: TaskHandle) {
    crate::scheduler::wakeup(task)
}

pub fn task_current() -> TaskHandle {
    crate::scheduler::current()
}

pub fn task_yield() {
    crate::scheduler::yield_now()
}

pub fn task_sleep(ms: u32) {
    crate::scheduler::sleep(ms)
}
