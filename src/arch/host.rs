/*
 * Host backend, selected for every non-AVR target so the portable kernel
 * (queue, task, scheduler, mutex, condvar) can be exercised with `cargo
 * test`. There is no real hardware stack to switch on the host, so this
 * backend supplies just enough to let the crate compile and to let the
 * portable *state machine* be driven directly from tests -- it does not
 * attempt to fake a real AVR-style context switch.
 *
 * SPEC_FULL.md §2.5: the naked-asm context switch and timer ISR are not
 * exercised by `cargo test` on this target (mirroring how the teacher's
 * naked interrupt trampolines are likewise only exercised by booting in
 * QEMU, not by unit tests). Tests instead call `scheduler`'s queue
 * transitions, `on_tick`, mutex/condvar wakeup ordering, etc. directly,
 * none of which touch this module.
 */

use crate::task::{Task, TaskFn};

/// Reference tick period used by host tests; the host has no real timer to
/// derive this from a clock prescaler, so it just mirrors the AVR
/// backend's reference value (spec §6).
pub const TICK_MS: u32 = 2;

/// Host builds never run a real task -- `scheduler::run`/`task_start` are
/// not exercised by `cargo test` (see module docs) -- so there is no
/// first-run context to construct. Returns a null pointer; storing it in a
/// `Task` is harmless as long as nothing ever calls `resume_task` on that
/// task, which host tests don't.
pub(crate) unsafe fn init_stack(_stack: &'static mut [u8], _entry: TaskFn, _arg: usize) -> *mut u8 {
    core::ptr::null_mut()
}

pub(crate) fn install_tick_timer() {
    // No hardware timer on the host; tests drive ticks by calling
    // `scheduler::on_tick` directly instead of waiting for an interrupt.
}

pub(crate) fn wait_for_interrupt() {
    // Nothing to idle on in a unit test process; `scheduler::run`'s idle
    // branch is not exercised on this target.
}

pub(crate) fn sub_tick_us() -> u32 {
    // No free-running sub-tick hardware counter to sample on the host.
    0
}

/// Not exercised by host tests (see module docs): there is no real stack
/// to switch onto here, so this would need a genuine fiber/green-thread
/// implementation to be meaningful, which this crate intentionally does
/// not provide for a target that only exists to unit-test the portable
/// logic above the architecture boundary.
pub(crate) unsafe fn yield_from_task(_task: &'static Task) {
    unreachable!("host backend has no real context switch; covered by direct state-machine tests instead")
}

/// See `yield_from_task`.
pub(crate) unsafe fn resume_task(_task: &'static Task) -> ! {
    unreachable!("host backend has no real context switch; covered by direct state-machine tests instead")
}
