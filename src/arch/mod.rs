/*
 * Architecture boundary (spec §4.2, §9).
 *
 * Everything above this module -- queue, task, scheduler, mutex, condvar --
 * is portable. Only two things live below it:
 *
 * - the register-save/restore context switch and first-run stack
 *   construction, which must be written in the target's own assembly, and
 * - wiring the periodic tick interrupt to `crate::scheduler::on_tick`.
 *
 * The reference MCU class (§1) is a classic 8-bit AVR part (e.g.
 * ATmega328P, 16 MHz, 2 KiB SRAM), so `target_arch = "avr"` is the real
 * backend. A second backend is selected for every other target so the
 * portable logic above this module can be exercised with `cargo test` on
 * the host, where there is no hardware stack-switch to perform.
 */

use crate::task::Task;

#[cfg(target_arch = "avr")]
mod avr;
#[cfg(target_arch = "avr")]
pub(crate) use avr::{
    init_stack, install_tick_timer, resume_task, sub_tick_us, wait_for_interrupt, yield_from_task,
};
#[cfg(target_arch = "avr")]
pub use avr::tick_isr;
#[cfg(target_arch = "avr")]
pub use avr::TICK_MS;

#[cfg(not(target_arch = "avr"))]
mod host;
#[cfg(not(target_arch = "avr"))]
pub(crate) use host::{
    init_stack, install_tick_timer, resume_task, sub_tick_us, wait_for_interrupt, yield_from_task,
};
#[cfg(not(target_arch = "avr"))]
pub use host::TICK_MS;

/// Save `task`'s full register context onto its own stack (as identified by
/// the architecture's live stack pointer) and hand control to the
/// scheduler, which runs on its own, separate stack.
///
/// This call does not return in the usual sense -- the asm it wraps ends
/// in a tail jump into the scheduler, not a `ret` -- but it is not `-> !`
/// either: when some other actor later makes `task` runnable again and the
/// scheduler dispatches it via `resume`, control reappears exactly here,
/// at the statement following this call, because `resume`'s final
/// `ret`/`reti` pops the very return address this function's own prologue
/// pushed onto `task`'s stack. Typing this as a normal, returning call is
/// what lets callers (`scheduler::suspend`, `Condvar::wait`, ...) run code
/// after the switch once the task is scheduled again -- marking it `-> !`
/// would tell the optimizer that code unreachable, which is exactly
/// backwards (spec §4.2's context-switch subtlety, the Rust-level version
/// of it).
///
/// Called with interrupts already disabled; the previous interrupt-enable
/// state is encoded in the pushed status register and is restored
/// atomically with the eventual `resume` of this exact task (§4.2).
///
/// # Safety
/// Must be called only from `task`'s own execution context, with `task`
/// already unlinked from the runnable queue by the caller (the caller is
/// responsible for deciding where `task` goes -- runnable tail, a
/// suspended/sleeping queue, or a sync primitive's waiters).
pub unsafe fn switch_away_from(task: &'static Task) {
    unsafe { yield_from_task(task) }
}

pub(crate) fn enter_critical_section() -> critical_section::RestoreState {
    // SAFETY: paired with `exit_critical_section` below in every caller.
    unsafe { critical_section::acquire() }
}

pub(crate) fn exit_critical_section(state: critical_section::RestoreState) {
    // SAFETY: `state` always comes from a matching `enter_critical_section`.
    unsafe { critical_section::release(state) }
}
