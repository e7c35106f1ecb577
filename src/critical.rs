/*
 * Critical sections (spec §5 "Shared resources": "all kernel queues and
 * the current-task pointer are mutated only with interrupts disabled --
 * the equivalent of a process-wide lock with zero overhead on a single
 * core").
 *
 * This is a thin wrapper around the `critical_section` crate rather than a
 * hand-rolled `cli`/`sei` pair, so the same call works whether the `avr`
 * backend is wired in (`arch::enter_critical_section` maps to real
 * `cli`/restore-`SREG`) or the host backend is used under `cargo test`
 * (`critical_section`'s `std` feature backs it with a process-wide mutex).
 *
 * `critical_section::with` nests correctly: re-entering from inside an
 * already-disabled section is a no-op on exit until the outermost section
 * unwinds. This is what lets `Mutex::unlock` be called from inside
 * `Condvar::wait`'s own `with` (§4.7's "unlock and suspend must be atomic")
 * without double-restoring interrupt state.
 */

/// Run `f` with interrupts disabled, restoring the previous interrupt-enable
/// state when `f` returns -- even if `f` itself suspends the current task
/// partway through and only "returns" (via a later `resume`) long after
/// some other task has run. See `arch::switch_away_from` for why that's
/// sound: the physical return address lives on the suspending task's own
/// stack, so this function's cleanup genuinely runs once that task is
/// rescheduled, exactly as if `f` had returned immediately.
pub fn with<R>(f: impl FnOnce() -> R) -> R {
    let restore = crate::arch::enter_critical_section();
    let result = f();
    crate::arch::exit_critical_section(restore);
    result
}
