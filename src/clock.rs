/*
 * Monotonic timekeeping (spec §4.4 step 2, §6 `task_ms()`/`task_us()`).
 *
 * Grounded on the canonical `task.c`'s `TASK_COUNT_MSEC`/`TASK_COUNT_USEC`
 * accounting (see original_source/task.c): a tick-resolution millisecond
 * counter advanced once per tick by the ISR, and a microsecond reading
 * that composes that counter with a free-running sub-tick hardware sample
 * (`TCNT0 * US_PER_COUNT` in the original) so reads between ticks aren't
 * quantized to `TICK_MS`. SPEC_FULL.md §3 widens the original's 8-bit
 * `task_ms()` to `u32` here -- non-decreasing either way, just less prone
 * to wrapping every 256ms.
 */

use core::cell::Cell;

/// `Cell<T>` is never `Sync`, so the process-wide millisecond counter needs
/// the same newtype-plus-manual-`Sync` treatment as `queue.rs`'s `Queue`:
/// mutated only from inside a critical section (here, the tick ISR, which
/// already runs with interrupts disabled).
struct MillisCell(Cell<u32>);

// SAFETY: same rationale as `Queue`'s `Sync` impl -- `MILLIS` is only ever
// written from `advance_tick` (tick ISR context, interrupts already off)
// and read from `now_ms`/`now_us`.
unsafe impl Sync for MillisCell {}

static MILLIS: MillisCell = MillisCell(Cell::new(0));

/// Advance the millisecond counter by one tick's width. Called once per
/// tick from `scheduler::on_tick`, with interrupts already disabled (it
/// runs on the ISR's borrowed stack).
pub(crate) fn advance_tick() {
    MILLIS.0.set(MILLIS.0.get().wrapping_add(crate::config::TICK_MS));
}

/// Monotonic millisecond counter (spec §6 `task_ms()`). Non-decreasing
/// except for the unavoidable wraparound at `u32::MAX`.
pub fn now_ms() -> u32 {
    MILLIS.0.get()
}

/// Monotonic microsecond counter (spec §6 `task_us()`), accurate to better
/// than one tick by sampling the architecture's free-running sub-tick
/// counter (`arch::sub_tick_us`). Non-decreasing within a tick per spec §8
/// as long as the sampled hardware counter itself does not wrap between
/// two calls inside the same tick, which holds for the reference timer
/// configuration (the counter resets every tick, well before it could
/// overflow).
pub fn now_us() -> u32 {
    now_ms()
        .wrapping_mul(1000)
        .wrapping_add(crate::arch::sub_tick_us())
}
