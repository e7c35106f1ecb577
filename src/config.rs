/*
 * Compile-time configuration (spec §6 "Configuration constants").
 *
 * There is no environment and no filesystem on this class of device (spec
 * §6, §7), so configuration is entirely `const`: picked at build time and
 * baked into the binary, the same way `original_source/task.h` ties
 * `MS_PER_TICK`/`COUNTS_PER_TICK` to a `#define F_CPU`.
 */

/// Tick period in milliseconds. Reference value from spec §6 / the
/// original's `MS_PER_TICK`.
pub const TICK_MS: u32 = crate::arch::TICK_MS;

/// Reference CPU clock, used only to document/derive the AVR backend's
/// timer prescaler (see `arch::avr::install_tick_timer`). Not read by the
/// portable kernel.
pub const CPU_HZ: u32 = 16_000_000;

/// Suggested per-task stack size in bytes, matching the reference
/// implementation's bump-allocated 256-byte slabs (spec §3). This crate
/// does not allocate stacks itself (spec §9: "accept a caller-provided
/// buffer per task" instead of a global bump pointer) -- this constant is
/// offered as a sizing default for callers declaring their own `static mut
/// [u8; N]` stack buffers.
pub const DEFAULT_STACK_BYTES: usize = 256;

/// Stack reserved for the scheduler itself (spec §4.3: "runs on its own
/// stack, distinct from any task stack"). Matches `arch::avr::SCHED_STACK`.
pub const SCHED_STACK_BYTES: usize = 64;
