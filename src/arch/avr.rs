/*
 * AVR backend: register save/restore, first-run stack construction, and
 * the TIMER0 compare-match tick interrupt.
 *
 * This is a direct port of the inline assembly in `pietern/avr-tasks`'
 * `task.c` (see original_source/task.c), adjusted in two ways:
 *
 * - `_task__current` (a plain C global) becomes `CURRENT_TASK_PTR`, a
 *   `#[no_mangle] static mut` holding the address of the currently running
 *   `Task`. Because `Task` is `#[repr(C)]` with `sp` as its first field,
 *   `CURRENT_TASK_PTR` doubles as the address to load/store the saved
 *   stack pointer from/into, exactly like the original's `t->sp`.
 * - The original's `task__push` branches on `_task__current == NULL` to
 *   support being invoked before any task exists. In this crate the save
 *   routine is only ever reached from `task_yield`/the tick ISR, both of
 *   which can only execute once `task_start` has dispatched the first task
 *   (global interrupts are off until the first `resume`'s `reti`), so that
 *   branch is dead code here and has been dropped.
 */

use core::arch::naked_asm;
use core::cell::UnsafeCell;

use crate::task::{Task, TaskFn};

/// Address of the currently running task, read/written only with
/// interrupts disabled. Doubles as the address of that task's saved stack
/// pointer (`Task` is `#[repr(C)]`, `sp` is its first field).
#[no_mangle]
static mut CURRENT_TASK_PTR: *mut u8 = core::ptr::null_mut();

/// Reserved stack the scheduler itself runs on (spec §4.3: "runs on its own
/// stack, distinct from any task stack").
///
/// `UnsafeCell<T>` is never `Sync` (the one type the compiler's auto-`Sync`
/// computation always excludes), so this needs the same newtype-plus-
/// manual-`Sync` treatment as the rest of the crate's process-wide statics:
/// the buffer's address is taken once, from `install_tick_timer`, before
/// interrupts are ever enabled, and after that only the hardware stack
/// pointer ever touches the bytes inside it.
#[repr(transparent)]
struct SchedStack(UnsafeCell<[u8; SCHED_STACK_SIZE]>);

// SAFETY: see the doc comment above.
unsafe impl Sync for SchedStack {}

const SCHED_STACK_SIZE: usize = 64;
static SCHED_STACK: SchedStack = SchedStack(UnsafeCell::new([0; SCHED_STACK_SIZE]));

#[no_mangle]
static mut SCHED_STACK_TOP: *mut u8 = core::ptr::null_mut();

/// TICK_MS (spec §6); OCR0A is programmed from this in `install_tick_timer`.
pub const TICK_MS: u32 = 2;

pub(crate) unsafe fn init_stack(stack: &'static mut [u8], entry: TaskFn, arg: usize) -> *mut u8 {
    // Lay out the buffer, from its high end downward, exactly as if the
    // task had just executed the save sequence below for the first time:
    // entry's address where a real return address would be, then a zeroed
    // general-register file, with `arg` sitting in the r24/r25 slots (the
    // AVR C ABI's register pair for a single 16-bit argument) so that
    // `ret`-ing into `entry`'s address hands it `arg` exactly as if it had
    // been called normally, and a status word with the interrupt-enable
    // bit (0x80) set so the task starts with interrupts on (spec §4.2).
    let mut cursor = stack.len();
    let mut push = |byte: u8| {
        cursor -= 1;
        stack[cursor] = byte;
    };

    // AVR function pointers are already word-addresses (matching what
    // `call`/`ret` push and expect), so no by-2 conversion is needed here.
    let entry_addr = entry as usize;
    push((entry_addr >> 8) as u8); // high byte pushed second (matches the live-save order below)
    push(entry_addr as u8); // low byte pushed first

    push(0); // r0 (pushed before SREG, matching the live save's "push r0; in r0,SREG; push r0" order)
    push(0x80); // SREG: I bit set
    push(0); // r30
    push(0); // r31
    push(0); // r1 (must read as zero: AVR calling convention invariant)
    for _ in 2..24 {
        push(0); // r2..r23
    }
    push(arg as u8); // r24: low byte of arg, pushed first to match resume's ascending pop order
    push((arg >> 8) as u8); // r25: high byte of arg
    for _ in 26..=29 {
        push(0); // r26..r29
    }

    stack[cursor..].as_mut_ptr()
}

pub(crate) fn install_tick_timer() {
    // SAFETY: called once, before interrupts are globally enabled, from
    // `Kernel::init`.
    unsafe {
        SCHED_STACK_TOP = (SCHED_STACK.0.get() as *mut u8).add(SCHED_STACK_SIZE);
    }

    // ATmega328P register addresses (datasheet §15: 16-bit Timer/Counter0).
    const TCCR0A: *mut u8 = 0x44 as *mut u8;
    const TCCR0B: *mut u8 = 0x45 as *mut u8;
    const OCR0A: *mut u8 = 0x47 as *mut u8;
    const TIMSK0: *mut u8 = 0x6e as *mut u8;

    const WGM01: u8 = 1 << 1; // CTC mode
    const CS02: u8 = 1 << 2; // prescaler /256 (matches F_CPU == 16 MHz in original_source/task.h)
    const OCIE0A: u8 = 1 << 1;

    // SAFETY: MMIO register addresses are fixed by the ATmega328P memory
    // map; writes are non-overlapping with any Rust-visible storage.
    unsafe {
        core::ptr::write_volatile(TCCR0A, WGM01);
        core::ptr::write_volatile(TCCR0B, CS02);
        core::ptr::write_volatile(OCR0A, (COUNTS_PER_TICK - 1) as u8);
        core::ptr::write_volatile(TIMSK0, OCIE0A);
    }
}

// COUNTS_PER_TICK = (F_CPU / 256) / (1000 / TICK_MS), F_CPU = 16_000_000
// (original_source/task.h). US_PER_COUNT is how many microseconds one
// timer tick (TCNT0 increment) represents.
const COUNTS_PER_TICK: u32 = (16_000_000 / 256) / (1000 / TICK_MS);
const US_PER_COUNT: u32 = (1000 * TICK_MS) / COUNTS_PER_TICK;

/// Sample the free-running hardware counter backing the tick timer and
/// convert it to elapsed microseconds since the last tick boundary. Used
/// by `clock::now_us` for sub-tick resolution (SPEC_FULL.md §3, matching
/// the original's `task_usec()`: `_task_usec + TCNT0 * US_PER_COUNT`).
pub(crate) fn sub_tick_us() -> u32 {
    const TCNT0: *const u8 = 0x46 as *const u8;
    // SAFETY: TCNT0 is a read-only-for-our-purposes MMIO register; a torn
    // read just yields a slightly stale count, never an invalid one.
    let counts = unsafe { core::ptr::read_volatile(TCNT0) } as u32;
    counts * US_PER_COUNT
}

pub(crate) fn wait_for_interrupt() {
    // `sei` takes effect after the following instruction, so interrupts
    // become live exactly as `sleep` executes -- no window in which a tick
    // could be missed between enabling interrupts and sleeping (spec §4.3).
    unsafe {
        core::arch::asm!("sei", "sleep", options(nomem, nostack));
    }
}

/// Save the running task's context, then tail-jump into the scheduler. The
/// shared save sequence mirrors `init_stack`'s layout exactly; it is
/// duplicated (rather than factored into a callable subroutine) in both
/// entry points below because a naked function cannot safely `call` another
/// naked function without its own stack frame to return into.
macro_rules! save_context_asm {
    () => {
        "push r0",
        "in r0, 0x3f",
        "push r0",
        "push r30",
        "push r31",
        "lds r30, {current}",
        "lds r31, {current}+1",
        "push r1",
        "push r2",
        "push r3",
        "push r4",
        "push r5",
        "push r6",
        "push r7",
        "push r8",
        "push r9",
        "push r10",
        "push r11",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "push r16",
        "push r17",
        "push r18",
        "push r19",
        "push r20",
        "push r21",
        "push r22",
        "push r23",
        "push r24",
        "push r25",
        "push r26",
        "push r27",
        "push r28",
        "push r29",
        "clr r1",
        "in r0, 0x3d",
        "st Z+, r0",
        "in r0, 0x3e",
        "st Z+, r0",
    };
}

/// Tail-jump target for both `yield_from_task` and the tick ISR: switches
/// onto the scheduler's own stack and hands off to `crate::scheduler::run`,
/// which never returns (it always ends in a `resume` into some task).
#[unsafe(naked)]
unsafe extern "C" fn scheduler_entry() -> ! {
    naked_asm!(
        "lds r30, {top}",
        "lds r31, {top}+1",
        "out 0x3d, r30",
        "out 0x3e, r31",
        "jmp {run}",
        top = sym SCHED_STACK_TOP,
        run = sym crate::scheduler::run,
    )
}

/// Voluntary yield (spec §4.3 `yield()`). Invoked by an ordinary `call`
/// from task context, so the return address already sitting on the task's
/// stack is the call site in `crate::scheduler::yield_now` -- exactly what
/// a later `resume` of this task will `ret` back into.
///
/// Declared as an ordinary (non-diverging) `extern "C"` function even
/// though its own body never executes a `ret`: see
/// `arch::switch_away_from` for why that's the correct signature for this
/// call, not a lie.
#[unsafe(naked)]
pub(crate) unsafe extern "C" fn yield_from_task(_task: &'static Task) {
    naked_asm!(
        save_context_asm!(),
        "jmp {scheduler_entry}",
        current = sym CURRENT_TASK_PTR,
        scheduler_entry = sym scheduler_entry,
    )
}

/// TIMER0 output-compare-A interrupt: the periodic tick (spec §4.4).
/// Saves the interrupted task's context exactly like a voluntary yield,
/// then runs tick bookkeeping on the interrupted task's own stack (it is
/// a small, ordinary call, not a second context switch) before tail-jumping
/// into the scheduler. Never reaches a `reti` of its own -- control returns
/// to some task only via `resume`'s branchless ret/reti (§4.2, §4.4).
#[unsafe(naked)]
pub unsafe extern "C" fn tick_isr() -> ! {
    naked_asm!(
        save_context_asm!(),
        "call {on_tick}",
        "jmp {scheduler_entry}",
        current = sym CURRENT_TASK_PTR,
        on_tick = sym crate::scheduler::on_tick,
        scheduler_entry = sym scheduler_entry,
    )
}

/// Resume `task`: restore its saved register file and return to wherever
/// it last gave up the CPU, atomically re-enabling interrupts iff they were
/// enabled at save time (spec §4.2 -- the core subtlety this kernel exists
/// to get right).
#[unsafe(naked)]
pub(crate) unsafe extern "C" fn resume(task: *const Task) -> ! {
    naked_asm!(
        // `task` arrives in r24:r25 (low:high) per the AVR C ABI for a
        // single 16-bit argument.
        "sts {current}, r24",
        "sts {current}+1, r25",
        "movw r30, r24",
        "ld r24, Z+",
        "ld r25, Z",
        "out 0x3d, r24",
        "out 0x3e, r25",
        "pop r29",
        "pop r28",
        "pop r27",
        "pop r26",
        "pop r25",
        "pop r24",
        "pop r23",
        "pop r22",
        "pop r21",
        "pop r20",
        "pop r19",
        "pop r18",
        "pop r17",
        "pop r16",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop r11",
        "pop r10",
        "pop r9",
        "pop r8",
        "pop r7",
        "pop r6",
        "pop r5",
        "pop r4",
        "pop r3",
        "pop r2",
        "pop r1",
        "pop r31",
        "pop r30",
        "pop r0",
        "sbrs r0, 7",
        "jmp {ret_only}",
        "jmp {ret_enable}",
        current = sym CURRENT_TASK_PTR,
        ret_only = sym resume_ret_only,
        ret_enable = sym resume_ret_enable,
    )
}

#[unsafe(naked)]
unsafe extern "C" fn resume_ret_only() -> ! {
    naked_asm!("out 0x3f, r0", "pop r0", "ret")
}

#[unsafe(naked)]
unsafe extern "C" fn resume_ret_enable() -> ! {
    naked_asm!(
        "clt",
        "bld r0, 7",
        "out 0x3f, r0",
        "pop r0",
        "reti",
    )
}

pub(crate) unsafe fn resume_task(task: &'static Task) -> ! {
    unsafe { resume(task as *const Task) }
}
