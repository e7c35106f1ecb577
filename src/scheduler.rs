/*
 * Scheduler: the runnable/suspended/sleeping queues, the current-task
 * pointer, the tick handler, and the suspend/wakeup primitives built on
 * top of them (spec §4.3-§4.5).
 *
 * Grounded directly on `original_source/task.c`'s `task__schedule`,
 * `task__tick`, `task__scheduler`, `task__suspend` and `task_wakeup`. The
 * split kept here mirrors the original's own split between pure queue
 * bookkeeping (portable, and what this module's tests exercise) and the
 * handful of spots that must call into `arch` to actually switch hardware
 * context (not exercised under `cargo test`, see `arch::host`).
 */

use core::cell::Cell;

use crate::arch;
use crate::clock;
use crate::queue::Queue;
use crate::task::TaskHandle;
#[cfg(test)]
use crate::task::Task;

static RUNNABLE: Queue = Queue::new();
static SUSPENDED: Queue = Queue::new();
static SLEEPING: Queue = Queue::new();

/// `Cell<T>` is never `Sync`, so the process-wide current-task pointer needs
/// the same newtype-plus-manual-`Sync` treatment as `Queue`/`Task` (see
/// `queue.rs`): mutated only from inside a critical section, which is the
/// one synchronization primitive this single-core target has.
struct CurrentCell(Cell<Option<TaskHandle>>);

// SAFETY: same rationale as `Queue`'s `Sync` impl -- `CURRENT` is read/
// written only from inside `crate::critical::with` or the ISR context that
// already has interrupts disabled.
unsafe impl Sync for CurrentCell {}

static CURRENT: CurrentCell = CurrentCell(Cell::new(None));

/// Place a freshly created task on the runnable queue (spec §6
/// `task_create`: "... place on runnable queue"). Called once, by
/// `task::task_create`.
pub(crate) fn admit(task: TaskHandle) {
    RUNNABLE.insert_tail(task);
}

/// Handle of the currently running task.
///
/// # Panics
/// Panics if called before the scheduler has dispatched any task (i.e.
/// before `task_start`/`Kernel::start`), since there is no current task
/// yet. Every kernel primitive that calls this is only reachable from task
/// context, so that can't happen in a correctly structured program.
pub fn current() -> TaskHandle {
    CURRENT.0.get().expect("task_current() called outside any task's context")
}

/// Resolve the target queue for `task_suspend(queue)`: the caller-given
/// queue, or the default system-wide suspended queue (spec §4.5, §6).
fn suspend_target(queue: Option<&'static Queue>) -> &'static Queue {
    queue.unwrap_or(&SUSPENDED)
}

/// Pure scheduling decision (spec §4.3 `schedule()`): take the runnable
/// queue's head, rotate it to the tail for round-robin fairness, and
/// return it. `None` if nothing is runnable.
fn pick_next() -> Option<TaskHandle> {
    let head = RUNNABLE.head()?;
    RUNNABLE.rotate_head_to_tail();
    Some(head)
}

/// The scheduler's own loop (spec §4.3). Runs on the scheduler's reserved
/// stack (switched to by `arch`'s tail-jump trampoline before this is
/// called), never returns, and is the only place that drives a real
/// hardware context switch via `arch::resume_task`.
///
/// Not exercised by `cargo test` -- see `arch::host`'s module docs.
pub fn run() -> ! {
    loop {
        match pick_next() {
            Some(task) => {
                CURRENT.0.set(Some(task));
                // SAFETY: `task` came straight off the runnable queue, so
                // it owns a valid first-run or previously-saved context.
                unsafe { arch::resume_task(task) }
            }
            None => {
                CURRENT.0.set(None);
                log::debug!("scheduler idle: no runnable task");
                arch::wait_for_interrupt();
            }
        }
    }
}

/// Tick handler body (spec §4.4), invoked from the timer ISR with the
/// interrupted task's context already saved. Advances the clock, then
/// walks the sleeping queue promoting expired sleepers to runnable.
///
/// Pure queue/clock bookkeeping -- no `arch` calls -- so this is fully
/// exercised by host tests even though the real ISR entry point
/// (`arch::avr::tick_isr`) is not.
pub(crate) fn on_tick() {
    clock::advance_tick();

    // `for_each` snapshots each node's successor before running the
    // closure (spec §4.1), so unlinking the current node here to promote
    // it is safe mid-iteration.
    SLEEPING.for_each(|task| {
        if task.tick_sleep() {
            Queue::remove(task);
            RUNNABLE.insert_tail(task);
        }
    });
}

/// `task_yield()` (spec §4.3, §6): move the current task to the runnable
/// queue's tail and switch to the scheduler.
pub fn yield_now() {
    crate::critical::with(|| {
        let task = current();
        Queue::remove(task);
        RUNNABLE.insert_tail(task);
        // SAFETY: `task` is the current task, already moved off any other
        // queue onto the runnable queue's tail.
        unsafe { arch::switch_away_from(task) };
    });
}

/// `task_sleep(ms)` (spec §4.4, §6): block the current task for at least
/// `ms` milliseconds, rounded *up* to the next whole tick so the "resumes
/// no earlier than `ms` ms later" lower bound (spec §8) holds even for
/// values that aren't an exact multiple of `TICK_MS` -- the original's
/// `ms / MS_PER_TICK` floors instead, which can undershoot by up to one
/// tick; see DESIGN.md for this resolved discrepancy. `sleep(0)` is
/// `yield` (spec §4.4).
pub fn sleep(ms: u32) {
    if ms == 0 {
        yield_now();
        return;
    }

    let ticks = ms.div_ceil(crate::config::TICK_MS).min(u16::MAX as u32) as u16;

    crate::critical::with(|| {
        let task = current();
        task.set_sleep_ticks(ticks);
        Queue::remove(task);
        SLEEPING.insert_tail(task);
        // SAFETY: as in `yield_now`.
        unsafe { arch::switch_away_from(task) };
    });
}

/// `task_suspend(queue)` (spec §4.5, §6): move the current task onto
/// `queue` (or the default suspended queue) and switch to the scheduler.
/// The caller is responsible for arranging, before calling this, that
/// some other actor will eventually call `wakeup` on this exact task --
/// see `task::task_suspend`'s module-doc example.
pub fn suspend(queue: Option<&'static Queue>) {
    crate::critical::with(|| {
        let task = current();
        Queue::remove(task);
        suspend_target(queue).insert_tail(task);
        // SAFETY: as in `yield_now`.
        unsafe { arch::switch_away_from(task) };
    });
}

/// `task_wakeup(task)` (spec §4.5, §6): move `task` from whatever queue it
/// is currently linked into onto the runnable queue. Safe to call from an
/// ISR or from task context. A no-op in effect if `task` is already
/// runnable (spec §8 "idempotent wakeup").
pub fn wakeup(task: TaskHandle) {
    crate::critical::with(|| {
        Queue::remove(task);
        RUNNABLE.insert_tail(task);
    });
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::boxed::Box;

    fn leak(t: Task) -> &'static Task {
        Box::leak(Box::new(t))
    }

    // `RUNNABLE`/`SUSPENDED`/`SLEEPING`/`CURRENT` are process-wide statics
    // (spec §5), so every test that touches them runs its whole body
    // inside `crate::critical::with` -- the same mutual-exclusion
    // primitive the kernel itself relies on, backed on the host by
    // `critical_section`'s `std` feature, so concurrent `cargo test`
    // threads can't interleave raw queue mutations with each other.
    fn reset() {
        while let Some(t) = RUNNABLE.pop_head() {
            let _ = t;
        }
        while let Some(t) = SUSPENDED.pop_head() {
            let _ = t;
        }
        while let Some(t) = SLEEPING.pop_head() {
            let _ = t;
        }
        CURRENT.0.set(None);
    }

    #[test]
    fn pick_next_rotates_runnable_round_robin() {
        crate::critical::with(|| {
            reset();
            let a = leak(Task::new_for_test(1));
            let b = leak(Task::new_for_test(2));
            admit(a);
            admit(b);

            assert_eq!(pick_next().unwrap().test_id(), 1);
            assert_eq!(pick_next().unwrap().test_id(), 2);
            assert_eq!(pick_next().unwrap().test_id(), 1);
        });
    }

    #[test]
    fn pick_next_none_when_runnable_empty() {
        crate::critical::with(|| {
            reset();
            assert!(pick_next().is_none());
        });
    }

    #[test]
    fn on_tick_promotes_expired_sleepers_to_runnable() {
        crate::critical::with(|| {
            reset();
            let a = leak(Task::new_for_test(1));
            let b = leak(Task::new_for_test(2));
            a.set_sleep_ticks(1);
            b.set_sleep_ticks(2);
            SLEEPING.insert_tail(a);
            SLEEPING.insert_tail(b);

            on_tick();
            assert_eq!(RUNNABLE.head().unwrap().test_id(), 1);
            assert!(!SLEEPING.is_empty());

            on_tick();
            assert_eq!(RUNNABLE.pop_head().unwrap().test_id(), 1);
            assert_eq!(RUNNABLE.pop_head().unwrap().test_id(), 2);
            assert!(SLEEPING.is_empty());
        });
    }

    #[test]
    fn wakeup_moves_task_from_suspended_to_runnable() {
        crate::critical::with(|| {
            reset();
            let a = leak(Task::new_for_test(1));
            SUSPENDED.insert_tail(a);

            wakeup(a);

            assert!(SUSPENDED.is_empty());
            assert_eq!(RUNNABLE.pop_head().unwrap().test_id(), 1);
        });
    }

    #[test]
    fn wakeup_on_already_runnable_task_is_idempotent() {
        crate::critical::with(|| {
            reset();
            let a = leak(Task::new_for_test(1));
            let b = leak(Task::new_for_test(2));
            admit(a);
            admit(b);

            wakeup(a);

            // `a` just moves to the runnable tail again; queue stays
            // consistent and every task is still linked exactly once
            // (spec §8).
            assert_eq!(RUNNABLE.pop_head().unwrap().test_id(), 2);
            assert_eq!(RUNNABLE.pop_head().unwrap().test_id(), 1);
            assert!(RUNNABLE.is_empty());
        });
    }

    #[test]
    fn clock_advances_by_tick_width_each_tick() {
        crate::critical::with(|| {
            reset();
            let before = clock::now_ms();
            on_tick();
            assert_eq!(clock::now_ms(), before + crate::config::TICK_MS);
        });
    }
}
