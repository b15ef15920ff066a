//! Round-robin kernel-thread scheduler.
//!
//! Tasks are kernel threads sharing the kernel's own page tables — there is
//! no per-task address space, and so no TLB invalidation on switch. The
//! task table is a fixed-size array rather than a growable collection;
//! `proc_count` is the high-water mark of tasks ever created and never
//! shrinks (task destruction is not yet implemented — see the open item
//! this leaves for process teardown).

use crate::memory::heap;
use crate::sync::spinlock::SpinLock;

/// Maximum number of tasks the scheduler can hold.
pub const MAX_TASKS: usize = 100;

/// Size of the kernel stack allocated for each task created via `create_proc`.
const TASK_STACK_SIZE: usize = 4096;

/// Scheduling state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Eligible to be picked by `schedule()`.
    Ready,
    /// Currently executing on the CPU.
    Running,
    /// Task 0 only: nothing else is ready to run.
    Idle,
}

/// One entry in the task table.
///
/// `entry` is an implementation detail beyond the four fields the task
/// table is defined over: the trampoline every new task's stack is seeded
/// with needs some way to find out what function it's supposed to call,
/// and it can't receive that as an argument across a bare `ret`.
#[derive(Clone, Copy)]
struct Task {
    saved_stack_pointer: u64,
    pid: u64,
    state: TaskState,
    stack_base: u64,
    entry: Option<fn()>,
}

impl Task {
    const EMPTY: Task = Task {
        saved_stack_pointer: 0,
        pid: 0,
        state: TaskState::Idle,
        stack_base: 0,
        entry: None,
    };
}

struct Scheduler {
    tasks: [Task; MAX_TASKS],
    proc_count: usize,
    current: usize,
}

impl Scheduler {
    const fn new() -> Self {
        Self {
            tasks: [Task::EMPTY; MAX_TASKS],
            proc_count: 0,
            current: 0,
        }
    }
}

static SCHEDULER: SpinLock<Scheduler> = SpinLock::new(Scheduler::new());

core::arch::global_asm!(
    ".global context_switch_asm",
    "context_switch_asm:",
    // rdi = &mut old_task.saved_stack_pointer
    // rsi = new_task.saved_stack_pointer
    "push rbp",
    "push rbx",
    "push r12",
    "push r13",
    "push r14",
    "push r15",
    "mov [rdi], rsp",
    "mov rsp, rsi",
    "pop r15",
    "pop r14",
    "pop r13",
    "pop r12",
    "pop rbx",
    "pop rbp",
    "ret",
);

extern "C" {
    /// Saves callee-saved registers on the old stack, writes `rsp` to
    /// `*old_rsp_ptr`, loads `new_rsp`, restores registers, and `ret`s
    /// into the new task's saved `rip`.
    fn context_switch_asm(old_rsp_ptr: *mut u64, new_rsp: u64);
}

/// Initializes the scheduler with task 0 as the idle task: state
/// `Running`, no heap-allocated stack (it's whatever kernel stack is
/// already executing when this runs), `pid = 0`.
///
/// Must be called exactly once, after the heap is initialized and before
/// any `create_proc` call or the first timer tick.
pub fn sched_init() {
    let mut sched = SCHEDULER.lock();
    sched.tasks[0] = Task {
        saved_stack_pointer: 0,
        pid: 0,
        state: TaskState::Running,
        stack_base: 0,
        entry: None,
    };
    sched.proc_count = 1;
    sched.current = 0;
}

/// Creates a new ready task running `entry`.
///
/// Allocates a 4 KiB kernel stack via `kmalloc` and seeds it so that the
/// first `context_switch_asm` into this task `ret`s into `task_trampoline`,
/// which in turn calls `entry`.
///
/// Returns the new task's pid, or `None` if the task table is full or the
/// stack allocation fails.
pub fn create_proc(entry: fn()) -> Option<u64> {
    let mut sched = SCHEDULER.lock();
    if sched.proc_count >= MAX_TASKS {
        return None;
    }

    let stack = heap::kmalloc(TASK_STACK_SIZE);
    if stack.is_null() {
        return None;
    }
    let stack_base = stack as u64;
    let top = stack_base + TASK_STACK_SIZE as u64;

    // Seed the stack to match context_switch_asm's pop order:
    // r15, r14, r13, r12, rbx, rbp, then the ret address (rip).
    let sp = top - 7 * 8;
    unsafe {
        let words = sp as *mut u64;
        words.add(0).write(0); // r15
        words.add(1).write(0); // r14
        words.add(2).write(0); // r13
        words.add(3).write(0); // r12
        words.add(4).write(0); // rbx
        words.add(5).write(0); // rbp
        words.add(6).write(task_trampoline as u64); // rip
    }

    let idx = sched.proc_count;
    let pid = idx as u64;
    sched.tasks[idx] = Task {
        saved_stack_pointer: sp,
        pid,
        state: TaskState::Ready,
        stack_base,
        entry: Some(entry),
    };
    sched.proc_count += 1;
    Some(pid)
}

/// Landing pad for a task's first `ret` out of `context_switch_asm`.
/// Reads its own entry point out of the task table (it has no other way
/// to receive it, having arrived here via a bare `ret`) and calls it.
///
/// The switch that lands here always runs from inside the timer IRQ
/// handler, entered through an interrupt gate with IF=0, and
/// `context_switch_asm` saves/restores no rflags word — so a brand new
/// task starts with interrupts disabled. Re-enable them before calling
/// `entry`: otherwise this task never takes another timer tick (no
/// further `schedule()` calls, starving every other task) and any
/// blocking device read inside `entry` that waits on an IRQ (e.g. the
/// keyboard ring buffer) hangs forever.
///
/// If `entry` ever returns, the task has no well-defined way to exit
/// (task teardown isn't implemented yet), so it parks itself forever
/// rather than returning into an undefined stack frame.
extern "C" fn task_trampoline() -> ! {
    let entry = {
        let sched = SCHEDULER.lock();
        sched.tasks[sched.current].entry
    };
    crate::arch::cpu::enable_interrupts();
    if let Some(f) = entry {
        f();
    }
    loop {
        unsafe { core::arch::asm!("hlt", options(nomem, nostack)) };
    }
}

/// Picks the next task to run, starting the search after `current` and
/// wrapping modulo `proc_count`. Falls back to task 0 (idle) if nothing
/// else is `Ready`, and returns `None` if `current` is already the only
/// runnable task (idle with nothing else ready).
///
/// Pulled out as a pure function so the round-robin policy itself — the
/// part that's actually interesting to get right — can be tested on the
/// host without an assembly context switch.
fn pick_next(current: usize, proc_count: usize, states: &[TaskState]) -> Option<usize> {
    for step in 1..proc_count {
        let candidate = (current + step) % proc_count;
        if states[candidate] == TaskState::Ready {
            return Some(candidate);
        }
    }
    if current != 0 {
        Some(0)
    } else {
        None
    }
}

/// Called from the timer IRQ path. Finds the next `Ready` task (or falls
/// back to the idle task) and performs the context switch.
///
/// # Safety
/// Must be called with interrupts disabled, or from interrupt context.
pub unsafe fn schedule() {
    let (old_ptr, new_rsp) = {
        let mut sched = SCHEDULER.lock();
        if sched.proc_count <= 1 {
            return;
        }

        let current = sched.current;
        let states: [TaskState; MAX_TASKS] =
            core::array::from_fn(|i| sched.tasks[i].state);
        let next = match pick_next(current, sched.proc_count, &states) {
            Some(n) => n,
            None => return,
        };
        if next == current {
            return;
        }

        sched.tasks[current].state = if current == 0 {
            TaskState::Idle
        } else {
            TaskState::Ready
        };
        sched.tasks[next].state = TaskState::Running;
        sched.current = next;

        let old_ptr = &mut sched.tasks[current].saved_stack_pointer as *mut u64;
        let new_rsp = sched.tasks[next].saved_stack_pointer;
        (old_ptr, new_rsp)
    };

    unsafe {
        context_switch_asm(old_ptr, new_rsp);
    }
}

/// Returns the pid of the currently running task.
pub fn current_pid() -> u64 {
    let sched = SCHEDULER.lock();
    sched.tasks[sched.current].pid
}

/// Returns the number of tasks ever created (the table's high-water mark).
pub fn task_count() -> usize {
    SCHEDULER.lock().proc_count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_visits_every_ready_task() {
        let mut states = [TaskState::Idle; MAX_TASKS];
        states[0] = TaskState::Running;
        states[1] = TaskState::Ready;
        states[2] = TaskState::Ready;
        states[3] = TaskState::Ready;

        let mut visited = alloc::vec::Vec::new();
        let mut current = 0;
        for _ in 0..3 {
            let next = pick_next(current, 4, &states).unwrap();
            visited.push(next);
            current = next;
        }
        assert_eq!(visited, alloc::vec![1, 2, 3]);
    }

    #[test]
    fn falls_back_to_idle_task_when_nothing_ready() {
        let mut states = [TaskState::Idle; MAX_TASKS];
        states[0] = TaskState::Running;
        states[1] = TaskState::Idle;

        assert_eq!(pick_next(0, 2, &states), None);

        states[0] = TaskState::Ready;
        // current=1 (some non-idle task running), nothing else ready.
        let mut states2 = [TaskState::Idle; MAX_TASKS];
        states2[0] = TaskState::Idle;
        states2[1] = TaskState::Running;
        assert_eq!(pick_next(1, 2, &states2), Some(0));
    }

    #[test]
    fn skips_non_ready_tasks() {
        let mut states = [TaskState::Idle; MAX_TASKS];
        states[0] = TaskState::Running;
        states[1] = TaskState::Idle;
        states[2] = TaskState::Ready;
        assert_eq!(pick_next(0, 3, &states), Some(2));
    }
}
