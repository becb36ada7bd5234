//! Scheduler: глобальный экземпляр и x86_64 `Platform`
//! Scheduler: the global instance and the x86_64 `Platform`
//!
//! Вся логика в `libblip`; здесь только железо:
//! All the logic lives in `libblip`; this module only supplies hardware:
//!   маска / mask   cli/sti с восстановлением IF / cli/sti restoring IF
//!   EOI            8259, IRQ0
//!   resume         `context::resume_frame`, не возвращается / never returns
//!
//! Слот 0 это сам `kernel_main`: после `sti` он становится idle-циклом на
//! загрузочном стеке, поэтому пулу нужно на один стек меньше, чем слотов.
//! Slot 0 is `kernel_main` itself: after `sti` it becomes the idle loop on the
//! boot stack, so the pool needs one stack fewer than there are slots.

pub mod tasks;

use core::convert::Infallible;

use libblip::config::{MAX_TASKS, STACK_WORDS, TICK_PERIOD_MS};
use libblip::frame::MIN_STACK_WORDS;
use libblip::sched::{inspect, preempt};
use libblip::{EntryPoint, Platform, Scheduler, StackPool, StateHandle, TaskAbi, TaskId};
use log::{info, warn};
use spin::Mutex;

use crate::arch::current::context::{resume_frame, task_return_trampoline};
use crate::arch::current::gdt::{KERNEL_CODE, KERNEL_DATA};
use crate::arch::current::{self as cpu, pic};

const ABI: TaskAbi = TaskAbi::kernel(KERNEL_CODE, KERNEL_DATA, task_return_trampoline);

const _: () = assert!(STACK_WORDS >= MIN_STACK_WORDS);

static SCHED: Mutex<Scheduler> = Mutex::new(Scheduler::new(ABI));

/// Стеки задач 1..MAX_TASKS, вне замка / Stacks of tasks 1..MAX_TASKS, outside the lock
static STACKS: StackPool<{ MAX_TASKS - 1 }, STACK_WORDS> = StackPool::new();

// ── Platform ──────────────────────────────────────────────────────────────────

struct Hw;

impl Platform for Hw {
    type Resumed = Infallible;

    fn without_interrupts<R>(&mut self, f: impl FnOnce() -> R) -> R {
        cpu::without_interrupts(f)
    }

    fn end_of_interrupt(&mut self) {
        pic::end_of_interrupt(pic::IRQ_TIMER);
    }

    fn resume(&mut self, handle: StateHandle) -> Infallible {
        // Кадр записан либо trap stub'ом, либо build_initial_frame.
        // The frame was written either by the trap stub or by build_initial_frame.
        unsafe { resume_frame(handle.as_u64()) }
    }
}

// ── Точки входа / Entry points ────────────────────────────────────────────────

/// Вызывается из `isr_timer` с адресом только что сохранённого кадра.
/// Called from `isr_timer` with the address of the frame it just saved.
pub(crate) extern "C" fn timer_entry(handle: u64) -> ! {
    match preempt(&SCHED, &mut Hw, StateHandle(handle)) {}
}

/// Точка входа задачи вернулась: задача паркуется, слот остаётся в ротации.
/// A task's entry point returned: the task parks, its slot stays in rotation.
pub(crate) extern "C" fn task_exited() -> ! {
    let (id, entry) = inspect(&SCHED, &mut Hw, |s| {
        let id = s.current();
        (id, s.table().get(id).ok().and_then(|r| r.entry()))
    });
    match entry {
        Some(entry) => warn!("{} returned from its entry point {:#x}, parking it", id, entry as usize),
        None => warn!("{} returned from its entry point, parking it", id),
    }
    loop {
        cpu::halt();
    }
}

// ── API ядра / Kernel API ─────────────────────────────────────────────────────

pub fn init() {
    let (capacity, running) = inspect(&SCHED, &mut Hw, |s| (s.table().capacity(), s.current()));
    info!(
        "round-robin: {} slots, {} stacks x {} words, tick {} ms, {} is the boot task",
        capacity, STACKS.available(), STACKS.stack_words(), TICK_PERIOD_MS, running
    );
    debug_assert_eq!(capacity, MAX_TASKS);
}

/// Создать задачу ядра / Create a kernel task
pub fn spawn(entry: EntryPoint) -> libblip::Result<TaskId> {
    libblip::sched::spawn(&SCHED, &STACKS, &mut Hw, entry)
}

pub fn current() -> TaskId {
    inspect(&SCHED, &mut Hw, |s| s.current())
}

/// Тиков с момента запуска таймера / Ticks since the timer started
pub fn ticks() -> u64 {
    inspect(&SCHED, &mut Hw, |s| s.ticks())
}

/// Задача 0 после запуска: спать до следующего тика.
/// Task 0 once running: sleep until the next tick.
pub fn idle() -> ! {
    loop {
        cpu::halt();
    }
}
