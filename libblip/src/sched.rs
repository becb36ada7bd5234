//! Scheduler: таблица задач + текущая задача + точка вытеснения
//! Scheduler: task table + current task + preemption entry point
//!
//! Один тик таймера = один вызов `preempt`:
//! One timer tick = one `preempt` call:
//!
//! ```text
//!   capture  table[current].handle = interrupted
//!   select   next = select_next(table, current)
//!   commit   current = next
//!   ack      platform.end_of_interrupt()      ровно один раз / exactly once
//!   resume   platform.resume(table[next].handle)
//! ```
//!
//! Стеки задач в `Scheduler` не входят: они в `StackPool`, и записи знают
//! только их адреса. Задача, бегущая на своём стеке, не пересекается ни с
//! какой ссылкой на планировщик.
//! Task stacks are not part of the `Scheduler`: they sit in a `StackPool` and
//! records know only their addresses. A task running on its stack never
//! overlaps any reference to the scheduler.
//!
//! Таблица изменяется либо здесь (прерывания уже запрещены), либо под
//! `Platform::without_interrupts`. Других блокировок не нужно: ядро одно.
//! The table is mutated either here (interrupts already off) or under
//! `Platform::without_interrupts`. No finer lock is needed on a single core.

use log::{error, info, warn};
use spin::Mutex;

use crate::config::MAX_TASKS;
use crate::frame::TaskAbi;
use crate::select::select_next;
use crate::stack::StackPool;
use crate::table::TaskTable;
use crate::task::{EntryPoint, StateHandle, TaskId, TaskState};
use crate::{Error, Result};

/// Всё, что планировщику нужно от железа.
/// Everything the scheduler needs from the hardware.
pub trait Platform {
    /// Что возвращает `resume`: `Infallible` на железе (возврата нет),
    /// записанный handle в тестах.
    /// What `resume` yields: `Infallible` on hardware (it never returns),
    /// the recorded handle in tests.
    type Resumed;

    /// Выполнить `f` с замаскированным прерыванием таймера.
    /// Run `f` with the timer interrupt masked.
    fn without_interrupts<R>(&mut self, f: impl FnOnce() -> R) -> R;

    /// End-of-interrupt для источника таймера / EOI to the timer's interrupt source
    fn end_of_interrupt(&mut self);

    /// Передать управление задаче, чей кадр лежит по `handle`.
    /// Transfer control to the task whose frame `handle` points at.
    fn resume(&mut self, handle: StateHandle) -> Self::Resumed;
}

pub struct Scheduler<const N: usize = MAX_TASKS> {
    table:   TaskTable<N>,
    current: TaskId,
    abi:     TaskAbi,
    ticks:   u64,
}

impl<const N: usize> Scheduler<N> {
    /// Таблица загрузки, текущая задача: слот 0 (код, который нас создал).
    /// Boot table; the current task is slot 0 (the code constructing us).
    pub const fn new(abi: TaskAbi) -> Self {
        Self {
            table: TaskTable::new(),
            current: TaskId::IDLE,
            abi,
            ticks: 0,
        }
    }

    pub fn current(&self) -> TaskId {
        self.current
    }

    pub fn table(&self) -> &TaskTable<N> {
        &self.table
    }

    pub fn abi(&self) -> &TaskAbi {
        &self.abi
    }

    /// Тиков, обработанных с загрузки / Ticks handled since boot
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Создать задачу. Вызывать только с замаскированными прерываниями:
    /// иначе вытеснение увидит наполовину собранную запись.
    /// Create a task. Call only with interrupts masked, otherwise preemption
    /// could observe a half-built record.
    pub fn create_task<const P: usize, const W: usize>(
        &mut self,
        entry: EntryPoint,
        stacks: &StackPool<P, W>,
    ) -> Result<TaskId> {
        let abi = self.abi;
        self.table.create_task(entry, &abi, stacks)
    }

    /// Capture → select → commit. Возвращает кадр, который надо возобновить.
    /// Capture → select → commit. Returns the frame to resume.
    ///
    /// Любая ошибка здесь фатальна для вызывающего.
    /// Any error here is fatal to the caller.
    pub fn switch(&mut self, interrupted: StateHandle) -> Result<StateHandle> {
        let previous = self.current;
        self.table.get_mut(previous)?.capture(interrupted);

        let next = select_next(&self.table, previous)?;
        let handle = self
            .table
            .get(next)?
            .state_handle()
            .ok_or(Error::InvariantViolation("selected task has no saved frame"))?;

        if self.table.state(previous)? == TaskState::Running {
            self.table.mark_ready(previous);
        }
        self.table.mark_running(next);
        self.current = next;
        self.ticks = self.ticks.wrapping_add(1);

        Ok(handle)
    }
}

/// Точка вытеснения: вызывается trap stub'ом таймера раз в период.
/// Preemption entry point: called by the timer trap stub once per period.
///
/// Блокировка отпускается до EOI и resume: resume не возвращается, и guard
/// иначе не был бы освобождён никогда.
/// The lock is released before EOI and resume: resume does not return, and
/// the guard would otherwise never be dropped.
///
/// # Panics
/// При любой несогласованности таблицы и если блокировка уже занята (кто-то
/// трогал таблицу без маски прерываний).
/// On any table inconsistency, and if the lock is already held (someone
/// touched the table without masking interrupts).
pub fn preempt<P: Platform, const N: usize>(
    sched: &Mutex<Scheduler<N>>,
    platform: &mut P,
    interrupted: StateHandle,
) -> P::Resumed {
    let next = {
        let Some(mut guard) = sched.try_lock() else {
            panic!("scheduler lock held at preemption: table touched with interrupts enabled");
        };
        match guard.switch(interrupted) {
            Ok(handle) => handle,
            Err(err) => panic!("preemption aborted: {}", err),
        }
    };

    platform.end_of_interrupt();
    platform.resume(next)
}

/// Создать задачу под маской прерываний и сообщить результат.
/// Create a task under the interrupt mask and report the outcome.
///
/// Лог пишется после снятия маски: в маске логировать нельзя.
/// Logging happens after unmasking; nothing logs while masked.
pub fn spawn<P: Platform, const N: usize, const S: usize, const W: usize>(
    sched: &Mutex<Scheduler<N>>,
    stacks: &StackPool<S, W>,
    platform: &mut P,
    entry: EntryPoint,
) -> Result<TaskId> {
    let result = platform.without_interrupts(|| sched.lock().create_task(entry, stacks));

    match &result {
        Ok(id) => info!("new task {} created and scheduled", id),
        Err(Error::TableFull) => warn!("task table full ({} slots), task not created", N),
        Err(Error::OutOfStacks) => warn!("all {} task stacks in use, task not created", S),
        Err(err) => error!("task rejected: {}", err),
    }
    result
}

/// Прочитать состояние планировщика под маской прерываний.
/// Read scheduler state under the interrupt mask.
pub fn inspect<P: Platform, R, const N: usize>(
    sched: &Mutex<Scheduler<N>>,
    platform: &mut P,
    f: impl FnOnce(&Scheduler<N>) -> R,
) -> R {
    platform.without_interrupts(|| f(&sched.lock()))
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn entry() {}

    extern "C" fn trap() -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    const ABI: TaskAbi = TaskAbi::kernel(0x08, 0x10, trap);

    /// Платформа, которая не должна дожить до EOI.
    /// A platform that must never get as far as the EOI.
    #[derive(Default)]
    struct Strict {
        eois: usize,
        resumes: usize,
    }

    impl Platform for Strict {
        type Resumed = ();

        fn without_interrupts<R>(&mut self, f: impl FnOnce() -> R) -> R {
            f()
        }

        fn end_of_interrupt(&mut self) {
            self.eois += 1;
            panic!("end of interrupt sent for an aborted switch");
        }

        fn resume(&mut self, _handle: StateHandle) {
            self.resumes += 1;
            panic!("resumed after an aborted switch");
        }
    }

    #[test]
    fn first_switch_captures_idle_and_runs_created_task() {
        let stacks = StackPool::<3, 64>::new();
        let mut sched = Scheduler::<4>::new(ABI);
        let id = sched.create_task(entry, &stacks).unwrap();
        let boot = sched.table().get(id).unwrap().state_handle().unwrap();

        let resumed = sched.switch(StateHandle(0xAAAA0)).unwrap();

        assert_eq!(resumed, boot);
        assert_eq!(sched.current(), id);
        assert_eq!(sched.table().state(id), Ok(TaskState::Running));
        assert_eq!(
            sched.table().get(TaskId(0)).unwrap().state_handle(),
            Some(StateHandle(0xAAAA0))
        );
        assert_eq!(sched.ticks(), 1);
    }

    #[test]
    fn exactly_one_task_running_after_each_switch() {
        let stacks = StackPool::<3, 64>::new();
        let mut sched = Scheduler::<4>::new(ABI);
        sched.create_task(entry, &stacks).unwrap();
        sched.create_task(entry, &stacks).unwrap();

        for tick in 0..10u64 {
            sched.switch(StateHandle(0x1000 + tick * 0x10)).unwrap();
            let running = sched
                .table()
                .iter()
                .filter(|(_, r)| r.state() == TaskState::Running)
                .count();
            assert_eq!(running, 1);
        }
    }

    #[test]
    fn idle_alone_resumes_its_own_capture() {
        let mut sched = Scheduler::<2>::new(ABI);
        assert_eq!(sched.switch(StateHandle(0x5550)), Ok(StateHandle(0x5550)));
        assert_eq!(sched.current(), TaskId(0));
    }

    #[test]
    fn eligible_slot_without_frame_is_fatal() {
        let mut sched = Scheduler::<2>::new(ABI);
        sched.table.mark_ready(TaskId(1));
        let err = sched.switch(StateHandle(0x10)).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
    }

    #[test]
    #[should_panic(expected = "preemption aborted")]
    fn corrupt_table_aborts_preemption_before_acknowledging() {
        let sched: Mutex<Scheduler<2>> = Mutex::new(Scheduler::new(ABI));
        // Слот 1 выбираем, но кадра у него нет / Slot 1 is eligible but has no frame
        sched.lock().table.mark_ready(TaskId(1));
        let mut hw = Strict::default();
        preempt(&sched, &mut hw, StateHandle(0x10));
    }

    #[test]
    fn aborted_preemption_sends_nothing_to_the_platform() {
        let sched: Mutex<Scheduler<2>> = Mutex::new(Scheduler::new(ABI));
        sched.lock().table.mark_ready(TaskId(1));
        let mut hw = Strict::default();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            preempt(&sched, &mut hw, StateHandle(0x10));
        }));

        assert!(outcome.is_err());
        assert_eq!((hw.eois, hw.resumes), (0, 0));
        // Замок отпущен при раскрутке / The lock was released during unwinding
        assert!(sched.try_lock().is_some());
    }

    #[test]
    fn create_task_uses_scheduler_abi() {
        let stacks = StackPool::<1, 64>::new();
        let mut sched = Scheduler::<2>::new(ABI);
        let mut lease = stacks.lease().unwrap();
        let handle =
            crate::frame::build_initial_frame(lease.as_mut_slice(), entry, sched.abi()).unwrap();
        let frame = crate::frame::SwitchFrame::read_from(lease.as_slice(), handle).unwrap();
        assert_eq!(frame.iret.cs, u64::from(sched.abi().code_selector));
        drop(lease);

        let id = sched.create_task(entry, &stacks).unwrap();
        assert_eq!(sched.table().get(id).unwrap().state_handle(), Some(handle));
    }
}
