//! Вытеснение целиком через `Platform`-заглушку.
//! End-to-end preemption through a stand-in `Platform`.

use libblip::sched::{inspect, preempt, spawn};
use libblip::{select_next, Error, Platform, Scheduler, StackPool, StateHandle, TaskAbi, TaskId, TaskState};
use spin::Mutex;

extern "C" fn task_a() {}
extern "C" fn task_b() {}

extern "C" fn trap() -> ! {
    loop {
        core::hint::spin_loop();
    }
}

const ABI: TaskAbi = TaskAbi::kernel(0x08, 0x10, trap);

/// Детерминированная замена железа: вместо переключения запоминает handle.
/// Deterministic hardware stand-in: records the handle instead of switching.
#[derive(Default)]
struct Recorder {
    masked: bool,
    masks: usize,
    eois: usize,
    resumed: Vec<StateHandle>,
}

impl Platform for Recorder {
    type Resumed = StateHandle;

    fn without_interrupts<R>(&mut self, f: impl FnOnce() -> R) -> R {
        assert!(!self.masked, "interrupt mask must not nest");
        self.masked = true;
        self.masks += 1;
        let r = f();
        self.masked = false;
        r
    }

    fn end_of_interrupt(&mut self) {
        self.eois += 1;
    }

    fn resume(&mut self, handle: StateHandle) -> StateHandle {
        self.resumed.push(handle);
        handle
    }
}

fn boot_handle(sched: &Mutex<Scheduler<4>>, id: TaskId) -> StateHandle {
    sched.lock().table().get(id).unwrap().state_handle().unwrap()
}

#[test]
fn two_tasks_on_four_slots_select_one_two_zero() {
    let sched: Mutex<Scheduler<4>> = Mutex::new(Scheduler::new(ABI));
    let stacks = StackPool::<3, 128>::new();
    let mut hw = Recorder::default();

    let t1 = spawn(&sched, &stacks, &mut hw, task_a).unwrap();
    let t2 = spawn(&sched, &stacks, &mut hw, task_b).unwrap();
    assert_eq!((t1, t2), (TaskId(1), TaskId(2)));

    let guard = sched.lock();
    assert_eq!(guard.table().state(t1), Ok(TaskState::Ready));
    assert_eq!(guard.table().state(t2), Ok(TaskState::Ready));

    let mut current = TaskId(0);
    let mut order = Vec::new();
    for _ in 0..3 {
        current = select_next(guard.table(), current).unwrap();
        order.push(current);
    }
    assert_eq!(order, [TaskId(1), TaskId(2), TaskId(0)]);
}

#[test]
fn captured_handle_is_resumed_on_next_visit() {
    let sched: Mutex<Scheduler<4>> = Mutex::new(Scheduler::new(ABI));
    let stacks = StackPool::<3, 128>::new();
    let mut hw = Recorder::default();
    let t1 = spawn(&sched, &stacks, &mut hw, task_a).unwrap();
    let t2 = spawn(&sched, &stacks, &mut hw, task_b).unwrap();
    let boot1 = boot_handle(&sched, t1);
    let boot2 = boot_handle(&sched, t2);

    // Задачи «бегут» и прерываются с новыми адресами кадров.
    // Tasks "run" and get interrupted with fresh frame addresses.
    let idle_frame = StateHandle(0x7000_0000);
    let t1_frame = StateHandle(0x7100_0000);
    let t2_frame = StateHandle(0x7200_0000);
    let idle_frame_2 = StateHandle(0x7000_0100);

    assert_eq!(preempt(&sched, &mut hw, idle_frame), boot1);
    assert_eq!(preempt(&sched, &mut hw, t1_frame), boot2);
    assert_eq!(preempt(&sched, &mut hw, t2_frame), idle_frame);
    assert_eq!(preempt(&sched, &mut hw, idle_frame_2), t1_frame);
    assert_eq!(preempt(&sched, &mut hw, StateHandle(0x7100_0200)), t2_frame);
    assert_eq!(preempt(&sched, &mut hw, StateHandle(0x7200_0300)), idle_frame_2);

    assert_eq!(hw.resumed.len(), 6);
    assert_eq!(inspect(&sched, &mut hw, |s| s.ticks()), 6);
}

#[test]
fn every_invocation_acknowledges_once_and_never_masks() {
    let sched: Mutex<Scheduler<4>> = Mutex::new(Scheduler::new(ABI));
    let stacks = StackPool::<3, 128>::new();
    let mut hw = Recorder::default();
    spawn(&sched, &stacks, &mut hw, task_a).unwrap();
    let masks_after_spawn = hw.masks;

    for n in 1..=9u64 {
        preempt(&sched, &mut hw, StateHandle(n * 0x100));
        assert_eq!(hw.eois, n as usize);
        assert_eq!(hw.resumed.len(), n as usize);
    }
    assert_eq!(hw.masks, masks_after_spawn);
}

#[test]
fn spawn_masks_once_per_call_and_reports_table_full() {
    let sched: Mutex<Scheduler<4>> = Mutex::new(Scheduler::new(ABI));
    let stacks = StackPool::<3, 128>::new();
    let mut hw = Recorder::default();

    let ids: Vec<_> = (0..3).map(|_| spawn(&sched, &stacks, &mut hw, task_a).unwrap()).collect();
    assert_eq!(ids, [TaskId(1), TaskId(2), TaskId(3)]);
    assert_eq!(spawn(&sched, &stacks, &mut hw, task_b), Err(Error::TableFull));
    assert_eq!(hw.masks, 4);
    assert!(!hw.masked);
}

#[test]
fn stack_too_small_is_reported_and_slot_stays_free() {
    let sched: Mutex<Scheduler<2>> = Mutex::new(Scheduler::new(ABI));
    let stacks = StackPool::<1, 8>::new();
    let mut hw = Recorder::default();

    let err = spawn(&sched, &stacks, &mut hw, task_a).unwrap_err();
    assert!(matches!(err, Error::StackTooSmall { available: 8, .. }));
    assert_eq!(sched.lock().table().state(TaskId(1)), Ok(TaskState::Free));
    assert_eq!(stacks.available(), 1);
}

#[test]
fn task_stacks_stay_outside_the_scheduler() {
    let sched: Mutex<Scheduler<4>> = Mutex::new(Scheduler::new(ABI));
    let stacks = StackPool::<3, 128>::new();
    let mut hw = Recorder::default();
    let t1 = spawn(&sched, &stacks, &mut hw, task_a).unwrap();

    let sched_start = &sched as *const _ as u64;
    let sched_end = sched_start + core::mem::size_of_val(&sched) as u64;
    let guard = sched.lock();
    let region = guard.table().get(t1).unwrap().stack().unwrap();
    assert!(region.top() <= sched_start || region.base() >= sched_end);
    assert!(region.contains(guard.table().get(t1).unwrap().state_handle().unwrap()));
}

#[test]
fn task_created_between_ticks_joins_the_rotation() {
    let sched: Mutex<Scheduler<4>> = Mutex::new(Scheduler::new(ABI));
    let stacks = StackPool::<3, 128>::new();
    let mut hw = Recorder::default();

    let idle = StateHandle(0x9000);
    assert_eq!(preempt(&sched, &mut hw, idle), idle);

    let t1 = spawn(&sched, &stacks, &mut hw, task_a).unwrap();
    assert_eq!(preempt(&sched, &mut hw, StateHandle(0x9100)), boot_handle(&sched, t1));
    assert_eq!(inspect(&sched, &mut hw, |s| s.current()), t1);
}

#[test]
#[should_panic(expected = "scheduler lock held")]
fn preempting_while_table_is_locked_is_fatal() {
    let sched: Mutex<Scheduler<4>> = Mutex::new(Scheduler::new(ABI));
    let mut hw = Recorder::default();
    let _held = sched.lock();
    preempt(&sched, &mut hw, StateHandle(0x10));
}
