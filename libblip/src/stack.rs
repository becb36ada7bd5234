//! Пул стеков задач / Task stack pool
//!
//! Стеки живут вне `Scheduler` и его замка: задача пишет в свой стек всё
//! время, пока бежит, и никакая Rust-ссылка на планировщик не должна его
//! покрывать.
//! Stacks live outside the `Scheduler` and its lock: a task writes its stack
//! the whole time it runs, and no Rust reference to the scheduler may cover it.
//!
//! Жизнь стека / Stack lifetime:
//!
//! ```text
//!   free ──lease()──▶ leased (&mut [u64], только create_task / create_task only)
//!                       │ drop        → free
//!                       │ commit()    → committed: только StackRegion, навсегда
//! ```

#![allow(unsafe_code)]

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::task::StackRegion;

/// Приватный стек задачи. Выравнивание 16 нужно SysV ABI на входе в задачу.
/// Private task stack. 16-byte alignment is what the SysV ABI needs at task entry.
#[repr(C, align(16))]
pub struct TaskStack<const W: usize> {
    words: [u64; W],
}

impl<const W: usize> TaskStack<W> {
    pub const fn new() -> Self {
        Self { words: [0; W] }
    }

    pub const fn len(&self) -> usize {
        W
    }

    pub const fn is_empty(&self) -> bool {
        W == 0
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.words
    }

    pub fn as_mut_slice(&mut self) -> &mut [u64] {
        &mut self.words
    }
}

impl<const W: usize> Default for TaskStack<W> {
    fn default() -> Self {
        Self::new()
    }
}

/// `P` стеков по `W` слов. Ядро держит один пул в `static`.
/// `P` stacks of `W` words each. The kernel keeps one pool in a `static`.
pub struct StackPool<const P: usize, const W: usize> {
    stacks: [UnsafeCell<TaskStack<W>>; P],
    taken:  [AtomicBool; P],
}

// SAFETY:
// - Стек `i` достаётся ссылкой только тому, кто выиграл `taken[i]` false → true.
// - После `commit` флаг больше не сбрасывается, и ссылок на стек не выдаётся.
// - Stack `i` is handed out by reference only to whoever wins `taken[i]`
//   false → true.
// - After `commit` the flag is never cleared and no reference is handed out again.
unsafe impl<const P: usize, const W: usize> Sync for StackPool<P, W> {}

impl<const P: usize, const W: usize> StackPool<P, W> {
    pub const fn new() -> Self {
        Self {
            stacks: [const { UnsafeCell::new(TaskStack::new()) }; P],
            taken:  [const { AtomicBool::new(false) }; P],
        }
    }

    pub const fn capacity(&self) -> usize {
        P
    }

    pub const fn stack_words(&self) -> usize {
        W
    }

    /// Стеков, которые ещё можно взять / Stacks still available
    pub fn available(&self) -> usize {
        self.taken.iter().filter(|t| !t.load(Ordering::Acquire)).count()
    }

    /// Взять первый свободный стек / Take the first free stack
    pub fn lease(&self) -> Option<StackLease<'_>> {
        let index = self.taken.iter().position(|t| {
            t.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok()
        })?;
        // SAFETY: мы только что выиграли `taken[index]`, больше никто этот
        // стек не держит и не получит, пока аренда жива.
        // SAFETY: we just won `taken[index]`; nobody else holds this stack or
        // can get it while the lease lives.
        let stack = unsafe { &mut *self.stacks[index].get() };
        Some(StackLease {
            words: stack.as_mut_slice(),
            taken: &self.taken[index],
            committed: false,
        })
    }
}

impl<const P: usize, const W: usize> Default for StackPool<P, W> {
    fn default() -> Self {
        Self::new()
    }
}

/// Исключительный доступ к одному стеку пула на время сборки кадра.
/// Exclusive access to one pool stack while a bootstrap frame is built.
///
/// Drop без `commit` возвращает стек в пул.
/// Dropping without `commit` returns the stack to the pool.
pub struct StackLease<'a> {
    words:     &'a mut [u64],
    taken:     &'a AtomicBool,
    committed: bool,
}

impl StackLease<'_> {
    pub fn as_slice(&self) -> &[u64] {
        &*self.words
    }

    pub fn as_mut_slice(&mut self) -> &mut [u64] {
        &mut *self.words
    }

    pub fn region(&self) -> StackRegion {
        StackRegion::new(self.words.as_ptr() as u64, self.words.len())
    }

    /// Отдать стек задаче насовсем. Остаётся только адрес.
    /// Hand the stack to a task for good. Only its address remains.
    pub fn commit(mut self) -> StackRegion {
        self.committed = true;
        self.region()
    }
}

impl Drop for StackLease<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.taken.store(false, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_is_sixteen_byte_aligned() {
        let stack = TaskStack::<8>::new();
        assert_eq!(core::mem::align_of::<TaskStack<8>>(), 16);
        assert_eq!(stack.as_slice().as_ptr() as usize % 16, 0);
        assert_eq!(stack.len(), 8);
    }

    #[test]
    fn dropped_lease_returns_the_stack() {
        let pool = StackPool::<2, 32>::new();
        let first = pool.lease().unwrap().region();
        assert_eq!(pool.available(), 2);
        assert_eq!(pool.lease().unwrap().region(), first);
    }

    #[test]
    fn committed_stacks_are_never_leased_again() {
        let pool = StackPool::<2, 32>::new();
        let a = pool.lease().unwrap().commit();
        let b = pool.lease().unwrap().commit();
        assert_ne!(a, b);
        assert_eq!(a.words(), 32);
        assert_eq!(pool.available(), 0);
        assert!(pool.lease().is_none());
    }

    #[test]
    fn live_leases_are_distinct() {
        let pool = StackPool::<3, 16>::new();
        let a = pool.lease().unwrap();
        let b = pool.lease().unwrap();
        assert_ne!(a.region().base(), b.region().base());
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn region_matches_the_leased_words() {
        let pool = StackPool::<1, 24>::new();
        let mut lease = pool.lease().unwrap();
        lease.as_mut_slice()[23] = 0xdead;
        let region = lease.region();
        assert_eq!(region.base(), lease.as_slice().as_ptr() as u64);
        assert_eq!(region.top() % 16, 0);
        assert_eq!(lease.as_slice()[23], 0xdead);
    }
}
