//! libblip: ядро планировщика BlipOS / BlipOS scheduler core
//!
//! Вытесняющий round-robin для фиксированного числа задач ядра.
//! Preemptive round-robin over a fixed number of kernel tasks.
//!
//! Уровни / Layers (снизу вверх / bottom-up):
//!   task    TaskRecord, TaskId, StateHandle, StackRegion
//!   stack   StackPool: стеки задач вне замка / task stacks outside the lock
//!   table   TaskTable, фиксированная ёмкость, слот 0 = idle
//!   frame   SwitchFrame v1 + build_initial_frame
//!   select  select_next, чистая функция / pure function
//!   sched   Scheduler, Platform, точка вытеснения / preemption entry point
//!
//! Аппаратная часть (trap stub, resume, EOI) живёт в ядре и приходит сюда
//! через трейт `Platform`.
//! Hardware pieces (trap stub, resume, EOI) live in the kernel and reach this
//! crate through the `Platform` trait.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![deny(unsafe_code)]

use core::fmt;

pub mod config;
pub mod frame;
pub mod sched;
pub mod select;
pub mod stack;
pub mod table;
pub mod task;

pub use frame::{build_initial_frame, SwitchFrame, TaskAbi};
pub use sched::{Platform, Scheduler};
pub use select::select_next;
pub use stack::{StackLease, StackPool, TaskStack};
pub use table::TaskTable;
pub use task::{EntryPoint, StackRegion, StateHandle, TaskId, TaskRecord, TaskState};

/// Ошибки планировщика / Scheduler errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Нет свободного слота / No free slot at creation time
    TableFull,
    /// В пуле не осталось стеков / The stack pool has no stack left
    OutOfStacks,
    /// Стек не вмещает начальный кадр / Stack region cannot hold the bootstrap frame
    StackTooSmall { required: usize, available: usize },
    /// Идентификатор вне `[0, capacity)` / Identity outside `[0, capacity)`
    InvalidIdentity(usize),
    /// Таблица задач повреждена / Task table is corrupt
    InvariantViolation(&'static str),
}

impl Error {
    /// Ошибки создания задачи можно пережить, остальное: нет.
    /// Task-creation errors are recoverable, the rest are not.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Error::InvalidIdentity(_) | Error::InvariantViolation(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TableFull => f.write_str("task table full"),
            Error::OutOfStacks => f.write_str("stack pool exhausted"),
            Error::StackTooSmall { required, available } => write!(
                f,
                "stack too small: need {} words, have {}",
                required, available
            ),
            Error::InvalidIdentity(id) => write!(f, "invalid task identity {}", id),
            Error::InvariantViolation(what) => write!(f, "scheduler invariant violated: {}", what),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_errors_are_not_fatal() {
        assert!(!Error::TableFull.is_fatal());
        assert!(!Error::OutOfStacks.is_fatal());
        assert!(!Error::StackTooSmall { required: 21, available: 4 }.is_fatal());
        assert!(Error::InvalidIdentity(9).is_fatal());
        assert!(Error::InvariantViolation("no eligible task").is_fatal());
    }

    #[test]
    fn display_distinguishes_creation_failures() {
        let full = Error::TableFull.to_string();
        let small = Error::StackTooSmall { required: 21, available: 4 }.to_string();
        assert_eq!(full, "task table full");
        assert_eq!(small, "stack too small: need 21 words, have 4");
    }
}
