//! Round-Robin Selector
//!
//! Чистая функция: без побочных эффектов, без I/O, не больше N проб.
//! Pure function: no side effects, no I/O, at most N probes.

use crate::table::TaskTable;
use crate::task::TaskId;
use crate::{Error, Result};

/// Следующая выбираемая задача после `current` в круговом порядке.
/// The next eligible task after `current`, in circular order.
///
/// Пробы идут с `(current + 1) mod N` и заканчиваются на самой `current`,
/// так что каждая выбираемая задача посещается ровно раз за круг.
/// Probing starts at `(current + 1) mod N` and ends at `current` itself, so
/// every eligible task is visited exactly once per circuit.
///
/// `InvariantViolation`, если выбирать некого: таблица повреждена, и
/// вызывающий в пути вытеснения обязан остановить систему.
/// `InvariantViolation` when nothing is eligible: the table is corrupt and a
/// caller on the preemption path must halt.
pub fn select_next<const N: usize>(
    table: &TaskTable<N>,
    current: TaskId,
) -> Result<TaskId> {
    if current.index() >= N {
        return Err(Error::InvalidIdentity(current.index()));
    }

    (1..=N)
        .map(|step| TaskId((current.index() + step) % N))
        .find(|&id| table.state(id).map_or(false, |s| s.is_eligible()))
        .ok_or(Error::InvariantViolation("no eligible task in table"))
}
