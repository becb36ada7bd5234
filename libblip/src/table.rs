//! Task Table: фиксированная таблица задач / fixed-capacity task table
//!
//! Хранит все записи и их стеки всё время жизни ядра, никогда не
//! переаллоцируется. Идентификатор задачи: индекс слота.
//! Owns every record and its stack for the kernel's lifetime and never
//! reallocates. A task identity is its slot index.
//!
//! Инвариант / Invariant: таблица, созданная `new()`, всегда содержит хотя бы
//! один выбираемый слот (слот 0), на этом держится завершение `select_next`.
//! A table built by `new()` always holds at least one eligible slot (slot 0);
//! `select_next` relies on it to terminate.

use crate::frame::{build_initial_frame, TaskAbi};
use crate::stack::StackPool;
use crate::task::{EntryPoint, TaskId, TaskRecord, TaskState};
use crate::{Error, Result};

pub struct TaskTable<const N: usize> {
    records: [TaskRecord; N],
}

impl<const N: usize> TaskTable<N> {
    /// Таблица при загрузке: слот 0 (idle / bring-up) уже Ready.
    /// Boot table: slot 0 (idle / bring-up) is already Ready.
    ///
    /// У слота 0 нет региона стека: это код, который строит таблицу, и он
    /// бежит на загрузочном стеке. Пулу стеков хватает `N - 1` мест.
    /// Slot 0 has no stack region: it is the code building the table, and it
    /// runs on the boot stack. A stack pool of `N - 1` entries is enough.
    pub const fn new() -> Self {
        let mut table = Self::empty();
        table.records[0].state = TaskState::Ready;
        table
    }

    /// Все слоты свободны. Инвариант живости не выполняется, пока кто-то не
    /// станет Ready.
    /// Every slot Free. The liveness invariant does not hold until one is Ready.
    pub const fn empty() -> Self {
        assert!(N > 0, "task table needs at least one slot");
        let mut records = [const { TaskRecord::free(TaskId(0)) }; N];
        let mut i = 0;
        while i < N {
            records[i].id = TaskId(i);
            i += 1;
        }
        Self { records }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Занять первый свободный слот. Слот сразу перестаёт быть Free, чтобы
    /// второй вызов не получил его же.
    /// Claim the first Free slot. It stops being Free at once so that a second
    /// caller cannot observe the same slot.
    pub fn allocate_slot(&mut self) -> Result<TaskId> {
        let record = self
            .records
            .iter_mut()
            .find(|r| r.state == TaskState::Free)
            .ok_or(Error::TableFull)?;
        record.state = TaskState::Reserved;
        Ok(record.id)
    }

    /// # Panics
    /// На идентификаторе вне таблицы: это ошибка программы.
    /// On an identity outside the table; that is a programming error.
    pub fn mark_ready(&mut self, id: TaskId) {
        self.records[id.index()].state = TaskState::Ready;
    }

    /// # Panics
    /// На идентификаторе вне таблицы / On an identity outside the table.
    pub fn mark_free(&mut self, id: TaskId) {
        let record = &mut self.records[id.index()];
        record.state = TaskState::Free;
        record.handle = None;
        record.entry = None;
        record.stack = None;
    }

    pub(crate) fn mark_running(&mut self, id: TaskId) {
        self.records[id.index()].state = TaskState::Running;
    }

    pub fn get(&self, id: TaskId) -> Result<&TaskRecord> {
        self.records.get(id.index()).ok_or(Error::InvalidIdentity(id.index()))
    }

    pub fn get_mut(&mut self, id: TaskId) -> Result<&mut TaskRecord> {
        self.records.get_mut(id.index()).ok_or(Error::InvalidIdentity(id.index()))
    }

    pub fn state(&self, id: TaskId) -> Result<TaskState> {
        self.get(id).map(|r| r.state())
    }

    pub fn eligible_count(&self) -> usize {
        self.records.iter().filter(|r| r.state.is_eligible()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TaskId, &TaskRecord)> + '_ {
        self.records.iter().map(|r| (r.id, r))
    }

    /// Слот → стек из пула → начальный кадр → Ready. При любой ошибке слот
    /// и стек возвращаются.
    /// Slot → pool stack → bootstrap frame → Ready. Any failure gives both the
    /// slot and the stack back.
    ///
    /// `&mut [u64]` на стек существует только здесь, пока слот Reserved.
    /// The `&mut [u64]` over the stack exists only here, while the slot is Reserved.
    ///
    /// Вызывающий обязан держать прерывания замаскированными.
    /// The caller must keep interrupts masked for the duration.
    pub fn create_task<const P: usize, const W: usize>(
        &mut self,
        entry: EntryPoint,
        abi: &TaskAbi,
        stacks: &StackPool<P, W>,
    ) -> Result<TaskId> {
        let id = self.allocate_slot()?;
        let Some(mut lease) = stacks.lease() else {
            self.mark_free(id);
            return Err(Error::OutOfStacks);
        };

        let built = build_initial_frame(lease.as_mut_slice(), entry, abi);
        match built {
            Ok(handle) => {
                let record = &mut self.records[id.index()];
                record.stack = Some(lease.commit());
                record.handle = Some(handle);
                record.entry = Some(entry);
                self.mark_ready(id);
                Ok(id)
            }
            Err(err) => {
                drop(lease);
                self.mark_free(id);
                Err(err)
            }
        }
    }
}

impl<const N: usize> Default for TaskTable<N> {
    fn default() -> Self {
        Self::new()
    }
}
