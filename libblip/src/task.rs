//! Task Record: пассивные данные задачи / passive per-task data
//!
//! Идентификатор задачи совпадает с индексом слота в таблице, отдельного
//! отображения нет.
//! A task identity is its table slot index; there is no separate mapping.

use core::fmt;

/// Точка входа задачи ядра. Возврат из неё уводит задачу в return trap.
/// Kernel task entry point. Returning from it lands in the return trap.
pub type EntryPoint = extern "C" fn();

/// Идентификатор задачи / Task identity, `[0, capacity)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct TaskId(pub usize);

impl TaskId {
    /// Idle / bring-up задача, существует с момента загрузки.
    /// The idle / bring-up task, present from boot.
    pub const IDLE: TaskId = TaskId(0);

    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Адрес сохранённого кадра задачи: то, что получает resume primitive.
/// Address of a task's saved frame: what the resume primitive consumes.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct StateHandle(pub u64);

impl StateHandle {
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for StateHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateHandle({:#x})", self.0)
    }
}

/// Жизненный цикл слота / Slot lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Слот пуст / Slot holds nothing
    Free,
    /// Занят `allocate_slot`, кадр ещё строится / Claimed, frame not built yet
    Reserved,
    /// Готова к запуску / Eligible for selection
    Ready,
    /// Текущая задача / The current task
    Running,
}

impl TaskState {
    /// Ready и Running выбираются одинаково.
    /// Ready and Running are equally eligible.
    pub const fn is_eligible(self) -> bool {
        matches!(self, TaskState::Ready | TaskState::Running)
    }
}

/// Где лежит стек задачи: только адрес и размер, без ссылки на память.
/// Where a task's stack lives: an address and a size, never a reference.
///
/// Задача пишет в свой стек всё время, пока бежит, поэтому таблица (и всё,
/// что держит на неё `&`/`&mut`) хранит лишь числа.
/// A task writes its stack the whole time it runs, so the table (and anything
/// holding `&`/`&mut` to it) keeps plain numbers only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackRegion {
    base:  u64,
    words: usize,
}

impl StackRegion {
    pub const fn new(base: u64, words: usize) -> Self {
        Self { base, words }
    }

    pub const fn base(&self) -> u64 {
        self.base
    }

    pub const fn words(&self) -> usize {
        self.words
    }

    /// Адрес сразу за последним словом / Address just past the last word
    pub const fn top(&self) -> u64 {
        self.base + (self.words * 8) as u64
    }

    pub const fn contains(&self, handle: StateHandle) -> bool {
        handle.0 >= self.base && handle.0 < self.top()
    }
}

/// Запись о задаче (PCB) / Task record (PCB)
///
/// Слот 0 не получает региона: он бежит на загрузочном стеке.
/// Slot 0 gets no region: it runs on the boot stack.
pub struct TaskRecord {
    pub(crate) id: TaskId,
    pub(crate) state: TaskState,
    pub(crate) handle: Option<StateHandle>,
    pub(crate) entry: Option<EntryPoint>,
    pub(crate) stack: Option<StackRegion>,
}

impl TaskRecord {
    pub const fn free(id: TaskId) -> Self {
        Self {
            id,
            state: TaskState::Free,
            handle: None,
            entry: None,
            stack: None,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Последний сохранённый кадр; `None` до первого захвата или сборки.
    /// Most recently saved frame; `None` before the first capture or build.
    pub fn state_handle(&self) -> Option<StateHandle> {
        self.handle
    }

    /// Записать кадр, снятый в момент прерывания.
    /// Record the frame captured at interrupt time.
    pub fn capture(&mut self, handle: StateHandle) {
        self.handle = Some(handle);
    }

    pub fn entry(&self) -> Option<EntryPoint> {
        self.entry
    }

    pub fn stack(&self) -> Option<StackRegion> {
        self.stack
    }
}

impl fmt::Debug for TaskRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRecord")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("handle", &self.handle)
            .field("stack", &self.stack)
            .finish()
    }
}
