//! Константы конфигурации планировщика / Scheduler configuration constants

/// Число слотов в таблице задач (слот 0: idle).
/// Task table capacity (slot 0 is idle).
pub const MAX_TASKS: usize = 4;

/// Размер стека задачи в машинных словах (8 KiB на x86_64).
/// Per-task stack size in machine words (8 KiB on x86_64).
pub const STACK_WORDS: usize = 1024;

/// Период таймера / Timer period
pub const TICK_PERIOD_MS: u32 = 10;

pub const TICK_HZ: u32 = 1000 / TICK_PERIOD_MS;
