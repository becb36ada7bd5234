//! Кадр переключения + Bootstrap Builder / Switch frame + bootstrap builder
//!
//! Бинарный контракт между тремя независимыми кусками кода:
//!   1. trap stub таймера (ядро, asm)   сохраняет регистры и отдаёт адрес кадра
//!   2. resume primitive (ядро, asm)    `mov rsp, handle; pop ×15; iretq`
//!   3. build_initial_frame (здесь)     кадр для задачи, которая ещё не бежала
//!
//! Binary contract between three independently written pieces of code:
//!   1. timer trap stub (kernel, asm)   saves registers, hands over the frame address
//!   2. resume primitive (kernel, asm)  `mov rsp, handle; pop ×15; iretq`
//!   3. build_initial_frame (here)      frame for a task that has never run
//!
//! Раскладка v1, от handle вверх / Layout v1, from the handle upwards:
//!
//! ```text
//!  word  0..=14  r15 r14 r13 r12 r11 r10 r9 r8 rdi rsi rbp rbx rdx rcx rax
//!  word  15      rip     ← program counter, popped by iretq
//!  word  16      cs
//!  word  17      rflags
//!  word  18      rsp     ─┐
//!  word  19      ss       │
//!  word  20      return trap address  ← rsp at task entry (bootstrap frames only)
//! ```
//!
//! Любое изменение раскладки обязано поднять `FRAME_LAYOUT_VERSION` и
//! поменять все три стороны сразу.
//! Any layout change must bump `FRAME_LAYOUT_VERSION` and update all three sides.

use bitflags::bitflags;
use core::mem::size_of;

use crate::task::{EntryPoint, StateHandle};
use crate::{Error, Result};

pub const FRAME_LAYOUT_VERSION: u32 = 1;

const WORD: usize = size_of::<u64>();

/// Слов в `SwitchFrame` / Words in a `SwitchFrame`
pub const FRAME_WORDS: usize = size_of::<SwitchFrame>() / WORD;

/// Индекс слова со счётчиком команд / Index of the program-counter word
pub const RIP_WORD: usize = size_of::<SavedRegisters>() / WORD;

/// Минимальный стек для новой задачи: кадр + слово return trap + выравнивание.
/// Minimum stack for a new task: frame + return-trap word + alignment padding.
pub const MIN_STACK_WORDS: usize = FRAME_WORDS + 2;

bitflags! {
    /// Биты RFLAGS, которые задаёт начальный кадр.
    /// RFLAGS bits set by a bootstrap frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RFlags: u64 {
        /// Бит 1 всегда 1 / Bit 1 always reads as 1
        const RESERVED_1       = 1 << 1;
        /// IF: без него задачу нельзя вытеснить / IF: without it the task is never preempted
        const INTERRUPT_ENABLE = 1 << 9;
    }
}

/// Регистры общего назначения в порядке, обратном `push` в trap stub.
/// General-purpose registers, reverse of the trap stub's push order.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SavedRegisters {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9:  u64,
    pub r8:  u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rbp: u64,
    pub rbx: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rax: u64,
}

/// CPU автоматически помещает на стек при прерывании; `iretq` снимает все пять.
/// Pushed by the CPU on interrupt; `iretq` pops all five unconditionally in long mode.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterruptFrame {
    pub rip:    u64,
    pub cs:     u64,
    pub rflags: u64,
    pub rsp:    u64,
    pub ss:     u64,
}

/// Полный сохранённый контекст задачи; `StateHandle` указывает на его начало.
/// A task's complete saved context; a `StateHandle` points at its first word.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwitchFrame {
    pub regs: SavedRegisters,
    pub iret: InterruptFrame,
}

const _: () = assert!(size_of::<SavedRegisters>() == 15 * WORD);
const _: () = assert!(size_of::<InterruptFrame>() == 5 * WORD);
const _: () = assert!(FRAME_WORDS == 20);
const _: () = assert!(RIP_WORD == 15);

impl SwitchFrame {
    /// Адрес, на который resume primitive передаст управление.
    /// The address the resume primitive transfers control to.
    pub const fn resume_address(&self) -> u64 {
        self.iret.rip
    }

    pub fn to_words(&self) -> [u64; FRAME_WORDS] {
        let r = &self.regs;
        let i = &self.iret;
        [
            r.r15, r.r14, r.r13, r.r12, r.r11, r.r10, r.r9, r.r8,
            r.rdi, r.rsi, r.rbp, r.rbx, r.rdx, r.rcx, r.rax,
            i.rip, i.cs, i.rflags, i.rsp, i.ss,
        ]
    }

    pub fn from_words(w: &[u64; FRAME_WORDS]) -> Self {
        Self {
            regs: SavedRegisters {
                r15: w[0], r14: w[1], r13: w[2], r12: w[3],
                r11: w[4], r10: w[5], r9: w[6], r8: w[7],
                rdi: w[8], rsi: w[9], rbp: w[10], rbx: w[11],
                rdx: w[12], rcx: w[13], rax: w[14],
            },
            iret: InterruptFrame {
                rip: w[15], cs: w[16], rflags: w[17], rsp: w[18], ss: w[19],
            },
        }
    }

    /// Прочитать кадр, лежащий в `stack` по адресу `handle`.
    /// Read back the frame that `handle` points to inside `stack`.
    pub fn read_from(stack: &[u64], handle: StateHandle) -> Option<Self> {
        let base = stack.as_ptr() as u64;
        let offset = handle.as_u64().checked_sub(base)? as usize;
        if offset % WORD != 0 {
            return None;
        }
        let start = offset / WORD;
        let words: &[u64; FRAME_WORDS] = stack.get(start..start + FRAME_WORDS)?.try_into().ok()?;
        Some(Self::from_words(words))
    }
}

/// Параметры платформы для начального кадра.
/// Platform parameters baked into a bootstrap frame.
#[derive(Clone, Copy)]
pub struct TaskAbi {
    pub code_selector: u16,
    pub data_selector: u16,
    pub rflags:        RFlags,
    /// Куда попадает задача, если её точка входа вернулась.
    /// Where a task lands if its entry point returns.
    pub return_trap:   extern "C" fn() -> !,
}

impl TaskAbi {
    /// Ring 0, прерывания разрешены / Ring 0, interrupts enabled
    pub const fn kernel(code_selector: u16, data_selector: u16, return_trap: extern "C" fn() -> !) -> Self {
        Self {
            code_selector,
            data_selector,
            rflags: RFlags::RESERVED_1.union(RFlags::INTERRUPT_ENABLE),
            return_trap,
        }
    }
}

impl core::fmt::Debug for TaskAbi {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TaskAbi")
            .field("code_selector", &format_args!("{:#x}", self.code_selector))
            .field("data_selector", &format_args!("{:#x}", self.data_selector))
            .field("rflags", &self.rflags)
            .field("return_trap", &format_args!("{:#x}", self.return_trap as usize))
            .finish()
    }
}

/// Построить начальный кадр на вершине `stack`.
/// Build the bootstrap frame at the top of `stack`.
///
/// Первый resume этого кадра выглядит как возврат из прерывания, которое
/// случилось прямо перед первой инструкцией `entry`: регистры нулевые,
/// `rsp` указывает на адрес return trap, как будто `entry` только что вызвали.
///
/// The first resume of this frame looks like returning from an interrupt taken
/// just before the first instruction of `entry`: registers are zero and `rsp`
/// points at the return-trap address, as if `entry` had just been called.
///
/// Размер проверяется до любой записи.
/// The size is checked before anything is written.
pub fn build_initial_frame(stack: &mut [u64], entry: EntryPoint, abi: &TaskAbi) -> Result<StateHandle> {
    let base = stack.as_ptr() as usize;
    let top = base + stack.len() * WORD;
    // Слово выравнивания, если вершина не кратна 16 / Padding word when the top is not 16-aligned
    let pad = (top % 16) / WORD;

    let required = FRAME_WORDS + 1 + pad;
    if stack.len() < required {
        return Err(Error::StackTooSmall { required, available: stack.len() });
    }

    let trap_index = stack.len() - pad - 1;
    let frame_index = trap_index - FRAME_WORDS;
    let entry_rsp = (base + trap_index * WORD) as u64;

    stack[trap_index] = abi.return_trap as usize as u64;

    let frame = SwitchFrame {
        regs: SavedRegisters::default(),
        iret: InterruptFrame {
            rip:    entry as usize as u64,
            cs:     u64::from(abi.code_selector),
            rflags: abi.rflags.bits(),
            rsp:    entry_rsp,
            ss:     u64::from(abi.data_selector),
        },
    };
    stack[frame_index..trap_index].copy_from_slice(&frame.to_words());

    Ok(StateHandle((base + frame_index * WORD) as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::TaskStack;

    extern "C" fn entry() {}

    extern "C" fn trap() -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    const ABI: TaskAbi = TaskAbi::kernel(0x08, 0x10, trap);

    #[test]
    fn entry_address_reads_back_from_program_counter_word() {
        let mut stack = TaskStack::<64>::new();
        let handle = build_initial_frame(stack.as_mut_slice(), entry, &ABI).unwrap();

        let frame = SwitchFrame::read_from(stack.as_slice(), handle).unwrap();
        assert_eq!(frame.resume_address(), entry as usize as u64);

        let base = stack.as_slice().as_ptr() as u64;
        let index = ((handle.as_u64() - base) / 8) as usize;
        assert_eq!(stack.as_slice()[index + RIP_WORD], entry as usize as u64);
    }

    #[test]
    fn frame_sits_at_top_with_return_trap_above() {
        let mut stack = TaskStack::<64>::new();
        let handle = build_initial_frame(stack.as_mut_slice(), entry, &ABI).unwrap();
        let words = stack.as_slice();
        let base = words.as_ptr() as u64;

        // Вершина выровнена, поэтому паддинга нет / Top is aligned, so no padding
        assert_eq!(handle.as_u64(), base + ((64 - 1 - FRAME_WORDS) * 8) as u64);
        assert_eq!(words[63], trap as usize as u64);

        let frame = SwitchFrame::read_from(words, handle).unwrap();
        assert_eq!(frame.iret.rsp, base + 63 * 8);
        assert_eq!(frame.iret.rsp % 16, 8, "entry rsp must look like just after a call");
        assert_eq!(frame.iret.cs, 0x08);
        assert_eq!(frame.iret.ss, 0x10);
        assert_eq!(frame.regs, SavedRegisters::default());
        assert!(RFlags::from_bits_truncate(frame.iret.rflags).contains(RFlags::INTERRUPT_ENABLE));
    }

    #[test]
    fn unaligned_top_gets_one_padding_word() {
        let mut stack = TaskStack::<64>::new();
        // Срез без последнего слова: вершина ≡ 8 (mod 16)
        // Slice without the last word: top ≡ 8 (mod 16)
        let region = &mut stack.as_mut_slice()[..63];
        let handle = build_initial_frame(region, entry, &ABI).unwrap();
        let frame = SwitchFrame::read_from(region, handle).unwrap();

        assert_eq!(frame.iret.rsp % 16, 8);
        assert_eq!(region[61], trap as usize as u64);
        assert_eq!(region[62], 0);
    }

    #[test]
    fn short_region_is_rejected_without_writing() {
        let mut stack = TaskStack::<16>::new();
        let err = build_initial_frame(stack.as_mut_slice(), entry, &ABI).unwrap_err();
        assert_eq!(err, Error::StackTooSmall { required: FRAME_WORDS + 1, available: 16 });
        assert!(stack.as_slice().iter().all(|&w| w == 0));
    }

    #[test]
    fn exact_minimum_fits() {
        let mut stack = TaskStack::<{ FRAME_WORDS + 2 }>::new();
        assert!(build_initial_frame(stack.as_mut_slice(), entry, &ABI).is_ok());
        assert!(MIN_STACK_WORDS >= FRAME_WORDS + 1);
    }

    #[test]
    fn words_round_trip_through_layout() {
        let mut frame = SwitchFrame::default();
        frame.regs.r15 = 1;
        frame.regs.rax = 15;
        frame.iret.rip = 0xdead;
        frame.iret.ss = 0x10;
        let words = frame.to_words();
        assert_eq!(words[0], 1);
        assert_eq!(words[14], 15);
        assert_eq!(words[RIP_WORD], 0xdead);
        assert_eq!(SwitchFrame::from_words(&words), frame);
    }

    #[test]
    fn foreign_handle_is_not_read() {
        let stack = TaskStack::<32>::new();
        assert!(SwitchFrame::read_from(stack.as_slice(), StateHandle(8)).is_none());
    }
}
