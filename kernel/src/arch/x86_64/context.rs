//! Переключение контекста / Context switch
//!
//! Две половины кадра `libblip::SwitchFrame` v1:
//! Both halves of the `libblip::SwitchFrame` v1 contract:
//!
//! ```text
//!   isr_timer     CPU: ss rsp rflags cs rip
//!                 мы / we: push rax rcx rdx rbx rbp rsi rdi r8 … r15
//!                 rdi = rsp (handle) → timer_entry
//!   resume_frame  rsp = handle; pop r15 … rax; iretq
//! ```
//!
//! Порядок push здесь: зеркальное отражение `SavedRegisters`.
//! The push order here mirrors `SavedRegisters` exactly.

use core::mem::offset_of;

use libblip::frame::{InterruptFrame, SavedRegisters, SwitchFrame, FRAME_LAYOUT_VERSION, RIP_WORD};

// Раскладка, под которую написан asm ниже / The layout the asm below is written for
const _: () = assert!(FRAME_LAYOUT_VERSION == 1);
const _: () = assert!(offset_of!(SavedRegisters, r15) == 0);
const _: () = assert!(offset_of!(SavedRegisters, rax) == 14 * 8);
const _: () = assert!(offset_of!(SwitchFrame, iret) == RIP_WORD * 8);
const _: () = assert!(offset_of!(InterruptFrame, ss) == 4 * 8);

/// Trap stub таймера (вектор 0x20).
/// Timer trap stub (vector 0x20).
///
/// После 15 push'ей rsp снова выровнен на 16: CPU выровнял его перед
/// своими пятью словами.
/// After 15 pushes rsp is 16-aligned again: the CPU aligned it before
/// pushing its own five words.
#[unsafe(naked)]
pub unsafe extern "C" fn isr_timer() {
    core::arch::naked_asm!(
        "push rax",
        "push rcx",
        "push rdx",
        "push rbx",
        "push rbp",
        "push rsi",
        "push rdi",
        "push r8",
        "push r9",
        "push r10",
        "push r11",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "mov rdi, rsp",
        "cld",
        "call {entry}",
        // timer_entry не возвращается / timer_entry never returns
        "ud2",
        entry = sym crate::sched::timer_entry,
    );
}

/// Resume primitive: загрузить кадр по `handle` и вернуться в задачу.
/// Resume primitive: load the frame at `handle` and return into the task.
///
/// # Safety
/// `handle` обязан указывать на целый кадр v1 в стеке, который никто больше
/// не использует.
/// `handle` must point at a complete v1 frame in a stack nobody else is using.
#[unsafe(naked)]
pub unsafe extern "C" fn resume_frame(handle: u64) -> ! {
    core::arch::naked_asm!(
        "mov rsp, rdi",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop r11",
        "pop r10",
        "pop r9",
        "pop r8",
        "pop rdi",
        "pop rsi",
        "pop rbp",
        "pop rbx",
        "pop rdx",
        "pop rcx",
        "pop rax",
        "iretq",
    );
}

/// Return trap: сюда `ret` из точки входа задачи.
/// Return trap: where a task's entry point `ret`s to.
///
/// После `ret` rsp ≡ 0 (mod 16), а Rust-функция ждёт 8: выравниваем и зовём
/// обычный обработчик.
/// After `ret` rsp ≡ 0 (mod 16) while a Rust function expects 8, so realign
/// and call the ordinary handler.
#[unsafe(naked)]
pub extern "C" fn task_return_trampoline() -> ! {
    core::arch::naked_asm!(
        "and rsp, -16",
        "call {exit}",
        "ud2",
        exit = sym crate::sched::task_exited,
    );
}
