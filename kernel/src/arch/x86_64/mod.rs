//! x86_64 platform initialization

pub mod boot;
pub mod context;
pub mod gdt;
pub mod idt;
pub mod pic;
pub mod pit;
pub mod port;

use core::arch::asm;

/// RFLAGS.IF
const RFLAGS_IF: u64 = 1 << 9;

/// x86_64 init sequence. Прерывания остаются выключенными до `enable_interrupts`.
/// Interrupts stay off until `enable_interrupts`.
pub fn init() {
    gdt::init();   // Global Descriptor Table + TSS
    idt::init();   // Interrupt Descriptor Table
    pic::init();   // 8259: IRQ 0–15 → 0x20–0x2F, only the timer unmasked
}

pub fn enable_interrupts() {
    unsafe { asm!("sti", options(nomem, nostack)) };
}

pub fn disable_interrupts() {
    unsafe { asm!("cli", options(nomem, nostack)) };
}

pub fn interrupts_enabled() -> bool {
    let rflags: u64;
    unsafe { asm!("pushfq", "pop {}", out(reg) rflags, options(nomem, preserves_flags)) };
    rflags & RFLAGS_IF != 0
}

/// Выполнить `f` с запрещёнными прерываниями и вернуть прежнее состояние IF.
/// Run `f` with interrupts disabled and restore the previous IF afterwards.
pub fn without_interrupts<R>(f: impl FnOnce() -> R) -> R {
    let was_enabled = interrupts_enabled();
    if was_enabled {
        disable_interrupts();
    }
    let r = f();
    if was_enabled {
        enable_interrupts();
    }
    r
}

/// Спать до следующего прерывания / Sleep until the next interrupt
pub fn halt() {
    unsafe { asm!("hlt", options(nomem, nostack, preserves_flags)) };
}

/// Остановить CPU навсегда / Stop the CPU for good
pub fn halt_forever() -> ! {
    loop {
        disable_interrupts();
        halt();
    }
}
