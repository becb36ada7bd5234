//! Порты ввода-вывода / I/O ports
//!
//! Общие `in`/`out` для UART, PIC и PIT.
//! Shared `in`/`out` for the UART, PIC and PIT.

use core::arch::asm;

/// # Safety
/// Запись в порт может перенастроить устройство; вызывающий отвечает за смысл.
/// Writing a port may reprogram a device; the caller owns the meaning.
#[inline]
pub unsafe fn outb(port: u16, val: u8) {
    unsafe { asm!("out dx, al", in("dx") port, in("al") val, options(nomem, nostack, preserves_flags)) };
}

/// # Safety
/// Чтение некоторых портов имеет побочные эффекты / Some port reads have side effects.
#[inline]
pub unsafe fn inb(port: u16) -> u8 {
    let val: u8;
    unsafe { asm!("in al, dx", out("al") val, in("dx") port, options(nomem, nostack, preserves_flags)) };
    val
}

/// Пауза ~1 мкс через неиспользуемый порт 0x80, нужна старому PIC.
/// ~1 µs delay through unused port 0x80, needed by the legacy PIC.
#[inline]
pub fn io_wait() {
    unsafe { outb(0x80, 0) };
}
