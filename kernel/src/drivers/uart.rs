//! UART Serial driver: COM1 (0x3F8)
//!
//! Единственный вывод ядра: и `kprintln!`, и логгер пишут сюда.
//! The kernel's only output: both `kprintln!` and the logger write here.
//!
//! Запуск / Run:
//!   qemu-system-x86_64 -serial stdio ...

use core::fmt;
use spin::Mutex;

use crate::arch::current::port::{inb, outb};

const COM1: u16 = 0x3F8;

/// Line Status Register: THR пуст / THR empty
const LSR_THR_EMPTY: u8 = 0x20;

/// Инициализировать COM1 на 115200 baud.
/// Initialize COM1 at 115200 baud.
pub fn init() {
    unsafe {
        outb(COM1 + 1, 0x00); // Отключить прерывания UART / Disable UART interrupts
        outb(COM1 + 3, 0x80); // Включить DLAB (Divisor Latch)
        outb(COM1,     0x01); // Делитель 1 → 115200 baud
        outb(COM1 + 1, 0x00);
        outb(COM1 + 3, 0x03); // 8 бит, нет чётности, 1 стоп-бит
        outb(COM1 + 2, 0xC7); // Enable FIFO, clear, 14-byte threshold
        outb(COM1 + 4, 0x03); // DTR + RTS, IRQ линия не нужна / no IRQ line
    }
}

/// Ждать пока буфер передачи свободен и отправить байт.
/// Wait for transmit buffer empty and send byte.
fn send_byte(byte: u8) {
    unsafe {
        while inb(COM1 + 5) & LSR_THR_EMPTY == 0 {
            core::hint::spin_loop();
        }
        outb(COM1, byte);
    }
}

/// Отправить строку в COM1 без блокировки.
/// Send a string to COM1 without taking the lock.
pub fn print(s: &str) {
    for byte in s.bytes() {
        if byte == b'\n' {
            send_byte(b'\r');
        }
        send_byte(byte);
    }
}

// ── fmt::Write для использования с format_args! ───────────────────────────────

struct UartWriter;

impl fmt::Write for UartWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        print(s);
        Ok(())
    }
}

static UART_LOCK: Mutex<UartWriter> = Mutex::new(UartWriter);

/// Внутренняя функция для макроса kprint!
/// Internal function for kprint! macro
///
/// Строка выводится под маской прерываний: иначе тик посреди строки отдаст
/// CPU задаче, которая упрётся в тот же замок навсегда.
/// A line is written with interrupts masked: otherwise a tick mid-line hands
/// the CPU to a task that would spin on the same lock forever.
pub fn _print(args: fmt::Arguments) {
    use fmt::Write;
    crate::arch::current::without_interrupts(|| {
        UART_LOCK.lock().write_fmt(args).ok();
    });
}

/// Вывод из panic handler: замок может быть занят тем, кто упал.
/// Output from the panic handler: the lock may be held by whoever panicked.
pub fn _print_unlocked(args: fmt::Arguments) {
    use fmt::Write;
    UartWriter.write_fmt(args).ok();
}
