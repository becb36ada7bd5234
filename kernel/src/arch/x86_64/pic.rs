//! PIC (8259): каскад из двух контроллеров / cascaded pair
//!
//! По умолчанию IRQ 0–7 → векторы 0x08–0x0F: конфликт с исключениями!
//! By default IRQ 0–7 → vectors 0x08–0x0F: conflicts with exceptions!
//! После `init` / After `init`:
//!   IRQ 0–7  → 0x20–0x27
//!   IRQ 8–15 → 0x28–0x2F

use super::port::{inb, io_wait, outb};

const PIC1_CMD:  u16 = 0x20;
const PIC1_DATA: u16 = 0x21;
const PIC2_CMD:  u16 = 0xA0;
const PIC2_DATA: u16 = 0xA1;

const ICW1_INIT_ICW4: u8 = 0x11;
const ICW4_8086:      u8 = 0x01;
const CMD_EOI:        u8 = 0x20;
const CMD_READ_ISR:   u8 = 0x0B;

pub const PIC1_OFFSET: u8 = 0x20;
pub const PIC2_OFFSET: u8 = 0x28;

/// IRQ линии / IRQ lines
pub const IRQ_TIMER:    u8 = 0;
pub const IRQ_SPURIOUS: u8 = 7;

/// Вектор IDT для IRQ / IDT vector for an IRQ
pub const fn vector(irq: u8) -> u8 {
    if irq < 8 { PIC1_OFFSET + irq } else { PIC2_OFFSET + irq - 8 }
}

/// Ремаппинг и маскирование: открыта только линия таймера.
/// Remap and mask: only the timer line stays open.
pub fn init() {
    unsafe {
        // ICW1: начало инициализации / start initialization
        outb(PIC1_CMD, ICW1_INIT_ICW4);
        io_wait();
        outb(PIC2_CMD, ICW1_INIT_ICW4);
        io_wait();
        // ICW2: векторные смещения / vector offsets
        outb(PIC1_DATA, PIC1_OFFSET);
        io_wait();
        outb(PIC2_DATA, PIC2_OFFSET);
        io_wait();
        // ICW3: slave на IRQ2 / slave on IRQ2
        outb(PIC1_DATA, 0x04);
        io_wait();
        outb(PIC2_DATA, 0x02);
        io_wait();
        // ICW4: режим 8086 / 8086 mode
        outb(PIC1_DATA, ICW4_8086);
        io_wait();
        outb(PIC2_DATA, ICW4_8086);
        io_wait();

        outb(PIC1_DATA, !(1 << IRQ_TIMER));
        outb(PIC2_DATA, 0xFF);
    }
}

/// Сообщить PIC об окончании обработки прерывания.
/// Send End-Of-Interrupt to the PIC.
pub fn end_of_interrupt(irq: u8) {
    unsafe {
        if irq >= 8 {
            outb(PIC2_CMD, CMD_EOI);
        }
        outb(PIC1_CMD, CMD_EOI);
    }
}

/// Настоящее ли IRQ7 (бит в ISR стоит) / Whether IRQ7 is real (its ISR bit is set)
///
/// Ложному прерыванию EOI не посылают.
/// A spurious interrupt gets no EOI.
pub fn irq7_in_service() -> bool {
    unsafe {
        outb(PIC1_CMD, CMD_READ_ISR);
        inb(PIC1_CMD) & (1 << IRQ_SPURIOUS) != 0
    }
}
