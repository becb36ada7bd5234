//! PIT (8253/8254): канал 0 как источник тика / channel 0 as the tick source

use super::port::outb;

const PIT_CHANNEL0: u16 = 0x40;
const PIT_COMMAND:  u16 = 0x43;

/// Частота входа PIT / PIT input clock
pub const PIT_BASE_HZ: u32 = 1_193_182;

/// Канал 0, lobyte/hibyte, режим 3 (square wave), двоичный счёт.
/// Channel 0, lobyte/hibyte, mode 3 (square wave), binary count.
const CMD_CH0_SQUARE: u8 = 0x36;

/// Делитель для частоты `hz`, зажатый в 16 бит (0 у PIT = 65536).
/// Divisor for `hz`, clamped to 16 bits (0 means 65536 to the PIT).
pub const fn divisor(hz: u32) -> u16 {
    let d = if hz == 0 { 0x1_0000 } else { PIT_BASE_HZ / hz };
    if d == 0 {
        1
    } else if d >= 0x1_0000 {
        0
    } else {
        d as u16
    }
}

/// Запустить периодические IRQ0 с частотой `hz`.
/// Start periodic IRQ0 at `hz`.
pub fn init(hz: u32) {
    let [lo, hi] = divisor(hz).to_le_bytes();
    unsafe {
        outb(PIT_COMMAND, CMD_CH0_SQUARE);
        outb(PIT_CHANNEL0, lo);
        outb(PIT_CHANNEL0, hi);
    }
}
