//! HAL: Hardware Abstraction Layer
//!
//! Пока только x86_64: кадр переключения в libblip описан под него.
//! x86_64 only for now: the switch frame in libblip is laid out for it.

#[cfg(target_arch = "x86_64")]
pub mod x86_64;
#[cfg(target_arch = "x86_64")]
pub use x86_64 as current;

/// Инициализация платформы: вызывается из kernel_main после UART.
/// Platform initialization: called from kernel_main right after the UART.
pub fn init() {
    current::init();
}
