//! Kernel-space drivers
//!
//!   - UART/Serial, отладочный вывод в терминал QEMU / debug output

pub mod uart;

/// Макрос для отладочного вывода.
/// Debug print macro.
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => {
        $crate::drivers::uart::_print(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! kprintln {
    ()           => ($crate::kprint!("\n"));
    ($($arg:tt)*) => ($crate::kprint!("{}\n", format_args!($($arg)*)));
}

/// Вывод без замка UART: только для panic handler.
/// Output bypassing the UART lock: panic handler only.
#[macro_export]
macro_rules! kprintln_unlocked {
    ($($arg:tt)*) => {
        $crate::drivers::uart::_print_unlocked(format_args!("{}\n", format_args!($($arg)*)))
    };
}
