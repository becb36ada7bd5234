//! BlipOS Kernel: точка входа / entry point

#![no_std]
#![no_main]
#![deny(unsafe_op_in_unsafe_fn)]

use core::panic::PanicInfo;

use libblip::config::TICK_HZ;
use limine::request::{RequestsEndMarker, RequestsStartMarker};
use limine::BaseRevision;
use log::{info, warn};

mod arch;
mod drivers;
mod klog;
mod sched;

// ── Запросы Limine / Limine requests ─────────────────────────────────────────

#[used]
#[link_section = ".requests"]
static BASE_REVISION: BaseRevision = BaseRevision::new();

#[used]
#[link_section = ".requests_start_marker"]
static _START_MARKER: RequestsStartMarker = RequestsStartMarker::new();

#[used]
#[link_section = ".requests_end_marker"]
static _END_MARKER: RequestsEndMarker = RequestsEndMarker::new();

/// Точка входа ядра: вызывается из `_start` (arch/x86_64/boot.rs).
/// Kernel entry point: called from `_start` (arch/x86_64/boot.rs).
#[no_mangle]
pub extern "C" fn kernel_main() -> ! {
    // 0. UART + логгер: первым делом / first of all
    drivers::uart::init();
    klog::init();
    kprintln!("BlipOS booting...");

    if !BASE_REVISION.is_supported() {
        warn!("limine base revision not acknowledged by the bootloader");
    }

    // 1. GDT/TSS + IDT + PIC, прерывания ещё выключены / interrupts still off
    arch::init();
    info!("GDT, IDT and PIC ready, timer line unmasked");

    // 2. Планировщик: текущий код становится задачей 0
    //    Scheduler: the running code becomes task 0
    sched::init();
    sched::tasks::spawn_demo_tasks();

    // 3. Таймер и поехали / Timer, and off we go
    arch::current::pit::init(TICK_HZ);
    info!("PIT at {} Hz, enabling interrupts", TICK_HZ);
    arch::current::enable_interrupts();

    sched::idle();
}

/// Panic handler: UART в обход замка и halt.
/// Panic handler: UART bypassing its lock, then halt.
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    arch::current::disable_interrupts();
    kprintln_unlocked!("\n[KERNEL PANIC] {}", info);
    arch::current::halt_forever();
}
