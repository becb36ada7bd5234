//! Interrupt Descriptor Table (IDT): x86_64
//!
//! Заполнены только нужные векторы, остальные отсутствуют (#NP → #DF).
//! Only the vectors we need are filled; the rest are absent (#NP → #DF).
//!
//! Векторы / Vectors:
//!   0x00 #DE   Division Error
//!   0x06 #UD   Invalid Opcode
//!   0x08 #DF   Double Fault     (IST1, отдельный стек / own stack)
//!   0x0D #GP   General Protection Fault
//!   0x0E #PF   Page Fault
//!   0x20       Timer IRQ        → вытеснение / preemption
//!   0x27       Spurious IRQ7

use core::arch::asm;
use core::mem::size_of;

use bitflags::bitflags;

use super::context::isr_timer;
use super::gdt::{DOUBLE_FAULT_IST, KERNEL_CODE};
use super::pic;

pub use libblip::frame::InterruptFrame;

// ── Атрибуты шлюза / Gate attributes ─────────────────────────────────────────

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GateFlags: u8 {
        /// 64-bit interrupt gate (IF сбрасывается / IF cleared)
        const INTERRUPT_GATE = 0x0E;
        const DPL_RING3      = 0b11 << 5;
        const PRESENT        = 1 << 7;
    }
}

impl GateFlags {
    /// Present | ring 0 | Interrupt Gate = 0x8E
    pub const KERNEL_INTERRUPT: Self = Self::PRESENT.union(Self::INTERRUPT_GATE);
}

// ── Дескриптор прерывания / Interrupt descriptor (16 байт) ───────────────────

#[derive(Clone, Copy)]
#[repr(C, packed)]
struct IdtEntry {
    offset_low:  u16, // биты 0–15 обработчика  / handler bits 0–15
    selector:    u16, // сегмент кода / code segment (KERNEL_CODE)
    ist:         u8,  // Interrupt Stack Table index (0 = не использовать)
    type_attr:   u8,
    offset_mid:  u16, // биты 16–31 обработчика / handler bits 16–31
    offset_high: u32, // биты 32–63 обработчика / handler bits 32–63
    reserved:    u32,
}

impl IdtEntry {
    const fn missing() -> Self {
        Self {
            offset_low: 0, selector: 0, ist: 0,
            type_attr: 0, offset_mid: 0,
            offset_high: 0, reserved: 0,
        }
    }

    fn new(handler: u64, selector: u16, ist: u8, flags: GateFlags) -> Self {
        Self {
            offset_low:  (handler & 0xFFFF) as u16,
            selector,
            ist,
            type_attr:   flags.bits(),
            offset_mid:  ((handler >> 16) & 0xFFFF) as u16,
            offset_high: (handler >> 32) as u32,
            reserved:    0,
        }
    }
}

const _: () = assert!(size_of::<IdtEntry>() == 16);

// ── IDTR ─────────────────────────────────────────────────────────────────────

#[repr(C, packed)]
struct IdtDescriptor {
    size:   u16,
    offset: u64,
}

// ── Таблица IDT / IDT table ───────────────────────────────────────────────────

const IDT_SIZE: usize = 256;
static mut IDT: [IdtEntry; IDT_SIZE] = [IdtEntry::missing(); IDT_SIZE];

// ── Макросы для заглушек / Stub macros ────────────────────────────────────────
//
// Обработчики исключений не возвращаются, поэтому заглушке достаточно
// передать (frame, error) в rdi/rsi и выровнять стек.
// Exception handlers never return, so a stub only has to pass
// (frame, error) in rdi/rsi and align the stack.

/// Исключение без error code / Exception without an error code
macro_rules! isr_fault {
    ($name:ident, $handler:path) => {
        #[unsafe(naked)]
        unsafe extern "C" fn $name() {
            core::arch::naked_asm!(
                "mov rdi, rsp",
                "xor esi, esi",
                "and rsp, -16",
                "call {handler}",
                "ud2",
                handler = sym $handler,
            );
        }
    };
}

/// Исключение с error code поверх кадра / Exception with an error code above the frame
macro_rules! isr_fault_err {
    ($name:ident, $handler:path) => {
        #[unsafe(naked)]
        unsafe extern "C" fn $name() {
            core::arch::naked_asm!(
                "pop rsi",
                "mov rdi, rsp",
                "and rsp, -16",
                "call {handler}",
                "ud2",
                handler = sym $handler,
            );
        }
    };
}

// ── Обработчики исключений / Exception handlers ───────────────────────────────

extern "C" fn handle_divide_error(frame: &InterruptFrame, _error: u64) -> ! {
    panic!("Division Error at RIP={:#x}", frame.rip);
}

extern "C" fn handle_invalid_opcode(frame: &InterruptFrame, _error: u64) -> ! {
    panic!("Invalid Opcode at RIP={:#x}", frame.rip);
}

extern "C" fn handle_double_fault(frame: &InterruptFrame, error: u64) -> ! {
    panic!("Double Fault (error={:#x}) at RIP={:#x}", error, frame.rip);
}

extern "C" fn handle_general_protection(frame: &InterruptFrame, error: u64) -> ! {
    panic!("General Protection Fault (error={:#x}) at RIP={:#x}", error, frame.rip);
}

extern "C" fn handle_page_fault(frame: &InterruptFrame, error: u64) -> ! {
    // Виновный виртуальный адрес: в регистре CR2
    // Faulting virtual address is in CR2
    let cr2: u64;
    unsafe { asm!("mov {}, cr2", out(reg) cr2, options(nomem, nostack, preserves_flags)) };
    panic!(
        "Page Fault at RIP={:#x} addr={:#x} error={:#x}",
        frame.rip, cr2, error
    );
}

isr_fault!(isr_divide_error,         handle_divide_error);
isr_fault!(isr_invalid_opcode,       handle_invalid_opcode);
isr_fault_err!(isr_double_fault,     handle_double_fault);
isr_fault_err!(isr_gp_fault,         handle_general_protection);
isr_fault_err!(isr_page_fault,       handle_page_fault);

// ── Spurious IRQ7 ─────────────────────────────────────────────────────────────

extern "C" fn handle_spurious() {
    // Ложное прерывание EOI не получает / A spurious IRQ gets no EOI
    if pic::irq7_in_service() {
        pic::end_of_interrupt(pic::IRQ_SPURIOUS);
    }
}

/// Возвращается в прерванный код, поэтому сохраняет caller-saved регистры.
/// Returns into the interrupted code, so it preserves caller-saved registers.
#[unsafe(naked)]
unsafe extern "C" fn isr_spurious() {
    core::arch::naked_asm!(
        "push rax",
        "push rcx",
        "push rdx",
        "push rsi",
        "push rdi",
        "push r8",
        "push r9",
        "push r10",
        "push r11",
        "cld",
        "call {handler}",
        "pop r11",
        "pop r10",
        "pop r9",
        "pop r8",
        "pop rdi",
        "pop rsi",
        "pop rdx",
        "pop rcx",
        "pop rax",
        "iretq",
        handler = sym handle_spurious,
    );
}

// ── Инициализация / Initialization ───────────────────────────────────────────

/// Инициализировать IDT и загрузить IDTR. Прерывания не включает.
/// Initialize the IDT and load IDTR. Does not enable interrupts.
pub fn init() {
    let set = |vec: u8, handler: unsafe extern "C" fn(), ist: u8| {
        let entry = IdtEntry::new(handler as usize as u64, KERNEL_CODE, ist, GateFlags::KERNEL_INTERRUPT);
        unsafe { (*(&raw mut IDT))[usize::from(vec)] = entry };
    };

    // Исключения процессора / CPU exceptions
    set(0x00, isr_divide_error,   0);
    set(0x06, isr_invalid_opcode, 0);
    set(0x08, isr_double_fault,   DOUBLE_FAULT_IST);
    set(0x0D, isr_gp_fault,       0);
    set(0x0E, isr_page_fault,     0);

    // IRQ после ремаппинга / IRQ after remapping
    set(pic::vector(pic::IRQ_TIMER),    isr_timer,    0);
    set(pic::vector(pic::IRQ_SPURIOUS), isr_spurious, 0);

    let descriptor = IdtDescriptor {
        size:   (size_of::<[IdtEntry; IDT_SIZE]>() - 1) as u16,
        offset: (&raw const IDT) as u64,
    };
    unsafe { asm!("lidt [{desc}]", desc = in(reg) &descriptor, options(readonly, nostack, preserves_flags)) };
}
