//! Global Descriptor Table (GDT): x86_64
//!
//! Все задачи BlipOS работают в ring 0, пользовательских сегментов нет.
//! Every BlipOS task runs in ring 0, there are no user segments.
//!
//!  Индекс / Index  Сегмент / Segment
//!  ─────────────────────────────────
//!  0               Null descriptor (обязателен / required)
//!  1               Kernel Code  (ring 0, execute)
//!  2               Kernel Data  (ring 0, read/write)
//!  3–4             TSS          (16 байт / 16 bytes)

use core::mem::size_of;

// ── Селекторы сегментов / Segment selectors ───────────────────────────────────
pub const KERNEL_CODE: u16 = 0x08;
pub const KERNEL_DATA: u16 = 0x10;
pub const TSS_SEL:     u16 = 0x18;

/// Номер IST для Double Fault (1-based, как в дескрипторе IDT).
/// IST slot for Double Fault (1-based, as stored in the IDT descriptor).
pub const DOUBLE_FAULT_IST: u8 = 1;

const DOUBLE_FAULT_STACK_SIZE: usize = 16 * 1024;

#[derive(Clone, Copy)]
#[repr(C, packed)]
struct GdtEntry {
    limit_low:   u16,
    base_low:    u16,
    base_mid:    u8,
    access:      u8,
    granularity: u8,
    base_high:   u8,
}

impl GdtEntry {
    const fn null() -> Self {
        Self { limit_low: 0, base_low: 0, base_mid: 0,
               access: 0, granularity: 0, base_high: 0 }
    }
    const fn new(access: u8, granularity: u8) -> Self {
        Self { limit_low: 0xFFFF, base_low: 0, base_mid: 0,
               access, granularity, base_high: 0 }
    }
}

#[derive(Clone, Copy)]
#[repr(C, packed)]
struct TssEntry {
    limit_low:   u16,
    base_low:    u16,
    base_mid:    u8,
    access:      u8,
    granularity: u8,
    base_high:   u8,
    base_upper:  u32,
    reserved:    u32,
}

impl TssEntry {
    const fn new(tss_addr: u64) -> Self {
        let size = (size_of::<Tss>() - 1) as u64;
        Self {
            limit_low:   (size & 0xFFFF) as u16,
            base_low:    (tss_addr & 0xFFFF) as u16,
            base_mid:    ((tss_addr >> 16) & 0xFF) as u8,
            access:      0x89, // present, 64-bit TSS (available)
            granularity: ((size >> 16) & 0x0F) as u8,
            base_high:   ((tss_addr >> 24) & 0xFF) as u8,
            base_upper:  (tss_addr >> 32) as u32,
            reserved:    0,
        }
    }
}

/// TSS: в BlipOS нужен только ради IST.
/// TSS: BlipOS only needs it for the IST.
#[repr(C, packed)]
struct Tss {
    reserved0:  u32,
    rsp:        [u64; 3],
    reserved1:  u64,
    /// IST: 7 стеков для критических прерываний / 7 stacks for critical interrupts
    ist:        [u64; 7],
    reserved2:  u64,
    reserved3:  u16,
    iomap_base: u16,
}

const _: () = assert!(size_of::<Tss>() == 104);

impl Tss {
    const fn new(double_fault_stack_top: u64) -> Self {
        let mut ist = [0; 7];
        ist[DOUBLE_FAULT_IST as usize - 1] = double_fault_stack_top;
        Self {
            reserved0: 0, rsp: [0; 3], reserved1: 0,
            ist, reserved2: 0, reserved3: 0,
            iomap_base: size_of::<Tss>() as u16,
        }
    }
}

#[repr(C, packed)]
struct Gdt {
    null:        GdtEntry,
    kernel_code: GdtEntry,
    kernel_data: GdtEntry,
    tss:         TssEntry,
}

impl Gdt {
    const fn new(tss_addr: u64) -> Self {
        Self {
            null:        GdtEntry::null(),
            kernel_code: GdtEntry::new(0x9A, 0xA0), // ring 0, code, 64-bit
            kernel_data: GdtEntry::new(0x92, 0xC0), // ring 0, data
            tss:         TssEntry::new(tss_addr),
        }
    }
}

#[repr(C, packed)]
struct GdtDescriptor {
    size:   u16,
    offset: u64,
}

#[repr(C, align(16))]
struct IstStack([u8; DOUBLE_FAULT_STACK_SIZE]);

static mut DOUBLE_FAULT_STACK: IstStack = IstStack([0; DOUBLE_FAULT_STACK_SIZE]);

static mut TSS: Tss = Tss::new(0);
static mut GDT: Gdt = Gdt::new(0);

/// Инициализировать и загрузить GDT + TSS.
/// Initialize and load GDT + TSS.
///
/// Вызывается один раз, до включения прерываний.
/// Called once, before interrupts are enabled.
pub fn init() {
    unsafe {
        // 1. Вершина стека Double Fault → TSS.ist[0]
        let stack_top = (&raw const DOUBLE_FAULT_STACK) as u64 + DOUBLE_FAULT_STACK_SIZE as u64;
        *(&raw mut TSS) = Tss::new(stack_top);

        // 2. GDT с правильным адресом TSS
        *(&raw mut GDT) = Gdt::new((&raw const TSS) as u64);

        // 3. Загрузить GDTR
        let descriptor = GdtDescriptor {
            size:   (size_of::<Gdt>() - 1) as u16,
            offset: (&raw const GDT) as u64,
        };

        core::arch::asm!(
            "lgdt [{desc}]",
            // Обновить регистры данных / Update data registers
            "mov ax, {kdata}",
            "mov ds, ax",
            "mov es, ax",
            "mov fs, ax",
            "mov gs, ax",
            "mov ss, ax",
            // Обновить CS через far return / Update CS via far return
            "push {kcode}",
            "lea rax, [rip + 2f]",
            "push rax",
            "retfq",
            "2:",
            // Загрузить TSS / Load TSS
            "ltr {tss:x}",
            desc  = in(reg) &descriptor,
            kcode = const KERNEL_CODE as u64,
            kdata = const KERNEL_DATA,
            tss   = in(reg) TSS_SEL,
            out("rax") _,
        );
    }
}
