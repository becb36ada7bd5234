//! x86_64 boot entry point
//!
//! Limine прыгает сюда в 64-битном long mode с выключенными прерываниями;
//! .bss уже обнулён загрузчиком при загрузке ELF.
//! Limine jumps here in 64-bit long mode with interrupts disabled; .bss is
//! already zero-filled by the loader.
//!
//! Этот стек становится стеком задачи 0 (idle): первый тик таймера сохранит
//! её кадр прямо здесь.
//! This stack becomes task 0's (idle) stack: the first timer tick saves its
//! frame right here.

use core::arch::global_asm;

global_asm!(
    r#"
.section .text
.global _start
_start:
    cli

    /* Switch to our 64KB boot stack */
    leaq boot_stack_top(%rip), %rsp
    andq $-16, %rsp
    xorl %ebp, %ebp

    callq kernel_main

    /* kernel_main never returns: halt just in case */
.hang:
    cli
    hlt
    jmp .hang

.section .bss
.balign 16
boot_stack_bottom:
    .skip 65536
boot_stack_top:
"#,
    options(att_syntax)
);
