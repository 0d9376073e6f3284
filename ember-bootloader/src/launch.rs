// SPDX-License-Identifier: MIT

//! Hand-off to the flashed application: interrupt teardown, vector table
//! relocation, stack pointer load, and the jump.

use crate::flash;

const NVIC_ICER: *mut u32 = 0xE000_E180 as *mut u32;
const NVIC_ICPR: *mut u32 = 0xE000_E280 as *mut u32;
const SCB_VTOR: *mut u32 = 0xE000_ED08 as *mut u32;

/// Jump to the image whose vector table sits at the given word address.
///
/// Sanity-checks the image's initial stack pointer first; an image that was
/// never flashed (erased cells) is declined by returning, which the FSM
/// treats as a failed launch and routes to recovery.
pub fn launch(entry: u32) {
    let vector_base = entry << 2;
    let initial_sp = flash::read_word(entry);
    let reset_vector = flash::read_word(entry + 1);

    // Erased flash reads back all ones; a real stack pointer lands in SRAM.
    if initial_sp & 0xFFF0_0000 != 0x2000_0000 {
        defmt::warn!("no bootable image at 0x{:08x}", vector_base);
        return;
    }

    defmt::println!("launching application at 0x{:08x}", vector_base);

    unsafe {
        cortex_m::interrupt::disable();
        NVIC_ICER.write_volatile(0xFFFF_FFFF);
        NVIC_ICPR.write_volatile(0xFFFF_FFFF);

        SCB_VTOR.write_volatile(vector_base);
        cortex_m::asm::dsb();
        cortex_m::asm::isb();

        core::arch::asm!(
            "msr msp, {sp}",
            "cpsie i", // the application expects PRIMASK clear
            "bx {reset}",
            sp = in(reg) initial_sp,
            reset = in(reg) reset_vector,
            options(noreturn)
        );
    }
}
