// SPDX-License-Identifier: MIT

//! Word programming via the flash interface and checksum readout via the
//! CRC unit. Both present the word-granular address space the protocol core
//! expects: one address = one 32-bit word, byte address = word address * 4.

use ember_common::hal::NvmError;

const FLASH_BASE: u32 = 0x4002_3C00;
const FLASH_KEYR: *mut u32 = (FLASH_BASE + 0x04) as *mut u32;
const FLASH_SR: *mut u32 = (FLASH_BASE + 0x0C) as *mut u32;
const FLASH_CR: *mut u32 = (FLASH_BASE + 0x10) as *mut u32;

// Flash magic numbers obtained from the family reference manual
const FLASH_KEY_1: u32 = 0x4567_0123;
const FLASH_KEY_2: u32 = 0xCDEF_89AB;

const SR_BSY: u32 = 1 << 16;
const SR_ERROR_MASK: u32 = (1 << 7) | (1 << 6) | (1 << 5) | (1 << 4);
const CR_PG: u32 = 1 << 0;
const CR_PSIZE_X32: u32 = 0b10 << 8;
const CR_PSIZE_MASK: u32 = 0b11 << 8;
const CR_LOCK: u32 = 1 << 31;

const CRC_BASE: u32 = 0x4002_3000;
const CRC_DR: *mut u32 = CRC_BASE as *mut u32;
const CRC_CR: *mut u32 = (CRC_BASE + 0x08) as *mut u32;
const CRC_CR_RESET: u32 = 1 << 0;

#[inline]
fn byte_addr(word_addr: u32) -> u32 {
    word_addr << 2
}

fn wait_not_busy() {
    while unsafe { FLASH_SR.read_volatile() } & SR_BSY != 0 {
        core::hint::spin_loop();
    }
}

/// Program one word. The target region is erased ahead of a transfer by the
/// host-driven protocol, so programming proceeds at increasing addresses
/// over erased cells.
pub fn write_word(addr: u32, value: u32) -> Result<(), NvmError> {
    unsafe {
        if FLASH_CR.read_volatile() & CR_LOCK != 0 {
            FLASH_KEYR.write_volatile(FLASH_KEY_1);
            FLASH_KEYR.write_volatile(FLASH_KEY_2);
            if FLASH_CR.read_volatile() & CR_LOCK != 0 {
                return Err(NvmError::Locked);
            }
        }

        wait_not_busy();
        FLASH_SR.write_volatile(SR_ERROR_MASK); // clear stale error flags
        FLASH_CR.write_volatile(
            (FLASH_CR.read_volatile() & !CR_PSIZE_MASK) | CR_PSIZE_X32 | CR_PG,
        );

        (byte_addr(addr) as *mut u32).write_volatile(value);
        wait_not_busy();

        FLASH_CR.write_volatile(FLASH_CR.read_volatile() & !CR_PG);

        if FLASH_SR.read_volatile() & SR_ERROR_MASK != 0 {
            FLASH_SR.write_volatile(SR_ERROR_MASK);
            return Err(NvmError::Program { addr });
        }
    }
    Ok(())
}

pub fn read_word(addr: u32) -> u32 {
    unsafe { (byte_addr(addr) as *const u32).read_volatile() }
}

/// Feed `length` words starting at `start` through the CRC unit and read the
/// accumulated value back. Matches `ember_common::checksum::checksum_words`.
pub fn compute_over_region(start: u32, length: u32) -> u32 {
    unsafe {
        CRC_CR.write_volatile(CRC_CR_RESET);
        for addr in start..start + length {
            CRC_DR.write_volatile(read_word(addr));
        }
        CRC_DR.read_volatile()
    }
}
