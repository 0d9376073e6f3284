// SPDX-License-Identifier: MIT

//! Software reference for the ECU's CRC peripheral.
//!
//! The hardware unit is the STM32-style CRC-32/MPEG-2 register (polynomial
//! 0x04C11DB7, init 0xFFFFFFFF, unreflected, no final xor), which consumes
//! whole words most-significant byte first. Host tools and tests use this
//! function; the firmware reads the same value out of the peripheral.

use crc::{Crc, CRC_32_MPEG_2};

pub const CRC32_MPEG2: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

/// Accumulate a sequence of words exactly as the CRC unit would.
pub fn checksum_words(words: impl IntoIterator<Item = u32>) -> u32 {
    let mut digest = CRC32_MPEG2.digest();
    for word in words {
        digest.update(&word.to_be_bytes());
    }
    digest.finalize()
}
