// SPDX-License-Identifier: MIT

//! In-memory ECU used by the integration tests: word-addressed flash, the
//! software CRC reference, and recording stubs for the bus and launcher.

use std::collections::BTreeMap;

use ember_common::checksum::checksum_words;
use ember_common::hal::{AppLauncher, CanBus, Checksum, EcuHal, Nvm, NvmError};
use ember_common::protocol::Frame;
use ember_common::state::{FlashLayout, BOOT_RECORD_MAGIC};
use ember_common::BootFlag;

/// Small word-addressed layout for tests.
pub const LAYOUT: FlashLayout = FlashLayout {
    boot_record_base: 0x100,
    app_flash_start: 0x200,
};

const ERASED: u32 = 0xFFFF_FFFF;

#[derive(Default)]
pub struct MockEcu {
    pub flash: BTreeMap<u32, u32>,
    /// When set, every write fails with `NvmError::Program`.
    pub fail_writes: bool,
    /// Entry addresses passed to `launch`. The mock always returns, which the
    /// core treats as a declined launch.
    pub launched: Vec<u32>,
    pub deinit_calls: u32,
}

impl MockEcu {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock whose boot record is provisioned with the given flag.
    pub fn provisioned(flag: BootFlag) -> Self {
        let mut ecu = Self::new();
        ecu.flash.insert(LAYOUT.boot_record_base, BOOT_RECORD_MAGIC);
        ecu.flash
            .insert(LAYOUT.boot_record_base + 1, flag.to_word());
        ecu
    }

    /// Direct word read without going through the `Nvm` trait.
    pub fn read_word_at(&self, addr: u32) -> u32 {
        self.flash.get(&addr).copied().unwrap_or(ERASED)
    }
}

impl Nvm for MockEcu {
    fn write_word(&mut self, addr: u32, value: u32) -> Result<(), NvmError> {
        if self.fail_writes {
            return Err(NvmError::Program { addr });
        }
        self.flash.insert(addr, value);
        Ok(())
    }

    fn read_word(&self, addr: u32) -> u32 {
        self.read_word_at(addr)
    }
}

impl Checksum for MockEcu {
    fn compute_over_region(&mut self, start: u32, length: u32) -> u32 {
        checksum_words((start..start + length).map(|a| self.read_word(a)))
    }
}

impl CanBus for MockEcu {
    fn init(&mut self) -> bool {
        true
    }

    fn send(&mut self, _frame: &Frame) -> bool {
        true
    }

    fn deinit(&mut self) {
        self.deinit_calls += 1;
    }
}

impl AppLauncher for MockEcu {
    fn launch(&mut self, entry: u32) {
        self.launched.push(entry);
    }
}

impl EcuHal for MockEcu {}
