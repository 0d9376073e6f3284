// SPDX-License-Identifier: MIT

//! Persistent boot state and the transient flashing session.
//!
//! The boot record lives in a dedicated non-volatile region as five
//! consecutive words and is only ever mutated through [`Nvm::write_word`];
//! the in-memory [`BootRecord`] is a read-out snapshot, never a source of
//! truth. The [`FlashSession`] is volatile and owned by the flashing
//! handlers for the duration of one transfer.
//!
//! All addresses in this crate are word-granular (one address = one 32-bit
//! word); the firmware's NVM driver maps them to byte addresses.

use crate::hal::{Nvm, NvmError};

/// Sentinel distinguishing provisioned boot storage from blank flash.
pub const BOOT_RECORD_MAGIC: u32 = 0xDEAD_BEEF;

/// Word offsets of the boot record fields within its NVM region.
mod offset {
    pub const MAGIC: u32 = 0;
    pub const BOOT_FLAG: u32 = 1;
    pub const SAVED_CRC: u32 = 2;
    pub const SAVED_APP_LENGTH: u32 = 3;
    pub const APP_FLASH_START: u32 = 4;
}

/// Persisted boot decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootFlag {
    IdleInRecovery,
    FlashNewApp,
    BootToApp,
    /// Force-recovery sentinel, written when the record magic is absent.
    Invalid,
}

impl BootFlag {
    /// Stored value of the force-recovery sentinel.
    const INVALID_WORD: u32 = 0xFA;

    pub fn from_word(word: u32) -> Self {
        match word {
            0 => Self::IdleInRecovery,
            1 => Self::FlashNewApp,
            2 => Self::BootToApp,
            _ => Self::Invalid,
        }
    }

    pub fn to_word(self) -> u32 {
        match self {
            Self::IdleInRecovery => 0,
            Self::FlashNewApp => 1,
            Self::BootToApp => 2,
            Self::Invalid => Self::INVALID_WORD,
        }
    }
}

impl From<crate::protocol::OperationMode> for BootFlag {
    fn from(mode: crate::protocol::OperationMode) -> Self {
        use crate::protocol::OperationMode;
        match mode {
            OperationMode::IdleInRecovery => Self::IdleInRecovery,
            OperationMode::FlashNewApp => Self::FlashNewApp,
            OperationMode::BootToApp => Self::BootToApp,
        }
    }
}

/// Where the boot record and the application image live in the word-addressed
/// NVM space. Threaded explicitly through the FSM so tests can run against a
/// small in-memory flash.
#[derive(Clone, Copy, Debug)]
pub struct FlashLayout {
    /// First word of the boot record region.
    pub boot_record_base: u32,
    /// Image base address, fixed for the one application slot.
    pub app_flash_start: u32,
}

impl FlashLayout {
    /// On-target layout: boot record at byte 0x0800_C000, application image
    /// at byte 0x0801_0000 (word addresses, byte / 4).
    pub const DEVICE: FlashLayout = FlashLayout {
        boot_record_base: 0x0200_3000,
        app_flash_start: 0x0200_4000,
    };

    pub fn read_boot_flag(&self, nvm: &impl Nvm) -> BootFlag {
        BootFlag::from_word(nvm.read_word(self.boot_record_base + offset::BOOT_FLAG))
    }

    pub fn write_boot_flag(&self, nvm: &mut impl Nvm, flag: BootFlag) -> Result<(), NvmError> {
        nvm.write_word(self.boot_record_base + offset::BOOT_FLAG, flag.to_word())
    }

    pub fn write_saved_crc(&self, nvm: &mut impl Nvm, crc: u32) -> Result<(), NvmError> {
        nvm.write_word(self.boot_record_base + offset::SAVED_CRC, crc)
    }

    pub fn write_saved_app_length(
        &self,
        nvm: &mut impl Nvm,
        length: u32,
    ) -> Result<(), NvmError> {
        nvm.write_word(self.boot_record_base + offset::SAVED_APP_LENGTH, length)
    }
}

/// Read-out snapshot of the persisted boot record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BootRecord {
    pub magic: u32,
    pub boot_flag: BootFlag,
    pub saved_crc: u32,
    pub saved_app_length: u32,
    pub app_flash_start: u32,
}

impl BootRecord {
    pub fn load(nvm: &impl Nvm, layout: &FlashLayout) -> Self {
        let base = layout.boot_record_base;
        Self {
            magic: nvm.read_word(base + offset::MAGIC),
            boot_flag: BootFlag::from_word(nvm.read_word(base + offset::BOOT_FLAG)),
            saved_crc: nvm.read_word(base + offset::SAVED_CRC),
            saved_app_length: nvm.read_word(base + offset::SAVED_APP_LENGTH),
            app_flash_start: nvm.read_word(base + offset::APP_FLASH_START),
        }
    }

    pub fn is_provisioned(&self) -> bool {
        self.magic == BOOT_RECORD_MAGIC
    }
}

/// Volatile state of one in-progress image transfer. Discarded and
/// reinitialized on entry to the metadata-wait state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlashSession {
    /// Expected CRC announced by the metadata message.
    pub temp_crc: u32,
    /// Image length in words announced by the metadata message.
    pub temp_length: u32,
    /// Next word address to program.
    pub cursor: u32,
    /// One past the last word address of the image.
    pub end: u32,
}

impl FlashSession {
    pub fn begin(layout: &FlashLayout, length: u32, crc: u32) -> Self {
        Self {
            temp_crc: crc,
            temp_length: length,
            cursor: layout.app_flash_start,
            end: layout.app_flash_start + length,
        }
    }

    /// All announced words have been programmed.
    pub fn is_complete(&self) -> bool {
        self.cursor == self.end
    }
}
