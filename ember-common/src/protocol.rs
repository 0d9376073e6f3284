// SPDX-License-Identifier: MIT

//! Bus wire format: one 64-bit word per 8-byte CAN frame.
//!
//! Fields are packed low-to-high in the little-endian frame payload:
//!
//! ```text
//! bits[0:4)   message kind (0=NONE, 1=FLAG_SET, 2=METADATA, 3=APP_DATA)
//! bits[4:8)   ecu id (carried, not interpreted by the core)
//! FLAG_SET:   bits[8:10)  operation mode (2 bits)
//! METADATA:   bits[8:32)  application length in words (24 bits)
//!             bits[32:64) expected CRC32 (32 bits)
//! APP_DATA:   bits[8:40)  one program word (32 bits)
//! ```
//!
//! Any kind outside 0..=3 makes the frame invalid; it never reaches the FSM.
//! Decoding is a pure function of the frame bytes, one explicit sum type
//! instead of overlapping bitfield views of the same word.

/// Raw bus frame payload, opaque at the queue layer.
pub type Frame = [u8; 8];

/// CAN identifier the ECU listens on for bootloader traffic. The device-side
/// filter accepts everything; this is the id host tools transmit with.
pub const BOOTLOADER_CAN_ID: u16 = 0x7E1;

const KIND_MASK: u64 = 0xF;
const ECU_ID_SHIFT: u32 = 4;
const PAYLOAD_SHIFT: u32 = 8;
const MODE_MASK: u64 = 0b11;
const APP_LENGTH_MASK: u64 = 0x00FF_FFFF;

/// Message discriminant as carried in the low 4 wire bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    None = 0x0,
    FlagSet = 0x1,
    Metadata = 0x2,
    AppData = 0x3,
}

impl MessageKind {
    fn from_bits(bits: u64) -> Option<Self> {
        match bits {
            0x0 => Some(Self::None),
            0x1 => Some(Self::FlagSet),
            0x2 => Some(Self::Metadata),
            0x3 => Some(Self::AppData),
            _ => None,
        }
    }
}

/// Requested boot behaviour carried by FLAG_SET.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationMode {
    IdleInRecovery = 0,
    FlashNewApp = 1,
    BootToApp = 2,
}

impl OperationMode {
    /// The wire field is 2 bits; the unassigned value 3 lands on
    /// `IdleInRecovery`, which the flag check routes to recovery anyway.
    fn from_bits(bits: u64) -> Self {
        match bits & MODE_MASK {
            1 => Self::FlashNewApp,
            2 => Self::BootToApp,
            _ => Self::IdleInRecovery,
        }
    }
}

/// A decoded protocol message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Message {
    /// Internal/automatic step trigger; carries no payload.
    None { ecu_id: u8 },
    /// Persist a new boot flag.
    FlagSet { ecu_id: u8, mode: OperationMode },
    /// Image metadata ahead of a transfer: length in words + expected CRC.
    Metadata { ecu_id: u8, app_length: u32, crc: u32 },
    /// One program word of the streamed image.
    AppData { ecu_id: u8, word: u32 },
}

impl Message {
    /// Decode a raw frame. Returns `None` for an out-of-range kind; such
    /// frames are dropped before dispatch.
    pub fn decode(frame: &Frame) -> Option<Message> {
        let word = u64::from_le_bytes(*frame);
        let kind = MessageKind::from_bits(word & KIND_MASK)?;
        let ecu_id = ((word >> ECU_ID_SHIFT) & 0xF) as u8;
        let payload = word >> PAYLOAD_SHIFT;

        Some(match kind {
            MessageKind::None => Message::None { ecu_id },
            MessageKind::FlagSet => Message::FlagSet {
                ecu_id,
                mode: OperationMode::from_bits(payload),
            },
            MessageKind::Metadata => Message::Metadata {
                ecu_id,
                app_length: (payload & APP_LENGTH_MASK) as u32,
                crc: (word >> 32) as u32,
            },
            MessageKind::AppData => Message::AppData {
                ecu_id,
                word: payload as u32,
            },
        })
    }

    /// Encode into a raw frame, the exact inverse of [`Message::decode`].
    pub fn encode(&self) -> Frame {
        let word = match *self {
            Message::None { ecu_id } => header(MessageKind::None, ecu_id),
            Message::FlagSet { ecu_id, mode } => {
                header(MessageKind::FlagSet, ecu_id) | ((mode as u64) << PAYLOAD_SHIFT)
            }
            Message::Metadata {
                ecu_id,
                app_length,
                crc,
            } => {
                header(MessageKind::Metadata, ecu_id)
                    | ((u64::from(app_length) & APP_LENGTH_MASK) << PAYLOAD_SHIFT)
                    | (u64::from(crc) << 32)
            }
            Message::AppData { ecu_id, word } => {
                header(MessageKind::AppData, ecu_id) | (u64::from(word) << PAYLOAD_SHIFT)
            }
        };
        word.to_le_bytes()
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Message::None { .. } => MessageKind::None,
            Message::FlagSet { .. } => MessageKind::FlagSet,
            Message::Metadata { .. } => MessageKind::Metadata,
            Message::AppData { .. } => MessageKind::AppData,
        }
    }

    pub fn ecu_id(&self) -> u8 {
        match *self {
            Message::None { ecu_id }
            | Message::FlagSet { ecu_id, .. }
            | Message::Metadata { ecu_id, .. }
            | Message::AppData { ecu_id, .. } => ecu_id,
        }
    }
}

fn header(kind: MessageKind, ecu_id: u8) -> u64 {
    (kind as u64) | (u64::from(ecu_id & 0xF) << ECU_ID_SHIFT)
}
