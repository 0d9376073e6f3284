// SPDX-License-Identifier: MIT

//! Protocol core for the ember CAN bootloader.
//!
//! Everything in this crate is hardware-independent: the frame queue, the
//! wire-format decoder, the persistent/transient boot state model, and the
//! update FSM. Hardware enters only through the collaborator traits in
//! [`hal`], so the whole protocol is testable on the host.
//!
//! - Default: `no_std` mode for the firmware target
//! - `std` feature: enables `std` for host tools

#![cfg_attr(not(feature = "std"), no_std)]

pub mod checksum;
pub mod fsm;
pub mod hal;
pub mod protocol;
pub mod queue;
pub mod state;

// Re-export commonly used types
pub use fsm::{Bootloader, FsmState};
pub use hal::{AppLauncher, CanBus, Checksum, Nvm, NvmError};
pub use protocol::{Frame, Message, MessageKind, OperationMode};
pub use queue::{Consumer, Producer, SpscQueue};
pub use state::{BootFlag, BootRecord, FlashLayout, FlashSession, BOOT_RECORD_MAGIC};
