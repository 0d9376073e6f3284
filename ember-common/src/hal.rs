// SPDX-License-Identifier: MIT

//! Collaborator interfaces between the protocol core and the hardware.
//!
//! The FSM is generic over one [`EcuHal`] value implementing all of these,
//! so the firmware passes its peripheral drivers and tests pass an in-memory
//! mock. Addresses are word-granular throughout (see [`crate::state`]).

use crate::protocol::Frame;

/// Non-volatile programming failure, surfaced by the write primitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NvmError {
    /// The memory is locked against programming.
    Locked,
    /// Programming failed at the given word address.
    Program { addr: u32 },
}

/// Non-volatile memory, word-granular.
///
/// `write_word` performs erase-then-program or equivalent for one word and is
/// safe to call repeatedly at increasing addresses.
pub trait Nvm {
    fn write_word(&mut self, addr: u32, value: u32) -> Result<(), NvmError>;
    fn read_word(&self, addr: u32) -> u32;
}

/// Checksum peripheral: sequential accumulation of each word in a region
/// into a running register, read out after the last word. The reference
/// algorithm is [`crate::checksum::checksum_words`].
pub trait Checksum {
    fn compute_over_region(&mut self, start: u32, length: u32) -> u32;
}

/// Field-bus driver. Reception is push-only: the RX interrupt delivers
/// frames into the queue outside the core's control.
pub trait CanBus {
    fn init(&mut self) -> bool;
    /// Bounded blocking transmit; `false` after the driver's retry budget is
    /// exhausted. The core reports the failure and moves on, never re-sends.
    fn send(&mut self, frame: &Frame) -> bool;
    fn deinit(&mut self);
}

/// Hands control to the flashed application: tears down peripherals and
/// jumps to the image's entry point. A real implementation diverges; if it
/// returns, the core treats the launch as declined and falls back to
/// recovery.
pub trait AppLauncher {
    fn launch(&mut self, entry: u32);
}

/// The full collaborator set threaded through the FSM.
pub trait EcuHal: Nvm + Checksum + CanBus + AppLauncher {
    /// Low-power wait until the next interrupt; called by the main loop when
    /// the queue is empty. No timeout: the system waits for bus activity.
    fn wait_for_event(&mut self) {}
}
