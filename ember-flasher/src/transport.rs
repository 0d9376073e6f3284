// SPDX-License-Identifier: MIT

//! SocketCAN transport: one protocol message per classic 8-byte CAN frame.

use anyhow::{anyhow, Context, Result};
use socketcan::{CanFrame, CanSocket, EmbeddedFrame, Socket, StandardId};

use ember_common::protocol::{Message, BOOTLOADER_CAN_ID};

pub struct Transport {
    socket: CanSocket,
    ecu_id: u8,
}

impl Transport {
    pub fn new(interface: &str, ecu_id: u8) -> Result<Self> {
        let socket = CanSocket::open(interface)
            .with_context(|| format!("Failed to open CAN interface {interface}"))?;
        Ok(Self { socket, ecu_id })
    }

    /// ECU id stamped into outgoing messages.
    pub fn ecu_id(&self) -> u8 {
        self.ecu_id
    }

    /// Encode and transmit one protocol message.
    pub fn send(&mut self, message: &Message) -> Result<()> {
        let id = StandardId::new(BOOTLOADER_CAN_ID)
            .ok_or_else(|| anyhow!("bootloader CAN id out of range"))?;
        let frame = CanFrame::new(id, &message.encode())
            .ok_or_else(|| anyhow!("frame payload too large"))?;
        self.socket
            .write_frame(&frame)
            .context("Failed to write CAN frame")?;
        Ok(())
    }
}
