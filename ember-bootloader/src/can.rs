// SPDX-License-Identifier: MIT

//! bxCAN driver for CAN1: init with an accept-all filter, bounded-retry
//! transmit, and the RX-FIFO drain called from interrupt context.

use ember_common::protocol::Frame;
use ember_common::queue::Producer;

const CAN1_BASE: u32 = 0x4000_6400;

const CAN_MCR: *mut u32 = CAN1_BASE as *mut u32;
const CAN_MSR: *const u32 = (CAN1_BASE + 0x04) as *const u32;
const CAN_TSR: *mut u32 = (CAN1_BASE + 0x08) as *mut u32;
const CAN_RF0R: *mut u32 = (CAN1_BASE + 0x0C) as *mut u32;
const CAN_IER: *mut u32 = (CAN1_BASE + 0x14) as *mut u32;
const CAN_BTR: *mut u32 = (CAN1_BASE + 0x1C) as *mut u32;

// TX mailbox 0
const CAN_TI0R: *mut u32 = (CAN1_BASE + 0x180) as *mut u32;
const CAN_TDT0R: *mut u32 = (CAN1_BASE + 0x184) as *mut u32;
const CAN_TDL0R: *mut u32 = (CAN1_BASE + 0x188) as *mut u32;
const CAN_TDH0R: *mut u32 = (CAN1_BASE + 0x18C) as *mut u32;

// RX FIFO 0 mailbox
const CAN_RDL0R: *const u32 = (CAN1_BASE + 0x1B8) as *const u32;
const CAN_RDH0R: *const u32 = (CAN1_BASE + 0x1BC) as *const u32;

// Filter registers
const CAN_FMR: *mut u32 = (CAN1_BASE + 0x200) as *mut u32;
const CAN_FA1R: *mut u32 = (CAN1_BASE + 0x21C) as *mut u32;
const CAN_F0R1: *mut u32 = (CAN1_BASE + 0x240) as *mut u32;
const CAN_F0R2: *mut u32 = (CAN1_BASE + 0x244) as *mut u32;

const MCR_INRQ: u32 = 1 << 0;
const MCR_SLEEP: u32 = 1 << 1;
const MCR_RESET: u32 = 1 << 15;
const MSR_INAK: u32 = 1 << 0;
const TSR_TME0: u32 = 1 << 26;
const TI0R_TXRQ: u32 = 1 << 0;
const RF0R_FMP0_MASK: u32 = 0b11;
const RF0R_RFOM0: u32 = 1 << 5;
const IER_FMPIE0: u32 = 1 << 1;
const FMR_FINIT: u32 = 1 << 0;

/// 500 kbit/s at a 42 MHz APB1 clock: prescaler 6, 14 time quanta
/// (SJW=1, BS1=11, BS2=2).
const BTR_500KBIT: u32 = (1 << 20) | (10 << 16) | 5;

/// Spins allowed while waiting for a free TX mailbox before a send is
/// reported as failed.
pub const TX_TIMEOUT: u32 = 1000;

/// Handle to the CAN1 peripheral.
pub struct Can1;

impl Can1 {
    /// Enter init mode, configure timing and a single accept-everything
    /// filter bank, return to normal mode, and enable the RX0 interrupt.
    pub fn init(&mut self) -> bool {
        unsafe {
            // Leave sleep, request init mode
            CAN_MCR.write_volatile((CAN_MCR.read_volatile() & !MCR_SLEEP) | MCR_INRQ);
            if !wait_msr(MSR_INAK, true) {
                return false;
            }

            CAN_BTR.write_volatile(BTR_500KBIT);

            // Filter bank 0: mask mode, 32-bit, zero mask = accept all ids
            CAN_FMR.write_volatile(CAN_FMR.read_volatile() | FMR_FINIT);
            CAN_F0R1.write_volatile(0);
            CAN_F0R2.write_volatile(0);
            CAN_FA1R.write_volatile(CAN_FA1R.read_volatile() | 1);
            CAN_FMR.write_volatile(CAN_FMR.read_volatile() & !FMR_FINIT);

            // Back to normal mode
            CAN_MCR.write_volatile(CAN_MCR.read_volatile() & !MCR_INRQ);
            if !wait_msr(MSR_INAK, false) {
                return false;
            }

            CAN_IER.write_volatile(CAN_IER.read_volatile() | IER_FMPIE0);
        }
        true
    }

    /// Transmit one 8-byte frame on mailbox 0 with a bounded wait for the
    /// mailbox to free up. Failure is reported to the caller, never retried
    /// here beyond the spin budget.
    pub fn send(&mut self, id: u16, frame: &Frame) -> bool {
        unsafe {
            let mut spins = 0;
            while CAN_TSR.read_volatile() & TSR_TME0 == 0 {
                spins += 1;
                if spins > TX_TIMEOUT {
                    return false;
                }
            }

            CAN_TDL0R.write_volatile(u32::from_le_bytes([
                frame[0], frame[1], frame[2], frame[3],
            ]));
            CAN_TDH0R.write_volatile(u32::from_le_bytes([
                frame[4], frame[5], frame[6], frame[7],
            ]));
            CAN_TDT0R.write_volatile(8); // DLC
            CAN_TI0R.write_volatile((u32::from(id) << 21) | TI0R_TXRQ);
        }
        true
    }

    /// Put the peripheral back into its reset state ahead of the jump to the
    /// application.
    pub fn deinit(&mut self) {
        unsafe {
            CAN_IER.write_volatile(0);
            CAN_MCR.write_volatile(MCR_RESET);
        }
    }
}

fn wait_msr(mask: u32, set: bool) -> bool {
    for _ in 0..100_000 {
        let msr = unsafe { CAN_MSR.read_volatile() };
        if (msr & mask != 0) == set {
            return true;
        }
    }
    false
}

/// Drain RX FIFO 0 into the frame queue. Runs in interrupt context as the
/// queue's sole producer; a full queue drops the frame and counts it.
pub fn drain_rx_fifo<const N: usize>(producer: &mut Producer<'_, Frame, N>) {
    unsafe {
        while CAN_RF0R.read_volatile() & RF0R_FMP0_MASK != 0 {
            let low = CAN_RDL0R.read_volatile().to_le_bytes();
            let high = CAN_RDH0R.read_volatile().to_le_bytes();
            let frame: Frame = [
                low[0], low[1], low[2], low[3], high[0], high[1], high[2], high[3],
            ];
            // Release the mailbox before the (possibly failing) enqueue so
            // the FIFO never wedges.
            CAN_RF0R.write_volatile(CAN_RF0R.read_volatile() | RF0R_RFOM0);

            if !producer.enqueue(frame) {
                defmt::warn!("rx queue full, frame dropped ({=u32} so far)", producer.dropped());
            }
        }
    }
}
