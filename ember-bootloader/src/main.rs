// SPDX-License-Identifier: MIT

//! ember bootloader firmware: on reset, act on the persisted boot flag and
//! either validate-and-launch the flashed application or take a new image
//! over CAN. The CAN RX interrupt is the sole producer into the frame
//! queue; the main loop consumes it and drives the protocol FSM.

#![no_std]
#![no_main]

mod can;
mod flash;
mod launch;
mod peripherals;

use defmt_rtt as _;
use panic_probe as _;

defmt::timestamp!("{=u64:us}", { 0 });

use core::ptr::addr_of_mut;

use cortex_m_rt::{entry, exception};
use ember_common::hal::{AppLauncher, CanBus, Checksum, EcuHal, Nvm, NvmError};
use ember_common::protocol::Frame;
use ember_common::queue::{Producer, SpscQueue};
use ember_common::state::FlashLayout;
use ember_common::Bootloader;

/// CAN identifier the bootloader transmits with.
const TX_CAN_ID: u16 = 0x7E9;

const RX_QUEUE_DEPTH: usize = 16;

static mut RX_QUEUE: SpscQueue<Frame, RX_QUEUE_DEPTH> = SpscQueue::new();
static mut RX_PRODUCER: Option<Producer<'static, Frame, RX_QUEUE_DEPTH>> = None;

/// The hardware collaborators handed to the protocol core.
struct Board {
    can: can::Can1,
}

impl Nvm for Board {
    fn write_word(&mut self, addr: u32, value: u32) -> Result<(), NvmError> {
        flash::write_word(addr, value)
    }

    fn read_word(&self, addr: u32) -> u32 {
        flash::read_word(addr)
    }
}

impl Checksum for Board {
    fn compute_over_region(&mut self, start: u32, length: u32) -> u32 {
        flash::compute_over_region(start, length)
    }
}

impl CanBus for Board {
    fn init(&mut self) -> bool {
        self.can.init()
    }

    fn send(&mut self, frame: &Frame) -> bool {
        self.can.send(TX_CAN_ID, frame)
    }

    fn deinit(&mut self) {
        self.can.deinit();
    }
}

impl AppLauncher for Board {
    fn launch(&mut self, entry: u32) {
        launch::launch(entry);
    }
}

impl EcuHal for Board {
    fn wait_for_event(&mut self) {
        cortex_m::asm::wfi();
    }
}

#[entry]
fn main() -> ! {
    defmt::println!("ember bootloader init");

    peripherals::init();

    let mut board = Board { can: can::Can1 };
    if !board.init() {
        defmt::panic!("CAN peripheral failed to initialize");
    }

    // Split the frame queue before interrupts can fire; the ISR owns the
    // producer, the main loop the consumer.
    let (producer, mut consumer) = unsafe { (*addr_of_mut!(RX_QUEUE)).split() };
    unsafe {
        RX_PRODUCER = Some(producer);
    }
    peripherals::enable_can_rx_irq();

    let mut bootloader = Bootloader::new(board, FlashLayout::DEVICE);
    if bootloader.initialize().is_err() {
        defmt::warn!("boot record init write failed");
    }

    bootloader.run(&mut consumer)
}

/// All unassigned device interrupts funnel here; the only line this firmware
/// unmasks is CAN1 RX0 (IRQ 20).
#[exception]
unsafe fn DefaultHandler(irqn: i16) {
    if irqn == peripherals::Irq::Can1Rx0 as i16 {
        if let Some(producer) = (*addr_of_mut!(RX_PRODUCER)).as_mut() {
            can::drain_rx_fifo(producer);
        }
    }
}
