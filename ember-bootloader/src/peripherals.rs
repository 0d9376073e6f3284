// SPDX-License-Identifier: MIT

//! Clock, pin, and interrupt-controller bring-up, written against the raw
//! register map. Only what the bootloader needs: GPIOA for the CAN pins,
//! the CAN1 and CRC peripheral clocks, and the CAN1 RX0 interrupt line.

use cortex_m::interrupt::InterruptNumber;

const RCC_BASE: u32 = 0x4002_3800;
const RCC_AHB1ENR: *mut u32 = (RCC_BASE + 0x30) as *mut u32;
const RCC_APB1ENR: *mut u32 = (RCC_BASE + 0x40) as *mut u32;

const AHB1ENR_GPIOAEN: u32 = 1 << 0;
const AHB1ENR_CRCEN: u32 = 1 << 12;
const APB1ENR_CAN1EN: u32 = 1 << 25;

const GPIOA_BASE: u32 = 0x4002_0000;
const GPIOA_MODER: *mut u32 = GPIOA_BASE as *mut u32;
const GPIOA_AFRH: *mut u32 = (GPIOA_BASE + 0x24) as *mut u32;

/// Device interrupt lines the bootloader uses.
#[derive(Clone, Copy)]
pub enum Irq {
    Can1Rx0 = 20,
}

unsafe impl InterruptNumber for Irq {
    fn number(self) -> u16 {
        self as u16
    }
}

/// Enable peripheral clocks and route PA11/PA12 to CAN1 (AF9).
pub fn init() {
    unsafe {
        RCC_AHB1ENR.write_volatile(RCC_AHB1ENR.read_volatile() | AHB1ENR_GPIOAEN | AHB1ENR_CRCEN);
        RCC_APB1ENR.write_volatile(RCC_APB1ENR.read_volatile() | APB1ENR_CAN1EN);

        // PA11 (CAN1_RX) and PA12 (CAN1_TX) to alternate function mode
        let moder = GPIOA_MODER.read_volatile();
        GPIOA_MODER.write_volatile(
            (moder & !(0b11 << 22) & !(0b11 << 24)) | (0b10 << 22) | (0b10 << 24),
        );

        // AF9 on pins 11 and 12
        let afrh = GPIOA_AFRH.read_volatile();
        GPIOA_AFRH.write_volatile((afrh & !(0xF << 12) & !(0xF << 16)) | (9 << 12) | (9 << 16));
    }
}

/// Unmask the CAN RX interrupt. Called once the queue producer is in place.
pub fn enable_can_rx_irq() {
    unsafe {
        cortex_m::peripheral::NVIC::unmask(Irq::Can1Rx0);
    }
}
