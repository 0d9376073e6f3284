// SPDX-License-Identifier: MIT

//! The bootloader protocol FSM: transition table, dispatcher, handlers,
//! and the main loop that drives them from the frame queue.
//!
//! Dispatch is table-driven: a static ordered list maps `(state, message
//! kind)` to a handler drawn from a closed set; the first matching entry
//! wins, and an event with no entry leaves the state unchanged. States whose
//! only trigger is NONE (`CrcCheck`, `ValidateFlash`, `LaunchApp`) are
//! automatic: the dispatcher fires their entry immediately upon entering
//! them, so the protocol never stalls waiting for an empty frame no bus
//! producer sends. `WaitForFlag`'s NONE entry is not automatic; the main
//! loop fires it once at startup to act on the persisted flag.
//!
//! Handlers are synchronous and run to completion; for a fixed sequence of
//! delivered messages the resulting state and persisted words are
//! deterministic. No state is a dead end: every failure path lands in
//! `Recovery` or `WaitForMeta`, both of which accept further bus traffic.

use crate::hal::EcuHal;
use crate::protocol::{Frame, Message, MessageKind};
use crate::queue::Consumer;
use crate::state::{BootFlag, BootRecord, FlashLayout, FlashSession};

/// Protocol states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FsmState {
    WaitForFlag,
    Recovery,
    CrcCheck,
    LaunchApp,
    WaitForMeta,
    FlashApp,
    ValidateFlash,
}

impl FsmState {
    /// States entered and left without an external trigger.
    fn is_automatic(self) -> bool {
        matches!(self, Self::CrcCheck | Self::ValidateFlash | Self::LaunchApp)
    }
}

/// Closed set of state handlers, the table's function column.
#[derive(Clone, Copy, Debug)]
enum Handler {
    SetBootFlags,
    CheckBootFlags,
    ProcessMetadata,
    FlashApp,
    CheckFlashedCrc,
    ValidateFlash,
    LaunchApp,
}

struct Transition {
    state: FsmState,
    kind: MessageKind,
    handler: Handler,
}

const fn entry(state: FsmState, kind: MessageKind, handler: Handler) -> Transition {
    Transition {
        state,
        kind,
        handler,
    }
}

/// `(state, kind) -> handler`, scanned in order, first match wins.
static TRANSITION_TABLE: &[Transition] = &[
    entry(
        FsmState::WaitForFlag,
        MessageKind::FlagSet,
        Handler::SetBootFlags,
    ),
    entry(
        FsmState::WaitForFlag,
        MessageKind::None,
        Handler::CheckBootFlags,
    ),
    entry(
        FsmState::Recovery,
        MessageKind::FlagSet,
        Handler::SetBootFlags,
    ),
    entry(
        FsmState::CrcCheck,
        MessageKind::None,
        Handler::CheckFlashedCrc,
    ),
    entry(
        FsmState::WaitForMeta,
        MessageKind::Metadata,
        Handler::ProcessMetadata,
    ),
    entry(FsmState::FlashApp, MessageKind::AppData, Handler::FlashApp),
    entry(
        FsmState::ValidateFlash,
        MessageKind::None,
        Handler::ValidateFlash,
    ),
    entry(FsmState::LaunchApp, MessageKind::None, Handler::LaunchApp),
];

/// The bootloader context: current state, flashing session, flash layout,
/// and the hardware collaborators. One instance owns the whole protocol; no
/// process-wide mutable state exists, so independent instances can run side
/// by side in tests.
pub struct Bootloader<H: EcuHal> {
    state: FsmState,
    session: FlashSession,
    layout: FlashLayout,
    hw: H,
}

impl<H: EcuHal> Bootloader<H> {
    pub fn new(hw: H, layout: FlashLayout) -> Self {
        Self {
            state: FsmState::WaitForFlag,
            session: FlashSession::default(),
            layout,
            hw,
        }
    }

    pub fn state(&self) -> FsmState {
        self.state
    }

    pub fn session(&self) -> &FlashSession {
        &self.session
    }

    pub fn hal(&self) -> &H {
        &self.hw
    }

    pub fn hal_mut(&mut self) -> &mut H {
        &mut self.hw
    }

    /// Startup check of the persisted record: if the magic word is absent the
    /// boot flag is forced to the force-recovery sentinel. The storage is
    /// never otherwise reinitialized across resets.
    pub fn initialize(&mut self) -> Result<(), crate::hal::NvmError> {
        let record = BootRecord::load(&self.hw, &self.layout);
        if !record.is_provisioned() {
            self.layout.write_boot_flag(&mut self.hw, BootFlag::Invalid)?;
        }
        Ok(())
    }

    /// Act once on the persisted boot flag, as if the flag wait timed out.
    /// Called by the main loop before frame processing begins.
    pub fn startup_check(&mut self) -> FsmState {
        self.step(&Message::None { ecu_id: 0 })
    }

    /// Dispatch one message, then drain any automatic states it led into.
    pub fn step(&mut self, message: &Message) -> FsmState {
        self.dispatch(message);
        while self.state.is_automatic() {
            if !self.dispatch(&Message::None { ecu_id: 0 }) {
                break;
            }
        }
        self.state
    }

    /// One table scan. Returns whether an entry matched; an unmatched event
    /// leaves the state unchanged by design.
    fn dispatch(&mut self, message: &Message) -> bool {
        let Some(transition) = TRANSITION_TABLE
            .iter()
            .find(|t| t.state == self.state && t.kind == message.kind())
        else {
            return false;
        };

        let next = match transition.handler {
            Handler::SetBootFlags => self.set_boot_flags(message),
            Handler::CheckBootFlags => self.check_boot_flags(),
            Handler::ProcessMetadata => self.process_metadata(message),
            Handler::FlashApp => self.flash_app(message),
            Handler::CheckFlashedCrc => self.check_flashed_crc(),
            Handler::ValidateFlash => self.validate_flash(),
            Handler::LaunchApp => self.launch_app(),
        };

        // The session is transient: entering the metadata wait discards any
        // previous transfer.
        if next == FsmState::WaitForMeta && self.state != FsmState::WaitForMeta {
            self.session = FlashSession::default();
        }
        self.state = next;
        true
    }

    /// Process one queued frame, if any. Invalid frames are dropped with the
    /// state untouched.
    pub fn poll<const N: usize>(&mut self, rx: &mut Consumer<'_, Frame, N>) -> bool {
        let Some(frame) = rx.dequeue() else {
            return false;
        };
        if let Some(message) = Message::decode(&frame) {
            self.step(&message);
        }
        true
    }

    /// Drive the protocol forever: pop frames, dispatch, idle when empty.
    pub fn run<const N: usize>(&mut self, rx: &mut Consumer<'_, Frame, N>) -> ! {
        self.startup_check();
        loop {
            if !self.poll(rx) {
                self.hw.wait_for_event();
            }
        }
    }

    // --- state handlers ---

    /// Persist the requested operation mode, then decide on it.
    fn set_boot_flags(&mut self, message: &Message) -> FsmState {
        let Message::FlagSet { mode, .. } = *message else {
            return self.state;
        };
        if self
            .layout
            .write_boot_flag(&mut self.hw, BootFlag::from(mode))
            .is_err()
        {
            return FsmState::Recovery;
        }
        self.check_boot_flags()
    }

    /// Route on the persisted flag: boot, flash, or recover.
    fn check_boot_flags(&mut self) -> FsmState {
        match self.layout.read_boot_flag(&self.hw) {
            BootFlag::BootToApp => FsmState::ValidateFlash,
            BootFlag::FlashNewApp => FsmState::WaitForMeta,
            BootFlag::IdleInRecovery | BootFlag::Invalid => FsmState::Recovery,
        }
    }

    /// Capture announced length/CRC and arm the write cursor.
    fn process_metadata(&mut self, message: &Message) -> FsmState {
        let Message::Metadata {
            app_length, crc, ..
        } = *message
        else {
            return self.state;
        };
        self.session = FlashSession::begin(&self.layout, app_length, crc);
        if self.session.is_complete() {
            // Zero-length image: nothing to stream, verify immediately.
            return FsmState::CrcCheck;
        }
        FsmState::FlashApp
    }

    /// Program one received word; one APP_DATA message advances the cursor by
    /// exactly one word.
    fn flash_app(&mut self, message: &Message) -> FsmState {
        let Message::AppData { word, .. } = *message else {
            return self.state;
        };
        if self.hw.write_word(self.session.cursor, word).is_err() {
            return FsmState::Recovery;
        }
        self.session.cursor += 1;
        if self.session.is_complete() {
            FsmState::CrcCheck
        } else {
            FsmState::FlashApp
        }
    }

    /// Verify the freshly flashed image against the announced CRC. A match
    /// commits the image; a mismatch requests a full retransmission.
    fn check_flashed_crc(&mut self) -> FsmState {
        let computed = self
            .hw
            .compute_over_region(self.layout.app_flash_start, self.session.temp_length);
        if computed == self.session.temp_crc {
            let committed = self
                .layout
                .write_saved_crc(&mut self.hw, self.session.temp_crc)
                .and_then(|()| {
                    self.layout
                        .write_saved_app_length(&mut self.hw, self.session.temp_length)
                })
                .and_then(|()| self.layout.write_boot_flag(&mut self.hw, BootFlag::BootToApp));
            if committed.is_err() {
                return FsmState::Recovery;
            }
            FsmState::LaunchApp
        } else {
            self.downgrade_to_reflash()
        }
    }

    /// Boot-time re-verification of the committed image against the saved
    /// CRC and length.
    fn validate_flash(&mut self) -> FsmState {
        let record = BootRecord::load(&self.hw, &self.layout);
        let computed = self
            .hw
            .compute_over_region(self.layout.app_flash_start, record.saved_app_length);
        if computed == record.saved_crc {
            FsmState::LaunchApp
        } else {
            self.downgrade_to_reflash()
        }
    }

    /// Integrity failure is never fatal: downgrade the flag and wait for a
    /// retransmission.
    fn downgrade_to_reflash(&mut self) -> FsmState {
        if self
            .layout
            .write_boot_flag(&mut self.hw, BootFlag::FlashNewApp)
            .is_err()
        {
            return FsmState::Recovery;
        }
        FsmState::WaitForMeta
    }

    /// Tear down the bus and hand control to the application. A real
    /// launcher diverges; a return means the launch was declined.
    fn launch_app(&mut self) -> FsmState {
        self.hw.deinit();
        self.hw.launch(self.layout.app_flash_start);
        FsmState::Recovery
    }
}
