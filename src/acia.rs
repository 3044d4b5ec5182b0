/*
    retro80: RetroShield Z80 single-board computer emulator.
    Copyright (C) 2025  Rafal Michalski

    For the full copyright notice, see the lib.rs file.
*/
//! An MC6850-style ACIA on ports `0x80` (control/status) and `0x81` (data).
//!
//! The transmitter never stalls, so TDRE is always reported; RDRF mirrors
//! the shared input queue. Firmwares using this device poll, no interrupt
//! is ever generated for it.
use bitflags::bitflags;
use log::trace;

use crate::machine::{ByteSink, InputQueue};

bitflags! {
    /// Status register bits.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct AciaStatus: u8 {
        /// Receive data register full.
        const RDRF = 0x01;
        /// Transmit data register empty.
        const TDRE = 0x02;
    }
}

/// The ACIA state: just the opaque control latch.
#[derive(Default)]
pub struct Acia {
    ctrl: u8,
}

impl Acia {
    pub fn new() -> Self {
        Acia::default()
    }

    /// Read the status register.
    pub fn read_status(&self, input: &InputQueue) -> u8 {
        let mut status = AciaStatus::TDRE;
        if input.has_byte() {
            status |= AciaStatus::RDRF;
        }
        status.bits()
    }

    /// Read the data register: the next queued byte, or zero.
    pub fn read_data(&mut self, input: &mut InputQueue) -> u8 {
        input.take().unwrap_or(0)
    }

    /// Control writes are latched and otherwise ignored.
    pub fn write_ctrl(&mut self, value: u8) {
        trace!("ACIA ctrl <- {:02x}", value);
        self.ctrl = value;
    }

    /// The last value written to the control register.
    pub fn ctrl(&self) -> u8 {
        self.ctrl
    }

    /// Write the data register: the byte goes straight to the output sink.
    pub fn write_data<O: ByteSink>(&mut self, sink: &mut O, value: u8) {
        sink.write_byte(value);
    }
}
