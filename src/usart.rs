/*
    retro80: RetroShield Z80 single-board computer emulator.
    Copyright (C) 2025  Rafal Michalski

    For the full copyright notice, see the lib.rs file.
*/
//! An Intel 8251-style USART on ports `0x00` (data) and `0x01`
//! (status/command).
//!
//! Any access latches `uses_8251`, which switches the machine into the
//! interrupt-driven input model; firmwares that never touch these ports
//! keep the polled ACIA model. Input bytes are folded to upper case on the
//! way in, which the target firmwares expect of their console.
use bitflags::bitflags;
use log::trace;

use crate::machine::{ByteSink, InputQueue};

bitflags! {
    /// Status register bits.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct UsartStatus: u8 {
        /// Transmitter ready.
        const TXRDY = 0x01;
        /// Receiver ready.
        const RXRDY = 0x02;
        /// Transmitter empty.
        const TXE = 0x04;
        /// Data set ready.
        const DSR = 0x80;
    }
}

impl UsartStatus {
    /// The resting status: ready to transmit, nothing received.
    pub const IDLE: UsartStatus = UsartStatus::TXRDY.union(UsartStatus::TXE).union(UsartStatus::DSR);
}

/// The USART state.
#[derive(Default)]
pub struct Usart {
    uses_8251: bool,
}

impl Usart {
    pub fn new() -> Self {
        Usart::default()
    }

    /// Whether the running firmware has ever touched this device.
    pub fn uses_8251(&self) -> bool {
        self.uses_8251
    }

    /// Read the status register.
    pub fn read_status(&mut self, input: &InputQueue) -> u8 {
        self.uses_8251 = true;
        let mut status = UsartStatus::IDLE;
        if input.has_byte() {
            status |= UsartStatus::RXRDY;
        }
        status.bits()
    }

    /// Read the data register: the next queued byte upper-cased, or zero.
    pub fn read_data(&mut self, input: &mut InputQueue) -> u8 {
        self.uses_8251 = true;
        match input.take() {
            Some(byte) => byte.to_ascii_uppercase(),
            None => 0,
        }
    }

    /// Mode and command bytes are accepted and ignored.
    pub fn write_ctrl(&mut self, value: u8) {
        self.uses_8251 = true;
        trace!("USART ctrl <- {:02x}", value);
    }

    /// Write the data register: the byte goes straight to the output sink.
    pub fn write_data<O: ByteSink>(&mut self, sink: &mut O, value: u8) {
        self.uses_8251 = true;
        sink.write_byte(value);
    }
}
