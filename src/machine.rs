/*
    retro80: RetroShield Z80 single-board computer emulator.
    Copyright (C) 2025  Rafal Michalski

    For the full copyright notice, see the lib.rs file.
*/
//! The system bus, the host input queue, the interrupt scheduler and the
//! [Machine] type the front ends drive.
use std::collections::VecDeque;
use std::io::{self, Write};
use std::ops::Range;

use log::trace;

use crate::acia::Acia;
use crate::bus::Bus;
use crate::cpu::Z80;
use crate::disasm::{self, Instruction};
use crate::memory::Memory;
use crate::sdcard::SdCard;
use crate::storage::Storage;
use crate::usart::Usart;

/// USART data port.
pub const PORT_USART_DATA: u8 = 0x00;
/// USART status/command port.
pub const PORT_USART_CTRL: u8 = 0x01;
/// SD command port.
pub const PORT_SD_CMD: u8 = 0x10;
/// SD status port.
pub const PORT_SD_STATUS: u8 = 0x11;
/// SD data port.
pub const PORT_SD_DATA: u8 = 0x12;
/// SD filename latch port.
pub const PORT_SD_FNAME: u8 = 0x13;
/// SD seek position, low byte.
pub const PORT_SD_SEEK_LO: u8 = 0x14;
/// SD seek position, high byte.
pub const PORT_SD_SEEK_HI: u8 = 0x15;
/// ACIA control/status port.
pub const PORT_ACIA_CTRL: u8 = 0x80;
/// ACIA data port.
pub const PORT_ACIA_DATA: u8 = 0x81;

/// Where the UARTs push their transmitted bytes.
pub trait ByteSink {
    /// Emit one byte. Implementations flush immediately: the ordering of
    /// emitted bytes is the ordering of the firmware's `OUT` instructions.
    fn write_byte(&mut self, byte: u8);
}

/// Collecting sink for tests and capture runs.
impl ByteSink for Vec<u8> {
    fn write_byte(&mut self, byte: u8) {
        self.push(byte);
    }
}

/// The passthrough sink: bytes go to stdout and are flushed per byte.
#[derive(Default)]
pub struct StdoutSink;

impl ByteSink for StdoutSink {
    fn write_byte(&mut self, byte: u8) {
        let mut out = io::stdout();
        let _ = out.write_all(&[byte]);
        let _ = out.flush();
    }
}

/// The host-side input queue shared by both UARTs, plus the latch that
/// keeps the interrupt scheduler from raising twice for one character.
#[derive(Default)]
pub struct InputQueue {
    queue: VecDeque<u8>,
    int_latched: bool,
}

impl InputQueue {
    pub fn push(&mut self, byte: u8) {
        self.queue.push_back(byte);
    }

    pub fn take(&mut self) -> Option<u8> {
        self.queue.pop_front()
    }

    pub fn has_byte(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.int_latched = false;
    }
}

/// Routes CPU memory callbacks to the memory map and port callbacks to the
/// peripherals. Ports nobody owns read `0xFF` and swallow writes.
pub struct SystemBus<S: Storage, O: ByteSink> {
    pub memory: Memory,
    pub acia: Acia,
    pub usart: Usart,
    pub sd: SdCard<S>,
    pub input: InputQueue,
    pub sink: O,
}

impl<S: Storage, O: ByteSink> SystemBus<S, O> {
    pub fn new(memory: Memory, storage: S, sink: O) -> Self {
        SystemBus {
            memory,
            acia: Acia::new(),
            usart: Usart::new(),
            sd: SdCard::new(storage),
            input: InputQueue::default(),
            sink,
        }
    }
}

impl<S: Storage, O: ByteSink> Bus for SystemBus<S, O> {
    fn read_byte(&mut self, addr: u16) -> u8 {
        self.memory.read(addr)
    }

    fn write_byte(&mut self, addr: u16, value: u8) {
        self.memory.write(addr, value);
    }

    fn port_in(&mut self, port: u8) -> u8 {
        match port {
            PORT_USART_DATA => self.usart.read_data(&mut self.input),
            PORT_USART_CTRL => self.usart.read_status(&self.input),
            PORT_SD_STATUS => self.sd.read_status(),
            PORT_SD_DATA => self.sd.read_data(),
            PORT_ACIA_CTRL => self.acia.read_status(&self.input),
            PORT_ACIA_DATA => self.acia.read_data(&mut self.input),
            _ => 0xFF,
        }
    }

    fn port_out(&mut self, port: u8, value: u8) {
        match port {
            PORT_USART_DATA => self.usart.write_data(&mut self.sink, value),
            PORT_USART_CTRL => self.usart.write_ctrl(value),
            PORT_SD_CMD => self.sd.write_command(value),
            PORT_SD_DATA => self.sd.write_data(value),
            PORT_SD_FNAME => self.sd.write_fname(value),
            PORT_SD_SEEK_LO => self.sd.write_seek_lo(value),
            PORT_SD_SEEK_HI => self.sd.write_seek_hi(value),
            PORT_ACIA_CTRL => self.acia.write_ctrl(value),
            PORT_ACIA_DATA => self.acia.write_data(&mut self.sink, value),
            _ => {}
        }
    }
}

/// The whole single-board computer: CPU plus system bus, with the
/// interrupt scheduler run between instructions.
pub struct Machine<S: Storage, O: ByteSink> {
    cpu: Z80,
    bus: SystemBus<S, O>,
}

impl<S: Storage, O: ByteSink> Machine<S, O> {
    /// A machine with a zeroed memory of the given ROM ceiling. The ceiling
    /// is fixed for the run.
    pub fn new(rom_ceiling: u16, storage: S, sink: O) -> Self {
        Machine {
            cpu: Z80::new(),
            bus: SystemBus::new(Memory::new(rom_ceiling), storage, sink),
        }
    }

    /// Map a ROM image at address 0.
    pub fn load_rom(&mut self, image: &[u8]) {
        self.bus.memory.load_rom(image);
    }

    /// Execute one instruction and run the interrupt scheduler. Returns the
    /// T-states consumed.
    pub fn step(&mut self) -> u32 {
        if log::log_enabled!(log::Level::Trace) && !self.cpu.is_halted() {
            let pc = self.cpu.pc();
            let instr = disasm::disassemble(pc, |addr| self.bus.memory.read(addr));
            trace!("{}", instr);
        }
        let cycles = self.cpu.step(&mut self.bus);
        self.poll_interrupt();
        cycles
    }

    /// Run until `cycles` T-states have elapsed in this call. A halted CPU
    /// with interrupts enabled keeps ticking so queued input can wake it; a
    /// dead halt (interrupts masked) ends the run early. Returns the
    /// T-states actually consumed.
    pub fn run(&mut self, cycles: u64) -> u64 {
        let mut spent = 0u64;
        while spent < cycles {
            if self.cpu.is_halted() && !self.cpu.iff1() {
                break;
            }
            spent += u64::from(self.step());
        }
        spent
    }

    /// One character of host input for the UARTs.
    pub fn push_key(&mut self, byte: u8) {
        self.bus.input.push(byte);
    }

    /// Reset the CPU. Peripherals keep their open handles and queued input;
    /// clearing those is the front end's call.
    pub fn reset(&mut self) {
        self.cpu.reset();
    }

    /// The interrupt scheduler: firmwares that drive the USART get one
    /// maskable interrupt per pending input character, raised only while
    /// interrupts are accepted and re-armed once the firmware masks them.
    fn poll_interrupt(&mut self) {
        if !self.cpu.iff1() {
            self.bus.input.int_latched = false;
        }
        if self.bus.usart.uses_8251()
            && self.bus.input.has_byte()
            && self.cpu.iff1()
            && self.cpu.iff_delay() == 0
            && !self.bus.input.int_latched
        {
            trace!("input pending, raising INT");
            self.cpu.request_int(0xFF);
            self.bus.input.int_latched = true;
        }
    }

    pub fn halted(&self) -> bool {
        self.cpu.is_halted()
    }

    pub fn cpu(&self) -> &Z80 {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Z80 {
        &mut self.cpu
    }

    pub fn bus(&self) -> &SystemBus<S, O> {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut SystemBus<S, O> {
        &mut self.bus
    }

    /// A copy of a memory range for the debugger. Call only while paused.
    pub fn memory_view(&self, addrs: Range<u16>) -> Vec<u8> {
        self.bus.memory.view(addrs)
    }

    /// Disassemble `count` instructions starting at `addr`.
    pub fn disasm_at(&self, addr: u16, count: usize) -> Vec<Instruction> {
        disasm::disasm_window(addr, count, |a| self.bus.memory.read(a))
    }
}
