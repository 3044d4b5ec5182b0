/*
    retro80: RetroShield Z80 single-board computer emulator.
    Copyright (C) 2025  Rafal Michalski

    For the full copyright notice, see the lib.rs file.
*/
//! The Z80 CPU core.
//!
//! [Z80] holds the architectural state and executes exactly one instruction
//! per [Z80::step] against a [Bus]. Interrupt requests are latched with
//! [Z80::request_int] / [Z80::request_nmi] and accepted at the next
//! instruction boundary.
mod exec;
mod exec_cb;
mod exec_ed;
pub mod flags;
pub mod ops;
pub mod registers;

use crate::bus::Bus;
use flags::CpuFlags;
use registers::{InterruptMode, Prefix, RegisterPair};

/// The address of the NMI service routine.
pub const NMI_RESTART: u16 = 0x0066;
/// The address of the `RST 38h` / interrupt mode 1 service routine.
pub const INT_RESTART: u16 = 0x0038;

/// T-states of an `M1` cycle, also the cost of a halted "step".
const M1_TS: u32 = 4;
/// T-states of a non-maskable interrupt acknowledge.
const NMI_TS: u32 = 11;
/// T-states of a mode 1 interrupt acknowledge.
const IM1_TS: u32 = 13;
/// T-states of a mode 2 interrupt acknowledge.
const IM2_TS: u32 = 19;
/// Extra T-states of a mode 0 acknowledge on top of the executed opcode.
const IM0_EXTRA_TS: u32 = 2;

/// The Z80 processor state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Z80 {
    af: RegisterPair,
    af_alt: RegisterPair,
    bc: RegisterPair,
    de: RegisterPair,
    hl: RegisterPair,
    bc_alt: RegisterPair,
    de_alt: RegisterPair,
    hl_alt: RegisterPair,
    ix: RegisterPair,
    iy: RegisterPair,
    sp: RegisterPair,
    pc: RegisterPair,
    /// The internal address latch, a.k.a. MEMPTR. Leaks into the
    /// `BIT n,(HL)` flags and nothing else.
    wz: RegisterPair,
    i: u8,
    r: u8,
    iff1: bool,
    iff2: bool,
    im: InterruptMode,
    halted: bool,
    /// Nonzero for exactly one instruction after `EI`; blocks maskable
    /// interrupt acceptance for that instruction.
    iff_delay: u8,
    int_pending: bool,
    int_vector: u8,
    nmi_pending: bool,
    cyc: u64,
    /// Bytes fetched from the instruction stream by the last `step`.
    last_len: u8,
}

impl Z80 {
    /// A CPU in the power-on state.
    pub fn new() -> Self {
        let mut cpu = Z80::default();
        cpu.reset();
        cpu
    }

    /// Reset to the power-on state. The bus is untouched: it is not owned
    /// by the CPU.
    pub fn reset(&mut self) {
        *self = Z80::default();
    }

    /// Request a maskable interrupt presenting `vector` on the data bus.
    /// Idempotent while a request is already pending.
    pub fn request_int(&mut self, vector: u8) {
        self.int_pending = true;
        self.int_vector = vector;
    }

    /// Request a non-maskable interrupt.
    pub fn request_nmi(&mut self) {
        self.nmi_pending = true;
    }

    /// Execute one instruction (prefixes included) and return the T-states
    /// consumed. A pending interrupt is accepted instead, a halted CPU burns
    /// a 4-cycle NOP without advancing PC.
    pub fn step<B: Bus>(&mut self, bus: &mut B) -> u32 {
        let start = self.cyc;
        self.last_len = 0;
        if self.nmi_pending {
            self.nmi_pending = false;
            self.accept_nmi(bus);
        } else if self.int_pending && self.iff1 && self.iff_delay == 0 {
            self.int_pending = false;
            self.accept_int(bus);
        } else if self.halted {
            self.cyc += u64::from(M1_TS);
            self.inc_r();
            self.iff_delay = self.iff_delay.saturating_sub(1);
        } else {
            let just_ei = self.exec_one(bus);
            if !just_ei {
                self.iff_delay = self.iff_delay.saturating_sub(1);
            }
        }
        (self.cyc - start) as u32
    }

    fn accept_nmi<B: Bus>(&mut self, bus: &mut B) {
        self.halted = false;
        self.iff1 = false;
        self.inc_r();
        let pc = self.pc.get16();
        self.push16(bus, pc);
        self.pc.set16(NMI_RESTART);
        self.wz.set16(NMI_RESTART);
        self.cyc += u64::from(NMI_TS);
    }

    fn accept_int<B: Bus>(&mut self, bus: &mut B) {
        self.halted = false;
        self.iff1 = false;
        self.iff2 = false;
        self.inc_r();
        match self.im {
            InterruptMode::Mode0 => {
                // Execute whatever the device put on the data bus,
                // commonly RST 38h.
                self.cyc += u64::from(IM0_EXTRA_TS);
                let code = self.int_vector;
                self.execute(bus, code, None);
            }
            InterruptMode::Mode1 => {
                let pc = self.pc.get16();
                self.push16(bus, pc);
                self.pc.set16(INT_RESTART);
                self.wz.set16(INT_RESTART);
                self.cyc += u64::from(IM1_TS);
            }
            InterruptMode::Mode2 => {
                let table = u16::from(self.i) << 8 | u16::from(self.int_vector & 0xFE);
                let pc = self.pc.get16();
                self.push16(bus, pc);
                let target = self.read16(bus, table);
                self.pc.set16(target);
                self.wz.set16(target);
                self.cyc += u64::from(IM2_TS);
            }
        }
    }

    /// Consume DD/FD prefixes (4 T-states each, last one wins) and execute
    /// the instruction that follows. Returns `true` when it was `EI`.
    fn exec_one<B: Bus>(&mut self, bus: &mut B) -> bool {
        let mut prefix = None;
        loop {
            let code = self.fetch_opcode(bus);
            match code {
                0xDD => {
                    prefix = Some(Prefix::Xdd);
                    self.cyc += u64::from(M1_TS);
                }
                0xFD => {
                    prefix = Some(Prefix::Yfd);
                    self.cyc += u64::from(M1_TS);
                }
                _ => return self.execute(bus, code, prefix),
            }
        }
    }

    // --- instruction stream and stack helpers ---

    #[inline]
    pub(crate) fn inc_r(&mut self) {
        self.r = self.r & 0x80 | self.r.wrapping_add(1) & 0x7F;
    }

    #[inline]
    pub(crate) fn fetch_byte<B: Bus>(&mut self, bus: &mut B) -> u8 {
        let pc = self.pc.get16();
        let byte = bus.read_byte(pc);
        self.pc.set16(pc.wrapping_add(1));
        self.last_len = self.last_len.saturating_add(1);
        byte
    }

    #[inline]
    pub(crate) fn fetch_word<B: Bus>(&mut self, bus: &mut B) -> u16 {
        let lo = self.fetch_byte(bus);
        let hi = self.fetch_byte(bus);
        u16::from_le_bytes([lo, hi])
    }

    /// An opcode fetch: like [Z80::fetch_byte] but refreshes `R`.
    #[inline]
    pub(crate) fn fetch_opcode<B: Bus>(&mut self, bus: &mut B) -> u8 {
        self.inc_r();
        self.fetch_byte(bus)
    }

    #[inline]
    pub(crate) fn read16<B: Bus>(&mut self, bus: &mut B, addr: u16) -> u16 {
        let lo = bus.read_byte(addr);
        let hi = bus.read_byte(addr.wrapping_add(1));
        u16::from_le_bytes([lo, hi])
    }

    #[inline]
    pub(crate) fn write16<B: Bus>(&mut self, bus: &mut B, addr: u16, val: u16) {
        let [lo, hi] = val.to_le_bytes();
        bus.write_byte(addr, lo);
        bus.write_byte(addr.wrapping_add(1), hi);
    }

    #[inline]
    pub(crate) fn push16<B: Bus>(&mut self, bus: &mut B, val: u16) {
        let [lo, hi] = val.to_le_bytes();
        self.sp.dec16();
        bus.write_byte(self.sp.get16(), hi);
        self.sp.dec16();
        bus.write_byte(self.sp.get16(), lo);
    }

    #[inline]
    pub(crate) fn pop16<B: Bus>(&mut self, bus: &mut B) -> u16 {
        let lo = bus.read_byte(self.sp.get16());
        self.sp.inc16();
        let hi = bus.read_byte(self.sp.get16());
        self.sp.inc16();
        u16::from_le_bytes([lo, hi])
    }

    /// Resolve an `(HL)` operand address; with a prefix this fetches the
    /// displacement, updates `WZ` and accounts the indexed surcharge.
    pub(crate) fn addr_hl<B: Bus>(&mut self, bus: &mut B, prefix: Option<Prefix>) -> u16 {
        self.addr_hl_cost(bus, prefix, 8)
    }

    /// Same as [Z80::addr_hl] with the shorter `LD (ii+d),n` surcharge.
    pub(crate) fn addr_hl_imm<B: Bus>(&mut self, bus: &mut B, prefix: Option<Prefix>) -> u16 {
        self.addr_hl_cost(bus, prefix, 5)
    }

    fn addr_hl_cost<B: Bus>(&mut self, bus: &mut B, prefix: Option<Prefix>, extra: u32) -> u16 {
        match prefix {
            None => self.hl.get16(),
            Some(pfx) => {
                let d = self.fetch_byte(bus) as i8;
                let addr = self.index16(pfx).wrapping_add(d as u16);
                self.wz.set16(addr);
                self.cyc += u64::from(extra);
                addr
            }
        }
    }

    // --- register file access by opcode field ---

    #[inline]
    pub(crate) fn index16(&self, prefix: Prefix) -> u16 {
        match prefix {
            Prefix::Xdd => self.ix.get16(),
            Prefix::Yfd => self.iy.get16(),
        }
    }

    #[inline]
    pub(crate) fn set_index16(&mut self, prefix: Prefix, val: u16) {
        match prefix {
            Prefix::Xdd => self.ix.set16(val),
            Prefix::Yfd => self.iy.set16(val),
        }
    }

    /// Read an 8-bit register by its `rrr` code. `H` and `L` resolve to the
    /// index register halves under a prefix. Code 6 is a memory operand and
    /// never reaches this function.
    pub(crate) fn reg8(&self, code: u8, prefix: Option<Prefix>) -> u8 {
        match code {
            0 => self.bc.get8hi(),
            1 => self.bc.get8lo(),
            2 => self.de.get8hi(),
            3 => self.de.get8lo(),
            4 => match prefix {
                None => self.hl.get8hi(),
                Some(Prefix::Xdd) => self.ix.get8hi(),
                Some(Prefix::Yfd) => self.iy.get8hi(),
            },
            5 => match prefix {
                None => self.hl.get8lo(),
                Some(Prefix::Xdd) => self.ix.get8lo(),
                Some(Prefix::Yfd) => self.iy.get8lo(),
            },
            _ => self.af.get8hi(),
        }
    }

    pub(crate) fn set_reg8(&mut self, code: u8, prefix: Option<Prefix>, val: u8) {
        match code {
            0 => self.bc.set8hi(val),
            1 => self.bc.set8lo(val),
            2 => self.de.set8hi(val),
            3 => self.de.set8lo(val),
            4 => match prefix {
                None => self.hl.set8hi(val),
                Some(Prefix::Xdd) => self.ix.set8hi(val),
                Some(Prefix::Yfd) => self.iy.set8hi(val),
            },
            5 => match prefix {
                None => self.hl.set8lo(val),
                Some(Prefix::Xdd) => self.ix.set8lo(val),
                Some(Prefix::Yfd) => self.iy.set8lo(val),
            },
            _ => self.af.set8hi(val),
        }
    }

    /// Read a register pair by its `pp` code (`BC DE HL SP`); `HL` resolves
    /// to the index register under a prefix.
    pub(crate) fn rp(&self, p: u8, prefix: Option<Prefix>) -> u16 {
        match p {
            0 => self.bc.get16(),
            1 => self.de.get16(),
            2 => match prefix {
                None => self.hl.get16(),
                Some(pfx) => self.index16(pfx),
            },
            _ => self.sp.get16(),
        }
    }

    pub(crate) fn set_rp(&mut self, p: u8, prefix: Option<Prefix>, val: u16) {
        match p {
            0 => self.bc.set16(val),
            1 => self.de.set16(val),
            2 => match prefix {
                None => self.hl.set16(val),
                Some(pfx) => self.set_index16(pfx, val),
            },
            _ => self.sp.set16(val),
        }
    }

    /// Read a register pair by its stack-group code (`BC DE HL AF`).
    pub(crate) fn rp2(&self, p: u8, prefix: Option<Prefix>) -> u16 {
        match p {
            3 => self.af.get16(),
            _ => self.rp(p, prefix),
        }
    }

    pub(crate) fn set_rp2(&mut self, p: u8, prefix: Option<Prefix>, val: u16) {
        match p {
            3 => self.af.set16(val),
            _ => self.set_rp(p, prefix, val),
        }
    }

    #[inline]
    pub(crate) fn acc(&self) -> u8 {
        self.af.get8hi()
    }

    #[inline]
    pub(crate) fn set_acc(&mut self, val: u8) {
        self.af.set8hi(val);
    }

    /// The flags half of `AF`.
    #[inline]
    pub fn flags(&self) -> CpuFlags {
        CpuFlags::from_bits_truncate(self.af.get8lo())
    }

    #[inline]
    pub(crate) fn set_flags(&mut self, flags: CpuFlags) {
        self.af.set8lo(flags.bits());
    }

    // --- state observation for the front end and debugger ---

    pub fn af(&self) -> u16 {
        self.af.get16()
    }

    pub fn bc(&self) -> u16 {
        self.bc.get16()
    }

    pub fn de(&self) -> u16 {
        self.de.get16()
    }

    pub fn hl(&self) -> u16 {
        self.hl.get16()
    }

    pub fn ix(&self) -> u16 {
        self.ix.get16()
    }

    pub fn iy(&self) -> u16 {
        self.iy.get16()
    }

    pub fn sp(&self) -> u16 {
        self.sp.get16()
    }

    pub fn pc(&self) -> u16 {
        self.pc.get16()
    }

    pub fn i(&self) -> u8 {
        self.i
    }

    pub fn r(&self) -> u8 {
        self.r
    }

    pub fn set_af(&mut self, val: u16) {
        self.af.set16(val);
    }

    pub fn set_bc(&mut self, val: u16) {
        self.bc.set16(val);
    }

    pub fn set_de(&mut self, val: u16) {
        self.de.set16(val);
    }

    pub fn set_hl(&mut self, val: u16) {
        self.hl.set16(val);
    }

    pub fn set_ix(&mut self, val: u16) {
        self.ix.set16(val);
    }

    pub fn set_iy(&mut self, val: u16) {
        self.iy.set16(val);
    }

    pub fn set_sp(&mut self, val: u16) {
        self.sp.set16(val);
    }

    pub fn set_pc(&mut self, val: u16) {
        self.pc.set16(val);
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn iff1(&self) -> bool {
        self.iff1
    }

    pub fn iff2(&self) -> bool {
        self.iff2
    }

    pub fn interrupt_mode(&self) -> InterruptMode {
        self.im
    }

    /// Nonzero while the post-`EI` interrupt shadow is in effect.
    pub fn iff_delay(&self) -> u8 {
        self.iff_delay
    }

    /// The monotone T-state counter.
    pub fn cycles(&self) -> u64 {
        self.cyc
    }

    /// How many bytes the last [Z80::step] fetched from the instruction
    /// stream. Zero for interrupt acceptance and halted steps.
    pub fn last_instruction_len(&self) -> u8 {
        self.last_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::PlainRam;

    #[test]
    fn reset_state() {
        let mut cpu = Z80::new();
        cpu.set_af(0x1234);
        cpu.set_pc(0x8000);
        cpu.request_int(0xFF);
        cpu.reset();
        assert_eq!(cpu.af(), 0);
        assert_eq!(cpu.pc(), 0);
        assert_eq!(cpu.sp(), 0);
        assert_eq!(cpu.cycles(), 0);
        assert!(!cpu.iff1());
        assert!(!cpu.iff2());
        assert!(!cpu.is_halted());
        assert_eq!(cpu.interrupt_mode(), InterruptMode::Mode0);
    }

    #[test]
    fn halted_step_is_a_four_cycle_nop() {
        let mut cpu = Z80::new();
        let mut ram = PlainRam::new();
        ram.load(0, &[0x76]); // HALT
        assert_eq!(cpu.step(&mut ram), 4);
        assert!(cpu.is_halted());
        let pc = cpu.pc();
        assert_eq!(cpu.step(&mut ram), 4);
        assert_eq!(cpu.pc(), pc);
        assert!(cpu.is_halted());
        assert_eq!(cpu.cycles(), 12);
    }

    #[test]
    fn r_register_preserves_bit7() {
        let mut cpu = Z80::new();
        let mut ram = PlainRam::new();
        // LD A,0xFF ; LD R,A then a stretch of NOPs
        ram.load(0, &[0x3E, 0xFF, 0xED, 0x4F, 0, 0, 0, 0]);
        cpu.step(&mut ram);
        cpu.step(&mut ram);
        assert_eq!(cpu.r(), 0xFF);
        cpu.step(&mut ram);
        assert_eq!(cpu.r(), 0x80);
    }
}
