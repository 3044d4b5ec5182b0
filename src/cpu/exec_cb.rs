/*
    retro80: RetroShield Z80 single-board computer emulator.
    Copyright (C) 2025  Rafal Michalski

    For the full copyright notice, see the lib.rs file.
*/
//! The CB page: rotates, shifts and the bit instructions, including the
//! DDCB/FDCB form with its displacement-before-opcode encoding and the
//! undocumented copy of the result into a register.
use super::flags::CpuFlags;
use super::registers::Prefix;
use super::{ops, Z80};
use crate::bus::Bus;

/// The rotate/shift row of the CB page, by `yyy` code.
fn rotate_op(y: u8, val: u8, flags: &mut CpuFlags) -> u8 {
    match y {
        0 => ops::rlc(val, flags),
        1 => ops::rrc(val, flags),
        2 => ops::rl(val, flags),
        3 => ops::rr(val, flags),
        4 => ops::sla(val, flags),
        5 => ops::sra(val, flags),
        6 => ops::sll(val, flags),
        _ => ops::srl(val, flags),
    }
}

impl Z80 {
    pub(crate) fn exec_cb<B: Bus>(&mut self, bus: &mut B, prefix: Option<Prefix>) {
        match prefix {
            None => self.exec_cb_plain(bus),
            Some(pfx) => self.exec_cb_indexed(bus, pfx),
        }
    }

    fn exec_cb_plain<B: Bus>(&mut self, bus: &mut B) {
        let op = self.fetch_opcode(bus);
        let x = op >> 6;
        let y = op >> 3 & 7;
        let z = op & 7;
        let mut flags = self.flags();
        if z == 6 {
            let addr = self.hl.get16();
            let val = bus.read_byte(addr);
            match x {
                0 => {
                    let res = rotate_op(y, val, &mut flags);
                    bus.write_byte(addr, res);
                    self.cyc += 15;
                }
                1 => {
                    // X/Y leak from the internal address latch here.
                    ops::bit_mem(y, val, self.wz.get8hi(), &mut flags);
                    self.cyc += 12;
                }
                2 => {
                    bus.write_byte(addr, ops::res(y, val));
                    self.cyc += 15;
                }
                _ => {
                    bus.write_byte(addr, ops::set(y, val));
                    self.cyc += 15;
                }
            }
        } else {
            let val = self.reg8(z, None);
            match x {
                0 => {
                    let res = rotate_op(y, val, &mut flags);
                    self.set_reg8(z, None, res);
                }
                1 => ops::bit(y, val, &mut flags),
                2 => self.set_reg8(z, None, ops::res(y, val)),
                _ => self.set_reg8(z, None, ops::set(y, val)),
            }
            self.cyc += 8;
        }
        self.set_flags(flags);
    }

    /// `DD CB d op`: the displacement comes before the opcode byte, every
    /// form operates on `(ii+d)`, and the non-`(HL)` operand codes also
    /// latch the result into that register.
    fn exec_cb_indexed<B: Bus>(&mut self, bus: &mut B, pfx: Prefix) {
        let d = self.fetch_byte(bus) as i8;
        let op = self.fetch_byte(bus);
        let x = op >> 6;
        let y = op >> 3 & 7;
        let z = op & 7;
        let addr = self.index16(pfx).wrapping_add(d as u16);
        self.wz.set16(addr);
        let val = bus.read_byte(addr);
        let mut flags = self.flags();
        if x == 1 {
            ops::bit_mem(y, val, self.wz.get8hi(), &mut flags);
            self.cyc += 16;
        } else {
            let res = match x {
                0 => rotate_op(y, val, &mut flags),
                2 => ops::res(y, val),
                _ => ops::set(y, val),
            };
            bus.write_byte(addr, res);
            if z != 6 {
                self.set_reg8(z, None, res);
            }
            self.cyc += 19;
        }
        self.set_flags(flags);
    }
}
