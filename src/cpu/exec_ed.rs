/*
    retro80: RetroShield Z80 single-board computer emulator.
    Copyright (C) 2025  Rafal Michalski

    For the full copyright notice, see the lib.rs file.
*/
//! The ED page: I/O through `(C)`, 16-bit arithmetic and direct loads,
//! interrupt plumbing, the nibble rotates and the block instructions.
//! Every hole in the page behaves as a two-byte NOP costing 8 T-states.
use super::registers::InterruptMode;
use super::{ops, Z80};
use crate::bus::Bus;

impl Z80 {
    pub(crate) fn exec_ed<B: Bus>(&mut self, bus: &mut B) {
        let op = self.fetch_opcode(bus);
        let x = op >> 6;
        let y = op >> 3 & 7;
        let z = op & 7;
        match x {
            1 => self.exec_ed_x1(bus, y, z),
            2 if z <= 3 && y >= 4 => self.exec_block(bus, y, z),
            _ => self.cyc += 8,
        }
    }

    fn exec_ed_x1<B: Bus>(&mut self, bus: &mut B, y: u8, z: u8) {
        let p = y >> 1;
        let q = y & 1;
        match z {
            0 => {
                // IN r,(C); the y == 6 form only sets flags.
                let port = self.bc.get8lo();
                let val = bus.port_in(port);
                if y != 6 {
                    self.set_reg8(y, None, val);
                }
                let mut flags = self.flags();
                ops::io(val, &mut flags);
                self.set_flags(flags);
                self.wz.set16(self.bc.get16().wrapping_add(1));
                self.cyc += 12;
            }
            1 => {
                // OUT (C),r; the y == 6 form writes zero.
                let port = self.bc.get8lo();
                let val = if y == 6 { 0 } else { self.reg8(y, None) };
                bus.port_out(port, val);
                self.wz.set16(self.bc.get16().wrapping_add(1));
                self.cyc += 12;
            }
            2 => {
                let hl = self.hl.get16();
                let rr = self.rp(p, None);
                self.wz.set16(hl.wrapping_add(1));
                let mut flags = self.flags();
                let res = if q == 0 {
                    ops::sbc16(hl, rr, &mut flags)
                } else {
                    ops::adc16(hl, rr, &mut flags)
                };
                self.hl.set16(res);
                self.set_flags(flags);
                self.cyc += 15;
            }
            3 => {
                let nn = self.fetch_word(bus);
                if q == 0 {
                    let val = self.rp(p, None);
                    self.write16(bus, nn, val);
                } else {
                    let val = self.read16(bus, nn);
                    self.set_rp(p, None, val);
                }
                self.wz.set16(nn.wrapping_add(1));
                self.cyc += 20;
            }
            4 => {
                let mut flags = self.flags();
                let res = ops::neg(self.acc(), &mut flags);
                self.set_acc(res);
                self.set_flags(flags);
                self.cyc += 8;
            }
            5 => {
                // RETN and RETI both restore IFF1 from IFF2.
                self.iff1 = self.iff2;
                let pc = self.pop16(bus);
                self.pc.set16(pc);
                self.wz.set16(pc);
                self.cyc += 14;
            }
            6 => {
                self.im = match y & 3 {
                    0 | 1 => InterruptMode::Mode0,
                    2 => InterruptMode::Mode1,
                    _ => InterruptMode::Mode2,
                };
                self.cyc += 8;
            }
            _ => match y {
                0 => {
                    self.i = self.acc();
                    self.cyc += 9;
                }
                1 => {
                    self.r = self.acc();
                    self.cyc += 9;
                }
                2 => {
                    let val = self.i;
                    self.set_acc(val);
                    let mut flags = self.flags();
                    ops::ld_a_ir(val, self.iff2, &mut flags);
                    self.set_flags(flags);
                    self.cyc += 9;
                }
                3 => {
                    let val = self.r;
                    self.set_acc(val);
                    let mut flags = self.flags();
                    ops::ld_a_ir(val, self.iff2, &mut flags);
                    self.set_flags(flags);
                    self.cyc += 9;
                }
                4 => {
                    // RRD
                    let addr = self.hl.get16();
                    let mem = bus.read_byte(addr);
                    let mut flags = self.flags();
                    let (acc, mem) = ops::rrd(self.acc(), mem, &mut flags);
                    bus.write_byte(addr, mem);
                    self.set_acc(acc);
                    self.set_flags(flags);
                    self.wz.set16(addr.wrapping_add(1));
                    self.cyc += 18;
                }
                5 => {
                    // RLD
                    let addr = self.hl.get16();
                    let mem = bus.read_byte(addr);
                    let mut flags = self.flags();
                    let (acc, mem) = ops::rld(self.acc(), mem, &mut flags);
                    bus.write_byte(addr, mem);
                    self.set_acc(acc);
                    self.set_flags(flags);
                    self.wz.set16(addr.wrapping_add(1));
                    self.cyc += 18;
                }
                _ => self.cyc += 8,
            },
        }
    }

    /// The sixteen block instructions. The repeating forms execute a single
    /// iteration and step `PC` back over their own two bytes while the
    /// repeat condition holds, so interrupts are served between iterations
    /// and each iteration costs the documented 21 T-states (16 on the last).
    fn exec_block<B: Bus>(&mut self, bus: &mut B, y: u8, z: u8) {
        let delta: u16 = if y & 1 == 0 { 1 } else { 0xFFFF };
        let repeating = y >= 6;
        match z {
            0 => {
                // LDI LDD LDIR LDDR
                let hl = self.hl.get16();
                let de = self.de.get16();
                let val = bus.read_byte(hl);
                bus.write_byte(de, val);
                self.hl.set16(hl.wrapping_add(delta));
                self.de.set16(de.wrapping_add(delta));
                self.bc.dec16();
                let bc_nonzero = self.bc.get16() != 0;
                let mut flags = self.flags();
                ops::ldx(self.acc(), val, bc_nonzero, &mut flags);
                self.set_flags(flags);
                self.cyc += 16;
                if repeating && bc_nonzero {
                    self.repeat_block(true);
                }
            }
            1 => {
                // CPI CPD CPIR CPDR
                let hl = self.hl.get16();
                let val = bus.read_byte(hl);
                self.hl.set16(hl.wrapping_add(delta));
                self.bc.dec16();
                let bc_nonzero = self.bc.get16() != 0;
                let mut flags = self.flags();
                let done = ops::cpx(self.acc(), val, bc_nonzero, &mut flags);
                self.set_flags(flags);
                self.cyc += 16;
                if repeating && !done {
                    self.repeat_block(true);
                } else {
                    self.wz.add16(delta);
                }
            }
            2 => {
                // INI IND INIR INDR
                let bc = self.bc.get16();
                let port = self.bc.get8lo();
                let val = bus.port_in(port);
                let hl = self.hl.get16();
                bus.write_byte(hl, val);
                self.hl.set16(hl.wrapping_add(delta));
                let b = self.bc.get8hi().wrapping_sub(1);
                self.bc.set8hi(b);
                self.wz.set16(bc.wrapping_add(delta));
                let m = self.bc.get8lo().wrapping_add(delta as u8);
                let mut flags = self.flags();
                ops::iox(val, b, m, &mut flags);
                self.set_flags(flags);
                self.cyc += 16;
                if repeating && b != 0 {
                    self.repeat_block(false);
                }
            }
            _ => {
                // OUTI OUTD OTIR OTDR: B decrements before the output.
                let hl = self.hl.get16();
                let val = bus.read_byte(hl);
                let b = self.bc.get8hi().wrapping_sub(1);
                self.bc.set8hi(b);
                bus.port_out(self.bc.get8lo(), val);
                self.hl.set16(hl.wrapping_add(delta));
                self.wz.set16(self.bc.get16().wrapping_add(delta));
                let l = self.hl.get8lo();
                let mut flags = self.flags();
                ops::iox(val, b, l, &mut flags);
                self.set_flags(flags);
                self.cyc += 16;
                if repeating && b != 0 {
                    self.repeat_block(false);
                }
            }
        }
    }

    fn repeat_block(&mut self, update_wz: bool) {
        let pc = self.pc.get16().wrapping_sub(2);
        self.pc.set16(pc);
        if update_wz {
            self.wz.set16(pc.wrapping_add(1));
        }
        self.cyc += 5;
    }
}
