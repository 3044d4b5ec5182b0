/*
    retro80: RetroShield Z80 single-board computer emulator.
    Copyright (C) 2025  Rafal Michalski

    For the full copyright notice, see the lib.rs file.
*/
//! Dispatch of the unprefixed opcode page, shared by the DD/FD-prefixed
//! forms: a prefix only reroutes `HL`, `H`, `L` and `(HL)` operands.
//!
//! The decode follows the canonical `xx yyy zzz` field split. Base T-state
//! counts come from [BASE_CYCLES]; handlers add the taken-branch and
//! indexed-operand surcharges on top.
use core::mem::swap;

use super::registers::{Condition, Prefix};
use super::{ops, Z80};
use crate::bus::Bus;

/// T-states of every unprefixed opcode: conditional instructions carry
/// their not-taken cost. The prefix bytes `CB ED DD FD` are accounted by
/// their dispatchers and carry zero here.
#[rustfmt::skip]
pub(crate) const BASE_CYCLES: [u8; 256] = [
//  x0  x1  x2  x3  x4  x5  x6  x7  x8  x9  xA  xB  xC  xD  xE  xF
     4, 10,  7,  6,  4,  4,  7,  4,  4, 11,  7,  6,  4,  4,  7,  4, // 0x
     8, 10,  7,  6,  4,  4,  7,  4, 12, 11,  7,  6,  4,  4,  7,  4, // 1x
     7, 10, 16,  6,  4,  4,  7,  4,  7, 11, 16,  6,  4,  4,  7,  4, // 2x
     7, 10, 13,  6, 11, 11, 10,  4,  7, 11, 13,  6,  4,  4,  7,  4, // 3x
     4,  4,  4,  4,  4,  4,  7,  4,  4,  4,  4,  4,  4,  4,  7,  4, // 4x
     4,  4,  4,  4,  4,  4,  7,  4,  4,  4,  4,  4,  4,  4,  7,  4, // 5x
     4,  4,  4,  4,  4,  4,  7,  4,  4,  4,  4,  4,  4,  4,  7,  4, // 6x
     7,  7,  7,  7,  7,  7,  4,  7,  4,  4,  4,  4,  4,  4,  7,  4, // 7x
     4,  4,  4,  4,  4,  4,  7,  4,  4,  4,  4,  4,  4,  4,  7,  4, // 8x
     4,  4,  4,  4,  4,  4,  7,  4,  4,  4,  4,  4,  4,  4,  7,  4, // 9x
     4,  4,  4,  4,  4,  4,  7,  4,  4,  4,  4,  4,  4,  4,  7,  4, // Ax
     4,  4,  4,  4,  4,  4,  7,  4,  4,  4,  4,  4,  4,  4,  7,  4, // Bx
     5, 10, 10, 10, 10, 11,  7, 11,  5, 10, 10,  0, 10, 17,  7, 11, // Cx
     5, 10, 10, 11, 10, 11,  7, 11,  5,  4, 10, 11, 10,  0,  7, 11, // Dx
     5, 10, 10, 19, 10, 11,  7, 11,  5,  4, 10,  4, 10,  0,  7, 11, // Ex
     5, 10, 10,  4, 10, 11,  7, 11,  5,  6, 10,  4, 10,  0,  7, 11, // Fx
];

impl Z80 {
    /// Execute one decoded instruction. `prefix` carries a pending DD/FD.
    /// Returns `true` when the instruction was `EI`.
    pub(crate) fn execute<B: Bus>(&mut self, bus: &mut B, code: u8, prefix: Option<Prefix>) -> bool {
        self.cyc += u64::from(BASE_CYCLES[code as usize]);
        let y = code >> 3 & 7;
        let z = code & 7;
        match code >> 6 {
            0 => self.exec_x0(bus, y, z, prefix),
            1 => self.exec_x1(bus, y, z, prefix),
            2 => {
                let val = if z == 6 {
                    let addr = self.addr_hl(bus, prefix);
                    bus.read_byte(addr)
                } else {
                    self.reg8(z, prefix)
                };
                self.alu_op(y, val);
            }
            _ => return self.exec_x3(bus, y, z, prefix),
        }
        false
    }

    /// `ADD ADC SUB SBC AND XOR OR CP` on the accumulator, by `yyy` code.
    pub(crate) fn alu_op(&mut self, y: u8, val: u8) {
        let mut flags = self.flags();
        let acc = self.acc();
        let res = match y {
            0 => ops::add(acc, val, &mut flags),
            1 => ops::adc(acc, val, &mut flags),
            2 => ops::sub(acc, val, &mut flags),
            3 => ops::sbc(acc, val, &mut flags),
            4 => ops::and(acc, val, &mut flags),
            5 => ops::xor(acc, val, &mut flags),
            6 => ops::or(acc, val, &mut flags),
            _ => {
                ops::cp(acc, val, &mut flags);
                acc
            }
        };
        self.set_acc(res);
        self.set_flags(flags);
    }

    /// Relative jump: the displacement operand has already been fetched.
    fn jump_rel(&mut self, d: i8) {
        let target = self.pc.get16().wrapping_add(d as u16);
        self.pc.set16(target);
        self.wz.set16(target);
    }

    fn exec_x0<B: Bus>(&mut self, bus: &mut B, y: u8, z: u8, prefix: Option<Prefix>) {
        match z {
            0 => match y {
                0 => {}
                1 => swap(&mut self.af, &mut self.af_alt),
                2 => {
                    // DJNZ e
                    let d = self.fetch_byte(bus) as i8;
                    let b = self.bc.get8hi().wrapping_sub(1);
                    self.bc.set8hi(b);
                    if b != 0 {
                        self.jump_rel(d);
                        self.cyc += 5;
                    }
                }
                3 => {
                    let d = self.fetch_byte(bus) as i8;
                    self.jump_rel(d);
                }
                _ => {
                    // JR cc,e
                    let d = self.fetch_byte(bus) as i8;
                    if Condition::from_code(y - 4).is_satisfied(self.flags()) {
                        self.jump_rel(d);
                        self.cyc += 5;
                    }
                }
            },
            1 => {
                let p = y >> 1;
                if y & 1 == 0 {
                    // LD rp,nn
                    let nn = self.fetch_word(bus);
                    self.set_rp(p, prefix, nn);
                } else {
                    // ADD HL,rp
                    let dst = self.rp(2, prefix);
                    let src = self.rp(p, prefix);
                    self.wz.set16(dst.wrapping_add(1));
                    let mut flags = self.flags();
                    let res = ops::add16(dst, src, &mut flags);
                    self.set_rp(2, prefix, res);
                    self.set_flags(flags);
                }
            }
            2 => self.exec_indirect_ld(bus, y, prefix),
            3 => {
                let p = y >> 1;
                let val = self.rp(p, prefix);
                if y & 1 == 0 {
                    self.set_rp(p, prefix, val.wrapping_add(1));
                } else {
                    self.set_rp(p, prefix, val.wrapping_sub(1));
                }
            }
            4 | 5 => {
                // INC r / DEC r and the (HL) forms
                let mut flags = self.flags();
                if y == 6 {
                    let addr = self.addr_hl(bus, prefix);
                    let val = bus.read_byte(addr);
                    let res = if z == 4 {
                        ops::inc(val, &mut flags)
                    } else {
                        ops::dec(val, &mut flags)
                    };
                    bus.write_byte(addr, res);
                } else {
                    let val = self.reg8(y, prefix);
                    let res = if z == 4 {
                        ops::inc(val, &mut flags)
                    } else {
                        ops::dec(val, &mut flags)
                    };
                    self.set_reg8(y, prefix, res);
                }
                self.set_flags(flags);
            }
            6 => {
                // LD r,n / LD (HL),n
                if y == 6 {
                    let addr = self.addr_hl_imm(bus, prefix);
                    let n = self.fetch_byte(bus);
                    bus.write_byte(addr, n);
                } else {
                    let n = self.fetch_byte(bus);
                    self.set_reg8(y, prefix, n);
                }
            }
            _ => {
                let mut flags = self.flags();
                let acc = self.acc();
                match y {
                    0 => self.set_acc(ops::rlca(acc, &mut flags)),
                    1 => self.set_acc(ops::rrca(acc, &mut flags)),
                    2 => self.set_acc(ops::rla(acc, &mut flags)),
                    3 => self.set_acc(ops::rra(acc, &mut flags)),
                    4 => self.set_acc(ops::daa(acc, &mut flags)),
                    5 => self.set_acc(ops::cpl(acc, &mut flags)),
                    6 => ops::scf(acc, &mut flags),
                    _ => ops::ccf(acc, &mut flags),
                }
                self.set_flags(flags);
            }
        }
    }

    /// The `z == 2` column of the first opcode quarter: loads through
    /// `(BC)`, `(DE)` and direct addresses.
    fn exec_indirect_ld<B: Bus>(&mut self, bus: &mut B, y: u8, prefix: Option<Prefix>) {
        match y {
            0 | 2 => {
                let addr = if y == 0 {
                    self.bc.get16()
                } else {
                    self.de.get16()
                };
                let acc = self.acc();
                bus.write_byte(addr, acc);
                self.wz.set8lo(addr.wrapping_add(1) as u8);
                self.wz.set8hi(acc);
            }
            1 | 3 => {
                let addr = if y == 1 {
                    self.bc.get16()
                } else {
                    self.de.get16()
                };
                let val = bus.read_byte(addr);
                self.set_acc(val);
                self.wz.set16(addr.wrapping_add(1));
            }
            4 => {
                // LD (nn),HL
                let nn = self.fetch_word(bus);
                let val = self.rp(2, prefix);
                self.write16(bus, nn, val);
                self.wz.set16(nn.wrapping_add(1));
            }
            5 => {
                // LD HL,(nn)
                let nn = self.fetch_word(bus);
                let val = self.read16(bus, nn);
                self.set_rp(2, prefix, val);
                self.wz.set16(nn.wrapping_add(1));
            }
            6 => {
                // LD (nn),A
                let nn = self.fetch_word(bus);
                let acc = self.acc();
                bus.write_byte(nn, acc);
                self.wz.set8lo(nn.wrapping_add(1) as u8);
                self.wz.set8hi(acc);
            }
            _ => {
                // LD A,(nn)
                let nn = self.fetch_word(bus);
                let val = bus.read_byte(nn);
                self.set_acc(val);
                self.wz.set16(nn.wrapping_add(1));
            }
        }
    }

    /// `LD r,r'` quarter including `HALT`. When one side is `(HL)` the
    /// register side ignores the prefix; pure register moves map `H`/`L`
    /// onto the index halves.
    fn exec_x1<B: Bus>(&mut self, bus: &mut B, y: u8, z: u8, prefix: Option<Prefix>) {
        match (y, z) {
            (6, 6) => self.halted = true,
            (6, _) => {
                let addr = self.addr_hl(bus, prefix);
                let val = self.reg8(z, None);
                bus.write_byte(addr, val);
            }
            (_, 6) => {
                let addr = self.addr_hl(bus, prefix);
                let val = bus.read_byte(addr);
                self.set_reg8(y, None, val);
            }
            _ => {
                let val = self.reg8(z, prefix);
                self.set_reg8(y, prefix, val);
            }
        }
    }

    fn exec_x3<B: Bus>(&mut self, bus: &mut B, y: u8, z: u8, prefix: Option<Prefix>) -> bool {
        let p = y >> 1;
        let q = y & 1;
        match z {
            0 => {
                // RET cc
                if Condition::from_code(y).is_satisfied(self.flags()) {
                    let pc = self.pop16(bus);
                    self.pc.set16(pc);
                    self.wz.set16(pc);
                    self.cyc += 6;
                }
            }
            1 => {
                if q == 0 {
                    let val = self.pop16(bus);
                    self.set_rp2(p, prefix, val);
                } else {
                    match p {
                        0 => {
                            let pc = self.pop16(bus);
                            self.pc.set16(pc);
                            self.wz.set16(pc);
                        }
                        1 => {
                            swap(&mut self.bc, &mut self.bc_alt);
                            swap(&mut self.de, &mut self.de_alt);
                            swap(&mut self.hl, &mut self.hl_alt);
                        }
                        2 => {
                            let target = self.rp(2, prefix);
                            self.pc.set16(target);
                        }
                        _ => {
                            let val = self.rp(2, prefix);
                            self.sp.set16(val);
                        }
                    }
                }
            }
            2 => {
                // JP cc,nn
                let nn = self.fetch_word(bus);
                self.wz.set16(nn);
                if Condition::from_code(y).is_satisfied(self.flags()) {
                    self.pc.set16(nn);
                }
            }
            3 => match y {
                0 => {
                    let nn = self.fetch_word(bus);
                    self.pc.set16(nn);
                    self.wz.set16(nn);
                }
                1 => self.exec_cb(bus, prefix),
                2 => {
                    // OUT (n),A
                    let n = self.fetch_byte(bus);
                    let acc = self.acc();
                    bus.port_out(n, acc);
                    self.wz.set8lo(n.wrapping_add(1));
                    self.wz.set8hi(acc);
                }
                3 => {
                    // IN A,(n)
                    let n = self.fetch_byte(bus);
                    let port_addr = u16::from(self.acc()) << 8 | u16::from(n);
                    let val = bus.port_in(n);
                    self.set_acc(val);
                    self.wz.set16(port_addr.wrapping_add(1));
                }
                4 => {
                    // EX (SP),HL
                    let sp = self.sp.get16();
                    let tmp = self.read16(bus, sp);
                    let val = self.rp(2, prefix);
                    self.write16(bus, sp, val);
                    self.set_rp(2, prefix, tmp);
                    self.wz.set16(tmp);
                }
                5 => swap(&mut self.de, &mut self.hl),
                6 => {
                    self.iff1 = false;
                    self.iff2 = false;
                }
                _ => {
                    self.iff1 = true;
                    self.iff2 = true;
                    self.iff_delay = 1;
                    return true;
                }
            },
            4 => {
                // CALL cc,nn
                let nn = self.fetch_word(bus);
                self.wz.set16(nn);
                if Condition::from_code(y).is_satisfied(self.flags()) {
                    let pc = self.pc.get16();
                    self.push16(bus, pc);
                    self.pc.set16(nn);
                    self.cyc += 7;
                }
            }
            5 => {
                if q == 0 {
                    let val = self.rp2(p, prefix);
                    self.push16(bus, val);
                } else {
                    match p {
                        0 => {
                            let nn = self.fetch_word(bus);
                            self.wz.set16(nn);
                            let pc = self.pc.get16();
                            self.push16(bus, pc);
                            self.pc.set16(nn);
                        }
                        2 => self.exec_ed(bus),
                        // A dangling DD/FD prefix: no state change.
                        _ => {}
                    }
                }
            }
            6 => {
                let n = self.fetch_byte(bus);
                self.alu_op(y, n);
            }
            _ => {
                // RST p
                let pc = self.pc.get16();
                self.push16(bus, pc);
                let target = u16::from(y) * 8;
                self.pc.set16(target);
                self.wz.set16(target);
            }
        }
        false
    }
}
