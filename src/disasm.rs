/*
    retro80: RetroShield Z80 single-board computer emulator.
    Copyright (C) 2025  Rafal Michalski

    For the full copyright notice, see the lib.rs file.
*/
//! A single-instruction Z80 disassembler.
//!
//! The decoder mirrors the interpreter's `xx yyy zzz` field split so the
//! reported length always equals the number of bytes [crate::Z80::step]
//! consumes from the same address: prefix chains accumulate, `DD CB d op`
//! is four bytes, holes in the ED page come out as `DB $ED,$xx`.
use core::fmt::{self, Write};

use arrayvec::{ArrayString, ArrayVec};

use crate::cpu::registers::Prefix;

const R8: [&str; 8] = ["B", "C", "D", "E", "H", "L", "(HL)", "A"];
const RP: [&str; 4] = ["BC", "DE", "HL", "SP"];
const RP2: [&str; 4] = ["BC", "DE", "HL", "AF"];
const CC: [&str; 8] = ["NZ", "Z", "NC", "C", "PO", "PE", "P", "M"];
const ALU: [&str; 8] = ["ADD A,", "ADC A,", "SUB", "SBC A,", "AND", "XOR", "OR", "CP"];
const ROT: [&str; 8] = ["RLC", "RRC", "RL", "RR", "SLA", "SRA", "SLL", "SRL"];

/// One decoded instruction: its address, length, code bytes and text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    addr: u16,
    len: u8,
    bytes: ArrayVec<u8, 4>,
    text: ArrayString<24>,
}

impl Instruction {
    /// The address the instruction was decoded from.
    pub fn addr(&self) -> u16 {
        self.addr
    }

    /// Instruction length in bytes, prefixes included.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u8 {
        self.len
    }

    /// Up to the first four code bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The mnemonic with its arguments, e.g. `LD (IX+5),$2A`.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The address of the next instruction.
    pub fn next_addr(&self) -> u16 {
        self.addr.wrapping_add(u16::from(self.len))
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut code = ArrayString::<12>::new();
        for byte in &self.bytes {
            let _ = write!(code, "{:02X} ", byte);
        }
        write!(f, "{:04X}  {:<12} {}", self.addr, code.trim_end(), self.text)
    }
}

/// The index register name selected by a prefix.
fn index_name(prefix: Prefix) -> &'static str {
    match prefix {
        Prefix::Xdd => "IX",
        Prefix::Yfd => "IY",
    }
}

/// The 8-bit register name in a pure register context, where a prefix
/// renames `H`/`L` to the index register halves.
fn r8_name(code: u8, prefix: Option<Prefix>) -> &'static str {
    match (code, prefix) {
        (4, Some(Prefix::Xdd)) => "IXH",
        (5, Some(Prefix::Xdd)) => "IXL",
        (4, Some(Prefix::Yfd)) => "IYH",
        (5, Some(Prefix::Yfd)) => "IYL",
        _ => R8[code as usize],
    }
}

/// The register pair name, with `HL` renamed by a prefix.
fn rp_name(p: u8, prefix: Option<Prefix>, stack: bool) -> &'static str {
    let table = if stack { &RP2 } else { &RP };
    match (p, prefix) {
        (2, Some(pfx)) => index_name(pfx),
        _ => table[p as usize],
    }
}

struct Reader<'a, F: Fn(u16) -> u8> {
    base: u16,
    len: u8,
    bytes: ArrayVec<u8, 4>,
    peek: &'a F,
}

impl<'a, F: Fn(u16) -> u8> Reader<'a, F> {
    fn next(&mut self) -> u8 {
        let byte = (self.peek)(self.base.wrapping_add(u16::from(self.len)));
        self.len = self.len.saturating_add(1);
        let _ = self.bytes.try_push(byte);
        byte
    }

    fn next_word(&mut self) -> u16 {
        let lo = self.next();
        let hi = self.next();
        u16::from_le_bytes([lo, hi])
    }

    /// The branch target of a relative jump whose displacement was the
    /// byte just read.
    fn rel_target(&self, d: i8) -> u16 {
        self.base
            .wrapping_add(u16::from(self.len))
            .wrapping_add(d as u16)
    }
}

type Text = ArrayString<24>;

/// Decode the instruction at `addr`, reading memory through `peek`.
pub fn disassemble<F: Fn(u16) -> u8>(addr: u16, peek: F) -> Instruction {
    let mut r = Reader {
        base: addr,
        len: 0,
        bytes: ArrayVec::new(),
        peek: &peek,
    };
    let mut text = Text::new();

    let mut prefix = None;
    let mut op = r.next();
    // An unbroken run of prefixes never forms an instruction; give up on
    // one before the length counter saturates.
    while (op == 0xDD || op == 0xFD) && r.len < u8::MAX {
        prefix = Some(if op == 0xDD { Prefix::Xdd } else { Prefix::Yfd });
        op = r.next();
    }

    match op {
        0xCB => decode_cb(&mut r, prefix, &mut text),
        0xED => decode_ed(&mut r, &mut text),
        _ => decode_main(&mut r, op, prefix, &mut text),
    }

    Instruction {
        addr,
        len: r.len,
        bytes: r.bytes,
        text,
    }
}

/// Decode `count` consecutive instructions starting at `addr`, for a
/// debugger listing.
pub fn disasm_window<F: Fn(u16) -> u8>(addr: u16, count: usize, peek: F) -> Vec<Instruction> {
    let mut out = Vec::with_capacity(count);
    let mut at = addr;
    for _ in 0..count {
        let instr = disassemble(at, &peek);
        at = instr.next_addr();
        out.push(instr);
    }
    out
}

/// Format an `(HL)` or `(IX+d)` operand, consuming the displacement byte
/// in the prefixed case.
fn mem_operand<F: Fn(u16) -> u8>(r: &mut Reader<'_, F>, prefix: Option<Prefix>) -> Text {
    let mut s = Text::new();
    match prefix {
        None => {
            let _ = s.try_push_str("(HL)");
        }
        Some(pfx) => {
            let d = r.next() as i8;
            let _ = write!(s, "({}{:+})", index_name(pfx), d);
        }
    }
    s
}

fn decode_main<F: Fn(u16) -> u8>(r: &mut Reader<'_, F>, op: u8, prefix: Option<Prefix>, w: &mut Text) {
    let x = op >> 6;
    let y = op >> 3 & 7;
    let z = op & 7;
    let p = y >> 1;
    let q = y & 1;
    let _ = match x {
        0 => match z {
            0 => match y {
                0 => w.try_push_str("NOP").map_err(|_| fmt::Error),
                1 => w.try_push_str("EX AF,AF'").map_err(|_| fmt::Error),
                2 => {
                    let d = r.next() as i8;
                    write!(w, "DJNZ ${:04X}", r.rel_target(d))
                }
                3 => {
                    let d = r.next() as i8;
                    write!(w, "JR ${:04X}", r.rel_target(d))
                }
                _ => {
                    let d = r.next() as i8;
                    write!(w, "JR {},${:04X}", CC[(y - 4) as usize], r.rel_target(d))
                }
            },
            1 => {
                if q == 0 {
                    let nn = r.next_word();
                    write!(w, "LD {},${:04X}", rp_name(p, prefix, false), nn)
                } else {
                    write!(
                        w,
                        "ADD {},{}",
                        rp_name(2, prefix, false),
                        rp_name(p, prefix, false)
                    )
                }
            }
            2 => match y {
                0 => w.try_push_str("LD (BC),A").map_err(|_| fmt::Error),
                1 => w.try_push_str("LD A,(BC)").map_err(|_| fmt::Error),
                2 => w.try_push_str("LD (DE),A").map_err(|_| fmt::Error),
                3 => w.try_push_str("LD A,(DE)").map_err(|_| fmt::Error),
                4 => {
                    let nn = r.next_word();
                    write!(w, "LD (${:04X}),{}", nn, rp_name(2, prefix, false))
                }
                5 => {
                    let nn = r.next_word();
                    write!(w, "LD {},(${:04X})", rp_name(2, prefix, false), nn)
                }
                6 => {
                    let nn = r.next_word();
                    write!(w, "LD (${:04X}),A", nn)
                }
                _ => {
                    let nn = r.next_word();
                    write!(w, "LD A,(${:04X})", nn)
                }
            },
            3 => {
                let mnemonic = if q == 0 { "INC" } else { "DEC" };
                write!(w, "{} {}", mnemonic, rp_name(p, prefix, false))
            }
            4 | 5 => {
                let mnemonic = if z == 4 { "INC" } else { "DEC" };
                if y == 6 {
                    let operand = mem_operand(r, prefix);
                    write!(w, "{} {}", mnemonic, operand)
                } else {
                    write!(w, "{} {}", mnemonic, r8_name(y, prefix))
                }
            }
            6 => {
                if y == 6 {
                    let operand = mem_operand(r, prefix);
                    let n = r.next();
                    write!(w, "LD {},${:02X}", operand, n)
                } else {
                    let n = r.next();
                    write!(w, "LD {},${:02X}", r8_name(y, prefix), n)
                }
            }
            _ => {
                const ACC: [&str; 8] = ["RLCA", "RRCA", "RLA", "RRA", "DAA", "CPL", "SCF", "CCF"];
                w.try_push_str(ACC[y as usize]).map_err(|_| fmt::Error)
            }
        },
        1 => match (y, z) {
            (6, 6) => w.try_push_str("HALT").map_err(|_| fmt::Error),
            (6, _) => {
                let operand = mem_operand(r, prefix);
                write!(w, "LD {},{}", operand, r8_name(z, None))
            }
            (_, 6) => {
                let operand = mem_operand(r, prefix);
                write!(w, "LD {},{}", r8_name(y, None), operand)
            }
            _ => write!(w, "LD {},{}", r8_name(y, prefix), r8_name(z, prefix)),
        },
        2 => {
            if z == 6 {
                let operand = mem_operand(r, prefix);
                write!(w, "{} {}", ALU[y as usize], operand)
            } else {
                write!(w, "{} {}", ALU[y as usize], r8_name(z, prefix))
            }
        }
        _ => match z {
            0 => write!(w, "RET {}", CC[y as usize]),
            1 => {
                if q == 0 {
                    write!(w, "POP {}", rp_name(p, prefix, true))
                } else {
                    match p {
                        0 => w.try_push_str("RET").map_err(|_| fmt::Error),
                        1 => w.try_push_str("EXX").map_err(|_| fmt::Error),
                        2 => write!(w, "JP ({})", rp_name(2, prefix, false)),
                        _ => write!(w, "LD SP,{}", rp_name(2, prefix, false)),
                    }
                }
            }
            2 => {
                let nn = r.next_word();
                write!(w, "JP {},${:04X}", CC[y as usize], nn)
            }
            3 => match y {
                0 => {
                    let nn = r.next_word();
                    write!(w, "JP ${:04X}", nn)
                }
                2 => {
                    let n = r.next();
                    write!(w, "OUT (${:02X}),A", n)
                }
                3 => {
                    let n = r.next();
                    write!(w, "IN A,(${:02X})", n)
                }
                4 => write!(w, "EX (SP),{}", rp_name(2, prefix, false)),
                5 => w.try_push_str("EX DE,HL").map_err(|_| fmt::Error),
                6 => w.try_push_str("DI").map_err(|_| fmt::Error),
                _ => w.try_push_str("EI").map_err(|_| fmt::Error),
            },
            4 => {
                let nn = r.next_word();
                write!(w, "CALL {},${:04X}", CC[y as usize], nn)
            }
            5 => {
                if q == 0 {
                    write!(w, "PUSH {}", rp_name(p, prefix, true))
                } else if p == 0 {
                    let nn = r.next_word();
                    write!(w, "CALL ${:04X}", nn)
                } else {
                    // A dangling DD/FD prefix decoded on its own.
                    write!(w, "DB ${:02X}", op)
                }
            }
            6 => {
                let n = r.next();
                write!(w, "{} ${:02X}", ALU[y as usize], n)
            }
            _ => write!(w, "RST ${:02X}", y * 8),
        },
    };
}

fn decode_cb<F: Fn(u16) -> u8>(r: &mut Reader<'_, F>, prefix: Option<Prefix>, w: &mut Text) {
    let _ = match prefix {
        None => {
            let op = r.next();
            let x = op >> 6;
            let y = op >> 3 & 7;
            let z = op & 7;
            match x {
                0 => write!(w, "{} {}", ROT[y as usize], R8[z as usize]),
                1 => write!(w, "BIT {},{}", y, R8[z as usize]),
                2 => write!(w, "RES {},{}", y, R8[z as usize]),
                _ => write!(w, "SET {},{}", y, R8[z as usize]),
            }
        }
        Some(pfx) => {
            // Displacement precedes the opcode byte here.
            let d = r.next() as i8;
            let op = r.next();
            let x = op >> 6;
            let y = op >> 3 & 7;
            let z = op & 7;
            let ii = index_name(pfx);
            match (x, z) {
                (0, 6) => write!(w, "{} ({}{:+})", ROT[y as usize], ii, d),
                (0, _) => write!(w, "{} ({}{:+}),{}", ROT[y as usize], ii, d, R8[z as usize]),
                (1, _) => write!(w, "BIT {},({}{:+})", y, ii, d),
                (2, 6) => write!(w, "RES {},({}{:+})", y, ii, d),
                (2, _) => write!(w, "RES {},({}{:+}),{}", y, ii, d, R8[z as usize]),
                (_, 6) => write!(w, "SET {},({}{:+})", y, ii, d),
                _ => write!(w, "SET {},({}{:+}),{}", y, ii, d, R8[z as usize]),
            }
        }
    };
}

fn decode_ed<F: Fn(u16) -> u8>(r: &mut Reader<'_, F>, w: &mut Text) {
    let op = r.next();
    let x = op >> 6;
    let y = op >> 3 & 7;
    let z = op & 7;
    let p = y >> 1;
    let q = y & 1;
    let _ = if x == 1 {
        match z {
            0 => {
                if y == 6 {
                    w.try_push_str("IN (C)").map_err(|_| fmt::Error)
                } else {
                    write!(w, "IN {},(C)", R8[y as usize])
                }
            }
            1 => {
                if y == 6 {
                    w.try_push_str("OUT (C),0").map_err(|_| fmt::Error)
                } else {
                    write!(w, "OUT (C),{}", R8[y as usize])
                }
            }
            2 => {
                if q == 0 {
                    write!(w, "SBC HL,{}", RP[p as usize])
                } else {
                    write!(w, "ADC HL,{}", RP[p as usize])
                }
            }
            3 => {
                let nn = r.next_word();
                if q == 0 {
                    write!(w, "LD (${:04X}),{}", nn, RP[p as usize])
                } else {
                    write!(w, "LD {},(${:04X})", RP[p as usize], nn)
                }
            }
            4 => w.try_push_str("NEG").map_err(|_| fmt::Error),
            5 => {
                if y == 1 {
                    w.try_push_str("RETI").map_err(|_| fmt::Error)
                } else {
                    w.try_push_str("RETN").map_err(|_| fmt::Error)
                }
            }
            6 => {
                const IM: [&str; 4] = ["0", "0/1", "1", "2"];
                write!(w, "IM {}", IM[(y & 3) as usize])
            }
            _ => {
                const MISC: [&str; 8] =
                    ["LD I,A", "LD R,A", "LD A,I", "LD A,R", "RRD", "RLD", "NOP", "NOP"];
                w.try_push_str(MISC[y as usize]).map_err(|_| fmt::Error)
            }
        }
    } else if x == 2 && z <= 3 && y >= 4 {
        const BLK: [[&str; 4]; 4] = [
            ["LDI", "CPI", "INI", "OUTI"],
            ["LDD", "CPD", "IND", "OUTD"],
            ["LDIR", "CPIR", "INIR", "OTIR"],
            ["LDDR", "CPDR", "INDR", "OTDR"],
        ];
        w.try_push_str(BLK[(y - 4) as usize][z as usize])
            .map_err(|_| fmt::Error)
    } else {
        write!(w, "DB $ED,${:02X}", op)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disasm(bytes: &[u8]) -> Instruction {
        disassemble(0, |addr| *bytes.get(addr as usize).unwrap_or(&0))
    }

    #[test]
    fn decodes_basic_opcodes() {
        assert_eq!(disasm(&[0x00]).text(), "NOP");
        assert_eq!(disasm(&[0x00]).len(), 1);
        assert_eq!(disasm(&[0x3E, 0x2A]).text(), "LD A,$2A");
        assert_eq!(disasm(&[0xC3, 0x34, 0x12]).text(), "JP $1234");
        assert_eq!(disasm(&[0x76]).text(), "HALT");
        assert_eq!(disasm(&[0xD3, 0x81]).text(), "OUT ($81),A");
        assert_eq!(disasm(&[0xFE, 0x0D]).text(), "CP $0D");
        assert_eq!(disasm(&[0xC7]).text(), "RST $00");
        assert_eq!(disasm(&[0xFF]).text(), "RST $38");
    }

    #[test]
    fn decodes_relative_targets() {
        // JR -2 at 0: target is 0.
        assert_eq!(disasm(&[0x18, 0xFE]).text(), "JR $0000");
        assert_eq!(disasm(&[0x10, 0x00]).text(), "DJNZ $0002");
        assert_eq!(disasm(&[0x20, 0x05]).text(), "JR NZ,$0007");
    }

    #[test]
    fn decodes_prefixed_forms() {
        let i = disasm(&[0xDD, 0x09]);
        assert_eq!(i.text(), "ADD IX,BC");
        assert_eq!(i.len(), 2);
        let i = disasm(&[0xFD, 0x21, 0x00, 0x80]);
        assert_eq!(i.text(), "LD IY,$8000");
        assert_eq!(i.len(), 4);
        let i = disasm(&[0xDD, 0x7E, 0x05]);
        assert_eq!(i.text(), "LD A,(IX+5)");
        assert_eq!(i.len(), 3);
        let i = disasm(&[0xDD, 0x36, 0xFE, 0x42]);
        assert_eq!(i.text(), "LD (IX-2),$42");
        assert_eq!(i.len(), 4);
        let i = disasm(&[0xDD, 0x64]);
        assert_eq!(i.text(), "LD IXH,IXH");
        assert_eq!(i.len(), 2);
        // A chained prefix: the last one wins, all bytes count.
        let i = disasm(&[0xFD, 0xDD, 0x09]);
        assert_eq!(i.text(), "ADD IX,BC");
        assert_eq!(i.len(), 3);
    }

    #[test]
    fn decodes_cb_forms() {
        assert_eq!(disasm(&[0xCB, 0x00]).text(), "RLC B");
        assert_eq!(disasm(&[0xCB, 0x46]).text(), "BIT 0,(HL)");
        assert_eq!(disasm(&[0xCB, 0xFF]).text(), "SET 7,A");
        let i = disasm(&[0xDD, 0xCB, 0x05, 0x06]);
        assert_eq!(i.text(), "RLC (IX+5)");
        assert_eq!(i.len(), 4);
        let i = disasm(&[0xDD, 0xCB, 0x05, 0x00]);
        assert_eq!(i.text(), "RLC (IX+5),B");
        assert_eq!(i.len(), 4);
        let i = disasm(&[0xFD, 0xCB, 0xFB, 0x7E]);
        assert_eq!(i.text(), "BIT 7,(IY-5)");
        assert_eq!(i.len(), 4);
    }

    #[test]
    fn decodes_ed_forms() {
        assert_eq!(disasm(&[0xED, 0xB0]).text(), "LDIR");
        assert_eq!(disasm(&[0xED, 0x56]).text(), "IM 1");
        assert_eq!(disasm(&[0xED, 0x4D]).text(), "RETI");
        assert_eq!(disasm(&[0xED, 0x45]).text(), "RETN");
        assert_eq!(disasm(&[0xED, 0x78]).text(), "IN A,(C)");
        let i = disasm(&[0xED, 0x43, 0xCD, 0xAB]);
        assert_eq!(i.text(), "LD ($ABCD),BC");
        assert_eq!(i.len(), 4);
        let i = disasm(&[0xED, 0xFF]);
        assert_eq!(i.text(), "DB $ED,$FF");
        assert_eq!(i.len(), 2);
    }

    #[test]
    fn window_walks_instruction_stream() {
        let code = [0x3E, 0x55, 0x32, 0x00, 0x01, 0x76];
        let list = disasm_window(0, 3, |addr| *code.get(addr as usize).unwrap_or(&0));
        assert_eq!(list[0].text(), "LD A,$55");
        assert_eq!(list[1].text(), "LD ($0100),A");
        assert_eq!(list[2].text(), "HALT");
        assert_eq!(list[2].addr(), 5);
    }
}
