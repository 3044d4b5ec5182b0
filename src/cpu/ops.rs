/*
    retro80: RetroShield Z80 single-board computer emulator.
    Copyright (C) 2025  Rafal Michalski

    For the full copyright notice, see the lib.rs file.
*/
//! Arithmetic, logic, rotate, bit and block-operation primitives.
//!
//! Every flag-affecting instruction funnels through one of these helpers so
//! the flag rules, including the undocumented `X`/`Y` copies, live in exactly
//! one place.
use super::flags::CpuFlags;

const SIGN: u8 = 0x80;
const LOW_NIBBLE: u8 = 0x0F;
const HIGH_NIBBLE: u8 = 0xF0;

#[inline]
fn overflow_add(a: u8, b: u8, res: u8) -> bool {
    (!(a ^ b) & (a ^ res) & SIGN) != 0
}

#[inline]
fn overflow_sub(a: u8, b: u8, res: u8) -> bool {
    ((a ^ b) & (a ^ res) & SIGN) != 0
}

#[inline]
fn overflow_add16(a: u16, b: u16, res: u16) -> bool {
    (!(a ^ b) & (a ^ res) & 0x8000) != 0
}

#[inline]
fn overflow_sub16(a: u16, b: u16, res: u16) -> bool {
    ((a ^ b) & (a ^ res) & 0x8000) != 0
}

pub fn add(a: u8, b: u8, flags: &mut CpuFlags) -> u8 {
    adc_carry(a, b, false, flags)
}

pub fn adc(a: u8, b: u8, flags: &mut CpuFlags) -> u8 {
    adc_carry(a, b, flags.cf(), flags)
}

fn adc_carry(a: u8, b: u8, carry: bool, flags: &mut CpuFlags) -> u8 {
    let c = u16::from(carry);
    let sum = u16::from(a) + u16::from(b) + c;
    let res = sum as u8;
    let hf = (u16::from(a & LOW_NIBBLE) + u16::from(b & LOW_NIBBLE) + c) & 0x10 != 0;
    *flags = CpuFlags::mask_szxy(res)
        | CpuFlags::when(CpuFlags::H, hf)
        | CpuFlags::when(CpuFlags::PV, overflow_add(a, b, res))
        | CpuFlags::when(CpuFlags::C, sum > 0xFF);
    res
}

pub fn sub(a: u8, b: u8, flags: &mut CpuFlags) -> u8 {
    sbc_carry(a, b, false, flags)
}

pub fn sbc(a: u8, b: u8, flags: &mut CpuFlags) -> u8 {
    sbc_carry(a, b, flags.cf(), flags)
}

fn sbc_carry(a: u8, b: u8, carry: bool, flags: &mut CpuFlags) -> u8 {
    let c = i16::from(carry);
    let diff = i16::from(a) - i16::from(b) - c;
    let res = diff as u8;
    let hf = (i16::from(a & LOW_NIBBLE) - i16::from(b & LOW_NIBBLE) - c) & 0x10 != 0;
    *flags = CpuFlags::N
        | CpuFlags::mask_szxy(res)
        | CpuFlags::when(CpuFlags::H, hf)
        | CpuFlags::when(CpuFlags::PV, overflow_sub(a, b, res))
        | CpuFlags::when(CpuFlags::C, diff < 0);
    res
}

/// `CP b`: like [sub] but the result is discarded and `X`/`Y` come from the
/// operand rather than the difference.
pub fn cp(a: u8, b: u8, flags: &mut CpuFlags) {
    sub(a, b, flags);
    *flags = (*flags - CpuFlags::XY) | CpuFlags::mask_xy(b);
}

pub fn and(a: u8, b: u8, flags: &mut CpuFlags) -> u8 {
    let res = a & b;
    *flags = CpuFlags::mask_logic(res, true, false);
    res
}

pub fn xor(a: u8, b: u8, flags: &mut CpuFlags) -> u8 {
    let res = a ^ b;
    *flags = CpuFlags::mask_logic(res, false, false);
    res
}

pub fn or(a: u8, b: u8, flags: &mut CpuFlags) -> u8 {
    let res = a | b;
    *flags = CpuFlags::mask_logic(res, false, false);
    res
}

/// `INC r`: carry is preserved.
pub fn inc(val: u8, flags: &mut CpuFlags) -> u8 {
    let res = val.wrapping_add(1);
    *flags = CpuFlags::mask_szxy(res)
        | CpuFlags::when(CpuFlags::H, val & LOW_NIBBLE == 0x0F)
        | CpuFlags::when(CpuFlags::PV, val == 0x7F)
        | (*flags & CpuFlags::C);
    res
}

/// `DEC r`: carry is preserved.
pub fn dec(val: u8, flags: &mut CpuFlags) -> u8 {
    let res = val.wrapping_sub(1);
    *flags = CpuFlags::N
        | CpuFlags::mask_szxy(res)
        | CpuFlags::when(CpuFlags::H, val & LOW_NIBBLE == 0)
        | CpuFlags::when(CpuFlags::PV, val == 0x80)
        | (*flags & CpuFlags::C);
    res
}

pub fn neg(acc: u8, flags: &mut CpuFlags) -> u8 {
    sub(0, acc, flags)
}

pub fn cpl(acc: u8, flags: &mut CpuFlags) -> u8 {
    let res = !acc;
    *flags = (*flags - CpuFlags::XY) | CpuFlags::mask_xy(res) | CpuFlags::H | CpuFlags::N;
    res
}

/// `SCF`: `X`/`Y` from the accumulator.
pub fn scf(acc: u8, flags: &mut CpuFlags) {
    *flags = (*flags & (CpuFlags::S | CpuFlags::Z | CpuFlags::PV))
        | CpuFlags::mask_xy(acc)
        | CpuFlags::C;
}

/// `CCF`: previous carry moves into `H`, `X`/`Y` from the accumulator.
pub fn ccf(acc: u8, flags: &mut CpuFlags) {
    let cf = flags.cf();
    *flags = (*flags & (CpuFlags::S | CpuFlags::Z | CpuFlags::PV))
        | CpuFlags::mask_xy(acc)
        | CpuFlags::when(CpuFlags::H, cf)
        | CpuFlags::when(CpuFlags::C, !cf);
}

/// `ADD HL,rr`: only `H`, `N`, `C` and the `X`/`Y` copies (from the high
/// byte) change.
pub fn add16(val: u16, add: u16, flags: &mut CpuFlags) -> u16 {
    let (res, cf) = val.overflowing_add(add);
    let hf = (val & 0x0FFF) + (add & 0x0FFF) > 0x0FFF;
    *flags = (*flags & (CpuFlags::S | CpuFlags::Z | CpuFlags::PV))
        | CpuFlags::mask_xy((res >> 8) as u8)
        | CpuFlags::when(CpuFlags::H, hf)
        | CpuFlags::when(CpuFlags::C, cf);
    res
}

/// `ADC HL,rr`: a full 16-bit arithmetic result, `S Z X Y` from the high byte.
pub fn adc16(val: u16, add: u16, flags: &mut CpuFlags) -> u16 {
    let c = u32::from(flags.cf());
    let sum = u32::from(val) + u32::from(add) + c;
    let res = sum as u16;
    let hf = (u32::from(val & 0x0FFF) + u32::from(add & 0x0FFF) + c) & 0x1000 != 0;
    *flags = CpuFlags::mask_sxy((res >> 8) as u8)
        | CpuFlags::when(CpuFlags::Z, res == 0)
        | CpuFlags::when(CpuFlags::H, hf)
        | CpuFlags::when(CpuFlags::PV, overflow_add16(val, add, res))
        | CpuFlags::when(CpuFlags::C, sum > 0xFFFF);
    res
}

/// `SBC HL,rr`.
pub fn sbc16(val: u16, sub: u16, flags: &mut CpuFlags) -> u16 {
    let c = i32::from(flags.cf());
    let diff = i32::from(val) - i32::from(sub) - c;
    let res = diff as u16;
    let hf = (i32::from(val & 0x0FFF) - i32::from(sub & 0x0FFF) - c) & 0x1000 != 0;
    *flags = CpuFlags::N
        | CpuFlags::mask_sxy((res >> 8) as u8)
        | CpuFlags::when(CpuFlags::Z, res == 0)
        | CpuFlags::when(CpuFlags::H, hf)
        | CpuFlags::when(CpuFlags::PV, overflow_sub16(val, sub, res))
        | CpuFlags::when(CpuFlags::C, diff < 0);
    res
}

/// `DAA`. The adjustment byte depends only on the carry, half-carry and
/// nibble magnitudes; `N` selects whether it is added or subtracted.
pub fn daa(acc: u8, flags: &mut CpuFlags) -> u8 {
    let cf = flags.cf() || acc > 0x99;
    let low_adjust = flags.hf() || acc & LOW_NIBBLE > 9;
    let mut diff = 0u8;
    if low_adjust {
        diff |= 0x06;
    }
    if cf {
        diff |= 0x60;
    }
    let nf = flags.nf();
    let res = if nf {
        acc.wrapping_sub(diff)
    } else {
        acc.wrapping_add(diff)
    };
    let hf = if nf {
        flags.hf() && acc & LOW_NIBBLE < 6
    } else {
        acc & LOW_NIBBLE > 9
    };
    *flags = CpuFlags::mask_logic(res, hf, cf) | CpuFlags::when(CpuFlags::N, nf);
    res
}

/// `RLCA`: accumulator rotate, `S Z PV` preserved.
pub fn rlca(acc: u8, flags: &mut CpuFlags) -> u8 {
    let res = acc.rotate_left(1);
    *flags = (*flags & (CpuFlags::S | CpuFlags::Z | CpuFlags::PV))
        | CpuFlags::mask_xy(res)
        | CpuFlags::when(CpuFlags::C, res & 1 != 0);
    res
}

/// `RRCA`.
pub fn rrca(acc: u8, flags: &mut CpuFlags) -> u8 {
    let cf = acc & 1 != 0;
    let res = acc.rotate_right(1);
    *flags = (*flags & (CpuFlags::S | CpuFlags::Z | CpuFlags::PV))
        | CpuFlags::mask_xy(res)
        | CpuFlags::when(CpuFlags::C, cf);
    res
}

/// `RLA`: rotate through carry.
pub fn rla(acc: u8, flags: &mut CpuFlags) -> u8 {
    let cf = acc & SIGN != 0;
    let res = acc << 1 | u8::from(flags.cf());
    *flags = (*flags & (CpuFlags::S | CpuFlags::Z | CpuFlags::PV))
        | CpuFlags::mask_xy(res)
        | CpuFlags::when(CpuFlags::C, cf);
    res
}

/// `RRA`.
pub fn rra(acc: u8, flags: &mut CpuFlags) -> u8 {
    let cf = acc & 1 != 0;
    let res = acc >> 1 | u8::from(flags.cf()) << 7;
    *flags = (*flags & (CpuFlags::S | CpuFlags::Z | CpuFlags::PV))
        | CpuFlags::mask_xy(res)
        | CpuFlags::when(CpuFlags::C, cf);
    res
}

pub fn rlc(val: u8, flags: &mut CpuFlags) -> u8 {
    let res = val.rotate_left(1);
    *flags = CpuFlags::mask_logic(res, false, res & 1 != 0);
    res
}

pub fn rrc(val: u8, flags: &mut CpuFlags) -> u8 {
    let cf = val & 1 != 0;
    let res = val.rotate_right(1);
    *flags = CpuFlags::mask_logic(res, false, cf);
    res
}

pub fn rl(val: u8, flags: &mut CpuFlags) -> u8 {
    let cf = val & SIGN != 0;
    let res = val << 1 | u8::from(flags.cf());
    *flags = CpuFlags::mask_logic(res, false, cf);
    res
}

pub fn rr(val: u8, flags: &mut CpuFlags) -> u8 {
    let cf = val & 1 != 0;
    let res = val >> 1 | u8::from(flags.cf()) << 7;
    *flags = CpuFlags::mask_logic(res, false, cf);
    res
}

pub fn sla(val: u8, flags: &mut CpuFlags) -> u8 {
    let cf = val & SIGN != 0;
    let res = val << 1;
    *flags = CpuFlags::mask_logic(res, false, cf);
    res
}

/// Undocumented `SLL`: like `SLA` but shifts a one into bit 0.
pub fn sll(val: u8, flags: &mut CpuFlags) -> u8 {
    let cf = val & SIGN != 0;
    let res = val << 1 | 1;
    *flags = CpuFlags::mask_logic(res, false, cf);
    res
}

pub fn sra(val: u8, flags: &mut CpuFlags) -> u8 {
    let cf = val & 1 != 0;
    let res = (val as i8 >> 1) as u8;
    *flags = CpuFlags::mask_logic(res, false, cf);
    res
}

pub fn srl(val: u8, flags: &mut CpuFlags) -> u8 {
    let cf = val & 1 != 0;
    let res = val >> 1;
    *flags = CpuFlags::mask_logic(res, false, cf);
    res
}

/// `RLD`: returns the new `(accumulator, memory)` pair.
pub fn rld(acc: u8, mem: u8, flags: &mut CpuFlags) -> (u8, u8) {
    let new_acc = acc & HIGH_NIBBLE | mem >> 4;
    let new_mem = mem << 4 | acc & LOW_NIBBLE;
    *flags = CpuFlags::mask_logic(new_acc, false, flags.cf());
    (new_acc, new_mem)
}

/// `RRD`.
pub fn rrd(acc: u8, mem: u8, flags: &mut CpuFlags) -> (u8, u8) {
    let new_acc = acc & HIGH_NIBBLE | mem & LOW_NIBBLE;
    let new_mem = acc << 4 | mem >> 4;
    *flags = CpuFlags::mask_logic(new_acc, false, flags.cf());
    (new_acc, new_mem)
}

/// `BIT n,r`: `X`/`Y` from the tested value.
pub fn bit(n: u8, val: u8, flags: &mut CpuFlags) {
    bit_with_xy(n, val, val, flags);
}

/// `BIT n,(HL)` / `BIT n,(IX+d)`: `X`/`Y` from the high byte of `WZ`.
pub fn bit_mem(n: u8, val: u8, wz_hi: u8, flags: &mut CpuFlags) {
    bit_with_xy(n, val, wz_hi, flags);
}

fn bit_with_xy(n: u8, val: u8, xy_src: u8, flags: &mut CpuFlags) {
    let res = val & 1 << n;
    *flags = CpuFlags::mask_sign(res)
        | CpuFlags::mask_xy(xy_src)
        | CpuFlags::H
        | CpuFlags::when(CpuFlags::Z | CpuFlags::PV, res == 0)
        | (*flags & CpuFlags::C);
}

#[inline]
pub fn res(n: u8, val: u8) -> u8 {
    val & !(1 << n)
}

#[inline]
pub fn set(n: u8, val: u8) -> u8 {
    val | 1 << n
}

/// `LD A,I` / `LD A,R`: `PV` reflects `IFF2`.
pub fn ld_a_ir(val: u8, iff2: bool, flags: &mut CpuFlags) {
    *flags = CpuFlags::mask_szxy(val)
        | CpuFlags::when(CpuFlags::PV, iff2)
        | (*flags & CpuFlags::C);
}

/// `IN r,(C)`: logical-style flags on the input byte, carry preserved.
pub fn io(val: u8, flags: &mut CpuFlags) {
    *flags = CpuFlags::mask_logic(val, false, flags.cf());
}

/// `LDI`/`LDD` flag rule: `X` from bit 3 and `Y` from bit 1 of
/// `transferred + A`, `PV` while `BC` is nonzero.
pub fn ldx(acc: u8, val: u8, bc_nonzero: bool, flags: &mut CpuFlags) {
    let n = val.wrapping_add(acc);
    *flags = (*flags & (CpuFlags::S | CpuFlags::Z | CpuFlags::C))
        | CpuFlags::when(CpuFlags::X, n & 0x08 != 0)
        | CpuFlags::when(CpuFlags::Y, n & 0x02 != 0)
        | CpuFlags::when(CpuFlags::PV, bc_nonzero);
}

/// `CPI`/`CPD` flag rule. Returns `true` when the repeat forms must stop
/// (counter exhausted or a match found).
pub fn cpx(acc: u8, val: u8, bc_nonzero: bool, flags: &mut CpuFlags) -> bool {
    let res = acc.wrapping_sub(val);
    let hf = (acc & LOW_NIBBLE) < (val & LOW_NIBBLE);
    let n = res.wrapping_sub(u8::from(hf));
    *flags = CpuFlags::N
        | CpuFlags::mask_sign(res)
        | CpuFlags::mask_zero(res)
        | CpuFlags::when(CpuFlags::H, hf)
        | CpuFlags::when(CpuFlags::X, n & 0x08 != 0)
        | CpuFlags::when(CpuFlags::Y, n & 0x02 != 0)
        | CpuFlags::when(CpuFlags::PV, bc_nonzero)
        | (*flags & CpuFlags::C);
    !bc_nonzero || res == 0
}

/// `INI`/`IND`/`OUTI`/`OUTD` flag rule. `b` is the decremented counter,
/// `m` the companion byte (`C±1` for input, `L` for output forms).
pub fn iox(val: u8, b: u8, m: u8, flags: &mut CpuFlags) {
    let (k, hcf) = val.overflowing_add(m);
    *flags = CpuFlags::mask_szxy(b)
        | CpuFlags::when(CpuFlags::N, val & SIGN != 0)
        | CpuFlags::when(CpuFlags::H | CpuFlags::C, hcf)
        | CpuFlags::parity(k & 7 ^ b);
}
