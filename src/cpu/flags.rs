/*
    retro80: RetroShield Z80 single-board computer emulator.
    Copyright (C) 2025  Rafal Michalski

    For the full copyright notice, see the lib.rs file.
*/
//! Flags register bits and the helper constructors the ALU builds its results from.
use bitflags::bitflags;

bitflags! {
    /// The Z80 flags register.
    ///
    /// `X` and `Y` are the undocumented copies of bits 3 and 5 of whatever
    /// the last flag-affecting operation produced.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
    pub struct CpuFlags: u8 {
        /// Sign.
        const S  = 0b1000_0000;
        /// Zero.
        const Z  = 0b0100_0000;
        /// Undocumented bit 5.
        const Y  = 0b0010_0000;
        /// Half carry.
        const H  = 0b0001_0000;
        /// Undocumented bit 3.
        const X  = 0b0000_1000;
        /// Parity (logical ops) or overflow (arithmetic ops).
        const PV = 0b0000_0100;
        /// Add/subtract.
        const N  = 0b0000_0010;
        /// Carry.
        const C  = 0b0000_0001;
        /// Both undocumented bits.
        const XY = Self::X.bits() | Self::Y.bits();
    }
}

impl CpuFlags {
    #[inline]
    pub fn cf(self) -> bool {
        self.contains(CpuFlags::C)
    }

    #[inline]
    pub fn hf(self) -> bool {
        self.contains(CpuFlags::H)
    }

    #[inline]
    pub fn nf(self) -> bool {
        self.contains(CpuFlags::N)
    }

    #[inline]
    pub fn zf(self) -> bool {
        self.contains(CpuFlags::Z)
    }

    #[inline]
    pub fn sf(self) -> bool {
        self.contains(CpuFlags::S)
    }

    #[inline]
    pub fn pvf(self) -> bool {
        self.contains(CpuFlags::PV)
    }

    /// `flag` when `on`, empty otherwise.
    #[inline]
    pub fn when(flag: CpuFlags, on: bool) -> CpuFlags {
        if on {
            flag
        } else {
            CpuFlags::empty()
        }
    }

    /// `S` from bit 7 of `res`.
    #[inline]
    pub fn mask_sign(res: u8) -> CpuFlags {
        CpuFlags::from_bits_truncate(res & CpuFlags::S.bits())
    }

    /// `Z` when `res` is zero.
    #[inline]
    pub fn mask_zero(res: u8) -> CpuFlags {
        CpuFlags::when(CpuFlags::Z, res == 0)
    }

    /// `X`/`Y` copied from bits 3 and 5 of `res`.
    #[inline]
    pub fn mask_xy(res: u8) -> CpuFlags {
        CpuFlags::from_bits_truncate(res & CpuFlags::XY.bits())
    }

    /// `S`, `X` and `Y` copied from `res`.
    #[inline]
    pub fn mask_sxy(res: u8) -> CpuFlags {
        CpuFlags::from_bits_truncate(res & (CpuFlags::S.bits() | CpuFlags::XY.bits()))
    }

    /// `S`, `Z`, `X` and `Y` from `res`.
    #[inline]
    pub fn mask_szxy(res: u8) -> CpuFlags {
        CpuFlags::mask_sxy(res) | CpuFlags::mask_zero(res)
    }

    /// `PV` when `res` has even parity.
    #[inline]
    pub fn parity(res: u8) -> CpuFlags {
        CpuFlags::when(CpuFlags::PV, res.count_ones() & 1 == 0)
    }

    /// The full flag set of a logical or rotate result: `S Z X Y` and parity
    /// from `res`, `H` and `C` as given, `N` reset.
    #[inline]
    pub fn mask_logic(res: u8, hf: bool, cf: bool) -> CpuFlags {
        CpuFlags::mask_szxy(res)
            | CpuFlags::parity(res)
            | CpuFlags::when(CpuFlags::H, hf)
            | CpuFlags::when(CpuFlags::C, cf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_bits_match_register_layout() {
        assert_eq!(CpuFlags::S.bits(), 0x80);
        assert_eq!(CpuFlags::Z.bits(), 0x40);
        assert_eq!(CpuFlags::Y.bits(), 0x20);
        assert_eq!(CpuFlags::H.bits(), 0x10);
        assert_eq!(CpuFlags::X.bits(), 0x08);
        assert_eq!(CpuFlags::PV.bits(), 0x04);
        assert_eq!(CpuFlags::N.bits(), 0x02);
        assert_eq!(CpuFlags::C.bits(), 0x01);
    }

    #[test]
    fn masks_work() {
        assert_eq!(CpuFlags::mask_sign(0x80), CpuFlags::S);
        assert_eq!(CpuFlags::mask_sign(0x7F), CpuFlags::empty());
        assert_eq!(CpuFlags::mask_zero(0), CpuFlags::Z);
        assert_eq!(CpuFlags::mask_zero(1), CpuFlags::empty());
        assert_eq!(CpuFlags::mask_xy(0xFF), CpuFlags::XY);
        assert_eq!(CpuFlags::mask_xy(0x08), CpuFlags::X);
        assert_eq!(CpuFlags::mask_xy(0xF7), CpuFlags::Y);
        assert_eq!(CpuFlags::mask_sxy(0xA8), CpuFlags::S | CpuFlags::XY);
        assert_eq!(CpuFlags::parity(0), CpuFlags::PV);
        assert_eq!(CpuFlags::parity(1), CpuFlags::empty());
        assert_eq!(CpuFlags::parity(3), CpuFlags::PV);
        assert_eq!(CpuFlags::parity(0xFF), CpuFlags::PV);
    }

    #[test]
    fn logic_mask_works() {
        assert_eq!(
            CpuFlags::mask_logic(0, false, false),
            CpuFlags::Z | CpuFlags::PV
        );
        assert_eq!(
            CpuFlags::mask_logic(0, true, true),
            CpuFlags::Z | CpuFlags::PV | CpuFlags::H | CpuFlags::C
        );
        assert_eq!(CpuFlags::mask_logic(0x80, false, false), CpuFlags::S);
        assert_eq!(
            CpuFlags::mask_logic(0xA9, false, false),
            CpuFlags::S | CpuFlags::XY | CpuFlags::PV
        );
    }
}
