//! The Z80's physical register file, modeled the way
//! `cranelift-codegen`'s `regalloc/register_set.rs` models a target's
//! register banks — as a small fixed enumeration rather than a
//! general-purpose register-class table, since the Z80 exposes only a
//! handful of named registers and no uniform class structure (`HL`
//! decomposes into `H`/`L` but `IX`/`IY` do not decompose usefully for
//! 8-bit allocation).

use std::fmt;

/// An 8-bit physical register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg8 {
    A,
    B,
    C,
    D,
    E,
    H,
    L,
}

impl Reg8 {
    pub const ALL: [Reg8; 7] = [Reg8::A, Reg8::B, Reg8::C, Reg8::D, Reg8::E, Reg8::H, Reg8::L];
}

impl fmt::Display for Reg8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Reg8::A => "A",
            Reg8::B => "B",
            Reg8::C => "C",
            Reg8::D => "D",
            Reg8::E => "E",
            Reg8::H => "H",
            Reg8::L => "L",
        };
        write!(f, "{s}")
    }
}

/// A 16-bit physical register pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg16 {
    Hl,
    De,
    Bc,
    Ix,
    Iy,
}

impl Reg16 {
    pub const ALL: [Reg16; 5] = [Reg16::Hl, Reg16::De, Reg16::Bc, Reg16::Ix, Reg16::Iy];
}

impl fmt::Display for Reg16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Reg16::Hl => "HL",
            Reg16::De => "DE",
            Reg16::Bc => "BC",
            Reg16::Ix => "IX",
            Reg16::Iy => "IY",
        };
        write!(f, "{s}")
    }
}

/// Where a virtual register ended up living (spec §4.15's three
/// tiers): a physical register, its shadow-bank counterpart (reached
/// through `EX AF,AF'`/`EXX`), or a memory spill slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysicalLoc {
    Reg8(Reg8),
    Reg16(Reg16),
    ShadowReg8(Reg8),
    ShadowReg16(Reg16),
    /// Offset from `IX` for an `(IX+d)` spill cell.
    Spill { offset: i16, width: u32 },
}

impl fmt::Display for PhysicalLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhysicalLoc::Reg8(r) => write!(f, "{r}"),
            PhysicalLoc::Reg16(r) => write!(f, "{r}"),
            PhysicalLoc::ShadowReg8(r) => write!(f, "{r}'"),
            PhysicalLoc::ShadowReg16(r) => write!(f, "{r}'"),
            PhysicalLoc::Spill { offset, .. } => write!(f, "(IX{:+})", offset),
        }
    }
}
