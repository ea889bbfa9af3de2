//! Functional instruction-set simulator for a single RISC-V hart.
//!
//! The hart supports RV32 and RV64 with the M, A, F, D, Zfh, C, bit-manipulation and vector
//! extensions, machine/supervisor/user privilege, PMP, Sv32/Sv39 paging, and a builtin-dispatch
//! hook through which simulated code calls out into host logic.
//!
//! The simulator is functional: every [`hart::Hart::step`] retires (or traps on) exactly one
//! instruction, without any notion of pipeline timing.

#[macro_use]
extern crate static_assertions;

use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

pub mod address_range;
pub mod builtin;
pub mod catalog;
pub mod cause;
pub mod csr;
pub mod decode;
pub mod decode_cache;
pub mod float;
pub mod hart;
pub mod load_queue;
pub mod memory;
pub mod pmp;
pub mod regions;
pub mod registers;
pub mod vm;

/// Re-export of [`AddressRange`] for convenience.
pub use address_range::AddressRange;

/// List of all possible privilege levels for RISC-V.
///
/// Same as [`PrivilegeLevel`] except that it allows specifying the reserved privilege level `2`.
/// This can be useful in case a minimum required privilege level is specified as a 2-bit value,
/// since that value itself may be a reserved privilege level.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub enum RawPrivilegeLevel {
    User = 0,
    Supervisor = 1,
    /// Privilege level `0b10` is reserved in the base ISA.
    Reserved = 2,
    Machine = 3,
}

impl RawPrivilegeLevel {
    /// Convert a 2-bit value into a [`RawPrivilegeLevel`].
    /// Panics if the value doesn't fit in 2 bits (`0..=3`).
    pub fn from_u2(value_u2: u8) -> Self {
        match value_u2 {
            0 => Self::User,
            1 => Self::Supervisor,
            2 => Self::Reserved,
            3 => Self::Machine,
            _ => panic!("out of range u2 used"),
        }
    }

    pub fn is_reserved(self) -> bool {
        matches!(self, Self::Reserved)
    }
}

impl fmt::Display for RawPrivilegeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            RawPrivilegeLevel::User => "U",
            RawPrivilegeLevel::Supervisor => "S",
            RawPrivilegeLevel::Reserved => "2",
            RawPrivilegeLevel::Machine => "M",
        })
    }
}

/// List of defined privilege levels for RISC-V.
///
/// > The machine level has the highest privileges and is the only mandatory privilege level for a
/// > RISC-V hardware platform. User-mode (U-mode) and supervisor-mode (S-mode) are intended for
/// > conventional application and operating system usage respectively.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum PrivilegeLevel {
    /// User/application (abbreviated `U`) is the lower privilege level.
    User = 0,
    /// Supervisor (abbreviated `S`) is an intermediate privilege level.
    Supervisor = 1,
    // Level 2 is reserved
    /// Machine (abbreviated `M`) is the highest privilege level.
    Machine = 3,
}

impl PrivilegeLevel {
    /// Returns the 2-bit encoding used in `mstatus.MPP` and CSR numbers.
    pub fn as_u2(self) -> u8 {
        self as u8
    }
}

impl PartialEq<PrivilegeLevel> for RawPrivilegeLevel {
    fn eq(&self, other: &PrivilegeLevel) -> bool {
        *self as usize == *other as usize
    }
}

impl PartialEq<RawPrivilegeLevel> for PrivilegeLevel {
    fn eq(&self, other: &RawPrivilegeLevel) -> bool {
        *self as usize == *other as usize
    }
}

impl PartialOrd<PrivilegeLevel> for RawPrivilegeLevel {
    fn partial_cmp(&self, other: &PrivilegeLevel) -> Option<Ordering> {
        (*self as usize).partial_cmp(&(*other as usize))
    }
}

impl PartialOrd<RawPrivilegeLevel> for PrivilegeLevel {
    fn partial_cmp(&self, other: &RawPrivilegeLevel) -> Option<Ordering> {
        (*self as usize).partial_cmp(&(*other as usize))
    }
}

impl fmt::Display for PrivilegeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            PrivilegeLevel::User => "U",
            PrivilegeLevel::Supervisor => "S",
            PrivilegeLevel::Machine => "M",
        })
    }
}

impl From<PrivilegeLevel> for RawPrivilegeLevel {
    fn from(value: PrivilegeLevel) -> Self {
        match value {
            PrivilegeLevel::User => Self::User,
            PrivilegeLevel::Supervisor => Self::Supervisor,
            PrivilegeLevel::Machine => Self::Machine,
        }
    }
}

impl TryFrom<RawPrivilegeLevel> for PrivilegeLevel {
    type Error = ReservedPrivilegeLevelError;
    fn try_from(value: RawPrivilegeLevel) -> Result<Self, Self::Error> {
        match value {
            RawPrivilegeLevel::User => Ok(Self::User),
            RawPrivilegeLevel::Supervisor => Ok(Self::Supervisor),
            RawPrivilegeLevel::Reserved => Err(ReservedPrivilegeLevelError(value)),
            RawPrivilegeLevel::Machine => Ok(Self::Machine),
        }
    }
}

#[derive(Error, Debug)]
#[error("privilege level {0} is reserved")]
pub struct ReservedPrivilegeLevelError(RawPrivilegeLevel);

/// Width of the integer registers of a hart.
///
/// Registers are always stored as `u64`. On RV32 every stored value is kept *canonical*: bits
/// 63..32 are a sign extension of bit 31, so that the same arithmetic works for both widths.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum Xlen {
    #[default]
    Rv32,
    Rv64,
}

impl Xlen {
    pub fn bits(self) -> u32 {
        match self {
            Xlen::Rv32 => 32,
            Xlen::Rv64 => 64,
        }
    }

    pub fn bytes(self) -> u32 {
        self.bits() / 8
    }

    /// Mask of the architecturally visible register bits.
    pub fn mask(self) -> u64 {
        match self {
            Xlen::Rv32 => 0xffff_ffff,
            Xlen::Rv64 => u64::MAX,
        }
    }

    /// Mask applied to shift amounts taken from a register.
    pub fn shamt_mask(self) -> u64 {
        (self.bits() - 1) as u64
    }

    /// Brings `value` into the canonical register representation.
    pub fn canonical(self, value: u64) -> u64 {
        match self {
            Xlen::Rv32 => value as u32 as i32 as i64 as u64,
            Xlen::Rv64 => value,
        }
    }

    /// Truncates a canonical value to an address of this width.
    pub fn address(self, value: u64) -> u64 {
        value & self.mask()
    }

    pub fn is_rv64(self) -> bool {
        matches!(self, Xlen::Rv64)
    }
}

impl fmt::Display for Xlen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RV{}", self.bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_rv32_values_are_sign_extended() {
        assert_eq!(Xlen::Rv32.canonical(0x8000_0000), 0xffff_ffff_8000_0000);
        assert_eq!(Xlen::Rv32.canonical(0x1_7fff_ffff), 0x7fff_ffff);
        assert_eq!(Xlen::Rv64.canonical(0x8000_0000), 0x8000_0000);
        assert_eq!(Xlen::Rv32.address(0xffff_ffff_8000_0000), 0x8000_0000);
    }

    #[test]
    fn privilege_ordering() {
        assert!(PrivilegeLevel::User < PrivilegeLevel::Supervisor);
        assert!(RawPrivilegeLevel::Reserved > PrivilegeLevel::Supervisor);
        assert!(PrivilegeLevel::try_from(RawPrivilegeLevel::Reserved).is_err());
        assert_eq!(RawPrivilegeLevel::from_u2(3), PrivilegeLevel::Machine);
    }
}
