//! Specifiers for all supported CSRs.
//!
//! Besides the standard machine, supervisor and user registers this includes the vector CSRs,
//! a minimal set of debug/trigger registers, and the custom registers used as side channels by
//! the surrounding test bench.

use crate::RawPrivilegeLevel;

/// General 12-bit value representing a CSR specifier. Note that this can hold any 12-bit value,
/// even if the value represents an unsupported or non-existent CSR.
pub type CsrSpecifier = u16;

//
// Unprivileged floating-point CSRs (`0x001..=0x003`).
//
/// Floating-point accrued exceptions.
pub const FFLAGS: CsrSpecifier = 0x001;
/// Floating-point dynamic rounding mode.
pub const FRM: CsrSpecifier = 0x002;
/// Floating-point CSR ([`FRM`] + [`FFLAGS`]).
pub const FCSR: CsrSpecifier = 0x003;

//
// Unprivileged vector CSRs.
//
/// Vector start element index.
pub const VSTART: CsrSpecifier = 0x008;
/// Fixed-point saturation flag.
pub const VXSAT: CsrSpecifier = 0x009;
/// Fixed-point rounding mode.
pub const VXRM: CsrSpecifier = 0x00A;
/// Vector control and status ([`VXRM`] + [`VXSAT`]).
pub const VCSR: CsrSpecifier = 0x00F;
/// Vector length.
pub const VL: CsrSpecifier = 0xC20;
/// Vector data type.
pub const VTYPE: CsrSpecifier = 0xC21;
/// Vector register length in bytes.
pub const VLENB: CsrSpecifier = 0xC22;

//
// Unprivileged counters/timers (`0xC00..=0xC1F`, `0xC80..=0xC9F`).
//
/// Cycle counter for RDCYCLE instruction.
pub const CYCLE: CsrSpecifier = 0xC00;
/// Timer for RDTIME instruction.
pub const TIME: CsrSpecifier = 0xC01;
/// Instructions-retired counter for RDINSTRET instruction.
pub const INSTRET: CsrSpecifier = 0xC02;
/// First performance-monitoring counter; `hpmcounter3..=hpmcounter31` follow contiguously.
pub const HPMCOUNTER3: CsrSpecifier = 0xC03;
pub const HPMCOUNTER31: CsrSpecifier = 0xC1F;
/// Upper 32 bits of [`CYCLE`], RV32 only.
pub const CYCLEH: CsrSpecifier = 0xC80;
/// Upper 32 bits of [`TIME`], RV32 only.
pub const TIMEH: CsrSpecifier = 0xC81;
/// Upper 32 bits of [`INSTRET`], RV32 only.
pub const INSTRETH: CsrSpecifier = 0xC82;
pub const HPMCOUNTER3H: CsrSpecifier = 0xC83;
pub const HPMCOUNTER31H: CsrSpecifier = 0xC9F;

//
// Supervisor trap setup, handling and protection.
//
/// Supervisor status register.
pub const SSTATUS: CsrSpecifier = 0x100;
/// Supervisor interrupt-enable register.
pub const SIE: CsrSpecifier = 0x104;
/// Supervisor trap handler base address.
pub const STVEC: CsrSpecifier = 0x105;
/// Supervisor counter enable.
pub const SCOUNTEREN: CsrSpecifier = 0x106;
/// Scratch register for supervisor trap handlers.
pub const SSCRATCH: CsrSpecifier = 0x140;
/// Supervisor exception program counter.
pub const SEPC: CsrSpecifier = 0x141;
/// Supervisor trap cause.
pub const SCAUSE: CsrSpecifier = 0x142;
/// Supervisor bad address or instruction.
pub const STVAL: CsrSpecifier = 0x143;
/// Supervisor interrupt pending.
pub const SIP: CsrSpecifier = 0x144;
/// Supervisor address translation and protection.
pub const SATP: CsrSpecifier = 0x180;
/// Supervisor secondary trap cause (custom).
pub const SSCAUSE: CsrSpecifier = 0x5FF;

//
// Machine information registers.
//
pub const MVENDORID: CsrSpecifier = 0xF11;
pub const MARCHID: CsrSpecifier = 0xF12;
pub const MIMPID: CsrSpecifier = 0xF13;
pub const MHARTID: CsrSpecifier = 0xF14;

//
// Machine trap setup and handling.
//
/// Machine status register.
pub const MSTATUS: CsrSpecifier = 0x300;
/// ISA and extensions.
pub const MISA: CsrSpecifier = 0x301;
/// Machine exception delegation register.
pub const MEDELEG: CsrSpecifier = 0x302;
/// Machine interrupt delegation register.
pub const MIDELEG: CsrSpecifier = 0x303;
/// Machine interrupt-enable register.
pub const MIE: CsrSpecifier = 0x304;
/// Machine trap-handler base address.
pub const MTVEC: CsrSpecifier = 0x305;
/// Machine counter enable.
pub const MCOUNTEREN: CsrSpecifier = 0x306;
/// Additional machine status register, RV32 only.
pub const MSTATUSH: CsrSpecifier = 0x310;
/// Machine counter-inhibit register.
pub const MCOUNTINHIBIT: CsrSpecifier = 0x320;
/// First machine performance-monitoring event selector (`mhpmevent3..=mhpmevent31`).
pub const MHPMEVENT3: CsrSpecifier = 0x323;
pub const MHPMEVENT31: CsrSpecifier = 0x33F;
/// Scratch register for machine trap handlers.
pub const MSCRATCH: CsrSpecifier = 0x340;
/// Machine exception program counter.
pub const MEPC: CsrSpecifier = 0x341;
/// Machine trap cause.
pub const MCAUSE: CsrSpecifier = 0x342;
/// Machine bad address or instruction.
pub const MTVAL: CsrSpecifier = 0x343;
/// Machine interrupt pending.
pub const MIP: CsrSpecifier = 0x344;
/// Machine secondary trap cause (custom).
pub const MSCAUSE: CsrSpecifier = 0x7FF;

//
// Machine memory protection.
//
/// First physical memory protection configuration register (`pmpcfg0..=pmpcfg3`).
pub const PMPCFG0: CsrSpecifier = 0x3A0;
pub const PMPCFG3: CsrSpecifier = 0x3A3;
/// First physical memory protection address register (`pmpaddr0..=pmpaddr15`).
pub const PMPADDR0: CsrSpecifier = 0x3B0;
pub const PMPADDR15: CsrSpecifier = 0x3BF;

//
// Machine counters/timers.
//
/// Machine cycle counter.
pub const MCYCLE: CsrSpecifier = 0xB00;
/// Machine instructions-retired counter.
pub const MINSTRET: CsrSpecifier = 0xB02;
/// First machine performance-monitoring counter (`mhpmcounter3..=mhpmcounter31`).
pub const MHPMCOUNTER3: CsrSpecifier = 0xB03;
pub const MHPMCOUNTER31: CsrSpecifier = 0xB1F;
/// Upper 32 bits of [`MCYCLE`], RV32 only.
pub const MCYCLEH: CsrSpecifier = 0xB80;
/// Upper 32 bits of [`MINSTRET`], RV32 only.
pub const MINSTRETH: CsrSpecifier = 0xB82;
pub const MHPMCOUNTER3H: CsrSpecifier = 0xB83;
pub const MHPMCOUNTER31H: CsrSpecifier = 0xB9F;

//
// Debug and trigger registers.
//
/// Debug/trace trigger register select.
pub const TSELECT: CsrSpecifier = 0x7A0;
pub const TDATA1: CsrSpecifier = 0x7A1;
pub const TDATA2: CsrSpecifier = 0x7A2;
pub const TDATA3: CsrSpecifier = 0x7A3;
/// Debug control and status register.
pub const DCSR: CsrSpecifier = 0x7B0;
/// Debug program counter.
pub const DPC: CsrSpecifier = 0x7B1;
/// Debug scratch register.
pub const DSCRATCH: CsrSpecifier = 0x7B2;

//
// Custom bus-error side channels.
//
/// Unlocks [`MDSEAC`] on write.
pub const MDEAU: CsrSpecifier = 0xBC0;
/// Upper 32 bits of the last wide load.
pub const MDBHD: CsrSpecifier = 0xBC7;
/// Latched address of the first data bus error since the last unlock. Read-only.
pub const MDSEAC: CsrSpecifier = 0xFC0;

/// Returns `true` if the CSR is read-only by number.
///
/// > The top two bits (csr[11:10]) indicate whether the register is read/write (00, 01, or 10) or
/// > read-only (11).
pub fn is_read_only(specifier: CsrSpecifier) -> bool {
    (specifier >> 10) & 0b11 == 0b11
}

/// Returns the lowest privilege level that can access the CSR.
///
/// > The next two bits (csr[9:8]) encode the lowest privilege level that can access the CSR.
pub fn required_privilege_level(specifier: CsrSpecifier) -> RawPrivilegeLevel {
    RawPrivilegeLevel::from_u2(((specifier >> 8) & 0b11) as u8)
}

/// Returns `true` for the registers that are only accessible in debug mode.
pub fn is_debug_only(specifier: CsrSpecifier) -> bool {
    (DCSR..=0x7BF).contains(&specifier)
}

/// Returns `true` for the RV32-only upper halves of 64-bit registers.
pub fn is_high_half(specifier: CsrSpecifier) -> bool {
    matches!(specifier, CYCLEH..=HPMCOUNTER31H | MCYCLEH..=MHPMCOUNTER31H | MSTATUSH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_bits() {
        assert!(is_read_only(CYCLE));
        assert!(is_read_only(MDSEAC));
        assert!(is_read_only(MHARTID));
        assert!(!is_read_only(MSTATUS));
        assert!(!is_read_only(MDBHD));
        assert_eq!(required_privilege_level(FFLAGS), RawPrivilegeLevel::User);
        assert_eq!(required_privilege_level(SATP), RawPrivilegeLevel::Supervisor);
        assert_eq!(required_privilege_level(MSTATUS), RawPrivilegeLevel::Machine);
        assert_eq!(required_privilege_level(SSCAUSE), RawPrivilegeLevel::Supervisor);
        assert!(is_debug_only(DPC));
        assert!(!is_debug_only(TDATA1));
        assert!(is_high_half(INSTRETH));
        assert!(!is_high_half(INSTRET));
    }
}
