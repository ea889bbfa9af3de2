//! Exception, interrupt and NMI cause encodings.
//!
//! Architectural exceptions are plain values here, not Rust errors: an instruction that faults
//! produces an [`Exception`] that the trap subsystem consumes.

use std::fmt;

/// Synchronous exception causes, as encoded in the `mcause`/`scause` exception code.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ExceptionCause {
    /// Instruction address is not on a two-byte aligned boundary in memory.
    InstructionAddressMisaligned,
    InstructionAccessFault,
    /// Generic exception used to communicate one of many possible scenarios:
    ///
    /// - Attempt to execute an encoding that decodes to the illegal identifier.
    /// - Attempt to execute an instruction of a disabled extension, or with an invalid `vtype`.
    /// - Attempt to access a non-existent CSR.
    /// - Attempt to access a CSR without the appropriate privilege level.
    /// - Attempt to write to a read-only CSR.
    IllegalInstruction,
    Breakpoint,
    LoadAddressMisaligned,
    LoadAccessFault,
    StoreOrAmoAddressMisaligned,
    StoreOrAmoAccessFault,
    EnvironmentCallFromUMode,
    EnvironmentCallFromSMode,
    EnvironmentCallFromMMode,
    InstructionPageFault,
    LoadPageFault,
    StoreOrAmoPageFault,
}

impl ExceptionCause {
    /// Returns the exception code (cause) for this exception.
    pub fn code(self) -> u64 {
        match self {
            Self::InstructionAddressMisaligned => 0,
            Self::InstructionAccessFault => 1,
            Self::IllegalInstruction => 2,
            Self::Breakpoint => 3,
            Self::LoadAddressMisaligned => 4,
            Self::LoadAccessFault => 5,
            Self::StoreOrAmoAddressMisaligned => 6,
            Self::StoreOrAmoAccessFault => 7,
            Self::EnvironmentCallFromUMode => 8,
            Self::EnvironmentCallFromSMode => 9,
            Self::EnvironmentCallFromMMode => 11,
            Self::InstructionPageFault => 12,
            Self::LoadPageFault => 13,
            Self::StoreOrAmoPageFault => 15,
        }
    }

    /// Returns `true` for the three access-fault causes.
    pub fn is_access_fault(self) -> bool {
        matches!(
            self,
            Self::InstructionAccessFault | Self::LoadAccessFault | Self::StoreOrAmoAccessFault
        )
    }
}

/// Implementation-specific refinement of an exception cause, reported through the `mscause` and
/// `sscause` CSRs.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum SecondaryCause {
    #[default]
    None,
    /// Denied by physical memory protection.
    Pmp,
    /// Breakpoint raised by a trigger rather than an `ebreak`.
    TriggerHit,
    /// Physical address outside of the backing memory.
    OutOfBounds,
    /// Misaligned access to a memory-mapped register region.
    MemMapped,
    /// Wide (64-bit) access to a misaligned or non-external address.
    Acc64Bit,
    /// Misaligned access whose first and last byte lie in different regions.
    MisalRegionCross,
    /// Misaligned access touching a non-idempotent region.
    MisalIo,
    /// Fetch failure injected by the host.
    Precise,
    /// Uncorrectable ECC error injected by the host.
    DoubleEcc,
}

impl SecondaryCause {
    pub fn code(self) -> u64 {
        match self {
            Self::None => 0,
            Self::Pmp | Self::TriggerHit => 1,
            Self::OutOfBounds => 2,
            Self::MemMapped => 3,
            Self::Acc64Bit => 4,
            Self::MisalRegionCross => 5,
            Self::MisalIo => 6,
            Self::Precise => 7,
            Self::DoubleEcc => 8,
        }
    }
}

/// A synchronous exception raised by an instruction, ready to be taken as a trap.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Exception {
    pub cause: ExceptionCause,
    pub secondary: SecondaryCause,
    /// Value written to `mtval`/`stval`.
    pub tval: u64,
}

impl Exception {
    pub fn new(cause: ExceptionCause, tval: u64) -> Self {
        Self {
            cause,
            secondary: SecondaryCause::None,
            tval,
        }
    }

    pub fn with_secondary(mut self, secondary: SecondaryCause) -> Self {
        self.secondary = secondary;
        self
    }

    /// An illegal-instruction exception reporting `raw` as the trap value.
    pub fn illegal_instruction(raw: u32) -> Self {
        Self::new(ExceptionCause::IllegalInstruction, raw as u64)
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} (tval {:#x}", self.cause, self.tval)?;
        if self.secondary != SecondaryCause::None {
            write!(f, ", {:?}", self.secondary)?;
        }
        f.write_str(")")
    }
}

/// Asynchronous interrupt causes, including the custom machine-local ones.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum InterruptCause {
    UserSoftware,
    SupervisorSoftware,
    MachineSoftware,
    UserTimer,
    SupervisorTimer,
    MachineTimer,
    UserExternal,
    SupervisorExternal,
    MachineExternal,
    /// Custom internal timer 1.
    MachineInternalTimer1,
    /// Custom internal timer 0.
    MachineInternalTimer0,
    /// Custom machine-local interrupt.
    MachineLocal,
}

impl InterruptCause {
    /// Interrupts in decreasing priority order, as used when several are pending at once.
    pub const PRIORITY: [Self; 12] = [
        Self::MachineExternal,
        Self::MachineLocal,
        Self::MachineSoftware,
        Self::MachineTimer,
        Self::MachineInternalTimer0,
        Self::MachineInternalTimer1,
        Self::SupervisorExternal,
        Self::SupervisorSoftware,
        Self::SupervisorTimer,
        Self::UserExternal,
        Self::UserSoftware,
        Self::UserTimer,
    ];

    /// Returns the exception code (cause) for this interrupt, which is also its bit index in
    /// `mip`/`mie`.
    pub fn code(self) -> u64 {
        match self {
            Self::UserSoftware => 0,
            Self::SupervisorSoftware => 1,
            Self::MachineSoftware => 3,
            Self::UserTimer => 4,
            Self::SupervisorTimer => 5,
            Self::MachineTimer => 7,
            Self::UserExternal => 8,
            Self::SupervisorExternal => 9,
            Self::MachineExternal => 11,
            Self::MachineInternalTimer1 => 28,
            Self::MachineInternalTimer0 => 29,
            Self::MachineLocal => 30,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        Self::PRIORITY.into_iter().find(|cause| cause.code() == code)
    }
}

/// Cause of a non-maskable interrupt, written verbatim to `mcause`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum NmiCause {
    Unknown,
    StoreException,
    LoadException,
    DoubleBitEcc,
    DccmAccessError,
    NonDccmAccessError,
}

impl NmiCause {
    pub fn code(self) -> u64 {
        match self {
            Self::Unknown => 0,
            Self::StoreException => 0xf000_0000,
            Self::LoadException => 0xf000_0001,
            Self::DoubleBitEcc => 0xf000_0002,
            Self::DccmAccessError => 0xf000_0003,
            Self::NonDccmAccessError => 0xf000_0004,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_codes_round_trip() {
        for cause in InterruptCause::PRIORITY {
            assert_eq!(InterruptCause::from_code(cause.code()), Some(cause));
        }
        assert_eq!(InterruptCause::from_code(2), None);
    }

    #[test]
    fn illegal_instruction_reports_raw_encoding() {
        let exception = Exception::illegal_instruction(0xffff_ffff);
        assert_eq!(exception.cause.code(), 2);
        assert_eq!(exception.tval, 0xffff_ffff);
        assert_eq!(exception.secondary, SecondaryCause::None);
    }
}
