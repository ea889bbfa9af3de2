use bitvec::{field::BitField, order::Lsb0, view::BitView};

use super::triggers::Triggers;
use crate::{PrivilegeLevel, RawPrivilegeLevel, Xlen};

/// Bit indices into dcsr.
mod idx {
    pub const PRV: usize = 0;
    pub const STEP: usize = 2;
    pub const NMIP: usize = 3;
    pub const CAUSE: usize = 6;
    pub const STOPTIME: usize = 9;
    pub const STOPCOUNT: usize = 10;
    pub const STEPIE: usize = 11;
    pub const EBREAKU: usize = 12;
    pub const EBREAKS: usize = 13;
    pub const EBREAKM: usize = 15;
    pub const XDEBUGVER: usize = 28;
}

#[allow(clippy::identity_op)]
const DCSR_WRITABLE: u32 = 0
    | (0b11 << idx::PRV)
    | (1 << idx::STEP)
    | (1 << idx::STOPTIME)
    | (1 << idx::STOPCOUNT)
    | (1 << idx::STEPIE)
    | (1 << idx::EBREAKU)
    | (1 << idx::EBREAKS)
    | (1 << idx::EBREAKM);

/// Reason for entering debug mode, as reported in dcsr.cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DebugCause {
    Ebreak = 1,
    Trigger = 2,
    HaltRequest = 3,
    Step = 4,
}

/// Debug-mode state: dcsr, dpc, dscratch and the triggers.
#[derive(Debug, Clone)]
pub struct DebugState {
    /// The hart is halted in debug mode.
    pub active: bool,
    dcsr: u32,
    pub dpc: u64,
    pub dscratch: u64,
    pub triggers: Triggers,
}

impl DebugState {
    pub fn new(xlen: Xlen) -> Self {
        let mut dcsr = 0u32;
        dcsr.view_bits_mut::<Lsb0>()[idx::XDEBUGVER..].store_le(4u8);
        dcsr.view_bits_mut::<Lsb0>()[idx::PRV..idx::PRV + 2]
            .store_le(PrivilegeLevel::Machine.as_u2());
        Self {
            active: false,
            dcsr,
            dpc: 0,
            dscratch: 0,
            triggers: Triggers::new(xlen),
        }
    }

    pub fn read_dcsr(&self) -> u64 {
        self.dcsr as u64
    }

    pub fn write_dcsr(&mut self, value: u64, mask: u64) {
        let mask = mask as u32 & DCSR_WRITABLE;
        let mut dcsr = self.dcsr & !mask | value as u32 & mask;
        // PRV is WARL; the reserved level keeps the previous value.
        let prv = dcsr.view_bits::<Lsb0>()[idx::PRV..idx::PRV + 2].load_le::<u8>();
        if RawPrivilegeLevel::from_u2(prv).is_reserved() {
            let old = self.dcsr.view_bits::<Lsb0>()[idx::PRV..idx::PRV + 2].load_le::<u8>();
            dcsr.view_bits_mut::<Lsb0>()[idx::PRV..idx::PRV + 2].store_le(old);
        }
        self.dcsr = dcsr;
    }

    /// Privilege level the hart returns to when leaving debug mode.
    pub fn prv(&self) -> PrivilegeLevel {
        let raw = self.dcsr.view_bits::<Lsb0>()[idx::PRV..idx::PRV + 2].load_le::<u8>();
        PrivilegeLevel::try_from(RawPrivilegeLevel::from_u2(raw)).unwrap_or(PrivilegeLevel::Machine)
    }

    /// Returns `true` if an `ebreak` executed at `privilege` enters debug mode instead of raising a
    /// breakpoint exception.
    pub fn ebreak_enters_debug(&self, privilege: PrivilegeLevel) -> bool {
        let bits = self.dcsr.view_bits::<Lsb0>();
        match privilege {
            PrivilegeLevel::Machine => bits[idx::EBREAKM],
            PrivilegeLevel::Supervisor => bits[idx::EBREAKS],
            PrivilegeLevel::User => bits[idx::EBREAKU],
        }
    }

    /// Returns `true` if single stepping is requested.
    pub fn step(&self) -> bool {
        self.dcsr.view_bits::<Lsb0>()[idx::STEP]
    }

    pub fn set_nmip(&mut self, value: bool) {
        self.dcsr.view_bits_mut::<Lsb0>().set(idx::NMIP, value);
    }

    /// Halts the hart in debug mode. `pc` is the address execution resumes at.
    pub fn enter(&mut self, cause: DebugCause, pc: u64, privilege: PrivilegeLevel) {
        let bits = self.dcsr.view_bits_mut::<Lsb0>();
        bits[idx::CAUSE..idx::CAUSE + 3].store_le(cause as u8);
        bits[idx::PRV..idx::PRV + 2].store_le(privilege.as_u2());
        self.dpc = pc;
        self.active = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dcsr_reset_and_writes() {
        let mut debug = DebugState::new(Xlen::Rv32);
        assert_eq!(debug.read_dcsr(), 0x4000_0003);
        debug.write_dcsr(u64::MAX, u64::MAX);
        assert_eq!(debug.read_dcsr(), 0x4000_0003 | DCSR_WRITABLE as u64);
        assert!(debug.ebreak_enters_debug(PrivilegeLevel::User));
        // Reserved privilege level 2 is ignored.
        debug.write_dcsr(0b10, 0b11);
        assert_eq!(debug.prv(), PrivilegeLevel::Machine);
    }

    #[test]
    fn enter_records_cause() {
        let mut debug = DebugState::new(Xlen::Rv32);
        debug.enter(DebugCause::Ebreak, 0x100, PrivilegeLevel::User);
        assert!(debug.active);
        assert_eq!(debug.dpc, 0x100);
        assert_eq!(debug.read_dcsr() >> 6 & 0b111, 1);
        assert_eq!(debug.prv(), PrivilegeLevel::User);
    }
}
