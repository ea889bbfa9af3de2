use bitvec::{field::BitField, order::Lsb0, view::BitView};

use crate::{PrivilegeLevel, RawPrivilegeLevel, Xlen};

/// Fields of mstatus visible through sstatus (UXL included for RV64).
const SSTATUS_MASK: u64 = 0x0000_0003_000D_E762;

/// Provides the mstatus, mstatush, and sstatus registers.
///
/// > The mstatus register is an MXLEN-bit read/write register [...]. The mstatus register keeps
/// > track of and controls the hart’s current operating state. A restricted view of mstatus appears
/// > as the sstatus register in the S-level ISA.
///
/// Only little-endian operation is supported, so mstatush reads as zero and the UBE/SBE/MBE
/// fields are hardwired to zero.
#[derive(Debug, Clone)]
pub struct Status {
    mstatus: u64,
    supervisor: bool,
    user: bool,
    fp: bool,
    vector: bool,
}

impl Status {
    /// Creates the reset value. The FS and VS fields start out `Initial` when the corresponding
    /// extension is present, so floating-point and vector code runs without prior setup.
    pub fn new(supervisor: bool, user: bool, fp: bool, vector: bool) -> Self {
        let mut status = Self {
            mstatus: 0,
            supervisor,
            user,
            fp,
            vector,
        };
        status.set_mpp(RawPrivilegeLevel::Machine);
        if fp {
            status.set_fs(ExtensionContextStatus::Initial);
        }
        if vector {
            status.set_vs(ExtensionContextStatus::Initial);
        }
        status
    }

    fn bit(&self, index: usize) -> bool {
        self.mstatus.view_bits::<Lsb0>()[index]
    }

    fn set_bit(&mut self, index: usize, value: bool) {
        self.mstatus.view_bits_mut::<Lsb0>().set(index, value);
    }

    /// Returns `true` if the MIE (M-mode Interrupt Enable) bit is set.
    pub fn mie(&self) -> bool {
        self.bit(idx::MIE)
    }

    pub fn set_mie(&mut self, value: bool) {
        self.set_bit(idx::MIE, value);
    }

    /// Returns `true` if the SIE (S-mode Interrupt Enable) bit is set.
    pub fn sie(&self) -> bool {
        self.bit(idx::SIE)
    }

    pub fn set_sie(&mut self, value: bool) {
        if self.supervisor {
            self.set_bit(idx::SIE, value);
        }
    }

    pub fn mpie(&self) -> bool {
        self.bit(idx::MPIE)
    }

    pub fn set_mpie(&mut self, value: bool) {
        self.set_bit(idx::MPIE, value);
    }

    pub fn spie(&self) -> bool {
        self.bit(idx::SPIE)
    }

    pub fn set_spie(&mut self, value: bool) {
        if self.supervisor {
            self.set_bit(idx::SPIE, value);
        }
    }

    /// Returns the privilege level encoded by the MPP (M-mode Previous Privilege level) field.
    ///
    /// The MPP field is **WARL**, so it never holds an unsupported level.
    pub fn mpp(&self) -> PrivilegeLevel {
        let raw = RawPrivilegeLevel::from_u2(
            self.mstatus.view_bits::<Lsb0>()[idx::MPP..(idx::MPP + 2)].load_le(),
        );
        PrivilegeLevel::try_from(raw).unwrap_or(PrivilegeLevel::Machine)
    }

    /// Sets the MPP field, ignoring reserved and unsupported privilege levels.
    pub fn set_mpp(&mut self, value: RawPrivilegeLevel) {
        let Ok(level) = PrivilegeLevel::try_from(value) else {
            return;
        };
        if !self.supports(level) {
            return;
        }
        self.mstatus.view_bits_mut::<Lsb0>()[idx::MPP..(idx::MPP + 2)].store_le(level.as_u2());
    }

    /// Returns the privilege level encoded by the SPP (S-mode Previous Privilege level) field.
    pub fn spp(&self) -> PrivilegeLevel {
        if self.bit(idx::SPP) {
            PrivilegeLevel::Supervisor
        } else {
            PrivilegeLevel::User
        }
    }

    /// Sets the SPP field. Only User and Supervisor can be represented; anything else is ignored.
    pub fn set_spp(&mut self, value: RawPrivilegeLevel) {
        if !self.supervisor {
            return;
        }
        match PrivilegeLevel::try_from(value) {
            Ok(value) if value <= PrivilegeLevel::Supervisor => {
                self.set_bit(idx::SPP, value == PrivilegeLevel::Supervisor);
            }
            _ => {}
        }
    }

    /// Returns `true` if the MPRV (Modify PRiVilege) bit is set.
    pub fn mprv(&self) -> bool {
        self.bit(idx::MPRV)
    }

    pub fn set_mprv(&mut self, value: bool) {
        if self.user {
            self.set_bit(idx::MPRV, value);
        }
    }

    /// Returns `true` if the MXR (Make eXecutable Readable) bit is set.
    pub fn mxr(&self) -> bool {
        self.bit(idx::MXR)
    }

    /// Returns `true` if the SUM (permit Supervisor User Memory access) bit is set.
    pub fn sum(&self) -> bool {
        self.bit(idx::SUM)
    }

    /// Returns `true` if the TVM (Trap Virtual Memory) bit is set.
    pub fn tvm(&self) -> bool {
        self.bit(idx::TVM)
    }

    /// Returns `true` if the TW (Timeout Wait) bit is set.
    pub fn tw(&self) -> bool {
        self.bit(idx::TW)
    }

    /// Returns `true` if the TSR (Trap SRET) bit is set.
    pub fn tsr(&self) -> bool {
        self.bit(idx::TSR)
    }

    /// Returns the extension context status encoded by the FS (F extension Status) field.
    pub fn fs(&self) -> ExtensionContextStatus {
        ExtensionContextStatus::from_u2(
            self.mstatus.view_bits::<Lsb0>()[idx::FS..(idx::FS + 2)].load_le(),
        )
    }

    pub fn set_fs(&mut self, value: ExtensionContextStatus) {
        if self.fp {
            self.mstatus.view_bits_mut::<Lsb0>()[idx::FS..(idx::FS + 2)].store_le(value as u8);
        }
    }

    /// Returns the extension context status encoded by the VS (V extension Status) field.
    pub fn vs(&self) -> ExtensionContextStatus {
        ExtensionContextStatus::from_u2(
            self.mstatus.view_bits::<Lsb0>()[idx::VS..(idx::VS + 2)].load_le(),
        )
    }

    pub fn set_vs(&mut self, value: ExtensionContextStatus) {
        if self.vector {
            self.mstatus.view_bits_mut::<Lsb0>()[idx::VS..(idx::VS + 2)].store_le(value as u8);
        }
    }

    /// Returns `true` if the SD (extension Status Dirty) bit reads as set.
    pub fn sd(&self) -> bool {
        use ExtensionContextStatus::Dirty;
        self.fs() == Dirty || self.vs() == Dirty
    }

    fn supports(&self, level: PrivilegeLevel) -> bool {
        match level {
            PrivilegeLevel::Machine => true,
            PrivilegeLevel::Supervisor => self.supervisor,
            PrivilegeLevel::User => self.user,
        }
    }

    pub fn read_mstatus(&self, xlen: Xlen) -> u64 {
        let mut value = self.mstatus;
        if xlen.is_rv64() {
            // UXL and SXL are hardwired to 64 bits.
            if self.user {
                value.view_bits_mut::<Lsb0>()[idx::UXL..(idx::UXL + 2)].store_le(2u8);
            }
            if self.supervisor {
                value.view_bits_mut::<Lsb0>()[idx::SXL..(idx::SXL + 2)].store_le(2u8);
            }
        }
        if self.sd() {
            value |= 1 << (xlen.bits() - 1);
        }
        xlen.canonical(value)
    }

    pub fn write_mstatus(&mut self, value: u64, mask: u64) {
        let updated = self.mstatus & !mask | value & mask;
        let mask_bits = mask.view_bits::<Lsb0>();
        let updated_bits = updated.view_bits::<Lsb0>();

        // Update the fields using the relevant setters to treat WARL fields correctly.
        if mask_bits[idx::SIE] {
            self.set_sie(updated_bits[idx::SIE]);
        }
        if mask_bits[idx::MIE] {
            self.set_mie(updated_bits[idx::MIE]);
        }
        if mask_bits[idx::SPIE] {
            self.set_spie(updated_bits[idx::SPIE]);
        }
        if mask_bits[idx::MPIE] {
            self.set_mpie(updated_bits[idx::MPIE]);
        }
        if mask_bits[idx::SPP] {
            self.set_spp(RawPrivilegeLevel::from_u2(updated_bits[idx::SPP] as u8));
        }
        if mask_bits[idx::VS] | mask_bits[idx::VS + 1] {
            self.set_vs(ExtensionContextStatus::from_u2(
                updated_bits[idx::VS..(idx::VS + 2)].load_le(),
            ));
        }
        if mask_bits[idx::MPP] | mask_bits[idx::MPP + 1] {
            self.set_mpp(RawPrivilegeLevel::from_u2(
                updated_bits[idx::MPP..(idx::MPP + 2)].load_le(),
            ));
        }
        if mask_bits[idx::FS] | mask_bits[idx::FS + 1] {
            self.set_fs(ExtensionContextStatus::from_u2(
                updated_bits[idx::FS..(idx::FS + 2)].load_le(),
            ));
        }
        if mask_bits[idx::MPRV] {
            self.set_mprv(updated_bits[idx::MPRV]);
        }
        for index in [idx::SUM, idx::MXR, idx::TVM, idx::TSR] {
            if mask_bits[index] && self.supervisor {
                self.set_bit(index, updated_bits[index]);
            }
        }
        if mask_bits[idx::TW] && self.user {
            self.set_bit(idx::TW, updated_bits[idx::TW]);
        }
        // Ignore read-only fields, and the remaining WPRI fields.
    }

    pub fn read_sstatus(&self, xlen: Xlen) -> u64 {
        let sd = 1 << (xlen.bits() - 1);
        self.read_mstatus(xlen) & (SSTATUS_MASK | sd)
    }

    pub fn write_sstatus(&mut self, value: u64, mask: u64) {
        self.write_mstatus(value, mask & SSTATUS_MASK);
    }
}

/// Bit indices into mstatus register.
mod idx {
    pub const SIE: usize = 1;
    pub const MIE: usize = 3;
    pub const SPIE: usize = 5;
    pub const MPIE: usize = 7;
    pub const SPP: usize = 8;
    pub const VS: usize = 9;
    pub const MPP: usize = 11;
    pub const FS: usize = 13;
    pub const MPRV: usize = 17;
    pub const SUM: usize = 18;
    pub const MXR: usize = 19;
    pub const TVM: usize = 20;
    pub const TW: usize = 21;
    pub const TSR: usize = 22;
    pub const UXL: usize = 32;
    pub const SXL: usize = 34;
}

/// Possible values of the extension context status fields (FS, VS) in the mstatus register.
///
/// > When an extension’s status is set to Off, any instruction that attempts to read or write the
/// > corresponding state will cause an illegal instruction exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExtensionContextStatus {
    Off = 0,
    Initial = 1,
    Clean = 2,
    Dirty = 3,
}

impl ExtensionContextStatus {
    /// Convert a 2-bit value into an [`ExtensionContextStatus`].
    /// Panics if the value doesn't fit in 2 bits (`0..=3`).
    pub fn from_u2(value_u2: u8) -> Self {
        match value_u2 {
            0 => Self::Off,
            1 => Self::Initial,
            2 => Self::Clean,
            3 => Self::Dirty,
            _ => panic!("out of range u2 used"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warl_privilege_fields() {
        let mut status = Status::new(false, true, false, false);
        assert_eq!(status.mpp(), PrivilegeLevel::Machine);
        // Supervisor is not implemented, so MPP keeps its value.
        status.write_mstatus(0b01 << 11, 0b11 << 11);
        assert_eq!(status.mpp(), PrivilegeLevel::Machine);
        status.write_mstatus(0, 0b11 << 11);
        assert_eq!(status.mpp(), PrivilegeLevel::User);
        // Reserved level 2 is ignored.
        status.write_mstatus(0b10 << 11, 0b11 << 11);
        assert_eq!(status.mpp(), PrivilegeLevel::User);
        // No supervisor mode, no SIE.
        status.write_mstatus(0b10, 0b10);
        assert!(!status.sie());
    }

    #[test]
    fn sstatus_is_a_restricted_view() {
        let mut status = Status::new(true, true, true, false);
        status.write_sstatus(u64::MAX, u64::MAX);
        assert!(status.sie());
        assert!(!status.mie());
        assert_eq!(status.mpp(), PrivilegeLevel::Machine);
        assert!(status.sum());
        assert_eq!(status.read_sstatus(Xlen::Rv32) & (1 << 3), 0);
    }

    #[test]
    fn dirty_state_sets_sd() {
        let mut status = Status::new(true, true, true, true);
        assert_eq!(status.fs(), ExtensionContextStatus::Initial);
        assert_eq!(status.read_mstatus(Xlen::Rv32) >> 31 & 1, 0);
        status.set_fs(ExtensionContextStatus::Dirty);
        assert_eq!(status.read_mstatus(Xlen::Rv32), 0xffff_ffff_8000_7a00);
        assert_eq!(status.read_mstatus(Xlen::Rv64) >> 63, 1);
        assert_eq!(status.read_mstatus(Xlen::Rv64) >> 32 & 0xf, 0b1010);
    }
}
