//! CSR access checks and the CSR read/write dispatch of a [`Hart`].

use log::debug;
use thiserror::Error;

use super::status::ExtensionContextStatus;
use super::Hart;
use crate::csr::{self, CsrSpecifier};
use crate::memory::Bus;
use crate::{PrivilegeLevel, RawPrivilegeLevel, Xlen};

/// Errors that can occur when attempting to access a CSR. Executing a CSR instruction that fails
/// with any of these raises an illegal-instruction exception.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum CsrError {
    #[error("unsupported CSR: {0:#05X}")]
    Unsupported(CsrSpecifier),
    /// Attempt to access a CSR that requires a higher privilege level.
    #[error(
        "cannot access specifier {specifier:#05X} from privilege level {actual_level}, \
             since it requires privilege level {required_level}"
    )]
    Privileged {
        specifier: CsrSpecifier,
        required_level: RawPrivilegeLevel,
        actual_level: PrivilegeLevel,
    },
    #[error("writing to read-only CSR {0:#05X} is invalid")]
    ReadOnly(CsrSpecifier),
    #[error("CSR {0:#05X} belongs to an extension whose state is off")]
    ExtensionDisabled(CsrSpecifier),
    #[error("counter CSR {specifier:#05X} is not enabled for privilege level {level}")]
    CounterDisabled {
        specifier: CsrSpecifier,
        level: PrivilegeLevel,
    },
    #[error("CSR {0:#05X} is only accessible in debug mode")]
    DebugOnly(CsrSpecifier),
}

/// Vendor, architecture and implementation ids (mvendorid, marchid, mimpid).
const MVENDORID_VALUE: u64 = 0x45;
const MARCHID_VALUE: u64 = 0x8000_0011;
const MIMPID_VALUE: u64 = 0x4;

impl<B: Bus> Hart<B> {
    /// Returns `true` if `specifier` names a CSR implemented by this hart's configuration.
    pub fn csr_exists(&self, specifier: CsrSpecifier) -> bool {
        let ext = &self.config.extensions;
        let rv32 = !self.xlen.is_rv64();
        match specifier {
            csr::FFLAGS | csr::FRM | csr::FCSR => ext.f,
            csr::VSTART
            | csr::VXSAT
            | csr::VXRM
            | csr::VCSR
            | csr::VL
            | csr::VTYPE
            | csr::VLENB => ext.v,
            csr::CYCLE | csr::TIME | csr::INSTRET | csr::HPMCOUNTER3..=csr::HPMCOUNTER31 => true,
            csr::CYCLEH | csr::TIMEH | csr::INSTRETH | csr::HPMCOUNTER3H..=csr::HPMCOUNTER31H => {
                rv32
            }
            csr::SSTATUS
            | csr::SIE
            | csr::STVEC
            | csr::SCOUNTEREN
            | csr::SSCRATCH
            | csr::SEPC
            | csr::SCAUSE
            | csr::STVAL
            | csr::SIP
            | csr::SATP
            | csr::SSCAUSE
            | csr::MEDELEG
            | csr::MIDELEG => ext.s,
            csr::MCOUNTEREN => ext.u,
            csr::MVENDORID | csr::MARCHID | csr::MIMPID | csr::MHARTID => true,
            csr::MSTATUS | csr::MISA | csr::MIE | csr::MTVEC | csr::MCOUNTINHIBIT => true,
            csr::MSTATUSH => rv32,
            csr::MHPMEVENT3..=csr::MHPMEVENT31 => true,
            csr::MSCRATCH | csr::MEPC | csr::MCAUSE | csr::MTVAL | csr::MIP | csr::MSCAUSE => true,
            csr::PMPCFG0..=csr::PMPCFG3 => {
                self.pmp.has_cfg_register((specifier - csr::PMPCFG0) as usize)
            }
            csr::PMPADDR0..=csr::PMPADDR15 => {
                ((specifier - csr::PMPADDR0) as usize) < self.pmp.entries()
            }
            csr::MCYCLE | csr::MINSTRET | csr::MHPMCOUNTER3..=csr::MHPMCOUNTER31 => true,
            csr::MCYCLEH | csr::MINSTRETH | csr::MHPMCOUNTER3H..=csr::MHPMCOUNTER31H => rv32,
            csr::TSELECT | csr::TDATA1 | csr::TDATA2 | csr::TDATA3 => true,
            csr::DCSR | csr::DPC | csr::DSCRATCH => true,
            csr::MDEAU | csr::MDBHD | csr::MDSEAC => true,
            _ => false,
        }
    }

    /// Checks whether the current privilege level and extension state allow the access.
    fn check_csr_access(&self, specifier: CsrSpecifier, write: bool) -> Result<(), CsrError> {
        if !self.csr_exists(specifier) {
            return Err(CsrError::Unsupported(specifier));
        }
        if csr::is_debug_only(specifier) && !self.debug.active {
            return Err(CsrError::DebugOnly(specifier));
        }
        let required_level = csr::required_privilege_level(specifier);
        if self.privilege < required_level {
            return Err(CsrError::Privileged {
                specifier,
                required_level,
                actual_level: self.privilege,
            });
        }
        if specifier == csr::SATP
            && self.privilege == PrivilegeLevel::Supervisor
            && self.status.tvm()
        {
            return Err(CsrError::Privileged {
                specifier,
                required_level: RawPrivilegeLevel::Machine,
                actual_level: self.privilege,
            });
        }
        if write && csr::is_read_only(specifier) {
            return Err(CsrError::ReadOnly(specifier));
        }
        match specifier {
            csr::FFLAGS | csr::FRM | csr::FCSR
                if self.status.fs() == ExtensionContextStatus::Off =>
            {
                return Err(CsrError::ExtensionDisabled(specifier));
            }
            csr::VSTART | csr::VXSAT | csr::VXRM | csr::VCSR | csr::VL | csr::VTYPE | csr::VLENB
                if self.status.vs() == ExtensionContextStatus::Off =>
            {
                return Err(CsrError::ExtensionDisabled(specifier));
            }
            _ => {}
        }
        if let Some(n) = counter_index(specifier) {
            // > When the CY, TM, IR, or HPMn bit in the mcounteren register is clear, attempts to
            // > read the cycle, time, instret, or hpmcountern register while executing in S-mode
            // > or U-mode will cause an illegal instruction exception.
            let level = self.privilege;
            let disabled = level < PrivilegeLevel::Machine && !self.control.mcounteren.enabled(n)
                || level == PrivilegeLevel::User
                    && self.config.extensions.s
                    && !self.control.scounteren.enabled(n);
            if disabled {
                return Err(CsrError::CounterDisabled { specifier, level });
            }
        }
        Ok(())
    }

    /// Reads a CSR as the current privilege level would.
    pub fn read_csr(&self, specifier: CsrSpecifier) -> Result<u64, CsrError> {
        self.check_csr_access(specifier, false)?;
        Ok(self.read_csr_unchecked(specifier))
    }

    /// Writes the bits of a CSR selected by `mask`, as the current privilege level would.
    ///
    /// Read-only fields and **WARL** fields holding illegal values are treated as each register
    /// defines.
    pub fn write_csr(
        &mut self,
        specifier: CsrSpecifier,
        value: u64,
        mask: u64,
    ) -> Result<(), CsrError> {
        self.check_csr_access(specifier, true)?;
        self.write_csr_unchecked(specifier, value, mask);
        Ok(())
    }

    /// Reads a CSR without any access checks. Returns `None` if the CSR does not exist.
    pub fn peek_csr(&self, specifier: CsrSpecifier) -> Option<u64> {
        self.csr_exists(specifier)
            .then(|| self.read_csr_unchecked(specifier))
    }

    /// Writes a CSR without privilege checks. Read-only registers that hold hart state (such as
    /// MDSEAC) are written as well. Returns `false` if the CSR does not exist.
    pub fn poke_csr(&mut self, specifier: CsrSpecifier, value: u64) -> bool {
        if !self.csr_exists(specifier) {
            return false;
        }
        match specifier {
            csr::MDSEAC => self.mdseac = self.xlen.address(value),
            _ => self.write_csr_unchecked(specifier, value, u64::MAX),
        }
        true
    }

    fn read_csr_unchecked(&self, specifier: CsrSpecifier) -> u64 {
        let xlen = self.xlen;
        let high = |value: u64| value >> 32;
        let value = match specifier {
            csr::FFLAGS => self.fcsr.fflags as u64,
            csr::FRM => self.fcsr.frm as u64,
            csr::FCSR => (self.fcsr.frm as u64) << 5 | self.fcsr.fflags as u64,
            csr::VSTART => self.vector.vstart,
            csr::VXSAT => self.vector.vxsat as u64,
            csr::VXRM => self.vector.vxrm as u64,
            csr::VCSR => (self.vector.vxrm as u64) << 1 | self.vector.vxsat as u64,
            csr::VL => self.vector.vl,
            csr::VTYPE => self.vector.read_vtype(xlen),
            csr::VLENB => self.vregs.vlenb() as u64,
            // There is no wall clock; time follows the cycle count.
            csr::CYCLE | csr::MCYCLE | csr::TIME => self.counters.mcycle(),
            csr::INSTRET | csr::MINSTRET => self.counters.minstret(),
            csr::CYCLEH | csr::MCYCLEH | csr::TIMEH => high(self.counters.mcycle()),
            csr::INSTRETH | csr::MINSTRETH => high(self.counters.minstret()),
            csr::HPMCOUNTER3..=csr::HPMCOUNTER31
            | csr::HPMCOUNTER3H..=csr::HPMCOUNTER31H
            | csr::MHPMCOUNTER3..=csr::MHPMCOUNTER31
            | csr::MHPMCOUNTER3H..=csr::MHPMCOUNTER31H
            | csr::MHPMEVENT3..=csr::MHPMEVENT31 => 0,
            csr::SSTATUS => self.status.read_sstatus(xlen),
            csr::SIE => self.interrupts.read_sie(),
            csr::STVEC => self.control.stvec.read(),
            csr::SCOUNTEREN => self.control.scounteren.read(),
            csr::SSCRATCH => self.trap.read_sscratch(),
            csr::SEPC => self.trap.read_sepc(),
            csr::SCAUSE => self.trap.scause.read(),
            csr::STVAL => self.trap.read_stval(),
            csr::SIP => self.interrupts.read_sip(),
            csr::SATP => self.vm.read_satp(),
            csr::SSCAUSE => self.trap.read_sscause(),
            csr::MVENDORID => MVENDORID_VALUE,
            csr::MARCHID => MARCHID_VALUE,
            csr::MIMPID => MIMPID_VALUE,
            csr::MHARTID => self.config.hart_id,
            csr::MSTATUS => self.status.read_mstatus(xlen),
            csr::MSTATUSH => 0,
            csr::MISA => {
                let mxl: u64 = if xlen.is_rv64() { 2 } else { 1 };
                mxl << (xlen.bits() - 2) | self.config.extensions.misa_bits()
            }
            csr::MEDELEG => self.control.medeleg.read(),
            csr::MIDELEG => self.interrupts.read_mideleg(),
            csr::MIE => self.interrupts.read_mie(),
            csr::MTVEC => self.control.mtvec.read(),
            csr::MCOUNTEREN => self.control.mcounteren.read(),
            csr::MCOUNTINHIBIT => self.control.mcountinhibit.read(),
            csr::MSCRATCH => self.trap.read_mscratch(),
            csr::MEPC => self.trap.read_mepc(),
            csr::MCAUSE => self.trap.mcause.read(),
            csr::MTVAL => self.trap.read_mtval(),
            csr::MIP => self.interrupts.read_mip(),
            csr::MSCAUSE => self.trap.read_mscause(),
            csr::PMPCFG0..=csr::PMPCFG3 => {
                self.pmp.read_pmpcfg((specifier - csr::PMPCFG0) as usize)
            }
            csr::PMPADDR0..=csr::PMPADDR15 => {
                self.pmp.read_pmpaddr((specifier - csr::PMPADDR0) as usize)
            }
            csr::TSELECT => self.debug.triggers.read_tselect(),
            csr::TDATA1 => self.debug.triggers.read_tdata(0),
            csr::TDATA2 => self.debug.triggers.read_tdata(1),
            csr::TDATA3 => self.debug.triggers.read_tdata(2),
            csr::DCSR => self.debug.read_dcsr(),
            csr::DPC => self.debug.dpc,
            csr::DSCRATCH => self.debug.dscratch,
            csr::MDEAU => 0,
            csr::MDBHD => self.mdbhd,
            csr::MDSEAC => self.mdseac,
            _ => panic!("read of unimplemented CSR {specifier:#05X}"),
        };
        // The RV32 views of 64-bit counters only show the low half.
        let value = if xlen == Xlen::Rv32 {
            value & 0xffff_ffff
        } else {
            value
        };
        xlen.canonical(value)
    }

    fn write_csr_unchecked(&mut self, specifier: CsrSpecifier, value: u64, mask: u64) {
        let xlen = self.xlen;
        let value = value & xlen.mask();
        let mask = mask & xlen.mask();
        let low_half = 0xffff_ffff;
        let high_half = 0xffff_ffff_0000_0000;
        match specifier {
            csr::FFLAGS => {
                self.fcsr.write_fflags(value, mask);
                self.status.set_fs(ExtensionContextStatus::Dirty);
            }
            csr::FRM => {
                self.fcsr.write_frm(value, mask);
                self.status.set_fs(ExtensionContextStatus::Dirty);
            }
            csr::FCSR => {
                self.fcsr.write_fflags(value, mask);
                self.fcsr.write_frm(value >> 5, mask >> 5);
                self.status.set_fs(ExtensionContextStatus::Dirty);
            }
            csr::VSTART => {
                let vstart = self.vector.vstart & !mask | value & mask;
                // Only enough bits to index any element are implemented.
                self.vector.vstart = vstart & (self.vregs.vlenb() as u64 * 8 - 1);
                self.status.set_vs(ExtensionContextStatus::Dirty);
            }
            csr::VXSAT => {
                if mask & 1 != 0 {
                    self.vector.vxsat = value & 1 != 0;
                }
                self.status.set_vs(ExtensionContextStatus::Dirty);
            }
            csr::VXRM => {
                let vxrm = self.vector.vxrm as u64 & !mask | value & mask;
                self.vector.vxrm = (vxrm & 0b11) as u8;
                self.status.set_vs(ExtensionContextStatus::Dirty);
            }
            csr::VCSR => {
                if mask & 1 != 0 {
                    self.vector.vxsat = value & 1 != 0;
                }
                let vxrm = self.vector.vxrm as u64 & !(mask >> 1) | (value >> 1) & (mask >> 1);
                self.vector.vxrm = (vxrm & 0b11) as u8;
                self.status.set_vs(ExtensionContextStatus::Dirty);
            }
            csr::MCYCLE => {
                let mask = if xlen == Xlen::Rv32 { mask & low_half } else { mask };
                self.counters.write_mcycle(value, mask);
            }
            csr::MCYCLEH => self.counters.write_mcycle(value << 32, (mask << 32) & high_half),
            csr::MINSTRET => {
                let mask = if xlen == Xlen::Rv32 { mask & low_half } else { mask };
                self.counters.write_minstret(value, mask);
            }
            csr::MINSTRETH => self.counters.write_minstret(value << 32, (mask << 32) & high_half),
            csr::MHPMCOUNTER3..=csr::MHPMCOUNTER31
            | csr::MHPMCOUNTER3H..=csr::MHPMCOUNTER31H
            | csr::MHPMEVENT3..=csr::MHPMEVENT31 => {
                // Writes are ignored
            }
            csr::SSTATUS => self.status.write_sstatus(value, mask),
            csr::SIE => self.interrupts.write_sie(value, mask),
            csr::STVEC => self.control.stvec.write(value, mask),
            csr::SCOUNTEREN => self.control.scounteren.write(value, mask),
            csr::SSCRATCH => self.trap.write_sscratch(value, mask),
            csr::SEPC => self.trap.write_sepc(value, mask),
            csr::SCAUSE => self.trap.scause.write(value, mask),
            csr::STVAL => self.trap.write_stval(value, mask),
            csr::SIP => self.interrupts.write_sip(value, mask),
            csr::SATP => {
                if self.vm.write_satp(value, mask) {
                    debug!("Address space changed to ASID {}", self.vm.asid());
                    self.decode_cache.clear();
                }
            }
            csr::SSCAUSE => self.trap.write_sscause(value, mask),
            csr::MSTATUS => self.status.write_mstatus(value, mask),
            // Little-endian only, so all of mstatush is read-only zero.
            csr::MSTATUSH => {}
            // misa is hardwired; the extension set is fixed at construction.
            csr::MISA => {}
            csr::MEDELEG => self.control.medeleg.write(value, mask),
            csr::MIDELEG => self.interrupts.write_mideleg(value, mask),
            csr::MIE => self.interrupts.write_mie(value, mask),
            csr::MTVEC => self.control.mtvec.write(value, mask),
            csr::MCOUNTEREN => self.control.mcounteren.write(value, mask),
            csr::MCOUNTINHIBIT => self.control.mcountinhibit.write(value, mask),
            csr::MSCRATCH => self.trap.write_mscratch(value, mask),
            csr::MEPC => self.trap.write_mepc(value, mask),
            csr::MCAUSE => self.trap.mcause.write(value, mask),
            csr::MTVAL => self.trap.write_mtval(value, mask),
            csr::MIP => self.interrupts.write_mip(value, mask),
            csr::MSCAUSE => self.trap.write_mscause(value, mask),
            csr::PMPCFG0..=csr::PMPCFG3 => {
                self.pmp
                    .write_pmpcfg((specifier - csr::PMPCFG0) as usize, value, mask);
                debug!("PMP configuration changed, {} active regions", self.pmp.regions().len());
            }
            csr::PMPADDR0..=csr::PMPADDR15 => {
                self.pmp
                    .write_pmpaddr((specifier - csr::PMPADDR0) as usize, value, mask);
                debug!("PMP address changed, {} active regions", self.pmp.regions().len());
            }
            csr::TSELECT => self.debug.triggers.write_tselect(value, mask),
            csr::TDATA1 => self.debug.triggers.write_tdata(0, value, mask, self.debug.active),
            csr::TDATA2 => self.debug.triggers.write_tdata(1, value, mask, self.debug.active),
            csr::TDATA3 => self.debug.triggers.write_tdata(2, value, mask, self.debug.active),
            csr::DCSR => self.debug.write_dcsr(value, mask),
            csr::DPC => self.debug.dpc = (self.debug.dpc & !mask | value & mask) & !1,
            csr::DSCRATCH => self.debug.dscratch = self.debug.dscratch & !mask | value & mask,
            // Any write to MDEAU unlocks MDSEAC for the next bus error.
            csr::MDEAU => self.mdseac_locked = false,
            csr::MDBHD => self.mdbhd = self.mdbhd & !mask | value & mask,
            csr::MVENDORID
            | csr::MARCHID
            | csr::MIMPID
            | csr::MHARTID
            | csr::MDSEAC
            | csr::VL
            | csr::VTYPE
            | csr::VLENB
            | csr::CYCLE..=csr::HPMCOUNTER31
            | csr::CYCLEH..=csr::HPMCOUNTER31H => {
                // Read-only
            }
            _ => panic!("write of unimplemented CSR {specifier:#05X}"),
        }
    }
}

/// Returns the counter number (0 = cycle, 1 = time, 2 = instret, 3.. = hpm) of an unprivileged
/// counter CSR.
fn counter_index(specifier: CsrSpecifier) -> Option<u8> {
    match specifier {
        csr::CYCLE..=csr::HPMCOUNTER31 => Some((specifier - csr::CYCLE) as u8),
        csr::CYCLEH..=csr::HPMCOUNTER31H => Some((specifier - csr::CYCLEH) as u8),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hart::Config;
    use crate::memory::Memory;

    fn hart(xlen: Xlen) -> Hart<Memory> {
        Hart::new(
            Memory::new(0x1000),
            Config {
                xlen,
                ..Config::default()
            },
        )
    }

    #[test]
    fn misa_reports_xlen_and_extensions() {
        let misa = hart(Xlen::Rv32).read_csr(csr::MISA).unwrap();
        assert_eq!(misa >> 30 & 0b11, 1);
        assert_ne!(misa & (1 << (b'M' - b'A')), 0);
        let misa = hart(Xlen::Rv64).read_csr(csr::MISA).unwrap();
        assert_eq!(misa >> 62, 2);
    }

    #[test]
    fn privilege_and_read_only_checks() {
        let mut hart = hart(Xlen::Rv32);
        assert_eq!(
            hart.write_csr(csr::MHARTID, 1, u64::MAX),
            Err(CsrError::ReadOnly(csr::MHARTID))
        );
        assert_eq!(hart.read_csr(0x7C0), Err(CsrError::Unsupported(0x7C0)));
        assert_eq!(hart.read_csr(csr::DPC), Err(CsrError::DebugOnly(csr::DPC)));
        assert!(hart.read_csr(csr::MCYCLEH).is_ok());
        hart.privilege = PrivilegeLevel::User;
        assert_eq!(
            hart.read_csr(csr::MSTATUS),
            Err(CsrError::Privileged {
                specifier: csr::MSTATUS,
                required_level: RawPrivilegeLevel::Machine,
                actual_level: PrivilegeLevel::User,
            })
        );
        assert!(hart.read_csr(csr::CYCLE).is_ok());
        hart.privilege = PrivilegeLevel::Machine;
        hart.write_csr(csr::MCOUNTEREN, 0, u64::MAX).unwrap();
        hart.privilege = PrivilegeLevel::User;
        assert_eq!(
            hart.read_csr(csr::INSTRET),
            Err(CsrError::CounterDisabled {
                specifier: csr::INSTRET,
                level: PrivilegeLevel::User
            })
        );
    }

    #[test]
    fn rv32_values_are_canonical() {
        let mut hart = hart(Xlen::Rv32);
        hart.write_csr(csr::MSCRATCH, 0xffff_ffff_8000_0000, u64::MAX)
            .unwrap();
        assert_eq!(hart.read_csr(csr::MSCRATCH), Ok(0xffff_ffff_8000_0000));
        assert!(hart.peek_csr(csr::MCYCLEH).is_some());
        assert!(hart_rv64_lacks_high_halves());
    }

    fn hart_rv64_lacks_high_halves() -> bool {
        hart(Xlen::Rv64).peek_csr(csr::MCYCLEH).is_none()
    }

    #[test]
    fn fcsr_views() {
        let mut hart = hart(Xlen::Rv32);
        hart.write_csr(csr::FCSR, 0b101_10001, u64::MAX).unwrap();
        assert_eq!(hart.read_csr(csr::FRM), Ok(0b101));
        assert_eq!(hart.read_csr(csr::FFLAGS), Ok(0b10001));
        assert_eq!(hart.status.fs(), ExtensionContextStatus::Dirty);
        hart.status.set_fs(ExtensionContextStatus::Off);
        assert_eq!(
            hart.read_csr(csr::FCSR),
            Err(CsrError::ExtensionDisabled(csr::FCSR))
        );
    }

    #[test]
    fn mdseac_is_latched_until_mdeau_write() {
        let mut hart = hart(Xlen::Rv32);
        hart.apply_store_exception(0x1234);
        hart.apply_store_exception(0x5678);
        assert_eq!(hart.read_csr(csr::MDSEAC), Ok(0x1234));
        hart.write_csr(csr::MDEAU, 0, u64::MAX).unwrap();
        hart.apply_store_exception(0x5678);
        assert_eq!(hart.read_csr(csr::MDSEAC), Ok(0x5678));
    }

    #[test]
    fn counters_written_through_high_half() {
        let mut hart = hart(Xlen::Rv32);
        hart.write_csr(csr::MINSTRETH, 3, u64::MAX).unwrap();
        assert_eq!(hart.read_csr(csr::MINSTRETH), Ok(3));
        assert_eq!(hart.read_csr(csr::INSTRET), Ok(0));
    }
}
