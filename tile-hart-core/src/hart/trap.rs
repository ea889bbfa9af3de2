use log::{debug, trace};

use super::Hart;
use crate::cause::{Exception, InterruptCause, NmiCause};
use crate::memory::Bus;
use crate::{PrivilegeLevel, RawPrivilegeLevel, Xlen};

/// Trap handling registers of M-mode and S-mode.
#[derive(Debug, Clone)]
pub struct Trap {
    mscratch: u64,
    mepc: u64,
    pub mcause: Cause,
    mtval: u64,
    mscause: u64,

    sscratch: u64,
    sepc: u64,
    pub scause: Cause,
    stval: u64,
    sscause: u64,

    /// `true` when compressed instructions are enabled, which relaxes epc alignment to 2.
    compressed: bool,
}

impl Trap {
    pub fn new(compressed: bool) -> Self {
        Self {
            mscratch: 0,
            mepc: 0,
            mcause: Cause::new(),
            mtval: 0,
            mscause: 0,
            sscratch: 0,
            sepc: 0,
            scause: Cause::new(),
            stval: 0,
            sscause: 0,
            compressed,
        }
    }

    fn epc_mask(&self) -> u64 {
        if self.compressed {
            !0b1
        } else {
            !0b11
        }
    }

    pub fn read_mscratch(&self) -> u64 {
        self.mscratch
    }

    pub fn write_mscratch(&mut self, value: u64, mask: u64) {
        self.mscratch = self.mscratch & !mask | value & mask;
    }

    /// > mepc is a WARL register that must be able to hold all valid virtual addresses.
    pub fn read_mepc(&self) -> u64 {
        self.mepc & self.epc_mask()
    }

    pub fn write_mepc(&mut self, value: u64, mask: u64) {
        self.mepc = (self.mepc & !mask | value & mask) & !0b1;
    }

    pub fn read_mtval(&self) -> u64 {
        self.mtval
    }

    pub fn write_mtval(&mut self, value: u64, mask: u64) {
        self.mtval = self.mtval & !mask | value & mask;
    }

    pub fn read_mscause(&self) -> u64 {
        self.mscause
    }

    pub fn write_mscause(&mut self, value: u64, mask: u64) {
        self.mscause = self.mscause & !mask | value & mask;
    }

    pub fn read_sscratch(&self) -> u64 {
        self.sscratch
    }

    pub fn write_sscratch(&mut self, value: u64, mask: u64) {
        self.sscratch = self.sscratch & !mask | value & mask;
    }

    pub fn read_sepc(&self) -> u64 {
        self.sepc & self.epc_mask()
    }

    pub fn write_sepc(&mut self, value: u64, mask: u64) {
        self.sepc = (self.sepc & !mask | value & mask) & !0b1;
    }

    pub fn read_stval(&self) -> u64 {
        self.stval
    }

    pub fn write_stval(&mut self, value: u64, mask: u64) {
        self.stval = self.stval & !mask | value & mask;
    }

    pub fn read_sscause(&self) -> u64 {
        self.sscause
    }

    pub fn write_sscause(&mut self, value: u64, mask: u64) {
        self.sscause = self.sscause & !mask | value & mask;
    }
}

/// An mcause or scause register.
///
/// > The mcause register is an MXLEN-bit read-write register formatted as shown in Figure 3.22.
/// > When a trap is taken into M-mode, mcause is written with a code indicating the event that
/// > caused the trap. Otherwise, mcause is never written by the implementation, though it may be
/// > explicitly written by software.
#[derive(Debug, Clone)]
pub struct Cause(u64);

impl Default for Cause {
    fn default() -> Self {
        Self::new()
    }
}

impl Cause {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn read(&self) -> u64 {
        self.0
    }

    pub fn write(&mut self, value: u64, mask: u64) {
        self.0 = self.0 & !mask | value & mask;
    }

    pub fn set_exception(&mut self, code: u64) {
        self.0 = code;
    }

    /// Stores an interrupt code, with the Interrupt bit (the top bit for `xlen`) set.
    pub fn set_interrupt(&mut self, xlen: Xlen, code: u64) {
        self.0 = xlen.canonical(1 << (xlen.bits() - 1) | code);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapCause {
    Exception(Exception),
    Interrupt(InterruptCause),
}

impl From<Exception> for TrapCause {
    fn from(value: Exception) -> Self {
        Self::Exception(value)
    }
}

impl From<InterruptCause> for TrapCause {
    fn from(value: InterruptCause) -> Self {
        Self::Interrupt(value)
    }
}

impl<B: Bus> Hart<B> {
    /// Takes a trap at the current pc, which must point at the trapping (or interrupted)
    /// instruction.
    ///
    /// > By default, all traps at any privilege level are handled in machine mode [...]. To
    /// > increase performance, implementations can provide individual read/write bits within
    /// > medeleg and mideleg to indicate that certain exceptions and interrupts should be processed
    /// > directly by a lower privilege level.
    ///
    /// > Traps never transition from a more-privileged mode to a less-privileged mode.
    pub(super) fn take_trap(&mut self, cause: TrapCause) {
        // A pending host-forced data fault dies with the instruction that trapped.
        self.discard_forced_fault();
        self.reservation = None;

        let origin = self.privilege;
        let delegate = origin < PrivilegeLevel::Machine
            && match cause {
                TrapCause::Exception(exception) => {
                    self.control.medeleg.should_delegate(exception.cause)
                }
                TrapCause::Interrupt(interrupt) => {
                    self.interrupts.read_mideleg() & (1 << interrupt.code()) != 0
                }
            };
        let (code, interrupt, tval, secondary) = match cause {
            TrapCause::Exception(exception) => (
                exception.cause.code(),
                false,
                exception.tval,
                exception.secondary.code(),
            ),
            TrapCause::Interrupt(interrupt) => (interrupt.code(), true, 0, 0),
        };
        let pc = self.registers.pc();
        let mask = u64::MAX;

        let target = if delegate {
            self.trap.write_sepc(pc, mask);
            if interrupt {
                self.trap.scause.set_interrupt(self.xlen, code);
            } else {
                self.trap.scause.set_exception(code);
            }
            self.trap.write_stval(self.xlen.canonical(tval), mask);
            self.trap.write_sscause(secondary, mask);
            self.status.set_spp(origin.into());
            self.status.set_spie(self.status.sie());
            self.status.set_sie(false);
            self.privilege = PrivilegeLevel::Supervisor;
            self.control.stvec.target(interrupt.then_some(code))
        } else {
            self.trap.write_mepc(pc, mask);
            if interrupt {
                self.trap.mcause.set_interrupt(self.xlen, code);
            } else {
                self.trap.mcause.set_exception(code);
            }
            self.trap.write_mtval(self.xlen.canonical(tval), mask);
            self.trap.write_mscause(secondary, mask);
            self.status.set_mpp(origin.into());
            self.status.set_mpie(self.status.mie());
            self.status.set_mie(false);
            self.privilege = PrivilegeLevel::Machine;
            self.control.mtvec.target(interrupt.then_some(code))
        };
        trace!("Trap {cause:?} at {pc:#x} into {} mode, handler {target:#x}", self.privilege);
        if origin != self.privilege {
            debug!("Privilege level changed from {origin} to {}", self.privilege);
        }
        self.set_pc(target);
    }

    /// Delivers a non-maskable interrupt: always to M-mode, bypassing delegation and enables.
    pub(super) fn take_nmi(&mut self, cause: NmiCause) {
        self.discard_forced_fault();
        self.reservation = None;

        let origin = self.privilege;
        let pc = self.registers.pc();
        let mask = u64::MAX;
        self.trap.write_mepc(pc, mask);
        self.trap.mcause.write(self.xlen.canonical(cause.code()), mask);
        self.trap.write_mscause(0, mask);
        self.trap.write_mtval(0, mask);
        self.status.set_mpp(origin.into());
        self.status.set_mpie(self.status.mie());
        self.status.set_mie(false);
        self.privilege = PrivilegeLevel::Machine;
        self.debug.set_nmip(false);
        debug!("NMI {cause:?} at {pc:#x}, handler {:#x}", self.config.nmi_pc);
        self.set_pc(self.config.nmi_pc);
    }

    /// Returns from an M-mode trap.
    ///
    /// > An MRET or SRET instruction is used to return from a trap in M-mode or S-mode
    /// > respectively. When executing an xRET instruction, supposing xPP holds the value y, xIE is
    /// > set to xPIE; the privilege mode is changed to y; xPIE is set to 1; and xPP is set to the
    /// > least-privileged supported mode (U if U-mode is implemented, else M). If xPP≠M, xRET
    /// > also sets MPRV=0.
    pub(super) fn return_from_machine_trap(&mut self) {
        let previous = self.status.mpp();
        self.status.set_mie(self.status.mpie());
        self.status.set_mpie(true);
        self.status.set_mpp(self.least_privileged().into());
        if previous != PrivilegeLevel::Machine {
            self.status.set_mprv(false);
        }
        self.change_privilege(previous);
        self.set_pc(self.trap.read_mepc());
    }

    /// Returns from an S-mode trap. See [`Self::return_from_machine_trap`].
    pub(super) fn return_from_supervisor_trap(&mut self) {
        let previous = self.status.spp();
        self.status.set_sie(self.status.spie());
        self.status.set_spie(true);
        self.status.set_spp(RawPrivilegeLevel::User);
        self.status.set_mprv(false);
        self.change_privilege(previous);
        self.set_pc(self.trap.read_sepc());
    }

    fn least_privileged(&self) -> PrivilegeLevel {
        if self.config.extensions.u {
            PrivilegeLevel::User
        } else {
            PrivilegeLevel::Machine
        }
    }

    fn change_privilege(&mut self, level: PrivilegeLevel) {
        if level != self.privilege {
            debug!("Privilege level changed from {} to {level}", self.privilege);
        }
        self.privilege = level;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_bit_follows_xlen() {
        let mut cause = Cause::new();
        cause.set_interrupt(Xlen::Rv32, 7);
        assert_eq!(cause.read(), 0xffff_ffff_8000_0007);
        cause.set_interrupt(Xlen::Rv64, 7);
        assert_eq!(cause.read(), 0x8000_0000_0000_0007);
        cause.set_exception(2);
        assert_eq!(cause.read(), 2);
    }

    #[test]
    fn epc_alignment() {
        let mut trap = Trap::new(false);
        trap.write_mepc(0x1003, u64::MAX);
        assert_eq!(trap.read_mepc(), 0x1000);
        let mut trap = Trap::new(true);
        trap.write_sepc(0x1003, u64::MAX);
        assert_eq!(trap.read_sepc(), 0x1002);
    }
}
