//! Address translation and protection on the path from the hart to its [`Bus`].

use log::trace;

use super::triggers::{TriggerAction, TriggerEvent};
use super::{Hart, Reservation};
use crate::cause::{Exception, ExceptionCause, SecondaryCause};
use crate::memory::Bus;
use crate::pmp::PmpAccess;
use crate::regions::DataAccess;
use crate::vm::{TranslationContext, TranslationFault, VmAccess, PAGE_SIZE};
use crate::PrivilegeLevel;

/// Kind of data access made by an instruction.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(super) enum Access {
    Load,
    Store,
    /// A read-modify-write; faults are reported as store/AMO faults.
    Amo,
}

impl Access {
    fn data(self) -> DataAccess {
        match self {
            Access::Load => DataAccess::Load,
            Access::Store | Access::Amo => DataAccess::Store,
        }
    }

    fn vm(self) -> VmAccess {
        match self {
            Access::Load => VmAccess::Read,
            Access::Store | Access::Amo => VmAccess::Write,
        }
    }

    fn pmp(self) -> &'static [PmpAccess] {
        match self {
            Access::Load => &[PmpAccess::Read],
            Access::Store => &[PmpAccess::Write],
            Access::Amo => &[PmpAccess::Read, PmpAccess::Write],
        }
    }
}

/// Physical location of a data access. An access crossing a page boundary is split in two.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(super) struct Physical {
    pub address: u64,
    /// Number of bytes at `address`; the rest are at `second`.
    pub len: u64,
    pub second: Option<u64>,
}

impl Physical {
    fn parts(&self, size: u64) -> impl Iterator<Item = (u64, u64)> {
        let first = (self.address, self.len);
        let second = self.second.map(|address| (address, size - self.len));
        std::iter::once(first).chain(second)
    }
}

impl<B: Bus> Hart<B> {
    /// Privilege level used for data accesses.
    ///
    /// > When MPRV=1, load and store memory addresses are translated and protected, and
    /// > endianness is applied, as though the current privilege mode were set to MPP.
    pub(super) fn data_privilege(&self) -> PrivilegeLevel {
        if self.status.mprv() {
            self.status.mpp()
        } else {
            self.privilege
        }
    }

    fn translate(
        &mut self,
        address: u64,
        access: VmAccess,
        privilege: PrivilegeLevel,
    ) -> Result<u64, TranslationFault> {
        if privilege == PrivilegeLevel::Machine {
            return Ok(address);
        }
        let context = TranslationContext {
            privilege,
            sum: self.status.sum(),
            mxr: self.status.mxr(),
        };
        self.vm.translate(&mut self.bus, address, access, context)
    }

    /// Fetches the raw instruction at `pc`, returning it together with its physical address.
    ///
    /// The low halfword is read first. Only if it does not hold a compressed instruction is the
    /// high halfword read, which may live on a different page.
    pub(super) fn fetch(&mut self, pc: u64) -> Result<(u32, u64), Exception> {
        if pc & 1 != 0 {
            return Err(Exception::new(ExceptionCause::InstructionAddressMisaligned, pc));
        }
        if let Some(offset) = self.forced_fetch_fault.take() {
            let tval = self.xlen.address(pc.wrapping_add(offset));
            return Err(Exception::new(ExceptionCause::InstructionAccessFault, tval)
                .with_secondary(SecondaryCause::Precise));
        }
        let physical_pc = self.fetch_physical(pc)?;
        let low = self.read_fetch(pc, physical_pc)?;
        if low & 0b11 != 0b11 {
            return Ok((low as u32, physical_pc));
        }
        let high_pc = self.xlen.address(pc.wrapping_add(2));
        let high_physical = if high_pc % PAGE_SIZE == 0 {
            self.fetch_physical(high_pc)?
        } else {
            physical_pc + 2
        };
        let high = self.read_fetch(high_pc, high_physical)?;
        Ok(((high as u32) << 16 | low as u32, physical_pc))
    }

    fn fetch_physical(&mut self, address: u64) -> Result<u64, Exception> {
        let privilege = self.privilege;
        let physical = self
            .translate(address, VmAccess::Execute, privilege)
            .map_err(|fault| match fault {
                TranslationFault::PageFault => {
                    Exception::new(ExceptionCause::InstructionPageFault, address)
                }
                TranslationFault::AccessFault => {
                    Exception::new(ExceptionCause::InstructionAccessFault, address)
                }
            })?;
        if !self.bus.contains(physical, 2) {
            return Err(Exception::new(ExceptionCause::InstructionAccessFault, address)
                .with_secondary(SecondaryCause::OutOfBounds));
        }
        if !self.pmp.check(physical, 2, PmpAccess::Execute, privilege) {
            return Err(Exception::new(ExceptionCause::InstructionAccessFault, address)
                .with_secondary(SecondaryCause::Pmp));
        }
        Ok(physical)
    }

    fn read_fetch(&self, address: u64, physical: u64) -> Result<u16, Exception> {
        self.bus.read_u16(physical).map_err(|_| {
            Exception::new(ExceptionCause::InstructionAccessFault, address)
                .with_secondary(SecondaryCause::OutOfBounds)
        })
    }

    /// Resolves the physical location of a `size`-byte data access at virtual `address`.
    ///
    /// The checks are made in this order, the first failing one deciding the exception:
    ///
    /// 1. load and store triggers;
    /// 2. the misaligned decision table, of which only an address-misaligned outcome is raised
    ///    right away;
    /// 3. the wide access restrictions (8-byte aligned, external memory);
    /// 4. address translation;
    /// 5. physical bounds;
    /// 6. a deferred access fault from the misaligned decision table;
    /// 7. PMP;
    /// 8. a host-forced access fault.
    pub(super) fn resolve_data(
        &mut self,
        address: u64,
        size: u64,
        access: Access,
        wide: bool,
    ) -> Result<Physical, Exception> {
        self.data_trigger(address, access)?;
        self.translate_data(address, size, access, wide)
    }

    /// Fires the load and store triggers matching `address`. A trigger takes priority over every
    /// other exception of the access.
    fn data_trigger(&mut self, address: u64, access: Access) -> Result<(), Exception> {
        let event = match access {
            Access::Load => TriggerEvent::Load,
            Access::Store => TriggerEvent::Store,
            Access::Amo => TriggerEvent::Amo,
        };
        let mie = self.status.mie();
        match self.debug.triggers.match_address(event, address, self.privilege, mie) {
            None => Ok(()),
            Some(action) => {
                trace!("{event:?} trigger fired at {address:#x}");
                self.trigger_halt = action == TriggerAction::EnterDebug;
                Err(Exception::new(ExceptionCause::Breakpoint, address)
                    .with_secondary(SecondaryCause::TriggerHit))
            }
        }
    }

    fn translate_data(
        &mut self,
        address: u64,
        size: u64,
        access: Access,
        wide: bool,
    ) -> Result<Physical, Exception> {
        let data = access.data();
        let access_fault = |secondary| {
            Exception::new(data.access_fault_cause(), address).with_secondary(secondary)
        };

        let misaligned = address % size != 0;
        let mut deferred = None;
        if misaligned {
            match self.regions.misaligned_fault(
                data,
                address,
                size,
                wide,
                self.config.misaligned_data,
            ) {
                Some((cause, _)) if cause == data.misaligned_cause() => {
                    return Err(Exception::new(cause, address));
                }
                fault => deferred = fault,
            }
        }
        if wide && (misaligned || !self.regions.is_external(address)) {
            return Err(access_fault(SecondaryCause::Acc64Bit));
        }

        let privilege = self.data_privilege();
        let page_fault = |fault, tval| match fault {
            TranslationFault::PageFault => Exception::new(data.page_fault_cause(), tval),
            TranslationFault::AccessFault => Exception::new(data.access_fault_cause(), tval),
        };
        let first = self
            .translate(address, access.vm(), privilege)
            .map_err(|fault| page_fault(fault, address))?;
        let len = size.min(PAGE_SIZE - address % PAGE_SIZE);
        let second = if len < size {
            let next = self.xlen.address(address.wrapping_add(len));
            Some(
                self.translate(next, access.vm(), privilege)
                    .map_err(|fault| page_fault(fault, next))?,
            )
        } else {
            None
        };
        let physical = Physical {
            address: first,
            len,
            second,
        };

        if physical
            .parts(size)
            .any(|(address, len)| !self.bus.contains(address, len))
        {
            return Err(access_fault(SecondaryCause::OutOfBounds));
        }
        if let Some((cause, secondary)) = deferred {
            return Err(Exception::new(cause, address).with_secondary(secondary));
        }
        let pmp_ok = physical.parts(size).all(|(address, len)| {
            access
                .pmp()
                .iter()
                .all(|&kind| self.pmp.check(address, len, kind, privilege))
        });
        if !pmp_ok {
            return Err(access_fault(SecondaryCause::Pmp));
        }
        if let Some(fault) = self.forced_data_fault.take() {
            let tval = self.xlen.address(address.wrapping_add(fault.offset));
            trace!("Consuming forced access fault at {address:#x}");
            return Err(
                Exception::new(data.access_fault_cause(), tval).with_secondary(fault.secondary)
            );
        }
        Ok(physical)
    }

    /// Resolves an atomic access, which must be naturally aligned.
    pub(super) fn resolve_atomic(
        &mut self,
        address: u64,
        size: u64,
        access: Access,
    ) -> Result<Physical, Exception> {
        self.data_trigger(address, access)?;
        if address % size != 0 {
            return Err(Exception::new(access.data().misaligned_cause(), address));
        }
        self.translate_data(address, size, access, false)
    }

    pub(super) fn read_physical(&self, physical: Physical, size: u64) -> u64 {
        let mut buf = [0u8; 8];
        let mut at = 0;
        for (address, len) in physical.parts(size) {
            let len = len as usize;
            if self.bus.read(address, &mut buf[at..at + len]).is_err() {
                panic!("read of checked physical range {address:#x}+{len} failed");
            }
            at += len;
        }
        u64::from_le_bytes(buf)
    }

    pub(super) fn write_physical(&mut self, physical: Physical, size: u64, value: u64) {
        let bytes = value.to_le_bytes();
        let mut at = 0;
        for (address, len) in physical.parts(size) {
            let len = len as usize;
            if self.bus.write(address, &bytes[at..at + len]).is_err() {
                panic!("write of checked physical range {address:#x}+{len} failed");
            }
            at += len;
        }
    }

    /// Loads `size` bytes at virtual `address`, zero-extended.
    pub(super) fn load(&mut self, address: u64, size: u64, wide: bool) -> Result<u64, Exception> {
        let physical = self.resolve_data(address, size, Access::Load, wide)?;
        let value = self.read_physical(physical, size);
        trace!("Load {size} bytes at {address:#x} (physical {:#x}): {value:#x}", physical.address);
        Ok(value)
    }

    /// Stores the low `size` bytes of `value` at virtual `address`.
    pub(super) fn store(
        &mut self,
        address: u64,
        size: u64,
        value: u64,
        wide: bool,
    ) -> Result<(), Exception> {
        let physical = self.resolve_data(address, size, Access::Store, wide)?;
        self.write_physical(physical, size, value);
        trace!("Store {size} bytes at {address:#x} (physical {:#x}): {value:#x}", physical.address);
        self.after_store(address, physical, size);
        Ok(())
    }

    /// Keeps derived state coherent with a completed store: cached decodes of the written bytes
    /// are dropped, and an overlapping reservation is lost.
    pub(super) fn after_store(&mut self, address: u64, physical: Physical, size: u64) {
        self.decode_cache.invalidate(address, size);
        if let Some(reservation) = self.reservation {
            let overlaps = physical.parts(size).any(|(address, len)| {
                address < reservation.address + reservation.size
                    && reservation.address < address + len
            });
            if overlaps {
                trace!("Reservation at {:#x} lost to store", reservation.address);
                self.reservation = None;
            }
        }
    }

    pub(super) fn reserve(&mut self, address: u64, size: u64) {
        self.reservation = Some(Reservation { address, size });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csr;
    use crate::hart::Config;
    use crate::memory::Memory;
    use crate::regions::RegionConfig;
    use crate::{address_range, Xlen};

    fn hart() -> Hart<Memory> {
        Hart::new(Memory::new(0x4000), Config::default())
    }

    #[test]
    fn misaligned_fetch() {
        let mut hart = hart();
        let err = hart.fetch(0x101).unwrap_err();
        assert_eq!(err.cause, ExceptionCause::InstructionAddressMisaligned);
        assert_eq!(err.tval, 0x101);
    }

    #[test]
    fn fetch_reads_second_half_only_for_full_instructions() {
        let mut hart = hart();
        // c.nop at the last halfword of memory.
        hart.bus_mut().write_u16(0x3ffe, 0x0001).unwrap();
        assert_eq!(hart.fetch(0x3ffe), Ok((0x0001, 0x3ffe)));
        // A 32-bit instruction whose high half is outside memory.
        hart.bus_mut().write_u16(0x3ffe, 0x0013).unwrap();
        let err = hart.fetch(0x3ffe).unwrap_err();
        assert_eq!(err.cause, ExceptionCause::InstructionAccessFault);
        assert_eq!(err.tval, 0x4000);
    }

    #[test]
    fn loads_and_stores_are_little_endian() {
        let mut hart = hart();
        hart.store(0x100, 4, 0x1122_3344, false).unwrap();
        assert_eq!(hart.bus().read_u8(0x100), Ok(0x44));
        assert_eq!(hart.load(0x102, 2, false), Ok(0x1122));
        // Misaligned, but allowed in an idempotent region.
        assert_eq!(hart.load(0x101, 2, false), Ok(0x2233));
    }

    #[test]
    fn misaligned_disabled() {
        let mut hart = Hart::new(
            Memory::new(0x1000),
            Config {
                misaligned_data: false,
                ..Config::default()
            },
        );
        let err = hart.store(0x102, 4, 0, false).unwrap_err();
        assert_eq!(err.cause, ExceptionCause::StoreOrAmoAddressMisaligned);
        assert_eq!(err.tval, 0x102);
    }

    #[test]
    fn out_of_bounds_beats_misaligned_io() {
        let mut regions = RegionConfig::default();
        regions.idempotent[0] = false;
        let mut hart = Hart::new(
            Memory::new(0x1000),
            Config {
                regions,
                ..Config::default()
            },
        );
        let err = hart.load(0x101, 4, false).unwrap_err();
        assert_eq!(err.cause, ExceptionCause::LoadAccessFault);
        assert_eq!(err.secondary, SecondaryCause::MisalIo);
        let err = hart.load(0xfff, 4, false).unwrap_err();
        assert_eq!(err.secondary, SecondaryCause::OutOfBounds);
    }

    #[test]
    fn wide_access_needs_external_memory() {
        let mut regions = RegionConfig::default();
        regions.local_memory.push(address_range![0x0, 0x7ff]);
        let mut hart = Hart::new(
            Memory::new(0x1000),
            Config {
                regions,
                enable_wide_ld_st: true,
                ..Config::default()
            },
        );
        let err = hart.load(0x100, 8, true).unwrap_err();
        assert_eq!(err.secondary, SecondaryCause::Acc64Bit);
        let err = hart.store(0x804, 8, 0, true).unwrap_err();
        assert_eq!(err.cause, ExceptionCause::StoreOrAmoAccessFault);
        assert_eq!(err.secondary, SecondaryCause::Acc64Bit);
        assert_eq!(hart.load(0x800, 8, true), Ok(0));
    }

    #[test]
    fn pmp_denies_user_access() {
        let mut hart = hart();
        // Entry 0: NAPOT over 0x0..0x1000, read only.
        hart.write_csr(csr::PMPADDR0, 0x1ff, u64::MAX).unwrap();
        hart.write_csr(csr::PMPCFG0, 0b0001_1001, u64::MAX).unwrap();
        hart.privilege = PrivilegeLevel::User;
        assert_eq!(hart.load(0x10, 4, false), Ok(0));
        let err = hart.store(0x10, 4, 0, false).unwrap_err();
        assert_eq!(err.secondary, SecondaryCause::Pmp);
        // Outside every entry.
        let err = hart.load(0x2000, 4, false).unwrap_err();
        assert_eq!(err.cause, ExceptionCause::LoadAccessFault);
    }

    #[test]
    fn page_crossing_access_is_split() {
        let mut hart = Hart::new(
            Memory::new(0x10000),
            Config {
                xlen: Xlen::Rv32,
                ..Config::default()
            },
        );
        // Sv32 root table at 0x1000 mapping VA page 0x0 to PA 0x3000 and VA page 0x1 to PA
        // 0x5000 through a second-level table at 0x2000.
        let pte = |ppn: u64, flags: u64| (ppn << 10 | flags) as u32;
        hart.bus_mut().write_u32(0x1000, pte(0x2, 0b1)).unwrap();
        hart.bus_mut().write_u32(0x2000, pte(0x3, 0b1100_0111)).unwrap();
        hart.bus_mut().write_u32(0x2004, pte(0x5, 0b1100_0111)).unwrap();
        hart.write_csr(csr::SATP, 1 << 31 | 0x1, u64::MAX).unwrap();
        hart.privilege = PrivilegeLevel::Supervisor;
        hart.store(0xffe, 4, 0xaabb_ccdd, false).unwrap();
        assert_eq!(hart.bus().read_u16(0x3ffe), Ok(0xccdd));
        assert_eq!(hart.bus().read_u16(0x5000), Ok(0xaabb));
        assert_eq!(hart.load(0xffe, 4, false), Ok(0xaabb_ccdd));
        // Nothing maps page 2.
        let err = hart.load(0x2000, 4, false).unwrap_err();
        assert_eq!(err.cause, ExceptionCause::LoadPageFault);
    }

    #[test]
    fn store_clears_overlapping_reservation() {
        let mut hart = hart();
        hart.reserve(0x200, 4);
        hart.store(0x204, 4, 1, false).unwrap();
        assert!(hart.reservation.is_some());
        hart.store(0x202, 2, 1, false).unwrap();
        assert!(hart.reservation.is_none());
    }

    #[test]
    fn misaligned_atomics_are_rejected() {
        let mut hart = hart();
        let err = hart.resolve_atomic(0x102, 4, Access::Amo).unwrap_err();
        assert_eq!(err.cause, ExceptionCause::StoreOrAmoAddressMisaligned);
        let err = hart.resolve_atomic(0x102, 4, Access::Load).unwrap_err();
        assert_eq!(err.cause, ExceptionCause::LoadAddressMisaligned);
    }
}
