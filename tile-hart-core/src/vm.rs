//! Sv32/Sv39 virtual-memory translation with an ASID-tagged translation cache.
//!
//! > When Sv32 is written to the MODE field in the satp register, the supervisor operates in a
//! > 32-bit paged virtual-memory system. In this mode, supervisor and user virtual addresses are
//! > translated into supervisor physical addresses by traversing a radix-tree page table.
//!
//! The translator is consulted by the hart only when the effective privilege level is below
//! machine mode. Its configuration is derived from `satp` and recomputed on every write of that
//! register.

use crate::memory::Bus;
use crate::{PrivilegeLevel, Xlen};
use bitvec::{field::BitField, order::Lsb0, view::BitView};
use log::{debug, trace};

pub const PAGE_SHIFT: u32 = 12;
pub const PAGE_SIZE: u64 = 1 << PAGE_SHIFT;

/// Default number of translation cache entries.
pub const DEFAULT_TLB_SIZE: usize = 64;

mod pte {
    pub const V: usize = 0;
    pub const R: usize = 1;
    pub const W: usize = 2;
    pub const X: usize = 3;
    pub const U: usize = 4;
    pub const G: usize = 5;
    pub const A: usize = 6;
    pub const D: usize = 7;
    pub const PPN: usize = 10;
}

/// Translation scheme selected by `satp.MODE`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum Mode {
    /// No translation or protection.
    #[default]
    Bare,
    Sv32,
    Sv39,
}

impl Mode {
    fn levels(self) -> usize {
        match self {
            Mode::Bare => 0,
            Mode::Sv32 => 2,
            Mode::Sv39 => 3,
        }
    }

    fn vpn_bits(self) -> u32 {
        match self {
            Mode::Sv32 => 10,
            _ => 9,
        }
    }

    fn pte_size(self) -> u64 {
        match self {
            Mode::Sv32 => 4,
            _ => 8,
        }
    }

    fn ppn_bits(self) -> usize {
        match self {
            Mode::Sv32 => 22,
            _ => 44,
        }
    }
}

/// Kind of access being translated.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum VmAccess {
    Read,
    Write,
    Execute,
}

/// Why a translation failed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TranslationFault {
    PageFault,
    /// A page-table entry could not be read from physical memory.
    AccessFault,
}

/// Privilege-dependent inputs to a translation.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TranslationContext {
    pub privilege: PrivilegeLevel,
    /// Permit supervisor access to user pages (`mstatus.SUM`).
    pub sum: bool,
    /// Make executable pages readable (`mstatus.MXR`).
    pub mxr: bool,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct TlbEntry {
    /// Virtual page number with the bits below the page size cleared.
    vpn: u64,
    /// Physical page number with the bits below the page size cleared.
    ppn: u64,
    /// Level of the leaf; a page spans `1 << (level * vpn_bits)` base pages.
    level: usize,
    asid: u16,
    global: bool,
    read: bool,
    write: bool,
    execute: bool,
    user: bool,
    dirty: bool,
}

#[derive(Debug, Clone)]
pub struct VirtualMemory {
    xlen: Xlen,
    mode: Mode,
    asid: u16,
    root_ppn: u64,
    /// Set the accessed/dirty bits in hardware instead of raising a page fault.
    update_ad: bool,
    tlb: Vec<TlbEntry>,
    tlb_size: usize,
}

impl VirtualMemory {
    pub fn new(xlen: Xlen, update_ad: bool) -> Self {
        Self {
            xlen,
            mode: Mode::Bare,
            asid: 0,
            root_ppn: 0,
            update_ad,
            tlb: Vec::new(),
            tlb_size: DEFAULT_TLB_SIZE,
        }
    }

    pub fn reset(&mut self) {
        self.mode = Mode::Bare;
        self.asid = 0;
        self.root_ppn = 0;
        self.tlb.clear();
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn asid(&self) -> u16 {
        self.asid
    }

    pub fn root_ppn(&self) -> u64 {
        self.root_ppn
    }

    /// Returns the `satp` value describing the current configuration.
    pub fn read_satp(&self) -> u64 {
        let mut value = 0u64;
        let bits = value.view_bits_mut::<Lsb0>();
        match self.xlen {
            Xlen::Rv32 => {
                bits[..22].store_le(self.root_ppn);
                bits[22..31].store_le(self.asid);
                bits.set(31, self.mode == Mode::Sv32);
            }
            Xlen::Rv64 => {
                bits[..44].store_le(self.root_ppn);
                bits[44..60].store_le(self.asid);
                let mode: u8 = if self.mode == Mode::Sv39 { 8 } else { 0 };
                bits[60..].store_le(mode);
            }
        }
        value
    }

    /// Writes `satp`. Returns `true` if the address space identifier changed.
    ///
    /// > The satp register is considered active when the effective privilege mode is S-mode or
    /// > U-mode. [...] Writing satp with an unsupported MODE [...] the entire write has no effect.
    pub fn write_satp(&mut self, value: u64, mask: u64) -> bool {
        let value = self.read_satp() & !mask | value & mask;
        let bits = value.view_bits::<Lsb0>();
        let (mode, asid, ppn) = match self.xlen {
            Xlen::Rv32 => {
                let mode = if bits[31] { Mode::Sv32 } else { Mode::Bare };
                (mode, bits[22..31].load_le::<u16>(), bits[..22].load_le::<u64>())
            }
            Xlen::Rv64 => {
                let mode = match bits[60..].load_le::<u8>() {
                    0 => Mode::Bare,
                    8 => Mode::Sv39,
                    _ => return false,
                };
                (mode, bits[44..60].load_le::<u16>(), bits[..44].load_le::<u64>())
            }
        };
        let asid_changed = asid != self.asid;
        if mode != self.mode {
            debug!("Address translation mode changed to {mode:?}");
        }
        self.mode = mode;
        self.asid = asid;
        self.root_ppn = ppn;
        asid_changed
    }

    /// Flushes cached translations, as done by `sfence.vma`.
    ///
    /// `address` restricts the flush to the page holding it, `asid` to non-global translations of
    /// that address space.
    pub fn flush(&mut self, address: Option<u64>, asid: Option<u16>) {
        let vpn_bits = self.mode.vpn_bits();
        self.tlb.retain(|entry| {
            let address_match = address.map_or(true, |address| {
                let shift = entry.level as u32 * vpn_bits;
                (address >> PAGE_SHIFT) >> shift << shift == entry.vpn
            });
            let asid_match = asid.map_or(true, |asid| !entry.global && entry.asid == asid);
            !(address_match && asid_match)
        });
        trace!("Translation cache flushed, {} entries left", self.tlb.len());
    }

    /// Translates virtual `address` to a physical address.
    ///
    /// With [`Mode::Bare`] the address is returned unchanged.
    pub fn translate<B: Bus>(
        &mut self,
        bus: &mut B,
        address: u64,
        access: VmAccess,
        context: TranslationContext,
    ) -> Result<u64, TranslationFault> {
        if self.mode == Mode::Bare {
            return Ok(address);
        }
        let address = match self.mode {
            Mode::Sv32 => address & 0xffff_ffff,
            _ => {
                // > Instruction fetch addresses and load and store effective addresses, which are
                // > 64 bits, must have bits 63–39 all equal to bit 38, or else a page-fault
                // > exception will occur.
                if ((address as i64) << 25 >> 25) as u64 != address {
                    return Err(TranslationFault::PageFault);
                }
                address
            }
        };

        let vpn = address >> PAGE_SHIFT;
        let offset = address & (PAGE_SIZE - 1);
        if let Some(entry) = self.lookup(vpn) {
            let needs_update = access == VmAccess::Write && !entry.dirty;
            if !needs_update {
                check_permissions(&entry, access, context)?;
                return Ok(physical(&entry, vpn, self.mode.vpn_bits()) << PAGE_SHIFT | offset);
            }
        }

        let entry = self.walk(bus, vpn, access, context)?;
        let result = physical(&entry, vpn, self.mode.vpn_bits()) << PAGE_SHIFT | offset;
        self.insert(entry);
        Ok(result)
    }

    fn lookup(&self, vpn: u64) -> Option<TlbEntry> {
        let vpn_bits = self.mode.vpn_bits();
        self.tlb
            .iter()
            .find(|entry| {
                let shift = entry.level as u32 * vpn_bits;
                vpn >> shift << shift == entry.vpn && (entry.global || entry.asid == self.asid)
            })
            .copied()
    }

    fn insert(&mut self, entry: TlbEntry) {
        self.tlb
            .retain(|e| !(e.vpn == entry.vpn && e.asid == entry.asid && e.level == entry.level));
        if self.tlb.len() >= self.tlb_size {
            self.tlb.remove(0);
        }
        self.tlb.push(entry);
    }

    /// Walks the page table for `vpn`, updating the A/D bits when enabled.
    fn walk<B: Bus>(
        &self,
        bus: &mut B,
        vpn: u64,
        access: VmAccess,
        context: TranslationContext,
    ) -> Result<TlbEntry, TranslationFault> {
        let mode = self.mode;
        let vpn_bits = mode.vpn_bits();
        let pte_size = mode.pte_size();
        let mut table = self.root_ppn * PAGE_SIZE;
        let mut level = mode.levels() - 1;
        loop {
            let index = (vpn >> (level as u32 * vpn_bits)) & ((1 << vpn_bits) - 1);
            let pte_address = table + index * pte_size;
            let mut pte = read_pte(bus, pte_address, pte_size)?;
            let bits = pte.view_bits::<Lsb0>();
            let (valid, read, write, execute) =
                (bits[pte::V], bits[pte::R], bits[pte::W], bits[pte::X]);
            let ppn = bits[pte::PPN..pte::PPN + mode.ppn_bits()].load_le::<u64>();
            if !valid || (!read && write) {
                return Err(TranslationFault::PageFault);
            }
            if !read && !execute {
                if level == 0 {
                    return Err(TranslationFault::PageFault);
                }
                level -= 1;
                table = ppn * PAGE_SIZE;
                continue;
            }

            let mut entry = TlbEntry {
                vpn: 0,
                ppn,
                level,
                asid: self.asid,
                global: bits[pte::G],
                read,
                write,
                execute,
                user: bits[pte::U],
                dirty: bits[pte::D],
            };
            check_permissions(&entry, access, context)?;

            // > If i > 0 and pte.ppn[i-1:0] != 0, this is a misaligned superpage; stop and raise a
            // > page-fault exception.
            let shift = level as u32 * vpn_bits;
            if ppn & ((1 << shift) - 1) != 0 {
                return Err(TranslationFault::PageFault);
            }

            let accessed = bits[pte::A];
            if !accessed || (access == VmAccess::Write && !entry.dirty) {
                if !self.update_ad {
                    return Err(TranslationFault::PageFault);
                }
                let bits = pte.view_bits_mut::<Lsb0>();
                bits.set(pte::A, true);
                if access == VmAccess::Write {
                    bits.set(pte::D, true);
                    entry.dirty = true;
                }
                write_pte(bus, pte_address, pte_size, pte)?;
            }
            entry.vpn = vpn >> shift << shift;
            entry.ppn = ppn >> shift << shift;
            return Ok(entry);
        }
    }
}

fn physical(entry: &TlbEntry, vpn: u64, vpn_bits: u32) -> u64 {
    let shift = entry.level as u32 * vpn_bits;
    entry.ppn | (vpn & ((1 << shift) - 1))
}

fn check_permissions(
    entry: &TlbEntry,
    access: VmAccess,
    context: TranslationContext,
) -> Result<(), TranslationFault> {
    let allowed = match access {
        VmAccess::Read => entry.read || (context.mxr && entry.execute),
        VmAccess::Write => entry.write,
        VmAccess::Execute => entry.execute,
    };
    let privilege_ok = match context.privilege {
        PrivilegeLevel::User => entry.user,
        // > Irrespective of SUM, the supervisor may not execute code on pages with U=1.
        PrivilegeLevel::Supervisor => {
            !entry.user || (context.sum && access != VmAccess::Execute)
        }
        PrivilegeLevel::Machine => true,
    };
    if allowed && privilege_ok {
        Ok(())
    } else {
        Err(TranslationFault::PageFault)
    }
}

fn read_pte<B: Bus>(bus: &B, address: u64, size: u64) -> Result<u64, TranslationFault> {
    let value = match size {
        4 => bus.read_u32(address).map(u64::from),
        _ => bus.read_u64(address),
    };
    value.map_err(|_| TranslationFault::AccessFault)
}

fn write_pte<B: Bus>(
    bus: &mut B,
    address: u64,
    size: u64,
    value: u64,
) -> Result<(), TranslationFault> {
    let result = match size {
        4 => bus.write_u32(address, value as u32),
        _ => bus.write_u64(address, value),
    };
    result.map_err(|_| TranslationFault::AccessFault)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Memory;

    const V: u64 = 1;
    const R: u64 = 1 << 1;
    const W: u64 = 1 << 2;
    const X: u64 = 1 << 3;
    const U: u64 = 1 << 4;
    const A: u64 = 1 << 6;
    const D: u64 = 1 << 7;

    fn user() -> TranslationContext {
        TranslationContext {
            privilege: PrivilegeLevel::User,
            sum: false,
            mxr: false,
        }
    }

    /// Sv32 tables: root at 0x1000, second level at 0x2000, mapping 0x40_0000 to 0x5000.
    fn sv32(flags: u64) -> (VirtualMemory, Memory) {
        let mut memory = Memory::new(0x10000);
        // Root entry for vpn[1] = 1 points to the table at 0x2000.
        memory.write_u32(0x1000 + 4, ((0x2000 >> 12) << 10 | V) as u32).unwrap();
        // Leaf for vpn[0] = 0.
        memory.write_u32(0x2000, ((0x5000 >> 12) << 10 | flags) as u32).unwrap();
        let mut vm = VirtualMemory::new(Xlen::Rv32, false);
        vm.write_satp(1 << 31 | 1, u64::MAX);
        (vm, memory)
    }

    #[test]
    fn sv32_translation() {
        let (mut vm, mut memory) = sv32(V | R | W | U | A | D);
        assert_eq!(vm.mode(), Mode::Sv32);
        assert_eq!(
            vm.translate(&mut memory, 0x40_0123, VmAccess::Read, user()),
            Ok(0x5123)
        );
        assert_eq!(
            vm.translate(&mut memory, 0x40_0123, VmAccess::Execute, user()),
            Err(TranslationFault::PageFault)
        );
        // Unmapped.
        assert_eq!(
            vm.translate(&mut memory, 0x80_0000, VmAccess::Read, user()),
            Err(TranslationFault::PageFault)
        );
    }

    #[test]
    fn supervisor_access_to_user_pages_needs_sum() {
        let (mut vm, mut memory) = sv32(V | R | X | U | A | D);
        let mut context = TranslationContext {
            privilege: PrivilegeLevel::Supervisor,
            sum: false,
            mxr: false,
        };
        assert!(vm.translate(&mut memory, 0x40_0000, VmAccess::Read, context).is_err());
        context.sum = true;
        assert!(vm.translate(&mut memory, 0x40_0000, VmAccess::Read, context).is_ok());
        assert!(vm.translate(&mut memory, 0x40_0000, VmAccess::Execute, context).is_err());
    }

    #[test]
    fn accessed_and_dirty_bits() {
        let (mut vm, mut memory) = sv32(V | R | W | U);
        assert_eq!(
            vm.translate(&mut memory, 0x40_0000, VmAccess::Write, user()),
            Err(TranslationFault::PageFault)
        );

        let (_, mut memory) = sv32(V | R | W | U);
        let mut vm = VirtualMemory::new(Xlen::Rv32, true);
        vm.write_satp(1 << 31 | 1, u64::MAX);
        assert_eq!(
            vm.translate(&mut memory, 0x40_0004, VmAccess::Write, user()),
            Ok(0x5004)
        );
        let pte = memory.read_u32(0x2000).unwrap() as u64;
        assert_eq!(pte & (A | D), A | D);
    }

    #[test]
    fn sfence_flushes_cached_translations() {
        let (mut vm, mut memory) = sv32(V | R | U | A);
        assert!(vm.translate(&mut memory, 0x40_0000, VmAccess::Read, user()).is_ok());
        // Remove the mapping; the cached translation still applies until flushed.
        memory.write_u32(0x2000, 0).unwrap();
        assert!(vm.translate(&mut memory, 0x40_0000, VmAccess::Read, user()).is_ok());
        vm.flush(Some(0x40_0000), None);
        assert!(vm.translate(&mut memory, 0x40_0000, VmAccess::Read, user()).is_err());
    }

    #[test]
    fn sv39_superpage_and_canonical_check() {
        let mut memory = Memory::new(0x10000);
        // A 2 MiB page at vpn[2] = 0, vpn[1] = 1 mapping to physical 0x20_0000.
        memory.write_u64(0x1000, (0x2000 >> 12) << 10 | V).unwrap();
        memory
            .write_u64(0x2000 + 8, (0x20_0000 >> 12) << 10 | V | R | U | A)
            .unwrap();
        let mut vm = VirtualMemory::new(Xlen::Rv64, false);
        assert!(!vm.write_satp(8 << 60 | 1, u64::MAX));
        assert_eq!(vm.mode(), Mode::Sv39);
        assert_eq!(
            vm.translate(&mut memory, 0x2f_1234, VmAccess::Read, user()),
            Ok(0x2f_1234)
        );
        assert_eq!(
            vm.translate(&mut memory, 0x0100_0000_0000_0000, VmAccess::Read, user()),
            Err(TranslationFault::PageFault)
        );
    }

    #[test]
    fn unsupported_mode_write_is_ignored() {
        let mut vm = VirtualMemory::new(Xlen::Rv64, false);
        vm.write_satp(9 << 60 | 5, u64::MAX);
        assert_eq!(vm.mode(), Mode::Bare);
        assert_eq!(vm.read_satp(), 0);
        assert!(vm.write_satp(3 << 44, u64::MAX));
        assert_eq!(vm.asid(), 3);
    }

    #[test]
    fn page_table_outside_memory_is_an_access_fault() {
        let mut memory = Memory::new(0x1000);
        let mut vm = VirtualMemory::new(Xlen::Rv32, false);
        vm.write_satp(1 << 31 | 0x100, u64::MAX);
        assert_eq!(
            vm.translate(&mut memory, 0, VmAccess::Read, user()),
            Err(TranslationFault::AccessFault)
        );
    }
}
